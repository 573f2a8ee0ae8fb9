//! Core domain types and utilities for leadflow.
//!
//! This crate provides the foundational types shared by the workflow engine,
//! the scheduler and the server: strongly-typed identifiers, the clock
//! abstraction used for deterministic time.

pub mod clock;
pub mod id;

pub use clock::{Clock, FixedClock, SystemClock};
pub use id::{ClaimId, ExecutionId, ParseIdError, TenantId, WorkflowId};
