//! Scheduler for leadflow workflow executions.
//!
//! Periodically scans the execution store for runs that are due (pending,
//! past their delay, or orphaned by a crashed worker) and hands them to the
//! engine. The engine claims each run before touching it, so overlapping
//! scans never run the same execution twice.

pub mod error;
pub mod scheduler;

pub use error::SchedulerError;
pub use scheduler::{ResumeScheduler, SchedulerConfig, TickSummary};
