//! Action dispatch for leadflow workflows.
//!
//! This crate provides:
//!
//! - **ActionDispatcher trait**: The seam the workflow engine calls for side effects
//! - **RoutingDispatcher**: Routes each action type to a registered handler
//! - **WebhookHandler**: Delivers `webhook` actions over HTTP

pub mod action;
pub mod error;
pub mod webhook;

pub use action::{ActionDispatcher, ActionHandler, ActionType, RoutingDispatcher};
pub use error::DispatchError;
pub use webhook::{WebhookConfig, WebhookHandler};
