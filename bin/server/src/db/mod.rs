//! PostgreSQL-backed stores.
//!
//! - Workflows (read-only to the engine)
//! - Workflow executions, with lease-based claims

pub mod execution;
pub mod workflow;

pub use execution::PgExecutionStore;
pub use workflow::PgWorkflowStore;

use leadflow_workflow::StoreError;

/// Classifies a sqlx error for the engine.
pub(crate) fn store_error(error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => StoreError::Unavailable {
            details: error.to_string(),
        },
        other => StoreError::QueryFailed {
            details: other.to_string(),
        },
    }
}

/// Builds a decode error for a column that could not be converted.
pub(crate) fn corrupt(id: &str, details: impl Into<String>) -> StoreError {
    StoreError::CorruptRecord {
        id: id.to_string(),
        details: details.into(),
    }
}
