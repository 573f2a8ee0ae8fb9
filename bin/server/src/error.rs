//! Domain error types for the server.
//!
//! Engine failures arrive as `Report<EngineError>`; [`ApiError`] maps them to
//! a status code and a user-safe message. Internal details are logged, not
//! returned.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use leadflow_workflow::{EngineError, StoreError};
use rootcause::Report;
use serde_json::json;
use std::fmt;

/// Errors returned by API handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// A path id could not be parsed.
    InvalidId { kind: &'static str, value: String },
    /// The workflow or execution does not exist.
    NotFound { what: String },
    /// The workflow cannot be started in its current state.
    Conflict { reason: String },
    /// Anything else.
    Internal { details: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidId { kind, value } => write!(f, "invalid {kind} id '{value}'"),
            Self::NotFound { what } => write!(f, "{what} not found"),
            Self::Conflict { reason } => write!(f, "{reason}"),
            Self::Internal { details } => write!(f, "internal error: {details}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidId { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Internal { .. } => "internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<Report<EngineError>> for ApiError {
    fn from(report: Report<EngineError>) -> Self {
        match report.current_context() {
            EngineError::WorkflowNotFound { workflow_id } => Self::NotFound {
                what: format!("workflow {workflow_id}"),
            },
            EngineError::ExecutionNotFound { execution_id } => Self::NotFound {
                what: format!("execution {execution_id}"),
            },
            EngineError::WorkflowNotActive {
                workflow_id,
                status,
            } => Self::Conflict {
                reason: format!("workflow {workflow_id} is {status}, not active"),
            },
            EngineError::Store(StoreError::ClaimLost { execution_id }) => Self::Conflict {
                reason: format!("execution {execution_id} was taken over by another worker"),
            },
            EngineError::Store(e) => Self::Internal {
                details: e.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal { details } = &self {
            tracing::error!(error = %details, "request failed");
        }
        let body = Json(json!({ "error": self.public_message() }));
        (self.status(), body).into_response()
    }
}

/// Errors that stop the server from starting or serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupError {
    /// Configuration is missing or invalid.
    Config { details: String },
    /// The database could not be reached.
    Database { details: String },
    /// Migrations failed.
    Migration { details: String },
    /// A collaborator client could not be built.
    Collaborator { name: &'static str, details: String },
    /// The listener could not be bound.
    Bind { addr: String, details: String },
    /// The server stopped with an error.
    Serve { details: String },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "invalid configuration: {details}"),
            Self::Database { details } => write!(f, "failed to connect to database: {details}"),
            Self::Migration { details } => write!(f, "failed to run migrations: {details}"),
            Self::Collaborator { name, details } => {
                write!(f, "failed to build {name} client: {details}")
            }
            Self::Bind { addr, details } => write!(f, "failed to bind {addr}: {details}"),
            Self::Serve { details } => write!(f, "server error: {details}"),
        }
    }
}

impl std::error::Error for StartupError {}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::{ExecutionId, WorkflowId};

    fn api_error(error: EngineError) -> ApiError {
        let report: Report<EngineError> = error.into();
        report.into()
    }

    #[test]
    fn engine_errors_map_to_status_codes() {
        let workflow_id = WorkflowId::new();
        let not_found: ApiError = api_error(EngineError::WorkflowNotFound { workflow_id });
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let inactive: ApiError = api_error(EngineError::WorkflowNotActive {
            workflow_id,
            status: "paused".to_string(),
        });
        assert_eq!(inactive.status(), StatusCode::CONFLICT);
        assert!(inactive.to_string().contains("paused"));
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err: ApiError = api_error(EngineError::Store(StoreError::Unavailable {
            details: "password authentication failed".to_string(),
        }));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "internal server error");
    }

    #[test]
    fn lost_claim_is_a_conflict() {
        let execution_id = ExecutionId::new();
        let err: ApiError = api_error(EngineError::Store(StoreError::ClaimLost { execution_id }));
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
