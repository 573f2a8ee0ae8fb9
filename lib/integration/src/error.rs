//! Error types for the integration crate.

use std::fmt;

/// Errors from dispatching an action.
///
/// Each variant is either transient (worth retrying) or permanent; see
/// [`DispatchError::is_transient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Connection to the target service failed.
    ConnectionFailed { reason: String },
    /// The target service reported a server-side failure.
    ServiceUnavailable { status: u16, reason: String },
    /// Rate limit exceeded.
    RateLimited { retry_after_secs: Option<u64> },
    /// Timeout waiting for response.
    Timeout,
    /// No handler is registered for the action type.
    Unsupported { action_type: String },
    /// The resolved configuration is unusable.
    InvalidConfig { action_type: String, reason: String },
    /// The target service rejected the request.
    Rejected { status: u16, reason: String },
}

impl DispatchError {
    /// Returns whether retrying the same dispatch may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::ServiceUnavailable { .. }
                | Self::RateLimited { .. }
                | Self::Timeout
        )
    }

    /// Classifies an HTTP status returned by a target service.
    #[must_use]
    pub fn from_status(status: u16, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        match status {
            408 => Self::Timeout,
            429 => Self::RateLimited {
                retry_after_secs: None,
            },
            500..=599 => Self::ServiceUnavailable { status, reason },
            _ => Self::Rejected { status, reason },
        }
    }
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed { reason } => {
                write!(f, "connection failed: {reason}")
            }
            Self::ServiceUnavailable { status, reason } => {
                write!(f, "service unavailable (HTTP {status}): {reason}")
            }
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "rate limited, retry after {secs}s")
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::Timeout => write!(f, "operation timed out"),
            Self::Unsupported { action_type } => {
                write!(f, "action type not supported: {action_type}")
            }
            Self::InvalidConfig {
                action_type,
                reason,
            } => {
                write!(f, "invalid config for '{action_type}': {reason}")
            }
            Self::Rejected { status, reason } => {
                write!(f, "request rejected (HTTP {status}): {reason}")
            }
        }
    }
}

impl std::error::Error for DispatchError {}
