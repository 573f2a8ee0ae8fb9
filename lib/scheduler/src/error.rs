//! Error types for the scheduler crate.

use std::fmt;

/// Errors from a scheduler tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Listing due executions failed.
    ScanFailed { details: String },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScanFailed { details } => {
                write!(f, "failed to scan for due executions: {details}")
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_failed_display() {
        let err = SchedulerError::ScanFailed {
            details: "connection reset".to_string(),
        };
        assert!(err.to_string().contains("connection reset"));
    }
}
