//! Error types for the AI crate.
//!
//! Every variant is classified as transient or permanent. The workflow
//! engine retries transient failures with backoff and fails the execution
//! immediately on permanent ones.

use std::fmt;

/// Errors from AI invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiError {
    /// Provider is unreachable or returned a server error.
    ProviderUnavailable { provider: String, reason: String },
    /// Timeout waiting for response.
    Timeout,
    /// Rate limit exceeded.
    RateLimited { retry_after_secs: Option<u64> },
    /// The provider rejected the request as invalid.
    InvalidRequest { reason: String },
    /// Response parsing failed.
    ResponseParseFailed { reason: String },
    /// Invalid client configuration.
    InvalidConfig { reason: String },
}

impl AiError {
    /// Returns true if retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable { .. } | Self::Timeout | Self::RateLimited { .. }
        )
    }
}

impl fmt::Display for AiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderUnavailable { provider, reason } => {
                write!(f, "AI provider '{provider}' unavailable: {reason}")
            }
            Self::Timeout => write!(f, "AI request timed out"),
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "rate limited, retry after {secs}s")
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::InvalidRequest { reason } => {
                write!(f, "AI request rejected: {reason}")
            }
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse AI response: {reason}")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid AI configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for AiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_are_transient() {
        let err = AiError::ProviderUnavailable {
            provider: "openai".to_string(),
            reason: "502 bad gateway".to_string(),
        };
        assert!(err.is_transient());
        assert!(AiError::Timeout.is_transient());
        assert!(AiError::RateLimited {
            retry_after_secs: Some(3)
        }
        .is_transient());
    }

    #[test]
    fn request_errors_are_permanent() {
        let err = AiError::InvalidRequest {
            reason: "context length exceeded".to_string(),
        };
        assert!(!err.is_transient());
        assert!(
            !AiError::ResponseParseFailed {
                reason: "no choices".to_string()
            }
            .is_transient()
        );
    }

    #[test]
    fn ai_error_display() {
        let err = AiError::RateLimited {
            retry_after_secs: Some(20),
        };
        assert!(err.to_string().contains("20s"));
        let err = AiError::ProviderUnavailable {
            provider: "openai".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("openai"));
        assert!(err.to_string().contains("connection refused"));
    }
}
