//! Bounded retries for external calls.
//!
//! Only AI and action nodes are retried, and only for transient errors.
//! Each attempt runs under its own timeout; a timed-out attempt counts as a
//! transient failure.

use crate::error::NodeError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy for external-call nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay after the first failed attempt, doubled after each further one.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Timeout for one attempt.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_attempt_timeout_secs() -> u64 {
    60
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

impl RetryPolicy {
    /// Returns the delay before the attempt following failed attempt `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    /// Returns the per-attempt timeout.
    #[must_use]
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns the last error when every attempt failed, or the first
    /// permanent error.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, NodeError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let attempt_timeout = self.attempt_timeout();
        let mut attempt = 1u32;

        loop {
            let result = match tokio::time::timeout(attempt_timeout, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(NodeError::AttemptTimedOut {
                    after: attempt_timeout,
                }),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() || attempt >= max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_ai::AiError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(10), Duration::from_millis(10_000));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_millis(10_000));
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let policy: RetryPolicy =
            serde_json::from_value(serde_json::json!({"max_attempts": 5})).unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff_ms, 500);
        assert_eq!(policy.attempt_timeout(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(NodeError::Ai(AiError::Timeout))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts_with_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::default()
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err(NodeError::Ai(AiError::ProviderUnavailable {
                        provider: "openai".to_string(),
                        reason: format!("attempt {attempt}"),
                    }))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(result.unwrap_err().to_string().contains("attempt 3"));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = RetryPolicy::default()
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(NodeError::InvalidInput {
                        reason: "bad".to_string(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_attempts_time_out_and_retry() {
        let policy = RetryPolicy {
            attempt_timeout_secs: 1,
            ..RetryPolicy::default()
        };
        let result = policy
            .run(|attempt| async move {
                if attempt == 1 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok::<_, NodeError>(attempt)
            })
            .await;
        assert_eq!(result, Ok(2));
    }
}
