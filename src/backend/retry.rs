//! Retry with linear backoff for backend generation calls

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::BackendConfig;
use crate::{Error, Result};

/// Retry policy for backend calls
///
/// Attempt `n` that fails transiently is followed by a wait of
/// `backoff_base * n` before attempt `n + 1`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Upper bound on a single attempt
    pub attempt_timeout: Duration,
    /// Base delay, multiplied by the attempt number
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&BackendConfig::default())
    }
}

impl RetryPolicy {
    /// Build a policy from backend configuration
    #[must_use]
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            attempt_timeout: config.attempt_timeout,
            backoff_base: config.backoff_base,
        }
    }

    /// Delay before the attempt following attempt `attempt` (1-based)
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt)
    }

    /// Worst-case wall time of one call under this policy
    #[must_use]
    pub fn worst_case(&self) -> Duration {
        let per_attempt = self.attempt_timeout + self.delay_after(self.max_attempts);
        per_attempt.saturating_mul(self.max_attempts)
    }
}

/// How a single attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Network, timeout or server-side failure; worth retrying
    Transient(String),
    /// Failure that another attempt will not fix
    Permanent(String),
}

/// Whether an HTTP status from the backend is worth retrying
#[must_use]
pub const fn is_recoverable(status: u16) -> bool {
    status == 429 || (status >= 500 && status < 600)
}

/// Bookkeeping for one retried call
#[derive(Debug, Default)]
struct RetryState {
    attempt: u32,
    last_error: Option<String>,
}

impl RetryState {
    fn unavailable(self) -> Error {
        Error::BackendUnavailable {
            attempts: self.attempt,
            last_error: self
                .last_error
                .unwrap_or_else(|| "no attempt made".to_string()),
        }
    }
}

/// Run `attempt` until it succeeds, fails permanently, or the policy is exhausted
///
/// Each attempt is bounded by `policy.attempt_timeout`. Cancellation is
/// observed between attempts and during backoff; an attempt already in flight
/// runs to completion or timeout. Returns the value and the number of attempts
/// made.
///
/// # Errors
///
/// Returns `Error::BackendUnavailable` with the last failure once attempts are
/// exhausted, on a permanent failure, or when cancelled.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<(T, u32)>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    let mut state = RetryState::default();

    while state.attempt < policy.max_attempts {
        if cancel.is_cancelled() {
            state.last_error = Some("cancelled".to_string());
            return Err(state.unavailable());
        }

        state.attempt += 1;
        let outcome = match tokio::time::timeout(policy.attempt_timeout, attempt(state.attempt)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(AttemptError::Transient(format!(
                "attempt timed out after {:?}",
                policy.attempt_timeout
            ))),
        };

        match outcome {
            Ok(value) => return Ok((value, state.attempt)),
            Err(AttemptError::Permanent(e)) => {
                tracing::warn!(attempt = state.attempt, error = %e, "backend call failed permanently");
                state.last_error = Some(e);
                return Err(state.unavailable());
            }
            Err(AttemptError::Transient(e)) => {
                tracing::warn!(attempt = state.attempt, error = %e, "backend call failed");
                state.last_error = Some(e);

                if state.attempt < policy.max_attempts {
                    let delay = policy.delay_after(state.attempt);
                    tokio::select! {
                        () = cancel.cancelled() => {
                            tracing::debug!(attempt = state.attempt, "retry cancelled during backoff");
                            return Err(state.unavailable());
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    tracing::error!(
        attempts = state.attempt,
        error = state.last_error.as_deref().unwrap_or_default(),
        "backend call failed after retries"
    );
    Err(state.unavailable())
}
