//! Bounded exponential back-off for fallible async operations.
//!
//! [`retry`] runs an operation up to `max_attempts` times. After the n-th
//! failure (0-based) it sleeps `initial_wait * 2^n` before trying again. When
//! the budget is spent it returns [`RetryError::TooManyRetries`], which callers
//! must treat as terminal for that operation.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

/// How many times to try and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    /// Wait after the first failure; doubles after each further failure.
    pub initial_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_wait: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_wait,
        }
    }

    /// A single attempt; failures propagate immediately.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Back-off before the retry that follows failure number `attempt_index` (0-based).
    pub fn wait_for(&self, attempt_index: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt_index).unwrap_or(u32::MAX);
        self.initial_wait.saturating_mul(factor)
    }
}

/// Returned when every attempt failed.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("{operation}: too many retries ({attempts} attempts), last error: {last}")]
    TooManyRetries {
        operation: String,
        attempts: u32,
        #[source]
        last: E,
    },
}

impl<E> RetryError<E> {
    /// The error produced by the final attempt.
    pub fn into_last(self) -> E {
        match self {
            RetryError::TooManyRetries { last, .. } => last,
        }
    }
}

/// Runs `op` under `policy`, sleeping with exponential back-off between failures.
///
/// `operation` is only used for log lines and the final error.
pub async fn retry<T, E, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut failures: u32 = 0;

    loop {
        match op().await {
            Ok(value) => {
                if failures > 0 {
                    info!(operation, failures, "operation succeeded after retries");
                }
                return Ok(value);
            }
            Err(err) => {
                failures += 1;
                warn!(
                    operation,
                    attempt = failures,
                    max_attempts,
                    error = %err,
                    "operation failed"
                );

                if failures >= max_attempts {
                    return Err(RetryError::TooManyRetries {
                        operation: operation.to_string(),
                        attempts: failures,
                        last: err,
                    });
                }

                let wait = policy.wait_for(failures - 1);
                warn!(operation, wait_secs = wait.as_secs_f64(), "retrying");
                tokio::time::sleep(wait).await;
            }
        }
    }
}
