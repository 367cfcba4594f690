//! Bounded retry with a fixed delay and an overall time budget.

use crate::error::{IndexerError, IndexerResult};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// How many times to try an operation, how long to wait between attempts and
/// how long all attempts together may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
    timeout: Duration,
}

impl RetryPolicy {
    /// Create a policy. `attempts` counts the first try; zero is treated as one.
    #[must_use]
    pub const fn new(attempts: u32, delay: Duration, timeout: Duration) -> Self {
        Self {
            attempts,
            delay,
            timeout,
        }
    }

    /// Maximum number of attempts.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Pause between attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Overall budget across all attempts.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `op`, retrying every failure.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or
    /// [`IndexerError::TimeoutError`] when the overall budget runs out first.
    pub async fn run<T, F, Fut>(&self, label: &str, op: F) -> IndexerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = IndexerResult<T>>,
    {
        self.run_if(label, op, |_| true).await
    }

    /// Run `op`, retrying only failures for which `retryable` returns true.
    ///
    /// # Errors
    ///
    /// Same as [`RetryPolicy::run`]; a non-retryable error is returned at once.
    pub async fn run_if<T, F, Fut, P>(&self, label: &str, mut op: F, retryable: P) -> IndexerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = IndexerResult<T>>,
        P: Fn(&IndexerError) -> bool,
    {
        let attempts = self.attempts.max(1);

        let attempt_loop = async {
            let mut attempt = 0u32;
            loop {
                attempt += 1;
                match op().await {
                    Ok(value) => return Ok(value),
                    Err(e) if attempt < attempts && retryable(&e) => {
                        debug!(
                            op = label,
                            attempt,
                            max_attempts = attempts,
                            error = %e,
                            "Attempt failed, retrying"
                        );
                        tokio::time::sleep(self.delay).await;
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        tokio::time::timeout(self.timeout, attempt_loop)
            .await
            .unwrap_or_else(|_| {
                Err(IndexerError::timeout(format!(
                    "{label} did not complete within {}ms",
                    self.timeout.as_millis()
                )))
            })
    }
}
