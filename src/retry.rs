//! Fixed-interval retry policy shared by every HTTP call.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_retry2::strategy::FixedInterval;
use tokio_retry2::{Retry, RetryError};

/// Bounded retries with a fixed delay, no jitter and no growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: usize,
    /// Delay between consecutive attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Total number of attempts this policy allows.
    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    fn strategy(&self) -> impl Iterator<Item = Duration> {
        FixedInterval::from_millis(self.backoff.as_millis() as u64).take(self.max_retries)
    }

    /// Runs `op` until it succeeds, fails with an error `is_retryable`
    /// rejects, or attempts run out. The last error is returned.
    pub async fn run<T, E, F, Fut, R>(&self, mut op: F, is_retryable: R) -> Result<T, E>
    where
        F: FnMut() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Debug,
        R: Fn(&E) -> bool + Sync,
    {
        let is_retryable = &is_retryable;
        Retry::spawn(self.strategy(), || {
            let attempt = op();
            async move {
                match attempt.await {
                    Ok(value) => Ok(value),
                    Err(e) if is_retryable(&e) => RetryError::to_transient(e),
                    Err(e) => RetryError::to_permanent(e),
                }
            }
        })
        .await
    }
}
