//! Bounded retry for analysis calls.
//!
//! Only transient failures (`Unavailable`, `Timeout`) are retried, and
//! at most `max_retries` extra attempts are made. Everything else
//! surfaces immediately.

use crate::analysis::AnalysisError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Whether `attempt` (0-based) should be followed by another try
    pub fn should_retry(&self, error: &AnalysisError, attempt: u32) -> bool {
        error.is_retryable() && attempt < self.max_retries
    }

    /// Exponential backoff: base, 2x base, 4x base, ...
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(multiplier)
    }

    /// Run `op` until it succeeds or retries run out
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, AnalysisError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AnalysisError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if self.should_retry(&error, attempt) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Analysis attempt failed, retrying: {}",
                        error
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
