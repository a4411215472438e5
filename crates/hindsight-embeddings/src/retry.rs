//! Bounded retry with exponential backoff
//!
//! Only errors reporting [`EmbeddingError::is_retryable`] (transport failures and
//! HTTP 5xx) are retried. The first delay is `base_delay` and doubles after each
//! retry, so `max_retries = 3` allows at most 4 attempts with waits of
//! `base`, `2×base`, `4×base`.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{EmbeddingError, Result};

/// Retry settings for one backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first
    pub max_retries: u32,
    /// Wait before the first retry
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Upper bound on attempts for one call
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.checked_pow(retry).unwrap_or(u32::MAX))
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_with_sleep(operation, op, tokio::time::sleep).await
    }

    /// Same as [`run`](Self::run) with a caller-supplied wait
    pub async fn run_with_sleep<T, F, Fut, S, SFut>(
        &self,
        operation: &str,
        mut op: F,
        mut sleep: S,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        S: FnMut(Duration) -> SFut,
        SFut: Future<Output = ()>,
    {
        let mut retry_delay = self.base_delay;
        let mut attempt: u32 = 0;

        loop {
            let error: EmbeddingError = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_retryable() || attempt >= self.max_retries {
                return Err(error);
            }

            attempt += 1;
            warn!(
                operation,
                attempt,
                max_attempts = self.max_attempts(),
                delay_ms = retry_delay.as_millis() as u64,
                error = %error,
                "Embeddings request failed, retrying"
            );
            sleep(retry_delay).await;
            retry_delay = retry_delay.saturating_mul(2);
        }
    }
}
