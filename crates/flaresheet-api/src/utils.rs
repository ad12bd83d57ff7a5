//! Retry helpers shared by the provider and destination clients

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::Retryable;

/// Bounded retry policy with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Whether to double the delay after each retry
    pub exponential_backoff: bool,
    /// Whether to add up to 50% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            exponential_backoff: true,
            jitter: true,
        }
    }
}

/// Why a retried operation gave up
#[derive(Debug)]
pub struct RetryFailure<E> {
    /// Attempts actually made
    pub attempts: u32,
    /// `true` when the last error was transient and the ceiling was hit
    pub exhausted: bool,
    pub error: E,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            exponential_backoff: true,
            jitter: false,
        }
    }

    /// Policy that retries without sleeping, for tests and dry runs
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_backoff: false,
            jitter: false,
        }
    }

    /// Delay to wait after the given failed attempt (1-based), before jitter
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if !self.exponential_backoff {
            return self.initial_delay.min(self.max_delay);
        }
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let millis = delay.as_millis() as u64;
        if !self.jitter || millis < 2 {
            return delay;
        }
        let extra = rand::rng().random_range(0..=millis / 2);
        delay + Duration::from_millis(extra)
    }

    /// Executes an operation, retrying transient failures
    ///
    /// Fatal errors are returned after the attempt that produced them.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use flaresheet_api::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// let body = policy.retry("zone analytics", || async {
    ///     client.post_query(&query).await
    /// }).await?;
    /// ```
    pub async fn retry<F, Fut, T, E>(&self, what: &str, operation: F) -> Result<T, RetryFailure<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_transient() => {
                    tracing::debug!(what, attempt, error = %e, "Non-retriable failure");
                    return Err(RetryFailure {
                        attempts: attempt,
                        exhausted: false,
                        error: e,
                    });
                }
                Err(e) if attempt >= max_attempts => {
                    tracing::warn!(what, attempt, error = %e, "Retry ceiling reached");
                    return Err(RetryFailure {
                        attempts: attempt,
                        exhausted: true,
                        error: e,
                    });
                }
                Err(e) => {
                    let delay = self.jittered(self.backoff_for(attempt));
                    tracing::warn!(
                        what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
