// Bounded retry policy for gateway calls

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::error::{TradingError, TradingResult};

/// Retry with fixed or exponential delay.
///
/// Only transport failures (`TradingError::is_retryable`) are retried; any
/// other error is returned as-is on the attempt that produced it. The
/// operation closure is invoked once per attempt so every attempt builds and
/// signs a fresh request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier: backoff_multiplier.max(1.0),
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, delay, delay, 1.0)
    }

    /// Single attempt, used for non-idempotent calls such as order placement
    pub fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = (self.base_delay.as_millis() as f64 * factor) as u64;
        std::cmp::min(Duration::from_millis(millis), self.max_delay)
    }

    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> TradingResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = TradingResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) => {
                    if attempt >= self.max_attempts {
                        return Err(TradingError::Transport {
                            operation: operation_name.to_string(),
                            attempts: attempt,
                            message: error.to_string(),
                        });
                    }

                    let delay = self.delay_after(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        ?delay,
                        %error,
                        "request failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}
