// Retry Strategy - Exponential backoff with jitter for screening calls

use crate::error::ScreeningError;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,       // 1 second
            max_delay_ms: 10000,          // 10 seconds
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,           // 10% jitter
        }
    }
}

/// A failed attempt, with the server's retry hint when it sent one
#[derive(Debug, Clone)]
pub struct AttemptError {
    pub error: ScreeningError,
    pub retry_after: Option<Duration>,
}

impl From<ScreeningError> for AttemptError {
    fn from(error: ScreeningError) -> Self {
        Self {
            error,
            retry_after: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryStrategy {
    config: RetryConfig,
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Calculate delay for nth retry with exponential backoff + jitter
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay_ms as f64
            * self.config.backoff_multiplier.powi(attempt as i32);

        // Cap at max_delay
        let capped_delay = base_delay.min(self.config.max_delay_ms as f64);

        let jitter_range = capped_delay * self.config.jitter_factor;
        let jitter = (rand::random::<f64>() - 0.5) * jitter_range * 2.0;
        let final_delay = (capped_delay + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }

    /// The server hint is a lower bound on the wait; the caller's deadline
    /// is the upper bound
    fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.calculate_delay(attempt);
        match retry_after {
            Some(hint) => hint.max(backoff),
            None => backoff,
        }
    }

    /// Execute operation with retry logic
    pub async fn execute_with_retry<F, Fut, T>(
        &self,
        operation: F,
        operation_name: &str,
    ) -> Result<T, ScreeningError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            "Operation {} succeeded on retry attempt {}/{}",
                            operation_name, attempt, self.config.max_retries
                        );
                    }
                    return Ok(result);
                }
                Err(AttemptError { error, retry_after }) => {
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    if attempt >= self.config.max_retries {
                        warn!(
                            "Giving up on {} after {} attempts: {}",
                            operation_name,
                            attempt + 1,
                            error
                        );
                        return Err(error);
                    }

                    let delay = self.delay_for(attempt, retry_after);
                    warn!(
                        "Attempt {}/{} failed for {}: {}; retrying in {:?}",
                        attempt + 1,
                        self.config.max_retries + 1,
                        operation_name,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
