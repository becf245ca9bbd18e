// src/retry/strategy.rs

use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryStrategy {
    config: RetryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Run `f` until it succeeds, the attempts run out or `should_retry`
    /// ends the loop early. Each attempt's future is dropped before the
    /// backoff sleep starts.
    pub async fn execute_with_decision<F, Fut, T, E>(
        &self,
        mut f: F,
        should_retry: impl Fn(&E) -> RetryDecision,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            let error = match f().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if let RetryDecision::NoRetry = should_retry(&error) {
                debug!("Not retrying: {}", error);
                return Err(error);
            }
            if attempt >= max_attempts {
                warn!("Giving up after {} attempt(s): {}", attempt, error);
                return Err(error);
            }

            let backoff = self.calculate_backoff(attempt);
            debug!(
                "Attempt {}/{} failed: {}. Retrying in {:?}",
                attempt, max_attempts, error, backoff
            );
            sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Exponential backoff after the `attempt`-th failure (1-based):
    /// base, 2 * base, 4 * base, ... capped at the configured maximum.
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base().as_millis() as u64;
        let max = self.config.backoff_max().as_millis() as u64;

        let exponential = base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));

        Duration::from_millis(exponential.min(max))
    }
}
