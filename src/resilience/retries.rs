//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether an error is retryable (kind allow-list)
//! - Execute retries with exponential backoff
//! - Wrap the final failure in `MaxRetriesExceeded`
//!
//! # Design Decisions
//! - Non-retryable errors propagate on first occurrence, unwrapped
//! - The wait is a Tokio sleep; dropping the future cancels it

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{ErrorKind, GatewayError};
use crate::resilience::backoff::Backoff;

/// Bounded retry wrapper.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
    retryable: Vec<ErrorKind>,
}

impl RetryExecutor {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: if config.enabled { config.max_attempts.max(1) } else { 1 },
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.backoff_multiplier,
            jitter: config.jitter,
            retryable: config.retryable_errors.clone(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether `err` is in the allow-list.
    pub fn is_retryable(&self, err: &GatewayError) -> bool {
        err.kind().is_some_and(|kind| self.retryable.contains(&kind))
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_delay, self.max_delay, self.multiplier).with_jitter(self.jitter)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` is reached. `label` only feeds logs and metrics.
    pub async fn execute<F, Fut, T>(&self, label: &str, mut op: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut backoff = self.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.is_retryable(&err) {
                return Err(err);
            }

            if attempt >= self.max_attempts {
                tracing::warn!(endpoint = %label, attempts = attempt, error = %err, "Retries exhausted");
                return Err(GatewayError::MaxRetriesExceeded {
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = backoff.next_delay();
            tracing::info!(endpoint = %label, attempt, delay = ?delay, error = %err, "Retrying");
            crate::observability::metrics::record_retry(label);
            tokio::time::sleep(delay).await;
        }
    }
}
