//! Sliding-window rate limiter.
//!
//! Keeps the timestamps of admitted calls inside the trailing window. A call
//! is admitted while fewer than `max_requests` timestamps remain after
//! pruning; otherwise it is rejected immediately. There is no queueing.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::GatewayError;
use crate::observability::metrics;

/// Current window usage, for the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitUsage {
    pub max_requests: u32,
    pub window_ms: u64,
    pub in_window: usize,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            admitted: Mutex::new(VecDeque::with_capacity(max_requests as usize)),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window())
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.admitted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop timestamps that fell out of the window ending at `now`.
    /// The window is `(now - window, now]`, so an entry exactly `window` old
    /// has expired.
    fn prune(&self, admitted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = admitted.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }

    /// Try to admit one call at the current instant.
    pub fn try_acquire(&self) -> Result<(), GatewayError> {
        let now = Instant::now();
        let mut admitted = self.lock();
        self.prune(&mut admitted, now);

        if admitted.len() < self.max_requests as usize {
            admitted.push_back(now);
            Ok(())
        } else {
            drop(admitted);
            tracing::warn!(
                max_requests = self.max_requests,
                window_ms = self.window.as_millis() as u64,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited();
            Err(GatewayError::RateLimitExceeded {
                max_requests: self.max_requests,
                window_ms: self.window.as_millis() as u64,
            })
        }
    }

    /// Run `op` if admitted. A rejected call never runs `op`.
    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        self.try_acquire()?;
        op().await
    }

    pub fn usage(&self) -> RateLimitUsage {
        let now = Instant::now();
        let mut admitted = self.lock();
        self.prune(&mut admitted, now);
        RateLimitUsage {
            max_requests: self.max_requests,
            window_ms: self.window.as_millis() as u64,
            in_window: admitted.len(),
        }
    }
}
