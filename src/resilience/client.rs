//! Resilient outbound call path.
//!
//! # Data Flow
//! ```text
//! call(endpoint, op)
//!     → retries.rs (wraps every attempt below)
//!         → rate_limiter.rs (admission; rejection is not a breaker failure)
//!         → circuit_breaker.rs (per-endpoint gate, records outcome)
//!         → op()
//! ```

use std::future::Future;

use crate::config::{CircuitBreakerConfig, GatewayConfig, RateLimitConfig, RetryConfig};
use crate::error::GatewayError;
use crate::resilience::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakers};
use crate::resilience::rate_limiter::{RateLimitUsage, RateLimiter};
use crate::resilience::retries::RetryExecutor;

/// Composes rate limiting, circuit breaking and retry around outbound calls.
#[derive(Debug)]
pub struct ResilientClient {
    limiter: Option<RateLimiter>,
    breakers: CircuitBreakers,
    retry: RetryExecutor,
}

impl ResilientClient {
    pub fn new(
        rate_limit: &RateLimitConfig,
        circuit_breaker: CircuitBreakerConfig,
        retries: &RetryConfig,
    ) -> Self {
        Self {
            limiter: rate_limit.enabled.then(|| RateLimiter::from_config(rate_limit)),
            breakers: CircuitBreakers::new(circuit_breaker),
            retry: RetryExecutor::new(retries),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            &config.rate_limit,
            config.circuit_breaker.clone(),
            &config.retries,
        )
    }

    fn admit(&self) -> Result<(), GatewayError> {
        match &self.limiter {
            Some(limiter) => limiter.try_acquire(),
            None => Ok(()),
        }
    }

    async fn attempt<Fut, T>(&self, breaker: &CircuitBreaker, fut: Fut) -> Result<T, GatewayError>
    where
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        self.admit()?;
        breaker.call(|| fut).await
    }

    /// Run `op` against `endpoint` with retries. Each attempt passes rate
    /// limiting and the endpoint's breaker before `op`'s future is polled.
    pub async fn call<F, Fut, T>(&self, endpoint: &str, mut op: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let breaker = self.breakers.get(endpoint);
        self.retry
            .execute(endpoint, || self.attempt(&breaker, op()))
            .await
    }

    /// Single attempt: rate limiting and circuit breaking, no retry.
    pub async fn call_once<F, Fut, T>(&self, endpoint: &str, op: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let breaker = self.breakers.get(endpoint);
        self.attempt(&breaker, op()).await
    }

    pub fn breaker(&self, endpoint: &str) -> std::sync::Arc<CircuitBreaker> {
        self.breakers.get(endpoint)
    }

    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        self.breakers.snapshots()
    }

    pub fn rate_limit_usage(&self) -> Option<RateLimitUsage> {
        self.limiter.as_ref().map(RateLimiter::usage)
    }
}
