//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: downstream assumed down, calls fail fast
//! - Half-Open: a single trial call tests whether it recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold
//! Open → Half-Open: more than reset_timeout since the last failure
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails
//! ```
//!
//! # Design Decisions
//! - Per-endpoint circuit breaker (not global), see [`CircuitBreakers`]
//! - The lock covers the admission decision and outcome recording only,
//!   never the wrapped call
//! - Errors are recorded and returned unchanged

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::error::GatewayError;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

/// Point-in-time view of a breaker, for the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub endpoint: String,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Milliseconds since the last recorded failure.
    pub last_failure_ms_ago: Option<u64>,
}

/// Failure-threshold state machine guarding calls to one endpoint.
#[derive(Debug)]
pub struct CircuitBreaker {
    endpoint: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(endpoint: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: config.reset_timeout(),
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Current failure count.
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            endpoint: self.endpoint.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_ms_ago: inner
                .last_failure
                .map(|t| Instant::now().saturating_duration_since(t).as_millis() as u64),
        }
    }

    /// Decide whether a call may proceed.
    ///
    /// The returned permit must be settled with [`BreakerPermit::success`] or
    /// [`BreakerPermit::failure`]; dropping it unsettled releases a half-open
    /// trial slot without recording an outcome.
    pub fn try_acquire(&self) -> Result<BreakerPermit<'_>, GatewayError> {
        let mut inner = self.lock();
        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| Instant::now().saturating_duration_since(t));
                match elapsed {
                    Some(elapsed) if elapsed <= self.reset_timeout => {
                        return Err(self.open_error());
                    }
                    _ => {
                        inner.state = CircuitState::HalfOpen;
                        inner.trial_in_flight = true;
                        tracing::info!(endpoint = %self.endpoint, "Circuit breaker half-open, allowing trial call");
                        metrics::record_circuit_state(&self.endpoint, CircuitState::HalfOpen);
                        true
                    }
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(self.open_error());
                }
                inner.trial_in_flight = true;
                true
            }
        };

        Ok(BreakerPermit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    /// Run `op` under the breaker. Errors from `op` are recorded as failures
    /// and returned unchanged.
    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let permit = self.try_acquire()?;
        match op().await {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(err) => {
                permit.failure();
                Err(err)
            }
        }
    }

    fn open_error(&self) -> GatewayError {
        GatewayError::CircuitOpen {
            endpoint: self.endpoint.clone(),
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
        inner.trial_in_flight = false;
        drop(inner);

        if previous != CircuitState::Closed {
            tracing::info!(endpoint = %self.endpoint, from = ?previous, "Circuit breaker closed");
            metrics::record_circuit_state(&self.endpoint, CircuitState::Closed);
        }
    }

    /// Calls admitted before the breaker opened can fail late. Those do not
    /// move the reset timer, and only the trial settles a half-open breaker.
    fn on_failure(&self, trial: bool) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Open => return,
            CircuitState::HalfOpen if !trial => return,
            _ => {}
        }
        inner.failure_count = (inner.failure_count + 1).min(self.failure_threshold);
        inner.last_failure = Some(Instant::now());
        inner.trial_in_flight = false;

        let should_open = inner.state != CircuitState::Open
            && inner.failure_count >= self.failure_threshold;
        if should_open {
            let previous = inner.state;
            inner.state = CircuitState::Open;
            let failures = inner.failure_count;
            drop(inner);

            tracing::warn!(
                endpoint = %self.endpoint,
                from = ?previous,
                failure_count = failures,
                threshold = self.failure_threshold,
                "Circuit breaker opened"
            );
            metrics::record_circuit_state(&self.endpoint, CircuitState::Open);
        }
    }

    fn release_trial(&self) {
        self.lock().trial_in_flight = false;
    }
}

/// Admission granted by [`CircuitBreaker::try_acquire`].
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    /// Whether this permit is the half-open trial call.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success();
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial();
        }
    }
}

/// Lazily-created breakers keyed by endpoint.
#[derive(Debug)]
pub struct CircuitBreakers {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakers {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Breaker for `endpoint`, created closed on first use.
    pub fn get(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(endpoint) {
            return Arc::clone(existing.value());
        }
        self.breakers
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(endpoint, &self.config)))
            .value()
            .clone()
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "http://10.0.0.1:8080",
            &CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout_ms: reset_ms,
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) -> GatewayError {
        cb.call(|| async { Err::<(), _>(GatewayError::Upstream("boom".into())) })
            .await
            .unwrap_err()
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<u32, GatewayError> {
        cb.call(|| async { Ok(7) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_failures() {
        let cb = breaker(3, 1000);

        for _ in 0..2 {
            assert!(matches!(fail(&cb).await, GatewayError::Upstream(_)));
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.failure_count(), 3);

        let err = succeed(&cb).await.unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_count_is_capped() {
        let cb = breaker(2, 1000);
        for _ in 0..2 {
            fail(&cb).await;
        }
        // Already open: further attempts are rejected before running.
        for _ in 0..5 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.failure_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_reset_timeout() {
        let cb = breaker(1, 500);
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(400)).await;
        assert!(succeed(&cb).await.is_err());

        tokio::time::advance(Duration::from_millis(101)).await;
        let permit = cb.try_acquire().unwrap();
        assert!(permit.is_trial());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // Only one trial at a time.
        assert!(matches!(cb.try_acquire(), Err(GatewayError::CircuitOpen { .. })));

        permit.success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trial_failure_reopens() {
        let cb = breaker(2, 100);
        fail(&cb).await;
        fail(&cb).await;

        tokio::time::advance(Duration::from_millis(150)).await;
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.failure_count(), 2);

        // The reset timer restarts from the trial failure.
        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(succeed(&cb).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failures_when_closed() {
        let cb = breaker(3, 100);
        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(succeed(&cb).await.unwrap(), 7);
        assert_eq!(cb.failure_count(), 0);

        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_releases_slot() {
        let cb = breaker(1, 100);
        fail(&cb).await;
        tokio::time::advance(Duration::from_millis(101)).await;

        let permit = cb.try_acquire().unwrap();
        drop(permit);
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let permit = cb.try_acquire().unwrap();
        assert!(permit.is_trial());
        permit.success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_failure_does_not_extend_open_period() {
        let cb = breaker(1, 100);
        let slow = cb.try_acquire().unwrap();
        assert!(!slow.is_trial());

        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_millis(80)).await;
        slow.failure();
        assert_eq!(cb.state(), CircuitState::Open);

        // Timer still counts from the failure that opened the breaker.
        tokio::time::advance(Duration::from_millis(21)).await;
        let trial = cb.try_acquire().unwrap();
        assert!(trial.is_trial());

        trial.success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_failure_does_not_settle_half_open() {
        let cb = breaker(1, 100);
        let slow = cb.try_acquire().unwrap();
        fail(&cb).await;
        tokio::time::advance(Duration::from_millis(101)).await;

        let trial = cb.try_acquire().unwrap();
        slow.failure();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(matches!(cb.try_acquire(), Err(GatewayError::CircuitOpen { .. })));

        trial.success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_breakers_are_per_endpoint() {
        let breakers = CircuitBreakers::new(CircuitBreakerConfig::default());
        let a = breakers.get("a");
        let a_again = breakers.get("a");
        let b = breakers.get("b");
        assert!(Arc::ptr_eq(&a, &a_again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(breakers.snapshots().len(), 2);
    }
}
