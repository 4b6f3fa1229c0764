//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call:
//!     → client.rs (fixed composition order)
//!     → retries.rs + backoff.rs (bounded retries, exponential delays)
//!     → rate_limiter.rs (sliding-window admission)
//!     → circuit_breaker.rs (per-endpoint failure tracking, fail fast)
//!     → timeouts.rs (per-attempt deadline, applied by the caller's op)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every forwarded attempt has a deadline
//! - Retries only for allow-listed error kinds
//! - Circuit breaker prevents cascading failures
//! - A rate-limit rejection never counts against a breaker

pub mod backoff;
pub mod circuit_breaker;
pub mod client;
pub mod rate_limiter;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakers, CircuitState};
pub use client::ResilientClient;
pub use rate_limiter::RateLimiter;
pub use retries::RetryExecutor;
pub use timeouts::with_timeout;
