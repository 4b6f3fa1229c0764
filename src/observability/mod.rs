//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! registry, resilience, http
//!     → logging.rs (tracing events to stdout)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! The `x-request-id` header is attached to every forwarded request and
//! appears in request spans, so log lines correlate across hops.

pub mod logging;
pub mod metrics;
