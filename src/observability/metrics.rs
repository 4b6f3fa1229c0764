//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): forwarded requests by method, status, service
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency by method, service
//! - `gateway_rate_limited_total` (counter): attempts rejected by the limiter
//! - `gateway_retries_total` (counter): retry attempts by endpoint
//! - `gateway_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `registry_instances` (gauge): registered instances
//! - `registry_evictions_total` (counter): instances evicted for expired leases
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter, so
//! tests and library users pay nothing.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install Prometheus exporter"),
    }
}

pub fn record_request(method: &str, status: u16, service: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "service" => service.to_string()
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "service" => service.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("gateway_rate_limited_total").increment(1);
}

pub fn record_retry(endpoint: &str) {
    counter!("gateway_retries_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub fn record_circuit_state(endpoint: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("gateway_circuit_state", "endpoint" => endpoint.to_string()).set(value);
}

pub fn record_registry_size(instances: usize) {
    gauge!("registry_instances").set(instances as f64);
}

pub fn record_evictions(count: usize) {
    counter!("registry_evictions_total").increment(count as u64);
}
