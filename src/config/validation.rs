//! Configuration validation.
//!
//! Semantic checks run after serde has accepted the file. All problems are
//! collected so an operator sees every mistake in one pass.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, returning every error found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be > 0"));
    }

    let registry = &config.registry;
    if registry.lease_duration_secs == 0 {
        errors.push(ValidationError::new("registry.lease_duration_secs", "must be > 0"));
    }
    if registry.eviction_interval_secs == 0 {
        errors.push(ValidationError::new("registry.eviction_interval_secs", "must be > 0"));
    }
    if registry.renewal_interval_secs == 0 {
        errors.push(ValidationError::new("registry.renewal_interval_secs", "must be > 0"));
    } else if registry.renewal_interval_secs >= registry.lease_duration_secs {
        errors.push(ValidationError::new(
            "registry.renewal_interval_secs",
            "must be shorter than the lease duration",
        ));
    }
    if !(registry.self_preservation_threshold > 0.0 && registry.self_preservation_threshold <= 1.0) {
        errors.push(ValidationError::new(
            "registry.self_preservation_threshold",
            "must be in (0, 1]",
        ));
    }

    let urls = [
        ("discovery.registry_url", &config.discovery.registry_url),
        ("discovery.schema_registry_url", &config.discovery.schema_registry_url),
    ];
    for (field, value) in urls {
        if let Some(raw) = value {
            if url::Url::parse(raw).is_err() {
                errors.push(ValidationError::new(field, format!("'{}' is not a valid URL", raw)));
            }
        }
    }
    if let Some(servers) = &config.discovery.bootstrap_servers {
        if servers.split(',').any(|s| s.trim().is_empty()) {
            errors.push(ValidationError::new(
                "discovery.bootstrap_servers",
                "must be a comma-separated list of host:port",
            ));
        }
    }

    if config.gateway.max_body_size == 0 {
        errors.push(ValidationError::new("gateway.max_body_size", "must be > 0"));
    }
    for status in &config.gateway.failure_statuses {
        if !(100..=599).contains(status) {
            errors.push(ValidationError::new(
                "gateway.failure_statuses",
                format!("{} is not an HTTP status", status),
            ));
        }
    }

    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::new("rate_limit.max_requests", "must be > 0"));
    }
    if config.rate_limit.window_ms == 0 {
        errors.push(ValidationError::new("rate_limit.window_ms", "must be > 0"));
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be > 0"));
    }

    let retries = &config.retries;
    if retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be >= 1"));
    }
    if retries.initial_delay_ms > retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.initial_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }
    if !(retries.backoff_multiplier >= 1.0 && retries.backoff_multiplier.is_finite()) {
        errors.push(ValidationError::new(
            "retries.backoff_multiplier",
            "must be a finite number >= 1.0",
        ));
    }

    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::new("timeouts.upstream_secs", "must be > 0"));
    }
    if config.timeouts.request_secs < config.timeouts.upstream_secs {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            "must be at least timeouts.upstream_secs",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must be set when admin is enabled"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
