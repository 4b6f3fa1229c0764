//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ErrorKind;

/// Root configuration for the gateway and registry.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Service registry settings (leases, eviction).
    pub registry: RegistryConfig,

    /// External endpoints this deployment talks to.
    pub discovery: DiscoveryConfig,

    /// Request forwarding behaviour.
    pub gateway: ForwardingConfig,

    /// Outbound rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Per-endpoint circuit breaking.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent in-flight requests (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Registry lease and eviction settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Run the background eviction task.
    pub eviction_enabled: bool,

    /// An instance without a heartbeat for this long is expired.
    pub lease_duration_secs: u64,

    /// How often the eviction task scans the registry.
    pub eviction_interval_secs: u64,

    /// How often a heartbeat agent renews its lease.
    pub renewal_interval_secs: u64,

    /// Fraction of instances expected to stay alive. When more than
    /// `1 - threshold` of the registry would expire in one pass, the pass is
    /// skipped. `1.0` disables self-preservation.
    pub self_preservation_threshold: f64,

    /// Self-preservation only applies to registries holding at least this
    /// many instances. Below it, every expired lease is evicted.
    pub self_preservation_min_instances: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            eviction_enabled: true,
            lease_duration_secs: 90,
            eviction_interval_secs: 30,
            renewal_interval_secs: 30,
            self_preservation_threshold: 0.85,
            self_preservation_min_instances: 10,
        }
    }
}

impl RegistryConfig {
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    pub fn renewal_interval(&self) -> Duration {
        Duration::from_secs(self.renewal_interval_secs)
    }
}

/// External endpoints.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Remote registry base URL. When set, the gateway resolves services
    /// through it instead of the in-process registry.
    pub registry_url: Option<String>,

    /// Message broker bootstrap servers, passed through to services.
    pub bootstrap_servers: Option<String>,

    /// Schema registry base URL, passed through to services.
    pub schema_registry_url: Option<String>,
}

/// Load balancing strategy across UP instances of a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancing {
    #[default]
    RoundRobin,
    Random,
}

/// Request forwarding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    pub load_balancing: LoadBalancing,

    /// Maximum buffered request body in bytes.
    pub max_body_size: usize,

    /// Downstream statuses counted as failures by the breaker and retried.
    pub failure_statuses: Vec<u16>,

    /// Retry POST/PUT/DELETE as well. Off by default.
    pub retry_non_idempotent: bool,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            load_balancing: LoadBalancing::RoundRobin,
            max_body_size: 2 * 1024 * 1024, // 2MB
            failure_statuses: vec![502, 503, 504],
            retry_non_idempotent: false,
        }
    }
}

/// Sliding-window rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Maximum admitted calls per window.
    pub max_requests: u32,

    /// Window length in milliseconds.
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_ms: 1000,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,

    /// Time an open breaker waits before allowing a trial call.
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Enable retries.
    pub enabled: bool,

    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,

    /// Factor applied to the delay after each attempt.
    pub backoff_multiplier: f64,

    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,

    /// Error kinds that are retried; everything else fails immediately.
    pub retryable_errors: Vec<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 1000,
            backoff_multiplier: 2.0,
            jitter: false,
            retryable_errors: vec![ErrorKind::Upstream, ErrorKind::Timeout],
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for one forwarded attempt, in seconds.
    pub upstream_secs: u64,

    /// Deadline for the whole inbound request, retries included, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            upstream_secs: 10,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the `/admin` routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
