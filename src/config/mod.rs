//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, apply GATEWAY_* env overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of the resilience state in the HTTP server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, load_from_env, ConfigError};
pub use watcher::ConfigWatcher;
pub use schema::{
    AdminConfig, CircuitBreakerConfig, DiscoveryConfig, ForwardingConfig, GatewayConfig,
    ListenerConfig, LoadBalancing, ObservabilityConfig, RateLimitConfig, RegistryConfig,
    RetryConfig, TimeoutConfig,
};
