//! Resilient API gateway and service registry.
//!
//! ```text
//!   client ──▶ /api/{project}/{service}/... ──▶ routing ──▶ discovery ──▶ load_balancer
//!                                                                            │
//!   client ◀── relay status/headers/body ◀── ResilientClient ◀──────────────┘
//!                                            (rate limit → breaker → retry)
//!
//!   instances ──▶ /services (register, heartbeat, status) ──▶ registry ──▶ lease eviction
//! ```

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod routing;

// Service location
pub mod discovery;
pub mod load_balancer;
pub mod registry;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
