//! Startup orchestration.
//!
//! Config first (file when a path is given, environment otherwise), then
//! logging and metrics, then the listener. Any failure here is fatal.

use std::path::Path;

use tokio::net::TcpListener;

use crate::config::{load_config, load_from_env, ConfigError, GatewayConfig};
use crate::observability::{logging, metrics};

pub fn resolve_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => load_from_env(),
    }
}

/// Install logging and, when enabled, the Prometheus exporter.
pub fn init_observability(config: &GatewayConfig) {
    logging::init(&config.observability);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }
}

pub async fn bind(config: &GatewayConfig) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");
    Ok(listener)
}
