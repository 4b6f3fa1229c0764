//! Resilient gateway binary.
//!
//! Serves the service registry (`/services`), the gateway (`/api/...`) and,
//! when enabled, the admin API on one listener.

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;

use resilient_gateway::config::ConfigWatcher;
use resilient_gateway::lifecycle::{signals, startup, Shutdown};
use resilient_gateway::HttpServer;

#[derive(Parser)]
#[command(name = "resilient-gateway", version)]
#[command(about = "API gateway with an embedded service registry", long_about = None)]
struct Args {
    /// TOML config file. Without it, defaults plus GATEWAY_* variables apply.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = startup::resolve_config(args.config.as_deref())?;
    startup::init_observability(&config);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resilient-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        eviction_enabled = config.registry.eviction_enabled,
        rate_limit = config.rate_limit.max_requests,
        "Configuration loaded"
    );

    let listener = startup::bind(&config).await?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    // The watcher must stay alive for reloads to keep flowing.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            (Some(watcher.run()?), rx)
        }
        None => {
            let (_, rx) = mpsc::unbounded_channel();
            (None, rx)
        }
    };

    let server = HttpServer::new(config);
    server.run(listener, config_updates, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
