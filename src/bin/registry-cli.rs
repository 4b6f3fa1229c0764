use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;

use resilient_gateway::discovery::{HeartbeatAgent, RegistryClient};
use resilient_gateway::lifecycle::{signals, Shutdown};
use resilient_gateway::registry::{InstanceStatus, RegistrationRequest};

#[derive(Parser)]
#[command(name = "registry-cli")]
#[command(about = "Management CLI for the service registry and gateway", long_about = None)]
struct Cli {
    #[arg(short, long, env = "REGISTRY_URL", default_value = "http://localhost:8080")]
    url: String,

    /// Admin API key, needed for `breakers`.
    #[arg(short, long, env = "GATEWAY_ADMIN_API_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered instances
    List {
        /// Only instances of this service
        #[arg(short, long)]
        service: Option<String>,
    },
    /// Show one instance
    Get { id: String },
    /// Register an instance
    Register {
        service: String,
        host: String,
        port: u16,
        #[arg(long)]
        id: Option<String>,
        /// Metadata entries as key=value
        #[arg(short, long, value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,
    },
    /// Renew an instance's lease
    Heartbeat { id: String },
    /// Set an instance's status (UP, DOWN, STARTING, OUT_OF_SERVICE, UNKNOWN)
    Status {
        id: String,
        #[arg(value_parser = parse_status)]
        status: InstanceStatus,
    },
    /// Remove an instance
    Deregister { id: String },
    /// Register an instance and keep its lease alive until Ctrl+C
    Announce {
        service: String,
        host: String,
        port: u16,
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
    },
    /// Show circuit breaker state (admin API)
    Breakers,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = RegistryClient::new(&cli.url);

    match cli.command {
        Commands::List { service } => {
            let instances = match service {
                Some(name) => client.list_service(&name).await?,
                None => client.list().await?,
            };
            print_json(&instances)?;
        }
        Commands::Get { id } => print_json(&client.get(&id).await?)?,
        Commands::Register {
            service,
            host,
            port,
            id,
            metadata,
        } => {
            let mut request = RegistrationRequest::new(service, host, port);
            request.id = id;
            request.metadata.extend(metadata);
            print_json(&client.register(&request).await?)?;
        }
        Commands::Heartbeat { id } => print_json(&client.heartbeat(&id).await?)?,
        Commands::Status { id, status } => print_json(&client.update_status(&id, status).await?)?,
        Commands::Deregister { id } => {
            if client.deregister(&id).await? {
                println!("Deregistered {}", id);
            } else {
                eprintln!("Instance {} not found", id);
                std::process::exit(1);
            }
        }
        Commands::Announce {
            service,
            host,
            port,
            id,
            interval_secs,
        } => {
            tracing_subscriber::fmt().with_env_filter("info").init();
            let mut request = RegistrationRequest::new(service, host, port);
            request.id = id;

            let shutdown = Shutdown::new();
            signals::spawn_signal_handler(shutdown.clone());
            let agent = HeartbeatAgent::new(client, request, Duration::from_secs(interval_secs));
            agent.run(shutdown.subscribe()).await;
        }
        Commands::Breakers => print_json(&client.breakers(&cli.key).await?)?,
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", s))
}

fn parse_status(s: &str) -> Result<InstanceStatus, String> {
    serde_json::from_value(serde_json::Value::String(s.to_ascii_uppercase()))
        .map_err(|_| format!("unknown status '{}'", s))
}
