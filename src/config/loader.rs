//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {var}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file, then apply
/// environment overrides.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: GatewayConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build a configuration from defaults plus environment overrides only.
pub fn load_from_env() -> Result<GatewayConfig, ConfigError> {
    let mut config = GatewayConfig::default();
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply `GATEWAY_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("GATEWAY_REGISTRY_URL") {
        config.discovery.registry_url = Some(v);
    }
    if let Some(v) = lookup("GATEWAY_BOOTSTRAP_SERVERS") {
        config.discovery.bootstrap_servers = Some(v);
    }
    if let Some(v) = lookup("GATEWAY_SCHEMA_REGISTRY_URL") {
        config.discovery.schema_registry_url = Some(v);
    }

    override_parsed(&lookup, "GATEWAY_RATE_LIMIT_MAX_REQUESTS", &mut config.rate_limit.max_requests)?;
    override_parsed(&lookup, "GATEWAY_RATE_LIMIT_WINDOW_MS", &mut config.rate_limit.window_ms)?;
    override_parsed(
        &lookup,
        "GATEWAY_CB_FAILURE_THRESHOLD",
        &mut config.circuit_breaker.failure_threshold,
    )?;
    override_parsed(
        &lookup,
        "GATEWAY_CB_RESET_TIMEOUT_MS",
        &mut config.circuit_breaker.reset_timeout_ms,
    )?;
    override_parsed(&lookup, "GATEWAY_RETRY_MAX_ATTEMPTS", &mut config.retries.max_attempts)?;
    override_parsed(&lookup, "GATEWAY_RETRY_INITIAL_DELAY_MS", &mut config.retries.initial_delay_ms)?;
    override_parsed(&lookup, "GATEWAY_RETRY_MAX_DELAY_MS", &mut config.retries.max_delay_ms)?;
    override_parsed(
        &lookup,
        "GATEWAY_RETRY_BACKOFF_MULTIPLIER",
        &mut config.retries.backoff_multiplier,
    )?;

    Ok(())
}

fn override_parsed<F, T>(lookup: &F, var: &'static str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(var) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Env { var, value: raw.clone() })?;
    }
    Ok(())
}
