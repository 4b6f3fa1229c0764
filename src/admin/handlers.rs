use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::http::server::AppState;
use crate::resilience::circuit_breaker::BreakerSnapshot;
use crate::resilience::rate_limiter::RateLimitUsage;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub services: usize,
    pub instances: usize,
    pub registry_url: Option<String>,
    pub bootstrap_servers: Option<String>,
    pub schema_registry_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub enabled: bool,
    #[serde(flatten)]
    pub usage: Option<RateLimitUsage>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let inner = state.inner.load();
    let discovery = &inner.config.discovery;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        services: state.registry.service_names().len(),
        instances: state.registry.len(),
        registry_url: discovery.registry_url.clone(),
        bootstrap_servers: discovery.bootstrap_servers.clone(),
        schema_registry_url: discovery.schema_registry_url.clone(),
    })
}

pub async fn get_breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.inner.load().client.breaker_snapshots())
}

pub async fn get_rate_limit(State(state): State<AppState>) -> Json<RateLimitStatus> {
    let usage = state.inner.load().client.rate_limit_usage();
    Json(RateLimitStatus {
        enabled: usage.is_some(),
        usage,
    })
}
