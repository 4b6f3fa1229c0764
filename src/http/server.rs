//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, limits, request ID, overall deadline)
//! - Bind server to listener
//! - Run background tasks (lease eviction, config reload)
//! - Drain in-flight requests on shutdown
//!
//! # Reload
//! Everything read through `AppState` follows a reload: forwarding, limits,
//! retries, breakers, admin access and the eviction policy. The listener,
//! concurrency limit, remote registry and observability are fixed at startup.

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    http::Request,
    routing::get,
    Json, Router,
};
use hyper_util::{client::legacy::Client, client::legacy::connect::HttpConnector, rt::TokioExecutor};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::admin::setup_admin_router;
use crate::config::{GatewayConfig, RegistryConfig};
use crate::discovery::{RegistryClient, ServiceDiscovery};
use crate::http::proxy::{gateway_handler, UpstreamClient};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::lifecycle::Shutdown;
use crate::load_balancer::{self, LoadBalancer};
use crate::registry::{registry_router, EvictionTask, ServiceRegistry};
use crate::resilience::ResilientClient;

/// Reloadable part of the state, swapped wholesale on config change.
#[derive(Debug)]
pub struct InnerState {
    pub config: GatewayConfig,
    pub client: ResilientClient,
    pub balancer: Arc<dyn LoadBalancer>,
}

impl InnerState {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            client: ResilientClient::from_config(&config),
            balancer: load_balancer::from_strategy(config.gateway.load_balancing),
            config,
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<InnerState>>,
    pub registry: Arc<ServiceRegistry>,
    /// Registry settings shared with the eviction task.
    pub registry_config: Arc<ArcSwap<RegistryConfig>>,
    pub discovery: Arc<dyn ServiceDiscovery>,
    pub http: UpstreamClient,
}

impl AppState {
    pub fn new(config: GatewayConfig, registry: Arc<ServiceRegistry>) -> Self {
        let discovery: Arc<dyn ServiceDiscovery> = match &config.discovery.registry_url {
            Some(url) => {
                tracing::info!(registry_url = %url, "Resolving services through remote registry");
                Arc::new(RegistryClient::new(url))
            }
            None => registry.clone(),
        };

        let http = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            registry_config: Arc::new(ArcSwap::from_pointee(config.registry.clone())),
            inner: Arc::new(ArcSwap::from_pointee(InnerState::new(config))),
            registry,
            discovery,
            http,
        }
    }

    /// Swap in a new configuration. Breaker and limiter state restart.
    pub fn apply_config(&self, config: GatewayConfig) {
        for field in restart_only_changes(&self.inner.load().config, &config) {
            tracing::warn!(field, "Setting changed but only applies after a restart");
        }
        self.registry_config.store(Arc::new(config.registry.clone()));
        self.inner.store(Arc::new(InnerState::new(config)));
        tracing::info!("Configuration reloaded");
    }
}

/// Fields that differ between `current` and `next` but are only read at
/// startup.
pub fn restart_only_changes(current: &GatewayConfig, next: &GatewayConfig) -> Vec<&'static str> {
    let checks = [
        (
            "listener.bind_address",
            current.listener.bind_address != next.listener.bind_address,
        ),
        (
            "listener.max_connections",
            current.listener.max_connections != next.listener.max_connections,
        ),
        (
            "discovery.registry_url",
            current.discovery.registry_url != next.discovery.registry_url,
        ),
        (
            "observability.log_level",
            current.observability.log_level != next.observability.log_level,
        ),
        (
            "observability.metrics_enabled",
            current.observability.metrics_enabled != next.observability.metrics_enabled,
        ),
        (
            "observability.metrics_address",
            current.observability.metrics_address != next.observability.metrics_address,
        ),
    ];
    checks
        .into_iter()
        .filter_map(|(field, changed)| changed.then_some(field))
        .collect()
}

/// HTTP server for the gateway and the registry.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with an empty local registry.
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_registry(config, Arc::new(ServiceRegistry::new()))
    }

    pub fn with_registry(config: GatewayConfig, registry: Arc<ServiceRegistry>) -> Self {
        let state = AppState::new(config.clone(), registry);
        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            config,
            state,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let gateway = get(gateway_handler)
            .post(gateway_handler)
            .put(gateway_handler)
            .delete(gateway_handler);

        Router::new()
            .route("/health", get(health))
            .route("/api", gateway.clone())
            .route("/api/", gateway.clone())
            .route("/api/{*path}", gateway)
            .with_state(state.clone())
            .merge(registry_router(state.registry.clone()))
            .merge(setup_admin_router(state))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request.request_id(),
                )
            }))
            .layer(set_request_id_layer())
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections))
    }

    /// The fully layered router, for serving or in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires. Configs arriving on `config_updates` are applied
    /// to the live state.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let eviction = EvictionTask::new(
            self.state.registry.clone(),
            self.state.registry_config.clone(),
        );
        tokio::spawn(eviction.run(shutdown.subscribe()));

        let state = self.state.clone();
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = config_updates.recv() => match update {
                        Some(config) => state.apply_config(config),
                        None => break,
                    },
                    _ = stop.recv() => break,
                }
            }
        });

        let mut stop = shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "UP" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InstanceStatus, RegistrationRequest};
    use axum::body::Bytes;
    use axum::http::{header, Method, StatusCode};
    use std::time::Duration;
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let server = HttpServer::new(GatewayConfig::default());
        let response = server.router().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(body_json(response).await["status"], "UP");
    }

    #[tokio::test]
    async fn test_unknown_service_is_503() {
        let server = HttpServer::new(GatewayConfig::default());
        let response = server
            .router()
            .oneshot(get_request("/api/proj1/foo/bar"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["error"], "ServiceNotFound");
        assert!(json["message"].as_str().unwrap().contains("proj1-foo"));
    }

    #[tokio::test]
    async fn test_missing_segments_are_400() {
        let server = HttpServer::new(GatewayConfig::default());
        for uri in ["/api", "/api/"] {
            let response = server.router().oneshot(get_request(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body_json(response).await["error"], "InvalidProject");
        }

        let response = server.router().oneshot(get_request("/api/proj1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "InvalidService");
    }

    #[tokio::test]
    async fn test_instances_not_up_are_unavailable() {
        let registry = Arc::new(ServiceRegistry::new());
        let instance = registry
            .register(RegistrationRequest::new("proj1-foo", "127.0.0.1", 9))
            .unwrap();
        registry
            .update_status(&instance.id, InstanceStatus::Down)
            .unwrap();
        let server = HttpServer::with_registry(GatewayConfig::default(), registry);

        let response = server
            .router()
            .oneshot(get_request("/api/proj1/foo/x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_registry_routes_are_mounted() {
        let server = HttpServer::new(GatewayConfig::default());
        let response = server.router().oneshot(get_request("/services")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_apply_config_swaps_state() {
        let server = HttpServer::new(GatewayConfig::default());
        let mut config = GatewayConfig::default();
        config.rate_limit.max_requests = 7;
        server.state().apply_config(config);

        let inner = server.state().inner.load();
        assert_eq!(inner.config.rate_limit.max_requests, 7);
        assert_eq!(inner.client.rate_limit_usage().unwrap().max_requests, 7);
    }

    fn config_without_retries() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.retries.enabled = false;
        config.gateway.max_body_size = 1000;
        config
    }

    fn server_with_instance(config: GatewayConfig, port: u16) -> HttpServer {
        let registry = Arc::new(ServiceRegistry::new());
        registry
            .register(RegistrationRequest::new("proj1-foo", "127.0.0.1", port))
            .unwrap();
        HttpServer::with_registry(config, registry)
    }

    fn post(body: Body, content_length: Option<usize>) -> Request<Body> {
        let mut builder = Request::builder().method(Method::POST).uri("/api/proj1/foo/upload");
        if let Some(len) = content_length {
            builder = builder.header(header::CONTENT_LENGTH, len);
        }
        builder.body(body).unwrap()
    }

    fn chunked(total: usize) -> Body {
        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from(vec![b'x'; total / 2])),
            Ok(Bytes::from(vec![b'x'; total - total / 2])),
        ];
        Body::from_stream(futures_util::stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_oversized_bodies_are_413() {
        let server = server_with_instance(config_without_retries(), 9);

        let response = server.router().oneshot(post(chunked(1200), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body_json(response).await["error"], "PayloadTooLarge");

        let response = server
            .router()
            .oneshot(post(Body::from(vec![b'x'; 1200]), Some(1200)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_reloaded_body_limit_applies() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let backend = Router::new().fallback(|body: Bytes| async move { body.len().to_string() });
        tokio::spawn(async move { axum::serve(listener, backend).await });

        let server = server_with_instance(config_without_retries(), port);
        let response = server.router().oneshot(post(chunked(1200), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let mut config = config_without_retries();
        config.gateway.max_body_size = 4096;
        server.state().apply_config(config);

        let response = server.router().oneshot(post(chunked(1200), None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"1200");
    }

    #[tokio::test]
    async fn test_reloaded_request_deadline_applies() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let backend = Router::new().fallback(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            "late"
        });
        tokio::spawn(async move { axum::serve(listener, backend).await });

        let server = server_with_instance(config_without_retries(), port);
        let mut config = config_without_retries();
        config.timeouts.request_secs = 1;
        server.state().apply_config(config);

        let response = server
            .router()
            .oneshot(get_request("/api/proj1/foo/slow"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body_json(response).await["error"], "GatewayTimeout");
    }

    #[test]
    fn test_apply_config_updates_eviction_policy() {
        let server = HttpServer::new(GatewayConfig::default());
        let mut config = GatewayConfig::default();
        config.registry.lease_duration_secs = 5;
        server.state().apply_config(config);

        assert_eq!(server.state().registry_config.load().lease_duration_secs, 5);
    }

    #[test]
    fn test_restart_only_changes() {
        let current = GatewayConfig::default();
        let mut next = GatewayConfig::default();
        next.rate_limit.max_requests = 1;
        next.admin.enabled = true;
        assert!(restart_only_changes(&current, &next).is_empty());

        next.listener.max_connections = 5;
        next.observability.log_level = "debug".into();
        next.discovery.registry_url = Some("http://registry:8080".into());
        assert_eq!(
            restart_only_changes(&current, &next),
            vec![
                "listener.max_connections",
                "discovery.registry_url",
                "observability.log_level",
            ]
        );
    }
}
