//! Admin API.
//!
//! ```text
//! GET /admin/status      version, registry counts, discovery endpoints
//! GET /admin/breakers    per-endpoint circuit breaker snapshots
//! GET /admin/rate-limit  limiter window usage
//! ```
//!
//! Always mounted, but answers 404 unless the live config has
//! `admin.enabled`; every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/breakers", get(get_breakers))
        .route("/admin/rate-limit", get(get_rate_limit))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::registry::ServiceRegistry;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let mut config = GatewayConfig::default();
        config.admin.enabled = true;
        config.admin.api_key = "secret".into();
        setup_admin_router(AppState::new(config, Arc::new(ServiceRegistry::new())))
    }

    fn request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_requires_bearer_token() {
        let response = app().oneshot(request("/admin/status", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app().oneshot(request("/admin/status", Some("wrong"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_disabled_admin_is_not_found() {
        let state = AppState::new(GatewayConfig::default(), Arc::new(ServiceRegistry::new()));
        let app = setup_admin_router(state.clone());
        let token = GatewayConfig::default().admin.api_key;

        let response = app
            .clone()
            .oneshot(request("/admin/status", Some(token.as_str())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let mut config = GatewayConfig::default();
        config.admin.enabled = true;
        state.apply_config(config);

        let response = app.oneshot(request("/admin/status", Some(token.as_str()))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_and_rate_limit() {
        let response = app().oneshot(request("/admin/status", Some("secret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let status: SystemStatus = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(status.instances, 0);
        assert_eq!(status.status, "operational");

        let response = app().oneshot(request("/admin/rate-limit", Some("secret"))).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["enabled"], true);
        assert_eq!(json["maxRequests"], 100);
    }
}
