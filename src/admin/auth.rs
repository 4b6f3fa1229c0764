//! Access control for the admin surface.
//!
//! Answers 404 while `admin.enabled` is off, so the routes appear and
//! disappear with config reloads. Otherwise requires the bearer key.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::server::AppState;

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let inner = state.inner.load_full();
    if !inner.config.admin.enabled {
        return Err(StatusCode::NOT_FOUND);
    }

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    if let Some(token) = auth_header.and_then(|v| v.strip_prefix("Bearer ")) {
        if token == inner.config.admin.api_key {
            return Ok(next.run(request).await);
        }
    }

    tracing::warn!(uri = %request.uri(), "Rejected admin request with missing or invalid token");
    Err(StatusCode::UNAUTHORIZED)
}
