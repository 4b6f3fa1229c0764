//! Gateway forwarding.
//!
//! # Data Flow
//! ```text
//! /api/{project}/{service}/{rest}?{query}
//!     → routing::parse_route        (400 on missing segments)
//!     → ServiceDiscovery::instances (local registry or remote client)
//!     → load_balancer::select       (503 when no UP instance)
//!     → ResilientClient             (rate limit → breaker → send, retried)
//!     → relay status, headers and body
//! ```
//!
//! The breaker key is the instance base URL, so one failing instance does
//! not open the circuit for its siblings. The overall deadline
//! (`timeouts.request_secs`) and the body limit (`gateway.max_body_size`)
//! are read from the live config on every request.

use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, Request, Uri},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};

use crate::error::GatewayError;
use crate::http::request::{request_id_header, RequestIdExt};
use crate::http::response::strip_hop_by_hop;
use crate::http::server::AppState;
use crate::load_balancer;
use crate::observability::metrics;
use crate::routing::parse_route;

pub type UpstreamClient = Client<HttpConnector, Body>;

/// Handler for every `/api/...` route.
pub async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let request_id = request.request_id().to_string();
    let mut service = String::from("none");

    let request_secs = state.inner.load().config.timeouts.request_secs;
    let deadline = Duration::from_secs(request_secs);
    let result = tokio::time::timeout(deadline, forward(&state, request, &mut service))
        .await
        .unwrap_or_else(|_| Err(GatewayError::Timeout(request_secs * 1000)));

    let response = match result {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(
                request_id = %request_id,
                service = %service,
                error = %err,
                "Forwarding failed"
            );
            err.into_response()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), &service, start);
    response
}

async fn forward(
    state: &AppState,
    request: Request<Body>,
    service: &mut String,
) -> Result<Response, GatewayError> {
    let inner = state.inner.load_full();
    let config = &inner.config;

    let target = parse_route(request.uri().path())?;
    let key = target.service_key();
    *service = key.clone();

    let max_body_size = config.gateway.max_body_size;
    if declared_length(request.headers()).is_some_and(|len| len > max_body_size) {
        return Err(GatewayError::PayloadTooLarge { limit: max_body_size });
    }

    let instances = state.discovery.instances(&key).await?;
    let instance = load_balancer::select(inner.balancer.as_ref(), &key, instances)
        .ok_or_else(|| GatewayError::ServiceNotFound(key.clone()))?;
    let endpoint = instance.base_url();

    let request_id = request.request_id().to_string();
    let (parts, body) = request.into_parts();
    let body = read_body(body, max_body_size).await?;

    let uri = upstream_uri(&endpoint, &target.suffix, parts.uri.query())?;
    let headers = upstream_headers(&parts, &request_id);
    let method = parts.method.clone();

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        service = %key,
        instance_id = %instance.id,
        uri = %uri,
        "Forwarding request"
    );

    let upstream_timeout = Duration::from_secs(config.timeouts.upstream_secs);
    let failure_statuses = &config.gateway.failure_statuses;

    let attempt = || {
        let request = build_request(&method, &uri, &headers, body.clone());
        let client = state.http.clone();
        async move {
            let request = request?;
            crate::resilience::with_timeout(
                upstream_timeout,
                send(&client, request, failure_statuses, max_body_size),
            )
            .await
        }
    };

    let response = if is_retry_safe(&method, config.gateway.retry_non_idempotent) {
        inner.client.call(&endpoint, attempt).await?
    } else {
        inner.client.call_once(&endpoint, attempt).await?
    };

    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Ok(Response::from_parts(parts, body))
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Buffer the inbound body so every attempt can resend it.
async fn read_body(body: Body, limit: usize) -> Result<Bytes, GatewayError> {
    let mut stream = body.into_data_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk
            .map_err(|e| GatewayError::Validation(format!("failed to read request body: {}", e)))?;
        if buf.len() + chunk.len() > limit {
            return Err(GatewayError::PayloadTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buf))
}

/// Send one attempt. Statuses listed in `failure_statuses` become
/// [`GatewayError::UpstreamStatus`] with the body buffered for relaying.
async fn send(
    client: &UpstreamClient,
    request: Request<Body>,
    failure_statuses: &[u16],
    max_body_size: usize,
) -> Result<Response, GatewayError> {
    let response: hyper::Response<Incoming> = client.request(request).await?;
    let (parts, body) = response.into_parts();
    let body = Body::new(body);

    if failure_statuses.contains(&parts.status.as_u16()) {
        let body = axum::body::to_bytes(body, max_body_size)
            .await
            .map_err(|e| GatewayError::Upstream(format!("failed to read upstream body: {}", e)))?;
        return Err(GatewayError::UpstreamStatus {
            status: parts.status,
            headers: parts.headers,
            body,
        });
    }

    Ok(Response::from_parts(parts, body))
}

/// Idempotent methods are retried; others only when explicitly enabled.
pub fn is_retry_safe(method: &Method, retry_non_idempotent: bool) -> bool {
    method.is_idempotent() || retry_non_idempotent
}

pub fn upstream_uri(base_url: &str, suffix: &str, query: Option<&str>) -> Result<Uri, GatewayError> {
    let uri = match query {
        Some(q) if !q.is_empty() => format!("{}{}?{}", base_url, suffix, q),
        _ => format!("{}{}", base_url, suffix),
    };
    uri.parse::<Uri>()
        .map_err(|e| GatewayError::Internal(format!("invalid upstream uri '{}': {}", uri, e)))
}

/// Inbound headers minus hop-by-hop and `Host`, plus the request ID.
pub fn upstream_headers(parts: &Parts, request_id: &str) -> HeaderMap {
    let mut headers = parts.headers.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(request_id_header(), value);
    }
    headers
}

fn build_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Request<Body>, GatewayError> {
    let mut request = Request::builder()
        .method(method.clone())
        .uri(uri.clone())
        .body(Body::from(body))?;
    *request.headers_mut() = headers.clone();
    Ok(request)
}
