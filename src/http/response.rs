//! Response handling and transformation.
//!
//! # Responsibilities
//! - Map `GatewayError` to a status code and JSON error body
//! - Relay downstream responses (including failed ones) verbatim
//! - Strip hop-by-hop headers from relayed responses
//!
//! # Design Decisions
//! - Error body is always `{error, message, timestamp}`
//! - Internal errors expose a generic message; the cause is only logged

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Structured error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Headers that describe a single connection and must not be forwarded.
pub const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Build a response from downstream parts.
pub fn relay(status: StatusCode, mut headers: HeaderMap, body: Bytes) -> Response {
    strip_hop_by_hop(&mut headers);
    headers.remove(header::CONTENT_LENGTH);
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if let GatewayError::UpstreamStatus { status, headers, body } = self.root() {
            return relay(*status, headers.clone(), body.clone());
        }

        let status = self.status_code();
        let message = match &self {
            GatewayError::Internal(cause) => {
                tracing::error!(error = %cause, "Unhandled error while serving request");
                "An unexpected error occurred".to_string()
            }
            other => {
                if status.is_server_error() {
                    tracing::warn!(error = %other, status = %status, "Request failed");
                } else {
                    tracing::debug!(error = %other, status = %status, "Request rejected");
                }
                other.to_string()
            }
        };

        (status, Json(ErrorBody::new(self.name(), message))).into_response()
    }
}
