//! Crate-wide error type.
//!
//! Every fallible operation on the request path returns [`GatewayError`].
//! The HTTP mapping (status code + JSON body) lives in `http::response`.

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

/// Errors produced by the resilience layer, the registry and the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Admission rejected by the sliding-window rate limiter.
    #[error("rate limit exceeded: {max_requests} requests per {window_ms}ms")]
    RateLimitExceeded { max_requests: u32, window_ms: u64 },

    /// The circuit breaker for this endpoint is open.
    #[error("circuit breaker is open for {endpoint}")]
    CircuitOpen { endpoint: String },

    /// All retry attempts failed; wraps the last failure.
    #[error("giving up after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        source: Box<GatewayError>,
    },

    #[error("no available instance for service '{0}'")]
    ServiceNotFound(String),

    #[error("missing or empty project segment in '{0}'")]
    InvalidProject(String),

    #[error("missing or empty service segment in '{0}'")]
    InvalidService(String),

    #[error("instance '{0}' is not registered")]
    InstanceNotFound(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Transport-level failure talking to a downstream instance.
    #[error("upstream request failed: {0}")]
    Upstream(String),

    /// Downstream answered with a status configured as a failure.
    /// The response is kept so it can be relayed verbatim.
    #[error("upstream responded with {status}")]
    UpstreamStatus {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },

    #[error("upstream did not respond within {0}ms")]
    Timeout(u64),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by the retry allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Upstream,
    Timeout,
    CircuitOpen,
    RateLimited,
}

impl GatewayError {
    /// Kind used for retry decisions. Lookup and validation errors have none
    /// and are therefore never retried.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            GatewayError::Upstream(_) | GatewayError::UpstreamStatus { .. } => {
                Some(ErrorKind::Upstream)
            }
            GatewayError::Timeout(_) => Some(ErrorKind::Timeout),
            GatewayError::CircuitOpen { .. } => Some(ErrorKind::CircuitOpen),
            GatewayError::RateLimitExceeded { .. } => Some(ErrorKind::RateLimited),
            _ => None,
        }
    }

    /// Short machine-readable name, used as the `error` field of JSON bodies.
    pub fn name(&self) -> &'static str {
        match self {
            GatewayError::RateLimitExceeded { .. } => "RateLimitExceeded",
            GatewayError::CircuitOpen { .. } => "CircuitOpen",
            GatewayError::MaxRetriesExceeded { .. } => "MaxRetriesExceeded",
            GatewayError::ServiceNotFound(_) => "ServiceNotFound",
            GatewayError::InvalidProject(_) => "InvalidProject",
            GatewayError::InvalidService(_) => "InvalidService",
            GatewayError::InstanceNotFound(_) => "InstanceNotFound",
            GatewayError::Validation(_) => "ValidationError",
            GatewayError::PayloadTooLarge { .. } => "PayloadTooLarge",
            GatewayError::Upstream(_) => "UpstreamError",
            GatewayError::UpstreamStatus { .. } => "UpstreamError",
            GatewayError::Timeout(_) => "GatewayTimeout",
            GatewayError::Internal(_) => "InternalError",
        }
    }

    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::MaxRetriesExceeded { source, .. } => source.status_code(),
            GatewayError::ServiceNotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::InvalidProject(_) | GatewayError::InvalidService(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::InstanceNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamStatus { status, .. } => *status,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Innermost error, looking through retry exhaustion.
    pub fn root(&self) -> &GatewayError {
        match self {
            GatewayError::MaxRetriesExceeded { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<hyper_util::client::legacy::Error> for GatewayError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        GatewayError::Upstream(err.to_string())
    }
}

impl From<axum::http::Error> for GatewayError {
    fn from(err: axum::http::Error) -> Self {
        GatewayError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_exhaustion_reports_cause_status() {
        let err = GatewayError::MaxRetriesExceeded {
            attempts: 3,
            source: Box::new(GatewayError::Timeout(500)),
        };
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.name(), "MaxRetriesExceeded");
        assert!(matches!(err.root(), GatewayError::Timeout(500)));
        assert_eq!(err.kind(), None);
    }

    #[test]
    fn test_lookup_errors_are_not_retryable() {
        assert_eq!(GatewayError::ServiceNotFound("a-b".into()).kind(), None);
        assert_eq!(
            GatewayError::ServiceNotFound("a-b".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::Upstream("reset".into()).kind(),
            Some(ErrorKind::Upstream)
        );
    }
}
