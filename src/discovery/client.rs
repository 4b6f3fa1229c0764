//! HTTP client for the registry API.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::discovery::ServiceDiscovery;
use crate::error::GatewayError;
use crate::http::response::ErrorBody;
use crate::registry::handlers::Deregistered;
use crate::registry::{InstanceStatus, RegistrationRequest, ServiceInstance, StatusUpdate};
use crate::resilience::circuit_breaker::BreakerSnapshot;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for a remote registry's `/services` API.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl RegistryClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.timeout.as_millis() as u64)
        } else {
            GatewayError::Upstream(format!("registry unreachable: {}", err))
        }
    }

    pub async fn register(&self, request: &RegistrationRequest) -> Result<ServiceInstance, GatewayError> {
        let res = self
            .client
            .post(self.url("/services"))
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        decode(res, &request.service_name).await
    }

    pub async fn list(&self) -> Result<Vec<ServiceInstance>, GatewayError> {
        let res = self.client.get(self.url("/services")).send().await.map_err(|e| self.transport(e))?;
        decode(res, "/services").await
    }

    pub async fn list_service(&self, service_name: &str) -> Result<Vec<ServiceInstance>, GatewayError> {
        let res = self
            .client
            .get(self.url("/services"))
            .query(&[("service", service_name)])
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        decode(res, service_name).await
    }

    pub async fn get(&self, id: &str) -> Result<ServiceInstance, GatewayError> {
        let res = self
            .client
            .get(self.url(&format!("/services/{}", id)))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        decode(res, id).await
    }

    pub async fn heartbeat(&self, id: &str) -> Result<ServiceInstance, GatewayError> {
        let res = self
            .client
            .put(self.url(&format!("/services/{}/heartbeat", id)))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        decode(res, id).await
    }

    pub async fn update_status(&self, id: &str, status: InstanceStatus) -> Result<ServiceInstance, GatewayError> {
        let res = self
            .client
            .put(self.url(&format!("/services/{}/status", id)))
            .json(&StatusUpdate { status })
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        decode(res, id).await
    }

    pub async fn deregister(&self, id: &str) -> Result<bool, GatewayError> {
        let res = self
            .client
            .delete(self.url(&format!("/services/{}", id)))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let body: Deregistered = decode(res, id).await?;
        Ok(body.deregistered)
    }

    /// Breaker snapshots from the admin API of a gateway.
    pub async fn breakers(&self, api_key: &str) -> Result<Vec<BreakerSnapshot>, GatewayError> {
        let res = self
            .client
            .get(self.url("/admin/breakers"))
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        if res.status() == StatusCode::UNAUTHORIZED {
            return Err(GatewayError::Validation("admin api key rejected".into()));
        }
        decode(res, "/admin/breakers").await
    }
}

impl ServiceDiscovery for RegistryClient {
    fn instances<'a>(
        &'a self,
        service_name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ServiceInstance>, GatewayError>> {
        Box::pin(self.list_service(service_name))
    }
}

/// Decode a success body, or translate the registry's error body back into
/// a `GatewayError`.
async fn decode<T: DeserializeOwned>(res: Response, subject: &str) -> Result<T, GatewayError> {
    let status = res.status();
    if status.is_success() {
        return res
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("invalid registry response: {}", e)));
    }

    let text = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);
    Err(match status {
        StatusCode::NOT_FOUND => GatewayError::InstanceNotFound(subject.to_string()),
        StatusCode::BAD_REQUEST => GatewayError::Validation(
            message
                .strip_prefix("invalid request: ")
                .map(str::to_string)
                .unwrap_or(message),
        ),
        _ => GatewayError::Upstream(format!("registry returned {}: {}", status, message)),
    })
}
