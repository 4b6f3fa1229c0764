//! Service instance records and registration payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

pub const MAX_METADATA_ENTRIES: usize = 32;
pub const MAX_METADATA_KEY_LEN: usize = 128;
pub const MAX_METADATA_VALUE_LEN: usize = 1024;

/// Characters that would split or escape the `/services/{id}` path segment.
const RESERVED_ID_CHARS: [char; 4] = ['/', '?', '#', '%'];

/// Liveness status of an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    Up,
    Down,
    Starting,
    OutOfService,
    #[default]
    Unknown,
}

/// One running copy of a named service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    pub id: String,
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub status: InstanceStatus,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub last_updated: DateTime<Utc>,
}

impl ServiceInstance {
    pub fn is_up(&self) -> bool {
        self.status == InstanceStatus::Up
    }

    /// `http://host:port`, bracketing IPv6 literals.
    pub fn base_url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

/// Body of `POST /services`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    /// Stable id chosen by the instance; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub service_name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RegistrationRequest {
    pub fn new(service_name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: None,
            service_name: service_name.into(),
            host: host.into(),
            port,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err(GatewayError::Validation("id must not be blank".into()));
            }
            // Ids are used as a single path segment of /services/{id}.
            if id.chars().any(|c| RESERVED_ID_CHARS.contains(&c) || c.is_whitespace() || c.is_control()) {
                return Err(GatewayError::Validation(format!(
                    "id '{}' must not contain whitespace or any of / ? # %",
                    id
                )));
            }
        }
        if self.service_name.trim().is_empty() {
            return Err(GatewayError::Validation("serviceName must not be empty".into()));
        }
        if self.service_name.contains('/') {
            return Err(GatewayError::Validation("serviceName must not contain '/'".into()));
        }
        if self.port == 0 {
            return Err(GatewayError::Validation("port must be non-zero".into()));
        }
        let candidate = ServiceInstance {
            id: String::new(),
            service_name: String::new(),
            host: self.host.clone(),
            port: self.port,
            status: InstanceStatus::Unknown,
            metadata: BTreeMap::new(),
            last_updated: Utc::now(),
        };
        let valid_host = !self.host.trim().is_empty()
            && url::Url::parse(&candidate.base_url())
                .map(|u| u.host().is_some() && u.path() == "/")
                .unwrap_or(false);
        if !valid_host {
            return Err(GatewayError::Validation(format!("host '{}' is not valid", self.host)));
        }
        if self.metadata.len() > MAX_METADATA_ENTRIES {
            return Err(GatewayError::Validation(format!(
                "metadata has {} entries, at most {} allowed",
                self.metadata.len(),
                MAX_METADATA_ENTRIES
            )));
        }
        for (key, value) in &self.metadata {
            if key.is_empty() || key.len() > MAX_METADATA_KEY_LEN {
                return Err(GatewayError::Validation(format!("metadata key '{}' has invalid length", key)));
            }
            if value.len() > MAX_METADATA_VALUE_LEN {
                return Err(GatewayError::Validation(format!("metadata value for '{}' is too long", key)));
            }
        }
        Ok(())
    }
}

/// Body of `PUT /services/{id}/status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: InstanceStatus,
}
