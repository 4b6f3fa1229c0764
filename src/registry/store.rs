//! In-memory service registry.
//!
//! # Responsibilities
//! - Own every `ServiceInstance`, grouped by service name
//! - Keep an id → service index for O(1) lookups by id
//! - Hand out owned snapshots only
//! - Expire instances whose lease ran out (see eviction.rs for the task)
//!
//! # Design Decisions
//! - One `RwLock` over groups and index so they never disagree
//! - Lock held only for the map update, never across `.await`
//! - `last_updated` never moves backwards for an instance

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::RegistryConfig;
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::registry::instance::{InstanceStatus, RegistrationRequest, ServiceInstance};

#[derive(Debug, Default)]
struct RegistryState {
    /// service name → (instance id → instance)
    groups: HashMap<String, HashMap<String, ServiceInstance>>,
    /// instance id → service name
    index: HashMap<String, String>,
}

impl RegistryState {
    fn remove(&mut self, id: &str) -> Option<ServiceInstance> {
        let service = self.index.remove(id)?;
        let group = self.groups.get_mut(&service)?;
        let removed = group.remove(id);
        if group.is_empty() {
            self.groups.remove(&service);
        }
        removed
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut ServiceInstance> {
        let service = self.index.get(id)?;
        self.groups.get_mut(service)?.get_mut(id)
    }
}

/// Result of one eviction pass.
#[derive(Debug, Default)]
pub struct EvictionOutcome {
    pub evicted: Vec<ServiceInstance>,
    /// Set when self-preservation suppressed the pass.
    pub skipped: bool,
    pub expired: usize,
    pub total: usize,
}

/// Directory mapping service name → instances.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    state: RwLock<RegistryState>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register (or re-register) an instance. The stored record is UP.
    pub fn register(&self, request: RegistrationRequest) -> Result<ServiceInstance, GatewayError> {
        request.validate()?;

        let id = request
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut now = Utc::now();

        let mut state = self.write();
        if let Some(previous) = state.remove(&id) {
            now = now.max(previous.last_updated);
            if previous.service_name != request.service_name {
                tracing::info!(
                    instance_id = %id,
                    from = %previous.service_name,
                    to = %request.service_name,
                    "Instance moved to another service"
                );
            }
        }

        let instance = ServiceInstance {
            id: id.clone(),
            service_name: request.service_name,
            host: request.host,
            port: request.port,
            status: InstanceStatus::Up,
            metadata: request.metadata,
            last_updated: now,
        };

        state.index.insert(id.clone(), instance.service_name.clone());
        state
            .groups
            .entry(instance.service_name.clone())
            .or_default()
            .insert(id, instance.clone());
        let total = state.index.len();
        drop(state);

        tracing::info!(
            instance_id = %instance.id,
            service = %instance.service_name,
            address = %instance.base_url(),
            "Instance registered"
        );
        metrics::record_registry_size(total);
        Ok(instance)
    }

    /// Remove an instance. Returns false if the id was unknown.
    pub fn deregister(&self, id: &str) -> bool {
        let mut state = self.write();
        let removed = state.remove(id);
        let total = state.index.len();
        drop(state);

        match removed {
            Some(instance) => {
                tracing::info!(instance_id = %id, service = %instance.service_name, "Instance deregistered");
                metrics::record_registry_size(total);
                true
            }
            None => false,
        }
    }

    /// Renew an instance's lease; same as setting it UP.
    pub fn heartbeat(&self, id: &str) -> Result<ServiceInstance, GatewayError> {
        self.update_status(id, InstanceStatus::Up)
    }

    pub fn update_status(
        &self,
        id: &str,
        status: InstanceStatus,
    ) -> Result<ServiceInstance, GatewayError> {
        let now = Utc::now();
        let mut state = self.write();
        let instance = state
            .get_mut(id)
            .ok_or_else(|| GatewayError::InstanceNotFound(id.to_string()))?;

        let previous = instance.status;
        instance.status = status;
        instance.last_updated = instance.last_updated.max(now);
        let snapshot = instance.clone();
        drop(state);

        if previous != status {
            tracing::info!(instance_id = %id, from = ?previous, to = ?status, "Instance status changed");
        } else {
            tracing::trace!(instance_id = %id, "Lease renewed");
        }
        Ok(snapshot)
    }

    pub fn get_instance(&self, id: &str) -> Option<ServiceInstance> {
        let state = self.read();
        let service = state.index.get(id)?;
        state.groups.get(service)?.get(id).cloned()
    }

    pub fn all_instances(&self) -> Vec<ServiceInstance> {
        self.read()
            .groups
            .values()
            .flat_map(|group| group.values().cloned())
            .collect()
    }

    pub fn instances_by_service(&self, service_name: &str) -> Vec<ServiceInstance> {
        self.read()
            .groups
            .get(service_name)
            .map(|group| group.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.read().groups.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every instance not renewed within the lease as of `now`.
    ///
    /// Once the registry holds `self_preservation_min_instances` or more and
    /// `self_preservation_threshold < 1.0`, the pass is skipped when the
    /// expired share exceeds `1 - threshold`: a mass expiry more likely means
    /// the registry lost connectivity than that every instance died.
    pub fn evict_expired(&self, config: &RegistryConfig, now: DateTime<Utc>) -> EvictionOutcome {
        let lease = TimeDelta::from_std(config.lease_duration()).unwrap_or(TimeDelta::MAX);
        let mut state = self.write();

        let expired: Vec<String> = state
            .groups
            .values()
            .flat_map(|group| group.values())
            .filter(|instance| now.signed_duration_since(instance.last_updated) > lease)
            .map(|instance| instance.id.clone())
            .collect();
        let total = state.index.len();

        let mut outcome = EvictionOutcome {
            expired: expired.len(),
            total,
            ..Default::default()
        };
        if expired.is_empty() {
            return outcome;
        }

        let threshold = config.self_preservation_threshold;
        if threshold < 1.0 && total >= config.self_preservation_min_instances {
            let expired_share = expired.len() as f64 / total as f64;
            if expired_share > 1.0 - threshold {
                outcome.skipped = true;
                return outcome;
            }
        }

        outcome.evicted = expired.iter().filter_map(|id| state.remove(id)).collect();
        let remaining = state.index.len();
        drop(state);

        metrics::record_registry_size(remaining);
        outcome
    }
}
