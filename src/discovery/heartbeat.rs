//! Self-registration with a remote registry.
//!
//! Registers once, then renews the lease on a fixed interval. A heartbeat
//! answered with 404 means the registry evicted or forgot the instance, so
//! the agent registers again under the same id. On shutdown the instance
//! is deregistered.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::discovery::client::RegistryClient;
use crate::error::GatewayError;
use crate::registry::{RegistrationRequest, ServiceInstance};

pub struct HeartbeatAgent {
    client: RegistryClient,
    request: RegistrationRequest,
    interval: Duration,
}

impl HeartbeatAgent {
    pub fn new(client: RegistryClient, request: RegistrationRequest, interval: Duration) -> Self {
        Self {
            client,
            request,
            interval,
        }
    }

    /// Register and pin the returned id so re-registration keeps it.
    pub async fn register(&mut self) -> Result<ServiceInstance, GatewayError> {
        let instance = self.client.register(&self.request).await?;
        self.request.id = Some(instance.id.clone());
        tracing::info!(
            instance_id = %instance.id,
            service = %instance.service_name,
            registry = %self.client.base_url(),
            "Registered with remote registry"
        );
        Ok(instance)
    }

    /// Renew the lease once, re-registering if the registry no longer
    /// knows the instance.
    pub async fn beat(&mut self) -> Result<ServiceInstance, GatewayError> {
        let Some(id) = self.request.id.clone() else {
            return self.register().await;
        };
        match self.client.heartbeat(&id).await {
            Err(GatewayError::InstanceNotFound(_)) => {
                tracing::warn!(instance_id = %id, "Registry lost instance, re-registering");
                self.register().await
            }
            other => other,
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        if let Err(e) = self.register().await {
            tracing::warn!(error = %e, "Initial registration failed, will retry on next heartbeat");
        }

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.beat().await {
                        tracing::warn!(error = %e, "Heartbeat failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Heartbeat agent received shutdown signal, deregistering");
                    break;
                }
            }
        }

        if let Some(id) = &self.request.id {
            match self.client.deregister(id).await {
                Ok(_) => tracing::info!(instance_id = %id, "Deregistered from remote registry"),
                Err(e) => tracing::warn!(instance_id = %id, error = %e, "Deregistration failed"),
            }
        }
    }
}
