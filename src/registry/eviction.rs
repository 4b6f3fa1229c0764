//! Lease-based eviction task.
//!
//! Periodically removes instances whose last heartbeat is older than the
//! configured lease. Runs until the shutdown broadcast fires. The registry
//! settings are re-read before every pass, so a reloaded config applies from
//! the next tick.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::RegistryConfig;
use crate::observability::metrics;
use crate::registry::store::{EvictionOutcome, ServiceRegistry};

pub struct EvictionTask {
    registry: Arc<ServiceRegistry>,
    config: Arc<ArcSwap<RegistryConfig>>,
}

impl EvictionTask {
    pub fn new(registry: Arc<ServiceRegistry>, config: Arc<ArcSwap<RegistryConfig>>) -> Self {
        Self { registry, config }
    }

    /// Task with settings that never change.
    pub fn with_config(registry: Arc<ServiceRegistry>, config: RegistryConfig) -> Self {
        Self::new(registry, Arc::new(ArcSwap::from_pointee(config)))
    }

    /// Run one pass now.
    pub fn run_once(&self) -> EvictionOutcome {
        let config = self.config.load();
        let outcome = self.registry.evict_expired(&config, Utc::now());

        if outcome.skipped {
            tracing::warn!(
                expired = outcome.expired,
                total = outcome.total,
                threshold = config.self_preservation_threshold,
                "Self-preservation active, skipping eviction"
            );
        }
        for instance in &outcome.evicted {
            tracing::warn!(
                instance_id = %instance.id,
                service = %instance.service_name,
                last_updated = %instance.last_updated,
                "Evicted instance with expired lease"
            );
        }
        if !outcome.evicted.is_empty() {
            metrics::record_evictions(outcome.evicted.len());
        }
        outcome
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        {
            let config = self.config.load();
            tracing::info!(
                enabled = config.eviction_enabled,
                interval_secs = config.eviction_interval_secs,
                lease_secs = config.lease_duration_secs,
                "Eviction task starting"
            );
        }

        loop {
            let interval = self.config.load().eviction_interval();
            tokio::select! {
                _ = time::sleep(interval) => {
                    if self.config.load().eviction_enabled {
                        self.run_once();
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Eviction task received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
