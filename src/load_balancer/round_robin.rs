//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::load_balancer::LoadBalancer;
use crate::registry::ServiceInstance;

/// Round-robin selector.
/// Keeps one rotating counter per service key.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counters: DashMap<String, AtomicUsize>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_instance(&self, service_key: &str, candidates: &[ServiceInstance]) -> Option<ServiceInstance> {
        if candidates.is_empty() {
            return None;
        }

        let start = match self.counters.get(service_key) {
            Some(counter) => counter.fetch_add(1, Ordering::Relaxed),
            None => self
                .counters
                .entry(service_key.to_string())
                .or_default()
                .fetch_add(1, Ordering::Relaxed),
        };
        candidates.get(start % candidates.len()).cloned()
    }
}
