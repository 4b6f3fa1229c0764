//! Uniform random load balancing strategy.

use crate::load_balancer::LoadBalancer;
use crate::registry::ServiceInstance;

#[derive(Debug, Default, Clone, Copy)]
pub struct Random;

impl LoadBalancer for Random {
    fn next_instance(&self, _service_key: &str, candidates: &[ServiceInstance]) -> Option<ServiceInstance> {
        if candidates.is_empty() {
            return None;
        }
        candidates.get(fastrand::usize(..candidates.len())).cloned()
    }
}
