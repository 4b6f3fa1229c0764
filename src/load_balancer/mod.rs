//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route resolved → service key + discovered instances
//!     → candidates(): keep UP instances, order by id
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through instances, per service key)
//!         - random.rs (uniform pick)
//!     → Return chosen instance or None
//! ```
//!
//! Non-UP instances are never selected. Ordering by id keeps rotation
//! stable while discovery returns instances in arbitrary order.

pub mod random;
pub mod round_robin;

use std::fmt::Debug;
use std::sync::Arc;

use crate::config::LoadBalancing;
use crate::registry::ServiceInstance;

pub use random::Random;
pub use round_robin::RoundRobin;

pub trait LoadBalancer: Send + Sync + Debug {
    /// Choose one of `candidates`, which are all UP and ordered by id.
    fn next_instance(&self, service_key: &str, candidates: &[ServiceInstance]) -> Option<ServiceInstance>;
}

/// UP instances ordered by id.
pub fn candidates(mut instances: Vec<ServiceInstance>) -> Vec<ServiceInstance> {
    instances.retain(ServiceInstance::is_up);
    instances.sort_by(|a, b| a.id.cmp(&b.id));
    instances
}

/// Filter, order and pick in one step.
pub fn select(
    balancer: &dyn LoadBalancer,
    service_key: &str,
    instances: Vec<ServiceInstance>,
) -> Option<ServiceInstance> {
    let candidates = candidates(instances);
    if candidates.is_empty() {
        return None;
    }
    balancer.next_instance(service_key, &candidates)
}

pub fn from_strategy(strategy: LoadBalancing) -> Arc<dyn LoadBalancer> {
    match strategy {
        LoadBalancing::RoundRobin => Arc::new(RoundRobin::new()),
        LoadBalancing::Random => Arc::new(Random),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;

    use crate::registry::{InstanceStatus, ServiceInstance};

    pub fn instance(id: &str, status: InstanceStatus) -> ServiceInstance {
        ServiceInstance {
            id: id.to_string(),
            service_name: "svc".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            status,
            metadata: Default::default(),
            last_updated: Utc::now(),
        }
    }
}
