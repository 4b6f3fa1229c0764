//! Service discovery.
//!
//! The gateway resolves logical service names through [`ServiceDiscovery`].
//! Two implementations exist:
//! - the in-process [`ServiceRegistry`]
//! - [`RegistryClient`], which talks to a remote registry over HTTP
//!
//! [`HeartbeatAgent`] keeps an instance registered with a remote registry.

pub mod client;
pub mod heartbeat;

use futures_util::future::{self, BoxFuture};

use crate::error::GatewayError;
use crate::registry::{ServiceInstance, ServiceRegistry};

pub use client::RegistryClient;
pub use heartbeat::HeartbeatAgent;

/// Lookup of the instances registered under a service name.
pub trait ServiceDiscovery: Send + Sync {
    fn instances<'a>(
        &'a self,
        service_name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ServiceInstance>, GatewayError>>;
}

impl ServiceDiscovery for ServiceRegistry {
    fn instances<'a>(
        &'a self,
        service_name: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ServiceInstance>, GatewayError>> {
        Box::pin(future::ready(Ok(self.instances_by_service(service_name))))
    }
}
