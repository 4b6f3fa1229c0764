//! Service registry subsystem.
//!
//! # Data Flow
//! ```text
//! POST /services ─┐
//! PUT  .../heartbeat ─┼─→ handlers.rs → store.rs (RwLock: groups + id index)
//! DELETE ...      ─┘                        ↑
//!                                eviction.rs (interval, lease check)
//!
//! Gateway lookup:
//!     discovery::ServiceDiscovery → store.rs snapshot (owned copies)
//! ```
//!
//! # Design Decisions
//! - Single node; status updates are last-write-wins by wall clock
//! - Instances without a heartbeat inside the lease are evicted
//! - No authentication of registry writers

pub mod eviction;
pub mod handlers;
pub mod instance;
pub mod store;

pub use eviction::EvictionTask;
pub use handlers::registry_router;
pub use instance::{InstanceStatus, RegistrationRequest, ServiceInstance, StatusUpdate};
pub use store::ServiceRegistry;
