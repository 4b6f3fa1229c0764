//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request path
//!     → matcher.rs (split /api/{project}/{service}/{rest})
//!     → Return: RouteTarget (service key + forwarded suffix) or lookup error
//! ```
//!
//! Routing is purely structural. No route table exists; the service key is
//! derived from the path and resolved through discovery at request time.

pub mod matcher;

pub use matcher::{parse_route, RouteTarget, API_PREFIX};
