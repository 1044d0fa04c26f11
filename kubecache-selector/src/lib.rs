//! Memcache server selection over Kubernetes endpoints
//!
//! Keeps a live list of the pods backing a service and maps every cache key
//! to one of them with a CRC-32 modulo pick.

pub mod discovery;
pub mod endpoints;
pub mod error;
pub mod picker;
pub mod selector;
pub mod server_set;
pub mod target;

pub use discovery::{DiscoveryLoop, DiscoverySource, EndpointsStream, MemorySource};
pub use endpoints::{EndpointAddress, EndpointPort, EndpointSubset, Endpoints};
pub use error::{Error, Result};
pub use selector::{SelectorOptions, ServerList};
pub use server_set::ServerSet;
pub use target::{parse_target, FileNamespaceLookup, NamespaceLookup, TargetInfo};
