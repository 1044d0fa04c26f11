//! Endpoints discovery
//!
//! The selector only needs two things from the cluster: the current endpoints
//! of a service and a stream of later changes. Backends implement
//! [`DiscoverySource`]; [`DiscoveryLoop`] keeps a [`ServerSet`](crate::ServerSet)
//! in sync with one.

pub mod memory;
pub mod watcher;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::endpoints::Endpoints;
use crate::error::Result;

pub use memory::MemorySource;
pub use watcher::DiscoveryLoop;

/// Stream of endpoints updates; dropping it ends the subscription
pub type EndpointsStream = BoxStream<'static, Endpoints>;

/// Backend tracking the endpoints of named services
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Fetch the current endpoints of `namespace/name`
    async fn fetch(&self, namespace: &str, name: &str) -> Result<Endpoints>;

    /// Subscribe to changes of `namespace/name`.
    ///
    /// The stream ends when the backend closes the subscription.
    async fn watch(&self, namespace: &str, name: &str) -> Result<EndpointsStream>;
}
