//! In-memory discovery backend
//!
//! Holds endpoints for a fixed set of services and pushes updates to open
//! watches. A new watch first yields the service's current endpoints, so a
//! subscriber that resubscribes catches up on changes it missed. Useful
//! outside a cluster and as a test double.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use super::{DiscoverySource, EndpointsStream};
use crate::endpoints::Endpoints;
use crate::error::{Error, Result};

struct ServiceEntry {
    endpoints: Endpoints,
    updates: watch::Sender<Endpoints>,
}

impl ServiceEntry {
    fn new(endpoints: Endpoints) -> Self {
        let (updates, _) = watch::channel(endpoints.clone());
        Self { endpoints, updates }
    }
}

/// Discovery backend backed by a map of `(namespace, name)` to endpoints
#[derive(Default)]
pub struct MemorySource {
    services: Mutex<HashMap<(String, String), ServiceEntry>>,
    fail_watches: AtomicBool,
    watch_attempts: AtomicUsize,
}

impl MemorySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service with its initial endpoints
    #[must_use]
    pub fn with_endpoints(self, namespace: &str, name: &str, endpoints: Endpoints) -> Self {
        self.services.lock().insert(
            (namespace.to_string(), name.to_string()),
            ServiceEntry::new(endpoints),
        );
        self
    }

    /// Store new endpoints for a service and push them to its open watches
    pub fn set(&self, namespace: &str, name: &str, endpoints: Endpoints) {
        let mut services = self.services.lock();
        match services.get_mut(&(namespace.to_string(), name.to_string())) {
            Some(entry) => {
                entry.endpoints = endpoints.clone();
                entry.updates.send_replace(endpoints);
            }
            None => {
                services.insert(
                    (namespace.to_string(), name.to_string()),
                    ServiceEntry::new(endpoints),
                );
            }
        }
    }

    /// End every open watch stream
    pub fn close_watches(&self) {
        let mut services = self.services.lock();
        for entry in services.values_mut() {
            let (updates, _) = watch::channel(entry.endpoints.clone());
            entry.updates = updates;
        }
    }

    /// Make subsequent `watch` calls fail (or succeed again)
    pub fn fail_watches(&self, fail: bool) {
        self.fail_watches.store(fail, Ordering::SeqCst);
    }

    /// Number of `watch` calls received so far, failed ones included
    #[must_use]
    pub fn watch_attempts(&self) -> usize {
        self.watch_attempts.load(Ordering::SeqCst)
    }

    /// Number of open watch streams across all services
    #[must_use]
    pub fn open_watches(&self) -> usize {
        self.services
            .lock()
            .values()
            .map(|entry| entry.updates.receiver_count())
            .sum()
    }
}

#[async_trait]
impl DiscoverySource for MemorySource {
    async fn fetch(&self, namespace: &str, name: &str) -> Result<Endpoints> {
        self.services
            .lock()
            .get(&(namespace.to_string(), name.to_string()))
            .map(|entry| entry.endpoints.clone())
            .ok_or_else(|| Error::NotFound(format!("endpoints {namespace}/{name}")))
    }

    async fn watch(&self, namespace: &str, name: &str) -> Result<EndpointsStream> {
        self.watch_attempts.fetch_add(1, Ordering::SeqCst);

        if self.fail_watches.load(Ordering::SeqCst) {
            return Err(Error::Discovery(format!(
                "watch on endpoints {namespace}/{name} refused"
            )));
        }

        let services = self.services.lock();
        let entry = services
            .get(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| Error::NotFound(format!("endpoints {namespace}/{name}")))?;

        // Every subscription starts with the current state, like a watch
        // opened without a resource version
        Ok(WatchStream::new(entry.updates.subscribe()).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::EndpointPort;

    fn endpoints(ip: &str) -> Endpoints {
        Endpoints::single_subset(&[ip], vec![EndpointPort::numbered(11211)])
    }

    #[tokio::test]
    async fn test_fetch_known_and_unknown() {
        let source = MemorySource::new().with_endpoints("default", "memcache", endpoints("10.0.0.1"));
        assert_eq!(source.fetch("default", "memcache").await.unwrap(), endpoints("10.0.0.1"));
        assert!(matches!(
            source.fetch("default", "redis").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_watch_receives_updates() {
        let source = MemorySource::new().with_endpoints("default", "memcache", endpoints("10.0.0.1"));
        let mut stream = source.watch("default", "memcache").await.unwrap();
        assert_eq!(source.open_watches(), 1);
        assert_eq!(stream.next().await, Some(endpoints("10.0.0.1")));

        source.set("default", "memcache", endpoints("10.0.0.2"));
        assert_eq!(stream.next().await, Some(endpoints("10.0.0.2")));
        assert_eq!(source.fetch("default", "memcache").await.unwrap(), endpoints("10.0.0.2"));
    }

    #[tokio::test]
    async fn test_close_watches_ends_streams() {
        let source = MemorySource::new().with_endpoints("default", "memcache", endpoints("10.0.0.1"));
        let mut stream = source.watch("default", "memcache").await.unwrap();
        assert_eq!(stream.next().await, Some(endpoints("10.0.0.1")));

        source.close_watches();
        assert_eq!(stream.next().await, None);
        assert_eq!(source.open_watches(), 0);

        // State survives and new watches work
        assert_eq!(source.fetch("default", "memcache").await.unwrap(), endpoints("10.0.0.1"));
        let _stream = source.watch("default", "memcache").await.unwrap();
        assert_eq!(source.open_watches(), 1);
    }

    #[tokio::test]
    async fn test_new_watch_starts_with_changes_made_while_closed() {
        let source = MemorySource::new().with_endpoints("default", "memcache", endpoints("10.0.0.1"));
        let mut stream = source.watch("default", "memcache").await.unwrap();
        assert_eq!(stream.next().await, Some(endpoints("10.0.0.1")));

        source.close_watches();
        source.set("default", "memcache", endpoints("10.0.0.9"));
        assert_eq!(stream.next().await, None);

        let mut stream = source.watch("default", "memcache").await.unwrap();
        assert_eq!(stream.next().await, Some(endpoints("10.0.0.9")));
    }

    #[tokio::test]
    async fn test_fail_watches() {
        let source = MemorySource::new().with_endpoints("default", "memcache", endpoints("10.0.0.1"));
        source.fail_watches(true);
        assert!(matches!(
            source.watch("default", "memcache").await,
            Err(Error::Discovery(_))
        ));

        source.fail_watches(false);
        assert!(source.watch("default", "memcache").await.is_ok());
        assert_eq!(source.watch_attempts(), 2);
    }
}
