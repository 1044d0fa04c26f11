//! Keeps a server set in sync with a discovery source
//!
//! The loop subscribes to endpoint changes and installs every update into the
//! server set. A failed subscription or a stream closed by the backend is
//! retried after a fixed delay, forever, until the cancellation token fires.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::DiscoverySource;
use crate::endpoints::Endpoints;
use crate::error::{Error, Result};
use crate::server_set::ServerSet;
use crate::target::TargetInfo;

/// Default delay between watch attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Shorter retry intervals are raised to this value
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// How a single watch attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchOutcome {
    Cancelled,
    Retry,
}

/// Background task applying endpoint updates to a [`ServerSet`]
pub struct DiscoveryLoop {
    source: Arc<dyn DiscoverySource>,
    target: TargetInfo,
    servers: Arc<ServerSet>,
    retry_interval: Duration,
}

impl DiscoveryLoop {
    /// `retry_interval` is raised to [`MIN_RETRY_INTERVAL`] if shorter.
    #[must_use]
    pub fn new(
        source: Arc<dyn DiscoverySource>,
        target: TargetInfo,
        servers: Arc<ServerSet>,
        retry_interval: Duration,
    ) -> Self {
        Self {
            source,
            target,
            servers,
            retry_interval: retry_interval.max(MIN_RETRY_INTERVAL),
        }
    }

    /// Fetch the current endpoints and install them.
    ///
    /// Used once before the loop starts; any failure is returned as
    /// [`Error::InitialFetch`].
    pub async fn sync_once(&self) -> Result<()> {
        let endpoints = self
            .source
            .fetch(&self.target.namespace, &self.target.name)
            .await
            .map_err(|e| Error::InitialFetch(format!("{}: {e}", self.target)))?;

        self.apply(&endpoints);
        Ok(())
    }

    /// Watch for changes until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        if cancel.is_cancelled() {
            return;
        }

        loop {
            if self.watch_once(&cancel).await == WatchOutcome::Cancelled {
                break;
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.retry_interval) => {}
            }
        }

        tracing::info!(
            namespace = %self.target.namespace,
            service = %self.target.name,
            "Endpoints discovery loop shutting down"
        );
    }

    /// Open one subscription and drain it
    async fn watch_once(&self, cancel: &CancellationToken) -> WatchOutcome {
        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return WatchOutcome::Cancelled,
            opened = self.source.watch(&self.target.namespace, &self.target.name) => opened,
        };

        let mut events = match opened {
            Ok(events) => events,
            Err(e) => {
                let err = Error::Subscription(e.to_string());
                tracing::warn!(
                    namespace = %self.target.namespace,
                    service = %self.target.name,
                    error = %err,
                    retry_in = ?self.retry_interval,
                    "Endpoints watch failed, will retry"
                );
                return WatchOutcome::Retry;
            }
        };

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return WatchOutcome::Cancelled,
                event = events.next() => match event {
                    Some(endpoints) => self.apply(&endpoints),
                    None => {
                        tracing::debug!(
                            namespace = %self.target.namespace,
                            service = %self.target.name,
                            "Endpoints watch closed by source, resubscribing"
                        );
                        return WatchOutcome::Retry;
                    }
                },
            }
        }
    }

    fn apply(&self, endpoints: &Endpoints) {
        let addrs = endpoints.resolve(&self.target);
        let listed = addrs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let count = addrs.len();

        self.servers.replace_all(addrs);

        tracing::info!(
            namespace = %self.target.namespace,
            service = %self.target.name,
            count,
            addresses = %listed,
            "Updated server addresses"
        );
    }
}
