//! Cache server selector backed by endpoints discovery
//!
//! [`ServerList`] resolves a `service[.namespace]:port` target, seeds its
//! server set from the discovery source and then keeps it current from a
//! background watch. Cache clients call [`ServerList::pick_server`] for
//! every key and [`ServerList::each`] for broadcast operations.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use kubecache_core::config::{Config, SelectorConfig, DEFAULT_NAMESPACE};
use kubecache_core::logging::build_dispatch;

use crate::discovery::watcher::{DEFAULT_RETRY_INTERVAL, MIN_RETRY_INTERVAL};
use crate::discovery::{DiscoveryLoop, DiscoverySource};
use crate::error::{Error, Result};
use crate::server_set::ServerSet;
use crate::target::{FileNamespaceLookup, NamespaceLookup, TargetInfo};

/// Options for [`ServerList::start`]
#[derive(Clone)]
pub struct SelectorOptions {
    retry_interval: Duration,
    namespace_lookup: Arc<dyn NamespaceLookup>,
    default_namespace: String,
    logger: Option<Dispatch>,
}

impl SelectorOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            namespace_lookup: Arc::new(FileNamespaceLookup::default()),
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            logger: None,
        }
    }

    /// Build options from loaded configuration
    #[must_use]
    pub fn from_config(config: &SelectorConfig) -> Self {
        Self {
            retry_interval: Duration::from_millis(config.retry_interval_ms).max(MIN_RETRY_INTERVAL),
            namespace_lookup: Arc::new(FileNamespaceLookup::new(&config.namespace_file)),
            default_namespace: config.default_namespace.clone(),
            logger: None,
        }
    }

    /// Delay between watch attempts after a failure or a closed stream.
    ///
    /// Values below [`MIN_RETRY_INTERVAL`] are raised to it.
    #[must_use]
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval.max(MIN_RETRY_INTERVAL);
        self
    }

    /// Where to look up the current namespace when the target has none
    #[must_use]
    pub fn with_namespace_lookup(mut self, lookup: Arc<dyn NamespaceLookup>) -> Self {
        self.namespace_lookup = lookup;
        self
    }

    /// Send selector logs to `dispatch` instead of the dispatcher current at start
    #[must_use]
    pub fn with_logger(mut self, dispatch: Dispatch) -> Self {
        self.logger = Some(dispatch);
        self
    }

    #[must_use]
    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }
}

impl Default for SelectorOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SelectorOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectorOptions")
            .field("retry_interval", &self.retry_interval)
            .field("default_namespace", &self.default_namespace)
            .field("logger", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}

/// Self-updating list of cache servers
pub struct ServerList {
    target: TargetInfo,
    servers: Arc<ServerSet>,
    cancel_token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ServerList {
    /// Resolve `addr`, load the current endpoints and start watching for changes.
    ///
    /// Fails if the target is malformed or the initial fetch fails. The
    /// background watch stops when `cancel` (or a parent of it) is cancelled,
    /// when [`shutdown`](Self::shutdown) is called, or when the list is dropped.
    pub async fn start(
        cancel: &CancellationToken,
        addr: &str,
        source: Arc<dyn DiscoverySource>,
        options: SelectorOptions,
    ) -> Result<Self> {
        let target = TargetInfo::parse(
            addr,
            options.namespace_lookup.as_ref(),
            &options.default_namespace,
        )?;

        let dispatch = options
            .logger
            .unwrap_or_else(|| tracing::dispatcher::get_default(Dispatch::clone));

        let servers = Arc::new(ServerSet::new());
        let discovery = DiscoveryLoop::new(
            source,
            target.clone(),
            servers.clone(),
            options.retry_interval,
        );

        discovery
            .sync_once()
            .with_subscriber(dispatch.clone())
            .await?;

        let cancel_token = cancel.child_token();
        let handle = tokio::spawn(
            discovery
                .run(cancel_token.clone())
                .with_subscriber(dispatch),
        );

        Ok(Self {
            target,
            servers,
            cancel_token,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Start a list for the target named in `config`.
    ///
    /// Selector logs go to the subscriber described by the logging section,
    /// so a process can route them apart from its own output.
    pub async fn from_config(
        cancel: &CancellationToken,
        config: &Config,
        source: Arc<dyn DiscoverySource>,
    ) -> Result<Self> {
        let dispatch = build_dispatch(&config.logging)
            .map_err(|e| Error::Configuration(format!("logging: {e:#}")))?;
        let options = SelectorOptions::from_config(&config.selector).with_logger(dispatch);
        Self::start(cancel, &config.selector.target, source, options).await
    }

    /// Call `f` for every known server, stopping at the first error
    pub fn each<F, E>(&self, f: F) -> std::result::Result<(), E>
    where
        F: FnMut(&SocketAddr) -> std::result::Result<(), E>,
    {
        self.servers.each(f)
    }

    /// Pick the server responsible for `key`
    pub fn pick_server(&self, key: impl AsRef<[u8]>) -> Result<SocketAddr> {
        self.servers.pick_server(key)
    }

    /// Current server snapshot
    #[must_use]
    pub fn servers(&self) -> Arc<[SocketAddr]> {
        self.servers.snapshot()
    }

    #[must_use]
    pub fn target(&self) -> &TargetInfo {
        &self.target
    }

    /// Stop the background watch and wait for it to finish
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Endpoints discovery task failed");
            }
        }
    }
}

impl Drop for ServerList {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
