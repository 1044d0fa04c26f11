//! Discovery target parsing
//!
//! A target names the service whose endpoints back the cache, in the form
//! `service[.namespace]:port`. The port is either a number or the name of a
//! port declared on the service.

use std::path::PathBuf;

use kubecache_core::config::{DEFAULT_NAMESPACE, DEFAULT_NAMESPACE_FILE};

use crate::error::{Error, Result};

/// Source of the namespace the current process runs in
pub trait NamespaceLookup: Send + Sync {
    /// Returns `None` when the namespace cannot be determined.
    fn current_namespace(&self) -> Option<String>;
}

impl<F> NamespaceLookup for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn current_namespace(&self) -> Option<String> {
        self()
    }
}

/// Reads the namespace from the service account file mounted into pods
#[derive(Debug, Clone)]
pub struct FileNamespaceLookup {
    path: PathBuf,
}

impl FileNamespaceLookup {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for FileNamespaceLookup {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE_FILE)
    }
}

impl NamespaceLookup for FileNamespaceLookup {
    fn current_namespace(&self) -> Option<String> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let namespace = raw.trim();
        if namespace.is_empty() {
            None
        } else {
            Some(namespace.to_string())
        }
    }
}

/// Parsed discovery target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    pub namespace: String,
    pub name: String,
    /// Port number or port name, exactly as written in the target
    pub port: String,
    pub named_port: bool,
}

impl TargetInfo {
    /// Parse `addr`, falling back to `lookup` and then to `default_namespace`
    /// when the target carries no namespace.
    pub fn parse(addr: &str, lookup: &dyn NamespaceLookup, default_namespace: &str) -> Result<Self> {
        if addr.is_empty() {
            return Err(Error::InvalidTarget("address is required".to_string()));
        }

        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidTarget(format!("missing port in address '{addr}'")))?;

        if port.is_empty() {
            return Err(Error::InvalidTarget(format!("missing port in address '{addr}'")));
        }

        let (name, namespace) = match host.split_once('.') {
            Some((name, namespace)) => (name, namespace.to_string()),
            None => (
                host,
                lookup
                    .current_namespace()
                    .unwrap_or_else(|| default_namespace.to_string()),
            ),
        };

        if name.is_empty() {
            return Err(Error::InvalidTarget(format!("missing service name in address '{addr}'")));
        }

        Ok(Self {
            namespace,
            name: name.to_string(),
            port: port.to_string(),
            named_port: port.parse::<i64>().is_err(),
        })
    }
}

/// Parse a target using the pod's namespace file and the stock default namespace
pub fn parse_target(addr: &str) -> Result<TargetInfo> {
    TargetInfo::parse(addr, &FileNamespaceLookup::default(), DEFAULT_NAMESPACE)
}

impl std::fmt::Display for TargetInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}:{}", self.name, self.namespace, self.port)
    }
}
