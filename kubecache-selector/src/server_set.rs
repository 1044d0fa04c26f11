//! Shared, swappable list of cache server addresses

use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::picker;

/// Current set of cache servers.
///
/// The list is never mutated in place: every update installs a new snapshot,
/// so readers see either the old list or the new one as a whole.
#[derive(Debug)]
pub struct ServerSet {
    addrs: RwLock<Arc<[SocketAddr]>>,
}

impl ServerSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            addrs: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Install `addrs` as the current snapshot
    pub fn replace_all(&self, addrs: Vec<SocketAddr>) {
        let snapshot: Arc<[SocketAddr]> = Arc::from(addrs);
        *self.addrs.write() = snapshot;
    }

    /// Call `f` for every server in snapshot order, stopping at the first error.
    ///
    /// The read lock is held while iterating; `f` must not call `replace_all`
    /// on the same set.
    pub fn each<F, E>(&self, mut f: F) -> std::result::Result<(), E>
    where
        F: FnMut(&SocketAddr) -> std::result::Result<(), E>,
    {
        let addrs = self.addrs.read();
        for addr in addrs.iter() {
            f(addr)?;
        }
        Ok(())
    }

    /// Pick the server responsible for `key`
    pub fn pick_server(&self, key: impl AsRef<[u8]>) -> Result<SocketAddr> {
        let addrs = self.addrs.read();
        picker::pick(&addrs, key.as_ref())
            .copied()
            .ok_or(Error::NoServers)
    }

    /// Current snapshot; later updates do not affect the returned list.
    #[must_use]
    pub fn snapshot(&self) -> Arc<[SocketAddr]> {
        self.addrs.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.addrs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addrs.read().is_empty()
    }
}

impl Default for ServerSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(ips: &[&str]) -> Vec<SocketAddr> {
        ips.iter()
            .map(|ip| format!("{ip}:11211").parse().unwrap())
            .collect()
    }

    #[test]
    fn test_pick_server_empty() {
        let set = ServerSet::new();
        assert!(set.is_empty());
        assert!(matches!(set.pick_server("key1"), Err(Error::NoServers)));
    }

    #[test]
    fn test_pick_server_single() {
        let set = ServerSet::new();
        set.replace_all(addrs(&["10.10.0.15"]));
        for key in ["key1", "key2", ""] {
            assert_eq!(set.pick_server(key).unwrap().to_string(), "10.10.0.15:11211");
        }
    }

    #[test]
    fn test_pick_server_stable_for_unchanged_set() {
        let set = ServerSet::new();
        set.replace_all(addrs(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]));
        let first = set.pick_server(b"user:42").unwrap();
        for _ in 0..10 {
            assert_eq!(set.pick_server(b"user:42").unwrap(), first);
        }
    }

    #[test]
    fn test_each_visits_in_order() {
        let set = ServerSet::new();
        let expected = addrs(&["10.0.0.3", "10.0.0.1", "10.0.0.2"]);
        set.replace_all(expected.clone());

        let mut seen = Vec::new();
        set.each(|addr| {
            seen.push(*addr);
            Ok::<_, Error>(())
        })
        .unwrap();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_each_stops_on_error() {
        let set = ServerSet::new();
        set.replace_all(addrs(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]));

        let mut visited = 0;
        let result = set.each(|addr| {
            visited += 1;
            if addr.ip().to_string() == "10.0.0.2" {
                Err("connect refused")
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("connect refused"));
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_each_empty_is_ok() {
        let set = ServerSet::new();
        let mut visited = 0;
        set.each(|_| {
            visited += 1;
            Ok::<_, Error>(())
        })
        .unwrap();
        assert_eq!(visited, 0);
    }

    #[test]
    fn test_replace_all_replaces_whole_list() {
        let set = ServerSet::new();
        set.replace_all(addrs(&["10.0.0.1", "10.0.0.2"]));
        let old = set.snapshot();
        set.replace_all(addrs(&["10.0.0.9"]));

        assert_eq!(old.len(), 2);
        assert_eq!(&*set.snapshot(), addrs(&["10.0.0.9"]).as_slice());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_readers_never_see_partial_update() {
        let set = ServerSet::new();
        let small = addrs(&["10.0.0.1", "10.0.0.2"]);
        let large = addrs(&["10.0.1.1", "10.0.1.2", "10.0.1.3", "10.0.1.4", "10.0.1.5"]);
        set.replace_all(small.clone());

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..2000 {
                    if i % 2 == 0 {
                        set.replace_all(large.clone());
                    } else {
                        set.replace_all(small.clone());
                    }
                }
            });

            for _ in 0..4 {
                s.spawn(|| {
                    for i in 0..2000 {
                        let mut seen = Vec::new();
                        set.each(|addr| {
                            seen.push(*addr);
                            Ok::<_, Error>(())
                        })
                        .unwrap();
                        assert!(seen == small || seen == large, "torn snapshot: {seen:?}");

                        let picked = set.pick_server(format!("key-{i}")).unwrap();
                        assert!(small.contains(&picked) || large.contains(&picked));
                    }
                });
            }
        });
    }
}
