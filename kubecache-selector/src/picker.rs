//! Key to server mapping
//!
//! Keys are hashed with CRC-32 (IEEE) and reduced modulo the number of
//! servers. This is not a consistent hash: changing the server list moves
//! keys between servers.

use std::net::SocketAddr;

/// Only this many leading key bytes take part in hashing
pub const MAX_HASHED_KEY_LEN: usize = 256;

/// Pick the server responsible for `key`, or `None` when `servers` is empty.
///
/// The result depends only on `key` and on the order of `servers`.
#[must_use]
pub fn pick<'a>(servers: &'a [SocketAddr], key: &[u8]) -> Option<&'a SocketAddr> {
    match servers.len() {
        0 => None,
        1 => servers.first(),
        n => {
            let hashed = &key[..key.len().min(MAX_HASHED_KEY_LEN)];
            let checksum = crc32fast::hash(hashed);
            servers.get(checksum as usize % n)
        }
    }
}
