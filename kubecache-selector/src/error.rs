//! Error types for the server selector

use thiserror::Error;

/// Selector error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Initial endpoints fetch failed: {0}")]
    InitialFetch(String),

    #[error("Endpoints watch failed: {0}")]
    Subscription(String),

    #[error("no servers configured or available")]
    NoServers,

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for selector operations
pub type Result<T> = std::result::Result<T, Error>;
