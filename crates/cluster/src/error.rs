//! Error types for cluster operations.

use thiserror::Error;

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for cluster operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network or TLS failure talking to a peer.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// A peer answered with a non-success status.
    #[error("peer {path} returned HTTP {status}: {body}")]
    PeerStatus {
        /// Request path.
        path: String,
        /// Response status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// Store access failed.
    #[error(transparent)]
    Store(#[from] pingmesh_store::Error),

    /// A join token could not be decoded.
    #[error("invalid join token: {0}")]
    Token(String),
}
