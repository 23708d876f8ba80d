//! Error types for CA and TLS assembly operations.

use thiserror::Error;

/// Result type for CA and TLS assembly operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for CA and TLS assembly operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Certificate generation or signing failed.
    #[error("certificate generation: {0}")]
    Rcgen(#[from] rcgen::Error),

    /// Reading or writing certificate material failed.
    #[error("certificate io: {0}")]
    Io(#[from] std::io::Error),

    /// Assembling a rustls configuration failed.
    #[error("tls config: {0}")]
    Rustls(#[from] rustls::Error),

    /// Building the client certificate verifier failed.
    #[error("client verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    /// PEM material was missing or malformed.
    #[error("pem: {0}")]
    Pem(String),
}
