//! Error type for model-level operations.

use thiserror::Error;

/// Result type for model-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for model-level operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Reading or writing the configuration file failed.
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// No configuration exists in the data directory yet.
    #[error("no configuration found at {0} (run `pingmesh init` or `pingmesh join` first)")]
    NotInitialized(String),

    /// A field failed validation.
    #[error("validation: {0}")]
    Validation(String),
}
