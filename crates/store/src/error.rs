//! Error types for the store.

use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying SQLite call failed.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// A stored JSON column could not be decoded.
    #[error("corrupt stored json: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored enum column held an unknown value.
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}
