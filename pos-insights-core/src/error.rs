//! Error types for pos-insights-core

use thiserror::Error;

/// Main error type for the pos-insights-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (reports, cache entries, snapshots)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Record source failure from a non-SQLite backend
    #[error("record source error: {0}")]
    Source(String),

    /// Caller passed a value outside a closed set
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored record could not be decoded
    #[error("corrupt record in {table}: {message}")]
    CorruptRecord { table: String, message: String },
}

/// Result type alias for pos-insights-core
pub type Result<T> = std::result::Result<T, Error>;
