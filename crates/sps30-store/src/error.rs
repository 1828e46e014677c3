//! Error types for sps30-store.

use std::path::PathBuf;

/// Result type for sps30-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sps30-store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Failed to create the log directory.
    #[error("Failed to create log directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// CSV encoding or decoding error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid timestamp in a log row.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// A log row that cannot be turned into a reading.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
