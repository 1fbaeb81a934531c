//! Error types for thermolog-store.

use std::path::PathBuf;

/// Result type for thermolog-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in thermolog-store.
///
/// Decode failures are deliberately absent: a malformed line is skipped by
/// every reader and never becomes a store error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to create the log directory.
    #[error("Failed to create log directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to open the log file.
    #[error("Failed to open log {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to swap the compacted log into place.
    #[error("Failed to replace {path} with compacted log: {source}")]
    Replace {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Another process holds the writer lock for this log.
    #[error("Log {path} is locked by another writer")]
    Locked { path: PathBuf },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
