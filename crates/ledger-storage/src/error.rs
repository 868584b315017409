//! Error types for the storage layer.
//!
//! Only writes surface errors. Loads and orphan cleanup absorb their
//! failures and log them, so [`StorageError`] always means a snapshot was
//! not durably committed.

use std::path::PathBuf;

/// Errors that can occur while committing a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A filesystem operation (create, write, sync, rename) failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// The file or directory being operated on.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The snapshot could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
