//! Error types for the ledger server binary.
//!
//! [`ServerError`] is the top-level error that `main` propagates with `?`.
//! Everything after startup is absorbed and logged by the ledger loop, so
//! only configuration and store setup can fail the process.

/// Top-level error for the ledger server binary.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ledger_core::config::ConfigError,
    },

    /// A store could not be opened.
    #[error("storage error: {source}")]
    Storage {
        /// The underlying storage error.
        #[from]
        source: ledger_storage::StorageError,
    },
}
