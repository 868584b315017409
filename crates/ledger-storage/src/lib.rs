//! Durable storage for player snapshots.
//!
//! The ledger only ever reads and writes "the current snapshot for player
//! X". Every backend implements [`PlayerStorage`]; the ledger service fans
//! each persisted snapshot out to all configured backends in order.
//!
//! # Architecture
//!
//! ```text
//! LedgerService::persist
//!     |
//!     +-- save_snapshot --> JsonPlayerStorage   (<base>/<key>.json)
//!     +-- save_snapshot --> ...other backends
//!
//! LedgerService seeding
//!     |
//!     +-- load_snapshot <-- first backend holding a record
//! ```
//!
//! # Modules
//!
//! - [`json_store`] -- Crash-safe JSON file store with orphan cleanup
//! - [`key`] -- Filesystem-safe keys derived from player ids
//! - [`error`] -- Shared error types

pub mod error;
pub mod json_store;
pub mod key;

use ledger_types::{PlayerSnapshot, PlayerUid};

// Re-export primary types for convenience.
pub use error::StorageError;
pub use json_store::{JsonPlayerStorage, cleanup_orphans};
pub use key::{decode_key, encode_key};

/// A durable backend for player snapshots.
///
/// Writes must be atomic from a reader's point of view and must never
/// corrupt the previously committed record. Loads never fail: an absent or
/// unreadable record is `None`.
pub trait PlayerStorage: Send {
    /// Short backend name used in logs and failure reports.
    fn name(&self) -> &'static str;

    /// Durably commit `snapshot` as the current record for its player.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the record could not be committed. The
    /// previously committed record, if any, is left intact.
    fn save_snapshot(&self, snapshot: &PlayerSnapshot) -> Result<(), StorageError>;

    /// Load the last committed record for `uid`.
    ///
    /// Write-only backends keep the default, which never has a record.
    fn load_snapshot(&self, uid: &PlayerUid) -> Option<PlayerSnapshot> {
        let _ = uid;
        None
    }
}
