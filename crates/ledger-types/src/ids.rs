//! Type-safe identifier wrapper for tracked players.
//!
//! Player identifiers come from the game host and are opaque strings. They
//! are stable for the lifetime of a player account but are not guaranteed
//! to be safe as file names (some hosts embed `/` or `+` in them), so the
//! storage layer always derives its own key from a [`PlayerUid`].

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Stable identifier of a player, as issued by the game host.
///
/// Serializes as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PlayerUid(pub String);

impl PlayerUid {
    /// Wrap a host-issued identifier.
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PlayerUid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PlayerUid {
    fn from(uid: String) -> Self {
        Self(uid)
    }
}

impl From<&str> for PlayerUid {
    fn from(uid: &str) -> Self {
        Self(uid.to_owned())
    }
}

impl AsRef<str> for PlayerUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
