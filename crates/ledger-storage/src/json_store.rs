//! Crash-safe JSON file store, one file per player.
//!
//! # Layout
//!
//! ```text
//! <base_path>/
//!     <key>.json                 committed record
//!     .ledger-<key>.json.tmp     in-flight write (orphan after a crash)
//! ```
//!
//! `<key>` is [`encode_key`] of the player id. Keys never contain `.`, so
//! the reserved `.ledger-` prefix can never collide with a committed
//! record and directory scans skip temp files by name alone. Over-long ids
//! get a hashed key, so file names stay within the file name limit.
//!
//! # Write protocol
//!
//! 1. Serialize the snapshot.
//! 2. Write it to the temp file and `fsync` it.
//! 3. Rename the temp file onto the record path (atomic within one
//!    directory), then `fsync` the directory where supported.
//!
//! A crash before step 3 leaves the previous record untouched and an
//! orphaned temp file, removed by [`cleanup_orphans`] on the next start.

use std::fs::{self, File};
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use ledger_types::{PlayerSnapshot, PlayerUid};
use tracing::{debug, info, warn};

use crate::PlayerStorage;
use crate::error::StorageError;
use crate::key::{decode_key, encode_key, is_hashed_key};

/// Extension of committed records.
pub const RECORD_EXTENSION: &str = ".json";

/// Reserved prefix of in-flight temp files.
pub const TEMP_PREFIX: &str = ".ledger-";

/// Suffix of in-flight temp files.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Filesystem-backed [`PlayerStorage`] writing pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct JsonPlayerStorage {
    base_path: PathBuf,
}

impl JsonPlayerStorage {
    /// Open (creating if needed) a store rooted at `base_path`.
    ///
    /// Leftover temp files from an interrupted write are removed. Cleanup
    /// problems are logged and never prevent the store from opening.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the base directory cannot be created.
    pub fn open(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).map_err(|e| StorageError::io(&base_path, e))?;

        let removed = cleanup_orphans(&base_path);
        info!(
            base_path = %base_path.display(),
            orphans_removed = removed,
            "JSON player storage opened"
        );

        Ok(Self { base_path })
    }

    /// Directory holding the records.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of the committed record for `uid`.
    pub fn record_path(&self, uid: &PlayerUid) -> PathBuf {
        self.base_path
            .join(format!("{}{RECORD_EXTENSION}", encode_key(uid)))
    }

    /// Path of the temp file used while writing the record for `uid`.
    pub fn temp_path(&self, uid: &PlayerUid) -> PathBuf {
        self.base_path.join(format!(
            "{TEMP_PREFIX}{}{RECORD_EXTENSION}{TEMP_SUFFIX}",
            encode_key(uid)
        ))
    }

    /// Remove orphaned temp files under this store's directory.
    ///
    /// Returns how many were removed.
    pub fn cleanup_orphans(&self) -> usize {
        cleanup_orphans(&self.base_path)
    }

    /// List every player with a committed record.
    ///
    /// Temp files and files not produced by this store are skipped. Order
    /// is unspecified.
    pub fn list_players(&self) -> Vec<PlayerUid> {
        let entries = match fs::read_dir(&self.base_path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    base_path = %self.base_path.display(),
                    error = %e,
                    "failed to list player records"
                );
                return Vec::new();
            }
        };

        entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                if name.starts_with(TEMP_PREFIX) {
                    return None;
                }
                let key = name.strip_suffix(RECORD_EXTENSION)?;
                if is_hashed_key(key) {
                    return hashed_record_uid(&entry.path(), key);
                }
                decode_key(key)
            })
            .collect()
    }

    fn write_temp(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let mut file = File::create(path).map_err(|e| StorageError::io(path, e))?;
        file.write_all(bytes).map_err(|e| StorageError::io(path, e))?;
        file.sync_all().map_err(|e| StorageError::io(path, e))?;
        Ok(())
    }
}

impl PlayerStorage for JsonPlayerStorage {
    fn name(&self) -> &'static str {
        "json"
    }

    fn save_snapshot(&self, snapshot: &PlayerSnapshot) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;

        fs::create_dir_all(&self.base_path).map_err(|e| StorageError::io(&self.base_path, e))?;

        let temp_path = self.temp_path(&snapshot.uid);
        let record_path = self.record_path(&snapshot.uid);

        if let Err(e) = Self::write_temp(&temp_path, &bytes) {
            // Best effort: a half-written temp file is harmless but untidy.
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, &record_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(StorageError::io(&record_path, e));
        }

        sync_dir(&self.base_path);

        debug!(
            uid = %snapshot.uid,
            path = %record_path.display(),
            bytes = bytes.len(),
            "Saved player snapshot"
        );
        Ok(())
    }

    fn load_snapshot(&self, uid: &PlayerUid) -> Option<PlayerSnapshot> {
        let path = self.record_path(uid);

        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(%uid, path = %path.display(), error = %e, "failed to read player record");
                return None;
            }
        };

        let mut snapshot: PlayerSnapshot = match serde_json::from_slice(&contents) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    %uid,
                    path = %path.display(),
                    error = %e,
                    "unreadable player record, treating as absent"
                );
                return None;
            }
        };

        if snapshot.uid.as_str().is_empty() {
            snapshot.uid = uid.clone();
        } else if snapshot.uid != *uid {
            warn!(
                %uid,
                record_uid = %snapshot.uid,
                path = %path.display(),
                "player record belongs to another uid, treating as absent"
            );
            return None;
        }

        let from_version = snapshot.schema_version;
        if snapshot.upgrade_legacy() {
            debug!(%uid, from_version, "Upgraded legacy player record");
        }

        Some(snapshot)
    }
}

/// Read the owner of a record stored under a hashed key.
///
/// The key cannot be decoded, so the id comes from the record body and
/// must hash back to `key`.
fn hashed_record_uid(path: &Path, key: &str) -> Option<PlayerUid> {
    let contents = fs::read(path).ok()?;
    let snapshot: PlayerSnapshot = match serde_json::from_slice(&contents) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "skipping unreadable hashed record");
            return None;
        }
    };
    (encode_key(&snapshot.uid) == key).then_some(snapshot.uid)
}

/// Remove every orphaned temp file directly under `base_path`.
///
/// Only files carrying both the reserved prefix and the temp suffix are
/// touched; committed records are never removed. Failures are logged and
/// skipped. Returns how many files were removed.
pub fn cleanup_orphans(base_path: &Path) -> usize {
    let entries = match fs::read_dir(base_path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                base_path = %base_path.display(),
                error = %e,
                "orphan cleanup skipped: cannot read directory"
            );
            return 0;
        }
    };

    let mut removed: usize = 0;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "orphan cleanup: unreadable directory entry");
                continue;
            }
        };

        let is_orphan = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX));
        if !is_orphan {
            continue;
        }

        let path = entry.path();
        match fs::remove_file(&path) {
            Ok(()) => {
                removed = removed.saturating_add(1);
                info!(path = %path.display(), "Removed orphaned temp file");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove orphaned temp file");
            }
        }
    }

    removed
}

#[cfg(unix)]
fn sync_dir(path: &Path) {
    if let Ok(dir) = File::open(path) {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
const fn sync_dir(_path: &Path) {}
