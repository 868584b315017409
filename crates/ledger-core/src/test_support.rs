//! In-memory stores shared by the service and runner tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use ledger_storage::{PlayerStorage, StorageError};
use ledger_types::{PlayerSnapshot, PlayerUid};

/// Store keeping records in a shared map so tests can inspect them after
/// handing the store to a service.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<BTreeMap<PlayerUid, PlayerSnapshot>>>,
    saves: Arc<Mutex<usize>>,
}

#[allow(clippy::unwrap_used)]
impl MemoryStore {
    pub fn with_record(snapshot: PlayerSnapshot) -> Self {
        let store = Self::default();
        store
            .records
            .lock()
            .unwrap()
            .insert(snapshot.uid.clone(), snapshot);
        store
    }

    pub fn record(&self, uid: &PlayerUid) -> Option<PlayerSnapshot> {
        self.records.lock().unwrap().get(uid).cloned()
    }

    pub fn saves(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[allow(clippy::unwrap_used)]
impl PlayerStorage for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn save_snapshot(&self, snapshot: &PlayerSnapshot) -> Result<(), StorageError> {
        self.records
            .lock()
            .unwrap()
            .insert(snapshot.uid.clone(), snapshot.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }

    fn load_snapshot(&self, uid: &PlayerUid) -> Option<PlayerSnapshot> {
        self.record(uid)
    }
}

/// Store whose every write fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingStore;

impl PlayerStorage for FailingStore {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn save_snapshot(&self, snapshot: &PlayerSnapshot) -> Result<(), StorageError> {
        Err(StorageError::io(
            format!("/dev/full/{}", snapshot.uid),
            std::io::Error::other("disk full"),
        ))
    }
}
