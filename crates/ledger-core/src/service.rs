//! The ledger orchestrator.
//!
//! [`LedgerService`] reacts to host triggers (join, leave, death, periodic
//! tick, shutdown) by updating the [`PlayerRegistry`], asking the
//! [`SnapshotProvider`] for enrichment, and committing the resulting
//! snapshot to every configured [`PlayerStorage`].
//!
//! # Seeding
//!
//! The first time any trigger references a player in this process, the
//! service looks for a durable record in the stores (in order, first hit
//! wins) and seeds the registry from it before touching any counter. The
//! persisted enrichment groups and join timestamps are restored alongside,
//! so a restart never blanks what is already on disk.
//!
//! # Persist step
//!
//! Every trigger ends by persisting the affected players:
//!
//! 1. A blank name becomes `"Unknown"`.
//! 2. A non-positive `first_join` is backfilled with the trigger time.
//! 3. The snapshot is written to every store in order. A failing store
//!    never blocks the next one; each failure is logged and reported in a
//!    [`PersistError`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ledger_storage::{PlayerStorage, StorageError};
use ledger_types::{CaptureConfig, PlayerUid, UNKNOWN_PLAYER_NAME};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::provider::SnapshotProvider;
use crate::registry::PlayerRegistry;

/// Connected players, by uid, with their display names.
pub type Roster = BTreeMap<PlayerUid, String>;

// ---------------------------------------------------------------------------
// Errors and summaries
// ---------------------------------------------------------------------------

/// One store's failure to commit a snapshot.
#[derive(Debug)]
pub struct StoreFailure {
    /// Name of the store that failed.
    pub store: &'static str,
    /// The error it reported.
    pub error: StorageError,
}

impl fmt::Display for StoreFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.store, self.error)
    }
}

/// A snapshot that at least one store failed to commit.
///
/// Stores not listed in `failures` committed successfully.
#[derive(Debug, thiserror::Error)]
#[error("failed to persist player {uid} to {} store(s)", .failures.len())]
pub struct PersistError {
    /// The player whose snapshot was being persisted.
    pub uid: PlayerUid,
    /// Every store that failed, in store order.
    pub failures: Vec<StoreFailure>,
}

/// Outcome of one periodic tick.
#[derive(Debug, Default)]
pub struct TickSummary {
    /// Connected players enriched and persisted.
    pub online: usize,
    /// Known but disconnected players reconciled.
    pub offline: usize,
    /// Persist failures, one per affected player. Never aborts the tick.
    pub failures: Vec<PersistError>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Drives the registry, the enrichment provider and the stores from host
/// triggers.
pub struct LedgerService<P> {
    registry: PlayerRegistry,
    provider: P,
    storages: Vec<Box<dyn PlayerStorage>>,
    clock: Arc<dyn Clock>,
}

impl<P> fmt::Debug for LedgerService<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerService")
            .field("players", &self.registry.len())
            .field(
                "storages",
                &self.storages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl<P: SnapshotProvider> LedgerService<P> {
    /// Create a service writing to `storages`, in order.
    ///
    /// An empty store list is allowed; accounting still runs in memory.
    pub fn new(provider: P, storages: Vec<Box<dyn PlayerStorage>>, clock: Arc<dyn Clock>) -> Self {
        if storages.is_empty() {
            warn!("No player stores configured, snapshots will not be persisted");
        }
        Self {
            registry: PlayerRegistry::new(),
            provider,
            storages,
            clock,
        }
    }

    /// The session registry.
    pub const fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    /// The enrichment provider.
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    /// Mutable access to the enrichment provider, for pushing observations.
    pub const fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    /// Names of the configured stores, in write order.
    pub fn storage_names(&self) -> Vec<&'static str> {
        self.storages.iter().map(|s| s.name()).collect()
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    /// A player connected.
    ///
    /// Opens an online interval, stamps `last_join` and `last_seen`, and
    /// persists.
    pub fn on_player_join(&mut self, uid: &PlayerUid, name: &str) -> Result<(), PersistError> {
        let now = self.clock.now_utc();
        let now_unix = now.timestamp();

        self.touch(uid, name);
        self.registry.mark_online(uid, now);
        if let Some(snapshot) = self.registry.get_mut(uid) {
            snapshot.online = true;
            snapshot.meta.last_join = now_unix;
            snapshot.meta.last_seen = now_unix;
        }
        self.registry.sync_accounting(uid, now);

        info!(%uid, name, "Player joined");
        self.persist(uid, now_unix)
    }

    /// A player disconnected.
    ///
    /// Commits the open interval, stamps `last_seen`, and persists.
    pub fn on_player_leave(&mut self, uid: &PlayerUid, name: &str) -> Result<(), PersistError> {
        let now = self.clock.now_utc();
        let now_unix = now.timestamp();

        self.touch(uid, name);
        self.registry.mark_offline(uid, now);
        if let Some(snapshot) = self.registry.get_mut(uid) {
            snapshot.online = false;
            snapshot.meta.last_seen = now_unix;
        }
        self.registry.sync_accounting(uid, now);

        info!(
            %uid,
            name,
            playtime_seconds = self.registry.playtime_seconds(uid, now),
            "Player left"
        );
        self.persist(uid, now_unix)
    }

    /// A player died.
    pub fn on_player_death(&mut self, uid: &PlayerUid, name: &str) -> Result<(), PersistError> {
        let now = self.clock.now_utc();
        let now_unix = now.timestamp();

        self.touch(uid, name);
        let deaths = self.registry.increment_deaths(uid);
        if let Some(snapshot) = self.registry.get_mut(uid) {
            snapshot.meta.last_seen = now_unix;
        }
        self.registry.sync_accounting(uid, now);

        info!(%uid, deaths, "Player died");
        self.persist(uid, now_unix)
    }

    /// Periodic tick.
    ///
    /// Every player in `online` is enriched and persisted with
    /// `last_seen = now`. Every other known player is persisted with
    /// `online = false` and an untouched `last_seen`. A failure for one
    /// player never stops the rest of the batch.
    pub fn on_interval_tick(&mut self, online: &Roster) -> TickSummary {
        let now = self.clock.now_utc();
        let now_unix = now.timestamp();
        let mut summary = TickSummary::default();

        for (uid, name) in online {
            self.touch(uid, name);
            self.registry.mark_online(uid, now);
            if let Some(snapshot) = self.registry.get_mut(uid) {
                self.provider.create_snapshot_for(snapshot);
                snapshot.online = true;
                snapshot.meta.last_seen = now_unix;
            }
            self.registry.sync_accounting(uid, now);

            summary.online = summary.online.saturating_add(1);
            if let Err(e) = self.persist(uid, now_unix) {
                summary.failures.push(e);
            }
        }

        let offline: Vec<PlayerUid> = self
            .registry
            .snapshots()
            .filter(|s| !online.contains_key(&s.uid))
            .map(|s| s.uid.clone())
            .collect();

        for uid in &offline {
            self.close_missed_session(uid, now);
            if let Some(snapshot) = self.registry.get_mut(uid) {
                snapshot.online = false;
            }
            self.registry.sync_accounting(uid, now);

            summary.offline = summary.offline.saturating_add(1);
            if let Err(e) = self.persist(uid, now_unix) {
                summary.failures.push(e);
            }
        }

        debug!(
            online = summary.online,
            offline = summary.offline,
            failures = summary.failures.len(),
            "Tick complete"
        );
        summary
    }

    /// Replace the enrichment groups collected from the next tick on.
    pub fn update_capture_config(&mut self, capture: CaptureConfig) {
        info!(?capture, "Capture config updated");
        if !capture.any_enabled() {
            warn!("Every capture group is disabled, ticks will record accounting only");
        }
        self.provider.update_capture(capture);
    }

    /// Clean shutdown: close the session of every connected player as if
    /// they had left, so no open interval is lost.
    pub fn on_shutdown(&mut self, online: &Roster) -> Vec<PersistError> {
        info!(connected = online.len(), "Closing open sessions for shutdown");
        online
            .iter()
            .filter_map(|(uid, name)| self.on_player_leave(uid, name).err())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Ensure the player's snapshot exists with a current name, seeding it
    /// from storage on first reference.
    fn touch(&mut self, uid: &PlayerUid, name: &str) {
        let name = if name.trim().is_empty() {
            self.registry
                .get(uid)
                .map_or_else(|| UNKNOWN_PLAYER_NAME.to_owned(), |s| s.name.clone())
        } else {
            name.to_owned()
        };

        self.registry.get_or_create(uid, &name, self.clock.as_ref());
        self.ensure_seeded(uid);
    }

    fn ensure_seeded(&mut self, uid: &PlayerUid) {
        if self.registry.is_seeded(uid) {
            return;
        }

        let Some(persisted) = self.storages.iter().find_map(|s| s.load_snapshot(uid)) else {
            debug!(%uid, "No persisted record, starting fresh");
            self.registry.mark_seeded(uid);
            return;
        };

        let applied = self.registry.seed_from_persisted(
            uid,
            persisted.stats.deaths,
            persisted.stats.playtime_seconds,
            persisted.meta.first_join,
        );
        if applied {
            if let Some(snapshot) = self.registry.get_mut(uid) {
                snapshot.restore_enrichment_from(&persisted);
            }
            info!(
                %uid,
                deaths = persisted.stats.deaths,
                playtime_seconds = persisted.stats.playtime_seconds,
                "Seeded player from persisted record"
            );
        }
    }

    /// A disconnected player with an open interval missed its leave
    /// trigger. Close the interval at the last moment they were seen.
    fn close_missed_session(&mut self, uid: &PlayerUid, now: DateTime<Utc>) {
        if !self.registry.is_online(uid) {
            return;
        }

        let last_seen = self
            .registry
            .get(uid)
            .map_or(0, |s| s.meta.last_seen);
        let closed_at = if last_seen > 0 {
            DateTime::from_timestamp(last_seen, 0).unwrap_or(now)
        } else {
            now
        };

        warn!(%uid, closed_at = %closed_at, "Closing session with no leave event");
        self.registry.mark_offline(uid, closed_at);
    }

    fn persist(&mut self, uid: &PlayerUid, now_unix: i64) -> Result<(), PersistError> {
        let Some(snapshot) = self.registry.get_mut(uid) else {
            return Ok(());
        };

        if snapshot.name.trim().is_empty() {
            UNKNOWN_PLAYER_NAME.clone_into(&mut snapshot.name);
        }
        if snapshot.meta.first_join <= 0 {
            snapshot.meta.first_join = now_unix;
        }

        let mut failures = Vec::new();
        for store in &self.storages {
            match store.save_snapshot(snapshot) {
                Ok(()) => debug!(%uid, store = store.name(), "Snapshot persisted"),
                Err(error) => {
                    error!(%uid, store = store.name(), error = %error, "Failed to persist snapshot");
                    failures.push(StoreFailure {
                        store: store.name(),
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PersistError {
                uid: uid.clone(),
                failures,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ledger_types::{PlayerObservation, PlayerSnapshot};

    use super::*;
    use crate::clock::ManualClock;
    use crate::provider::{ObservationSink, ObservedWorldProvider};
    use crate::test_support::{FailingStore, MemoryStore};

    const T0: i64 = 1_700_000_000;

    fn uid() -> PlayerUid {
        PlayerUid::from("p1")
    }

    fn roster(entries: &[(&str, &str)]) -> Roster {
        entries
            .iter()
            .map(|(uid, name)| (PlayerUid::from(*uid), (*name).to_owned()))
            .collect()
    }

    struct Harness {
        service: LedgerService<ObservedWorldProvider>,
        clock: Arc<ManualClock>,
        store: MemoryStore,
    }

    fn harness_with(store: MemoryStore) -> Harness {
        let clock = Arc::new(ManualClock::at_unix(T0));
        let service = LedgerService::new(
            ObservedWorldProvider::default(),
            vec![Box::new(store.clone())],
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        Harness {
            service,
            clock,
            store,
        }
    }

    fn harness() -> Harness {
        harness_with(MemoryStore::default())
    }

    #[test]
    fn join_persists_online_snapshot() {
        let mut h = harness();
        h.service.on_player_join(&uid(), "Kora").unwrap();

        let rec = h.store.record(&uid()).unwrap();
        assert!(rec.online);
        assert_eq!(rec.name, "Kora");
        assert_eq!(rec.meta.first_join, T0);
        assert_eq!(rec.meta.last_join, T0);
        assert_eq!(rec.meta.last_seen, T0);
        assert_eq!(rec.stats.playtime_seconds, 0);
    }

    #[test]
    fn leave_commits_session_playtime() {
        let mut h = harness();
        h.service.on_player_join(&uid(), "Kora").unwrap();
        h.clock.advance_secs(95);
        h.service.on_player_leave(&uid(), "Kora").unwrap();

        let rec = h.store.record(&uid()).unwrap();
        assert!(!rec.online);
        assert_eq!(rec.stats.playtime_seconds, 95);
        assert_eq!(rec.meta.last_seen, T0 + 95);
    }

    #[test]
    fn join_seeds_from_persisted_record() {
        let mut persisted = PlayerSnapshot::new(uid(), "Kora", T0 - 86_400);
        persisted.stats.deaths = 5;
        persisted.stats.playtime_seconds = 100;
        let mut h = harness_with(MemoryStore::with_record(persisted));

        h.service.on_player_join(&uid(), "Kora").unwrap();
        h.clock.advance_secs(30);
        h.service.on_player_leave(&uid(), "Kora").unwrap();

        let rec = h.store.record(&uid()).unwrap();
        assert_eq!(rec.stats.deaths, 5);
        assert_eq!(rec.stats.playtime_seconds, 130);
        assert_eq!(rec.meta.first_join, T0 - 86_400);
    }

    #[test]
    fn death_before_join_still_seeds() {
        let mut persisted = PlayerSnapshot::new(uid(), "Kora", T0 - 10);
        persisted.stats.deaths = 5;
        let mut h = harness_with(MemoryStore::with_record(persisted));

        h.service.on_player_death(&uid(), "Kora").unwrap();
        assert_eq!(h.store.record(&uid()).unwrap().stats.deaths, 6);
    }

    #[test]
    fn seeding_restores_enrichment() {
        let mut persisted = PlayerSnapshot::new(uid(), "Kora", T0 - 10);
        persisted.equipment.held_item = "game:axe-flint".to_owned();
        persisted.world.climate_tag = "arid".to_owned();
        let mut h = harness_with(MemoryStore::with_record(persisted));

        // The provider has no observation yet, so nothing new is captured.
        h.service.on_interval_tick(&roster(&[("p1", "Kora")]));

        let rec = h.store.record(&uid()).unwrap();
        assert_eq!(rec.equipment.held_item, "game:axe-flint");
        assert_eq!(rec.world.climate_tag, "arid");
        assert!(rec.online);
    }

    #[test]
    fn each_event_writes_the_record_once() {
        let mut h = harness();
        h.service.on_player_join(&uid(), "Kora").unwrap();
        assert_eq!(h.store.saves(), 1);
        h.service.on_player_death(&uid(), "Kora").unwrap();
        assert_eq!(h.store.saves(), 2);
        h.service.on_interval_tick(&roster(&[("p1", "Kora")]));
        assert_eq!(h.store.saves(), 3);
        h.service.on_player_leave(&uid(), "Kora").unwrap();
        assert_eq!(h.store.saves(), 4);
    }

    #[test]
    fn deaths_accumulate() {
        let mut h = harness();
        h.service.on_player_join(&uid(), "Kora").unwrap();
        for _ in 0..3 {
            h.service.on_player_death(&uid(), "Kora").unwrap();
        }
        assert_eq!(h.store.record(&uid()).unwrap().stats.deaths, 3);
        assert_eq!(h.service.registry().deaths(&uid()), 3);
    }

    #[test]
    fn blank_name_is_persisted_as_unknown() {
        let mut h = harness();
        h.service.on_player_join(&uid(), "   ").unwrap();
        assert_eq!(h.store.record(&uid()).unwrap().name, UNKNOWN_PLAYER_NAME);
    }

    #[test]
    fn blank_name_keeps_known_name() {
        let mut h = harness();
        h.service.on_player_join(&uid(), "Kora").unwrap();
        h.service.on_player_death(&uid(), "").unwrap();
        assert_eq!(h.store.record(&uid()).unwrap().name, "Kora");
    }

    #[test]
    fn tick_persists_live_playtime() {
        let mut h = harness();
        h.service.on_player_join(&uid(), "Kora").unwrap();
        h.clock.advance_secs(60);

        let summary = h.service.on_interval_tick(&roster(&[("p1", "Kora")]));
        assert_eq!(summary.online, 1);
        assert_eq!(summary.offline, 0);
        assert!(summary.failures.is_empty());

        let rec = h.store.record(&uid()).unwrap();
        assert_eq!(rec.stats.playtime_seconds, 60);
        assert_eq!(rec.meta.last_seen, T0 + 60);
        assert!(h.service.registry().is_online(&uid()));
    }

    #[test]
    fn tick_reconciles_offline_players_without_bumping_last_seen() {
        let mut h = harness();
        h.service.on_player_join(&uid(), "Kora").unwrap();
        h.clock.advance_secs(40);
        h.service.on_player_leave(&uid(), "Kora").unwrap();
        h.clock.advance_secs(300);

        let summary = h.service.on_interval_tick(&Roster::new());
        assert_eq!(summary.offline, 1);

        let rec = h.store.record(&uid()).unwrap();
        assert!(!rec.online);
        assert_eq!(rec.meta.last_seen, T0 + 40);
        assert_eq!(rec.stats.playtime_seconds, 40);
    }

    #[test]
    fn missed_leave_is_closed_at_last_seen() {
        let mut h = harness();
        h.service.on_player_join(&uid(), "Kora").unwrap();
        h.clock.advance_secs(60);
        h.service.on_interval_tick(&roster(&[("p1", "Kora")]));

        // Player vanished without a leave event.
        h.clock.advance_secs(600);
        h.service.on_interval_tick(&Roster::new());

        assert!(!h.service.registry().is_online(&uid()));
        let rec = h.store.record(&uid()).unwrap();
        assert_eq!(rec.stats.playtime_seconds, 60);
        assert_eq!(rec.meta.last_seen, T0 + 60);
    }

    #[test]
    fn tick_enriches_connected_players() {
        let mut h = harness();
        h.service.provider_mut().observe(
            uid(),
            PlayerObservation {
                health: Some(10.0),
                max_health: Some(15.0),
                ..PlayerObservation::default()
            },
        );

        h.service.on_interval_tick(&roster(&[("p1", "Kora")]));
        let rec = h.store.record(&uid()).unwrap();
        assert!(rec.vitals.health.is_some());
        assert!(rec.online);
    }

    #[test]
    fn capture_update_applies_on_next_tick() {
        let mut h = harness();
        h.service.update_capture_config(CaptureConfig::none());
        h.service.provider_mut().observe(
            uid(),
            PlayerObservation {
                ping_ms: Some(80),
                ..PlayerObservation::default()
            },
        );
        let online = roster(&[("p1", "Kora")]);

        h.service.on_interval_tick(&online);
        assert!(h.store.record(&uid()).unwrap().vitals.ping_ms.is_none());

        h.service.update_capture_config(CaptureConfig::default());
        h.service.on_interval_tick(&online);
        assert_eq!(h.store.record(&uid()).unwrap().vitals.ping_ms, Some(80));
    }

    #[test]
    fn failing_store_does_not_block_the_next() {
        let clock = Arc::new(ManualClock::at_unix(T0));
        let memory = MemoryStore::default();
        let mut service = LedgerService::new(
            ObservedWorldProvider::default(),
            vec![Box::new(FailingStore), Box::new(memory.clone())],
            clock as Arc<dyn Clock>,
        );

        let err = service.on_player_join(&uid(), "Kora").unwrap_err();
        assert_eq!(err.uid, uid());
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].store, "failing");
        assert!(memory.record(&uid()).is_some());
    }

    #[test]
    fn tick_collects_failures_without_aborting() {
        let clock = Arc::new(ManualClock::at_unix(T0));
        let memory = MemoryStore::default();
        let mut service = LedgerService::new(
            ObservedWorldProvider::default(),
            vec![Box::new(FailingStore), Box::new(memory.clone())],
            clock as Arc<dyn Clock>,
        );

        let summary = service.on_interval_tick(&roster(&[("a", "Ana"), ("b", "Bo")]));
        assert_eq!(summary.online, 2);
        assert_eq!(summary.failures.len(), 2);
        assert!(memory.record(&PlayerUid::from("a")).is_some());
        assert!(memory.record(&PlayerUid::from("b")).is_some());
    }

    #[test]
    fn shutdown_closes_open_sessions() {
        let mut h = harness();
        h.service.on_player_join(&uid(), "Kora").unwrap();
        h.clock.advance_secs(45);

        let failures = h.service.on_shutdown(&roster(&[("p1", "Kora")]));
        assert!(failures.is_empty());

        let rec = h.store.record(&uid()).unwrap();
        assert!(!rec.online);
        assert_eq!(rec.stats.playtime_seconds, 45);
    }

    #[test]
    fn no_stores_still_accounts_in_memory() {
        let clock = Arc::new(ManualClock::at_unix(T0));
        let mut service = LedgerService::new(
            ObservedWorldProvider::default(),
            Vec::new(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );
        service.on_player_join(&uid(), "Kora").unwrap();
        clock.advance_secs(12);
        assert_eq!(
            service.registry().playtime_seconds(&uid(), clock.now_utc()),
            12
        );
        assert!(service.storage_names().is_empty());
    }
}
