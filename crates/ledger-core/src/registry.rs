//! In-memory session registry: authoritative identity and accounting state
//! per player.
//!
//! For every player the registry owns exactly one cached [`PlayerSnapshot`]
//! and one private [`RuntimeState`], created together on first reference
//! and kept for the lifetime of the process.
//!
//! # Accounting model
//!
//! Playtime is split into a *committed* part (`accumulated_seconds`,
//! mutated only when an online interval closes) and a *live* part computed
//! on demand from `online_since`. Reads never close an interval, so no
//! background clock is needed and every read is consistent whenever it is
//! taken. The cost is that callers who want the live value reflected in a
//! snapshot must call [`PlayerRegistry::sync_accounting`] (or go through
//! [`PlayerRegistry::get_or_create`], which always does).
//!
//! # Seeding
//!
//! [`PlayerRegistry::seed_from_persisted`] imports counters from the last
//! durable record. It only applies to a player with no progress in this
//! process, so a late seed can never clobber newer in-memory values.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ledger_types::{PlayerSnapshot, PlayerUid};
use tracing::debug;

use crate::clock::Clock;

/// Private accounting state backing one player's snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct RuntimeState {
    /// Committed online time, excluding any currently open interval.
    accumulated_seconds: u64,
    /// Start of the open online interval, if any.
    online_since: Option<DateTime<Utc>>,
    /// Death counter.
    deaths: u32,
    /// Whether a seeding decision has been made for this player.
    seeded: bool,
}

impl RuntimeState {
    fn playtime_seconds(&self, now: DateTime<Utc>) -> u64 {
        let open = self
            .online_since
            .map_or(0, |since| elapsed_seconds(since, now));
        self.accumulated_seconds.saturating_add(open)
    }

    const fn has_progress(&self) -> bool {
        self.online_since.is_some() || self.accumulated_seconds > 0 || self.deaths > 0
    }
}

/// Whole seconds from `since` to `now`, floored. A clock that stepped
/// backwards yields zero rather than a negative commit.
fn elapsed_seconds(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let delta = now.signed_duration_since(since);
    u64::try_from(delta.num_seconds().max(0)).unwrap_or(0)
}

/// Owns the authoritative snapshot and accounting state for every player
/// seen by this process.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: BTreeMap<PlayerUid, PlayerSnapshot>,
    state: BTreeMap<PlayerUid, RuntimeState>,
}

impl PlayerRegistry {
    /// Create an empty registry.
    pub const fn new() -> Self {
        Self {
            players: BTreeMap::new(),
            state: BTreeMap::new(),
        }
    }

    /// Return the snapshot for `uid`, creating it if needed.
    ///
    /// An existing snapshot gets its `name` refreshed. A new one starts
    /// with `first_join = last_join = now`. Either way the accounting
    /// fields are refreshed from the live runtime state, so the returned
    /// snapshot is never stale for deaths or playtime.
    pub fn get_or_create(
        &mut self,
        uid: &PlayerUid,
        name: &str,
        clock: &dyn Clock,
    ) -> &mut PlayerSnapshot {
        let now = clock.now_utc();
        let state = self.state.entry(uid.clone()).or_default();

        let snapshot = self
            .players
            .entry(uid.clone())
            .and_modify(|existing| name.clone_into(&mut existing.name))
            .or_insert_with(|| {
                debug!(%uid, "Registered new player");
                PlayerSnapshot::new(uid.clone(), name, now.timestamp())
            });

        snapshot.stats.deaths = state.deaths;
        snapshot.stats.playtime_seconds = state.playtime_seconds(now);
        snapshot
    }

    /// Open an online interval at `now`.
    ///
    /// Idempotent: if an interval is already open it is left untouched, so
    /// duplicate join or tick triggers never double count.
    pub fn mark_online(&mut self, uid: &PlayerUid, now: DateTime<Utc>) {
        let state = self.state.entry(uid.clone()).or_default();
        if state.online_since.is_none() {
            state.online_since = Some(now);
        }
    }

    /// Close the open online interval at `now`, committing its whole
    /// elapsed seconds.
    ///
    /// No-op without an open interval, so a duplicate leave never commits
    /// twice.
    pub fn mark_offline(&mut self, uid: &PlayerUid, now: DateTime<Utc>) {
        let state = self.state.entry(uid.clone()).or_default();
        let Some(since) = state.online_since.take() else {
            return;
        };

        let elapsed = elapsed_seconds(since, now);
        state.accumulated_seconds = state.accumulated_seconds.saturating_add(elapsed);
        debug!(%uid, elapsed, total = state.accumulated_seconds, "Committed online interval");
    }

    /// Increment the death counter and mirror it into the cached snapshot.
    ///
    /// Returns the new count.
    pub fn increment_deaths(&mut self, uid: &PlayerUid) -> u32 {
        let state = self.state.entry(uid.clone()).or_default();
        state.deaths = state.deaths.saturating_add(1);

        if let Some(snapshot) = self.players.get_mut(uid) {
            snapshot.stats.deaths = state.deaths;
        }
        state.deaths
    }

    /// Current death count.
    pub fn deaths(&self, uid: &PlayerUid) -> u32 {
        self.state.get(uid).map_or(0, |s| s.deaths)
    }

    /// Committed playtime plus the open interval, as of `now`.
    pub fn playtime_seconds(&self, uid: &PlayerUid, now: DateTime<Utc>) -> u64 {
        self.state.get(uid).map_or(0, |s| s.playtime_seconds(now))
    }

    /// Whether `uid` has an open online interval.
    pub fn is_online(&self, uid: &PlayerUid) -> bool {
        self.state
            .get(uid)
            .is_some_and(|s| s.online_since.is_some())
    }

    /// Import accounting from the last durable record.
    ///
    /// Applies only if this player has not been seeded yet and has made no
    /// progress in this process (no open interval, no committed time, no
    /// deaths). Otherwise the in-memory values are newer and are kept.
    /// Either way the player counts as seeded afterwards.
    ///
    /// A positive `first_join` replaces the cached snapshot's value.
    /// Returns `true` if the persisted values were applied.
    pub fn seed_from_persisted(
        &mut self,
        uid: &PlayerUid,
        deaths: u32,
        playtime_seconds: u64,
        first_join: i64,
    ) -> bool {
        let state = self.state.entry(uid.clone()).or_default();
        if state.seeded || state.has_progress() {
            debug!(
                %uid,
                already_seeded = state.seeded,
                "Skipping seed: in-memory state is newer"
            );
            state.seeded = true;
            return false;
        }

        state.deaths = deaths;
        state.accumulated_seconds = playtime_seconds;
        state.seeded = true;

        if let Some(snapshot) = self.players.get_mut(uid) {
            snapshot.stats.deaths = deaths;
            snapshot.stats.playtime_seconds = playtime_seconds;
            if first_join > 0 {
                snapshot.meta.first_join = first_join;
            }
        }

        debug!(%uid, deaths, playtime_seconds, first_join, "Seeded from persisted record");
        true
    }

    /// Record that no durable record exists for `uid`, so no seeding will
    /// ever happen for it in this process.
    pub fn mark_seeded(&mut self, uid: &PlayerUid) {
        self.state.entry(uid.clone()).or_default().seeded = true;
    }

    /// Whether a seeding decision has been made for `uid`.
    pub fn is_seeded(&self, uid: &PlayerUid) -> bool {
        self.state.get(uid).is_some_and(|s| s.seeded)
    }

    /// Mirror live accounting into the cached snapshot as of `now`.
    pub fn sync_accounting(&mut self, uid: &PlayerUid, now: DateTime<Utc>) {
        let Some(snapshot) = self.players.get_mut(uid) else {
            return;
        };
        let state = self.state.entry(uid.clone()).or_default();
        snapshot.stats.deaths = state.deaths;
        snapshot.stats.playtime_seconds = state.playtime_seconds(now);
    }

    /// The cached snapshot for `uid`, if the player is known.
    pub fn get(&self, uid: &PlayerUid) -> Option<&PlayerSnapshot> {
        self.players.get(uid)
    }

    /// Mutable access to the cached snapshot for `uid`.
    ///
    /// Callers may change enrichment and presence fields; `stats` is
    /// overwritten by the next sync.
    pub fn get_mut(&mut self, uid: &PlayerUid) -> Option<&mut PlayerSnapshot> {
        self.players.get_mut(uid)
    }

    /// Iterate every cached snapshot in uid order.
    pub fn snapshots(&self) -> impl Iterator<Item = &PlayerSnapshot> {
        self.players.values()
    }

    /// Number of known players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether no player has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
