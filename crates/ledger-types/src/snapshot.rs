//! The persisted player record and its field groups.
//!
//! A [`PlayerSnapshot`] is split into three kinds of data:
//!
//! - **Identity and meta** (`uid`, `name`, `online`, [`SnapshotMeta`]):
//!   maintained by the session registry and the ledger service.
//! - **Accounting** ([`PlayerStats`]): deaths and playtime. The registry is
//!   the single source of truth; enrichment providers never write it.
//! - **Enrichment** ([`PlayerVitals`], [`PlayerEquipment`],
//!   [`PlayerLocation`], [`PlayerWorldInfo`]): filled by the provider on
//!   each tick and replaced wholesale per group.
//!
//! Every struct is `#[serde(default)]` so older or partial files still
//! parse. The explicit [`PlayerSnapshot::schema_version`] tag drives
//! migrations in [`PlayerSnapshot::upgrade_legacy`].
//!
//! # Legacy Records
//!
//! Records without a version tag are schema version 1, the layout of the
//! first ledger release. Its keys are `PascalCase` (`Uid`, `Stats`,
//! `Deaths`). Playtime was fractional `PlaytimeHours`, health and hunger
//! lived under `Stats`, and `FirstJoin`/`LastJoin` sat at the top level as
//! strings. The current field names accept those keys as aliases; fields
//! with no current home are read into `legacy_*` fields, which are never
//! written back.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;

use crate::ids::PlayerUid;

/// Schema version written by this build.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 2;

/// Schema version assumed for records that carry no version tag.
pub const LEGACY_SCHEMA_VERSION: u32 = 1;

/// Name used when the host reports a blank player name.
pub const UNKNOWN_PLAYER_NAME: &str = "Unknown";

/// Placeholder for an empty equipment slot.
pub const EMPTY_SLOT: &str = "none";

/// Climate tag used when no classification applies.
pub const UNKNOWN_CLIMATE: &str = "unknown";

const SECONDS_PER_HOUR: f64 = 3600.0;

const fn legacy_schema_version() -> u32 {
    LEGACY_SCHEMA_VERSION
}

/// Read a legacy timestamp: unix seconds as a number or string, or an
/// ISO 8601 date. Anything unparseable (including `""`) reads as `None`.
fn deserialize_legacy_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Unix(i64),
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    let parsed = match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Unix(seconds)) => Some(seconds),
        Some(Raw::Text(text)) => parse_legacy_timestamp(&text),
        Some(Raw::Other(_)) | None => None,
    };
    Ok(parsed.filter(|seconds| *seconds > 0))
}

fn parse_legacy_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(seconds) = text.parse::<i64>() {
        return Some(seconds);
    }
    if let Ok(stamped) = DateTime::parse_from_rfc3339(text) {
        return Some(stamped.timestamp());
    }
    // Timestamps without an offset are UTC.
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().timestamp())
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The externally visible, persisted record for one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(default)]
pub struct PlayerSnapshot {
    /// Record layout version. Missing in files written before versioning.
    #[serde(default = "legacy_schema_version")]
    pub schema_version: u32,
    /// Host-issued player identifier.
    #[serde(alias = "Uid")]
    pub uid: PlayerUid,
    /// Display name, last seen wins.
    #[serde(alias = "Name")]
    pub name: String,
    /// Whether the player was connected when this record was written.
    #[serde(alias = "Online")]
    pub online: bool,
    /// Join and visibility timestamps.
    pub meta: SnapshotMeta,
    /// Registry-owned accounting counters.
    #[serde(alias = "Stats")]
    pub stats: PlayerStats,
    /// Health, hunger and other live readings.
    pub vitals: PlayerVitals,
    /// Worn armor and held item.
    #[serde(alias = "Equipment")]
    pub equipment: PlayerEquipment,
    /// Last known position, if it was ever captured.
    pub location: Option<PlayerLocation>,
    /// Climate at the player's position.
    #[serde(alias = "World")]
    pub world: PlayerWorldInfo,
    /// Top-level first join of schema version 1. Read only for migration.
    #[serde(
        rename = "FirstJoin",
        deserialize_with = "deserialize_legacy_timestamp",
        skip_serializing
    )]
    #[ts(skip)]
    pub legacy_first_join: Option<i64>,
    /// Top-level last join of schema version 1. Read only for migration.
    #[serde(
        rename = "LastJoin",
        deserialize_with = "deserialize_legacy_timestamp",
        skip_serializing
    )]
    #[ts(skip)]
    pub legacy_last_join: Option<i64>,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            uid: PlayerUid::default(),
            name: String::new(),
            online: false,
            meta: SnapshotMeta::default(),
            stats: PlayerStats::default(),
            vitals: PlayerVitals::default(),
            equipment: PlayerEquipment::default(),
            location: None,
            world: PlayerWorldInfo::default(),
            legacy_first_join: None,
            legacy_last_join: None,
        }
    }
}

impl PlayerSnapshot {
    /// Create a fresh record for a player first seen at `now_unix`.
    ///
    /// `first_join` and `last_join` are both set to `now_unix`.
    pub fn new(uid: PlayerUid, name: impl Into<String>, now_unix: i64) -> Self {
        Self {
            uid,
            name: name.into(),
            meta: SnapshotMeta {
                first_join: now_unix,
                last_join: now_unix,
                last_seen: 0,
            },
            ..Self::default()
        }
    }

    /// Copy every enrichment group and the join/seen timestamps from a
    /// previously persisted record.
    ///
    /// Used once, when a record is seeded from storage, so that a restart
    /// never blanks the payload already on disk. Identity, `online`,
    /// `first_join` and accounting are left alone.
    pub fn restore_enrichment_from(&mut self, persisted: &Self) {
        self.vitals = persisted.vitals.clone();
        self.equipment = persisted.equipment.clone();
        self.location = persisted.location.clone();
        self.world = persisted.world.clone();
        self.meta.last_join = persisted.meta.last_join;
        self.meta.last_seen = persisted.meta.last_seen;
    }

    /// Migrate a record loaded from an older schema to the current one.
    ///
    /// Version 1 stored playtime as fractional hours; when the record has
    /// no whole-second playtime the hours are converted (floored). Its
    /// join timestamps and vitals move into `meta` and `vitals` unless
    /// those already hold values. Returns `true` if anything changed.
    pub fn upgrade_legacy(&mut self) -> bool {
        if self.schema_version >= SNAPSHOT_SCHEMA_VERSION {
            return false;
        }

        let playtime_missing = self.stats.playtime_seconds == 0;
        if let Some(hours) = self.stats.legacy_playtime_hours.take().filter(|_| playtime_missing) {
            self.stats.playtime_seconds = hours_to_seconds(hours);
        }

        let first_join = self.legacy_first_join.take();
        if self.meta.first_join <= 0 {
            self.meta.first_join = first_join.unwrap_or(self.meta.first_join);
        }
        let last_join = self.legacy_last_join.take();
        if self.meta.last_join <= 0 {
            self.meta.last_join = last_join.unwrap_or(self.meta.last_join);
        }

        let health = self.stats.legacy_health.take();
        let hunger = self.stats.legacy_hunger.take();
        self.vitals.health = self.vitals.health.or(health);
        self.vitals.hunger = self.vitals.hunger.or(hunger);

        self.schema_version = SNAPSHOT_SCHEMA_VERSION;
        true
    }
}

/// Convert fractional hours to whole seconds, treating garbage as zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hours_to_seconds(hours: f64) -> u64 {
    if !hours.is_finite() || hours <= 0.0 {
        return 0;
    }
    // Saturating float-to-int cast; values are already non-negative.
    (hours * SECONDS_PER_HOUR).floor() as u64
}

// ---------------------------------------------------------------------------
// Meta
// ---------------------------------------------------------------------------

/// Join and visibility timestamps, all in unix seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(default)]
pub struct SnapshotMeta {
    /// First time the player was ever seen. Set once, never overwritten
    /// once positive.
    pub first_join: i64,
    /// Most recent join.
    pub last_join: i64,
    /// Most recent moment the player was observed connected or acting.
    /// Not bumped while the player is offline.
    pub last_seen: i64,
}

// ---------------------------------------------------------------------------
// Accounting
// ---------------------------------------------------------------------------

/// Cross-session accounting counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(default)]
pub struct PlayerStats {
    /// Total deaths across all sessions.
    #[serde(alias = "Deaths")]
    pub deaths: u32,
    /// Total time spent online across all sessions, in seconds.
    pub playtime_seconds: u64,
    /// Playtime as written by schema version 1. Read only for migration.
    #[serde(rename = "PlaytimeHours", alias = "playtime_hours", skip_serializing)]
    #[ts(skip)]
    pub legacy_playtime_hours: Option<f64>,
    /// Health as written by schema version 1. Read only for migration.
    #[serde(rename = "Health", skip_serializing)]
    #[ts(skip)]
    pub legacy_health: Option<StatRange>,
    /// Hunger as written by schema version 1. Read only for migration.
    #[serde(rename = "Hunger", skip_serializing)]
    #[ts(skip)]
    pub legacy_hunger: Option<StatRange>,
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// A current/max reading such as health or saturation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(default)]
pub struct StatRange {
    /// Current value.
    #[serde(alias = "Current")]
    pub current: f64,
    /// Maximum value.
    #[serde(alias = "Max")]
    pub max: f64,
}

/// Live readings. `None` means never captured, which is distinct from a
/// captured zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(default)]
pub struct PlayerVitals {
    /// Health pool.
    pub health: Option<StatRange>,
    /// Hunger saturation.
    pub hunger: Option<StatRange>,
    /// Tiredness level, when the host tracks it.
    pub tiredness: Option<f64>,
    /// Network round trip in milliseconds.
    pub ping_ms: Option<u32>,
}

/// Worn armor and the item in the active hotbar slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(default)]
pub struct PlayerEquipment {
    /// Item codes for the head, body and legs slots.
    #[serde(alias = "Armor")]
    pub armor: Vec<String>,
    /// Item code of the held item, or `"none"`.
    #[serde(alias = "Weapon")]
    pub held_item: String,
}

impl Default for PlayerEquipment {
    fn default() -> Self {
        Self {
            armor: Vec::new(),
            held_item: String::from(EMPTY_SLOT),
        }
    }
}

/// Block position of the player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(default)]
pub struct PlayerLocation {
    /// East-west coordinate.
    pub x: f64,
    /// Height.
    pub y: f64,
    /// North-south coordinate.
    pub z: f64,
    /// Dimension index (0 is the overworld).
    pub dimension: i32,
}

/// Climate around the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(default)]
pub struct PlayerWorldInfo {
    /// Coarse climate classification (`tropical`, `temperate`, `winter`,
    /// `arid`, `unknown`).
    #[serde(alias = "Biome")]
    pub climate_tag: String,
    /// Ambient temperature in degrees Celsius.
    #[serde(alias = "Temperature")]
    pub ambient_temperature: Option<f64>,
}

impl Default for PlayerWorldInfo {
    fn default() -> Self {
        Self {
            climate_tag: String::from(UNKNOWN_CLIMATE),
            ambient_temperature: None,
        }
    }
}
