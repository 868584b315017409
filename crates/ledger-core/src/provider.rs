//! Enrichment provider seam and the observation-backed implementation.
//!
//! The ledger service never reads the game world itself. On each tick it
//! hands the cached [`PlayerSnapshot`] of every connected player to a
//! [`SnapshotProvider`], which fills in the non-accounting groups. The
//! registry stays the only writer of `stats`.
//!
//! [`ObservedWorldProvider`] is the shipped provider: the host pushes raw
//! [`PlayerObservation`]s through [`ObservationSink`], and the provider
//! turns the latest one into snapshot fields according to the active
//! [`CaptureConfig`].

use std::collections::BTreeMap;

use ledger_types::{
    CaptureConfig, EMPTY_SLOT, ObservedClimate, PlayerEquipment, PlayerLocation, PlayerObservation,
    PlayerSnapshot, PlayerUid, PlayerWorldInfo, StatRange, UNKNOWN_CLIMATE,
};
use tracing::debug;

/// Character inventory indices of the head, body and legs armor slots.
pub const ARMOR_SLOTS: [usize; 3] = [12, 13, 14];

/// Supplies the non-accounting fields of a snapshot.
///
/// Implementations mutate the registry's cached snapshot in place, so any
/// group they cannot determine keeps its previous value.
pub trait SnapshotProvider: Send {
    /// Enrich `snapshot` from the provider's view of the world.
    ///
    /// When the player is unknown to the provider, set `online = false`
    /// and leave everything else untouched. Never write `snapshot.stats`.
    fn create_snapshot_for(&mut self, snapshot: &mut PlayerSnapshot);

    /// Replace the set of enrichment groups collected from now on.
    fn update_capture(&mut self, capture: CaptureConfig);
}

/// Receives raw host readings for connected players.
pub trait ObservationSink {
    /// Record the latest readings for `uid`, replacing earlier ones.
    fn observe(&mut self, uid: PlayerUid, observation: PlayerObservation);

    /// Drop all readings for `uid`, typically on disconnect.
    fn forget(&mut self, uid: &PlayerUid);
}

// ---------------------------------------------------------------------------
// Observed world provider
// ---------------------------------------------------------------------------

/// Provider backed by observations pushed from the host.
#[derive(Debug, Clone, Default)]
pub struct ObservedWorldProvider {
    capture: CaptureConfig,
    observations: BTreeMap<PlayerUid, PlayerObservation>,
}

impl ObservedWorldProvider {
    /// Create a provider collecting the given groups.
    pub const fn new(capture: CaptureConfig) -> Self {
        Self {
            capture,
            observations: BTreeMap::new(),
        }
    }

    /// The active capture set.
    pub const fn capture(&self) -> CaptureConfig {
        self.capture
    }

    /// Latest observation for `uid`, if any.
    pub fn observation(&self, uid: &PlayerUid) -> Option<&PlayerObservation> {
        self.observations.get(uid)
    }

    /// Number of players with a live observation.
    pub fn tracked(&self) -> usize {
        self.observations.len()
    }
}

impl SnapshotProvider for ObservedWorldProvider {
    fn create_snapshot_for(&mut self, snapshot: &mut PlayerSnapshot) {
        let Some(obs) = self.observations.get(&snapshot.uid) else {
            snapshot.online = false;
            return;
        };

        snapshot.online = true;
        let capture = self.capture;

        if capture.vitals {
            fill_vitals(snapshot, obs);
        }
        if capture.ping {
            if let Some(ping) = obs.ping_ms {
                snapshot.vitals.ping_ms = Some(ping);
            }
        }
        if capture.equipment {
            fill_equipment(snapshot, obs);
        }
        if capture.location {
            if let Some(pos) = obs.position {
                snapshot.location = Some(PlayerLocation {
                    x: finite_or_zero(pos.x),
                    y: finite_or_zero(pos.y),
                    z: finite_or_zero(pos.z),
                    dimension: pos.dimension,
                });
            }
        }
        if capture.world {
            if let Some(climate) = obs.climate {
                snapshot.world = PlayerWorldInfo {
                    climate_tag: climate_tag(climate).to_owned(),
                    ambient_temperature: Some(finite_or_zero(climate.temperature)),
                };
            }
        }
    }

    fn update_capture(&mut self, capture: CaptureConfig) {
        if capture != self.capture {
            debug!(?capture, "Capture groups updated");
        }
        self.capture = capture;
    }
}

impl ObservationSink for ObservedWorldProvider {
    fn observe(&mut self, uid: PlayerUid, observation: PlayerObservation) {
        self.observations.insert(uid, observation);
    }

    fn forget(&mut self, uid: &PlayerUid) {
        self.observations.remove(uid);
    }
}

fn fill_vitals(snapshot: &mut PlayerSnapshot, obs: &PlayerObservation) {
    if let Some(current) = obs.health {
        snapshot.vitals.health = Some(StatRange {
            current: finite_or_zero(current),
            max: finite_or_zero(obs.max_health.unwrap_or_default()),
        });
    }
    if let Some(current) = obs.saturation {
        snapshot.vitals.hunger = Some(StatRange {
            current: finite_or_zero(current),
            max: finite_or_zero(obs.max_saturation.unwrap_or_default()),
        });
    }
    if let Some(tiredness) = obs.tiredness {
        snapshot.vitals.tiredness = Some(finite_or_zero(tiredness));
    }
}

fn fill_equipment(snapshot: &mut PlayerSnapshot, obs: &PlayerObservation) {
    let armor = obs.character_slots.as_ref().map_or_else(
        || snapshot.equipment.armor.clone(),
        |slots| {
            ARMOR_SLOTS
                .iter()
                .map(|&idx| {
                    slots
                        .get(idx)
                        .and_then(Option::as_deref)
                        .filter(|code| !code.is_empty())
                        .unwrap_or(EMPTY_SLOT)
                        .to_owned()
                })
                .collect()
        },
    );

    let held_item = obs
        .held_item
        .as_deref()
        .filter(|code| !code.is_empty())
        .unwrap_or(EMPTY_SLOT)
        .to_owned();

    snapshot.equipment = PlayerEquipment { armor, held_item };
}

/// Map NaN and infinities to zero so they never reach a JSON record.
pub const fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Coarse climate classification. Rules are checked in order, first match
/// wins.
pub const fn climate_tag(climate: ObservedClimate) -> &'static str {
    let temp = finite_or_zero(climate.temperature);
    let rain = finite_or_zero(climate.rainfall);

    if temp >= 24.0 && rain >= 0.6 {
        "tropical"
    } else if temp >= 18.0 && rain >= 0.4 {
        "temperate"
    } else if temp <= 0.0 {
        "winter"
    } else if rain <= 0.2 {
        "arid"
    } else {
        UNKNOWN_CLIMATE
    }
}
