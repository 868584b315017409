//! Raw readings pushed by the game host about a connected player.
//!
//! An observation is whatever the host could read from the player entity
//! at that moment. Every field is optional: a reading the host could not
//! take is `None`, and the provider keeps the previous snapshot value for
//! that group instead of zeroing it.

use serde::{Deserialize, Serialize};

/// Latest host readings for one player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerObservation {
    /// Current health.
    pub health: Option<f64>,
    /// Maximum health.
    pub max_health: Option<f64>,
    /// Current hunger saturation.
    pub saturation: Option<f64>,
    /// Maximum hunger saturation.
    pub max_saturation: Option<f64>,
    /// Tiredness, when the host tracks it.
    pub tiredness: Option<f64>,
    /// Network round trip in milliseconds.
    pub ping_ms: Option<u32>,
    /// Character inventory slots (index to item code, `None` for empty).
    /// `None` means the inventory could not be read.
    pub character_slots: Option<Vec<Option<String>>>,
    /// Item code in the active hotbar slot, `None` when empty.
    pub held_item: Option<String>,
    /// Block position, `None` when the entity has no position yet.
    pub position: Option<ObservedPosition>,
    /// Climate reading at the position, `None` when the lookup failed.
    pub climate: Option<ObservedClimate>,
}

/// Position as reported by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservedPosition {
    /// East-west coordinate.
    pub x: f64,
    /// Height.
    pub y: f64,
    /// North-south coordinate.
    pub z: f64,
    /// Dimension index.
    pub dimension: i32,
}

/// Climate conditions at a position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservedClimate {
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Rainfall, 0.0 to 1.0.
    pub rainfall: f64,
}
