//! Capture toggles: which enrichment groups are collected on each tick.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Set of enrichment groups the provider collects per tick.
///
/// Disabled groups keep whatever value the snapshot already holds. The set
/// can be replaced at runtime; the new set applies from the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[serde(default)]
pub struct CaptureConfig {
    /// Health, hunger and tiredness.
    pub vitals: bool,
    /// Network round trip.
    pub ping: bool,
    /// Armor and held item.
    pub equipment: bool,
    /// Block position.
    pub location: bool,
    /// Climate tag and ambient temperature.
    pub world: bool,
}

impl CaptureConfig {
    /// A set with every group disabled.
    pub const fn none() -> Self {
        Self {
            vitals: false,
            ping: false,
            equipment: false,
            location: false,
            world: false,
        }
    }

    /// Whether at least one group is enabled.
    pub const fn any_enabled(self) -> bool {
        self.vitals || self.ping || self.equipment || self.location || self.world
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            vitals: true,
            ping: true,
            equipment: true,
            location: true,
            world: true,
        }
    }
}
