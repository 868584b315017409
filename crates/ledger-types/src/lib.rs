//! Shared type definitions for the player ledger.
//!
//! This crate is the single source of truth for the record shapes written
//! to disk. Types defined here flow downstream to `TypeScript` via `ts-rs`
//! for dashboards that read the ledger files.
//!
//! # Modules
//!
//! - [`ids`] -- Player identifier wrapper
//! - [`snapshot`] -- The persisted player record and its field groups
//! - [`capture`] -- Capture toggles for enrichment groups
//! - [`observation`] -- Raw host readings consumed by enrichment providers

pub mod capture;
pub mod ids;
pub mod observation;
pub mod snapshot;

// Re-export all public types at crate root for convenience.
pub use capture::CaptureConfig;
pub use ids::PlayerUid;
pub use observation::{ObservedClimate, ObservedPosition, PlayerObservation};
pub use snapshot::{
    EMPTY_SLOT, LEGACY_SCHEMA_VERSION, PlayerEquipment, PlayerLocation, PlayerSnapshot,
    PlayerStats, PlayerVitals, PlayerWorldInfo, SNAPSHOT_SCHEMA_VERSION, SnapshotMeta, StatRange,
    UNKNOWN_CLIMATE, UNKNOWN_PLAYER_NAME,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation for the persisted record shapes.

    #[test]
    fn export_bindings() {
        // ts-rs generates TypeScript bindings when types with
        // #[ts(export)] are used. The files are written to the `bindings/`
        // directory relative to the crate root.
        use ts_rs::TS;

        let _ = crate::ids::PlayerUid::export_all();
        let _ = crate::capture::CaptureConfig::export_all();
        let _ = crate::snapshot::PlayerSnapshot::export_all();
        let _ = crate::snapshot::SnapshotMeta::export_all();
        let _ = crate::snapshot::PlayerStats::export_all();
        let _ = crate::snapshot::StatRange::export_all();
        let _ = crate::snapshot::PlayerVitals::export_all();
        let _ = crate::snapshot::PlayerEquipment::export_all();
        let _ = crate::snapshot::PlayerLocation::export_all();
        let _ = crate::snapshot::PlayerWorldInfo::export_all();
    }
}
