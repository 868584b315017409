//! Session accounting and orchestration for the player ledger.
//!
//! This crate turns host triggers (join, leave, death, periodic tick) into
//! durable per-player snapshots:
//!
//! ```text
//! HostEventSource --> run_ledger --> LedgerService --+--> PlayerRegistry (accounting)
//!                        ^                           +--> SnapshotProvider (enrichment)
//!                        |                           +--> PlayerStorage... (persist)
//!                  LedgerControl
//!           (stop, pending capture reload)
//! ```
//!
//! # Modules
//!
//! - [`clock`] -- Wall-clock seam with a real and a manual implementation.
//! - [`config`] -- Configuration loading from `ledger-config.yaml` into
//!   strongly-typed structs.
//! - [`control`] -- Shared stop flag and pending capture reload.
//! - [`provider`] -- [`SnapshotProvider`] trait and
//!   [`ObservedWorldProvider`].
//! - [`registry`] -- In-memory session and accounting state.
//! - [`runner`] -- The async event and tick loop.
//! - [`service`] -- [`LedgerService`], the trigger orchestrator.
//!
//! [`SnapshotProvider`]: provider::SnapshotProvider
//! [`ObservedWorldProvider`]: provider::ObservedWorldProvider
//! [`LedgerService`]: service::LedgerService

pub mod clock;
pub mod config;
pub mod control;
pub mod provider;
pub mod registry;
pub mod runner;
pub mod service;

#[cfg(test)]
mod test_support;
