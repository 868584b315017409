//! Ledger loop runner.
//!
//! [`run_ledger`] is the top-level async function that drives a
//! [`LedgerService`] from a stream of host events and a periodic timer:
//!
//! - **Host events**: join, leave, death, observations and reloads arrive
//!   through a [`HostEventSource`] and are applied in arrival order
//! - **Periodic tick**: every interval the connected roster is enriched
//!   and every known player is persisted
//! - **Hot reload**: capture updates are queued on [`LedgerControl`] and
//!   applied right before the next tick
//! - **Clean shutdown**: on end of input or a stop request, every open
//!   session is closed and persisted
//!
//! Everything runs on one logical thread, so the service needs no locks.

use std::path::Path;
use std::time::Duration;

use ledger_types::{CaptureConfig, PlayerObservation, PlayerUid};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, LedgerConfig};
use crate::control::{LedgerControl, LedgerEndReason};
use crate::provider::{ObservationSink, SnapshotProvider};
use crate::service::{LedgerService, Roster};

/// Errors that can occur around the ledger loop.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Reloading the configuration failed.
    #[error("config reload failed: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },
}

/// A trigger reported by the game host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// A player connected.
    Join {
        /// The player.
        uid: PlayerUid,
        /// Display name at join time.
        name: String,
    },
    /// A player disconnected.
    Leave {
        /// The player.
        uid: PlayerUid,
        /// Display name at leave time.
        name: String,
    },
    /// A player died.
    Death {
        /// The player.
        uid: PlayerUid,
        /// Display name at death time.
        name: String,
    },
    /// Fresh readings for a connected player.
    Observe {
        /// The player.
        uid: PlayerUid,
        /// The readings.
        observation: Box<PlayerObservation>,
    },
    /// New capture toggles, applied from the next tick.
    Reload {
        /// The new capture set.
        capture: CaptureConfig,
    },
}

/// A feed of host events.
pub trait HostEventSource {
    /// Wait for the next event. `None` means the feed has closed for good.
    ///
    /// Must be cancel safe: the runner drops the future whenever a tick or
    /// a stop fires first, and no event may be lost when that happens.
    fn next_event(&mut self) -> impl Future<Output = Option<HostEvent>> + Send;
}

/// Result of a ledger run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Why the loop ended.
    pub end_reason: LedgerEndReason,
    /// Periodic ticks executed.
    pub ticks: u64,
    /// Host events applied.
    pub events: u64,
    /// Player snapshots that at least one store failed to commit, across
    /// the whole run including shutdown.
    pub persist_failures: usize,
}

/// Re-read the config file at `path` and return its capture toggles.
///
/// # Errors
///
/// Returns [`RunnerError::Config`] if the file cannot be read or parsed.
/// Callers keep the previous capture set in that case.
pub fn load_capture(path: &Path) -> Result<CaptureConfig, RunnerError> {
    let config = LedgerConfig::from_file(path)?;
    Ok(config.capture)
}

/// Run the ledger until the event feed closes or a stop is requested.
///
/// The first tick fires one `interval` after the call; a zero interval is
/// raised to one second. On exit the sessions of every still-connected
/// player are closed and persisted.
pub async fn run_ledger<P, S>(
    service: &mut LedgerService<P>,
    source: &mut S,
    control: &LedgerControl,
    interval: Duration,
) -> RunSummary
where
    P: SnapshotProvider + ObservationSink,
    S: HostEventSource,
{
    let interval = if interval.is_zero() {
        Duration::from_secs(1)
    } else {
        interval
    };
    let first_tick = Instant::now()
        .checked_add(interval)
        .unwrap_or_else(Instant::now);
    let mut ticker = tokio::time::interval_at(first_tick, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut roster = Roster::new();
    let mut ticks: u64 = 0;
    let mut events: u64 = 0;
    let mut persist_failures: usize = 0;

    info!(
        interval_seconds = interval.as_secs(),
        storages = ?service.storage_names(),
        "Ledger starting"
    );

    let end_reason = loop {
        tokio::select! {
            biased;

            () = control.stopped() => break LedgerEndReason::StopRequested,

            _ = ticker.tick() => {
                if let Some(capture) = control.take_capture_update().await {
                    service.update_capture_config(capture);
                }
                let summary = service.on_interval_tick(&roster);
                ticks = ticks.saturating_add(1);
                persist_failures = persist_failures.saturating_add(summary.failures.len());
            }

            event = source.next_event() => {
                let Some(event) = event else {
                    break LedgerEndReason::EndOfInput;
                };
                events = events.saturating_add(1);
                if !apply_event(service, control, &mut roster, event).await {
                    persist_failures = persist_failures.saturating_add(1);
                }
            }
        }
    };

    let shutdown_failures = service.on_shutdown(&roster);
    persist_failures = persist_failures.saturating_add(shutdown_failures.len());

    RunSummary {
        end_reason,
        ticks,
        events,
        persist_failures,
    }
}

/// Apply one host event. Returns `false` if a persist failed.
async fn apply_event<P>(
    service: &mut LedgerService<P>,
    control: &LedgerControl,
    roster: &mut Roster,
    event: HostEvent,
) -> bool
where
    P: SnapshotProvider + ObservationSink,
{
    let result = match event {
        HostEvent::Join { uid, name } => {
            let result = service.on_player_join(&uid, &name);
            roster.insert(uid, name);
            result
        }
        HostEvent::Leave { uid, name } => {
            let name = if name.trim().is_empty() {
                roster.get(&uid).cloned().unwrap_or_default()
            } else {
                name
            };
            roster.remove(&uid);
            service.provider_mut().forget(&uid);
            service.on_player_leave(&uid, &name)
        }
        HostEvent::Death { uid, name } => service.on_player_death(&uid, &name),
        HostEvent::Observe { uid, observation } => {
            debug!(%uid, "Observation received");
            service.provider_mut().observe(uid, *observation);
            Ok(())
        }
        HostEvent::Reload { capture } => {
            info!(?capture, "Capture reload queued for next tick");
            control.request_capture_update(capture).await;
            Ok(())
        }
    };

    result.is_ok()
}

/// Log the end of a run.
pub fn log_run_end(summary: &RunSummary) {
    info!(
        reason = ?summary.end_reason,
        ticks = summary.ticks,
        events = summary.events,
        persist_failures = summary.persist_failures,
        "Ledger stopped"
    );

    if summary.persist_failures > 0 {
        warn!(
            persist_failures = summary.persist_failures,
            "Some snapshots were not committed to every store"
        );
    }
}
