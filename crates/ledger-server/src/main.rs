//! Ledger server binary.
//!
//! Wires the player ledger to a game host that reports events as JSON
//! lines on stdin. It loads configuration, opens the configured stores,
//! and runs the ledger loop until stdin closes or Ctrl-C is pressed.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing) at `RUST_LOG`, or `info`
//!    until the config is read
//! 2. Resolve the config path (first argument, then `LEDGER_CONFIG`, then
//!    `ledger-config.yaml`), load it (writing defaults if missing), and
//!    switch logging to the configured level unless `RUST_LOG` is set
//! 3. Open the enabled stores
//! 4. Install the Ctrl-C handler
//! 5. Run the ledger loop over stdin
//! 6. Log the result

mod error;
mod events;

use std::path::PathBuf;
use std::sync::Arc;

use ledger_core::clock::SystemClock;
use ledger_core::config::{DEFAULT_CONFIG_FILE, LedgerConfig};
use ledger_core::control::LedgerControl;
use ledger_core::provider::ObservedWorldProvider;
use ledger_core::runner;
use ledger_core::service::LedgerService;
use ledger_storage::{JsonPlayerStorage, PlayerStorage};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, reload};

use crate::error::ServerError;
use crate::events::LineEventSource;

/// Environment variable naming the config file when no argument is given.
const CONFIG_ENV: &str = "LEDGER_CONFIG";

/// Level used before the config file has been read.
const BOOTSTRAP_LOG_LEVEL: &str = "info";

/// Swaps the active log filter once the configured level is known.
type LogHandle = reload::Handle<EnvFilter, Registry>;

/// Application entry point for the ledger server.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or a store
/// cannot be opened. Failures after startup are logged, not returned.
#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // 1. Initialize structured logging.
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let log_handle = init_logging(filter_directive(rust_log.as_deref(), None));

    // 2. Load configuration, then apply its log level.
    let config_path = resolve_config_path(std::env::args().nth(1), std::env::var(CONFIG_ENV).ok());
    let config = LedgerConfig::load_or_create(&config_path)?;
    let directive = filter_directive(rust_log.as_deref(), Some(&config.logging.level));
    if let Err(e) = log_handle.reload(EnvFilter::new(&directive)) {
        warn!(error = %e, %directive, "Failed to apply configured log level");
    }

    info!(
        config = %config_path.display(),
        interval_seconds = config.interval_seconds,
        base_path = %config.storage.base_path.display(),
        enable_json = config.storage.enable_json,
        capture = ?config.capture,
        "ledger-server starting"
    );

    // 3. Open stores.
    let mut storages: Vec<Box<dyn PlayerStorage>> = Vec::new();
    if config.storage.enable_json {
        let store = JsonPlayerStorage::open(config.storage.base_path.clone())?;
        storages.push(Box::new(store));
    }

    let mut service = LedgerService::new(
        ObservedWorldProvider::new(config.capture),
        storages,
        Arc::new(SystemClock),
    );

    // 4. Ctrl-C requests a clean stop.
    let control = Arc::new(LedgerControl::new());
    {
        let control = Arc::clone(&control);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received, stopping");
                    control.request_stop();
                }
                Err(e) => warn!(error = %e, "failed to install Ctrl-C handler"),
            }
        });
    }

    // 5. Run the ledger loop over stdin.
    let mut source = LineEventSource::new(BufReader::new(tokio::io::stdin()), config_path);
    let summary =
        runner::run_ledger(&mut service, &mut source, &control, config.effective_interval()).await;

    // 6. Log the result.
    runner::log_run_end(&summary);
    Ok(())
}

/// Install the global subscriber behind a reloadable filter.
fn init_logging(directive: String) -> LogHandle {
    let (filter, handle) = reload::Layer::new(EnvFilter::new(directive));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
    handle
}

/// `RUST_LOG` wins, then the configured level, then the bootstrap level.
fn filter_directive(rust_log: Option<&str>, configured: Option<&str>) -> String {
    [rust_log, configured]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|directive| !directive.is_empty())
        .unwrap_or(BOOTSTRAP_LOG_LEVEL)
        .to_owned()
}

/// Pick the config file: explicit argument, then environment, then the
/// default name in the working directory. Blank values are ignored.
fn resolve_config_path(arg: Option<String>, env: Option<String>) -> PathBuf {
    arg.into_iter()
        .chain(env)
        .find(|candidate| !candidate.trim().is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
}
