//! Configuration loading and typed config structures for the ledger.
//!
//! The canonical configuration lives in `ledger-config.yaml` next to the
//! host process. This module defines strongly-typed structs that mirror
//! the YAML structure and provides loaders that read, default and clamp
//! the values. The core only ever consumes the already-validated structs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ledger_types::CaptureConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Default config file name, resolved relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "ledger-config.yaml";

/// Default seconds between snapshot ticks.
pub const DEFAULT_INTERVAL_SECONDS: u64 = 60;

/// Smallest tick interval accepted; lower values are clamped up to bound
/// write amplification.
pub const MIN_INTERVAL_SECONDS: u64 = 5;

/// Default directory for JSON records.
pub const DEFAULT_BASE_PATH: &str = "data/ledger";

/// Environment variable overriding `storage.base_path`.
pub const BASE_PATH_ENV: &str = "LEDGER_BASE_PATH";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read or write the configuration file.
    #[error("failed to access config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse or render YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level ledger configuration.
///
/// Mirrors the structure of `ledger-config.yaml`. Every field has a
/// default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Seconds between snapshot ticks. Read through
    /// [`effective_interval`](Self::effective_interval), which clamps it.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// Which stores are enabled and where they write.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Enrichment groups collected per tick.
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            storage: StorageConfig::default(),
            capture: CaptureConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `LEDGER_BASE_PATH` overrides `storage.base_path` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config
            .storage
            .apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse configuration from a YAML string. Environment overrides are
    /// not applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Load the file at `path`, or write the defaults there and use them
    /// if it does not exist.
    ///
    /// Failing to write the default file is logged, not fatal.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an existing file cannot be read or parsed.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let config = Self::from_file(path)?;
            info!(path = %path.display(), "Loaded ledger config");
            return Ok(config);
        }

        let mut config = Self::default();
        match config.to_yaml() {
            Ok(yaml) => match std::fs::write(path, yaml) {
                Ok(()) => info!(path = %path.display(), "Created default ledger config"),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to write default config, continuing with defaults"
                ),
            },
            Err(e) => warn!(error = %e, "failed to render default config"),
        }
        config
            .storage
            .apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Render the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yml::to_string(self)?)
    }

    /// The tick interval, clamped to [`MIN_INTERVAL_SECONDS`].
    ///
    /// A clamped value is logged as a warning, never treated as an error.
    pub fn effective_interval(&self) -> Duration {
        if self.interval_seconds < MIN_INTERVAL_SECONDS {
            warn!(
                configured = self.interval_seconds,
                minimum = MIN_INTERVAL_SECONDS,
                "interval_seconds below minimum, clamping"
            );
            return Duration::from_secs(MIN_INTERVAL_SECONDS);
        }
        Duration::from_secs(self.interval_seconds)
    }
}

/// Store selection and locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for JSON records.
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Whether the JSON file store is enabled.
    #[serde(default = "default_true")]
    pub enable_json: bool,
}

impl StorageConfig {
    /// Override the base path from the environment when set.
    ///
    /// `lookup` resolves an environment variable name; production callers
    /// pass `std::env::var`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup(BASE_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            self.base_path = PathBuf::from(val);
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            enable_json: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_interval_seconds() -> u64 {
    DEFAULT_INTERVAL_SECONDS
}

fn default_base_path() -> PathBuf {
    PathBuf::from(DEFAULT_BASE_PATH)
}

const fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = LedgerConfig::default();
        assert_eq!(config.interval_seconds, 60);
        assert_eq!(config.storage.base_path, PathBuf::from("data/ledger"));
        assert!(config.storage.enable_json);
        assert_eq!(config.capture, CaptureConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
interval_seconds: 30

storage:
  base_path: "/srv/game/ledger"
  enable_json: false

capture:
  vitals: true
  ping: false
  equipment: true
  location: false
  world: true

logging:
  level: "debug"
"#;
        let config = LedgerConfig::parse(yaml).unwrap();
        assert_eq!(config.interval_seconds, 30);
        assert_eq!(config.storage.base_path, PathBuf::from("/srv/game/ledger"));
        assert!(!config.storage.enable_json);
        assert!(!config.capture.ping);
        assert!(!config.capture.location);
        assert!(config.capture.world);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let config = LedgerConfig::parse("interval_seconds: 120\n").unwrap();
        assert_eq!(config.interval_seconds, 120);
        assert!(config.storage.enable_json);
        assert_eq!(config.capture, CaptureConfig::default());
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(LedgerConfig::parse("  \n").unwrap(), LedgerConfig::default());
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let result = LedgerConfig::parse("interval_seconds: [not, a, number]");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn interval_below_minimum_is_clamped() {
        let config = LedgerConfig {
            interval_seconds: 1,
            ..LedgerConfig::default()
        };
        assert_eq!(
            config.effective_interval(),
            Duration::from_secs(MIN_INTERVAL_SECONDS)
        );

        let config = LedgerConfig {
            interval_seconds: 90,
            ..LedgerConfig::default()
        };
        assert_eq!(config.effective_interval(), Duration::from_secs(90));
    }

    #[test]
    fn env_override_replaces_base_path() {
        let mut storage = StorageConfig::default();
        storage.apply_env_overrides(|key| {
            (key == BASE_PATH_ENV).then(|| "/tmp/override".to_owned())
        });
        assert_eq!(storage.base_path, PathBuf::from("/tmp/override"));

        let mut storage = StorageConfig::default();
        storage.apply_env_overrides(|_| Some("   ".to_owned()));
        assert_eq!(storage.base_path, PathBuf::from(DEFAULT_BASE_PATH));
    }

    #[test]
    fn yaml_round_trip() {
        let mut config = LedgerConfig::default();
        config.capture.location = false;
        let yaml = config.to_yaml().unwrap();
        assert_eq!(LedgerConfig::parse(&yaml).unwrap(), config);
    }

    #[test]
    fn load_or_create_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        let config = LedgerConfig::load_or_create(&path).unwrap();
        assert_eq!(config.interval_seconds, DEFAULT_INTERVAL_SECONDS);
        assert!(path.exists());

        std::fs::write(&path, "interval_seconds: 15\n").unwrap();
        let reloaded = LedgerConfig::load_or_create(&path).unwrap();
        assert_eq!(reloaded.interval_seconds, 15);
    }
}
