//! Configuration loading and typed config structures for the Autosave engine.
//!
//! Configuration lives in a YAML file (by default `autosave-config.yaml`).
//! Every field is optional; missing values fall back to the defaults the
//! admin surface ships with.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but is not usable.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Scheduling parameters shared by every session.
    #[serde(default)]
    pub autosave: AutoSaveConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Where file-backed persistence writes entities.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `AUTOSAVE_DEBOUNCE_MS` overrides `autosave.debounce_ms`
    /// - `AUTOSAVE_OUTPUT_DIR` overrides `storage.output_dir`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.apply_env_overrides();
        config.autosave.validate()?;
        Ok(config)
    }

    /// Override values with environment variables when set.
    ///
    /// Unparseable numeric overrides are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(ms) = std::env::var("AUTOSAVE_DEBOUNCE_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
        {
            self.autosave.debounce_ms = ms;
        }
        if let Ok(val) = std::env::var("AUTOSAVE_OUTPUT_DIR") {
            self.storage.output_dir = PathBuf::from(val);
        }
    }
}

/// Scheduling parameters for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AutoSaveConfig {
    /// Quiet period after the last update before a save is attempted.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How long `Saved` stays visible before reverting to `Idle`.
    #[serde(default = "default_saved_display_ms")]
    pub saved_display_ms: u64,

    /// How long `Error` stays visible before reverting to `Idle`.
    #[serde(default = "default_error_display_ms")]
    pub error_display_ms: u64,

    /// When false, updates are recorded but never scheduled.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl AutoSaveConfig {
    /// Debounce window as a [`Duration`].
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Saved display window as a [`Duration`].
    pub const fn saved_display(&self) -> Duration {
        Duration::from_millis(self.saved_display_ms)
    }

    /// Error display window as a [`Duration`].
    pub const fn error_display(&self) -> Duration {
        Duration::from_millis(self.error_display_ms)
    }

    /// Check that the values describe a usable schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the debounce window is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "autosave.debounce_ms must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            saved_display_ms: default_saved_display_ms(),
            error_display_ms: default_error_display_ms(),
            enabled: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
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

/// Storage configuration for file-backed persistence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Directory receiving one JSON file per entity.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

const fn default_debounce_ms() -> u64 {
    1200
}

const fn default_saved_display_ms() -> u64 {
    3000
}

const fn default_error_display_ms() -> u64 {
    5000
}

const fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("autosave-out")
}
