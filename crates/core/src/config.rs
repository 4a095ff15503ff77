//! Watch configuration
//!
//! Loaded from TOML; every key is optional:
//!
//! ```toml
//! recursive = true
//! event_buffer = 4096
//! rename_window_ms = 50
//! poll_interval_ms = 2000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Per-watch settings shared by all backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Watch the whole tree (true) or only direct children (false)
    pub recursive: bool,

    /// Capacity of the raw record queue between the OS thread and `next`.
    /// A full queue drops records and produces an overflow event.
    pub event_buffer: usize,

    /// How long an unpaired rename source waits for its destination
    pub rename_window_ms: u64,

    /// Scan interval for the polling backend
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            event_buffer: 4096,
            rename_window_ms: 50,
            poll_interval_ms: 2000,
        }
    }
}

impl WatchConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded watch config from {}", path.display());
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every value is within its supported range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_buffer == 0 || self.event_buffer > 1_048_576 {
            return Err(ConfigError::Invalid {
                key: "event_buffer",
                reason: format!("{} is outside 1-1048576", self.event_buffer),
            });
        }

        if self.rename_window_ms > 5000 {
            return Err(ConfigError::Invalid {
                key: "rename_window_ms",
                reason: format!("{} is outside 0-5000", self.rename_window_ms),
            });
        }

        if self.poll_interval_ms < 10 {
            return Err(ConfigError::Invalid {
                key: "poll_interval_ms",
                reason: format!("{} is below the 10ms minimum", self.poll_interval_ms),
            });
        }

        Ok(())
    }

    pub fn rename_window(&self) -> Duration {
        Duration::from_millis(self.rename_window_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Example configuration with every key documented
pub fn example_config() -> &'static str {
    r#"# filewatch configuration

# Watch the whole directory tree, or only the top level
recursive = true

# Raw OS records buffered per watch before an overflow event is reported
event_buffer = 4096

# Milliseconds an unmatched rename source waits for its destination
# before it is reported as a deletion
rename_window_ms = 50

# Scan interval of the polling backend (network filesystems)
poll_interval_ms = 2000
"#
}
