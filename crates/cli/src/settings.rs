//! Config file discovery
//!
//! Resolution order: `--config`, `$FILEWATCH_CONFIG`, then
//! `<config dir>/filewatch/config.toml` if it exists, else built-in defaults.

use anyhow::{Context, Result};
use filewatch::WatchConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Overrides the default config location
pub const CONFIG_ENV: &str = "FILEWATCH_CONFIG";

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Flag(PathBuf),
    Env(PathBuf),
    UserDir(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Flag(path) | Self::Env(path) | Self::UserDir(path) => Some(path),
            Self::Defaults => None,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Flag(_) => "--config",
            Self::Env(_) => CONFIG_ENV,
            Self::UserDir(_) => "user config dir",
            Self::Defaults => "built-in defaults",
        }
    }
}

/// Default per-user config file location
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("filewatch").join("config.toml"))
}

/// Pick the config source without reading it
pub fn locate(explicit: Option<PathBuf>) -> ConfigSource {
    if let Some(path) = explicit {
        return ConfigSource::Flag(path);
    }

    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return ConfigSource::Env(PathBuf::from(path));
    }

    match user_config_path() {
        Some(path) if path.is_file() => ConfigSource::UserDir(path),
        _ => ConfigSource::Defaults,
    }
}

/// Resolve and load the effective configuration
///
/// An explicitly named file must exist and be valid.
pub fn load(explicit: Option<PathBuf>) -> Result<(WatchConfig, ConfigSource)> {
    let source = locate(explicit);

    let config = match source.path() {
        Some(path) => WatchConfig::load(path)
            .with_context(|| format!("Could not load config from {}", path.display()))?,
        None => WatchConfig::default(),
    };

    debug!("Using config from {}", source.describe());
    Ok((config, source))
}
