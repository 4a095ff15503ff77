//! Configuration command
//!
//! Read-only: prints the example, the resolved location or the effective
//! values.

use crate::settings::{self, ConfigSource};
use anyhow::{Context, Result};
use filewatch::example_config;
use owo_colors::OwoColorize;
use std::path::PathBuf;

pub fn run_example() -> Result<()> {
    print!("{}", example_config());
    Ok(())
}

/// Print the config file in effect
pub fn run_path(explicit: Option<PathBuf>) -> Result<()> {
    match settings::locate(explicit) {
        ConfigSource::Defaults => {
            let default_path = settings::user_config_path()
                .context("Could not determine the user config directory")?;
            println!(
                "{} {}",
                default_path.display(),
                "(not present, using built-in defaults)".dimmed()
            );
        }
        source => {
            if let Some(path) = source.path() {
                println!("{} {}", path.display(), format!("(from {})", source.describe()).dimmed());
            }
        }
    }
    Ok(())
}

/// Print the effective configuration as TOML
pub fn run_show(explicit: Option<PathBuf>) -> Result<()> {
    let (config, source) = settings::load(explicit)?;

    println!("{}", format!("# from {}", source.describe()).dimmed());
    print!("{}", config.to_toml_string()?);
    Ok(())
}
