//! Shared types for filewatch
//!
//! This crate holds everything backends and callers agree on:
//! - The result channel (`Error`, `ErrorKind`, `Result`)
//! - Canonical events and per-watch sequencing
//! - Watch configuration
//! - Target path normalization

pub mod config;
pub mod error;
pub mod event;
pub mod path;

pub use config::{example_config, ConfigError, WatchConfig};
pub use error::{Error, ErrorKind, Result};
pub use event::{Change, Event, EventKind, Sequencer};
pub use path::{normalize_target, strip_verbatim_prefix};
