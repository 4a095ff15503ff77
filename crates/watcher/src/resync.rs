//! Resync scan after an overflow
//!
//! An `Overflow` event means changes were lost. Callers that keep derived
//! state rescan the tree and treat every file modified after their last
//! known-good point as changed.

use filewatch_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Directories never descended into
const SKIPPED_DIRS: &[&str] = &[".git", ".jj", ".hg", ".svn", "target", "node_modules"];

/// Files under `root` whose mtime is newer than `since`
///
/// Entries that vanish or become unreadable mid-scan are skipped.
pub fn scan_changed_since(root: &Path, since: SystemTime) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(Error::path_unavailable(root, "no such file or directory"));
    }

    let mut changed = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped(e.path()))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping entry during resync: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let modified = match entry.metadata().map_err(std::io::Error::from).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                debug!("No mtime for {}: {}", entry.path().display(), e);
                continue;
            }
        };

        if modified > since {
            changed.push(entry.into_path());
        }
    }

    changed.sort();
    info!("Resync of {} found {} changed files", root.display(), changed.len());
    Ok(changed)
}

fn is_skipped(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| SKIPPED_DIRS.contains(&name))
}

/// Moving resync point
///
/// Each `scan` reports changes since the previous one and advances the
/// baseline to when that scan started.
#[derive(Debug, Clone)]
pub struct Baseline {
    root: PathBuf,
    since: SystemTime,
}

impl Baseline {
    /// Start tracking from now
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::starting_at(root, SystemTime::now())
    }

    pub fn starting_at(root: impl Into<PathBuf>, since: SystemTime) -> Self {
        Self {
            root: root.into(),
            since,
        }
    }

    pub fn since(&self) -> SystemTime {
        self.since
    }

    pub fn scan(&mut self) -> Result<Vec<PathBuf>> {
        let started = SystemTime::now();
        let changed = scan_changed_since(&self.root, self.since)?;
        self.since = started;
        Ok(changed)
    }
}
