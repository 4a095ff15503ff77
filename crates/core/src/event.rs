//! Canonical change events

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Type of file system change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// File or directory created (or moved into the tree)
    Created,
    /// Contents or metadata changed
    Modified,
    /// File or directory deleted (or moved out of the tree)
    Deleted,
    /// Renamed within the tree; `path` is the new name
    Renamed,
    /// The OS dropped notifications; rescan the watch root
    Overflow,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Created => "created",
            EventKind::Modified => "modified",
            EventKind::Deleted => "deleted",
            EventKind::Renamed => "renamed",
            EventKind::Overflow => "overflow",
        };
        f.write_str(name)
    }
}

/// Unsequenced change produced by a backend's translation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: EventKind,
    pub path: PathBuf,
    pub previous_path: Option<PathBuf>,
}

impl Change {
    pub fn new(kind: EventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            previous_path: None,
        }
    }

    pub fn renamed(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            kind: EventKind::Renamed,
            path: to.into(),
            previous_path: Some(from.into()),
        }
    }
}

/// One filesystem change delivered to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Type of change
    pub kind: EventKind,
    /// Path that changed (the watch root for `Overflow`)
    pub path: PathBuf,
    /// Per-watch sequence number, starting at 1
    pub sequence: u64,
    /// Old name of a paired rename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<PathBuf>,
}

impl Event {
    pub fn is_overflow(&self) -> bool {
        self.kind == EventKind::Overflow
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} {}", self.sequence, self.kind, self.path.display())?;
        if let Some(ref from) = self.previous_path {
            write!(f, " (from {})", from.display())?;
        }
        Ok(())
    }
}

/// Per-watch sequence counter
///
/// Numbers start at 1 and only ever grow. `skip` opens the explicit gap
/// an overflow announces.
#[derive(Debug, Default)]
pub struct Sequencer {
    last: u64,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a change with the next sequence number
    pub fn stamp(&mut self, change: Change) -> Event {
        self.last += 1;
        Event {
            kind: change.kind,
            path: change.path,
            sequence: self.last,
            previous_path: change.previous_path,
        }
    }

    /// Account for records that were dropped and will never be delivered
    pub fn skip(&mut self, dropped: u64) {
        self.last = self.last.saturating_add(dropped);
    }

    /// Last number handed out (0 before the first event)
    pub fn last(&self) -> u64 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_starts_at_one() {
        let mut seq = Sequencer::new();
        let event = seq.stamp(Change::new(EventKind::Created, "/tmp/dir/a.txt"));
        assert_eq!(event.sequence, 1);
        assert_eq!(event.kind, EventKind::Created);
        assert_eq!(seq.stamp(Change::new(EventKind::Modified, "/tmp/dir/a.txt")).sequence, 2);
        assert_eq!(seq.last(), 2);
    }

    #[test]
    fn test_skip_leaves_gap() {
        let mut seq = Sequencer::new();
        seq.stamp(Change::new(EventKind::Created, "/a"));
        seq.skip(5);
        let overflow = seq.stamp(Change::new(EventKind::Overflow, "/"));
        assert_eq!(overflow.sequence, 7);
    }

    #[test]
    fn test_event_serialized_fields() {
        let mut seq = Sequencer::new();
        let event = seq.stamp(Change::renamed("/w/old.txt", "/w/new.txt"));
        let text = to_toml(&event);
        assert!(text.contains("kind = \"renamed\""));
        assert!(text.contains("previous_path = \"/w/old.txt\""));

        let plain = seq.stamp(Change::new(EventKind::Deleted, "/w/new.txt"));
        assert!(!to_toml(&plain).contains("previous_path"));
    }

    #[test]
    fn test_display() {
        let mut seq = Sequencer::new();
        let event = seq.stamp(Change::renamed("/w/a", "/w/b"));
        assert_eq!(event.to_string(), "#1 renamed /w/b (from /w/a)");
    }

    fn to_toml(event: &Event) -> String {
        toml::to_string(event).unwrap()
    }
}
