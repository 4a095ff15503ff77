//! FSEvents backend (macOS)
//!
//! FSEvents reports per-path flag sets rather than individual syscalls.
//! Flags describe the path's history within the stream latency, so a
//! created flag can still be set on a path that has since been removed.
//! The current state of the path decides which flags are reported:
//! - created only while the path exists
//! - removed only once the path is gone
//! - renamed: a vanished path is the old name, an existing path the new one
//!
//! Dropped-event and must-scan flags arrive as rescan records and become
//! overflow events in the shared source.

use super::source::{translate_common, Changes, PendingRenames, Translate};
use filewatch_core::{Change, EventKind};
use notify::event::{EventKind as RawKind, ModifyKind};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::trace;

pub struct FsEventsTranslator {
    renames: PendingRenames,
}

impl FsEventsTranslator {
    pub fn new(rename_window: Duration) -> Self {
        Self {
            renames: PendingRenames::new(rename_window),
        }
    }

    fn rename(&mut self, paths: Vec<PathBuf>, now: Instant, out: &mut Changes) {
        for path in paths {
            if path.exists() {
                if !self.renames.pair(None, &path, out) {
                    self.renames.emit(Change::new(EventKind::Created, path), out);
                }
            } else {
                self.renames.hold(path, None, now, out);
            }
        }
    }
}

impl Translate for FsEventsTranslator {
    fn translate(&mut self, event: notify::Event, now: Instant, out: &mut Changes) {
        let notify::Event { kind, paths, .. } = event;

        match kind {
            RawKind::Modify(ModifyKind::Name(_)) => self.rename(paths, now, out),
            RawKind::Create(_) => {
                for path in paths {
                    if path.exists() {
                        self.renames.emit(Change::new(EventKind::Created, path), out);
                    } else {
                        trace!("Stale created flag for {}", path.display());
                    }
                }
            }
            RawKind::Remove(_) => {
                for path in paths {
                    if path.exists() {
                        trace!("Stale removed flag for {}", path.display());
                    } else {
                        self.renames.emit(Change::new(EventKind::Deleted, path), out);
                    }
                }
            }
            other => {
                let mut common = Changes::new();
                translate_common(&other, &paths, &mut common);
                self.renames.emit_all(common, out);
            }
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.renames.deadline()
    }

    fn flush_expired(&mut self, now: Instant, out: &mut Changes) {
        self.renames.expire(now, out);
    }

    fn reset(&mut self) {
        self.renames.clear();
    }
}

#[cfg(target_os = "macos")]
pub use backend::FsEventsBackend;

#[cfg(target_os = "macos")]
mod backend {
    use super::FsEventsTranslator;
    use crate::backend::Backend;
    use crate::platform::source::NotifySource;
    use filewatch_core::{Event, Result, WatchConfig};
    use notify::FsEventWatcher;
    use std::path::Path;
    use std::time::Duration;

    /// FSEvents stream via `notify::FsEventWatcher`
    #[derive(Debug, Clone, Default)]
    pub struct FsEventsBackend {
        config: WatchConfig,
    }

    impl FsEventsBackend {
        pub fn new(config: WatchConfig) -> Self {
            Self { config }
        }
    }

    impl Backend for FsEventsBackend {
        type Context = NotifySource<FsEventWatcher, FsEventsTranslator>;

        fn name(&self) -> &'static str {
            "fsevents"
        }

        fn open(&self, path: &Path) -> Result<Self::Context> {
            NotifySource::open(
                path,
                &self.config,
                notify::Config::default(),
                FsEventsTranslator::new(self.config.rename_window()),
            )
        }

        fn next(&self, context: &Self::Context) -> Result<Event> {
            context.next_event()
        }

        fn next_timeout(&self, context: &Self::Context, timeout: Duration) -> Result<Option<Event>> {
            context.next_event_timeout(timeout)
        }

        fn release(&self, context: &Self::Context) -> Result<()> {
            context.release()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, RemoveKind, RenameMode};
    use tempfile::TempDir;

    fn record(kind: RawKind, path: PathBuf) -> notify::Event {
        notify::Event::new(kind).add_path(path)
    }

    #[test]
    fn test_existence_decides_rename_side() {
        let temp_dir = TempDir::new().unwrap();
        let old = temp_dir.path().join("old.txt");
        let new = temp_dir.path().join("new.txt");
        std::fs::write(&new, b"x").unwrap();

        let now = Instant::now();
        let mut translator = FsEventsTranslator::new(Duration::from_millis(50));
        let mut out = Changes::new();
        let name = RawKind::Modify(ModifyKind::Name(RenameMode::Any));

        translator.translate(record(name, old.clone()), now, &mut out);
        assert!(out.is_empty());
        translator.translate(record(name, new.clone()), now, &mut out);

        assert_eq!(out.as_slice(), &[Change::renamed(old, new)]);
    }

    #[test]
    fn test_rename_keeps_its_place_before_later_create() {
        let temp_dir = TempDir::new().unwrap();
        let old = temp_dir.path().join("old.txt");
        let new = temp_dir.path().join("new.txt");
        let later = temp_dir.path().join("later.txt");
        std::fs::write(&new, b"x").unwrap();
        std::fs::write(&later, b"x").unwrap();

        let now = Instant::now();
        let mut translator = FsEventsTranslator::new(Duration::from_millis(50));
        let mut out = Changes::new();
        let name = RawKind::Modify(ModifyKind::Name(RenameMode::Any));

        translator.translate(record(name, old.clone()), now, &mut out);
        translator.translate(record(RawKind::Create(CreateKind::File), later.clone()), now, &mut out);
        assert!(out.is_empty());
        translator.translate(record(name, new.clone()), now, &mut out);

        assert_eq!(
            out.as_slice(),
            &[Change::renamed(old, new), Change::new(EventKind::Created, later)]
        );
    }

    #[test]
    fn test_stale_flags_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let present = temp_dir.path().join("present.txt");
        let missing = temp_dir.path().join("missing.txt");
        std::fs::write(&present, b"x").unwrap();

        let now = Instant::now();
        let mut translator = FsEventsTranslator::new(Duration::from_millis(50));
        let mut out = Changes::new();

        translator.translate(record(RawKind::Create(CreateKind::File), missing.clone()), now, &mut out);
        translator.translate(record(RawKind::Remove(RemoveKind::File), present.clone()), now, &mut out);
        assert!(out.is_empty());

        translator.translate(record(RawKind::Create(CreateKind::File), present.clone()), now, &mut out);
        translator.translate(record(RawKind::Remove(RemoveKind::File), missing.clone()), now, &mut out);
        assert_eq!(
            out.as_slice(),
            &[
                Change::new(EventKind::Created, present),
                Change::new(EventKind::Deleted, missing),
            ]
        );
    }

    #[test]
    fn test_renamed_into_tree_is_created() {
        let temp_dir = TempDir::new().unwrap();
        let arrived = temp_dir.path().join("arrived.txt");
        std::fs::write(&arrived, b"x").unwrap();

        let mut translator = FsEventsTranslator::new(Duration::from_millis(50));
        let mut out = Changes::new();
        translator.translate(
            record(RawKind::Modify(ModifyKind::Name(RenameMode::Any)), arrived.clone()),
            Instant::now(),
            &mut out,
        );

        assert_eq!(out.as_slice(), &[Change::new(EventKind::Created, arrived)]);
    }
}
