//! ReadDirectoryChangesW backend (Windows)
//!
//! Windows reports a rename as an old-name record immediately followed by
//! a new-name record, with nothing tying the two together. Adjacent halves
//! are paired in arrival order. Paths can come back in long-path form
//! (`\\?\C:\...`), so every reported path has that prefix removed.

use super::source::{appeared_or_vanished, translate_common, Changes, PendingRenames, Translate};
use filewatch_core::{strip_verbatim_prefix, Change};
use notify::event::{EventKind as RawKind, ModifyKind, RenameMode};
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub struct WindowsTranslator {
    renames: PendingRenames,
}

impl WindowsTranslator {
    pub fn new(rename_window: Duration) -> Self {
        Self {
            renames: PendingRenames::new(rename_window),
        }
    }

    fn rename(&mut self, mode: RenameMode, paths: Vec<PathBuf>, now: Instant, out: &mut Changes) {
        match mode {
            RenameMode::From => {
                for path in paths {
                    self.renames.hold(path, None, now, out);
                }
            }
            RenameMode::To => {
                for path in paths {
                    if !self.renames.pair(None, &path, out) {
                        self.renames.emit(appeared_or_vanished(path), out);
                    }
                }
            }
            RenameMode::Both => {
                let mut paths = paths.into_iter();
                if let (Some(from), Some(to)) = (paths.next(), paths.next()) {
                    self.renames.emit(Change::renamed(from, to), out);
                }
            }
            RenameMode::Any | RenameMode::Other => {
                self.renames.emit_all(paths.into_iter().map(appeared_or_vanished), out);
            }
        }
    }
}

impl Translate for WindowsTranslator {
    fn translate(&mut self, event: notify::Event, now: Instant, out: &mut Changes) {
        let kind = event.kind;
        let paths: Vec<PathBuf> = event.paths.iter().map(|p| strip_verbatim_prefix(p)).collect();

        let mut common = Changes::new();
        if translate_common(&kind, &paths, &mut common) {
            self.renames.emit_all(common, out);
            return;
        }

        if let RawKind::Modify(ModifyKind::Name(mode)) = kind {
            self.rename(mode, paths, now, out);
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

#[cfg(target_os = "windows")]
pub use backend::WindowsBackend;

#[cfg(target_os = "windows")]
mod backend {
    use super::WindowsTranslator;
    use crate::backend::Backend;
    use crate::platform::source::NotifySource;
    use filewatch_core::{Event, Result, WatchConfig};
    use notify::ReadDirectoryChangesWatcher;
    use std::path::Path;
    use std::time::Duration;

    /// Directory change notifications via `notify::ReadDirectoryChangesWatcher`
    #[derive(Debug, Clone, Default)]
    pub struct WindowsBackend {
        config: WatchConfig,
    }

    impl WindowsBackend {
        pub fn new(config: WatchConfig) -> Self {
            Self { config }
        }
    }

    impl Backend for WindowsBackend {
        type Context = NotifySource<ReadDirectoryChangesWatcher, WindowsTranslator>;

        fn name(&self) -> &'static str {
            "read-directory-changes"
        }

        fn open(&self, path: &Path) -> Result<Self::Context> {
            NotifySource::open(
                path,
                &self.config,
                notify::Config::default(),
                WindowsTranslator::new(self.config.rename_window()),
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
    use filewatch_core::EventKind;
    use notify::event::{CreateKind, RemoveKind};

    fn record(kind: RawKind, path: &str) -> notify::Event {
        notify::Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_adjacent_halves_pair() {
        let now = Instant::now();
        let mut translator = WindowsTranslator::new(Duration::from_millis(50));
        let mut out = Changes::new();

        translator.translate(
            record(RawKind::Modify(ModifyKind::Name(RenameMode::From)), r"C:\w\old.txt"),
            now,
            &mut out,
        );
        translator.translate(
            record(RawKind::Modify(ModifyKind::Name(RenameMode::To)), r"C:\w\new.txt"),
            now,
            &mut out,
        );

        assert_eq!(out.as_slice(), &[Change::renamed(r"C:\w\old.txt", r"C:\w\new.txt")]);
    }

    #[test]
    fn test_long_path_prefix_removed() {
        let now = Instant::now();
        let mut translator = WindowsTranslator::new(Duration::from_millis(50));
        let mut out = Changes::new();

        translator.translate(record(RawKind::Create(CreateKind::Any), r"\\?\C:\w\a.txt"), now, &mut out);
        translator.translate(
            record(RawKind::Remove(RemoveKind::Any), r"\\?\UNC\server\share\a.txt"),
            now,
            &mut out,
        );

        assert_eq!(
            out.as_slice(),
            &[
                Change::new(EventKind::Created, r"C:\w\a.txt"),
                Change::new(EventKind::Deleted, r"\\server\share\a.txt"),
            ]
        );
    }

    #[test]
    fn test_old_name_alone_expires_as_delete() {
        let now = Instant::now();
        let mut translator = WindowsTranslator::new(Duration::from_millis(20));
        let mut out = Changes::new();

        translator.translate(
            record(RawKind::Modify(ModifyKind::Name(RenameMode::From)), r"C:\w\old.txt"),
            now,
            &mut out,
        );
        translator.flush_expired(now + Duration::from_millis(20), &mut out);

        assert_eq!(out.as_slice(), &[Change::new(EventKind::Deleted, r"C:\w\old.txt")]);
    }
}
