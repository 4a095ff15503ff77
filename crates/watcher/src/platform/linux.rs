//! inotify backend (Linux, Android)
//!
//! inotify reports a rename as a MOVED_FROM / MOVED_TO pair sharing a
//! cookie, and notify follows the pair with a combined record carrying
//! both paths. The pair becomes one `Renamed` event; the combined record
//! is dropped when its cookie was already paired. A MOVED_FROM whose
//! partner never arrives left the watched tree.

use super::source::{appeared_or_vanished, translate_common, Changes, PendingRenames, Translate};
use filewatch_core::Change;
use notify::event::{EventKind as RawKind, ModifyKind, RenameMode};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::trace;

/// Cookies of renames already delivered from their MOVED_TO half
const PAIRED_COOKIES: usize = 64;

pub struct InotifyTranslator {
    renames: PendingRenames,
    paired: VecDeque<usize>,
}

impl InotifyTranslator {
    pub fn new(rename_window: Duration) -> Self {
        Self {
            renames: PendingRenames::new(rename_window),
            paired: VecDeque::with_capacity(PAIRED_COOKIES),
        }
    }

    fn remember_pair(&mut self, cookie: usize) {
        if self.paired.len() == PAIRED_COOKIES {
            self.paired.pop_front();
        }
        self.paired.push_back(cookie);
    }

    fn forget_pair(&mut self, cookie: usize) -> bool {
        match self.paired.iter().position(|&c| c == cookie) {
            Some(index) => {
                self.paired.remove(index);
                true
            }
            None => false,
        }
    }

    fn rename(
        &mut self,
        mode: RenameMode,
        cookie: Option<usize>,
        paths: Vec<PathBuf>,
        now: Instant,
        out: &mut Changes,
    ) {
        match mode {
            RenameMode::From => {
                for path in paths {
                    self.renames.hold(path, cookie, now, out);
                }
            }
            RenameMode::To => {
                for path in paths {
                    // Without a cookie there is nothing to pair against
                    match cookie {
                        Some(c) if self.renames.pair(Some(c), &path, out) => self.remember_pair(c),
                        _ => self.renames.emit(appeared_or_vanished(path), out),
                    }
                }
            }
            RenameMode::Both => {
                if cookie.is_some_and(|c| self.forget_pair(c)) {
                    trace!("Combined rename record already delivered");
                    return;
                }
                let mut paths = paths.into_iter();
                match (paths.next(), paths.next()) {
                    (Some(from), Some(to)) => self.renames.emit(Change::renamed(from, to), out),
                    (Some(only), None) => self.renames.emit(appeared_or_vanished(only), out),
                    _ => {}
                }
            }
            RenameMode::Any | RenameMode::Other => {
                self.renames.emit_all(paths.into_iter().map(appeared_or_vanished), out);
            }
        }
    }
}

impl Translate for InotifyTranslator {
    fn translate(&mut self, event: notify::Event, now: Instant, out: &mut Changes) {
        let cookie = event.tracker();
        let notify::Event { kind, paths, .. } = event;

        let mut common = Changes::new();
        if translate_common(&kind, &paths, &mut common) {
            self.renames.emit_all(common, out);
            return;
        }

        if let RawKind::Modify(ModifyKind::Name(mode)) = kind {
            self.rename(mode, cookie, paths, now, out);
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
        self.paired.clear();
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use backend::InotifyBackend;

#[cfg(any(target_os = "linux", target_os = "android"))]
mod backend {
    use super::InotifyTranslator;
    use crate::backend::Backend;
    use crate::platform::source::NotifySource;
    use filewatch_core::{Event, Result, WatchConfig};
    use notify::INotifyWatcher;
    use std::path::Path;
    use std::time::Duration;

    /// Kernel inotify queue via `notify::INotifyWatcher`
    #[derive(Debug, Clone, Default)]
    pub struct InotifyBackend {
        config: WatchConfig,
    }

    impl InotifyBackend {
        pub fn new(config: WatchConfig) -> Self {
            Self { config }
        }
    }

    impl Backend for InotifyBackend {
        type Context = NotifySource<INotifyWatcher, InotifyTranslator>;

        fn name(&self) -> &'static str {
            "inotify"
        }

        fn open(&self, path: &Path) -> Result<Self::Context> {
            NotifySource::open(
                path,
                &self.config,
                notify::Config::default(),
                InotifyTranslator::new(self.config.rename_window()),
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
