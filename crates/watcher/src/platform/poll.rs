//! Polling backend
//!
//! Periodically rescans the tree with `notify::PollWatcher`. This is the
//! platform backend on targets without a native event source, and can be
//! chosen explicitly anywhere (network filesystems, containers with
//! exhausted inotify limits). Renames are not detected; they surface as a
//! delete plus a create.

use super::source::{appeared_or_vanished, translate_common, Changes, NotifySource, Translate};
use crate::backend::Backend;
use filewatch_core::{Event, Result, WatchConfig};
use notify::PollWatcher;
use std::path::Path;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct PollTranslator;

impl Translate for PollTranslator {
    fn translate(&mut self, event: notify::Event, _now: Instant, out: &mut Changes) {
        let notify::Event { kind, paths, .. } = event;
        if !translate_common(&kind, &paths, out) {
            out.extend(paths.into_iter().map(appeared_or_vanished));
        }
    }
}

/// Periodic tree scan via `notify::PollWatcher`
#[derive(Debug, Clone, Default)]
pub struct PollBackend {
    config: WatchConfig,
}

impl PollBackend {
    pub fn new(config: WatchConfig) -> Self {
        Self { config }
    }
}

impl Backend for PollBackend {
    type Context = NotifySource<PollWatcher, PollTranslator>;

    fn name(&self) -> &'static str {
        "poll"
    }

    fn open(&self, path: &Path) -> Result<Self::Context> {
        let notify_config = notify::Config::default().with_poll_interval(self.config.poll_interval());
        NotifySource::open(path, &self.config, notify_config, PollTranslator)
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
