//! Event pump shared by the notify-based backends
//!
//! The OS watcher pushes raw records into a bounded channel from its own
//! thread. `next` drains that channel on the caller's thread, runs the
//! per-OS translation and stamps sequence numbers. A second channel whose
//! sender is dropped on release wakes any blocked `next`.

use crossbeam_channel::{self as channel, Receiver, Sender, TrySendError};
use filewatch_core::{Change, Error, Event, EventKind, Result, Sequencer, WatchConfig};
use notify::event::{EventKind as RawKind, ModifyKind};
use notify::{RecursiveMode, Watcher};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Output buffer for one translated record
pub type Changes = SmallVec<[Change; 2]>;

type RawResult = notify::Result<notify::Event>;

/// Per-OS translation of raw notify records into canonical changes
pub trait Translate: Send + 'static {
    /// Translate one raw record
    fn translate(&mut self, event: notify::Event, now: Instant, out: &mut Changes);

    /// When held-back state (unpaired renames) must next be flushed
    fn deadline(&self) -> Option<Instant> {
        None
    }

    /// Emit held-back state older than its window
    fn flush_expired(&mut self, _now: Instant, _out: &mut Changes) {}

    /// Forget held-back state after an overflow
    fn reset(&mut self) {}
}

/// Backend context for one watch driven by a notify watcher
pub struct NotifySource<W, T> {
    /// Normalized watch root
    root: PathBuf,

    /// OS subscription; taken on release
    watcher: Mutex<Option<W>>,

    /// Raw records from the OS thread
    raw_rx: Receiver<RawResult>,

    /// Records lost because `raw_rx` was full
    dropped: Arc<AtomicU64>,

    /// Dropped on release so a blocked select wakes up
    cancel_tx: Mutex<Option<Sender<()>>>,
    cancel_rx: Receiver<()>,
    cancelled: AtomicBool,

    stream: Mutex<Stream<T>>,
}

struct Stream<T> {
    translator: T,
    pending: VecDeque<Change>,
    sequencer: Sequencer,
    root_gone: bool,
}

enum Wake {
    Cancelled,
    Raw(RawResult),
    Disconnected,
    Timer,
}

impl<W, T> NotifySource<W, T>
where
    W: Watcher + Send + 'static,
    T: Translate,
{
    /// Register interest in `root` with a new OS watcher
    pub fn open(
        root: &Path,
        config: &WatchConfig,
        notify_config: notify::Config,
        translator: T,
    ) -> Result<Self> {
        let (raw_tx, raw_rx) = channel::bounded::<RawResult>(config.event_buffer);
        let (cancel_tx, cancel_rx) = channel::bounded::<()>(1);
        let dropped = Arc::new(AtomicU64::new(0));

        // Runs on the OS watcher thread: never block it
        let handler_dropped = Arc::clone(&dropped);
        let handler = move |result: RawResult| match raw_tx.try_send(result) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                handler_dropped.fetch_add(1, Ordering::AcqRel);
            }
            Err(TrySendError::Disconnected(_)) => {}
        };

        let mut watcher =
            W::new(handler, notify_config).map_err(|e| Error::path_unavailable(root, e))?;

        let mode = if config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(root, mode)
            .map_err(|e| Error::path_unavailable(root, e))?;

        debug!("Registered {:?} watch on {}", mode, root.display());

        Ok(Self {
            root: root.to_path_buf(),
            watcher: Mutex::new(Some(watcher)),
            raw_rx,
            dropped,
            cancel_tx: Mutex::new(Some(cancel_tx)),
            cancel_rx,
            cancelled: AtomicBool::new(false),
            stream: Mutex::new(Stream {
                translator,
                pending: VecDeque::new(),
                sequencer: Sequencer::new(),
                root_gone: false,
            }),
        })
    }

    /// Block until the next event
    pub fn next_event(&self) -> Result<Event> {
        match self.next_until(None)? {
            Some(event) => Ok(event),
            None => Err(Error::backend("event stream stopped without a deadline")),
        }
    }

    /// Block until the next event or until `timeout` elapses
    pub fn next_event_timeout(&self, timeout: Duration) -> Result<Option<Event>> {
        self.next_until(Some(Instant::now() + timeout))
    }

    fn next_until(&self, deadline: Option<Instant>) -> Result<Option<Event>> {
        // One waiter at a time per watch; release never takes this lock
        let mut stream = self.stream.lock();

        loop {
            if self.cancelled.load(Ordering::Acquire) {
                return Err(Error::cancelled());
            }

            if !stream.root_gone {
                let dropped = self.dropped.swap(0, Ordering::AcqRel);
                if dropped > 0 {
                    let discarded = self.raw_rx.try_iter().count();
                    warn!(
                        "Event queue for {} overflowed after #{}: {} records dropped, {} queued records discarded",
                        self.root.display(),
                        stream.sequencer.last(),
                        dropped,
                        discarded
                    );
                    stream.overflow(&self.root);
                    stream.sequencer.skip(dropped);
                }
            }

            if let Some(change) = stream.pending.pop_front() {
                return Ok(Some(stream.sequencer.stamp(change)));
            }

            if stream.root_gone {
                return Err(Error::backend(format!(
                    "watched path {} no longer exists",
                    self.root.display()
                )));
            }

            let wake_at = match (stream.translator.deadline(), deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            let timer = match wake_at {
                Some(at) => channel::at(at),
                None => channel::never(),
            };

            let wake = channel::select! {
                recv(self.cancel_rx) -> _ => Wake::Cancelled,
                recv(self.raw_rx) -> msg => match msg {
                    Ok(raw) => Wake::Raw(raw),
                    Err(_) => Wake::Disconnected,
                },
                recv(timer) -> _ => Wake::Timer,
            };

            match wake {
                Wake::Cancelled => return Err(Error::cancelled()),
                Wake::Disconnected => {
                    if self.cancelled.load(Ordering::Acquire) {
                        return Err(Error::cancelled());
                    }
                    return Err(Error::backend(format!(
                        "event source for {} shut down",
                        self.root.display()
                    )));
                }
                Wake::Raw(Ok(event)) => stream.ingest(event, &self.root, Instant::now()),
                Wake::Raw(Err(err)) => match classify(&err) {
                    RuntimeError::Ignore => {
                        debug!("Ignoring watcher error for {}: {}", self.root.display(), err);
                    }
                    RuntimeError::Overflow => {
                        warn!("Watch coverage lost for {}: {}", self.root.display(), err);
                        stream.overflow(&self.root);
                    }
                    RuntimeError::Fatal => {
                        return Err(Error::backend(format!(
                            "event source for {} failed: {}",
                            self.root.display(),
                            err
                        )));
                    }
                },
                Wake::Timer => {
                    let now = Instant::now();
                    stream.flush_expired(&self.root, now);
                    if deadline.is_some_and(|d| now >= d) && stream.pending.is_empty() {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Unregister from the OS and wake any blocked `next`
    ///
    /// Safe to call more than once and concurrently with `next`.
    pub fn release(&self) -> Result<()> {
        self.cancelled.store(true, Ordering::Release);
        drop(self.cancel_tx.lock().take());

        let Some(mut watcher) = self.watcher.lock().take() else {
            return Ok(());
        };

        let result = watcher.unwatch(&self.root);
        drop(watcher);

        match result {
            Ok(()) => {
                debug!("Released watch on {}", self.root.display());
                Ok(())
            }
            // The root vanished first; the OS already dropped the watch
            Err(err)
                if matches!(
                    err.kind,
                    notify::ErrorKind::WatchNotFound | notify::ErrorKind::PathNotFound
                ) =>
            {
                debug!("Watch on {} was already gone: {}", self.root.display(), err);
                Ok(())
            }
            Err(err) => Err(Error::backend(format!(
                "could not unwatch {}: {}",
                self.root.display(),
                err
            ))),
        }
    }
}

impl<T: Translate> Stream<T> {
    fn ingest(&mut self, event: notify::Event, root: &Path, now: Instant) {
        if self.root_gone {
            return;
        }

        if event.need_rescan() {
            warn!("OS event queue overflowed for {}", root.display());
            self.overflow(root);
            return;
        }

        trace!("Raw record: {:?} {:?}", event.kind, event.paths);

        let mut out = Changes::new();
        self.translator.flush_expired(now, &mut out);
        self.translator.translate(event, now, &mut out);
        self.accept(out, root);
    }

    fn flush_expired(&mut self, root: &Path, now: Instant) {
        let mut out = Changes::new();
        self.translator.flush_expired(now, &mut out);
        self.accept(out, root);
    }

    fn accept(&mut self, changes: Changes, root: &Path) {
        for change in changes {
            if self.root_gone {
                break;
            }

            if removes_root(&change, root) {
                debug!("Watch root {} was removed", root.display());
                self.pending.push_back(Change::new(EventKind::Deleted, root));
                self.root_gone = true;
            } else {
                self.pending.push_back(change);
            }
        }
    }

    /// Replace everything undelivered with one overflow marker
    fn overflow(&mut self, root: &Path) {
        self.pending.clear();
        self.translator.reset();
        self.pending.push_back(Change::new(EventKind::Overflow, root));
    }
}

fn removes_root(change: &Change, root: &Path) -> bool {
    match change.kind {
        EventKind::Deleted => change.path == root,
        EventKind::Renamed => change.previous_path.as_deref() == Some(root),
        _ => false,
    }
}

enum RuntimeError {
    Ignore,
    Overflow,
    Fatal,
}

fn classify(err: &notify::Error) -> RuntimeError {
    match &err.kind {
        // Raced with a deletion inside the tree
        notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound => RuntimeError::Ignore,
        notify::ErrorKind::Io(io)
            if matches!(
                io.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ) =>
        {
            RuntimeError::Ignore
        }
        // Part of the tree is no longer covered
        notify::ErrorKind::MaxFilesWatch => RuntimeError::Overflow,
        _ => RuntimeError::Fatal,
    }
}

/// Translate the record kinds every OS reports the same way
///
/// Returns false for renames, which each backend pairs itself.
pub fn translate_common(kind: &RawKind, paths: &[PathBuf], out: &mut Changes) -> bool {
    let canonical = match kind {
        RawKind::Modify(ModifyKind::Name(_)) => return false,
        RawKind::Access(_) => {
            trace!("Skipping access record for {:?}", paths);
            return true;
        }
        RawKind::Create(_) => EventKind::Created,
        RawKind::Remove(_) => EventKind::Deleted,
        RawKind::Modify(_) => EventKind::Modified,
        RawKind::Any | RawKind::Other => {
            trace!("Unclassified record {:?} treated as modification", kind);
            EventKind::Modified
        }
    };

    out.extend(paths.iter().map(|path| Change::new(canonical, path.clone())));
    true
}

/// Rename without a partner: the path either appeared or disappeared
pub fn appeared_or_vanished(path: PathBuf) -> Change {
    if path.exists() {
        Change::new(EventKind::Created, path)
    } else {
        Change::new(EventKind::Deleted, path)
    }
}

/// Old names waiting for their new name
///
/// A held name keeps its arrival slot: changes emitted after it queue
/// behind it and are released only once it resolves, either as `Renamed`
/// when its partner arrives or as `Deleted` when the window expires.
pub struct PendingRenames {
    window: Duration,
    queue: VecDeque<Queued>,
}

enum Queued {
    Held(HeldRename),
    Ready(Change),
}

struct HeldRename {
    path: PathBuf,
    tracker: Option<usize>,
    at: Instant,
}

impl PendingRenames {
    const MAX_QUEUED: usize = 1024;

    pub fn new(window: Duration) -> Self {
        Self {
            window,
            queue: VecDeque::new(),
        }
    }

    /// Hold an old name until its partner arrives or the window expires
    pub fn hold(&mut self, path: PathBuf, tracker: Option<usize>, now: Instant, out: &mut Changes) {
        self.queue.push_back(Queued::Held(HeldRename { path, tracker, at: now }));
        self.enforce_bound(out);
    }

    /// Emit a change in arrival order, behind any held name
    pub fn emit(&mut self, change: Change, out: &mut Changes) {
        if self.queue.is_empty() {
            out.push(change);
        } else {
            self.queue.push_back(Queued::Ready(change));
            self.enforce_bound(out);
        }
    }

    pub fn emit_all(&mut self, changes: impl IntoIterator<Item = Change>, out: &mut Changes) {
        for change in changes {
            self.emit(change, out);
        }
    }

    /// Resolve a held name as renamed to `to`, in its original slot
    ///
    /// With a tracker only the matching entry qualifies; without one the
    /// oldest held entry is taken. Returns false when nothing matched.
    pub fn pair(&mut self, tracker: Option<usize>, to: &Path, out: &mut Changes) -> bool {
        let slot = self.queue.iter_mut().find(|queued| match queued {
            Queued::Held(held) => tracker.is_none() || held.tracker == tracker,
            Queued::Ready(_) => false,
        });
        let Some(slot) = slot else {
            return false;
        };

        let from = match &mut *slot {
            Queued::Held(held) => std::mem::take(&mut held.path),
            Queued::Ready(_) => return false,
        };
        *slot = Queued::Ready(Change::renamed(from, to));
        self.release_ready(out);
        true
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.queue.iter().find_map(|queued| match queued {
            Queued::Held(held) => Some(held.at + self.window),
            Queued::Ready(_) => None,
        })
    }

    /// Old names that never found a partner left the tree
    pub fn expire(&mut self, now: Instant, out: &mut Changes) {
        for slot in self.queue.iter_mut() {
            let gone = match &mut *slot {
                Queued::Held(held) if held.at + self.window <= now => std::mem::take(&mut held.path),
                // Held in arrival order: the rest are younger
                Queued::Held(_) => break,
                Queued::Ready(_) => continue,
            };
            *slot = Queued::Ready(Change::new(EventKind::Deleted, gone));
        }
        self.release_ready(out);
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Nothing held and nothing queued
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn release_ready(&mut self, out: &mut Changes) {
        while matches!(self.queue.front(), Some(Queued::Ready(_))) {
            if let Some(Queued::Ready(change)) = self.queue.pop_front() {
                out.push(change);
            }
        }
    }

    /// Bound memory for rename storms: give up on the oldest held name
    fn enforce_bound(&mut self, out: &mut Changes) {
        while self.queue.len() > Self::MAX_QUEUED {
            match self.queue.pop_front() {
                Some(Queued::Held(held)) => out.push(Change::new(EventKind::Deleted, held.path)),
                Some(Queued::Ready(change)) => out.push(change),
                None => break,
            }
            self.release_ready(out);
        }
    }
}
