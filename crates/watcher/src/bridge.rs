//! Public watch API
//!
//! `FileEvents` composes a backend and a registry into the three boundary
//! operations. `FileWatch` is the caller-facing object for one watch.

use crate::backend::Backend;
use crate::platform::PlatformBackend;
use crate::registry::{Watch, WatchId, WatchRegistry, WatchState};
use filewatch_core::{normalize_target, Error, ErrorKind, Event, Result, WatchConfig};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Handle accepted by the handle-based operations
pub type WatchHandle = WatchId;

struct Shared<B: Backend> {
    backend: B,
    registry: WatchRegistry<B::Context>,
}

/// Entry point for watching paths with one backend
pub struct FileEvents<B: Backend = PlatformBackend> {
    shared: Arc<Shared<B>>,
}

impl<B: Backend> Clone for FileEvents<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl FileEvents<PlatformBackend> {
    /// Use the native backend for this OS
    pub fn new(config: WatchConfig) -> Self {
        Self::with_backend(PlatformBackend::new(config))
    }

    /// Process-wide instance with the default configuration
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<FileEvents<PlatformBackend>> = OnceLock::new();
        GLOBAL.get_or_init(|| Self::new(WatchConfig::default()))
    }
}

impl<B: Backend> FileEvents<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                registry: WatchRegistry::new(),
            }),
        }
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    /// Number of watches not yet closed
    pub fn active_watches(&self) -> usize {
        self.shared.registry.len()
    }

    /// Start watching `path`
    pub fn start_watch(&self, path: impl AsRef<Path>) -> Result<FileWatch<B>> {
        let (handle, path) = self.open(path.as_ref())?;
        Ok(FileWatch {
            handle,
            path,
            events: self.clone(),
        })
    }

    /// Start a watch owned by its bare handle
    ///
    /// Nothing closes it implicitly; pair with `close_watch`.
    pub fn start_detached(&self, path: impl AsRef<Path>) -> Result<WatchHandle> {
        self.open(path.as_ref()).map(|(handle, _)| handle)
    }

    fn open(&self, path: &Path) -> Result<(WatchHandle, PathBuf)> {
        let target = normalize_target(path)?;

        let context = guard(|| self.shared.backend.open(&target))
            .map_err(|e| match e.kind() {
                ErrorKind::PathUnavailable => e,
                _ => Error::path_unavailable(path, e.message()),
            })?;

        let handle = self
            .shared
            .registry
            .register(Watch::new(target.clone(), context));

        info!(
            "Started {} watch {} on {}",
            self.shared.backend.name(),
            handle,
            target.display()
        );

        Ok((handle, target))
    }

    /// Block until the next change on `handle`
    pub fn wait_for_next_event(&self, handle: WatchHandle) -> Result<Event> {
        match self.wait(handle, None)? {
            Some(event) => Ok(event),
            None => Err(Error::backend("backend returned no event without a timeout")),
        }
    }

    /// Block for at most `timeout`; `Ok(None)` when nothing arrived
    pub fn wait_timeout(&self, handle: WatchHandle, timeout: Duration) -> Result<Option<Event>> {
        self.wait(handle, Some(timeout))
    }

    fn wait(&self, handle: WatchHandle, timeout: Option<Duration>) -> Result<Option<Event>> {
        let watch = self.shared.registry.lookup(handle)?;

        match watch.state() {
            WatchState::Active => {}
            WatchState::Closing => return Err(Error::cancelled()),
            WatchState::Opening | WatchState::Closed => {
                return Err(Error::invalid_handle(format!("{} is not active", handle)));
            }
        }

        let backend = &self.shared.backend;
        let result = guard(|| match timeout {
            None => backend.next(watch.context()).map(Some),
            Some(timeout) => backend.next_timeout(watch.context(), timeout),
        });

        match result {
            Ok(event) => Ok(event),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                // A watch that fails to deliver is dead; free its handle
                warn!("Watch {} on {} failed: {}", handle, watch.path().display(), err);
                if let Err(close_err) = self.close_watch(handle) {
                    debug!("Cleanup after failure of {}: {}", handle, close_err);
                }
                Err(err.context(format!(
                    "Could not receive next change to {}",
                    watch.path().display()
                )))
            }
        }
    }

    /// Stop watching and free the handle
    ///
    /// The handle is freed even when the backend fails to release; that
    /// failure is still returned.
    pub fn close_watch(&self, handle: WatchHandle) -> Result<()> {
        let watch = self.shared.registry.lookup(handle)?;
        watch.begin_close()?;

        let released = guard(|| self.shared.backend.release(watch.context()));

        if let Err(err) = self.shared.registry.unregister(handle) {
            debug!("Handle {} already removed: {}", handle, err);
        }
        watch.finish_close();

        info!("Closed watch {} on {}", handle, watch.path().display());

        released.map_err(|err| {
            err.context(format!(
                "Could not clean up watch handle for {}",
                watch.path().display()
            ))
        })
    }
}

/// One active watch
///
/// Share it by reference (or `Arc`) to close from another thread while a
/// thread is blocked in `next_change`. Dropping an active watch closes it.
pub struct FileWatch<B: Backend = PlatformBackend> {
    handle: WatchHandle,
    path: PathBuf,
    events: FileEvents<B>,
}

impl<B: Backend> FileWatch<B> {
    pub fn handle(&self) -> WatchHandle {
        self.handle
    }

    /// Normalized watch root
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the next change
    pub fn next_change(&self) -> Result<Event> {
        self.events.wait_for_next_event(self.handle)
    }

    /// Block for at most `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<Event>> {
        self.events.wait_timeout(self.handle, timeout)
    }

    pub fn close(&self) -> Result<()> {
        self.events.close_watch(self.handle)
    }

    /// Blocking iterator over changes
    ///
    /// Ends quietly once the watch is closed; a backend failure is yielded
    /// once and then ends the iteration.
    pub fn events(&self) -> Events<'_, B> {
        Events {
            watch: self,
            done: false,
        }
    }
}

impl<B: Backend> Drop for FileWatch<B> {
    fn drop(&mut self) {
        match self.events.close_watch(self.handle) {
            Ok(()) => debug!("Closed watch on {} at drop", self.path.display()),
            Err(err) if err.kind() == ErrorKind::InvalidHandle => {}
            Err(err) => debug!("Closing {} at drop: {}", self.path.display(), err),
        }
    }
}

/// Iterator returned by `FileWatch::events`
pub struct Events<'a, B: Backend> {
    watch: &'a FileWatch<B>,
    done: bool,
}

impl<B: Backend> Iterator for Events<'_, B> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.watch.next_change() {
            Ok(event) => Some(Ok(event)),
            Err(err) => {
                self.done = true;
                match err.kind() {
                    ErrorKind::Cancelled | ErrorKind::InvalidHandle => None,
                    _ => Some(Err(err)),
                }
            }
        }
    }
}

/// Run a backend call, turning a panic into `BackendFailure`
fn guard<T>(call: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        Err(Error::backend(format!(
            "backend panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
