//! Cross-platform file change notifications
//!
//! Watch a file or directory and pull changes one at a time:
//! - one native backend per OS (inotify, FSEvents, ReadDirectoryChangesW),
//!   with a polling backend available everywhere
//! - opaque, generation-tagged handles that go invalid once closed
//! - `close` from any thread unblocks a pending wait with `Cancelled`
//! - lost events surface as an `Overflow` event, see [`resync`]
//!
//! ```no_run
//! use filewatch::{FileEvents, WatchConfig};
//!
//! # fn main() -> filewatch::Result<()> {
//! let events = FileEvents::new(WatchConfig::default());
//! let watch = events.start_watch("/tmp")?;
//! for change in watch.events() {
//!     println!("{}", change?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod bridge;
pub mod platform;
pub mod registry;
pub mod resync;

pub use backend::Backend;
pub use bridge::{Events, FileEvents, FileWatch, WatchHandle};
pub use platform::{PlatformBackend, PollBackend};
pub use registry::{WatchId, WatchRegistry, WatchState};

pub use filewatch_core::{
    example_config, Change, ConfigError, Error, ErrorKind, Event, EventKind, Result, WatchConfig,
};

use std::path::Path;

/// Start watching `path` on the process-wide instance
///
/// The returned handle stays valid until `close_watch`.
pub fn start_watch(path: impl AsRef<Path>) -> Result<WatchHandle> {
    FileEvents::global().start_detached(path)
}

/// Block until the next change on a handle from [`start_watch`]
pub fn wait_for_next_event(handle: WatchHandle) -> Result<Event> {
    FileEvents::global().wait_for_next_event(handle)
}

/// Close a handle from [`start_watch`]
pub fn close_watch(handle: WatchHandle) -> Result<()> {
    FileEvents::global().close_watch(handle)
}
