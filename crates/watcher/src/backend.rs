//! Backend contract
//!
//! A backend owns the OS event source for each watch. The bridge only ever
//! reaches a context through a successful registry lookup, and the
//! registry hands out shared ownership, so `next` and `release` may run at
//! the same time on the same context.

use filewatch_core::{Event, Result};
use std::path::Path;
use std::time::Duration;

/// OS-specific event source behind the uniform watch API
pub trait Backend: Send + Sync + 'static {
    /// Per-watch state (OS subscription, queues, sequence counter)
    type Context: Send + Sync + 'static;

    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Register interest in `path`
    ///
    /// `path` is already absolute and normalized. Fails with
    /// `PathUnavailable` if the OS refuses to watch it.
    fn open(&self, path: &Path) -> Result<Self::Context>;

    /// Block until the next change
    ///
    /// Returns `Cancelled` once `release` has been called on the context,
    /// including when `release` races a call that is already blocked.
    fn next(&self, context: &Self::Context) -> Result<Event>;

    /// Like `next`, but gives up after `timeout` with `Ok(None)`
    fn next_timeout(&self, context: &Self::Context, timeout: Duration) -> Result<Option<Event>>;

    /// Unregister from the OS and wake any blocked `next`
    ///
    /// Must tolerate repeated calls.
    fn release(&self, context: &Self::Context) -> Result<()>;
}
