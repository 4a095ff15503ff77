//! Watch registry: handle → backend state
//!
//! Handles are indexes into a slot table tagged with the slot's generation.
//! Unregistering bumps the generation, so an old handle stops resolving
//! even after its slot is reused. Entries are shared as `Arc`, so a caller
//! still holding an entry after unregister keeps the backend context alive
//! instead of touching freed state.

use filewatch_core::{Error, Result};
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Opaque watch handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId {
    index: u32,
    generation: u64,
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch#{}.{}", self.index, self.generation)
    }
}

/// Watch lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Opening,
    Active,
    Closing,
    Closed,
}

/// One registered watch
#[derive(Debug)]
pub struct Watch<C> {
    path: PathBuf,
    state: Mutex<WatchState>,
    context: C,
}

impl<C> Watch<C> {
    pub fn new(path: PathBuf, context: C) -> Self {
        Self {
            path,
            state: Mutex::new(WatchState::Opening),
            context,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> WatchState {
        *self.state.lock()
    }

    /// Backend context
    pub fn context(&self) -> &C {
        &self.context
    }

    /// Enter `Closing`; only one caller can win
    pub fn begin_close(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            WatchState::Opening | WatchState::Active => {
                *state = WatchState::Closing;
                Ok(())
            }
            WatchState::Closing => Err(Error::invalid_handle(format!(
                "watch on {} is already closing",
                self.path.display()
            ))),
            WatchState::Closed => Err(Error::invalid_handle(format!(
                "watch on {} is closed",
                self.path.display()
            ))),
        }
    }

    pub fn finish_close(&self) {
        *self.state.lock() = WatchState::Closed;
    }
}

struct Slot<C> {
    generation: u64,
    watch: Option<Arc<Watch<C>>>,
}

struct Table<C> {
    slots: Vec<Slot<C>>,
    free: Vec<u32>,
    live: usize,
}

/// Handle table shared by all watches of one `FileEvents`
pub struct WatchRegistry<C> {
    table: Mutex<Table<C>>,
}

impl<C> Default for WatchRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> WatchRegistry<C> {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                slots: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    /// Store a watch and mark it active
    pub fn register(&self, watch: Watch<C>) -> WatchId {
        *watch.state.lock() = WatchState::Active;
        let watch = Some(Arc::new(watch));

        let mut table = self.table.lock();
        table.live += 1;

        if let Some(index) = table.free.pop() {
            let slot = &mut table.slots[index as usize];
            slot.watch = watch;
            return WatchId {
                index,
                generation: slot.generation,
            };
        }

        let index = table.slots.len() as u32;
        table.slots.push(Slot {
            generation: 0,
            watch,
        });
        WatchId {
            index,
            generation: 0,
        }
    }

    /// Resolve a handle
    pub fn lookup(&self, id: WatchId) -> Result<Arc<Watch<C>>> {
        let table = self.table.lock();
        match table.slots.get(id.index as usize) {
            Some(slot) if slot.generation == id.generation => {
                slot.watch.clone().ok_or_else(|| stale(id))
            }
            _ => Err(stale(id)),
        }
    }

    /// Remove a handle; the returned entry is the last registry reference
    pub fn unregister(&self, id: WatchId) -> Result<Arc<Watch<C>>> {
        let mut table = self.table.lock();

        let watch = match table.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation && slot.watch.is_some() => {
                slot.generation += 1;
                slot.watch.take()
            }
            _ => None,
        };

        let watch = watch.ok_or_else(|| stale(id))?;
        table.free.push(id.index);
        table.live -= 1;
        Ok(watch)
    }

    /// Number of registered watches
    pub fn len(&self) -> usize {
        self.table.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn stale(id: WatchId) -> Error {
    Error::invalid_handle(format!("{} is not an active watch", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use filewatch_core::ErrorKind;
    use std::thread;

    fn watch(name: &str) -> Watch<String> {
        Watch::new(PathBuf::from(format!("/w/{}", name)), name.to_string())
    }

    #[test]
    fn test_register_lookup_unregister() {
        let registry = WatchRegistry::new();
        let id = registry.register(watch("a"));

        let entry = registry.lookup(id).unwrap();
        assert_eq!(entry.context(), "a");
        assert_eq!(entry.state(), WatchState::Active);
        assert_eq!(registry.len(), 1);

        let removed = registry.unregister(id).unwrap();
        assert_eq!(removed.path(), Path::new("/w/a"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_lookup_after_unregister_is_invalid() {
        let registry = WatchRegistry::new();
        let id = registry.register(watch("a"));
        registry.unregister(id).unwrap();

        assert_eq!(registry.lookup(id).unwrap_err().kind(), ErrorKind::InvalidHandle);
        assert_eq!(registry.unregister(id).unwrap_err().kind(), ErrorKind::InvalidHandle);
    }

    #[test]
    fn test_reused_slot_gets_new_generation() {
        let registry = WatchRegistry::new();
        let first = registry.register(watch("a"));
        registry.unregister(first).unwrap();

        let second = registry.register(watch("b"));
        assert_ne!(first, second);
        assert_eq!(first.index, second.index);

        // The stale handle must not resolve to the new watch
        assert!(registry.lookup(first).is_err());
        assert_eq!(registry.lookup(second).unwrap().context(), "b");
    }

    #[test]
    fn test_unknown_handle() {
        let registry: WatchRegistry<String> = WatchRegistry::new();
        let bogus = WatchId {
            index: 42,
            generation: 0,
        };
        assert_eq!(registry.lookup(bogus).unwrap_err().kind(), ErrorKind::InvalidHandle);
    }

    #[test]
    fn test_entry_outlives_unregister() {
        let registry = WatchRegistry::new();
        let id = registry.register(watch("a"));
        let held = registry.lookup(id).unwrap();
        registry.unregister(id).unwrap();

        // A racing holder still sees valid state
        assert_eq!(held.context(), "a");
    }

    #[test]
    fn test_begin_close_has_one_winner() {
        let entry = watch("a");
        *entry.state.lock() = WatchState::Active;

        entry.begin_close().unwrap();
        assert_eq!(entry.state(), WatchState::Closing);
        assert_eq!(entry.begin_close().unwrap_err().kind(), ErrorKind::InvalidHandle);

        entry.finish_close();
        assert_eq!(entry.begin_close().unwrap_err().kind(), ErrorKind::InvalidHandle);
    }

    #[test]
    fn test_concurrent_register_unregister() {
        let registry = Arc::new(WatchRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..200 {
                        let id = registry.register(watch(&format!("{}-{}", t, i)));
                        assert!(registry.lookup(id).is_ok());
                        registry.unregister(id).unwrap();
                        assert!(registry.lookup(id).is_err());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
