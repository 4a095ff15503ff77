//! Helpers shared by the watcher integration tests

#![allow(dead_code)]

use filewatch::{Backend, Event, FileWatch};
use std::time::{Duration, Instant};

/// How long a test waits for the OS before giving up
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Pull events until one matches, skipping unrelated ones
pub fn wait_for<B, F>(watch: &FileWatch<B>, mut matches: F) -> Option<Event>
where
    B: Backend,
    F: FnMut(&Event) -> bool,
{
    let give_up = Instant::now() + EVENT_TIMEOUT;
    loop {
        let left = give_up.checked_duration_since(Instant::now())?;
        match watch.wait_timeout(left) {
            Ok(Some(event)) if matches(&event) => return Some(event),
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => return None,
        }
    }
}

/// Pull exactly `n` events
pub fn take<B: Backend>(watch: &FileWatch<B>, n: usize) -> Vec<Event> {
    (0..n)
        .map_while(|_| watch.wait_timeout(EVENT_TIMEOUT).ok().flatten())
        .collect()
}
