//! Platform-specific file watching implementations
//!
//! Exactly one native backend is compiled per target and exported as
//! `PlatformBackend`:
//! - Linux/Android: inotify
//! - macOS: FSEvents
//! - Windows: ReadDirectoryChangesW
//! - anything else: polling
//!
//! The per-OS translation rules compile everywhere so they can be tested
//! on any host; only the backends bound to an OS watcher are gated.

pub mod linux;
pub mod macos;
pub mod poll;
pub mod source;
pub mod windows;

pub use poll::PollBackend;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub use linux::InotifyBackend;

#[cfg(target_os = "macos")]
pub use macos::FsEventsBackend;

#[cfg(target_os = "windows")]
pub use windows::WindowsBackend;

/// Native backend for the current target
#[cfg(any(target_os = "linux", target_os = "android"))]
pub type PlatformBackend = InotifyBackend;

#[cfg(target_os = "macos")]
pub type PlatformBackend = FsEventsBackend;

#[cfg(target_os = "windows")]
pub type PlatformBackend = WindowsBackend;

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "windows"
)))]
pub type PlatformBackend = PollBackend;
