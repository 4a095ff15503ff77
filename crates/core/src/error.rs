//! Result channel for every boundary operation
//!
//! Each failure carries a kind (so callers can branch on it) and a
//! human-readable message. Nothing is ever raised across the boundary:
//! backends, the registry and the bridge all return `Result`.

use std::fmt;
use std::path::Path;

/// Result type returned by all watch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Target cannot be watched (missing, permission denied, unsupported filesystem)
    PathUnavailable,
    /// Operation on a handle that is not active
    InvalidHandle,
    /// A blocked wait was released by a concurrent close
    Cancelled,
    /// The OS event source failed; the watch is dead
    BackendFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::PathUnavailable => "path unavailable",
            ErrorKind::InvalidHandle => "invalid handle",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::BackendFailure => "backend failure",
        };
        f.write_str(name)
    }
}

/// Watch operation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// Create an error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Target could not be watched
    pub fn path_unavailable(path: &Path, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::PathUnavailable,
            format!("Could not watch for changes to {}: {}", path.display(), reason),
        )
    }

    pub fn invalid_handle(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidHandle, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "watch was closed while waiting for a change")
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendFailure, message)
    }

    /// Failure category
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable description
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True for the benign "stop watching" outcome
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Prefix the message with extra context, keeping the kind
    pub fn context(self, context: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{}: {}", context, self.message),
        }
    }
}
