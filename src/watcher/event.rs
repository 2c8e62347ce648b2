//! The event item carried on every stream.

use std::fmt;
use std::path::{Path, PathBuf};

use super::{EventKinds, WatchError};

/// One filesystem notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Path the event is about.
    pub path: PathBuf,
    /// What happened.
    pub kind: EventKinds,
}

/// Item type of raw sources and output streams alike.
pub type RawEvent = Result<WatchEvent, WatchError>;

impl WatchEvent {
    pub fn new(path: impl Into<PathBuf>, kind: EventKinds) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if any bit of `mask` is set on this event.
    pub fn matches(&self, mask: EventKinds) -> bool {
        self.kind.intersects(mask)
    }
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path.display())
    }
}
