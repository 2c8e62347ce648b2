//! Error types for the recursive watcher.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
///
/// Registration and scan failures for the root are returned from `watch`.
/// For directories discovered later they, like native faults, arrive as
/// error items on the stream of the nearest live ancestor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    #[error("Cannot watch path {path}: {reason}")]
    RegistrationFailed { path: PathBuf, reason: String },

    #[error("Cannot list directory {path}: {reason}")]
    ScanFailed { path: PathBuf, reason: String },

    #[error("File system event error on {path}: {details}")]
    NativeFault { path: PathBuf, details: String },

    #[error("Unknown event kind '{name}'")]
    UnknownKind { name: String },

    #[error("Watching requires a running Tokio runtime")]
    NoRuntime,

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

impl WatchError {
    /// Path the error refers to, when there is one.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            WatchError::RegistrationFailed { path, .. }
            | WatchError::ScanFailed { path, .. }
            | WatchError::NativeFault { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::NativeFault {
            path: e.paths.first().cloned().unwrap_or_default(),
            details: e.to_string(),
        }
    }
}
