//! Boundary to the native, non-recursive filesystem event facility.
//!
//! A registration covers exactly one path. Its events arrive on a bounded
//! tokio channel fed from the notify callback thread, the same bridge the
//! rest of the watcher stack has always used.

use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{EventKinds, RawEvent, WatchError, WatchEvent};

/// Default capacity of the channel between the notify thread and a pump.
pub const DEFAULT_RAW_CAPACITY: usize = 100;

/// A live native watch on one path.
pub trait NativeWatch: Send + Sync {
    /// The path this watch was registered for.
    fn path(&self) -> &Path;

    /// Release the native resource. Dropping the watch releases it too.
    fn unregister(self: Box<Self>);
}

/// Result of a successful registration.
pub struct Registration {
    /// Handle used to release the watch on teardown.
    pub watch: Box<dyn NativeWatch>,
    /// Raw events for the registered path, in native delivery order.
    pub events: mpsc::Receiver<RawEvent>,
}

/// Anything able to place a non-recursive watch on a single path.
pub trait WatchRegistrar: Send + Sync + 'static {
    /// Register a watch on `path` reporting events whose kind intersects `mask`.
    fn register(&self, path: &Path, mask: EventKinds) -> Result<Registration, WatchError>;
}

/// Registrar backed by `notify::RecommendedWatcher` in non-recursive mode.
///
/// Each registration owns its own native watcher, so the events of one
/// registration can never be confused with those of another.
#[derive(Debug, Clone)]
pub struct NotifyRegistrar {
    raw_capacity: usize,
}

impl NotifyRegistrar {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_RAW_CAPACITY)
    }

    /// Use a custom capacity for the notify-to-pump channel.
    pub fn with_capacity(raw_capacity: usize) -> Self {
        Self {
            raw_capacity: raw_capacity.max(1),
        }
    }
}

impl Default for NotifyRegistrar {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchRegistrar for NotifyRegistrar {
    fn register(&self, path: &Path, mask: EventKinds) -> Result<Registration, WatchError> {
        let failed = |reason: String| WatchError::RegistrationFailed {
            path: path.to_path_buf(),
            reason,
        };

        if !path.exists() {
            return Err(failed("path does not exist".to_string()));
        }

        let (tx, rx) = mpsc::channel(self.raw_capacity);
        let watched = WatchedPath::new(path);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    for item in watched.convert(event) {
                        if item.matches(mask) && tx.blocking_send(Ok(item)).is_err() {
                            // Pump is gone; the watch is about to be dropped.
                            return;
                        }
                    }
                }
                Err(e) => {
                    let mut fault = WatchError::from(e);
                    if let WatchError::NativeFault { path, .. } = &mut fault {
                        if path.as_os_str().is_empty() {
                            *path = watched.given.clone();
                        }
                    }
                    let _ = tx.blocking_send(Err(fault));
                }
            }
        })
        .map_err(|e| failed(e.to_string()))?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| failed(e.to_string()))?;

        crate::debug_event!("registrar", "registered", "{} [{mask}]", path.display());

        Ok(Registration {
            watch: Box::new(NotifyWatch {
                path: path.to_path_buf(),
                watcher: Mutex::new(Some(watcher)),
            }),
            events: rx,
        })
    }
}

/// The registered path plus its canonical form, used to recognise self events.
#[derive(Debug)]
struct WatchedPath {
    given: PathBuf,
    canonical: Option<PathBuf>,
}

impl WatchedPath {
    fn new(path: &Path) -> Self {
        Self {
            given: path.to_path_buf(),
            canonical: std::fs::canonicalize(path).ok(),
        }
    }

    fn is_self(&self, path: &Path) -> bool {
        path == self.given || self.canonical.as_deref() == Some(path)
    }

    /// Split a notify event into one `WatchEvent` per path.
    fn convert(&self, event: Event) -> Vec<WatchEvent> {
        let Event { kind, paths, .. } = event;
        paths
            .into_iter()
            .map(|path| {
                let is_self = self.is_self(&path);
                let kind = classify(&kind, &path, is_self);
                // Report self events under the path the caller registered.
                let path = if is_self {
                    self.given.clone()
                } else {
                    path
                };
                WatchEvent::new(path, kind)
            })
            .collect()
    }
}

/// Map a notify event kind onto our kind bits.
pub(crate) fn classify(kind: &EventKind, path: &Path, is_self: bool) -> EventKinds {
    match kind {
        EventKind::Create(CreateKind::Folder) => EventKinds::CREATED | EventKinds::IS_DIR,
        EventKind::Create(_) => {
            if path.is_dir() {
                EventKinds::CREATED | EventKinds::IS_DIR
            } else {
                EventKinds::CREATED
            }
        }
        EventKind::Remove(remove) => {
            let base = if is_self {
                EventKinds::DELETE_SELF
            } else {
                EventKinds::DELETED
            };
            if matches!(remove, RemoveKind::Folder) {
                base | EventKinds::IS_DIR
            } else {
                base
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => EventKinds::MOVED,
        EventKind::Modify(_) => EventKinds::MODIFIED,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => EventKinds::OTHER,
    }
}

struct NotifyWatch {
    path: PathBuf,
    watcher: Mutex<Option<notify::RecommendedWatcher>>,
}

impl NativeWatch for NotifyWatch {
    fn path(&self) -> &Path {
        &self.path
    }

    fn unregister(mut self: Box<Self>) {
        if let Some(mut watcher) = self.watcher.get_mut().take() {
            // The kernel drops the watch by itself after delete-self.
            if let Err(e) = watcher.unwatch(&self.path) {
                crate::debug_event!("registrar", "unwatch skipped", "{}: {e}", self.path.display());
            }
        }
        crate::debug_event!("registrar", "released", "{}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, DataChange, RenameMode};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_classify_create() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f");
        assert_eq!(
            classify(&EventKind::Create(CreateKind::Folder), &file, false),
            EventKinds::CREATED | EventKinds::IS_DIR
        );
        assert_eq!(
            classify(&EventKind::Create(CreateKind::File), &file, false),
            EventKinds::CREATED
        );
        // Backends that cannot tell fall back to the filesystem.
        assert_eq!(
            classify(&EventKind::Create(CreateKind::Any), dir.path(), false),
            EventKinds::CREATED | EventKinds::IS_DIR
        );
    }

    #[test]
    fn test_classify_remove() {
        let path = Path::new("/nowhere/x");
        assert_eq!(
            classify(&EventKind::Remove(RemoveKind::File), path, false),
            EventKinds::DELETED
        );
        assert_eq!(
            classify(&EventKind::Remove(RemoveKind::Folder), path, false),
            EventKinds::DELETED | EventKinds::IS_DIR
        );
        assert_eq!(
            classify(&EventKind::Remove(RemoveKind::Any), path, true),
            EventKinds::DELETE_SELF
        );
    }

    #[test]
    fn test_classify_modify_and_other() {
        let path = Path::new("/nowhere/x");
        assert_eq!(
            classify(
                &EventKind::Modify(ModifyKind::Name(RenameMode::From)),
                path,
                false
            ),
            EventKinds::MOVED
        );
        assert_eq!(
            classify(
                &EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                path,
                false
            ),
            EventKinds::MODIFIED
        );
        assert_eq!(
            classify(&EventKind::Access(AccessKind::Any), path, false),
            EventKinds::OTHER
        );
    }

    #[test]
    fn test_register_missing_path() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let err = NotifyRegistrar::new()
            .register(&missing, EventKinds::REQUIRED)
            .err()
            .unwrap();
        assert!(matches!(err, WatchError::RegistrationFailed { path, .. } if path == missing));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_register_reports_creation() {
        let dir = TempDir::new().unwrap();
        let mut registration = NotifyRegistrar::new()
            .register(dir.path(), EventKinds::REQUIRED)
            .unwrap();
        assert_eq!(registration.watch.path(), dir.path());

        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), registration.events.recv())
            .await
            .expect("timed out")
            .expect("source closed")
            .expect("fault");
        assert_eq!(event.path, sub);
        assert!(event.kind.is_new_dir());

        registration.watch.unregister();
    }
}
