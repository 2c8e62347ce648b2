//! Recursive filesystem watching.
//!
//! Watching a root path also watches every subdirectory, present or future,
//! and merges all of their events into one stream, even though the native
//! facility underneath only watches single paths non-recursively.
//!
//! ```no_run
//! use treewatch::EventKinds;
//!
//! # async fn run() -> Result<(), treewatch::WatchError> {
//! let mut events = treewatch::watch("/srv/data", EventKinds::CREATED | EventKinds::MODIFIED, 64)?;
//! while let Some(item) = events.recv().await {
//!     match item {
//!         Ok(event) => println!("{event}"),
//!         Err(e) => eprintln!("branch failed: {e}"),
//!     }
//! }
//! // The root was deleted.
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod watcher;

pub use config::{LoggingConfig, Settings, WatchConfig};
pub use watcher::{
    EventKinds, EventStream, NativeWatch, NotifyRegistrar, RawEvent, Registration, TreeWatcher,
    WatchError, WatchEvent, WatchRegistrar, watch,
};
