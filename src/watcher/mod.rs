//! Recursive file watching on top of a non-recursive native facility.
//!
//! # Architecture
//!
//! ```text
//! TreeWatcher::watch(root)
//!   - WatchRegistrar   one native watch per directory (notify, NonRecursive)
//!   - scan_children    subdirectories present at registration time
//!   - pump task        per node: filter, recurse on new dirs, stop on delete-self
//!   - forward task     per parent/child edge: child stream -> parent stream
//! ```

mod error;
mod event;
mod forwarder;
mod kind;
mod registrar;
mod scanner;
mod tree;

pub use error::WatchError;
pub use event::{RawEvent, WatchEvent};
pub use forwarder::forward;
pub use kind::EventKinds;
pub use registrar::{
    DEFAULT_RAW_CAPACITY, NativeWatch, NotifyRegistrar, Registration, WatchRegistrar,
};
pub use scanner::scan_children;
pub use tree::{EventStream, TreeWatcher, watch};
