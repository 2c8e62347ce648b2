//! Recursive watch tree built out of non-recursive registrations.
//!
//! Every watched directory gets a node: a native registration, a bounded
//! output channel and a pump task. New subdirectories get nodes of their
//! own, and each child's output is relayed into its parent's by a
//! forwarder task, so the root stream carries the whole subtree.
//!
//! ```text
//! root node ----------------> EventStream (caller)
//!   ^        ^
//!   | fwd    | fwd
//! node a   node b
//!   ^
//!   | fwd
//! node a/c
//! ```
//!
//! A node that ends takes its subtree with it, so deleting the root closes
//! the stream even when part of the tree was moved elsewhere first.
//!
//! Files written into a new directory before its registration completes
//! produce no events. Subdirectories created in that window are still
//! attached by the new node's bootstrap scan.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::{Settings, WatchConfig};

use super::forwarder::forward;
use super::registrar::{NativeWatch, NotifyRegistrar, Registration, WatchRegistrar};
use super::scanner::scan_children;
use super::{EventKinds, RawEvent, WatchError, WatchEvent};

/// Stream of events for a watched subtree.
///
/// Yields `Ok(event)` for every requested change anywhere below the root,
/// and `Err(..)` for subtree failures (a directory that could not be
/// watched, or a native fault that ended a branch). Returns `None` once
/// the root is deleted and every branch has wound down. Dropping the
/// stream releases the whole tree.
#[derive(Debug)]
pub struct EventStream {
    path: PathBuf,
    rx: mpsc::Receiver<RawEvent>,
}

impl EventStream {
    pub(crate) fn new(path: PathBuf, rx: mpsc::Receiver<RawEvent>) -> Self {
        Self { path, rx }
    }

    /// Root path of the subtree this stream covers.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the next item; `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<RawEvent> {
        self.rx.recv().await
    }

    /// Take an item if one is buffered.
    pub fn try_recv(&mut self) -> Result<RawEvent, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }

    /// Give up the stream wrapper for the raw receiver. The tree stays alive
    /// for as long as the receiver does.
    pub fn into_inner(self) -> mpsc::Receiver<RawEvent> {
        self.rx
    }
}

/// Entry point for recursive watches.
///
/// Cheap to clone; all clones share the registrar.
#[derive(Clone)]
pub struct TreeWatcher {
    registrar: Arc<dyn WatchRegistrar>,
}

impl TreeWatcher {
    /// Create a tree watcher on top of any registrar.
    pub fn new(registrar: impl WatchRegistrar) -> Self {
        Self {
            registrar: Arc::new(registrar),
        }
    }

    /// Notify-backed watcher using the configured raw channel capacity.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(NotifyRegistrar::with_capacity(
            settings.watch.raw_channel_capacity,
        ))
    }

    /// Recursively watch `path`.
    ///
    /// `requested` selects which event kinds reach the stream. Directory
    /// creation and self deletion are always tracked internally but are
    /// only delivered when requested. `buffer_capacity` bounds every
    /// node's output; a full buffer blocks the producer instead of
    /// dropping events. A capacity of zero behaves like one.
    ///
    /// Returns as soon as the root is registered; existing and future
    /// subdirectories are attached in the background. Must be called from
    /// within a Tokio runtime.
    pub fn watch(
        &self,
        path: impl AsRef<Path>,
        requested: EventKinds,
        buffer_capacity: usize,
    ) -> Result<EventStream, WatchError> {
        let runtime = Handle::try_current().map_err(|_| WatchError::NoRuntime)?;
        let path = path.as_ref().to_path_buf();

        let ctx = Arc::new(Context {
            registrar: Arc::clone(&self.registrar),
            requested,
            capacity: buffer_capacity.max(1),
            runtime,
        });

        let stream = Node::spawn(&ctx, path)?;
        crate::log_event!(
            "watcher",
            "watching",
            "{} [{requested}]",
            stream.path().display()
        );
        Ok(stream)
    }

    /// Watch `path` with mask and capacity taken from configuration.
    pub fn watch_with(
        &self,
        path: impl AsRef<Path>,
        config: &WatchConfig,
    ) -> Result<EventStream, WatchError> {
        self.watch(path, config.mask()?, config.buffer_capacity)
    }
}

impl Default for TreeWatcher {
    fn default() -> Self {
        Self::new(NotifyRegistrar::new())
    }
}

/// Kinds every node registers for on top of what the caller requested.
/// Deletions and moves keep the child table in step with the directory.
const TRACKED: EventKinds = EventKinds::REQUIRED
    .union(EventKinds::DELETED)
    .union(EventKinds::MOVED);

/// Upper bound on waiting for a deleted child to report its own removal
/// once the parent itself is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Parameters shared by every node of one tree.
struct Context {
    registrar: Arc<dyn WatchRegistrar>,
    requested: EventKinds,
    capacity: usize,
    runtime: Handle,
}

/// How a pump ended.
#[derive(Debug, Clone, Copy)]
enum Exit {
    /// The watched path was removed.
    Removed,
    /// Native fault or closed raw channel.
    Faulted,
    /// Nobody reads the output any more.
    ReaderGone,
}

/// One watched path and the state its pump owns.
struct Node {
    ctx: Arc<Context>,
    path: PathBuf,
    watch: Box<dyn NativeWatch>,
    events: mpsc::Receiver<RawEvent>,
    output: mpsc::Sender<RawEvent>,
    /// Relay task per attached child. A finished relay means that child's
    /// subtree is gone and the path may be attached again.
    children: HashMap<PathBuf, JoinHandle<()>>,
    /// Relays of children reported deleted, still delivering their last events.
    departing: Vec<JoinHandle<()>>,
}

impl Node {
    /// Register `path`, attach its existing subdirectories and start the pump.
    ///
    /// Blocks on the native registration and the directory scan.
    fn spawn(ctx: &Arc<Context>, path: PathBuf) -> Result<EventStream, WatchError> {
        let Registration { watch, events } = ctx
            .registrar
            .register(&path, ctx.requested | TRACKED)?;

        let (output, rx) = mpsc::channel(ctx.capacity);
        let mut node = Node {
            ctx: Arc::clone(ctx),
            path: path.clone(),
            watch,
            events,
            output,
            children: HashMap::new(),
            departing: Vec::new(),
        };

        // Scan before the pump runs so a directory seen here is not
        // attached a second time from its creation event.
        if path.is_dir() {
            let existing = match scan_children(&path) {
                Ok(existing) => existing,
                Err(e) => {
                    let Node { watch, events, .. } = node;
                    drop(events);
                    watch.unregister();
                    return Err(e);
                }
            };
            for child in existing {
                node.attach_existing(child);
            }
        }

        crate::debug_event!(
            "watcher",
            "node started",
            "{} ({} existing subdirectories)",
            path.display(),
            node.children.len()
        );

        ctx.runtime.spawn(node.pump());
        Ok(EventStream::new(path, rx))
    }

    /// [`Node::spawn`] on the blocking pool, for callers running on a worker.
    async fn spawn_off_worker(
        ctx: Arc<Context>,
        path: PathBuf,
    ) -> Result<EventStream, WatchError> {
        let target = path.clone();
        let runtime = ctx.runtime.clone();
        runtime
            .spawn_blocking(move || Node::spawn(&ctx, target))
            .await
            .unwrap_or_else(|e| {
                Err(WatchError::RegistrationFailed {
                    path,
                    reason: e.to_string(),
                })
            })
    }

    fn is_attached(&self, child: &Path) -> bool {
        self.children
            .get(child)
            .is_some_and(|relay| !relay.is_finished())
    }

    /// Attach a subdirectory that is already in place: found by the
    /// bootstrap scan or moved in from elsewhere.
    fn attach_existing(&mut self, child: PathBuf) {
        let ctx = Arc::clone(&self.ctx);
        let parent = self.output.clone();
        let path = child.clone();

        let relay = self.ctx.runtime.spawn(async move {
            match Node::spawn_off_worker(ctx, path).await {
                Ok(stream) => {
                    forward(stream, parent).await;
                }
                Err(e) => {
                    tracing::warn!("[watcher] cannot attach existing subdirectory: {e}");
                    let _ = parent.send(Err(e)).await;
                }
            }
        });
        self.children.insert(child, relay);
    }

    /// Attach a subdirectory announced by a creation event.
    ///
    /// The child is registered before the event is passed on, and its relay
    /// starts only after, so nothing from inside the child can overtake the
    /// event announcing it. Returns false once the output has no reader.
    async fn attach_created(&mut self, event: WatchEvent) -> bool {
        let child = event.path.clone();

        if self.is_attached(&child) {
            crate::debug_event!("watcher", "already attached", "{}", child.display());
            return self.emit(event).await;
        }

        let spawned = Node::spawn_off_worker(Arc::clone(&self.ctx), child.clone()).await;

        if !self.emit(event).await {
            return false;
        }

        match spawned {
            Ok(stream) => {
                crate::debug_event!("watcher", "new subdirectory", "{}", child.display());
                let relay = self.ctx.runtime.spawn({
                    let parent = self.output.clone();
                    async move {
                        forward(stream, parent).await;
                    }
                });
                self.children.insert(child, relay);
                true
            }
            Err(e) => {
                tracing::warn!("[watcher] cannot attach new subdirectory: {e}");
                self.output.send(Err(e)).await.is_ok()
            }
        }
    }

    /// Keep the child table in step with entries leaving or entering this
    /// directory.
    fn track(&mut self, event: &WatchEvent) {
        if event.kind.contains(EventKinds::DELETED) {
            // The child reports its own removal; let it finish delivering.
            if let Some(relay) = self.children.remove(&event.path) {
                self.departing.retain(|relay| !relay.is_finished());
                self.departing.push(relay);
            }
        } else if event.kind.contains(EventKinds::MOVED) {
            // Rename events name both ends; whichever end still exists as a
            // directory is the one inside this directory now.
            if event.path.is_dir() {
                if !self.is_attached(&event.path) {
                    crate::debug_event!("watcher", "moved in", "{}", event.path.display());
                    self.attach_existing(event.path.clone());
                }
            } else if let Some(relay) = self.children.remove(&event.path) {
                crate::debug_event!("watcher", "moved away", "{}", event.path.display());
                relay.abort();
            }
        }
    }

    /// Pass `event` on if the caller asked for its kind.
    async fn emit(&self, event: WatchEvent) -> bool {
        if !event.matches(self.ctx.requested) {
            return true;
        }
        self.output.send(Ok(event)).await.is_ok()
    }

    /// Consume native events until self deletion, a fault, or no reader,
    /// then take the node and its subtree down.
    async fn pump(mut self) {
        let exit = self.run().await;

        for relay in self.departing.drain(..) {
            relay.abort();
        }
        for (_, relay) in self.children.drain() {
            relay.abort();
        }

        let Node {
            ctx,
            path,
            watch,
            mut events,
            output,
            ..
        } = self;

        // The native thread may be parked on a full raw channel, and
        // releasing the watch waits for that thread.
        events.close();
        drop(events);
        // Last sender of this node; the stream closes once aborted relays
        // have dropped theirs.
        drop(output);

        crate::debug_event!("watcher", "node stopped", "{} ({exit:?})", path.display());
        ctx.runtime.spawn_blocking(move || watch.unregister());
    }

    /// Wait for children reported deleted to deliver their last events,
    /// up to [`DRAIN_GRACE`] each.
    async fn settle_departing(&mut self) {
        for mut relay in self.departing.drain(..) {
            if timeout(DRAIN_GRACE, &mut relay).await.is_err() {
                relay.abort();
            }
        }
    }

    async fn run(&mut self) -> Exit {
        loop {
            let item = tokio::select! {
                item = self.events.recv() => item,
                _ = self.output.closed() => return Exit::ReaderGone,
            };

            let event = match item {
                Some(Ok(event)) => event,
                Some(Err(fault)) => {
                    tracing::error!("[watcher] {fault}");
                    let _ = self.output.send(Err(fault)).await;
                    return Exit::Faulted;
                }
                None => {
                    let fault = WatchError::NativeFault {
                        path: self.path.clone(),
                        details: WatchError::ChannelClosed.to_string(),
                    };
                    tracing::error!("[watcher] {fault}");
                    let _ = self.output.send(Err(fault)).await;
                    return Exit::Faulted;
                }
            };

            crate::debug_event!("watcher", "event", "{event}");

            if event.kind.is_delete_self() {
                crate::log_event!("watcher", "removed", "{}", self.path.display());
                self.settle_departing().await;
                self.emit(event).await;
                return Exit::Removed;
            }

            let delivered = if event.kind.is_new_dir() {
                self.attach_created(event).await
            } else {
                self.track(&event);
                self.emit(event).await
            };

            if !delivered {
                return Exit::ReaderGone;
            }
        }
    }
}

/// Recursively watch `path` with the default notify-backed registrar.
///
/// See [`TreeWatcher::watch`].
pub fn watch(
    path: impl AsRef<Path>,
    requested: EventKinds,
    buffer_capacity: usize,
) -> Result<EventStream, WatchError> {
    TreeWatcher::default().watch(path, requested, buffer_capacity)
}
