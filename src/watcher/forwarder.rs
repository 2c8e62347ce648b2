//! Fan-in edge between a child subtree and its parent.

use tokio::sync::mpsc;

use super::{EventStream, RawEvent};

/// Relay every item of `child` into `parent`, in order.
///
/// Ends when the child stream is exhausted. Also ends early once nobody is
/// reading the parent any more; dropping `child` then lets the child
/// subtree notice and release its watches. Returns the number of items
/// relayed.
pub async fn forward(mut child: EventStream, parent: mpsc::Sender<RawEvent>) -> usize {
    let mut relayed = 0;

    loop {
        let item = tokio::select! {
            item = child.recv() => item,
            _ = parent.closed() => break,
        };

        let Some(item) = item else {
            break;
        };

        if parent.send(item).await.is_err() {
            break;
        }
        relayed += 1;
    }

    crate::debug_event!(
        "forwarder",
        "finished",
        "{} ({relayed} items)",
        child.path().display()
    );
    relayed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::{EventKinds, WatchError, WatchEvent};
    use std::path::PathBuf;

    fn stream(capacity: usize) -> (mpsc::Sender<RawEvent>, EventStream) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, EventStream::new(PathBuf::from("/child"), rx))
    }

    #[tokio::test]
    async fn test_forward_preserves_order_until_exhausted() {
        let (child_tx, child) = stream(8);
        let (parent_tx, mut parent_rx) = mpsc::channel(8);

        for name in ["a", "b", "c"] {
            child_tx
                .send(Ok(WatchEvent::new(format!("/child/{name}"), EventKinds::CREATED)))
                .await
                .unwrap();
        }
        child_tx
            .send(Err(WatchError::ChannelClosed))
            .await
            .unwrap();
        drop(child_tx);

        let relayed = forward(child, parent_tx).await;
        assert_eq!(relayed, 4);

        let mut paths = Vec::new();
        while let Some(item) = parent_rx.recv().await {
            match item {
                Ok(event) => paths.push(event.path),
                Err(e) => assert_eq!(e, WatchError::ChannelClosed),
            }
        }
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/child/a"),
                PathBuf::from("/child/b"),
                PathBuf::from("/child/c")
            ]
        );
    }

    #[tokio::test]
    async fn test_forward_stops_when_parent_reader_gone() {
        let (child_tx, child) = stream(1);
        let (parent_tx, parent_rx) = mpsc::channel(1);
        drop(parent_rx);

        let relayed = forward(child, parent_tx).await;
        assert_eq!(relayed, 0);
        // The child stream was dropped with the forwarder.
        assert!(child_tx.is_closed());
    }
}
