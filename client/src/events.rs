//! Live snapshot feeds.
//!
//! Consumers recompute derived state from each delivered snapshot instead of
//! patching previous state in place; the version stamp makes redelivery
//! harmless. A subscriber that falls behind the broadcast buffer is
//! re-synced from a fresh read rather than fed a stale backlog.

use std::sync::Arc;

use futures::Stream as FutStream;
use pyramid_gateway::{Gateway, Snapshot, Subscription};
use pyramid_types::RoomCode;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::{Error, Result};

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Stream of committed snapshots for one room.
pub struct SnapshotStream {
    receiver: mpsc::Receiver<Result<Snapshot>>,
    _handle: tokio::task::JoinHandle<()>,
}

impl Drop for SnapshotStream {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

impl SnapshotStream {
    pub(crate) fn spawn(
        gateway: Arc<Gateway>,
        room: RoomCode,
        subscription: Subscription,
    ) -> Self {
        Self::spawn_with_capacity(gateway, room, subscription, DEFAULT_CHANNEL_CAPACITY)
    }

    pub(crate) fn spawn_with_capacity(
        gateway: Arc<Gateway>,
        room: RoomCode,
        subscription: Subscription,
        capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(forward(gateway, room, subscription, tx));
        Self {
            receiver: rx,
            _handle: handle,
        }
    }

    /// Receive the next snapshot from the feed.
    ///
    /// `None` means the room was removed or the stream was dropped.
    pub async fn next(&mut self) -> Option<Result<Snapshot>> {
        self.receiver.recv().await
    }
}

impl FutStream for SnapshotStream {
    type Item = Result<Snapshot>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

async fn forward(
    gateway: Arc<Gateway>,
    room: RoomCode,
    subscription: Subscription,
    tx: mpsc::Sender<Result<Snapshot>>,
) {
    // The guard lives for the whole forwarding task so the room's
    // subscriber count stays accurate until the feed is dropped.
    let (initial, mut receiver, _guard) = subscription.into_parts();

    // Snapshots at or below this version were already delivered; dropping
    // them downstream is what makes at-least-once delivery idempotent.
    let mut last_version = 0u64;

    if !deliver(&tx, &mut last_version, initial).await {
        return;
    }

    loop {
        match receiver.recv().await {
            Ok(snapshot) => {
                if !deliver(&tx, &mut last_version, snapshot).await {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(
                    room = %room,
                    skipped,
                    "snapshot feed lagged; re-syncing from a fresh read"
                );
                match gateway.get_fresh(&room).await {
                    Ok(snapshot) => {
                        if !deliver(&tx, &mut last_version, snapshot).await {
                            break;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err.into())).await;
                        break;
                    }
                }
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(room = %room, "snapshot feed closed");
                let _ = tx.send(Err(Error::FeedClosed)).await;
                break;
            }
        }
    }
}

async fn deliver(
    tx: &mpsc::Sender<Result<Snapshot>>,
    last_version: &mut u64,
    snapshot: Snapshot,
) -> bool {
    if snapshot.version <= *last_version {
        return true;
    }
    *last_version = snapshot.version;
    tx.send(Ok(snapshot)).await.is_ok()
}
