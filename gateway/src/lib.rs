//! Pyramid sync gateway.
//!
//! An in-memory document store holding one [`GameRecord`] per room, with
//! subscribe/mutate/get-fresh semantics:
//!
//! - `subscribe` hands back the current snapshot immediately plus a live
//!   receiver of every subsequently committed snapshot, in commit order as
//!   observed by that subscriber. Delivery is at-least-once; snapshots are
//!   version-stamped so redelivery is idempotent downstream.
//! - `mutate` merges a partial [`Mutation`] under the room's write lock and
//!   resolves once the commit is visible to every later read. Failures are
//!   always reported to the caller, never swallowed.
//! - `get_fresh` bypasses any receiver buffering and reads the latest
//!   committed snapshot, which is the escape hatch for callers that must
//!   observe their own just-committed write.
//!
//! There is no cross-room ordering and no client holds a lock between
//! operations: two clients that both read, locally extend and rewrite the
//! same list field can still lose one update. `mutate_if` turns that race
//! into a detectable [`StoreError::VersionConflict`] for callers that pass
//! the version their read was based on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use commonware_codec::Encode;
use pyramid_types::{GameRecord, Mutation, RoomCode};
use tokio::sync::{broadcast, RwLock};

mod config;
mod error;

#[cfg(test)]
mod tests;

pub use config::GatewayConfig;
pub use error::StoreError;

/// One committed, immutable view of a room's record.
///
/// Snapshots share the record allocation and carry the canonical encoding,
/// so fanning one out to many subscribers never re-serializes.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub version: u64,
    pub record: Arc<GameRecord>,
    pub bytes: Arc<Vec<u8>>,
}

impl Snapshot {
    fn new(version: u64, record: Arc<GameRecord>) -> Self {
        let bytes = Arc::new(record.as_ref().encode().to_vec());
        Self {
            version,
            record,
            bytes,
        }
    }
}

/// A live feed of one room's snapshots.
///
/// Dropping the subscription (or just the receiver) stops delivery
/// immediately; the guard keeps the room's subscriber count accurate.
pub struct Subscription {
    /// Snapshot current at subscribe time, delivered before any live update.
    pub initial: Snapshot,
    pub receiver: broadcast::Receiver<Snapshot>,
    _guard: SubscriberGuard,
}

impl Subscription {
    /// Split into parts for a forwarding task. The guard must stay alive as
    /// long as the receiver is polled or the subscriber count undercounts.
    pub fn into_parts(self) -> (Snapshot, broadcast::Receiver<Snapshot>, SubscriberGuard) {
        (self.initial, self.receiver, self._guard)
    }
}

pub struct SubscriberGuard {
    room: RoomCode,
    count: Arc<AtomicUsize>,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let before = self.count.fetch_sub(1, Ordering::Relaxed);
        tracing::debug!(
            room = %self.room,
            remaining = before.saturating_sub(1),
            "subscriber detached"
        );
    }
}

struct Room {
    record: Arc<GameRecord>,
    version: u64,
    update_tx: broadcast::Sender<Snapshot>,
    // Keep an initial receiver alive to prevent channel closure when no
    // subscribers exist.
    #[allow(dead_code)]
    update_rx: broadcast::Receiver<Snapshot>,
    subscribers: Arc<AtomicUsize>,
}

/// The shared store mediating all concurrency between clients.
pub struct Gateway {
    config: GatewayConfig,
    rooms: RwLock<HashMap<RoomCode, Room>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::new_with_config(GatewayConfig::default())
    }

    pub fn new_with_config(config: GatewayConfig) -> Self {
        Self {
            config,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Persist a freshly created record under its room code.
    pub async fn create_room(&self, record: GameRecord) -> Result<Snapshot, StoreError> {
        self.check_record(&record)?;
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(&record.room) {
            return Err(StoreError::RoomAlreadyExists {
                room: record.room.clone(),
            });
        }
        let max = self.config.max_rooms();
        if rooms.len() >= max {
            return Err(StoreError::TooManyRooms { max });
        }
        let (update_tx, update_rx) = broadcast::channel(self.config.updates_broadcast_capacity());
        let room_code = record.room.clone();
        let snapshot = Snapshot::new(1, Arc::new(record));
        rooms.insert(
            room_code.clone(),
            Room {
                record: Arc::clone(&snapshot.record),
                version: snapshot.version,
                update_tx,
                update_rx,
                subscribers: Arc::new(AtomicUsize::new(0)),
            },
        );
        tracing::info!(room = %room_code, total_rooms = rooms.len(), "room created");
        Ok(snapshot)
    }

    /// Drop a room; external expiry hooks call this for finished games.
    ///
    /// Live subscriptions observe their channel closing.
    pub async fn remove_room(&self, room: &RoomCode) -> bool {
        let mut rooms = self.rooms.write().await;
        let removed = rooms.remove(room).is_some();
        if removed {
            tracing::info!(room = %room, remaining_rooms = rooms.len(), "room removed");
        }
        removed
    }

    /// Attach to a room's snapshot feed.
    ///
    /// The receiver is created under the same lock that commits go through,
    /// so the initial snapshot plus the feed covers every committed version
    /// from subscribe time on with no gap.
    pub async fn subscribe(&self, room: &RoomCode) -> Result<Subscription, StoreError> {
        let rooms = self.rooms.read().await;
        let entry = rooms
            .get(room)
            .ok_or_else(|| StoreError::RoomNotFound { room: room.clone() })?;
        let receiver = entry.update_tx.subscribe();
        let initial = Snapshot::new(entry.version, Arc::clone(&entry.record));
        entry.subscribers.fetch_add(1, Ordering::Relaxed);
        Ok(Subscription {
            initial,
            receiver,
            _guard: SubscriberGuard {
                room: room.clone(),
                count: Arc::clone(&entry.subscribers),
            },
        })
    }

    /// Read the latest committed snapshot, bypassing any receiver buffering.
    pub async fn get_fresh(&self, room: &RoomCode) -> Result<Snapshot, StoreError> {
        let rooms = self.rooms.read().await;
        let entry = rooms
            .get(room)
            .ok_or_else(|| StoreError::RoomNotFound { room: room.clone() })?;
        Ok(Snapshot::new(entry.version, Arc::clone(&entry.record)))
    }

    /// Current subscriber count for a room (0 for unknown rooms).
    pub async fn subscriber_count(&self, room: &RoomCode) -> usize {
        let rooms = self.rooms.read().await;
        rooms
            .get(room)
            .map(|entry| entry.subscribers.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Merge a partial mutation into the room's record unconditionally.
    pub async fn mutate(
        &self,
        room: &RoomCode,
        mutation: &Mutation,
    ) -> Result<Snapshot, StoreError> {
        self.commit(room, None, mutation).await
    }

    /// Merge a partial mutation only if the room is still at
    /// `expected_version` (the version the caller's read was based on).
    ///
    /// A conflict means another client committed in between: re-read with
    /// [`Gateway::get_fresh`], rebuild the mutation and resubmit.
    pub async fn mutate_if(
        &self,
        room: &RoomCode,
        expected_version: u64,
        mutation: &Mutation,
    ) -> Result<Snapshot, StoreError> {
        self.commit(room, Some(expected_version), mutation).await
    }

    async fn commit(
        &self,
        room: &RoomCode,
        expected_version: Option<u64>,
        mutation: &Mutation,
    ) -> Result<Snapshot, StoreError> {
        let mut rooms = self.rooms.write().await;
        let entry = rooms
            .get_mut(room)
            .ok_or_else(|| StoreError::RoomNotFound { room: room.clone() })?;
        if let Some(expected) = expected_version {
            if entry.version != expected {
                return Err(StoreError::VersionConflict {
                    expected,
                    actual: entry.version,
                });
            }
        }

        let mut updated = entry.record.as_ref().clone();
        mutation.apply(&mut updated)?;
        self.check_record(&updated)?;

        entry.version += 1;
        entry.record = Arc::new(updated);
        let snapshot = Snapshot::new(entry.version, Arc::clone(&entry.record));
        // The room's keep-alive receiver means send cannot fail while the
        // room exists; a count of one means nobody is actually listening.
        if entry.update_tx.receiver_count() <= 1 {
            tracing::debug!(room = %room, "committed with no live subscribers");
        }
        let _ = entry.update_tx.send(snapshot.clone());
        Ok(snapshot)
    }

    fn check_record(&self, record: &GameRecord) -> Result<(), StoreError> {
        match record.validate_invariants() {
            Ok(()) => Ok(()),
            Err(err) if self.config.enforce_invariant_validation => {
                tracing::error!(room = %record.room, %err, "rejecting invalid record");
                Err(StoreError::Invariant(err))
            }
            Err(err) => {
                tracing::warn!(
                    room = %record.room,
                    %err,
                    "record invariant violation; enforcement disabled, committing anyway"
                );
                Ok(())
            }
        }
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}
