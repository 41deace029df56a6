//! Shared per-client context.
//!
//! A [`Session`] bundles the gateway handle, room and acting uid that every
//! operation needs; it is passed by reference instead of living in any
//! global, so tests construct as many independent clients as they like.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use pyramid_engine::EngineError;
use pyramid_gateway::{Gateway, Snapshot};
use pyramid_types::{GameRecord, Mutation, RoomCode};

use crate::events::SnapshotStream;
use crate::{Error, Result, RetryPolicy};

/// Milliseconds since the Unix epoch, for record timestamps.
///
/// The engine never reads a clock; this is the single place the SDK does.
pub fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Context object threaded through every client operation.
#[derive(Clone)]
pub struct Session {
    gateway: Arc<Gateway>,
    room: RoomCode,
    uid: String,
    retry: RetryPolicy,
}

impl Session {
    pub fn new(gateway: Arc<Gateway>, room: RoomCode, uid: &str) -> Self {
        Self::with_retry_policy(gateway, room, uid, RetryPolicy::default())
    }

    pub fn with_retry_policy(
        gateway: Arc<Gateway>,
        room: RoomCode,
        uid: &str,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            room,
            uid: uid.to_string(),
            retry,
        }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn room(&self) -> &RoomCode {
        &self.room
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Latest committed snapshot, bypassing any feed buffering.
    pub async fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.gateway.get_fresh(&self.room).await?)
    }

    /// Open a live snapshot feed for this room.
    pub async fn subscribe(&self) -> Result<SnapshotStream> {
        let subscription = self.gateway.subscribe(&self.room).await?;
        Ok(SnapshotStream::spawn(
            Arc::clone(&self.gateway),
            self.room.clone(),
            subscription,
        ))
    }

    /// Read-modify-write with conflict retry.
    ///
    /// Each attempt re-reads the latest snapshot, rebuilds the mutation
    /// against it and submits conditionally on the version just read; a
    /// superseded write is retried per the session's [`RetryPolicy`] before
    /// the conflict is surfaced. Rule violations are never retried.
    pub(crate) async fn submit<T>(
        &self,
        build: impl Fn(&GameRecord) -> std::result::Result<(Mutation, T), EngineError>,
    ) -> Result<(Snapshot, T)> {
        let mut attempts = 0;
        loop {
            let base = self.gateway.get_fresh(&self.room).await?;
            let (mutation, extra) = build(&base.record)?;
            if mutation.is_empty() {
                // Nothing to write (e.g. an acknowledgement already
                // recorded); the fresh snapshot is the outcome.
                return Ok((base, extra));
            }
            match self
                .gateway
                .mutate_if(&self.room, base.version, &mutation)
                .await
            {
                Ok(snapshot) => return Ok((snapshot, extra)),
                Err(err) if err.is_retryable() => {
                    attempts += 1;
                    if attempts >= self.retry.max_attempts {
                        return Err(Error::RetriesExhausted { attempts });
                    }
                    tracing::debug!(
                        room = %self.room,
                        uid = %self.uid,
                        attempts,
                        "write superseded; re-reading and retrying"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
