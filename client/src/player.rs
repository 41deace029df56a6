//! Player-side actions: joining, calls, responses, proofs.

use std::sync::Arc;

use pyramid_engine::{
    create_transaction, join_game, mark_seen, resolve_challenge, respond_to_transaction,
    ChallengeOutcome, Decision,
};
use pyramid_gateway::{Gateway, Snapshot};
use pyramid_types::{RoomCode, TxId};
use uuid::Uuid;

use crate::session::Session;
use crate::{Result, RetryPolicy};

/// Outcome of revealing a proof card, for the player UI.
#[derive(Clone, Copy, Debug)]
pub struct Proof {
    pub outcome: ChallengeOutcome,
    /// Replacement card dealt into the hand, absent when the deck ran dry.
    pub replacement: Option<u8>,
}

/// A session for a non-admin participant.
pub struct PlayerSession {
    session: Session,
}

impl PlayerSession {
    /// Join an existing room before the deal.
    pub async fn join(
        gateway: Arc<Gateway>,
        room: RoomCode,
        uid: &str,
        name: &str,
    ) -> Result<Self> {
        let session = Session::new(gateway, room, uid);
        let owned_uid = uid.to_string();
        let owned_name = name.to_string();
        session
            .submit(move |record| {
                Ok((join_game(record, &owned_uid, &owned_name, false)?.mutation, ()))
            })
            .await?;
        tracing::info!(room = %session.room(), uid = %uid, "player joined");
        Ok(Self { session })
    }

    /// Attach to an already joined room (e.g. after a reconnect).
    pub fn attach(gateway: Arc<Gateway>, room: RoomCode, uid: &str) -> Self {
        Self {
            session: Session::new(gateway, room, uid),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        let gateway = Arc::clone(self.session.gateway());
        let room = self.session.room().clone();
        let uid = self.session.uid().to_string();
        self.session = Session::with_retry_policy(gateway, room, &uid, retry);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn uid(&self) -> &str {
        self.session.uid()
    }

    /// Claim to hold the open round's rank and assign drinks to `target`.
    ///
    /// The transaction id is generated here, client-side; the store keys the
    /// record by it so simultaneous calls cannot collide.
    pub async fn call(&self, target: &str) -> Result<(Snapshot, TxId)> {
        let id = TxId(Uuid::new_v4().as_u128());
        let from = self.session.uid().to_string();
        let to = target.to_string();
        let (snapshot, ()) = self
            .session
            .submit(move |record| {
                Ok((create_transaction(record, id, &from, &to)?.mutation, ()))
            })
            .await?;
        Ok((snapshot, id))
    }

    /// Accept or dispute a call made against this player.
    pub async fn respond(&self, id: TxId, decision: Decision) -> Result<Snapshot> {
        let uid = self.session.uid().to_string();
        let (snapshot, ()) = self
            .session
            .submit(move |record| {
                Ok((
                    respond_to_transaction(record, &uid, id, decision)?.mutation,
                    (),
                ))
            })
            .await?;
        Ok(snapshot)
    }

    /// Resolve a disputed call by revealing one of this player's cards.
    pub async fn prove(&self, id: TxId, card: u8) -> Result<(Snapshot, Proof)> {
        let uid = self.session.uid().to_string();
        self.session
            .submit(move |record| {
                let resolution = resolve_challenge(record, &uid, id, card)?;
                Ok((
                    resolution.applied.mutation,
                    Proof {
                        outcome: resolution.outcome,
                        replacement: resolution.replacement,
                    },
                ))
            })
            .await
    }

    /// Record that this player's UI has displayed a transaction.
    pub async fn mark_seen(&self, id: TxId) -> Result<Snapshot> {
        let uid = self.session.uid().to_string();
        let (snapshot, ()) = self
            .session
            .submit(move |record| Ok((mark_seen(record, &uid, id)?.mutation, ())))
            .await?;
        Ok(snapshot)
    }
}
