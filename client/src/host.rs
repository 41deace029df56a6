//! Host-side actions: room creation, dealing, starting, reveals.

use std::sync::Arc;

use pyramid_engine::{
    close_round, create_game, deal_initial_hands, join_game, reveal_next_card, start_game,
    RevealOutcome,
};
use pyramid_gateway::{Gateway, Snapshot};
use pyramid_types::{CurrentRound, RoomCode};

use crate::session::Session;
use crate::{Result, RetryPolicy};

/// What a reveal produced, for the host UI.
#[derive(Clone, Debug)]
pub enum Reveal {
    /// A new round opened on the given card.
    Opened(CurrentRound),
    /// The pyramid is exhausted; final drink totals per uid.
    Finished(Vec<(String, u32)>),
}

/// A session whose uid is the room's admin.
pub struct HostSession {
    session: Session,
}

impl HostSession {
    /// Create the room: seeded shuffle, host registered as admin, record
    /// persisted in the store.
    pub async fn create(
        gateway: Arc<Gateway>,
        room: RoomCode,
        uid: &str,
        name: &str,
        created_at_ms: u64,
    ) -> Result<Self> {
        let record = create_game(&room, created_at_ms);
        let applied = join_game(&record, uid, name, true)?;
        gateway.create_room(applied.record).await?;
        tracing::info!(room = %room, host = %uid, "room created");
        Ok(Self {
            session: Session::new(gateway, room, uid),
        })
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

    /// Deal four cards to every joined player, in uid order.
    pub async fn deal_hands(&self) -> Result<Snapshot> {
        let (snapshot, ()) = self
            .session
            .submit(|record| {
                let order: Vec<String> = record.players.keys().cloned().collect();
                let applied = deal_initial_hands(record, &order)?;
                Ok((applied.mutation, ()))
            })
            .await?;
        Ok(snapshot)
    }

    /// Flip the started flag, opening play.
    pub async fn start(&self) -> Result<Snapshot> {
        let uid = self.session.uid().to_string();
        let (snapshot, ()) = self
            .session
            .submit(move |record| Ok((start_game(record, &uid)?.mutation, ())))
            .await?;
        Ok(snapshot)
    }

    /// Close the open round without revealing the next card.
    pub async fn close_round(&self) -> Result<Snapshot> {
        let uid = self.session.uid().to_string();
        let (snapshot, ()) = self
            .session
            .submit(move |record| Ok((close_round(record, &uid)?.mutation, ())))
            .await?;
        Ok(snapshot)
    }

    /// Reveal the next pyramid card, or finish the game when none remains.
    pub async fn reveal_next(&self) -> Result<(Snapshot, Reveal)> {
        let uid = self.session.uid().to_string();
        self.session
            .submit(move |record| match reveal_next_card(record, &uid)? {
                RevealOutcome::Opened { applied, round } => {
                    Ok((applied.mutation, Reveal::Opened(round)))
                }
                RevealOutcome::Finished { applied, summary } => {
                    Ok((applied.mutation, Reveal::Finished(summary)))
                }
            })
            .await
    }
}
