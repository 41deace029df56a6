//! Pyramid deterministic game core.
//!
//! This crate contains the rules layer: deck shuffling, setup/dealing, the
//! round state machine and the challenge protocol.
//!
//! ## Determinism requirements
//! - Do not use wall-clock time inside the engine; timestamps are
//!   caller-supplied.
//! - Do not use ambient randomness; the only randomness is the shuffle,
//!   derived from the room code, and transaction ids, generated by callers.
//! - Avoid iteration order of hash-based collections influencing outputs
//!   (the record uses ordered maps throughout).
//!
//! Every operation validates against a [`GameRecord`] snapshot and returns
//! an [`Applied`] carrying both the updated record and the minimal
//! [`Mutation`] to submit through the gateway. Operations never touch
//! shared state themselves.

use pyramid_types::{GameRecord, Mutation};

pub mod cards;
pub mod challenge;
pub mod errors;
pub mod replay;
pub mod round;
pub mod setup;
pub mod shuffle;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;


pub use challenge::{
    create_transaction, in_challenge, mark_seen, resolve_challenge, respond_to_transaction,
    ChallengeOutcome, Decision, Resolution,
};
pub use errors::EngineError;
pub use replay::compute_summary;
pub use round::{
    close_round, phase, reveal_next_card, start_game, RevealOutcome, RoundPhase, MIN_PLAYERS,
};
pub use setup::{create_game, deal_initial_hands, join_game};
pub use shuffle::shuffled_deck;

/// Result of one engine operation: the record as it looks after the change,
/// plus the partial mutation encoding exactly the paths the operation wrote.
#[derive(Clone, Debug)]
pub struct Applied {
    pub record: GameRecord,
    pub mutation: Mutation,
}

impl Applied {
    /// Merge `mutation` into a clone of `record`.
    ///
    /// Engine operations construct their ops against the same snapshot, so
    /// a merge failure here indicates a bug in the op builder; it is
    /// propagated rather than swallowed.
    pub(crate) fn merge(record: &GameRecord, mutation: Mutation) -> Result<Self, EngineError> {
        let mut updated = record.clone();
        mutation.apply(&mut updated)?;
        Ok(Self {
            record: updated,
            mutation,
        })
    }
}
