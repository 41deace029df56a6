//! Round state machine.
//!
//! A room moves through five phases:
//! 1. **WaitingToStart** - players joining, nothing dealt
//! 2. **Dealt** - pyramid and hands sliced off the deck
//! 3. **RoundActive** - game running, no card face-up for calls
//! 4. **RoundResolving** - a pyramid card is revealed, calls and challenges
//!    run against it
//! 5. **GameEnded** - all fifteen slots shown, summary computed
//!
//! The phase is never stored; it is derived from the record so every client
//! recomputes it from the latest snapshot instead of patching local state.

use pyramid_types::{
    row_for_slot, CurrentRound, GameDelta, GameRecord, Mutation, PYRAMID_SLOTS,
};

use crate::errors::EngineError;
use crate::replay::compute_summary;
use crate::Applied;

/// Minimum players before the host may start.
pub const MIN_PLAYERS: usize = 2;

/// Derived lifecycle phase of a room.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundPhase {
    WaitingToStart,
    Dealt,
    RoundActive,
    RoundResolving,
    GameEnded,
}

/// Compute the phase for a record snapshot.
pub fn phase(record: &GameRecord) -> RoundPhase {
    if record.meta.finished {
        return RoundPhase::GameEnded;
    }
    if !record.meta.started {
        let dealt = !record.players.is_empty()
            && record.players.values().all(|p| !p.hand.is_empty());
        return if dealt {
            RoundPhase::Dealt
        } else {
            RoundPhase::WaitingToStart
        };
    }
    if record.current_round.is_some() {
        RoundPhase::RoundResolving
    } else {
        RoundPhase::RoundActive
    }
}

/// Outcome of a reveal request.
#[derive(Clone, Debug)]
pub enum RevealOutcome {
    /// A new slot was revealed and its round opened.
    Opened {
        applied: Applied,
        round: CurrentRound,
    },
    /// No unshown slot remained: the game is over and the summary computed.
    Finished {
        applied: Applied,
        summary: Vec<(String, u32)>,
    },
}

fn require_host(record: &GameRecord, actor: &str) -> Result<(), EngineError> {
    match record.player(actor) {
        Some(player) if player.admin => Ok(()),
        Some(_) => Err(EngineError::NotHost {
            uid: actor.to_string(),
        }),
        None => Err(EngineError::UnknownPlayer {
            uid: actor.to_string(),
        }),
    }
}

/// Flip `meta.started`, moving the room from Dealt to RoundActive.
pub fn start_game(record: &GameRecord, actor: &str) -> Result<Applied, EngineError> {
    require_host(record, actor)?;
    if record.meta.finished {
        return Err(EngineError::GameFinished);
    }
    if record.meta.started {
        return Err(EngineError::GameAlreadyStarted);
    }
    if record.players.len() < MIN_PLAYERS {
        return Err(EngineError::NotEnoughPlayers {
            got: record.players.len(),
            min: MIN_PLAYERS,
        });
    }
    if record.players.values().any(|p| p.hand.is_empty()) {
        return Err(EngineError::HandsNotDealt);
    }
    let mut meta = record.meta.clone();
    meta.started = true;
    Applied::merge(record, Mutation::single(GameDelta::SetMeta(meta)))
}

/// Close the open round without revealing the next card.
///
/// Unresolved transactions in the closed round become inert: the
/// in-challenge state is derived from the open round only, so every blocked
/// player is released the moment the marker clears.
pub fn close_round(record: &GameRecord, actor: &str) -> Result<Applied, EngineError> {
    require_host(record, actor)?;
    if record.current_round.is_none() {
        return Err(EngineError::NoOpenRound);
    }
    Applied::merge(
        record,
        Mutation::single(GameDelta::SetCurrentRound(None)),
    )
}

/// Reveal the next pyramid slot and open its round, or end the game when no
/// slot remains.
///
/// An open round is closed implicitly first; its unresolved transactions are
/// dropped from play (they stay recorded but never charge anyone).
pub fn reveal_next_card(record: &GameRecord, actor: &str) -> Result<RevealOutcome, EngineError> {
    require_host(record, actor)?;
    if record.meta.finished {
        return Err(EngineError::GameFinished);
    }
    if !record.meta.started {
        return Err(EngineError::GameNotStarted);
    }

    match record.next_unshown_slot() {
        Some(index) => {
            let number = record.rounds.len() as u8 + 1;
            debug_assert!(number as usize <= PYRAMID_SLOTS);
            let row = row_for_slot(index);
            let card = record.pyramid[index].card;

            let mut pyramid = record.pyramid.clone();
            pyramid[index].shown = true;

            let current = CurrentRound { number, row, card };
            let mutation = Mutation::new(vec![
                GameDelta::SetPyramid(pyramid),
                GameDelta::UpsertRound { number, row, card },
                GameDelta::SetCurrentRound(Some(current)),
            ]);
            Ok(RevealOutcome::Opened {
                applied: Applied::merge(record, mutation)?,
                round: current,
            })
        }
        None => {
            let summary = compute_summary(record);
            let mut meta = record.meta.clone();
            meta.finished = true;
            let mutation = Mutation::new(vec![
                GameDelta::SetCurrentRound(None),
                GameDelta::SetSummary(summary.clone()),
                GameDelta::SetMeta(meta),
            ]);
            Ok(RevealOutcome::Finished {
                applied: Applied::merge(record, mutation)?,
                summary,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{dealt_record, started_record, HOST};
    use pyramid_types::RoomCode;

    #[test]
    fn test_phase_progression() {
        let record = crate::setup::create_game(&RoomCode::parse("ABCD").unwrap(), 0);
        assert_eq!(phase(&record), RoundPhase::WaitingToStart);

        let dealt = dealt_record(3);
        assert_eq!(phase(&dealt), RoundPhase::Dealt);

        let started = started_record(3);
        assert_eq!(phase(&started), RoundPhase::RoundActive);

        let opened = match reveal_next_card(&started, HOST).unwrap() {
            RevealOutcome::Opened { applied, .. } => applied.record,
            RevealOutcome::Finished { .. } => panic!("fresh game cannot finish"),
        };
        assert_eq!(phase(&opened), RoundPhase::RoundResolving);

        let closed = close_round(&opened, HOST).unwrap().record;
        assert_eq!(phase(&closed), RoundPhase::RoundActive);
    }

    #[test]
    fn test_start_requires_host_and_hands() {
        let dealt = dealt_record(3);
        assert!(matches!(
            start_game(&dealt, "uid-1"),
            Err(EngineError::NotHost { .. })
        ));
        assert!(matches!(
            start_game(&dealt, "stranger"),
            Err(EngineError::UnknownPlayer { .. })
        ));
        start_game(&dealt, HOST).unwrap();
    }

    #[test]
    fn test_reveal_assigns_sequential_rounds() {
        let mut record = started_record(3);
        for expected in 1..=4u8 {
            record = match reveal_next_card(&record, HOST).unwrap() {
                RevealOutcome::Opened { applied, round } => {
                    assert_eq!(round.number, expected);
                    assert_eq!(round.row, 1);
                    applied.record
                }
                RevealOutcome::Finished { .. } => panic!("pyramid not exhausted"),
            };
            record.validate_invariants().unwrap();
        }
        // Fifth reveal exhausts row 1; the sixth moves to row 2.
        record = match reveal_next_card(&record, HOST).unwrap() {
            RevealOutcome::Opened { applied, round } => {
                assert_eq!(round.number, 5);
                assert_eq!(round.row, 1);
                applied.record
            }
            RevealOutcome::Finished { .. } => panic!("pyramid not exhausted"),
        };
        match reveal_next_card(&record, HOST).unwrap() {
            RevealOutcome::Opened { round, .. } => {
                assert_eq!(round.number, 6);
                assert_eq!(round.row, 2);
            }
            RevealOutcome::Finished { .. } => panic!("pyramid not exhausted"),
        }
    }

    #[test]
    fn test_sixteenth_reveal_ends_game() {
        let mut record = started_record(2);
        for _ in 0..PYRAMID_SLOTS {
            record = match reveal_next_card(&record, HOST).unwrap() {
                RevealOutcome::Opened { applied, .. } => applied.record,
                RevealOutcome::Finished { .. } => panic!("ended early"),
            };
        }
        let finished = match reveal_next_card(&record, HOST).unwrap() {
            RevealOutcome::Opened { .. } => panic!("no slots left to open"),
            RevealOutcome::Finished { applied, .. } => applied.record,
        };
        assert!(finished.meta.finished);
        assert!(finished.current_round.is_none());
        assert_eq!(phase(&finished), RoundPhase::GameEnded);
        assert!(matches!(
            reveal_next_card(&finished, HOST),
            Err(EngineError::GameFinished)
        ));
    }
}
