//! Challenge protocol: call, accept/dispute, proof and replacement dealing.
//!
//! A transaction is a two-party negotiation mediated entirely by writes to
//! the shared record. The caller claims to hold a card matching the open
//! round's rank and assigns drinks to a target; the target either accepts
//! (drinks the row value) or calls bullshit, forcing the caller to reveal a
//! hand card:
//! - revealed rank matches the round card -> `BullshitCorrect`, the target
//!   drinks double;
//! - otherwise -> `BullshitWrong`, the caller drinks double.
//!
//! Either way the revealed card leaves play and a replacement is dealt from
//! the deck; when the deck is empty the hand permanently shrinks instead.

use pyramid_types::{
    CurrentRound, GameDelta, GameRecord, HandCard, Mutation, Transaction, TransactionStatus,
    TxId,
};

use crate::cards::ranks_match;
use crate::errors::EngineError;
use crate::Applied;

/// The target's answer to a waiting call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Drink the row value; the transaction is terminal.
    Accept,
    /// Dispute the call; the caller must reveal a card.
    Bullshit,
}

/// How a disputed call resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeOutcome {
    /// The revealed rank matched; the target drinks double.
    Correct,
    /// The revealed rank did not match; the caller drinks double.
    Wrong,
}

/// Result of resolving a disputed call.
#[derive(Clone, Debug)]
pub struct Resolution {
    pub applied: Applied,
    pub outcome: ChallengeOutcome,
    /// Card dealt to refill the hand, absent when the deck ran dry.
    pub replacement: Option<u8>,
}

fn open_round(record: &GameRecord) -> Result<CurrentRound, EngineError> {
    if record.meta.finished {
        return Err(EngineError::GameFinished);
    }
    if !record.meta.started {
        return Err(EngineError::GameNotStarted);
    }
    record.current_round.ok_or(EngineError::NoOpenRound)
}

/// Find `id` in the open round, rejecting transactions from closed rounds:
/// those were invalidated when the round ended and can no longer be acted on.
fn open_transaction<'a>(
    record: &'a GameRecord,
    current: &CurrentRound,
    id: TxId,
) -> Result<&'a Transaction, EngineError> {
    if let Some(round) = record.rounds.get(&current.number) {
        if let Some(tx) = round.transactions.get(&id) {
            return Ok(tx);
        }
    }
    match record.find_transaction(id) {
        Some(_) => Err(EngineError::StaleTransaction { id }),
        None => Err(EngineError::UnknownTransaction { id }),
    }
}

/// Whether `uid` is blocked by an unresolved transaction in the open round.
///
/// Closed rounds never contribute: revealing the next card releases every
/// player that was stuck mid-challenge.
pub fn in_challenge(record: &GameRecord, uid: &str) -> bool {
    let Some(round) = record.open_round() else {
        return false;
    };
    round
        .transactions
        .values()
        .any(|tx| tx.status.is_unresolved() && tx.involves(uid))
}

/// Create a call from `from` against `to` in the open round.
///
/// The id is generated by the calling client; keying the record by it is
/// what keeps two simultaneous calls from erasing each other.
pub fn create_transaction(
    record: &GameRecord,
    id: TxId,
    from: &str,
    to: &str,
) -> Result<Applied, EngineError> {
    let current = open_round(record)?;
    if from == to {
        return Err(EngineError::SelfCall);
    }
    for uid in [from, to] {
        if record.player(uid).is_none() {
            return Err(EngineError::UnknownPlayer {
                uid: uid.to_string(),
            });
        }
    }
    if in_challenge(record, from) {
        return Err(EngineError::CallerBusy {
            uid: from.to_string(),
        });
    }
    let tx = Transaction::call(id, from.to_string(), to.to_string());
    Applied::merge(
        record,
        Mutation::single(GameDelta::PutTransaction {
            round: current.number,
            tx,
        }),
    )
}

/// Accept or dispute a waiting call. Only the target may answer.
pub fn respond_to_transaction(
    record: &GameRecord,
    actor: &str,
    id: TxId,
    decision: Decision,
) -> Result<Applied, EngineError> {
    let current = open_round(record)?;
    let tx = open_transaction(record, &current, id)?;
    if tx.to != actor {
        return Err(EngineError::NotYourTransaction {
            uid: actor.to_string(),
        });
    }
    if tx.status != TransactionStatus::Waiting {
        return Err(EngineError::NotAwaitingResponse { status: tx.status });
    }

    let mut updated = tx.clone();
    updated.seen_by.insert(actor.to_string());
    match decision {
        Decision::Accept => {
            updated.status = TransactionStatus::Accepted;
            let drinks = record
                .player(actor)
                .map(|p| p.drinks + current.row as u32)
                .ok_or_else(|| EngineError::UnknownPlayer {
                    uid: actor.to_string(),
                })?;
            Applied::merge(
                record,
                Mutation::new(vec![
                    GameDelta::PutTransaction {
                        round: current.number,
                        tx: updated,
                    },
                    GameDelta::SetDrinks {
                        uid: actor.to_string(),
                        drinks,
                    },
                ]),
            )
        }
        Decision::Bullshit => {
            updated.status = TransactionStatus::Bullshit;
            Applied::merge(
                record,
                Mutation::single(GameDelta::PutTransaction {
                    round: current.number,
                    tx: updated,
                }),
            )
        }
    }
}

/// Resolve a disputed call by revealing one of the caller's hand cards.
///
/// The revealed card is discarded and replaced from the deck top. Deck
/// exhaustion is not an error: the hand shrinks and play continues.
pub fn resolve_challenge(
    record: &GameRecord,
    actor: &str,
    id: TxId,
    revealed_card: u8,
) -> Result<Resolution, EngineError> {
    let current = open_round(record)?;
    let tx = open_transaction(record, &current, id)?;
    if tx.from != actor {
        return Err(EngineError::NotYourTransaction {
            uid: actor.to_string(),
        });
    }
    if tx.status != TransactionStatus::Bullshit {
        return Err(EngineError::NotAwaitingProof { status: tx.status });
    }
    let caller = record
        .player(actor)
        .ok_or_else(|| EngineError::UnknownPlayer {
            uid: actor.to_string(),
        })?;
    let position = caller
        .hand
        .iter()
        .position(|c| c.card == revealed_card)
        .ok_or(EngineError::CardNotInHand {
            card: revealed_card,
        })?;

    let outcome = if ranks_match(revealed_card, current.card) {
        ChallengeOutcome::Correct
    } else {
        ChallengeOutcome::Wrong
    };
    let drinker = match outcome {
        ChallengeOutcome::Correct => tx.to.clone(),
        ChallengeOutcome::Wrong => tx.from.clone(),
    };
    let penalty = 2 * current.row as u32;
    let drinks = record
        .player(&drinker)
        .map(|p| p.drinks + penalty)
        .ok_or_else(|| EngineError::UnknownPlayer {
            uid: drinker.clone(),
        })?;

    // Remove the proof card; refill from the deck top when possible. The
    // fresh card starts unseen, which is what grants its viewing window.
    let mut hand = caller.hand.clone();
    hand.remove(position);
    let mut deck = record.deck.clone();
    let replacement = if deck.is_empty() {
        None
    } else {
        let card = deck.remove(0);
        hand.push(HandCard { card, seen: false });
        Some(card)
    };
    let mut discards = record.discards.clone();
    discards.push(revealed_card);

    let mut updated = tx.clone();
    updated.status = match outcome {
        ChallengeOutcome::Correct => TransactionStatus::BullshitCorrect,
        ChallengeOutcome::Wrong => TransactionStatus::BullshitWrong,
    };

    let mutation = Mutation::new(vec![
        GameDelta::PutTransaction {
            round: current.number,
            tx: updated,
        },
        GameDelta::SetHand {
            uid: actor.to_string(),
            hand,
        },
        GameDelta::SetDeck(deck),
        GameDelta::SetDiscards(discards),
        GameDelta::SetDrinks {
            uid: drinker,
            drinks,
        },
    ]);
    Ok(Resolution {
        applied: Applied::merge(record, mutation)?,
        outcome,
        replacement,
    })
}

/// Record that `uid` has displayed transaction `id` in the open round.
pub fn mark_seen(record: &GameRecord, uid: &str, id: TxId) -> Result<Applied, EngineError> {
    let current = open_round(record)?;
    let tx = open_transaction(record, &current, id)?;
    if record.player(uid).is_none() {
        return Err(EngineError::UnknownPlayer {
            uid: uid.to_string(),
        });
    }
    if tx.seen_by.contains(uid) {
        // Idempotent: nothing to write.
        return Applied::merge(record, Mutation::default());
    }
    Applied::merge(
        record,
        Mutation::single(GameDelta::MarkSeen {
            round: current.number,
            id,
            uid: uid.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{record_in_round, HOST};
    use crate::round::{close_round, reveal_next_card, RevealOutcome};

    #[test]
    fn test_call_requires_open_round() {
        let record = crate::mocks::started_record(3);
        assert!(matches!(
            create_transaction(&record, TxId(1), "uid-1", "uid-2"),
            Err(EngineError::NoOpenRound)
        ));
    }

    #[test]
    fn test_call_rejects_self_and_strangers() {
        let (record, _) = record_in_round(3);
        assert!(matches!(
            create_transaction(&record, TxId(1), "uid-1", "uid-1"),
            Err(EngineError::SelfCall)
        ));
        assert!(matches!(
            create_transaction(&record, TxId(1), "uid-1", "ghost"),
            Err(EngineError::UnknownPlayer { .. })
        ));
    }

    #[test]
    fn test_caller_blocked_while_unresolved() {
        let (record, _) = record_in_round(3);
        let record = create_transaction(&record, TxId(1), "uid-1", "uid-2")
            .unwrap()
            .record;
        assert!(in_challenge(&record, "uid-1"));
        assert!(in_challenge(&record, "uid-2"));
        assert!(!in_challenge(&record, HOST));
        assert!(matches!(
            create_transaction(&record, TxId(2), "uid-1", HOST),
            Err(EngineError::CallerBusy { .. })
        ));
    }

    #[test]
    fn test_only_target_responds_once() {
        let (record, _) = record_in_round(3);
        let record = create_transaction(&record, TxId(1), "uid-1", "uid-2")
            .unwrap()
            .record;
        assert!(matches!(
            respond_to_transaction(&record, "uid-1", TxId(1), Decision::Accept),
            Err(EngineError::NotYourTransaction { .. })
        ));
        let record = respond_to_transaction(&record, "uid-2", TxId(1), Decision::Accept)
            .unwrap()
            .record;
        assert!(matches!(
            respond_to_transaction(&record, "uid-2", TxId(1), Decision::Bullshit),
            Err(EngineError::NotAwaitingResponse { .. })
        ));
    }

    #[test]
    fn test_resolution_requires_dispute_first() {
        let (record, _) = record_in_round(3);
        let record = create_transaction(&record, TxId(1), "uid-1", "uid-2")
            .unwrap()
            .record;
        let card = record.player("uid-1").unwrap().hand[0].card;
        assert!(matches!(
            resolve_challenge(&record, "uid-1", TxId(1), card),
            Err(EngineError::NotAwaitingProof { .. })
        ));
    }

    #[test]
    fn test_stale_transaction_rejected_after_next_reveal() {
        let (record, _) = record_in_round(3);
        let record = create_transaction(&record, TxId(1), "uid-1", "uid-2")
            .unwrap()
            .record;

        // Host reveals the next card while the call is still waiting.
        let record = match reveal_next_card(&record, HOST).unwrap() {
            RevealOutcome::Opened { applied, .. } => applied.record,
            RevealOutcome::Finished { .. } => panic!("pyramid not exhausted"),
        };

        // The old call is dropped: nobody is blocked and it cannot be
        // answered anymore.
        assert!(!in_challenge(&record, "uid-1"));
        assert!(!in_challenge(&record, "uid-2"));
        assert!(matches!(
            respond_to_transaction(&record, "uid-2", TxId(1), Decision::Accept),
            Err(EngineError::StaleTransaction { .. })
        ));
    }

    #[test]
    fn test_closed_round_releases_players() {
        let (record, _) = record_in_round(3);
        let record = create_transaction(&record, TxId(1), "uid-1", "uid-2")
            .unwrap()
            .record;
        let record = respond_to_transaction(&record, "uid-2", TxId(1), Decision::Bullshit)
            .unwrap()
            .record;
        assert!(in_challenge(&record, "uid-1"));

        let record = close_round(&record, HOST).unwrap().record;
        assert!(!in_challenge(&record, "uid-1"));
        assert!(!in_challenge(&record, "uid-2"));
    }

    #[test]
    fn test_mark_seen_idempotent() {
        let (record, _) = record_in_round(3);
        let record = create_transaction(&record, TxId(1), "uid-1", "uid-2")
            .unwrap()
            .record;
        let record = mark_seen(&record, "uid-2", TxId(1)).unwrap().record;
        let again = mark_seen(&record, "uid-2", TxId(1)).unwrap();
        assert!(again.mutation.is_empty());
        let round = record.open_round().unwrap();
        assert!(round.transactions[&TxId(1)].seen_by.contains("uid-2"));
    }
}
