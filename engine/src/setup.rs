//! Room creation, player registration and the initial deal.

use pyramid_types::{
    GameDelta, GameRecord, HandCard, Mutation, PlayerRecord, RoomCode, HAND_SIZE, MAX_PLAYERS,
};

use crate::errors::EngineError;
use crate::shuffle::shuffled_deck;
use crate::Applied;

/// Build the initial record for a room: a seeded full-deck shuffle with the
/// first fifteen cards laid face-down into the pyramid.
pub fn create_game(room: &RoomCode, created_at_ms: u64) -> GameRecord {
    GameRecord::new(room.clone(), shuffled_deck(room), created_at_ms)
}

/// Register a player in the room.
///
/// Allowed only between creation and the initial deal; the first entrant is
/// normally the host (`admin`).
pub fn join_game(
    record: &GameRecord,
    uid: &str,
    name: &str,
    admin: bool,
) -> Result<Applied, EngineError> {
    if record.meta.finished {
        return Err(EngineError::GameFinished);
    }
    if record.meta.started {
        return Err(EngineError::GameAlreadyStarted);
    }
    if record.players.values().any(|p| !p.hand.is_empty()) {
        return Err(EngineError::HandsAlreadyDealt);
    }
    if record.players.contains_key(uid) {
        return Err(EngineError::AlreadyJoined {
            uid: uid.to_string(),
        });
    }
    if record.players.len() >= MAX_PLAYERS {
        return Err(EngineError::RoomFull { max: MAX_PLAYERS });
    }
    let player = PlayerRecord::new(uid.to_string(), name.to_string(), admin);
    player.validate_invariants()?;
    Applied::merge(record, Mutation::single(GameDelta::UpsertPlayer(player)))
}

/// Slice [`HAND_SIZE`] cards per player off the deck, in the given order.
///
/// The deck shrinks by `4 x playerCount`; hands start unseen.
pub fn deal_initial_hands(record: &GameRecord, order: &[String]) -> Result<Applied, EngineError> {
    if record.meta.finished {
        return Err(EngineError::GameFinished);
    }
    if record.meta.started {
        return Err(EngineError::GameAlreadyStarted);
    }
    if record.players.values().any(|p| !p.hand.is_empty()) {
        return Err(EngineError::HandsAlreadyDealt);
    }
    for uid in order {
        if !record.players.contains_key(uid) {
            return Err(EngineError::UnknownPlayer { uid: uid.clone() });
        }
    }
    let needed = order.len() * HAND_SIZE;
    if record.deck.len() < needed {
        return Err(EngineError::DeckTooShort {
            needed,
            available: record.deck.len(),
        });
    }

    let mut ops = Vec::with_capacity(order.len() + 1);
    let mut next = 0usize;
    for uid in order {
        let hand: Vec<HandCard> = record.deck[next..next + HAND_SIZE]
            .iter()
            .map(|&card| HandCard { card, seen: false })
            .collect();
        next += HAND_SIZE;
        ops.push(GameDelta::SetHand {
            uid: uid.clone(),
            hand,
        });
    }
    ops.push(GameDelta::SetDeck(record.deck[next..].to_vec()));
    Applied::merge(record, Mutation::new(ops))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyramid_types::{DECK_SIZE, PYRAMID_SLOTS};

    fn room() -> RoomCode {
        RoomCode::parse("ABCD").unwrap()
    }

    fn uids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("uid-{i}")).collect()
    }

    fn joined_record(n: usize) -> GameRecord {
        let mut record = create_game(&room(), 0);
        for (i, uid) in uids(n).iter().enumerate() {
            record = join_game(&record, uid, &format!("Player {i}"), i == 0)
                .unwrap()
                .record;
        }
        record
    }

    #[test]
    fn test_create_game_layout() {
        let record = create_game(&room(), 42);
        assert_eq!(record.deck.len(), DECK_SIZE - PYRAMID_SLOTS);
        assert_eq!(record.pyramid.len(), PYRAMID_SLOTS);
        assert_eq!(record.meta.created_at_ms, 42);
        assert!(!record.meta.started);
        record.validate_invariants().unwrap();
    }

    #[test]
    fn test_join_rejects_duplicates_and_overflow() {
        let record = joined_record(2);
        assert!(matches!(
            join_game(&record, "uid-0", "Again", false),
            Err(EngineError::AlreadyJoined { .. })
        ));

        let full = joined_record(MAX_PLAYERS);
        assert!(matches!(
            join_game(&full, "late", "Late", false),
            Err(EngineError::RoomFull { .. })
        ));
    }

    #[test]
    fn test_deal_three_players_leaves_25() {
        let record = joined_record(3);
        let applied = deal_initial_hands(&record, &uids(3)).unwrap();
        // 52 - 15 - 4*3
        assert_eq!(applied.record.deck.len(), 25);
        for player in applied.record.players.values() {
            assert_eq!(player.hand.len(), HAND_SIZE);
            assert!(player.hand.iter().all(|c| !c.seen));
        }
        applied.record.validate_invariants().unwrap();
    }

    #[test]
    fn test_deal_twice_rejected() {
        let record = joined_record(2);
        let dealt = deal_initial_hands(&record, &uids(2)).unwrap().record;
        assert!(matches!(
            deal_initial_hands(&dealt, &uids(2)),
            Err(EngineError::HandsAlreadyDealt)
        ));
    }

    #[test]
    fn test_join_after_deal_rejected() {
        let record = joined_record(2);
        let dealt = deal_initial_hands(&record, &uids(2)).unwrap().record;
        assert!(matches!(
            join_game(&dealt, "late", "Late", false),
            Err(EngineError::HandsAlreadyDealt)
        ));
    }
}
