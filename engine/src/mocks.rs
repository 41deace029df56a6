//! Test fixtures shared by engine, gateway and client tests.
//!
//! Fixtures use an unshuffled identity deck (card id == position) so tests
//! can reason about ranks without re-deriving the seeded permutation:
//! pyramid slots hold cards 0-14 and hands are dealt from card 15 upward.

use pyramid_types::{CurrentRound, GameRecord, RoomCode, DECK_SIZE};

use crate::round::{reveal_next_card, start_game, RevealOutcome};
use crate::setup::{deal_initial_hands, join_game};

/// Uid of the admin player created by every fixture.
pub const HOST: &str = "uid-0";

pub fn room_code() -> RoomCode {
    RoomCode::parse("ABCD").expect("static room code is valid")
}

pub fn player_uids(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("uid-{i}")).collect()
}

/// A fresh record over the identity deck, before any players join.
pub fn fresh_record() -> GameRecord {
    GameRecord::new(room_code(), (0..DECK_SIZE as u8).collect(), 0)
}

/// A record with `count` players joined and hands dealt.
pub fn dealt_record(count: usize) -> GameRecord {
    let mut record = fresh_record();
    for (i, uid) in player_uids(count).iter().enumerate() {
        record = join_game(&record, uid, &format!("Player {i}"), i == 0)
            .expect("fixture join is valid")
            .record;
    }
    deal_initial_hands(&record, &player_uids(count))
        .expect("fixture deal is valid")
        .record
}

/// A dealt record with the game started.
pub fn started_record(count: usize) -> GameRecord {
    start_game(&dealt_record(count), HOST)
        .expect("fixture start is valid")
        .record
}

/// A started record with round 1 open (slot 0, card 0, row 1).
pub fn record_in_round(count: usize) -> (GameRecord, CurrentRound) {
    match reveal_next_card(&started_record(count), HOST).expect("fixture reveal is valid") {
        RevealOutcome::Opened { applied, round } => (applied.record, round),
        RevealOutcome::Finished { .. } => unreachable!("fresh pyramid cannot be exhausted"),
    }
}
