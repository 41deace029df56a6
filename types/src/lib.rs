//! Pyramid shared types.
//!
//! This crate defines the canonical shape of the shared game record, the
//! partial-mutation schema used to update it, and the binary codec for both.
//! Every other crate in the workspace reads and writes state exclusively
//! through these types.

pub mod game;

pub use game::{
    delta::{GameDelta, MergeError, Mutation},
    record::{
        row_for_slot, CurrentRound, GameMeta, GameRecord, HandCard, PlayerRecord, PyramidSlot,
        RecordError, RoundRecord,
    },
    RoomCode, RoomCodeError, Transaction, TransactionStatus, TxId, DECK_SIZE, HAND_SIZE,
    MAX_NAME_LENGTH, MAX_PLAYERS, MAX_UID_LENGTH, PYRAMID_ROWS, PYRAMID_SLOTS,
    REVEAL_WINDOW_SECS,
};
