//! Partial mutations and the field-path merge contract.
//!
//! A [`Mutation`] carries only the paths its writer touched. Scalar and
//! nested-object paths merge by replacement; the `deck`, `pyramid`, `hand`,
//! `discards` and `summary` lists merge by whole-list replacement (the
//! writer submits the full list it computed). Transactions are the
//! exception: they are upserted one-at-a-time under their generated id, so
//! two clients appending to the same round can never erase each other's
//! entry. Status overwrites must follow the legal transition graph; a merge
//! that would regress a status is rejected rather than applied.

use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, ReadRangeExt, Write};
use thiserror::Error as ThisError;

use super::record::{
    CurrentRound, GameMeta, GameRecord, HandCard, PlayerRecord, PyramidSlot, RoundRecord,
};
use super::{
    read_string, string_encode_size, write_string, Transaction, TransactionStatus, TxId,
    DECK_SIZE, HAND_SIZE, MAX_PLAYERS, MAX_UID_LENGTH, PYRAMID_SLOTS,
};

/// Upper bound on ops per mutation; every engine operation emits far fewer.
const MAX_MUTATION_OPS: usize = 16;

/// Rejections raised while merging a mutation into a record.
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum MergeError {
    #[error("mutation touches unknown player {uid}")]
    UnknownPlayer { uid: String },
    #[error("mutation touches unknown round {round}")]
    UnknownRound { round: u8 },
    #[error("mutation touches unknown transaction {id}")]
    UnknownTransaction { id: TxId },
    #[error("transaction {id} cannot move from {from:?} to {to:?}")]
    StatusRegression {
        id: TxId,
        from: TransactionStatus,
        to: TransactionStatus,
    },
}

/// One touched field path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GameDelta {
    /// Replace the meta block.
    SetMeta(GameMeta),
    /// Replace the undealt deck.
    SetDeck(Vec<u8>),
    /// Replace the pyramid layout.
    SetPyramid(Vec<PyramidSlot>),
    /// Replace the out-of-play card list.
    SetDiscards(Vec<u8>),
    /// Insert or replace one player record.
    UpsertPlayer(PlayerRecord),
    /// Replace one player's hand.
    SetHand { uid: String, hand: Vec<HandCard> },
    /// Replace one player's drink total.
    SetDrinks { uid: String, drinks: u32 },
    /// Set or clear the open round marker.
    SetCurrentRound(Option<CurrentRound>),
    /// Create a round entry (or refresh its header) without touching its
    /// transactions.
    UpsertRound { number: u8, row: u8, card: u8 },
    /// Insert or advance a single transaction inside a round.
    PutTransaction { round: u8, tx: Transaction },
    /// Record that `uid` has displayed transaction `id`.
    MarkSeen { round: u8, id: TxId, uid: String },
    /// Replace the end-of-game drink totals.
    SetSummary(Vec<(String, u32)>),
}

/// An ordered batch of field-path writes applied atomically by the store.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Mutation {
    pub ops: Vec<GameDelta>,
}

impl Mutation {
    pub fn new(ops: Vec<GameDelta>) -> Self {
        Self { ops }
    }

    pub fn single(op: GameDelta) -> Self {
        Self { ops: vec![op] }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Merge this mutation into `record`, in op order.
    ///
    /// Application is all-or-nothing only at the store layer (the gateway
    /// merges into a scratch clone and commits on success); callers merging
    /// directly must treat an error as leaving `record` partially updated.
    pub fn apply(&self, record: &mut GameRecord) -> Result<(), MergeError> {
        for op in &self.ops {
            apply_op(record, op)?;
        }
        Ok(())
    }
}

fn apply_op(record: &mut GameRecord, op: &GameDelta) -> Result<(), MergeError> {
    match op {
        GameDelta::SetMeta(meta) => {
            record.meta = meta.clone();
        }
        GameDelta::SetDeck(deck) => {
            record.deck = deck.clone();
        }
        GameDelta::SetPyramid(pyramid) => {
            record.pyramid = pyramid.clone();
        }
        GameDelta::SetDiscards(discards) => {
            record.discards = discards.clone();
        }
        GameDelta::UpsertPlayer(player) => {
            record.players.insert(player.uid.clone(), player.clone());
        }
        GameDelta::SetHand { uid, hand } => {
            let player = record
                .players
                .get_mut(uid)
                .ok_or_else(|| MergeError::UnknownPlayer { uid: uid.clone() })?;
            player.hand = hand.clone();
        }
        GameDelta::SetDrinks { uid, drinks } => {
            let player = record
                .players
                .get_mut(uid)
                .ok_or_else(|| MergeError::UnknownPlayer { uid: uid.clone() })?;
            player.drinks = *drinks;
        }
        GameDelta::SetCurrentRound(current) => {
            record.current_round = *current;
        }
        GameDelta::UpsertRound { number, row, card } => {
            let entry = record
                .rounds
                .entry(*number)
                .or_insert_with(|| RoundRecord::new(*number, *row, *card));
            entry.row = *row;
            entry.card = *card;
        }
        GameDelta::PutTransaction { round, tx } => {
            let round_record = record
                .rounds
                .get_mut(round)
                .ok_or(MergeError::UnknownRound { round: *round })?;
            match round_record.transactions.get_mut(&tx.id) {
                Some(existing) => {
                    // Redelivering the same status is idempotent; anything
                    // else must follow the transition graph.
                    if existing.status != tx.status
                        && !existing.status.can_transition_to(tx.status)
                    {
                        return Err(MergeError::StatusRegression {
                            id: tx.id,
                            from: existing.status,
                            to: tx.status,
                        });
                    }
                    let mut merged = tx.clone();
                    // Acknowledgements survive concurrent status writes.
                    merged.seen_by.extend(existing.seen_by.iter().cloned());
                    *existing = merged;
                }
                None => {
                    round_record.transactions.insert(tx.id, tx.clone());
                }
            }
        }
        GameDelta::MarkSeen { round, id, uid } => {
            let round_record = record
                .rounds
                .get_mut(round)
                .ok_or(MergeError::UnknownRound { round: *round })?;
            let tx = round_record
                .transactions
                .get_mut(id)
                .ok_or(MergeError::UnknownTransaction { id: *id })?;
            tx.seen_by.insert(uid.clone());
        }
        GameDelta::SetSummary(entries) => {
            record.summary = entries.iter().cloned().collect();
        }
    }
    Ok(())
}

impl Write for GameDelta {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            GameDelta::SetMeta(meta) => {
                0u8.write(writer);
                meta.write(writer);
            }
            GameDelta::SetDeck(deck) => {
                1u8.write(writer);
                deck.write(writer);
            }
            GameDelta::SetPyramid(pyramid) => {
                2u8.write(writer);
                pyramid.write(writer);
            }
            GameDelta::SetDiscards(discards) => {
                3u8.write(writer);
                discards.write(writer);
            }
            GameDelta::UpsertPlayer(player) => {
                4u8.write(writer);
                player.write(writer);
            }
            GameDelta::SetHand { uid, hand } => {
                5u8.write(writer);
                write_string(uid, writer);
                hand.write(writer);
            }
            GameDelta::SetDrinks { uid, drinks } => {
                6u8.write(writer);
                write_string(uid, writer);
                drinks.write(writer);
            }
            GameDelta::SetCurrentRound(current) => {
                7u8.write(writer);
                current.write(writer);
            }
            GameDelta::UpsertRound { number, row, card } => {
                8u8.write(writer);
                number.write(writer);
                row.write(writer);
                card.write(writer);
            }
            GameDelta::PutTransaction { round, tx } => {
                9u8.write(writer);
                round.write(writer);
                tx.write(writer);
            }
            GameDelta::MarkSeen { round, id, uid } => {
                10u8.write(writer);
                round.write(writer);
                id.write(writer);
                write_string(uid, writer);
            }
            GameDelta::SetSummary(entries) => {
                11u8.write(writer);
                (entries.len() as u32).write(writer);
                for (uid, drinks) in entries {
                    write_string(uid, writer);
                    drinks.write(writer);
                }
            }
        }
    }
}

impl Read for GameDelta {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let tag = u8::read(reader)?;
        match tag {
            0 => Ok(GameDelta::SetMeta(GameMeta::read(reader)?)),
            1 => Ok(GameDelta::SetDeck(Vec::<u8>::read_range(
                reader,
                0..=DECK_SIZE,
            )?)),
            2 => Ok(GameDelta::SetPyramid(Vec::<PyramidSlot>::read_range(
                reader,
                PYRAMID_SLOTS..=PYRAMID_SLOTS,
            )?)),
            3 => Ok(GameDelta::SetDiscards(Vec::<u8>::read_range(
                reader,
                0..=DECK_SIZE,
            )?)),
            4 => Ok(GameDelta::UpsertPlayer(PlayerRecord::read(reader)?)),
            5 => Ok(GameDelta::SetHand {
                uid: read_string(reader, MAX_UID_LENGTH)?,
                hand: Vec::<HandCard>::read_range(reader, 0..=HAND_SIZE)?,
            }),
            6 => Ok(GameDelta::SetDrinks {
                uid: read_string(reader, MAX_UID_LENGTH)?,
                drinks: u32::read(reader)?,
            }),
            7 => Ok(GameDelta::SetCurrentRound(Option::<CurrentRound>::read(
                reader,
            )?)),
            8 => Ok(GameDelta::UpsertRound {
                number: u8::read(reader)?,
                row: u8::read(reader)?,
                card: u8::read(reader)?,
            }),
            9 => Ok(GameDelta::PutTransaction {
                round: u8::read(reader)?,
                tx: Transaction::read(reader)?,
            }),
            10 => Ok(GameDelta::MarkSeen {
                round: u8::read(reader)?,
                id: TxId::read(reader)?,
                uid: read_string(reader, MAX_UID_LENGTH)?,
            }),
            11 => {
                let len = u32::read(reader)? as usize;
                if len > MAX_PLAYERS {
                    return Err(Error::Invalid("GameDelta", "summary too large"));
                }
                let mut entries = Vec::with_capacity(len);
                for _ in 0..len {
                    let uid = read_string(reader, MAX_UID_LENGTH)?;
                    let drinks = u32::read(reader)?;
                    entries.push((uid, drinks));
                }
                Ok(GameDelta::SetSummary(entries))
            }
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl EncodeSize for GameDelta {
    fn encode_size(&self) -> usize {
        1 + match self {
            GameDelta::SetMeta(meta) => meta.encode_size(),
            GameDelta::SetDeck(deck) => deck.encode_size(),
            GameDelta::SetPyramid(pyramid) => pyramid.encode_size(),
            GameDelta::SetDiscards(discards) => discards.encode_size(),
            GameDelta::UpsertPlayer(player) => player.encode_size(),
            GameDelta::SetHand { uid, hand } => string_encode_size(uid) + hand.encode_size(),
            GameDelta::SetDrinks { uid, drinks } => {
                string_encode_size(uid) + drinks.encode_size()
            }
            GameDelta::SetCurrentRound(current) => current.encode_size(),
            GameDelta::UpsertRound { number, row, card } => {
                number.encode_size() + row.encode_size() + card.encode_size()
            }
            GameDelta::PutTransaction { round, tx } => round.encode_size() + tx.encode_size(),
            GameDelta::MarkSeen { round, id, uid } => {
                round.encode_size() + id.encode_size() + string_encode_size(uid)
            }
            GameDelta::SetSummary(entries) => {
                4 + entries
                    .iter()
                    .map(|(uid, drinks)| string_encode_size(uid) + drinks.encode_size())
                    .sum::<usize>()
            }
        }
    }
}

impl Write for Mutation {
    fn write(&self, writer: &mut impl BufMut) {
        (self.ops.len() as u32).write(writer);
        for op in &self.ops {
            op.write(writer);
        }
    }
}

impl Read for Mutation {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let len = u32::read(reader)? as usize;
        if len > MAX_MUTATION_OPS {
            return Err(Error::Invalid("Mutation", "too many ops"));
        }
        let mut ops = Vec::with_capacity(len);
        for _ in 0..len {
            ops.push(GameDelta::read(reader)?);
        }
        Ok(Self { ops })
    }
}

impl EncodeSize for Mutation {
    fn encode_size(&self) -> usize {
        4 + self.ops.iter().map(|op| op.encode_size()).sum::<usize>()
    }
}
