use std::collections::BTreeSet;
use std::fmt;

use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use thiserror::Error as ThisError;

pub mod delta;
pub mod record;


/// Helper to write a string as length-prefixed UTF-8 bytes.
pub(crate) fn write_string(s: &str, writer: &mut impl BufMut) {
    let bytes = s.as_bytes();
    (bytes.len() as u32).write(writer);
    writer.put_slice(bytes);
}

/// Helper to read a string from length-prefixed UTF-8 bytes.
pub(crate) fn read_string(reader: &mut impl Buf, max_len: usize) -> Result<String, Error> {
    let len = u32::read(reader)? as usize;
    if len > max_len {
        return Err(Error::Invalid("String", "too long"));
    }
    if reader.remaining() < len {
        return Err(Error::EndOfBuffer);
    }
    let mut bytes = vec![0u8; len];
    reader.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|_| Error::Invalid("String", "invalid UTF-8"))
}

/// Helper to get encode size of a string.
pub(crate) fn string_encode_size(s: &str) -> usize {
    4 + s.len()
}

/// Cards in a standard deck.
pub const DECK_SIZE: usize = 52;

/// Slots in the pyramid layout (rows of 5+4+3+2+1).
pub const PYRAMID_SLOTS: usize = 15;

/// Rows in the pyramid layout.
pub const PYRAMID_ROWS: u8 = 5;

/// Cards dealt to each player at setup.
pub const HAND_SIZE: usize = 4;

/// Maximum players per room (bounded by the 37 cards left after the pyramid).
pub const MAX_PLAYERS: usize = 9;

/// Maximum display-name length for players.
pub const MAX_NAME_LENGTH: usize = 32;

/// Maximum length for player uids (opaque external identities).
pub const MAX_UID_LENGTH: usize = 64;

/// Seconds a player may view a freshly dealt replacement card.
pub const REVEAL_WINDOW_SECS: u64 = 15;

const MIN_ROOM_CODE_LEN: usize = 4;
const MAX_ROOM_CODE_LEN: usize = 6;

/// Errors produced when parsing a room code.
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum RoomCodeError {
    #[error("room code length out of range (len={len}, expected {min}..={max})")]
    BadLength { len: usize, min: usize, max: usize },
    #[error("room code contains non-letter character")]
    NonLetter,
}

/// Room identifier, 4-6 ASCII letters, stored uppercase.
///
/// The code doubles as the shuffle seed: every client regenerates the same
/// deck permutation from it without transferring the mapping.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoomCode(String);

impl RoomCode {
    /// Parse a room code, normalizing to uppercase.
    pub fn parse(input: &str) -> Result<Self, RoomCodeError> {
        let len = input.len();
        if !(MIN_ROOM_CODE_LEN..=MAX_ROOM_CODE_LEN).contains(&len) {
            return Err(RoomCodeError::BadLength {
                len,
                min: MIN_ROOM_CODE_LEN,
                max: MAX_ROOM_CODE_LEN,
            });
        }
        if !input.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(RoomCodeError::NonLetter);
        }
        Ok(Self(input.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Write for RoomCode {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.0, writer);
    }
}

impl Read for RoomCode {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let raw = read_string(reader, MAX_ROOM_CODE_LEN)?;
        RoomCode::parse(&raw).map_err(|_| Error::Invalid("RoomCode", "malformed room code"))
    }
}

impl EncodeSize for RoomCode {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.0)
    }
}

/// Unique transaction identifier, generated by the calling client.
///
/// Keying transactions by a random 128-bit id (instead of a list index) is
/// what lets two clients append to the same round concurrently without either
/// write erasing the other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId(pub u128);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl Write for TxId {
    fn write(&self, writer: &mut impl BufMut) {
        writer.put_slice(&self.0.to_be_bytes());
    }
}

impl Read for TxId {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        if reader.remaining() < 16 {
            return Err(Error::EndOfBuffer);
        }
        let mut bytes = [0u8; 16];
        reader.copy_to_slice(&mut bytes);
        Ok(Self(u128::from_be_bytes(bytes)))
    }
}

impl FixedSize for TxId {
    const SIZE: usize = 16;
}

/// Lifecycle of a drink assignment.
///
/// Legal transitions: `Waiting -> {Accepted | Bullshit}` and
/// `Bullshit -> {BullshitCorrect | BullshitWrong}`. Everything else is
/// terminal; a status never regresses.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionStatus {
    Waiting = 0,
    Accepted = 1,
    Bullshit = 2,
    BullshitCorrect = 3,
    BullshitWrong = 4,
}

impl TransactionStatus {
    /// Whether the transaction still requires action from either party.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Waiting | Self::Bullshit)
    }

    /// Whether the status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        !self.is_unresolved()
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Waiting, Self::Accepted)
                | (Self::Waiting, Self::Bullshit)
                | (Self::Bullshit, Self::BullshitCorrect)
                | (Self::Bullshit, Self::BullshitWrong)
        )
    }
}

impl TryFrom<u8> for TransactionStatus {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Waiting),
            1 => Ok(Self::Accepted),
            2 => Ok(Self::Bullshit),
            3 => Ok(Self::BullshitCorrect),
            4 => Ok(Self::BullshitWrong),
            _ => Err(()),
        }
    }
}

impl Write for TransactionStatus {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for TransactionStatus {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let value = u8::read(reader)?;
        TransactionStatus::try_from(value).map_err(|_| Error::InvalidEnum(value))
    }
}

impl EncodeSize for TransactionStatus {
    fn encode_size(&self) -> usize {
        u8::SIZE
    }
}

/// A drink assignment negotiated between two players through the shared
/// record, with no direct messaging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub id: TxId,
    pub from: String,
    pub to: String,
    pub status: TransactionStatus,
    /// Uids that have displayed this transaction at least once.
    pub seen_by: BTreeSet<String>,
}

impl Transaction {
    /// A fresh call from `from` against `to`, already seen by its creator.
    pub fn call(id: TxId, from: String, to: String) -> Self {
        let mut seen_by = BTreeSet::new();
        seen_by.insert(from.clone());
        Self {
            id,
            from,
            to,
            status: TransactionStatus::Waiting,
            seen_by,
        }
    }

    /// Whether `uid` is a party to this transaction.
    pub fn involves(&self, uid: &str) -> bool {
        self.from == uid || self.to == uid
    }
}

impl Write for Transaction {
    fn write(&self, writer: &mut impl BufMut) {
        self.id.write(writer);
        write_string(&self.from, writer);
        write_string(&self.to, writer);
        self.status.write(writer);
        (self.seen_by.len() as u32).write(writer);
        for uid in &self.seen_by {
            write_string(uid, writer);
        }
    }
}

impl Read for Transaction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let id = TxId::read(reader)?;
        let from = read_string(reader, MAX_UID_LENGTH)?;
        let to = read_string(reader, MAX_UID_LENGTH)?;
        let status = TransactionStatus::read(reader)?;
        let seen_len = u32::read(reader)? as usize;
        if seen_len > MAX_PLAYERS {
            return Err(Error::Invalid("Transaction", "seen_by too large"));
        }
        let mut seen_by = BTreeSet::new();
        for _ in 0..seen_len {
            seen_by.insert(read_string(reader, MAX_UID_LENGTH)?);
        }
        Ok(Self {
            id,
            from,
            to,
            status,
            seen_by,
        })
    }
}

impl EncodeSize for Transaction {
    fn encode_size(&self) -> usize {
        self.id.encode_size()
            + string_encode_size(&self.from)
            + string_encode_size(&self.to)
            + self.status.encode_size()
            + 4
            + self
                .seen_by
                .iter()
                .map(|uid| string_encode_size(uid))
                .sum::<usize>()
    }
}
