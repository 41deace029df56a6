use std::collections::BTreeMap;

use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, ReadRangeExt, Write};
use thiserror::Error as ThisError;

use super::{
    read_string, string_encode_size, write_string, RoomCode, Transaction, TxId, DECK_SIZE,
    HAND_SIZE, MAX_NAME_LENGTH, MAX_PLAYERS, MAX_UID_LENGTH, PYRAMID_SLOTS,
};

/// Invariant violations detectable on a single record snapshot.
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum RecordError {
    #[error("card id out of range (card={card})")]
    BadCard { card: u8 },
    #[error("card appears more than once across deck/pyramid/hands/discards (card={card})")]
    DuplicateCard { card: u8 },
    #[error("deck/pyramid/hands/discards cover {got} cards, expected {expected}")]
    CardCountMismatch { got: usize, expected: usize },
    #[error("pyramid has {len} slots, expected {expected}")]
    PyramidShape { len: usize, expected: usize },
    #[error("hand of {uid} has {len} cards (max {max})")]
    HandTooLarge { uid: String, len: usize, max: usize },
    #[error("player name too long (len={len}, max={max})")]
    NameTooLong { len: usize, max: usize },
    #[error("player uid too long (len={len}, max={max})")]
    UidTooLong { len: usize, max: usize },
    #[error("too many players (got={got}, max={max})")]
    TooManyPlayers { got: usize, max: usize },
    #[error("round numbers not contiguous from 1 (expected {expected}, got {got})")]
    RoundNumberGap { expected: u8, got: u8 },
    #[error("round {number} out of range 1..={max}")]
    RoundOutOfRange { number: u8, max: u8 },
    #[error("open round {number} does not match the round table")]
    CurrentRoundMismatch { number: u8 },
    #[error("{shown} pyramid slots shown but {rounds} rounds recorded")]
    ShownRoundMismatch { shown: usize, rounds: usize },
}

/// Game-level flags and bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct GameMeta {
    pub started: bool,
    pub finished: bool,
    pub created_at_ms: u64,
}

impl Write for GameMeta {
    fn write(&self, writer: &mut impl BufMut) {
        self.started.write(writer);
        self.finished.write(writer);
        self.created_at_ms.write(writer);
    }
}

impl Read for GameMeta {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            started: bool::read(reader)?,
            finished: bool::read(reader)?,
            created_at_ms: u64::read(reader)?,
        })
    }
}

impl EncodeSize for GameMeta {
    fn encode_size(&self) -> usize {
        self.started.encode_size()
            + self.finished.encode_size()
            + self.created_at_ms.encode_size()
    }
}

/// One pyramid position: a card fixed at setup plus its reveal flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PyramidSlot {
    pub card: u8,
    pub shown: bool,
}

impl Write for PyramidSlot {
    fn write(&self, writer: &mut impl BufMut) {
        self.card.write(writer);
        self.shown.write(writer);
    }
}

impl Read for PyramidSlot {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            card: u8::read(reader)?,
            shown: bool::read(reader)?,
        })
    }
}

impl EncodeSize for PyramidSlot {
    fn encode_size(&self) -> usize {
        self.card.encode_size() + self.shown.encode_size()
    }
}

/// One private hand card; `seen` tracks whether the owner has viewed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandCard {
    pub card: u8,
    pub seen: bool,
}

impl Write for HandCard {
    fn write(&self, writer: &mut impl BufMut) {
        self.card.write(writer);
        self.seen.write(writer);
    }
}

impl Read for HandCard {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            card: u8::read(reader)?,
            seen: bool::read(reader)?,
        })
    }
}

impl EncodeSize for HandCard {
    fn encode_size(&self) -> usize {
        self.card.encode_size() + self.seen.encode_size()
    }
}

/// Per-player state inside a room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerRecord {
    pub uid: String,
    pub name: String,
    pub admin: bool,
    pub hand: Vec<HandCard>,
    pub drinks: u32,
}

impl PlayerRecord {
    pub fn new(uid: String, name: String, admin: bool) -> Self {
        Self {
            uid,
            name,
            admin,
            hand: Vec::new(),
            drinks: 0,
        }
    }

    pub fn validate_invariants(&self) -> Result<(), RecordError> {
        if self.uid.len() > MAX_UID_LENGTH {
            return Err(RecordError::UidTooLong {
                len: self.uid.len(),
                max: MAX_UID_LENGTH,
            });
        }
        if self.name.len() > MAX_NAME_LENGTH {
            return Err(RecordError::NameTooLong {
                len: self.name.len(),
                max: MAX_NAME_LENGTH,
            });
        }
        if self.hand.len() > HAND_SIZE {
            return Err(RecordError::HandTooLarge {
                uid: self.uid.clone(),
                len: self.hand.len(),
                max: HAND_SIZE,
            });
        }
        Ok(())
    }
}

impl Write for PlayerRecord {
    fn write(&self, writer: &mut impl BufMut) {
        write_string(&self.uid, writer);
        write_string(&self.name, writer);
        self.admin.write(writer);
        self.hand.write(writer);
        self.drinks.write(writer);
    }
}

impl Read for PlayerRecord {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            uid: read_string(reader, MAX_UID_LENGTH)?,
            name: read_string(reader, MAX_NAME_LENGTH)?,
            admin: bool::read(reader)?,
            hand: Vec::<HandCard>::read_range(reader, 0..=HAND_SIZE)?,
            drinks: u32::read(reader)?,
        })
    }
}

impl EncodeSize for PlayerRecord {
    fn encode_size(&self) -> usize {
        string_encode_size(&self.uid)
            + string_encode_size(&self.name)
            + self.admin.encode_size()
            + self.hand.encode_size()
            + self.drinks.encode_size()
    }
}

/// The round currently open for calls, present only between a reveal and the
/// round's close.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CurrentRound {
    pub number: u8,
    pub row: u8,
    pub card: u8,
}

impl Write for CurrentRound {
    fn write(&self, writer: &mut impl BufMut) {
        self.number.write(writer);
        self.row.write(writer);
        self.card.write(writer);
    }
}

impl Read for CurrentRound {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            number: u8::read(reader)?,
            row: u8::read(reader)?,
            card: u8::read(reader)?,
        })
    }
}

impl EncodeSize for CurrentRound {
    fn encode_size(&self) -> usize {
        self.number.encode_size() + self.row.encode_size() + self.card.encode_size()
    }
}

/// Historical record of one reveal and the transactions it produced.
///
/// Transactions are keyed by their generated id so concurrent writers can
/// upsert independent entries without clobbering each other.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundRecord {
    pub number: u8,
    pub row: u8,
    pub card: u8,
    pub transactions: BTreeMap<TxId, Transaction>,
}

impl RoundRecord {
    pub fn new(number: u8, row: u8, card: u8) -> Self {
        Self {
            number,
            row,
            card,
            transactions: BTreeMap::new(),
        }
    }
}

impl Write for RoundRecord {
    fn write(&self, writer: &mut impl BufMut) {
        self.number.write(writer);
        self.row.write(writer);
        self.card.write(writer);
        (self.transactions.len() as u32).write(writer);
        for tx in self.transactions.values() {
            tx.write(writer);
        }
    }
}

impl Read for RoundRecord {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let number = u8::read(reader)?;
        let row = u8::read(reader)?;
        let card = u8::read(reader)?;
        let tx_len = u32::read(reader)? as usize;
        if tx_len > MAX_PLAYERS * MAX_PLAYERS {
            return Err(Error::Invalid("RoundRecord", "too many transactions"));
        }
        let mut transactions = BTreeMap::new();
        for _ in 0..tx_len {
            let tx = Transaction::read(reader)?;
            transactions.insert(tx.id, tx);
        }
        Ok(Self {
            number,
            row,
            card,
            transactions,
        })
    }
}

impl EncodeSize for RoundRecord {
    fn encode_size(&self) -> usize {
        self.number.encode_size()
            + self.row.encode_size()
            + self.card.encode_size()
            + 4
            + self
                .transactions
                .values()
                .map(|tx| tx.encode_size())
                .sum::<usize>()
    }
}

/// The shared document one room converges on.
///
/// A single record is the only shared mutable resource: the host and every
/// player read it, derive local state from it, and write partial mutations
/// back through the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameRecord {
    pub room: RoomCode,
    pub meta: GameMeta,
    /// Cards not yet dealt, in draw order.
    pub deck: Vec<u8>,
    /// Fixed 15-slot layout, rows of 5+4+3+2+1 bottom-up.
    pub pyramid: Vec<PyramidSlot>,
    /// Cards revealed during challenges and permanently out of play.
    pub discards: Vec<u8>,
    pub players: BTreeMap<String, PlayerRecord>,
    pub current_round: Option<CurrentRound>,
    pub rounds: BTreeMap<u8, RoundRecord>,
    /// Total drinks per uid, computed once at game end.
    pub summary: BTreeMap<String, u32>,
}

/// Pyramid row (1-5) for a slot index, bottom row first.
///
/// Slots 0-4 sit on row 1, 5-8 on row 2, 9-11 on row 3, 12-13 on row 4 and
/// slot 14 is the top of the pyramid on row 5. The row number is the drink
/// value of the round that reveals the slot.
pub fn row_for_slot(index: usize) -> u8 {
    match index {
        0..=4 => 1,
        5..=8 => 2,
        9..=11 => 3,
        12..=13 => 4,
        _ => 5,
    }
}

impl GameRecord {
    /// Build the initial record from a full shuffled deck: the first
    /// [`PYRAMID_SLOTS`] cards become the face-down pyramid, the remainder
    /// stays in the deck.
    pub fn new(room: RoomCode, shuffled: Vec<u8>, created_at_ms: u64) -> Self {
        debug_assert_eq!(shuffled.len(), DECK_SIZE);
        let pyramid = shuffled[..PYRAMID_SLOTS]
            .iter()
            .map(|&card| PyramidSlot { card, shown: false })
            .collect();
        let deck = shuffled[PYRAMID_SLOTS..].to_vec();
        Self {
            room,
            meta: GameMeta {
                started: false,
                finished: false,
                created_at_ms,
            },
            deck,
            pyramid,
            discards: Vec::new(),
            players: BTreeMap::new(),
            current_round: None,
            rounds: BTreeMap::new(),
            summary: BTreeMap::new(),
        }
    }

    pub fn player(&self, uid: &str) -> Option<&PlayerRecord> {
        self.players.get(uid)
    }

    /// Number of pyramid slots already revealed.
    pub fn shown_count(&self) -> usize {
        self.pyramid.iter().filter(|slot| slot.shown).count()
    }

    /// Index of the next slot to reveal, if any remain.
    pub fn next_unshown_slot(&self) -> Option<usize> {
        self.pyramid.iter().position(|slot| !slot.shown)
    }

    /// The round record backing `current_round`, if a round is open.
    pub fn open_round(&self) -> Option<&RoundRecord> {
        let current = self.current_round.as_ref()?;
        self.rounds.get(&current.number)
    }

    /// Find a transaction by id in any round, newest rounds first.
    pub fn find_transaction(&self, id: TxId) -> Option<(&RoundRecord, &Transaction)> {
        self.rounds
            .values()
            .rev()
            .find_map(|round| round.transactions.get(&id).map(|tx| (round, tx)))
    }

    /// Check every per-snapshot invariant of the shared record.
    ///
    /// The gateway runs this after each merge and refuses to commit a
    /// mutation that would corrupt the room.
    pub fn validate_invariants(&self) -> Result<(), RecordError> {
        if self.pyramid.len() != PYRAMID_SLOTS {
            return Err(RecordError::PyramidShape {
                len: self.pyramid.len(),
                expected: PYRAMID_SLOTS,
            });
        }
        if self.players.len() > MAX_PLAYERS {
            return Err(RecordError::TooManyPlayers {
                got: self.players.len(),
                max: MAX_PLAYERS,
            });
        }

        // Every card id must appear exactly once across deck, pyramid, hands
        // and discards.
        let mut present = [false; DECK_SIZE];
        let mut total = 0usize;
        let mut claim = |card: u8| -> Result<(), RecordError> {
            if card as usize >= DECK_SIZE {
                return Err(RecordError::BadCard { card });
            }
            if present[card as usize] {
                return Err(RecordError::DuplicateCard { card });
            }
            present[card as usize] = true;
            total += 1;
            Ok(())
        };
        for &card in &self.deck {
            claim(card)?;
        }
        for slot in &self.pyramid {
            claim(slot.card)?;
        }
        for &card in &self.discards {
            claim(card)?;
        }
        for player in self.players.values() {
            player.validate_invariants()?;
            for hand_card in &player.hand {
                claim(hand_card.card)?;
            }
        }
        if total != DECK_SIZE {
            return Err(RecordError::CardCountMismatch {
                got: total,
                expected: DECK_SIZE,
            });
        }

        // Round numbers are contiguous from 1 and bounded by the pyramid.
        let mut expected = 1u8;
        for &number in self.rounds.keys() {
            if number != expected {
                return Err(RecordError::RoundNumberGap {
                    expected,
                    got: number,
                });
            }
            if number as usize > PYRAMID_SLOTS {
                return Err(RecordError::RoundOutOfRange {
                    number,
                    max: PYRAMID_SLOTS as u8,
                });
            }
            expected += 1;
        }

        // One round per shown slot.
        let shown = self.shown_count();
        if shown != self.rounds.len() {
            return Err(RecordError::ShownRoundMismatch {
                shown,
                rounds: self.rounds.len(),
            });
        }

        // An open round must be the latest recorded round.
        if let Some(current) = &self.current_round {
            let matches = self
                .rounds
                .get(&current.number)
                .is_some_and(|round| round.row == current.row && round.card == current.card);
            let is_latest = self
                .rounds
                .keys()
                .next_back()
                .is_some_and(|&last| last == current.number);
            if !matches || !is_latest {
                return Err(RecordError::CurrentRoundMismatch {
                    number: current.number,
                });
            }
        }

        Ok(())
    }
}

impl Write for GameRecord {
    fn write(&self, writer: &mut impl BufMut) {
        self.room.write(writer);
        self.meta.write(writer);
        self.deck.write(writer);
        self.pyramid.write(writer);
        self.discards.write(writer);
        (self.players.len() as u32).write(writer);
        for player in self.players.values() {
            player.write(writer);
        }
        self.current_round.write(writer);
        (self.rounds.len() as u32).write(writer);
        for round in self.rounds.values() {
            round.write(writer);
        }
        (self.summary.len() as u32).write(writer);
        for (uid, drinks) in &self.summary {
            write_string(uid, writer);
            drinks.write(writer);
        }
    }
}

impl Read for GameRecord {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let room = RoomCode::read(reader)?;
        let meta = GameMeta::read(reader)?;
        let deck = Vec::<u8>::read_range(reader, 0..=DECK_SIZE)?;
        let pyramid = Vec::<PyramidSlot>::read_range(reader, PYRAMID_SLOTS..=PYRAMID_SLOTS)?;
        let discards = Vec::<u8>::read_range(reader, 0..=DECK_SIZE)?;
        let player_len = u32::read(reader)? as usize;
        if player_len > MAX_PLAYERS {
            return Err(Error::Invalid("GameRecord", "too many players"));
        }
        let mut players = BTreeMap::new();
        for _ in 0..player_len {
            let player = PlayerRecord::read(reader)?;
            players.insert(player.uid.clone(), player);
        }
        let current_round = Option::<CurrentRound>::read(reader)?;
        let round_len = u32::read(reader)? as usize;
        if round_len > PYRAMID_SLOTS {
            return Err(Error::Invalid("GameRecord", "too many rounds"));
        }
        let mut rounds = BTreeMap::new();
        for _ in 0..round_len {
            let round = RoundRecord::read(reader)?;
            rounds.insert(round.number, round);
        }
        let summary_len = u32::read(reader)? as usize;
        if summary_len > MAX_PLAYERS {
            return Err(Error::Invalid("GameRecord", "summary too large"));
        }
        let mut summary = BTreeMap::new();
        for _ in 0..summary_len {
            let uid = read_string(reader, MAX_UID_LENGTH)?;
            let drinks = u32::read(reader)?;
            summary.insert(uid, drinks);
        }
        Ok(Self {
            room,
            meta,
            deck,
            pyramid,
            discards,
            players,
            current_round,
            rounds,
            summary,
        })
    }
}

impl EncodeSize for GameRecord {
    fn encode_size(&self) -> usize {
        self.room.encode_size()
            + self.meta.encode_size()
            + self.deck.encode_size()
            + self.pyramid.encode_size()
            + self.discards.encode_size()
            + 4
            + self
                .players
                .values()
                .map(|player| player.encode_size())
                .sum::<usize>()
            + self.current_round.encode_size()
            + 4
            + self
                .rounds
                .values()
                .map(|round| round.encode_size())
                .sum::<usize>()
            + 4
            + self
                .summary
                .iter()
                .map(|(uid, drinks)| string_encode_size(uid) + drinks.encode_size())
                .sum::<usize>()
    }
}
