use pyramid_types::{MergeError, RecordError, TransactionStatus, TxId};
use thiserror::Error;

/// Rejections raised by engine operations.
///
/// All variants are recoverable: the caller surfaces them to the user and no
/// state is mutated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("{uid} is not the host")]
    NotHost { uid: String },
    #[error("unknown player {uid}")]
    UnknownPlayer { uid: String },
    #[error("{uid} already joined")]
    AlreadyJoined { uid: String },
    #[error("room is full (max {max})")]
    RoomFull { max: usize },
    #[error("game already started")]
    GameAlreadyStarted,
    #[error("game not started")]
    GameNotStarted,
    #[error("game already finished")]
    GameFinished,
    #[error("hands already dealt")]
    HandsAlreadyDealt,
    #[error("hands not dealt yet")]
    HandsNotDealt,
    #[error("not enough players (got {got}, min {min})")]
    NotEnoughPlayers { got: usize, min: usize },
    #[error("deck too short (needed {needed}, available {available})")]
    DeckTooShort { needed: usize, available: usize },
    #[error("no round is open")]
    NoOpenRound,
    #[error("a round is already open")]
    RoundAlreadyOpen,
    #[error("cannot call yourself")]
    SelfCall,
    #[error("{uid} already has an unresolved transaction this round")]
    CallerBusy { uid: String },
    #[error("unknown transaction {id}")]
    UnknownTransaction { id: TxId },
    #[error("transaction {id} belongs to a closed round")]
    StaleTransaction { id: TxId },
    #[error("transaction is not yours to answer")]
    NotYourTransaction { uid: String },
    #[error("transaction is not awaiting a response (status {status:?})")]
    NotAwaitingResponse { status: TransactionStatus },
    #[error("transaction is not awaiting proof (status {status:?})")]
    NotAwaitingProof { status: TransactionStatus },
    #[error("card {card} is not in your hand")]
    CardNotInHand { card: u8 },
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Merge(#[from] MergeError),
}
