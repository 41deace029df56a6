use pyramid_types::{MergeError, RecordError, RoomCode};
use thiserror::Error;

/// Error type for store operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("room {room} not found")]
    RoomNotFound { room: RoomCode },
    #[error("room {room} already exists")]
    RoomAlreadyExists { room: RoomCode },
    #[error("too many rooms (max {max})")]
    TooManyRooms { max: usize },
    #[error("write superseded: expected version {expected}, store at {actual}")]
    VersionConflict { expected: u64, actual: u64 },
    #[error("invalid mutation: {0}")]
    Merge(#[from] MergeError),
    #[error("mutation rejected, record would violate invariants: {0}")]
    Invariant(#[from] RecordError),
}

impl StoreError {
    /// Whether re-reading and resubmitting can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}
