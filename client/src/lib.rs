//! Pyramid client SDK.
//!
//! Host and player UI glue drives the game through the sessions in this
//! crate instead of re-deriving rules: every action re-reads the latest
//! snapshot, runs the engine against it, and submits the resulting partial
//! mutation conditionally. Superseded writes are re-fetched and retried per
//! [`RetryPolicy`] before a failure is surfaced.

pub mod events;
pub mod host;
pub mod player;
pub mod session;


pub use events::SnapshotStream;
pub use host::{HostSession, Reveal};
pub use player::{PlayerSession, Proof};
pub use session::Session;

use pyramid_engine::EngineError;
use pyramid_gateway::StoreError;
use thiserror::Error;

/// Error type for client operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("rule violation: {0}")]
    Engine(#[from] EngineError),
    #[error("write kept conflicting after {attempts} attempts")]
    RetriesExhausted { attempts: usize },
    #[error("snapshot feed closed")]
    FeedClosed,
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// How often a superseded conditional write is re-fetched and resubmitted.
///
/// The default re-reads and retries once, then surfaces the conflict.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}
