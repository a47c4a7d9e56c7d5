//! Error types for the stakeduel core.
//!
//! All core operations surface errors to the caller instead of retrying
//! internally; retry/backoff belongs to the transport layer.

use thiserror::Error;

/// Failures raised by the key-value store adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupted data at {path}: {reason}")]
    Corrupted { path: String, reason: String },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}

impl StoreError {
    pub fn corrupted(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Corrupted {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failures raised by the matchmaking / settlement pipeline.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("game not found: {0}")]
    NotFound(String),

    #[error("winner {winner} is not a participant of game {game_id}")]
    InvalidWinner { game_id: String, winner: String },

    #[error("game {0} is already completed")]
    AlreadyCompleted(String),

    #[error("players must be distinct, got {0} twice")]
    IdenticalPlayers(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type CoreResult<T> = Result<T, CoreError>;
