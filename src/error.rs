//! Error types for field loading, rules operations and persistence

use thiserror::Error;

use crate::sim::{ObjectId, TeamId};

/// Field configuration could not be turned into a usable geometry
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("field description could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid field geometry: {message}")]
    Invalid { message: String },
}

/// Rejections and contract violations raised by the rules layer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RulesError {
    #[error("{team:?} tried to act during the opponent's turn")]
    NotYourTurn { team: TeamId },
    #[error("object {0:?} is not a disk or goalkeeper")]
    NotAPlayablePiece(ObjectId),
    #[error("no touches left this turn")]
    NoGlobalTouches,
    #[error("disk {0:?} has no consecutive touches left")]
    DiskTouchesExhausted(ObjectId),
    #[error("turn resolution requested while pieces are still moving")]
    WorldNotStable,
    #[error("physics did not settle within {steps} steps")]
    Unsettled { steps: u32 },
    #[error("unknown object {0:?}")]
    UnknownObject(ObjectId),
    #[error("rejected rules snapshot: {reason}")]
    InvalidSnapshot { reason: String },
    #[error("both halves have already been played")]
    MatchOver,
}

/// Save envelope could not be written or read back
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("save payload is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported save version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("save digest mismatch")]
    DigestMismatch,
    #[error(transparent)]
    Rules(#[from] RulesError),
}
