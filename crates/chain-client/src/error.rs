use thiserror::Error;

/// The chain client's error taxonomy. A duplicate vote is always reported
/// as one of its two explicit sub-kinds — no code path is allowed to
/// collapse them back into one `DuplicateVote`.
#[derive(Debug, Error, Clone)]
pub enum ChainError {
    #[error("duplicate vote for the same block hash")]
    DuplicateVoteSameHash,

    #[error("duplicate vote for a different block hash at the same height")]
    DuplicateVoteDiffHash,

    #[error("randomness already committed for this start height")]
    AlreadyCommitted,

    #[error("unknown finality provider: {0}")]
    UnknownFinalityProvider(String),

    #[error("finality provider has no voting power at this height")]
    NotActive,

    #[error("transient chain error: {0}")]
    Transient(String),

    #[error("permanent chain error: {0}")]
    Permanent(String),

    #[error("cancelled")]
    Cancelled,
}

impl ChainError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
