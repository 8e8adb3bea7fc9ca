//! Shared wire/value types: fixed-size buffers, block info, and the error
//! type used when parsing them.

mod block;
mod buf;
mod provider;
mod randomness;

pub use block::{BlockInfo, ChainId};
pub use buf::{Buf32, Buf64};
pub use provider::{ProofOfPossession, ProviderRecord, ProviderStatus};
pub use randomness::RandomnessCommitment;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrimitiveError {
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex: {0}")]
    InvalidHex(String),
}
