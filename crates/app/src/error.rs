//! The supervisor's error taxonomy, composed from the errors
//! of everything it owns: the store, the signer, the chain client, and
//! the per-provider control loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] fpd_store::StoreError),

    #[error(transparent)]
    Signer(#[from] fpd_signer::SignerError),

    #[error(transparent)]
    Chain(#[from] fpd_chain_client::ChainError),

    #[error(transparent)]
    Core(#[from] fpd_core::CoreError),

    #[error("unknown finality provider: {0}")]
    UnknownProvider(String),

    #[error("finality provider {0} is already running")]
    AlreadyRunning(String),

    #[error("finality provider {0} has been slashed")]
    Slashed(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
