//! The typed error taxonomy for the per-provider control loop.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] fpd_store::StoreError),

    #[error(transparent)]
    Signer(#[from] fpd_signer::SignerError),

    #[error(transparent)]
    Chain(#[from] fpd_chain_client::ChainError),

    #[error("provider {0} not found")]
    UnknownProvider(String),

    #[error("provider {0} is slashed")]
    Slashed(String),

    /// A bounded number of transient failures was exceeded, or an
    /// equivocation was reported but did not verify as ours — either way
    /// the instance surfaces the failure and pauses rather than retrying
    /// forever.
    #[error("instance paused after exhausting retries")]
    Paused,

    #[error("instance is no longer running")]
    InstanceStopped,
}

pub type Result<T> = std::result::Result<T, CoreError>;
