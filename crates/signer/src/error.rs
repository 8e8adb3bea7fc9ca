use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("key {name} already registered under a different derivation path")]
    PathConflict { name: String },

    #[error(transparent)]
    Crypto(#[from] fpd_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, SignerError>;
