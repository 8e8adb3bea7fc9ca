use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid secret key material")]
    InvalidSecretKey,

    #[error("invalid derivation path: {0}")]
    InvalidDerivationPath(String),

    #[error("scalar tweak produced the identity element, retry with a different input")]
    DegenerateTweak,

    #[error("extraction requires two signatures sharing the same public randomness")]
    MismatchedRandomness,

    #[error("extraction requires two signatures over different messages")]
    IdenticalChallenge,

    #[error(transparent)]
    Primitive(#[from] fpd_primitives::PrimitiveError),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
