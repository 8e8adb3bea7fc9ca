use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("provider {0} already exists")]
    AlreadyExists(String),

    #[error("provider {0} not found")]
    NotFound(String),

    /// A read-modify-write update would have violated a monotonicity
    /// invariant: cursor writes only ever move forward.
    #[error("update to {field} for {btc_pk} is not monotone: current {current}, attempted {attempted}")]
    NotMonotone {
        btc_pk: String,
        field: &'static str,
        current: u64,
        attempted: u64,
    },

    #[error("status transition {from} -> {to} for {btc_pk} is not permitted")]
    InvalidTransition {
        btc_pk: String,
        from: String,
        to: String,
    },

    #[error("sled: {0}")]
    Backend(String),

    #[error("encoding: {0}")]
    Encoding(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
