//! Cryptographic primitives for the finality provider daemon: the EOTS
//! construction behind finality votes, ordinary BIP-340 Schnorr signing for
//! proof-of-possession, and the keyring that derives both from a root seed.

pub mod eots;
pub mod error;
pub mod keyring;
pub mod schnorr;

pub use error::{CryptoError, Result};
