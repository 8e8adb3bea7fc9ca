//! Block and height types shared between the poller, the chain client, and
//! the per-provider control loop.

use serde::{Deserialize, Serialize};

use crate::buf::Buf32;

/// A consumer-chain block as observed by the [`crate` poller].
///
/// Blocks are totally ordered by height; we assume a single
/// canonical hash per finalized height.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    pub hash: Buf32,
    pub finalized: bool,
}

impl BlockInfo {
    pub fn new(height: u64, hash: Buf32, finalized: bool) -> Self {
        Self {
            height,
            hash,
            finalized,
        }
    }
}

/// Tag identifying the consumer chain a provider is casting votes for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub String);

impl ChainId {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChainId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
