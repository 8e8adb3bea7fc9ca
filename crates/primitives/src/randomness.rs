//! Wire representation of a public randomness commitment.

use serde::{Deserialize, Serialize};

use crate::buf::{Buf32, Buf64};

/// `(start_height, num_pub_rand, public_randomness_list, signature)`. Each
/// committed `pub_rand[i]` is consumed by exactly one EOTS signature at
/// `start_height + i`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomnessCommitment {
    pub start_height: u64,
    pub pub_rand_list: Vec<Buf32>,
    pub sig: Buf64,
}

impl RandomnessCommitment {
    pub fn num_pub_rand(&self) -> u64 {
        self.pub_rand_list.len() as u64
    }

    /// The last height this commitment covers, inclusive.
    pub fn end_height(&self) -> u64 {
        self.start_height + self.num_pub_rand().saturating_sub(1)
    }

    pub fn covers(&self, height: u64) -> bool {
        height >= self.start_height && height <= self.end_height()
    }

    pub fn pub_rand_at(&self, height: u64) -> Option<Buf32> {
        if !self.covers(height) {
            return None;
        }
        let idx = (height - self.start_height) as usize;
        self.pub_rand_list.get(idx).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commitment(start: u64, n: usize) -> RandomnessCommitment {
        RandomnessCommitment {
            start_height: start,
            pub_rand_list: (0..n as u8).map(|i| Buf32::from([i; 32])).collect(),
            sig: Buf64::from([0u8; 64]),
        }
    }

    #[test]
    fn covers_the_committed_range_only() {
        let c = commitment(10, 5);
        assert_eq!(c.end_height(), 14);
        assert!(!c.covers(9));
        assert!(c.covers(10));
        assert!(c.covers(14));
        assert!(!c.covers(15));
    }

    #[test]
    fn pub_rand_at_indexes_from_start_height() {
        let c = commitment(100, 3);
        assert_eq!(c.pub_rand_at(100), Some(Buf32::from([0u8; 32])));
        assert_eq!(c.pub_rand_at(102), Some(Buf32::from([2u8; 32])));
        assert_eq!(c.pub_rand_at(103), None);
    }
}
