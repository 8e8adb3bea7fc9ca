//! The randomness scheduler: decides when a provider's next
//! batch of public randomness needs to be committed, and drives the
//! commit itself through the signer and the chain client.

use fpd_chain_client::{ChainClient, ChainError};
use fpd_primitives::{Buf32, ChainId};
use fpd_signer::EotsManager;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct RandomnessSchedulerConfig {
    /// Commit a fresh batch once fewer than this many committed heights
    /// remain ahead of the current one.
    pub min_randomness_gap: u64,
    /// Number of `pub_rand` values requested per commit.
    pub batch_size: u64,
}

/// Per-provider scheduler state. `tip` tracks the highest height this
/// session knows to be covered by an acknowledged commitment.
pub struct RandomnessScheduler {
    config: RandomnessSchedulerConfig,
    tip: Option<u64>,
}

impl RandomnessScheduler {
    pub fn new(config: RandomnessSchedulerConfig) -> Self {
        Self { config, tip: None }
    }

    /// Seeds `tip` from what the chain already has on record, so a
    /// restarted instance doesn't needlessly recommit a covered range.
    pub async fn resync(&mut self, chain: &dyn ChainClient, btc_pk: &Buf32) -> Result<()> {
        let committed = chain.query_last_committed_public_rand(btc_pk, 1).await?;
        self.tip = committed.keys().next_back().copied();
        Ok(())
    }

    pub fn tip(&self) -> Option<u64> {
        self.tip
    }

    /// Overrides `tip` directly, used by the instance's manual
    /// `CommitPubRand` operation.
    pub fn force_tip(&mut self, tip: u64) {
        self.tip = Some(tip);
    }

    fn needs_commit(&self, h: u64) -> bool {
        match self.tip {
            None => true,
            Some(tip) if tip < h => true,
            Some(tip) => tip - h < self.config.min_randomness_gap,
        }
    }

    /// Ensures randomness covering `h` is committed, issuing a fresh batch
    /// if needed. Returns `true` if a commit was issued for this call.
    pub async fn ensure_committed(
        &mut self,
        chain: &dyn ChainClient,
        signer: &dyn EotsManager,
        btc_pk: &Buf32,
        chain_id: &ChainId,
        h: u64,
    ) -> Result<bool> {
        if !self.needs_commit(h) {
            return Ok(false);
        }

        let start_height = match self.tip {
            Some(tip) if tip >= h => tip + 1,
            _ => h,
        };

        let pub_rand_list = signer
            .create_randomness_pair_list(btc_pk, chain_id, start_height, self.config.batch_size)
            .await?;

        let msg = commitment_message(chain_id, start_height, &pub_rand_list);
        let sig = signer.sign_btc(btc_pk, &msg).await?;

        match chain
            .commit_pub_rand_list(btc_pk, start_height, &pub_rand_list, &sig)
            .await
        {
            Ok(_) => {
                info!(%btc_pk, start_height, num = pub_rand_list.len(), "committed public randomness");
            }
            Err(ChainError::AlreadyCommitted) => {
                info!(%btc_pk, start_height, "randomness already committed on chain");
            }
            Err(e) => return Err(CoreError::from(e)),
        }

        self.tip = Some(start_height + pub_rand_list.len() as u64 - 1);
        Ok(true)
    }
}

pub fn commitment_message(chain_id: &ChainId, start_height: u64, pub_rand_list: &[Buf32]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(chain_id.as_bytes());
    hasher.update(start_height.to_be_bytes());
    for pr in pub_rand_list {
        hasher.update(pr.as_bytes());
    }
    hasher.finalize().to_vec()
}
