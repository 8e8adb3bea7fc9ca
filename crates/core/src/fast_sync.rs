//! The fast-sync engine: batch catch-up over a gap between a
//! provider's last-processed height and the chain's finalized tip.

use fpd_chain_client::{ChainClient, ChainError};
use fpd_primitives::{Buf32, ChainId};
use fpd_signer::EotsManager;
use tracing::{info, warn};

use crate::error::Result;
use crate::randomness::RandomnessScheduler;
use crate::support::single_pub_rand;

/// Result of one fast-sync run: the cursor values the caller should
/// persist. `last_voted_height` is `None` when the batch voted nothing
/// (e.g. the gap was empty, or every height had zero voting power).
#[derive(Debug, Clone, Copy, Default)]
pub struct FastSyncOutcome {
    pub last_voted_height: Option<u64>,
    pub last_processed_height: u64,
    pub equivocated: bool,
}

pub struct FastSyncEngine<'a> {
    pub chain: &'a dyn ChainClient,
    pub signer: &'a dyn EotsManager,
    pub btc_pk: Buf32,
    pub chain_id: ChainId,
}

impl<'a> FastSyncEngine<'a> {
    /// Processes `(from_height_exclusive, target_height]` in ascending
    /// order, submitting one finality signature per height with nonzero
    /// voting power. Stops early (without error) on the first non-success,
    /// non-duplicate-same-hash response.
    pub async fn run(
        &self,
        scheduler: &mut RandomnessScheduler,
        from_height_exclusive: u64,
        target_height: u64,
    ) -> Result<FastSyncOutcome> {
        let mut outcome = FastSyncOutcome {
            last_processed_height: from_height_exclusive,
            ..Default::default()
        };

        for h in (from_height_exclusive + 1)..=target_height {
            let power = self
                .chain
                .query_finality_provider_voting_power(&self.btc_pk, h)
                .await?;
            if power == 0 {
                outcome.last_processed_height = h;
                continue;
            }

            scheduler
                .ensure_committed(self.chain, self.signer, &self.btc_pk, &self.chain_id, h)
                .await?;

            let block = self.chain.query_block(h).await?;
            let pub_rand = single_pub_rand(self.signer, &self.btc_pk, &self.chain_id, h).await?;
            let eots_sig = self
                .signer
                .sign_eots(&self.btc_pk, &self.chain_id, h, block.hash.as_bytes())
                .await?;

            match self
                .chain
                .submit_finality_sig(&self.btc_pk, h, &block.hash, &pub_rand, &eots_sig)
                .await
            {
                Ok(_) => {
                    outcome.last_voted_height = Some(h);
                    outcome.last_processed_height = h;
                }
                Err(ChainError::DuplicateVoteSameHash) => {
                    outcome.last_voted_height = Some(h);
                    outcome.last_processed_height = h;
                }
                Err(ChainError::DuplicateVoteDiffHash) => {
                    warn!(btc_pk = %self.btc_pk, height = h, "equivocation detected mid fast-sync batch");
                    outcome.equivocated = true;
                    return Ok(outcome);
                }
                Err(e) => {
                    warn!(btc_pk = %self.btc_pk, height = h, error = %e, "fast sync stopping short of target");
                    return Ok(outcome);
                }
            }
        }

        info!(
            btc_pk = %self.btc_pk,
            last_voted_height = ?outcome.last_voted_height,
            last_processed_height = outcome.last_processed_height,
            "fast sync batch complete"
        );
        Ok(outcome)
    }
}
