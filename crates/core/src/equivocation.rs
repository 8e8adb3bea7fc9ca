//! The equivocation detector: checks the chain for an
//! extracted secret key and, once it verifies as ours, transitions the
//! provider to the terminal `SLASHED` status.

use std::sync::Arc;

use fpd_chain_client::ChainClient;
use fpd_primitives::{Buf32, ProviderStatus};
use fpd_signer::EotsManager;
use fpd_store::ProviderStore;
use tracing::warn;

use crate::error::Result;

pub struct EquivocationDetector {
    chain: Arc<dyn ChainClient>,
    signer: Arc<dyn EotsManager>,
    store: Arc<dyn ProviderStore>,
}

impl EquivocationDetector {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        signer: Arc<dyn EotsManager>,
        store: Arc<dyn ProviderStore>,
    ) -> Self {
        Self {
            chain,
            signer,
            store,
        }
    }

    /// Returns `true` once this provider has been confirmed slashed,
    /// either just now or in a previous call.
    pub async fn check(&self, btc_pk: &Buf32) -> Result<bool> {
        let Some(extracted) = self.chain.query_finality_provider_slashed(btc_pk).await? else {
            return Ok(false);
        };

        if !self.signer.extracted_key_is_ours(btc_pk, &extracted).await? {
            warn!(%btc_pk, "chain reported an extracted key that does not match our local secret");
            return Ok(false);
        }

        self.store.set_status(btc_pk, ProviderStatus::Slashed).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::Network;
    use fpd_chain_client::MockChainClient;
    use fpd_primitives::{ChainId, ProofOfPossession, ProviderRecord};
    use fpd_signer::LocalEotsManager;
    use fpd_store::MemStore;

    use super::*;

    #[tokio::test]
    async fn confirms_slashing_after_a_conflicting_vote() {
        let signer =
            Arc::new(LocalEotsManager::from_seed(b"equivocation test seed 123456789", Network::Regtest).unwrap());
        let key = signer.create_key("p1", "m/0").await.unwrap();
        let chain_id = ChainId::from("chain-a");
        let chain = Arc::new(MockChainClient::new(1));
        let store: Arc<dyn ProviderStore> = Arc::new(MemStore::new());

        store
            .put(ProviderRecord::new(
                Buf32::zero(),
                key.btc_pk,
                "p1".to_string(),
                chain_id.clone(),
                "d".to_string(),
                0,
                ProofOfPossession {
                    babylon_sig: fpd_primitives::Buf64::zero(),
                    btc_sig: fpd_primitives::Buf64::zero(),
                },
            ))
            .await
            .unwrap();

        let hash_a = Buf32::from([1u8; 32]);
        let hash_b = Buf32::from([2u8; 32]);
        let pub_rand = Buf32::zero();

        let sig_a = signer
            .sign_eots(&key.btc_pk, &chain_id, 7, hash_a.as_bytes())
            .await
            .unwrap();
        chain
            .submit_finality_sig(&key.btc_pk, 7, &hash_a, &pub_rand, &sig_a)
            .await
            .unwrap();

        let sig_b = signer
            .sign_eots(&key.btc_pk, &chain_id, 7, hash_b.as_bytes())
            .await
            .unwrap();
        let err = chain
            .submit_finality_sig(&key.btc_pk, 7, &hash_b, &pub_rand, &sig_b)
            .await
            .unwrap_err();
        assert!(matches!(err, fpd_chain_client::ChainError::DuplicateVoteDiffHash));

        let detector = EquivocationDetector::new(chain.clone(), signer.clone(), store.clone());
        assert!(detector.check(&key.btc_pk).await.unwrap());

        let record = store.get(&key.btc_pk).await.unwrap().unwrap();
        assert_eq!(record.status, ProviderStatus::Slashed);
    }

    #[tokio::test]
    async fn no_report_means_no_transition() {
        let signer =
            Arc::new(LocalEotsManager::from_seed(b"equivocation test seed 987654321", Network::Regtest).unwrap());
        let key = signer.create_key("p1", "m/0").await.unwrap();
        let chain = Arc::new(MockChainClient::new(1));
        let store: Arc<dyn ProviderStore> = Arc::new(MemStore::new());

        let detector = EquivocationDetector::new(chain, signer, store);
        assert!(!detector.check(&key.btc_pk).await.unwrap());
    }
}
