//! The chain client interface, consumed by the poller, the core
//! actor, the randomness scheduler, and the fast-sync engine.

use std::collections::BTreeMap;

use async_trait::async_trait;
use fpd_crypto::eots::EotsSignature;
use fpd_primitives::{BlockInfo, Buf32, Buf64, ProofOfPossession};

use crate::error::Result;

/// A transaction acknowledgement from the target chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResponse {
    pub tx_hash: String,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn query_best_block(&self) -> Result<BlockInfo>;

    async fn query_block(&self, height: u64) -> Result<BlockInfo>;

    async fn query_activated_height(&self) -> Result<u64>;

    async fn query_latest_finalized_blocks(&self, limit: u64) -> Result<Vec<BlockInfo>>;

    async fn query_finality_provider_voting_power(&self, btc_pk: &Buf32, height: u64)
        -> Result<u64>;

    async fn query_last_committed_public_rand(
        &self,
        btc_pk: &Buf32,
        count: u64,
    ) -> Result<BTreeMap<u64, Buf32>>;

    async fn register_finality_provider(
        &self,
        babylon_pk: &Buf32,
        btc_pk: &Buf32,
        pop: &ProofOfPossession,
        commission: u32,
        description: &str,
    ) -> Result<TxResponse>;

    async fn commit_pub_rand_list(
        &self,
        btc_pk: &Buf32,
        start_height: u64,
        pub_rand_list: &[Buf32],
        sig: &Buf64,
    ) -> Result<TxResponse>;

    async fn submit_finality_sig(
        &self,
        btc_pk: &Buf32,
        height: u64,
        app_hash: &Buf32,
        pub_rand: &Buf32,
        eots_sig: &EotsSignature,
    ) -> Result<TxResponse>;

    /// `Some(extracted_sk)` once the chain has observed two conflicting
    /// votes from `btc_pk` and recovered its secret key.
    async fn query_finality_provider_slashed(&self, btc_pk: &Buf32) -> Result<Option<Buf32>>;
}
