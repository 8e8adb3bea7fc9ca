//! A fully deterministic in-memory [`ChainClient`], used by
//! every test in this repo and by local development. Models a block tree
//! keyed by height with a configurable finalization lag, per-provider
//! voting power schedules, committed randomness ranges, and submitted
//! finality signatures, distinguishing duplicate-same-hash from
//! duplicate-different-hash the way a real consumer chain would.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use fpd_crypto::eots::{self, EotsSignature};
use fpd_primitives::{BlockInfo, Buf32, Buf64, ProofOfPossession};
use sha2::{Digest, Sha256};

use crate::error::{ChainError, Result};
use crate::traits::{ChainClient, TxResponse};

fn block_hash(height: u64) -> Buf32 {
    let mut hasher = Sha256::new();
    hasher.update(b"mock-block");
    hasher.update(height.to_be_bytes());
    Buf32::from(<[u8; 32]>::from(hasher.finalize()))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct PowerChange {
    from_height: u64,
    power: u64,
}

#[derive(Clone, Debug)]
struct Commitment {
    start_height: u64,
    pub_rand_list: Vec<Buf32>,
}

impl Commitment {
    fn end_height(&self) -> u64 {
        self.start_height + self.pub_rand_list.len() as u64 - 1
    }
}

#[derive(Clone, Debug)]
struct Vote {
    app_hash: Buf32,
    sig: EotsSignature,
}

struct MockState {
    activation_height: u64,
    best_height: u64,
    finalization_lag: u64,
    voting_power: HashMap<Buf32, Vec<PowerChange>>,
    commitments: HashMap<Buf32, Vec<Commitment>>,
    votes: HashMap<(Buf32, u64), Vote>,
    registered: std::collections::HashSet<Buf32>,
    slashed: HashMap<Buf32, Buf32>,
    tx_counter: u64,
}

/// An in-memory mock of the target chain, configurable via the `with_*`
/// builder methods and the runtime setters below.
pub struct MockChainClient {
    state: Mutex<MockState>,
}

impl MockChainClient {
    pub fn new(activation_height: u64) -> Self {
        Self {
            state: Mutex::new(MockState {
                activation_height,
                best_height: activation_height,
                finalization_lag: 0,
                voting_power: HashMap::new(),
                commitments: HashMap::new(),
                votes: HashMap::new(),
                registered: std::collections::HashSet::new(),
                slashed: HashMap::new(),
                tx_counter: 0,
            }),
        }
    }

    pub fn with_finalization_lag(self, lag: u64) -> Self {
        self.state.lock().expect("mock chain mutex poisoned").finalization_lag = lag;
        self
    }

    /// `btc_pk` has `power` voting power starting at `from_height`
    /// (inclusive) until the next scheduled change.
    pub fn with_voting_power(self, btc_pk: Buf32, from_height: u64, power: u64) -> Self {
        self.set_voting_power(btc_pk, from_height, power);
        self
    }

    pub fn set_voting_power(&self, btc_pk: Buf32, from_height: u64, power: u64) {
        let mut state = self.state.lock().expect("mock chain mutex poisoned");
        let changes = state.voting_power.entry(btc_pk).or_default();
        changes.push(PowerChange { from_height, power });
        changes.sort();
    }

    /// Advances the chain's best height (and, transitively, its finalized
    /// tip) to `height`.
    pub fn set_best_height(&self, height: u64) {
        self.state.lock().expect("mock chain mutex poisoned").best_height = height;
    }

    pub fn best_height(&self) -> u64 {
        self.state.lock().expect("mock chain mutex poisoned").best_height
    }

    fn finalized_tip(state: &MockState) -> u64 {
        state.best_height.saturating_sub(state.finalization_lag)
    }

    /// Generates a distinct tx hash per call.
    fn next_tx_hash(state: &mut MockState) -> String {
        state.tx_counter += 1;
        format!("tx{:08x}", state.tx_counter)
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn query_best_block(&self) -> Result<BlockInfo> {
        let state = self.state.lock().expect("mock chain mutex poisoned");
        let h = state.best_height;
        Ok(BlockInfo::new(h, block_hash(h), h <= Self::finalized_tip(&state)))
    }

    async fn query_block(&self, height: u64) -> Result<BlockInfo> {
        let state = self.state.lock().expect("mock chain mutex poisoned");
        if height > state.best_height {
            return Err(ChainError::Permanent(format!(
                "height {height} is beyond the chain tip {}",
                state.best_height
            )));
        }
        Ok(BlockInfo::new(
            height,
            block_hash(height),
            height <= Self::finalized_tip(&state),
        ))
    }

    async fn query_activated_height(&self) -> Result<u64> {
        Ok(self.state.lock().expect("mock chain mutex poisoned").activation_height)
    }

    async fn query_latest_finalized_blocks(&self, limit: u64) -> Result<Vec<BlockInfo>> {
        let state = self.state.lock().expect("mock chain mutex poisoned");
        let tip = Self::finalized_tip(&state);
        let start = tip.saturating_sub(limit.saturating_sub(1));
        Ok((start..=tip).map(|h| BlockInfo::new(h, block_hash(h), true)).collect())
    }

    async fn query_finality_provider_voting_power(
        &self,
        btc_pk: &Buf32,
        height: u64,
    ) -> Result<u64> {
        let state = self.state.lock().expect("mock chain mutex poisoned");
        let power = state
            .voting_power
            .get(btc_pk)
            .map(|changes| {
                changes
                    .iter()
                    .rev()
                    .find(|c| c.from_height <= height)
                    .map(|c| c.power)
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        Ok(power)
    }

    async fn query_last_committed_public_rand(
        &self,
        btc_pk: &Buf32,
        count: u64,
    ) -> Result<BTreeMap<u64, Buf32>> {
        let state = self.state.lock().expect("mock chain mutex poisoned");
        let mut all: BTreeMap<u64, Buf32> = BTreeMap::new();
        if let Some(commitments) = state.commitments.get(btc_pk) {
            for c in commitments {
                for (i, pr) in c.pub_rand_list.iter().enumerate() {
                    all.insert(c.start_height + i as u64, *pr);
                }
            }
        }
        let tail: BTreeMap<u64, Buf32> = all
            .into_iter()
            .rev()
            .take(count as usize)
            .collect::<BTreeMap<_, _>>();
        Ok(tail)
    }

    async fn register_finality_provider(
        &self,
        _babylon_pk: &Buf32,
        btc_pk: &Buf32,
        _pop: &ProofOfPossession,
        _commission: u32,
        _description: &str,
    ) -> Result<TxResponse> {
        let mut state = self.state.lock().expect("mock chain mutex poisoned");
        state.registered.insert(*btc_pk);
        Ok(TxResponse {
            tx_hash: "abcd".to_string(),
        })
    }

    async fn commit_pub_rand_list(
        &self,
        btc_pk: &Buf32,
        start_height: u64,
        pub_rand_list: &[Buf32],
        _sig: &Buf64,
    ) -> Result<TxResponse> {
        let mut state = self.state.lock().expect("mock chain mutex poisoned");
        let already = state
            .commitments
            .get(btc_pk)
            .map(|list| list.iter().any(|c| c.start_height == start_height))
            .unwrap_or(false);
        if already {
            return Err(ChainError::AlreadyCommitted);
        }
        state.commitments.entry(*btc_pk).or_default().push(Commitment {
            start_height,
            pub_rand_list: pub_rand_list.to_vec(),
        });
        let tx_hash = Self::next_tx_hash(&mut state);
        Ok(TxResponse { tx_hash })
    }

    async fn submit_finality_sig(
        &self,
        btc_pk: &Buf32,
        height: u64,
        app_hash: &Buf32,
        _pub_rand: &Buf32,
        eots_sig: &EotsSignature,
    ) -> Result<TxResponse> {
        let mut state = self.state.lock().expect("mock chain mutex poisoned");

        if let Some(existing) = state.votes.get(&(*btc_pk, height)).cloned() {
            if existing.app_hash == *app_hash {
                return Err(ChainError::DuplicateVoteSameHash);
            }
            if let Ok(extracted) = eots::extract_secret_key(
                &existing.sig,
                existing.app_hash.as_bytes(),
                eots_sig,
                app_hash.as_bytes(),
                btc_pk,
            ) {
                let extracted_buf = eots::scalar_to_buf32(&extracted);
                state.slashed.insert(*btc_pk, extracted_buf);
            }
            return Err(ChainError::DuplicateVoteDiffHash);
        }

        state.votes.insert(
            (*btc_pk, height),
            Vote {
                app_hash: *app_hash,
                sig: *eots_sig,
            },
        );
        let tx_hash = Self::next_tx_hash(&mut state);
        Ok(TxResponse { tx_hash })
    }

    async fn query_finality_provider_slashed(&self, btc_pk: &Buf32) -> Result<Option<Buf32>> {
        Ok(self
            .state
            .lock()
            .expect("mock chain mutex poisoned")
            .slashed
            .get(btc_pk)
            .copied())
    }
}
