//! The provider instance actor: the per-provider cooperative
//! control loop. Shaped like a duty-executor worker — one
//! `tokio::select!` loop over a block stream, a command channel, and a
//! shutdown signal — generalized to drive the finality-voting state
//! machine instead of dispatching sequencer duties.

use std::time::Duration;
use std::sync::Arc;

use fpd_chain_client::{ChainClient, ChainError};
use fpd_common::backoff::{ExponentialBackoff, RetryTracker};
use fpd_poller::BlockPoller;
use fpd_primitives::{BlockInfo, Buf32, ChainId, ProviderStatus};
use fpd_signer::EotsManager;
use fpd_store::ProviderStore;
use fpd_tasks::TaskExecutor;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::equivocation::EquivocationDetector;
use crate::error::{CoreError, Result};
use crate::fast_sync::FastSyncEngine;
use crate::randomness::{commitment_message, RandomnessScheduler, RandomnessSchedulerConfig};
use crate::support::single_pub_rand;

#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct ProviderInstanceConfig {
    pub fast_sync_gap: u64,
    pub randomness: RandomnessSchedulerConfig,
    pub max_retries: u32,
    #[serde(with = "humantime_secs")]
    pub equivocation_check_interval: Duration,
}

mod humantime_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Outcome of submitting one finality signature, returned to RPC callers
/// (`SubmitFinalitySignature`, used by `AddFinalitySignature`).
#[derive(Debug, Clone, Default)]
pub struct SubmitOutcome {
    pub tx_hash: Option<String>,
    /// The secret key the chain extracted from a conflicting earlier vote,
    /// if this submission revealed one.
    pub extracted_sk: Option<Buf32>,
    /// Whether `extracted_sk` matches this provider's own local key
    /// (a sanity check on the extracted key); meaningless when `extracted_sk` is `None`.
    pub matches_local_key: bool,
}

enum Command {
    Stop,
    SubmitFinalitySignature {
        block: BlockInfo,
        reply: oneshot::Sender<Result<SubmitOutcome>>,
    },
    CommitPubRand {
        num: u64,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Cheaply-cloneable handle used by the supervisor and the RPC surface to
/// drive a running instance without touching its internal state.
#[derive(Clone)]
pub struct ProviderInstanceHandle {
    btc_pk: Buf32,
    cmd_tx: mpsc::Sender<Command>,
}

impl ProviderInstanceHandle {
    pub fn btc_pk(&self) -> Buf32 {
        self.btc_pk
    }

    /// Idempotent: sending to an already-exited actor is a silent no-op.
    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(Command::Stop).await;
    }

    pub async fn submit_finality_signature(&self, block: BlockInfo) -> Result<SubmitOutcome> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SubmitFinalitySignature { block, reply })
            .await
            .map_err(|_| CoreError::InstanceStopped)?;
        rx.await.map_err(|_| CoreError::InstanceStopped)?
    }

    pub async fn commit_pub_rand(&self, num: u64) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::CommitPubRand { num, reply })
            .await
            .map_err(|_| CoreError::InstanceStopped)?;
        rx.await.map_err(|_| CoreError::InstanceStopped)?
    }
}

pub struct ProviderInstance {
    btc_pk: Buf32,
    chain_id: ChainId,
    chain: Arc<dyn ChainClient>,
    signer: Arc<dyn EotsManager>,
    store: Arc<dyn ProviderStore>,
    detector: EquivocationDetector,
    config: ProviderInstanceConfig,
    scheduler: RandomnessScheduler,
    backoff: RetryTracker<ExponentialBackoff>,
}

impl ProviderInstance {
    /// Builds the actor for an already-registered, non-SLASHED provider,
    /// spawns its loop as a non-critical task, and returns a handle to it.
    /// A stalled or paused instance must never bring down the daemon, so
    /// unlike the poller this is spawned with `spawn_async`, not
    /// `spawn_critical_async`.
    pub async fn spawn(
        executor: &TaskExecutor,
        chain: Arc<dyn ChainClient>,
        signer: Arc<dyn EotsManager>,
        store: Arc<dyn ProviderStore>,
        btc_pk: Buf32,
        chain_id: ChainId,
        poller: BlockPoller,
        config: ProviderInstanceConfig,
    ) -> Result<ProviderInstanceHandle> {
        let record = store
            .get(&btc_pk)
            .await?
            .ok_or_else(|| CoreError::UnknownProvider(btc_pk.to_string()))?;
        if record.status.is_terminal() {
            return Err(CoreError::Slashed(btc_pk.to_string()));
        }

        let mut scheduler = RandomnessScheduler::new(config.randomness);
        scheduler.resync(chain.as_ref(), &btc_pk).await?;

        let detector = EquivocationDetector::new(chain.clone(), signer.clone(), store.clone());
        let backoff = RetryTracker::new(Duration::from_millis(200), Duration::from_secs(30), ExponentialBackoff::new(2.0));

        let instance = ProviderInstance {
            btc_pk,
            chain_id,
            chain,
            signer,
            store,
            detector,
            config,
            scheduler,
            backoff,
        };

        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let shutdown = executor.shutdown_signal();
        let task_name = format!("instance-{btc_pk}");
        executor.spawn_async(&task_name, async move { instance.run(poller, cmd_rx, shutdown).await });

        Ok(ProviderInstanceHandle { btc_pk, cmd_tx })
    }

    async fn run(
        mut self,
        mut poller: BlockPoller,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let mut equivocation_tick = tokio::time::interval(self.config.equivocation_check_interval);
        equivocation_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(btc_pk = %self.btc_pk, "instance shutting down");
                        return Ok(());
                    }
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(Command::Stop) | None => {
                            info!(btc_pk = %self.btc_pk, "instance stopped");
                            return Ok(());
                        }
                        Some(Command::SubmitFinalitySignature { block, reply }) => {
                            let result = self.handle_submit(block).await;
                            let _ = reply.send(result);
                        }
                        Some(Command::CommitPubRand { num, reply }) => {
                            let result = self.handle_commit_pub_rand(num).await;
                            let _ = reply.send(result);
                        }
                    }
                }
                maybe_block = poller.recv() => {
                    match maybe_block {
                        Some(block) => match self.process_block(block).await {
                            Ok(()) => {}
                            Err(CoreError::Paused) => {
                                warn!(btc_pk = %self.btc_pk, "instance paused after exhausting retries");
                                return Ok(());
                            }
                            Err(CoreError::Slashed(_)) => {
                                info!(btc_pk = %self.btc_pk, "instance slashed, halting");
                                return Ok(());
                            }
                            Err(e) => return Err(e.into()),
                        },
                        None => {
                            warn!(btc_pk = %self.btc_pk, "poller exited, stopping instance");
                            return Ok(());
                        }
                    }
                }
                _ = equivocation_tick.tick() => {
                    if self.detector.check(&self.btc_pk).await? {
                        info!(btc_pk = %self.btc_pk, "equivocation confirmed, instance halting");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn process_block(&mut self, block: BlockInfo) -> Result<()> {
        let record = self
            .store
            .get(&self.btc_pk)
            .await?
            .ok_or_else(|| CoreError::UnknownProvider(self.btc_pk.to_string()))?;

        if record.status.is_terminal() {
            return Err(CoreError::Slashed(self.btc_pk.to_string()));
        }

        // Step 1: idempotence — never reprocess a height already settled.
        if block.height <= record.last_processed_height {
            return Ok(());
        }

        // Step 2: a large gap behind the chain's own finalized tip triggers
        // fast sync. Must be measured against the chain's tip, not the
        // height the poller just delivered — the poller advances one
        // height at a time, so that gap is always 1.
        let finalized_tip = self
            .chain
            .query_latest_finalized_blocks(1)
            .await?
            .into_iter()
            .next_back()
            .map(|b| b.height);
        if let Some(tip) = finalized_tip {
            let gap = tip.saturating_sub(record.last_processed_height);
            if gap > self.config.fast_sync_gap {
                return self.run_fast_sync(record.last_processed_height, tip).await;
            }
        }

        self.process_height(block.height, &block).await
    }

    async fn run_fast_sync(&mut self, from_height_exclusive: u64, target_height: u64) -> Result<()> {
        info!(btc_pk = %self.btc_pk, from = from_height_exclusive, to = target_height, "starting fast sync");
        let outcome = {
            let engine = FastSyncEngine {
                chain: self.chain.as_ref(),
                signer: self.signer.as_ref(),
                btc_pk: self.btc_pk,
                chain_id: self.chain_id.clone(),
            };
            engine.run(&mut self.scheduler, from_height_exclusive, target_height).await?
        };

        if let Some(v) = outcome.last_voted_height {
            self.store.set_last_voted_height(&self.btc_pk, v).await?;
        }
        self.store
            .set_last_processed_height(&self.btc_pk, outcome.last_processed_height)
            .await?;

        if outcome.equivocated {
            return if self.detector.check(&self.btc_pk).await? {
                Err(CoreError::Slashed(self.btc_pk.to_string()))
            } else {
                Err(CoreError::Paused)
            };
        }

        Ok(())
    }

    async fn process_height(&mut self, h: u64, block: &BlockInfo) -> Result<()> {
        // Step 3: voting power gates everything below.
        let power = self
            .chain
            .query_finality_provider_voting_power(&self.btc_pk, h)
            .await?;
        let record = self
            .store
            .get(&self.btc_pk)
            .await?
            .ok_or_else(|| CoreError::UnknownProvider(self.btc_pk.to_string()))?;

        if power == 0 {
            if record.status == ProviderStatus::Active {
                self.store.set_status(&self.btc_pk, ProviderStatus::Inactive).await?;
            }
            self.store.set_last_processed_height(&self.btc_pk, h).await?;
            return Ok(());
        }
        if matches!(record.status, ProviderStatus::Registered | ProviderStatus::Inactive) {
            self.store.set_status(&self.btc_pk, ProviderStatus::Active).await?;
        }

        // Step 4: never sign a height whose randomness isn't acknowledged yet.
        let committed_now = self
            .scheduler
            .ensure_committed(self.chain.as_ref(), self.signer.as_ref(), &self.btc_pk, &self.chain_id, h)
            .await?;
        if committed_now {
            self.store.set_last_processed_height(&self.btc_pk, h).await?;
            return Ok(());
        }

        // Steps 5-9: sign, submit, and react to the chain's response.
        loop {
            let pub_rand = single_pub_rand(self.signer.as_ref(), &self.btc_pk, &self.chain_id, h).await?;
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
                    self.store.set_last_voted_height(&self.btc_pk, h).await?;
                    self.store.set_last_processed_height(&self.btc_pk, h).await?;
                    self.backoff.reset();
                    return Ok(());
                }
                Err(ChainError::DuplicateVoteSameHash) => {
                    self.store.set_last_voted_height(&self.btc_pk, h).await?;
                    self.store.set_last_processed_height(&self.btc_pk, h).await?;
                    self.backoff.reset();
                    return Ok(());
                }
                Err(ChainError::DuplicateVoteDiffHash) => {
                    warn!(btc_pk = %self.btc_pk, height = h, "equivocation detected");
                    return if self.detector.check(&self.btc_pk).await? {
                        Err(CoreError::Slashed(self.btc_pk.to_string()))
                    } else {
                        Err(CoreError::Paused)
                    };
                }
                Err(e) if e.is_transient() => {
                    if self.backoff.exhausted(self.config.max_retries) {
                        return Err(CoreError::Paused);
                    }
                    let delay = self.backoff.advance();
                    warn!(btc_pk = %self.btc_pk, height = h, error = %e, delay_ms = delay.as_millis(), "transient error submitting vote, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn handle_submit(&mut self, block: BlockInfo) -> Result<SubmitOutcome> {
        let pub_rand = single_pub_rand(self.signer.as_ref(), &self.btc_pk, &self.chain_id, block.height).await?;
        let eots_sig = self
            .signer
            .sign_eots(&self.btc_pk, &self.chain_id, block.height, block.hash.as_bytes())
            .await?;

        match self
            .chain
            .submit_finality_sig(&self.btc_pk, block.height, &block.hash, &pub_rand, &eots_sig)
            .await
        {
            Ok(resp) => {
                self.store.set_last_voted_height(&self.btc_pk, block.height).await?;
                self.store.set_last_processed_height(&self.btc_pk, block.height).await?;
                Ok(SubmitOutcome {
                    tx_hash: Some(resp.tx_hash),
                    ..Default::default()
                })
            }
            Err(ChainError::DuplicateVoteSameHash) => {
                self.store.set_last_voted_height(&self.btc_pk, block.height).await?;
                self.store.set_last_processed_height(&self.btc_pk, block.height).await?;
                Ok(SubmitOutcome::default())
            }
            Err(ChainError::DuplicateVoteDiffHash) => {
                let extracted = self.chain.query_finality_provider_slashed(&self.btc_pk).await?;
                let matches_local_key = match extracted {
                    Some(sk) => self.signer.extracted_key_is_ours(&self.btc_pk, &sk).await?,
                    None => false,
                };
                if matches_local_key {
                    self.store.set_status(&self.btc_pk, ProviderStatus::Slashed).await?;
                }
                Ok(SubmitOutcome {
                    tx_hash: None,
                    extracted_sk: extracted,
                    matches_local_key,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_commit_pub_rand(&mut self, num: u64) -> Result<()> {
        let start = self.scheduler.tip().map(|t| t + 1).unwrap_or(0);
        let pub_rand_list = self
            .signer
            .create_randomness_pair_list(&self.btc_pk, &self.chain_id, start, num)
            .await?;
        let msg = commitment_message(&self.chain_id, start, &pub_rand_list);
        let sig = self.signer.sign_btc(&self.btc_pk, &msg).await?;
        self.chain
            .commit_pub_rand_list(&self.btc_pk, start, &pub_rand_list, &sig)
            .await?;
        self.scheduler.force_tip(start + pub_rand_list.len() as u64 - 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::Network;
    use fpd_chain_client::MockChainClient;
    use fpd_poller::PollerConfig;
    use fpd_primitives::{BlockInfo, ProofOfPossession, ProviderRecord};
    use fpd_signer::LocalEotsManager;
    use fpd_store::MemStore;
    use fpd_tasks::TaskManager;
    use tokio::runtime::Handle;

    use super::*;

    fn instance_config() -> ProviderInstanceConfig {
        ProviderInstanceConfig {
            fast_sync_gap: 100,
            randomness: RandomnessSchedulerConfig {
                min_randomness_gap: 10,
                batch_size: 25,
            },
            max_retries: 3,
            equivocation_check_interval: Duration::from_secs(3600),
        }
    }

    async fn seed_provider(
        store: &dyn ProviderStore,
        signer: &LocalEotsManager,
        name: &str,
    ) -> fpd_signer::NewKey {
        let key = signer.create_key(name, "m/0").await.unwrap();
        store
            .put(ProviderRecord::new(
                key.babylon_pk,
                key.btc_pk,
                name.to_string(),
                ChainId::from("chain-a"),
                "d".to_string(),
                0,
                ProofOfPossession {
                    babylon_sig: fpd_primitives::Buf64::zero(),
                    btc_sig: fpd_primitives::Buf64::zero(),
                },
            ))
            .await
            .unwrap();
        store.set_status(&key.btc_pk, ProviderStatus::Registered).await.unwrap();
        key
    }

    #[tokio::test]
    async fn happy_path_votes_once_voting_power_is_nonzero() {
        let manager = TaskManager::new(Handle::current());
        let executor = manager.create_executor();

        let signer = Arc::new(LocalEotsManager::from_seed(b"instance test seed 1234567890!!!", Network::Regtest).unwrap());
        let store: Arc<dyn ProviderStore> = Arc::new(MemStore::new());
        let key = seed_provider(store.as_ref(), &signer, "p1").await;

        let chain = Arc::new(
            MockChainClient::new(1)
                .with_finalization_lag(0)
                .with_voting_power(key.btc_pk, 5, 100),
        );
        chain.set_best_height(10);

        let poller = BlockPoller::spawn(
            &executor,
            chain.clone(),
            PollerConfig {
                auto: true,
                static_start_height: 0,
                poll_interval: Duration::from_millis(5),
                buffer_size: 16,
            },
            "test-poller",
        );

        let handle = ProviderInstance::spawn(
            &executor,
            chain.clone(),
            signer.clone(),
            store.clone(),
            key.btc_pk,
            ChainId::from("chain-a"),
            poller,
            instance_config(),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        let record = store.get(&key.btc_pk).await.unwrap().unwrap();
        assert_eq!(record.last_voted_height, 10);
        assert_eq!(record.last_processed_height, 10);
        assert_eq!(record.status, ProviderStatus::Active);

        handle.stop().await;
    }

    #[tokio::test]
    async fn submit_finality_signature_reports_extraction_on_equivocation() {
        let manager = TaskManager::new(Handle::current());
        let executor = manager.create_executor();

        let signer = Arc::new(LocalEotsManager::from_seed(b"instance test seed 2234567890!!!", Network::Regtest).unwrap());
        let store: Arc<dyn ProviderStore> = Arc::new(MemStore::new());
        let key = seed_provider(store.as_ref(), &signer, "p1").await;

        let chain = Arc::new(
            MockChainClient::new(1)
                .with_finalization_lag(0)
                .with_voting_power(key.btc_pk, 1, 100),
        );
        chain.set_best_height(10);

        let poller = BlockPoller::spawn(
            &executor,
            chain.clone(),
            PollerConfig {
                auto: false,
                static_start_height: 100,
                poll_interval: Duration::from_secs(3600),
                buffer_size: 4,
            },
            "idle-poller",
        );

        let handle = ProviderInstance::spawn(
            &executor,
            chain.clone(),
            signer.clone(),
            store.clone(),
            key.btc_pk,
            ChainId::from("chain-a"),
            poller,
            instance_config(),
        )
        .await
        .unwrap();

        let block7 = BlockInfo::new(7, Buf32::from([7u8; 32]), true);
        let first = handle.submit_finality_signature(block7).await.unwrap();
        assert!(first.tx_hash.is_some());

        let conflicting = BlockInfo::new(7, Buf32::from([9u8; 32]), true);
        let second = handle.submit_finality_signature(conflicting).await.unwrap();
        assert!(second.extracted_sk.is_some());
        assert!(second.matches_local_key);

        let record = store.get(&key.btc_pk).await.unwrap().unwrap();
        assert_eq!(record.status, ProviderStatus::Slashed);

        handle.stop().await;
    }

    /// S4-style scenario: a provider that restarts far behind the chain's
    /// finalized tip must catch up in one fast-sync batch on the very next
    /// block it processes, not one height at a time.
    #[tokio::test]
    async fn restarting_behind_the_tip_triggers_fast_sync_immediately() {
        let signer =
            Arc::new(LocalEotsManager::from_seed(b"instance test seed 3234567890!!!", Network::Regtest).unwrap());
        let store: Arc<dyn ProviderStore> = Arc::new(MemStore::new());
        let key = seed_provider(store.as_ref(), &signer, "p1").await;
        let chain_id = ChainId::from("chain-a");

        let chain = Arc::new(
            MockChainClient::new(1)
                .with_finalization_lag(0)
                .with_voting_power(key.btc_pk, 1, 100),
        );
        chain.set_best_height(50);

        let detector = EquivocationDetector::new(chain.clone(), signer.clone(), store.clone());
        let mut config = instance_config();
        config.fast_sync_gap = 3;
        let mut instance = ProviderInstance {
            btc_pk: key.btc_pk,
            chain_id: chain_id.clone(),
            chain: chain.clone(),
            signer: signer.clone(),
            store: store.clone(),
            detector,
            config,
            scheduler: RandomnessScheduler::new(config.randomness),
            backoff: RetryTracker::new(Duration::from_millis(10), Duration::from_millis(100), ExponentialBackoff::new(2.0)),
        };

        // The poller always delivers the very next height (1) after a
        // restart; the gap to the finalized tip (50) is what must drive
        // fast sync, not the delivered block's own height.
        let block = BlockInfo::new(1, Buf32::from([1u8; 32]), true);
        instance.process_block(block).await.unwrap();

        let record = store.get(&key.btc_pk).await.unwrap().unwrap();
        assert_eq!(record.last_processed_height, 50);
        assert_eq!(record.last_voted_height, 50);
    }

    /// P1: after every block an instance processes, `last_voted_height`
    /// never exceeds `last_processed_height`.
    async fn run_power_sequence(power_flags: Vec<bool>) -> bool {
        let signer = Arc::new(
            LocalEotsManager::from_seed(b"proptest power sequence seed!!!!", Network::Regtest).unwrap(),
        );
        let store: Arc<dyn ProviderStore> = Arc::new(MemStore::new());
        let key = seed_provider(store.as_ref(), &signer, "p1").await;
        let chain_id = ChainId::from("chain-a");

        let chain = Arc::new(MockChainClient::new(1).with_finalization_lag(0));
        for (i, &has_power) in power_flags.iter().enumerate() {
            if has_power {
                chain.set_voting_power(key.btc_pk, (i + 1) as u64, 100);
            }
        }

        let detector = EquivocationDetector::new(chain.clone(), signer.clone(), store.clone());
        let mut instance = ProviderInstance {
            btc_pk: key.btc_pk,
            chain_id: chain_id.clone(),
            chain: chain.clone(),
            signer: signer.clone(),
            store: store.clone(),
            detector,
            config: instance_config(),
            scheduler: RandomnessScheduler::new(instance_config().randomness),
            backoff: RetryTracker::new(Duration::from_millis(10), Duration::from_millis(100), ExponentialBackoff::new(2.0)),
        };

        for (i, _) in power_flags.iter().enumerate() {
            let h = (i + 1) as u64;
            let block = BlockInfo::new(h, Buf32::from([h as u8; 32]), false);
            if instance.process_block(block).await.is_err() {
                break;
            }

            let record = store.get(&key.btc_pk).await.unwrap().unwrap();
            if record.last_voted_height > record.last_processed_height {
                return false;
            }
        }

        true
    }

    proptest::proptest! {
        #[test]
        fn last_voted_never_outpaces_last_processed(power_flags in proptest::collection::vec(proptest::bool::ANY, 1..20)) {
            let ok = tokio::runtime::Runtime::new().unwrap().block_on(run_power_sequence(power_flags));
            proptest::prop_assert!(ok);
        }
    }
}
