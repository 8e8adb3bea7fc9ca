//! The Provider App / Supervisor: owns the provider store and
//! the registry of running [`fpd_core::ProviderInstance`] actors, and is
//! the one thing the RPC surface talks to. A provider has at most
//! one running actor at a time, looked up by `btc_pk` in a flat map —
//! no per-record locking, since each actor already serializes its own
//! state mutations.

mod error;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use fpd_chain_client::{ChainClient, TxResponse};
use fpd_core::{ProviderInstance, ProviderInstanceConfig, ProviderInstanceHandle, SubmitOutcome};
use fpd_poller::{BlockPoller, PollerConfig};
use fpd_primitives::{BlockInfo, Buf32, ChainId, ProofOfPossession, ProviderRecord, ProviderStatus};
use fpd_signer::EotsManager;
use fpd_store::ProviderStore;
use fpd_tasks::TaskExecutor;
use tracing::info;

pub use error::{AppError, Result};

/// Parameters the supervisor needs to start a new provider instance; kept
/// separate from [`ProviderInstanceConfig`] because the poller is wired up
/// per-instance rather than shared.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub chain_id: ChainId,
    pub poller: PollerConfig,
    pub instance: ProviderInstanceConfig,
}

pub struct FinalityProviderApp {
    chain: Arc<dyn ChainClient>,
    signer: Arc<dyn EotsManager>,
    store: Arc<dyn ProviderStore>,
    executor: TaskExecutor,
    config: AppConfig,
    instances: Mutex<HashMap<Buf32, ProviderInstanceHandle>>,
}

impl FinalityProviderApp {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        signer: Arc<dyn EotsManager>,
        store: Arc<dyn ProviderStore>,
        executor: TaskExecutor,
        config: AppConfig,
    ) -> Self {
        Self {
            chain,
            signer,
            store,
            executor,
            config,
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Derives a new keypair, builds its proof of possession, and persists
    /// a `CREATED` record.
    pub async fn create_finality_provider(
        &self,
        key_name: &str,
        hd_path: &str,
        description: &str,
        commission: u32,
    ) -> Result<ProviderRecord> {
        let key = self.signer.create_key(key_name, hd_path).await?;
        let babylon_sig = self.signer.sign_babylon(&key.btc_pk, key.btc_pk.as_bytes()).await?;
        let btc_sig = self.signer.sign_btc(&key.btc_pk, babylon_sig.as_bytes()).await?;
        let pop = ProofOfPossession { babylon_sig, btc_sig };

        let record = ProviderRecord::new(
            key.babylon_pk,
            key.btc_pk,
            key_name.to_string(),
            self.config.chain_id.clone(),
            description.to_string(),
            commission,
            pop,
        );
        self.store.put(record.clone()).await?;
        info!(btc_pk = %record.btc_pk, %key_name, "finality provider created");
        Ok(record)
    }

    /// Submits the on-chain registration transaction and, on success,
    /// transitions the record to `REGISTERED`.
    pub async fn register_finality_provider(&self, btc_pk: &Buf32) -> Result<TxResponse> {
        let record = self.load(btc_pk).await?;
        let resp = self
            .chain
            .register_finality_provider(
                &record.babylon_pk,
                &record.btc_pk,
                &record.pop,
                record.commission,
                &record.description,
            )
            .await?;
        self.store.set_status(btc_pk, ProviderStatus::Registered).await?;
        info!(%btc_pk, tx_hash = %resp.tx_hash, "finality provider registered");
        Ok(resp)
    }

    /// Starts a Provider Instance actor for a non-`SLASHED` record that
    /// isn't already running. Idempotent.
    pub async fn start_handling_finality_provider(&self, btc_pk: &Buf32) -> Result<()> {
        if self.instances.lock().expect("instances mutex poisoned").contains_key(btc_pk) {
            return Ok(());
        }

        let record = self.load(btc_pk).await?;
        if record.status.is_terminal() {
            return Err(AppError::Slashed(btc_pk.to_string()));
        }

        let poller = BlockPoller::spawn(
            &self.executor,
            self.chain.clone(),
            self.config.poller.clone(),
            format!("poller-{btc_pk}"),
        );
        let handle = ProviderInstance::spawn(
            &self.executor,
            self.chain.clone(),
            self.signer.clone(),
            self.store.clone(),
            *btc_pk,
            self.config.chain_id.clone(),
            poller,
            self.config.instance,
        )
        .await?;

        self.instances.lock().expect("instances mutex poisoned").insert(*btc_pk, handle);
        info!(%btc_pk, "started handling finality provider");
        Ok(())
    }

    /// Starts every non-`SLASHED` provider in the store that isn't already
    /// running.
    pub async fn start_handling_all(&self) -> Result<()> {
        for record in self.store.list().await? {
            if record.status.is_terminal() {
                continue;
            }
            self.start_handling_finality_provider(&record.btc_pk).await?;
        }
        Ok(())
    }

    /// Stops a running instance; a no-op if it isn't running.
    pub async fn stop_handling_finality_provider(&self, btc_pk: &Buf32) -> Result<()> {
        let handle = self.instances.lock().expect("instances mutex poisoned").remove(btc_pk);
        if let Some(handle) = handle {
            handle.stop().await;
        }
        Ok(())
    }

    /// `btc_pk`s of every currently-running instance (excludes
    /// `SLASHED` by construction, since those are never started).
    pub fn list_finality_provider_instances(&self) -> Vec<Buf32> {
        self.instances.lock().expect("instances mutex poisoned").keys().copied().collect()
    }

    pub async fn query_finality_provider(&self, btc_pk: &Buf32) -> Result<Option<ProviderRecord>> {
        Ok(self.store.get(btc_pk).await?)
    }

    pub async fn query_finality_provider_list(&self) -> Result<Vec<ProviderRecord>> {
        Ok(self.store.list().await?)
    }

    /// Routes an RPC-submitted finality signature to the provider's running
    /// instance. Fails with [`AppError::UnknownProvider`] if no instance is
    /// running for `btc_pk`.
    pub async fn submit_finality_signature(
        &self,
        btc_pk: &Buf32,
        block: BlockInfo,
    ) -> Result<SubmitOutcome> {
        let handle = {
            let instances = self.instances.lock().expect("instances mutex poisoned");
            instances.get(btc_pk).cloned()
        };
        let handle = handle.ok_or_else(|| AppError::UnknownProvider(btc_pk.to_string()))?;
        Ok(handle.submit_finality_signature(block).await?)
    }

    async fn load(&self, btc_pk: &Buf32) -> Result<ProviderRecord> {
        self.store
            .get(btc_pk)
            .await?
            .ok_or_else(|| AppError::UnknownProvider(btc_pk.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bitcoin::Network;
    use fpd_chain_client::MockChainClient;
    use fpd_core::RandomnessSchedulerConfig;
    use fpd_signer::LocalEotsManager;
    use fpd_store::MemStore;
    use fpd_tasks::TaskManager;
    use tokio::runtime::Handle;

    use super::*;

    fn app_config() -> AppConfig {
        AppConfig {
            chain_id: ChainId::from("chain-a"),
            poller: PollerConfig {
                auto: true,
                static_start_height: 0,
                poll_interval: Duration::from_millis(10),
                buffer_size: 16,
            },
            instance: ProviderInstanceConfig {
                fast_sync_gap: 100,
                randomness: RandomnessSchedulerConfig {
                    min_randomness_gap: 10,
                    batch_size: 25,
                },
                max_retries: 3,
                equivocation_check_interval: Duration::from_secs(3600),
            },
        }
    }

    fn build_app(chain: Arc<dyn ChainClient>) -> (TaskManager, FinalityProviderApp) {
        let manager = TaskManager::new(Handle::current());
        let executor = manager.create_executor();
        let signer = Arc::new(
            LocalEotsManager::from_seed(b"app test seed 12345678901234567", Network::Regtest).unwrap(),
        );
        let store: Arc<dyn ProviderStore> = Arc::new(MemStore::new());
        let app = FinalityProviderApp::new(chain, signer, store, executor, app_config());
        (manager, app)
    }

    #[tokio::test]
    async fn create_then_register_transitions_to_registered() {
        let chain = Arc::new(MockChainClient::new(1));
        let (_manager, app) = build_app(chain);

        let record = app
            .create_finality_provider("p1", "m/0", "a test provider", 500)
            .await
            .unwrap();
        assert_eq!(record.status, ProviderStatus::Created);

        let resp = app.register_finality_provider(&record.btc_pk).await.unwrap();
        assert!(!resp.tx_hash.is_empty());

        let stored = app.query_finality_provider(&record.btc_pk).await.unwrap().unwrap();
        assert_eq!(stored.status, ProviderStatus::Registered);
    }

    #[tokio::test]
    async fn start_handling_finality_provider_is_idempotent() {
        let chain = Arc::new(MockChainClient::new(1));
        chain.set_best_height(3);
        let (_manager, app) = build_app(chain);

        let record = app
            .create_finality_provider("p1", "m/0", "a test provider", 0)
            .await
            .unwrap();
        app.register_finality_provider(&record.btc_pk).await.unwrap();

        app.start_handling_finality_provider(&record.btc_pk).await.unwrap();
        app.start_handling_finality_provider(&record.btc_pk).await.unwrap();

        assert_eq!(app.list_finality_provider_instances(), vec![record.btc_pk]);

        app.stop_handling_finality_provider(&record.btc_pk).await.unwrap();
        assert!(app.list_finality_provider_instances().is_empty());
    }

    #[tokio::test]
    async fn start_handling_all_skips_slashed_providers() {
        let chain = Arc::new(MockChainClient::new(1));
        chain.set_best_height(3);
        let (_manager, app) = build_app(chain);

        let active = app
            .create_finality_provider("p1", "m/0", "active provider", 0)
            .await
            .unwrap();
        app.register_finality_provider(&active.btc_pk).await.unwrap();

        let slashed = app
            .create_finality_provider("p2", "m/1", "slashed provider", 0)
            .await
            .unwrap();
        app.register_finality_provider(&slashed.btc_pk).await.unwrap();
        app.store.set_status(&slashed.btc_pk, ProviderStatus::Slashed).await.unwrap();

        app.start_handling_all().await.unwrap();

        let running = app.list_finality_provider_instances();
        assert_eq!(running, vec![active.btc_pk]);
    }
}
