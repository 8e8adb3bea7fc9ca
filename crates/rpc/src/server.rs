use std::sync::Arc;

use fpd_app::FinalityProviderApp;
use fpd_primitives::{BlockInfo, Buf32};
use jsonrpsee::core::{async_trait, RpcResult};

use crate::api::{
    FinalityProviderRpcServer, FinalitySignatureResponse, InfoResponse, ProviderRecordView, TxResponseView,
};
use crate::errors::map_app_error;

pub struct FinalityProviderRpcImpl {
    app: Arc<FinalityProviderApp>,
}

impl FinalityProviderRpcImpl {
    pub fn new(app: Arc<FinalityProviderApp>) -> Self {
        Self { app }
    }
}

#[async_trait]
impl FinalityProviderRpcServer for FinalityProviderRpcImpl {
    async fn get_info(&self) -> RpcResult<InfoResponse> {
        Ok(InfoResponse {
            version: env!("CARGO_PKG_VERSION").to_string(),
            running_instances: self.app.list_finality_provider_instances().len(),
        })
    }

    async fn create_finality_provider(
        &self,
        key_name: String,
        hd_path: String,
        description: String,
        commission: u32,
    ) -> RpcResult<ProviderRecordView> {
        let record = self
            .app
            .create_finality_provider(&key_name, &hd_path, &description, commission)
            .await
            .map_err(map_app_error)?;
        Ok(record.into())
    }

    async fn register_finality_provider(&self, btc_pk: Buf32) -> RpcResult<TxResponseView> {
        let resp = self
            .app
            .register_finality_provider(&btc_pk)
            .await
            .map_err(map_app_error)?;
        Ok(TxResponseView { tx_hash: resp.tx_hash })
    }

    async fn start_handling_finality_provider(&self, btc_pk: Buf32) -> RpcResult<()> {
        self.app
            .start_handling_finality_provider(&btc_pk)
            .await
            .map_err(map_app_error)
    }

    async fn start_handling_all(&self) -> RpcResult<()> {
        self.app.start_handling_all().await.map_err(map_app_error)
    }

    async fn add_finality_signature(
        &self,
        btc_pk: Buf32,
        height: u64,
        block_hash: Buf32,
    ) -> RpcResult<FinalitySignatureResponse> {
        let block = BlockInfo::new(height, block_hash, true);
        let outcome = self
            .app
            .submit_finality_signature(&btc_pk, block)
            .await
            .map_err(map_app_error)?;
        Ok(FinalitySignatureResponse {
            tx_hash: outcome.tx_hash,
            extracted_sk_hex: outcome.extracted_sk,
            matches_local_key: outcome.matches_local_key,
        })
    }

    async fn query_finality_provider(&self, btc_pk: Buf32) -> RpcResult<Option<ProviderRecordView>> {
        let record = self.app.query_finality_provider(&btc_pk).await.map_err(map_app_error)?;
        Ok(record.map(Into::into))
    }

    async fn query_finality_provider_list(&self) -> RpcResult<Vec<ProviderRecordView>> {
        let records = self.app.query_finality_provider_list().await.map_err(map_app_error)?;
        Ok(records.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bitcoin::Network;
    use fpd_app::AppConfig;
    use fpd_chain_client::{ChainClient, MockChainClient};
    use fpd_core::{ProviderInstanceConfig, RandomnessSchedulerConfig};
    use fpd_poller::PollerConfig;
    use fpd_primitives::ChainId;
    use fpd_signer::LocalEotsManager;
    use fpd_store::{MemStore, ProviderStore};
    use fpd_tasks::TaskManager;
    use tokio::runtime::Handle;

    use super::*;

    fn rpc_impl() -> (TaskManager, FinalityProviderRpcImpl) {
        let manager = TaskManager::new(Handle::current());
        let executor = manager.create_executor();
        let chain: Arc<dyn ChainClient> = Arc::new(MockChainClient::new(1));
        let signer = Arc::new(
            LocalEotsManager::from_seed(b"rpc server test seed 123456789!!", Network::Regtest).unwrap(),
        );
        let store: Arc<dyn ProviderStore> = Arc::new(MemStore::new());
        let config = AppConfig {
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
        };
        let app = Arc::new(FinalityProviderApp::new(chain, signer, store, executor, config));
        (manager, FinalityProviderRpcImpl::new(app))
    }

    #[tokio::test]
    async fn get_info_reports_zero_instances_before_anything_starts() {
        let (_manager, rpc) = rpc_impl();
        let info = rpc.get_info().await.unwrap();
        assert_eq!(info.running_instances, 0);
    }

    #[tokio::test]
    async fn create_register_and_query_round_trip() {
        let (_manager, rpc) = rpc_impl();

        let created = rpc
            .create_finality_provider("p1".into(), "m/0".into(), "a provider".into(), 250)
            .await
            .unwrap();
        assert_eq!(created.status, "CREATED");

        let registered = rpc.register_finality_provider(created.btc_pk).await.unwrap();
        assert!(!registered.tx_hash.is_empty());

        let queried = rpc.query_finality_provider(created.btc_pk).await.unwrap().unwrap();
        assert_eq!(queried.status, "REGISTERED");

        let list = rpc.query_finality_provider_list().await.unwrap();
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn query_unknown_provider_returns_none() {
        let (_manager, rpc) = rpc_impl();
        let result = rpc.query_finality_provider(fpd_primitives::Buf32::zero()).await.unwrap();
        assert!(result.is_none());
    }
}
