//! The JSON-RPC surface: a thin routing layer over
//! [`fpd_app::FinalityProviderApp`] that performs no business logic of its
//! own.

use fpd_primitives::{Buf32, ProviderRecord};
use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use serde::{Deserialize, Serialize};

/// `GetInfo` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub version: String,
    pub running_instances: usize,
}

/// Read-model of a [`ProviderRecord`], with `status` serialized as its
/// variant name rather than as an integer discriminant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRecordView {
    pub babylon_pk: Buf32,
    pub btc_pk: Buf32,
    pub key_name: String,
    pub chain_id: String,
    pub description: String,
    pub commission: u32,
    pub last_voted_height: u64,
    pub last_processed_height: u64,
    pub status: String,
}

impl From<ProviderRecord> for ProviderRecordView {
    fn from(r: ProviderRecord) -> Self {
        Self {
            babylon_pk: r.babylon_pk,
            btc_pk: r.btc_pk,
            key_name: r.key_name,
            chain_id: r.chain_id.to_string(),
            description: r.description,
            commission: r.commission,
            last_voted_height: r.last_voted_height,
            last_processed_height: r.last_processed_height,
            status: r.status.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxResponseView {
    pub tx_hash: String,
}

/// `AddFinalitySignature` response. Reports whether a conflicting earlier
/// vote's extracted secret key matches our own as `matches_local_key`: a
/// boolean rather than the literal secret, since the signer boundary never
/// exposes raw key material outside itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalitySignatureResponse {
    pub tx_hash: Option<String>,
    pub extracted_sk_hex: Option<Buf32>,
    pub matches_local_key: bool,
}

#[rpc(server)]
pub trait FinalityProviderRpc {
    #[method(name = "GetInfo")]
    async fn get_info(&self) -> RpcResult<InfoResponse>;

    #[method(name = "CreateFinalityProvider")]
    async fn create_finality_provider(
        &self,
        key_name: String,
        hd_path: String,
        description: String,
        commission: u32,
    ) -> RpcResult<ProviderRecordView>;

    #[method(name = "RegisterFinalityProvider")]
    async fn register_finality_provider(&self, btc_pk: Buf32) -> RpcResult<TxResponseView>;

    #[method(name = "StartHandlingFinalityProvider")]
    async fn start_handling_finality_provider(&self, btc_pk: Buf32) -> RpcResult<()>;

    #[method(name = "StartHandlingAll")]
    async fn start_handling_all(&self) -> RpcResult<()>;

    #[method(name = "AddFinalitySignature")]
    async fn add_finality_signature(
        &self,
        btc_pk: Buf32,
        height: u64,
        block_hash: Buf32,
    ) -> RpcResult<FinalitySignatureResponse>;

    #[method(name = "QueryFinalityProvider")]
    async fn query_finality_provider(&self, btc_pk: Buf32) -> RpcResult<Option<ProviderRecordView>>;

    #[method(name = "QueryFinalityProviderList")]
    async fn query_finality_provider_list(&self) -> RpcResult<Vec<ProviderRecordView>>;
}
