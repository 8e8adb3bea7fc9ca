//! The `ProviderStore` trait: backend-agnostic so the control
//! loop, the supervisor, and the generic test suite never depend on which
//! of [`crate::sled_store::SledStore`] or [`crate::mem::MemStore`] is
//! backing a given provider.

use async_trait::async_trait;
use fpd_primitives::{Buf32, ProviderRecord, ProviderStatus};

use crate::error::Result;

#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// Persists a new record. Fails with [`crate::StoreError::AlreadyExists`]
    /// if `btc_pk` is already present.
    async fn put(&self, record: ProviderRecord) -> Result<()>;

    async fn get(&self, btc_pk: &Buf32) -> Result<Option<ProviderRecord>>;

    async fn list(&self) -> Result<Vec<ProviderRecord>>;

    /// Updates `status`, enforcing the allowed lifecycle transitions (see
    /// [`ProviderStatus::can_transition_to`]).
    async fn set_status(&self, btc_pk: &Buf32, status: ProviderStatus) -> Result<()>;

    /// Updates `last_voted_height`, rejecting any value less than the
    /// current one.
    async fn set_last_voted_height(&self, btc_pk: &Buf32, height: u64) -> Result<()>;

    /// Updates `last_processed_height`, rejecting any value less than the
    /// current one.
    async fn set_last_processed_height(&self, btc_pk: &Buf32, height: u64) -> Result<()>;
}
