//! In-memory [`ProviderStore`], used pervasively by unit and property
//! tests and available to RPC callers operating in a no-persistence test
//! mode.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use fpd_primitives::{Buf32, ProviderRecord, ProviderStatus};

use crate::error::{Result, StoreError};
use crate::traits::ProviderStore;

#[derive(Default)]
pub struct MemStore {
    records: Mutex<HashMap<Buf32, ProviderRecord>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProviderStore for MemStore {
    async fn put(&self, record: ProviderRecord) -> Result<()> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        if records.contains_key(&record.btc_pk) {
            return Err(StoreError::AlreadyExists(record.btc_pk.to_string()));
        }
        records.insert(record.btc_pk, record);
        Ok(())
    }

    async fn get(&self, btc_pk: &Buf32) -> Result<Option<ProviderRecord>> {
        Ok(self
            .records
            .lock()
            .expect("store mutex poisoned")
            .get(btc_pk)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<ProviderRecord>> {
        Ok(self
            .records
            .lock()
            .expect("store mutex poisoned")
            .values()
            .cloned()
            .collect())
    }

    async fn set_status(&self, btc_pk: &Buf32, status: ProviderStatus) -> Result<()> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        let record = records
            .get_mut(btc_pk)
            .ok_or_else(|| StoreError::NotFound(btc_pk.to_string()))?;
        if !record.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                btc_pk: btc_pk.to_string(),
                from: record.status.to_string(),
                to: status.to_string(),
            });
        }
        record.status = status;
        Ok(())
    }

    async fn set_last_voted_height(&self, btc_pk: &Buf32, height: u64) -> Result<()> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        let record = records
            .get_mut(btc_pk)
            .ok_or_else(|| StoreError::NotFound(btc_pk.to_string()))?;
        if height < record.last_voted_height {
            return Err(StoreError::NotMonotone {
                btc_pk: btc_pk.to_string(),
                field: "last_voted_height",
                current: record.last_voted_height,
                attempted: height,
            });
        }
        record.last_voted_height = height;
        Ok(())
    }

    async fn set_last_processed_height(&self, btc_pk: &Buf32, height: u64) -> Result<()> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        let record = records
            .get_mut(btc_pk)
            .ok_or_else(|| StoreError::NotFound(btc_pk.to_string()))?;
        if height < record.last_processed_height {
            return Err(StoreError::NotMonotone {
                btc_pk: btc_pk.to_string(),
                field: "last_processed_height",
                current: record.last_processed_height,
                attempted: height,
            });
        }
        record.last_processed_height = height;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpd_primitives::{ChainId, ProofOfPossession, Buf64};

    fn sample_record(btc_pk: Buf32) -> ProviderRecord {
        ProviderRecord::new(
            Buf32::zero(),
            btc_pk,
            "key-1".to_string(),
            ChainId::from("test-chain"),
            "a provider".to_string(),
            100,
            ProofOfPossession {
                babylon_sig: Buf64::from([0u8; 64]),
                btc_sig: Buf64::from([0u8; 64]),
            },
        )
    }

    #[tokio::test]
    async fn put_twice_fails_with_already_exists() {
        let store = MemStore::new();
        let record = sample_record(Buf32::from([1u8; 32]));
        store.put(record.clone()).await.unwrap();
        let err = store.put(record).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn height_updates_reject_non_monotone_writes() {
        let store = MemStore::new();
        let pk = Buf32::from([2u8; 32]);
        store.put(sample_record(pk)).await.unwrap();

        store.set_last_processed_height(&pk, 10).await.unwrap();
        let err = store
            .set_last_processed_height(&pk, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotMonotone { .. }));
    }

    #[tokio::test]
    async fn status_transitions_are_validated() {
        let store = MemStore::new();
        let pk = Buf32::from([3u8; 32]);
        store.put(sample_record(pk)).await.unwrap();

        let err = store
            .set_status(&pk, ProviderStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        store
            .set_status(&pk, ProviderStatus::Registered)
            .await
            .unwrap();
        store.set_status(&pk, ProviderStatus::Active).await.unwrap();
    }

    #[tokio::test]
    async fn slashed_is_terminal() {
        let store = MemStore::new();
        let pk = Buf32::from([4u8; 32]);
        store.put(sample_record(pk)).await.unwrap();
        store
            .set_status(&pk, ProviderStatus::Registered)
            .await
            .unwrap();
        store.set_status(&pk, ProviderStatus::Slashed).await.unwrap();

        let err = store
            .set_status(&pk, ProviderStatus::Active)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }
}
