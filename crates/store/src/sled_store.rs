//! `sled`-backed [`ProviderStore`], the daemon's default persistence
//! backend.
//!
//! Records are `bincode`-encoded and kept in a single tree keyed by the raw
//! 32-byte `btc_pk`. Height and status updates go through `sled`'s atomic
//! compare-and-swap so a concurrent writer never observes a torn update and
//! a stale `current` value can't race past the monotonicity check.

use async_trait::async_trait;
use fpd_primitives::{Buf32, ProviderRecord, ProviderStatus};
use sled::{CompareAndSwapError, Db, Tree};

use crate::error::{Result, StoreError};
use crate::traits::ProviderStore;

const PROVIDERS_TREE: &str = "fpd_providers";

pub struct SledStore {
    tree: Tree,
}

impl SledStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let db = sled::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        Self::from_db(&db)
    }

    pub fn from_db(db: &Db) -> Result<Self> {
        let tree = db
            .open_tree(PROVIDERS_TREE)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { tree })
    }

    fn encode(record: &ProviderRecord) -> Result<Vec<u8>> {
        bincode::serialize(record).map_err(|e| StoreError::Encoding(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<ProviderRecord> {
        bincode::deserialize(bytes).map_err(|e| StoreError::Encoding(e.to_string()))
    }

    /// Reads, mutates, and atomically writes back a record, retrying on
    /// concurrent-write conflicts. `mutate` returns a [`StoreError`] to
    /// abort the update (e.g. a monotonicity violation) without retrying.
    fn read_modify_write(
        &self,
        btc_pk: &Buf32,
        mutate: impl Fn(&mut ProviderRecord) -> Result<()>,
    ) -> Result<()> {
        loop {
            let key = btc_pk.as_bytes().as_slice();
            let current = self
                .tree
                .get(key)
                .map_err(|e| StoreError::Backend(e.to_string()))?
                .ok_or_else(|| StoreError::NotFound(btc_pk.to_string()))?;

            let mut record = Self::decode(&current)?;
            mutate(&mut record)?;
            let next = Self::encode(&record)?;

            match self.tree.compare_and_swap(key, Some(current.as_ref()), Some(next)) {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(CompareAndSwapError { .. })) => continue,
                Err(e) => return Err(StoreError::Backend(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl ProviderStore for SledStore {
    async fn put(&self, record: ProviderRecord) -> Result<()> {
        let key = *record.btc_pk.as_bytes();
        let encoded = Self::encode(&record)?;
        let result = self
            .tree
            .compare_and_swap(key, None::<Vec<u8>>, Some(encoded))
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        result.map_err(|_| StoreError::AlreadyExists(record.btc_pk.to_string()))
    }

    async fn get(&self, btc_pk: &Buf32) -> Result<Option<ProviderRecord>> {
        match self
            .tree
            .get(btc_pk.as_bytes().as_slice())
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<ProviderRecord>> {
        self.tree
            .iter()
            .map(|res| {
                let (_key, value) = res.map_err(|e| StoreError::Backend(e.to_string()))?;
                Self::decode(&value)
            })
            .collect()
    }

    async fn set_status(&self, btc_pk: &Buf32, status: ProviderStatus) -> Result<()> {
        self.read_modify_write(btc_pk, |record| {
            if !record.status.can_transition_to(status) {
                return Err(StoreError::InvalidTransition {
                    btc_pk: btc_pk.to_string(),
                    from: record.status.to_string(),
                    to: status.to_string(),
                });
            }
            record.status = status;
            Ok(())
        })
    }

    async fn set_last_voted_height(&self, btc_pk: &Buf32, height: u64) -> Result<()> {
        self.read_modify_write(btc_pk, |record| {
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
        })
    }

    async fn set_last_processed_height(&self, btc_pk: &Buf32, height: u64) -> Result<()> {
        self.read_modify_write(btc_pk, |record| {
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
        })
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

    fn temp_store() -> (tempfile::TempDir, SledStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SledStore::open(dir.path()).expect("open sled store");
        (dir, store)
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let (_dir, store) = temp_store();
        let pk = Buf32::from([9u8; 32]);
        store.put(sample_record(pk)).await.unwrap();
        let fetched = store.get(&pk).await.unwrap().expect("present");
        assert_eq!(fetched.btc_pk, pk);
    }

    #[tokio::test]
    async fn second_put_fails_with_already_exists() {
        let (_dir, store) = temp_store();
        let pk = Buf32::from([1u8; 32]);
        store.put(sample_record(pk)).await.unwrap();
        let err = store.put(sample_record(pk)).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn rejects_non_monotone_height_update() {
        let (_dir, store) = temp_store();
        let pk = Buf32::from([2u8; 32]);
        store.put(sample_record(pk)).await.unwrap();
        store.set_last_voted_height(&pk, 20).await.unwrap();
        let err = store.set_last_voted_height(&pk, 10).await.unwrap_err();
        assert!(matches!(err, StoreError::NotMonotone { .. }));
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pk = Buf32::from([5u8; 32]);
        {
            let store = SledStore::open(dir.path()).expect("open");
            store.put(sample_record(pk)).await.unwrap();
            store.set_last_processed_height(&pk, 42).await.unwrap();
        }
        let store = SledStore::open(dir.path()).expect("reopen");
        let record = store.get(&pk).await.unwrap().expect("present");
        assert_eq!(record.last_processed_height, 42);
    }
}
