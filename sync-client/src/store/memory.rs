//! In-memory store backend.
//!
//! Keeps every record in a single ordered map guarded by an async mutex.
//! Transactions stage their writes locally and hold the map lock until
//! commit or drop, which gives the single-writer guarantee the
//! [`StoreBackend`] contract asks for. Used by tests and by applications
//! that do not need persistence across restarts.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{StoreBackend, StoreError, StoreTxn};

type Records = BTreeMap<Vec<u8>, Vec<u8>>;

/// Volatile [`StoreBackend`] over a shared ordered map.
///
/// Clones share the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<Records>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTxn>, StoreError> {
        let data = Arc::clone(&self.data).lock_owned().await;
        Ok(Box::new(MemoryTxn {
            data,
            staged: BTreeMap::new(),
        }))
    }
}

/// Staged writes on top of the locked map. `None` marks a delete.
struct MemoryTxn {
    data: OwnedMutexGuard<Records>,
    staged: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

#[async_trait]
impl StoreTxn for MemoryTxn {
    async fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(staged) = self.staged.get(key) {
            return Ok(staged.clone());
        }
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.staged.insert(key, Some(value));
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.staged.insert(key, None);
    }

    async fn scan(&mut self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut merged: Records = self
            .data
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let staged = self
            .staged
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix));
        for (key, value) in staged {
            match value {
                Some(value) => merged.insert(key.clone(), value.clone()),
                None => merged.remove(key),
            };
        }

        Ok(merged.into_iter().collect())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        for (key, value) in std::mem::take(&mut self.staged) {
            match value {
                Some(value) => self.data.insert(key, value),
                None => self.data.remove(&key),
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn staged_writes_visible_within_transaction() {
        let store = MemoryStore::new();
        let mut txn = store.begin().await.unwrap();

        txn.put(b"k".to_vec(), b"v".to_vec());
        assert_eq!(txn.get(b"k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn staged_delete_hides_committed_value() {
        let store = MemoryStore::new();
        let mut txn = store.begin().await.unwrap();
        txn.put(b"k".to_vec(), b"v".to_vec());
        txn.commit().await.unwrap();

        let mut txn = store.begin().await.unwrap();
        txn.delete(b"k".to_vec());
        assert_eq!(txn.get(b"k").await.unwrap(), None);
        assert!(txn.scan(b"k").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scan_merges_staged_over_committed() {
        let store = MemoryStore::new();
        let mut txn = store.begin().await.unwrap();
        txn.put(b"a/1".to_vec(), b"old".to_vec());
        txn.put(b"a/2".to_vec(), b"keep".to_vec());
        txn.put(b"b/1".to_vec(), b"other".to_vec());
        txn.commit().await.unwrap();

        let mut txn = store.begin().await.unwrap();
        txn.put(b"a/1".to_vec(), b"new".to_vec());
        txn.put(b"a/3".to_vec(), b"added".to_vec());

        let scanned = txn.scan(b"a/").await.unwrap();
        assert_eq!(
            scanned,
            vec![
                (b"a/1".to_vec(), b"new".to_vec()),
                (b"a/2".to_vec(), b"keep".to_vec()),
                (b"a/3".to_vec(), b"added".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn drop_without_commit_discards_staged() {
        let store = MemoryStore::new();
        let mut txn = store.begin().await.unwrap();
        txn.put(b"k".to_vec(), b"v".to_vec());
        drop(txn);

        let mut txn = store.begin().await.unwrap();
        assert_eq!(txn.get(b"k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn second_transaction_waits_for_first() {
        let store = MemoryStore::new();
        let txn = store.begin().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), store.begin()).await;
        assert!(blocked.is_err());

        drop(txn);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), store.begin())
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn clones_share_data() {
        let store = MemoryStore::new();
        let clone = store.clone();

        let mut txn = store.begin().await.unwrap();
        txn.put(b"k".to_vec(), b"v".to_vec());
        txn.commit().await.unwrap();

        let mut txn = clone.begin().await.unwrap();
        assert_eq!(txn.get(b"k").await.unwrap(), Some(b"v".to_vec()));
    }
}
