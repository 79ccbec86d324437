//! The KV Store collaborator (spec §6): an ordered, byte-keyed, byte-valued
//! store with atomic single-key put.
//!
//! This crate is the one place the core touches persistence directly; the
//! evidence store and reward ledger are the only callers. Adapted from the
//! teacher's `shared/crates/storage` `StorageBackend` trait, narrowed to the
//! `Get`/`Put`/`Delete` surface spec'd in §6 and extended with ordered
//! prefix iteration (needed by the evidence index and the reward index).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt value at key {0}")]
    Corrupt(String),
}

/// Ordered, byte-keyed, byte-valued, transactional-read/write collaborator.
///
/// Implementations must guarantee that a single `put` is atomic; the core
/// never holds a lock across a `put` call (spec §5: "No operation is
/// permitted to hold a lock across I/O beyond the KV store's own atomic
/// put").
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError>;
    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StorageError>;
    async fn delete(&self, key: &[u8]) -> Result<(), StorageError>;

    /// All key/value pairs whose key starts with `prefix`, in ascending key
    /// order. Used for the evidence and reward secondary indexes.
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError>;
}

/// In-memory store, backed by a `BTreeMap` for deterministic ordered scans.
/// Used in tests and as the default for embedding contexts that snapshot
/// state externally rather than persisting it.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StorageError> {
        let mut data = self.data.write().await;
        data.insert(key.to_vec(), value);
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        let mut data = self.data.write().await;
        data.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let data = self.data.read().await;
        Ok(data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// Sled-backed persistent store, for nodes that want evidence/reward state
/// to survive restarts.
pub struct SledKvStore {
    db: sled::Db,
}

impl SledKvStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(Self { db })
    }
}

#[async_trait::async_trait]
impl KvStore for SledKvStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        self.db
            .get(key)
            .map(|opt| opt.map(|ivec| ivec.to_vec()))
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }

    async fn put(&self, key: &[u8], value: Vec<u8>) -> Result<(), StorageError> {
        self.db
            .insert(key, value)
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        self.db
            .flush_async()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.db
            .remove(key)
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (k, v) = item.map_err(|e| StorageError::Unavailable(e.to_string()))?;
            out.push((k.to_vec(), v.to_vec()));
        }
        debug!(count = out.len(), "scanned prefix");
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

/// Best-effort helper: deserialize a value, logging and surfacing a
/// `StorageError::Corrupt` rather than panicking, since evidence/reward
/// records persisted by a previous binary version should never crash the
/// node that reads them back.
pub fn decode_or_corrupt<T: serde::de::DeserializeOwned>(
    key: &[u8],
    bytes: &[u8],
) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| {
        warn!(key = %hex::encode(key), error = %e, "failed to decode stored value");
        StorageError::Corrupt(hex::encode(key))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_get_put_delete_roundtrip() {
        let store = MemoryKvStore::new();
        assert_eq!(store.get(b"k").await.unwrap(), None);
        store.put(b"k", b"v".to_vec()).await.unwrap();
        assert_eq!(store.get(b"k").await.unwrap(), Some(b"v".to_vec()));
        store.delete(b"k").await.unwrap();
        assert_eq!(store.get(b"k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_store_scan_prefix_is_ordered_and_bounded() {
        let store = MemoryKvStore::new();
        store.put(b"evidence/b", b"2".to_vec()).await.unwrap();
        store.put(b"evidence/a", b"1".to_vec()).await.unwrap();
        store.put(b"rewards/a", b"3".to_vec()).await.unwrap();
        let scanned = store.scan_prefix(b"evidence/").await.unwrap();
        assert_eq!(
            scanned,
            vec![
                (b"evidence/a".to_vec(), b"1".to_vec()),
                (b"evidence/b".to_vec(), b"2".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn sled_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledKvStore::open(dir.path()).unwrap();
            store.put(b"k", b"v".to_vec()).await.unwrap();
        }
        let reopened = SledKvStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get(b"k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn sled_store_scan_prefix_is_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledKvStore::open(dir.path()).unwrap();
        store.put(b"idx/2", b"b".to_vec()).await.unwrap();
        store.put(b"idx/1", b"a".to_vec()).await.unwrap();
        let scanned = store.scan_prefix(b"idx/").await.unwrap();
        assert_eq!(
            scanned,
            vec![(b"idx/1".to_vec(), b"a".to_vec()), (b"idx/2".to_vec(), b"b".to_vec())]
        );
    }

    #[test]
    fn decode_or_corrupt_surfaces_a_storage_error_on_bad_bytes() {
        let result: Result<String, StorageError> = decode_or_corrupt(b"key", b"not valid json {{{");
        assert!(matches!(result, Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn decode_or_corrupt_decodes_valid_json() {
        let bytes = serde_json::to_vec(&"hello".to_string()).unwrap();
        let result: Result<String, StorageError> = decode_or_corrupt(b"key", &bytes);
        assert_eq!(result.unwrap(), "hello");
    }
}
