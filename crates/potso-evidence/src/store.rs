//! The Evidence Store (spec §4.3 / §6): dedupes by canonical hash and keeps
//! a single insertion-ordered index for `List`.
//!
//! Grounded in the teacher's `docklock-platform/docklock/src/receipt_registry.rs`
//! dedup-and-index pattern, rebuilt on top of the `KvStore` collaborator
//! instead of an in-process map so evidence survives a restart.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use potso_storage::{decode_or_corrupt, KvStore, StorageError};
use potso_types::{Address, EvidenceKind, Hash32};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::record::{Evidence, EvidenceRecord};

const RECORD_PREFIX: &str = "consensus/potso/evidence/record/";
const INDEX_KEY: &[u8] = b"consensus/potso/evidence/index";

#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn record_key(hash: &Hash32) -> Vec<u8> {
    format!("{RECORD_PREFIX}{}", hash.to_hex()).into_bytes()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Index(Vec<Hash32>);

/// Filters applied by `Store.List` (spec §4.3).
#[derive(Debug, Clone, Default)]
pub struct EvidenceFilter {
    pub offender: Option<Address>,
    pub kind: Option<EvidenceKind>,
    /// Inclusive height range; a record matches if any of its heights falls
    /// within `[min, max]`.
    pub height_range: Option<(u64, u64)>,
    pub offset: usize,
    pub limit: usize,
}

impl EvidenceFilter {
    fn matches(&self, record: &EvidenceRecord) -> bool {
        if let Some(offender) = self.offender {
            if record.evidence.offender != offender {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if record.evidence.kind != kind {
                return false;
            }
        }
        if let Some((min, max)) = self.height_range {
            if !record.evidence.heights.iter().any(|h| *h >= min && *h <= max) {
                return false;
            }
        }
        true
    }
}

/// Persists evidence records keyed by canonical hash, with a secondary
/// insertion-ordered index for pagination (spec §2 component 3).
///
/// Mutations (`put`) are serialised by an internal exclusive lock so the
/// check-then-write dedup is atomic; `list` reads the index without it,
/// matching spec §5's "readers acquire a shared lock where available".
pub struct EvidenceStore {
    kv: Arc<dyn KvStore>,
    write_lock: Mutex<()>,
}

impl EvidenceStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    async fn read_index(&self) -> Result<Index, EvidenceError> {
        match self.kv.get(INDEX_KEY).await? {
            Some(bytes) => Ok(decode_or_corrupt(INDEX_KEY, &bytes)?),
            None => Ok(Index::default()),
        }
    }

    /// `Store.Put(hash, evidence, receivedAt)`.
    ///
    /// Returns the stored record and whether this call actually wrote it
    /// (`fresh = false` on a duplicate hash, per spec §8 scenario 7).
    pub async fn put(
        &self,
        hash: Hash32,
        evidence: Evidence,
        received_at: Option<i64>,
    ) -> Result<(EvidenceRecord, bool), EvidenceError> {
        let _guard = self.write_lock.lock().await;
        let key = record_key(&hash);
        if let Some(bytes) = self.kv.get(&key).await? {
            let existing: EvidenceRecord = decode_or_corrupt(&key, &bytes)?;
            return Ok((existing, false));
        }

        let record = EvidenceRecord {
            hash,
            evidence,
            received_at: received_at.unwrap_or_else(unix_now),
        };
        let bytes = serde_json::to_vec(&record).expect("EvidenceRecord serializes");
        self.kv.put(&key, bytes).await?;

        let mut index = self.read_index().await?;
        index.0.push(hash);
        let index_bytes = serde_json::to_vec(&index).expect("Index serializes");
        self.kv.put(INDEX_KEY, index_bytes).await?;

        info!(hash = %hash, offender = %record.evidence.offender, "evidence stored");
        Ok((record, true))
    }

    /// `Store.List(filter)`: walks the index in reverse insertion order,
    /// applies `filter`, then paginates. `next_offset` is `-1` once
    /// exhausted, matching spec §4.3's sentinel.
    pub async fn list(&self, filter: &EvidenceFilter) -> Result<(Vec<EvidenceRecord>, i64), EvidenceError> {
        let index = self.read_index().await?;
        let mut matched = Vec::new();
        for hash in index.0.iter().rev() {
            let key = record_key(hash);
            let bytes = match self.kv.get(&key).await? {
                Some(b) => b,
                None => continue,
            };
            let record: EvidenceRecord = decode_or_corrupt(&key, &bytes)?;
            if filter.matches(&record) {
                matched.push(record);
            }
        }
        let total = matched.len();
        let limit = if filter.limit == 0 { total } else { filter.limit };
        let page: Vec<_> = matched.into_iter().skip(filter.offset).take(limit).collect();
        let consumed = filter.offset + page.len();
        let next_offset = if consumed >= total { -1 } else { consumed as i64 };
        Ok((page, next_offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use potso_crypto::Signature65;
    use potso_storage::MemoryKvStore;
    use potso_types::EvidenceKind;

    fn evidence(offender: u8, heights: Vec<u64>) -> Evidence {
        Evidence {
            kind: EvidenceKind::Equivocation,
            offender: Address([offender; 20]),
            reporter: Address([9u8; 20]),
            heights,
            details: b"x".to_vec(),
            reporter_sig: Signature65([0u8; 65]),
            timestamp: 1,
        }
    }

    #[tokio::test]
    async fn duplicate_put_returns_first_record_unchanged() {
        let store = EvidenceStore::new(Arc::new(MemoryKvStore::new()));
        let hash = Hash32([1u8; 32]);
        let (first, fresh1) = store.put(hash, evidence(1, vec![10]), Some(100)).await.unwrap();
        assert!(fresh1);
        let (second, fresh2) = store.put(hash, evidence(1, vec![20]), Some(200)).await.unwrap();
        assert!(!fresh2);
        assert_eq!(second.received_at, first.received_at);
        assert_eq!(second.evidence.heights, first.evidence.heights);

        let (records, next_offset) = store
            .list(&EvidenceFilter {
                offset: 0,
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(next_offset, -1);
    }

    #[tokio::test]
    async fn list_paginates_in_reverse_insertion_order() {
        let store = EvidenceStore::new(Arc::new(MemoryKvStore::new()));
        for i in 1..=3u8 {
            store
                .put(Hash32([i; 32]), evidence(i, vec![i as u64]), Some(i as i64))
                .await
                .unwrap();
        }
        let (page1, next1) = store
            .list(&EvidenceFilter {
                offset: 0,
                limit: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page1[0].hash, Hash32([3u8; 32]));
        assert_eq!(next1, 2);

        let (page2, next2) = store
            .list(&EvidenceFilter {
                offset: next1 as usize,
                limit: 2,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].hash, Hash32([1u8; 32]));
        assert_eq!(next2, -1);
    }

    #[tokio::test]
    async fn list_filters_by_offender() {
        let store = EvidenceStore::new(Arc::new(MemoryKvStore::new()));
        store.put(Hash32([1u8; 32]), evidence(1, vec![1]), None).await.unwrap();
        store.put(Hash32([2u8; 32]), evidence(2, vec![2]), None).await.unwrap();
        let (records, _) = store
            .list(&EvidenceFilter {
                offender: Some(Address([2u8; 20])),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].evidence.offender, Address([2u8; 20]));
    }
}
