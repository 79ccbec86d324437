//! The persisted Reward Ledger (spec §4.6 step 6, §6 "Persisted state
//! layout"): durable, idempotent reward entries plus an insertion-ordered
//! index, and the `MarkPaid` Ready -> Paid transition.
//!
//! Grounded in the teacher's `bpi-validator-set` reward-ledger persistence
//! (itself modeled on `potso-evidence::store`'s dedup-and-index pattern, see
//! that crate's module doc), swapped onto the `epoch/address`-keyed layout
//! spec'd here instead of a single canonical-hash key.

use std::sync::Arc;

use potso_storage::{decode_or_corrupt, KvStore, StorageError};
use potso_types::{Address, Amount, Hash32};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::distributor::DistributionOutcome;

const RECORD_PREFIX: &str = "consensus/potso/rewards/";
const INDEX_KEY: &[u8] = b"consensus/potso/rewards/index";

#[derive(Error, Debug)]
pub enum RewardError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("no reward entry for epoch {epoch} address {address}")]
    UnknownEntry { epoch: u64, address: Address },
    #[error("paid amount {expected} does not match stored amount {got} for epoch {epoch} address {address}")]
    AmountMismatch {
        epoch: u64,
        address: Address,
        expected: String,
        got: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardStatus {
    Ready,
    Paid,
}

/// `RewardEntry` (spec §3), one per `(epoch, address)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEntry {
    pub epoch: u64,
    pub address: Address,
    pub amount: Amount,
    pub currency: String,
    pub status: RewardStatus,
    pub checksum: Hash32,
    pub generated_at: i64,
    pub updated_at: i64,
    pub paid_at: Option<i64>,
    pub paid_by: Option<Address>,
    pub tx_ref: Option<String>,
}

/// `checksum = sha256(BE-u64(epoch) || addr || amount.decimalString())`.
fn checksum(epoch: u64, address: &Address, amount: &Amount) -> Hash32 {
    let mut buf = Vec::with_capacity(8 + 20 + 32);
    buf.extend_from_slice(&epoch.to_be_bytes());
    buf.extend_from_slice(&address.0);
    buf.extend_from_slice(amount.decimal_string().as_bytes());
    Hash32(potso_crypto::sha256(&buf))
}

fn record_key(epoch: u64, address: &Address) -> Vec<u8> {
    format!("{RECORD_PREFIX}{epoch:020}/{}", address.to_hex()).into_bytes()
}

/// One reference in a `MarkPaid` call: the address being paid and the exact
/// amount the caller believes was owed, matched against the stored entry
/// before the transition is applied (spec §4.6: "match the stored amount
/// exactly").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaidRef {
    pub address: Address,
    pub amount: Amount,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Index(Vec<(u64, Address)>);

/// Persists `RewardEntry` records keyed by `(epoch, address)`, with a
/// secondary insertion-ordered index mirroring `potso-evidence::EvidenceStore`.
pub struct RewardLedger {
    kv: Arc<dyn KvStore>,
    write_lock: Mutex<()>,
}

impl RewardLedger {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    async fn read_index(&self) -> Result<Index, RewardError> {
        match self.kv.get(INDEX_KEY).await? {
            Some(bytes) => Ok(decode_or_corrupt(INDEX_KEY, &bytes)?),
            None => Ok(Index::default()),
        }
    }

    async fn read_entry(&self, epoch: u64, address: &Address) -> Result<Option<RewardEntry>, RewardError> {
        let key = record_key(epoch, address);
        match self.kv.get(&key).await? {
            Some(bytes) => Ok(Some(decode_or_corrupt(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_entry(&self, entry: &RewardEntry) -> Result<(), RewardError> {
        let key = record_key(entry.epoch, &entry.address);
        let bytes = serde_json::to_vec(entry).expect("RewardEntry serializes");
        self.kv.put(&key, bytes).await?;
        Ok(())
    }

    /// Persists every share of a `DistributionOutcome` as a `Ready` entry
    /// (spec §4.6 step 6). Idempotent: an existing entry for `(epoch,
    /// address)` is left untouched (preserving its `generatedAt` and any
    /// `Paid` status) rather than overwritten by a repeated call with the
    /// same distribution.
    pub async fn record_distribution(
        &self,
        outcome: &DistributionOutcome,
        now: i64,
    ) -> Result<Vec<RewardEntry>, RewardError> {
        let _guard = self.write_lock.lock().await;
        let mut index = self.read_index().await?;
        let mut entries = Vec::with_capacity(outcome.shares.len());
        for share in &outcome.shares {
            if let Some(existing) = self.read_entry(outcome.epoch, &share.address).await? {
                entries.push(existing);
                continue;
            }
            let entry = RewardEntry {
                epoch: outcome.epoch,
                address: share.address,
                amount: share.amount.clone(),
                currency: "POTSO".to_string(),
                status: RewardStatus::Ready,
                checksum: checksum(outcome.epoch, &share.address, &share.amount),
                generated_at: now,
                updated_at: now,
                paid_at: None,
                paid_by: None,
                tx_ref: None,
            };
            self.write_entry(&entry).await?;
            index.0.push((outcome.epoch, share.address));
            entries.push(entry);
        }
        let index_bytes = serde_json::to_vec(&index).expect("Index serializes");
        self.kv.put(INDEX_KEY, index_bytes).await?;
        info!(epoch = outcome.epoch, count = entries.len(), "reward entries recorded");
        Ok(entries)
    }

    /// `MarkPaid(epoch, refs, txRef, actor, paidAt)`: Ready -> Paid for each
    /// reference whose claimed amount matches the stored entry exactly.
    /// Already-`Paid` entries are returned unchanged (idempotent on repeat).
    pub async fn mark_paid(
        &self,
        epoch: u64,
        refs: &[PaidRef],
        tx_ref: String,
        actor: Address,
        paid_at: i64,
    ) -> Result<Vec<RewardEntry>, RewardError> {
        let _guard = self.write_lock.lock().await;
        let mut out = Vec::with_capacity(refs.len());
        for r in refs {
            let mut entry = self
                .read_entry(epoch, &r.address)
                .await?
                .ok_or(RewardError::UnknownEntry { epoch, address: r.address })?;
            if entry.amount != r.amount {
                return Err(RewardError::AmountMismatch {
                    epoch,
                    address: r.address,
                    expected: r.amount.decimal_string(),
                    got: entry.amount.decimal_string(),
                });
            }
            if entry.status == RewardStatus::Paid {
                out.push(entry);
                continue;
            }
            entry.status = RewardStatus::Paid;
            entry.paid_at = Some(paid_at);
            entry.paid_by = Some(actor);
            entry.tx_ref = Some(tx_ref.clone());
            entry.updated_at = paid_at;
            entry.checksum = checksum(epoch, &entry.address, &entry.amount);
            self.write_entry(&entry).await?;
            info!(epoch, address = %entry.address, "reward marked paid");
            out.push(entry);
        }
        Ok(out)
    }

    pub async fn get(&self, epoch: u64, address: &Address) -> Result<Option<RewardEntry>, RewardError> {
        self.read_entry(epoch, address).await
    }
}
