//! External collaborators the BFT engine is driven by (spec §6): the Block
//! Executor and the Broadcaster. The Signer collaborator lives in
//! `potso-crypto`; the KV Store collaborator lives in `potso-storage`.
//!
//! Grounded in the teacher's inversion-of-control style for
//! `StorageBackend`/`KvStore` (async_trait + `Arc<dyn Trait>`), applied here
//! to the block-production and network-broadcast seams so the engine never
//! calls back into a scheduler it doesn't own (spec §9 redesign flag:
//! "invert the dependency").

use std::collections::BTreeMap;

use async_trait::async_trait;
use potso_types::{Address, Amount, Hash32};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wire::{SignedProposal, SignedVote};

#[derive(Error, Debug, Clone)]
pub enum ExecutorError {
    #[error("block executor rejected the operation: {0}")]
    Failed(String),
}

/// `{stake, engagementScore}` as returned by `GetAccount` (spec §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub stake: Amount,
    pub engagement_score: Amount,
}

/// A block as the engine sees it: opaque transaction payloads plus enough
/// structure to compute a canonical hash for voting on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub previous_hash: Hash32,
    pub transactions: Vec<Vec<u8>>,
}

impl Block {
    pub fn hash(&self) -> Hash32 {
        let mut buf = Vec::with_capacity(8 + 32 + 4);
        buf.extend_from_slice(&self.height.to_be_bytes());
        buf.extend_from_slice(&self.previous_hash.0);
        buf.extend_from_slice(&(self.transactions.len() as u32).to_be_bytes());
        for tx in &self.transactions {
            buf.extend_from_slice(&(tx.len() as u32).to_be_bytes());
            buf.extend_from_slice(tx);
        }
        Hash32(potso_crypto::blake3_256(&buf))
    }
}

/// `Block Executor` collaborator (spec §6). The engine only ever calls
/// outward into this trait; it never holds a reference back into whatever
/// scheduler produced it.
#[async_trait]
pub trait BlockExecutor: Send + Sync {
    async fn create_block(&self, txs: Vec<Vec<u8>>) -> Result<Block, ExecutorError>;
    /// A non-fatal rejection here triggers the Prevote(nil) recovery path
    /// (spec §4.5 Commit state); it must never advance height.
    async fn commit_block(&self, block: &Block) -> Result<(), ExecutorError>;
    async fn get_mempool(&self) -> Vec<Vec<u8>>;
    async fn get_validator_set(&self) -> BTreeMap<Address, Amount>;
    async fn get_account(&self, addr: &Address) -> Result<AccountInfo, ExecutorError>;
}

/// Opaque, deterministically-encodable payload handed to the Broadcaster
/// (spec §6: "message carries a type tag and an opaque payload").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BroadcastMessage {
    Proposal(SignedProposal),
    Vote(SignedVote),
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn broadcast(&self, message: BroadcastMessage);
}

/// A `Broadcaster` that drops every message, for single-node tests and for
/// embedding contexts where the transport lives entirely outside this
/// crate's test scope.
pub struct NoopBroadcaster;

#[async_trait]
impl Broadcaster for NoopBroadcaster {
    async fn broadcast(&self, _message: BroadcastMessage) {}
}
