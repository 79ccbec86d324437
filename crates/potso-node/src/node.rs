//! The composition root (spec §2: "these parts are tightly coupled ...
//! proposer selection reads weights; penalties mutate weights; rewards
//! consume weights"): one object wiring the Weight Ledger, Penalty Engine,
//! Evidence Store, Reward Distributor/Ledger, and (optionally) the BFT
//! Engine behind the event sink.
//!
//! This is deliberately thin — every real rule lives in the sub-crates; this
//! module only owns construction and the handful of cross-cutting calls
//! (apply a penalty and announce it; distribute an epoch and announce it)
//! that the spec's control-flow diagram in §2 ties together.

use std::sync::Arc;

use potso_consensus::{BftEngine, BftEngineConfig, BlockExecutor, Broadcaster};
use potso_crypto::Signer;
use potso_evidence::{validate, Evidence, EvidenceFilter, EvidenceRecord, EvidenceStore, HeightLookup, RejectReason};
use potso_rewards::{distribute, DistributionOutcome, PaidRef, RewardLedger, RoundingBucket};
use potso_storage::KvStore;
use potso_types::{Address, Amount};
use potso_weights::{PenaltyCatalog, PenaltyContext, PenaltyEngine, PenaltyInput, Slasher, WeightLedger};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::events::{PotsoEventSink, RewardsPaidEvent, RewardsReadyEvent};

/// The assembled POTSO core: every component from spec §2 except the BFT
/// Engine, which is optional (it additionally needs a `BlockExecutor`,
/// `Broadcaster`, `Signer`, and this node's own address, none of which are
/// required just to ingest evidence or run rewards).
pub struct PotsoNode {
    pub weight_ledger: Arc<WeightLedger>,
    pub penalty_engine: PenaltyEngine,
    pub evidence_store: EvidenceStore,
    pub reward_ledger: RewardLedger,
    pub reward_bucket: RoundingBucket,
    pub config: NodeConfig,
    event_sink: Arc<dyn PotsoEventSink>,
}

impl PotsoNode {
    /// Builds the Weight Ledger and Penalty Catalog from `config`
    /// (validated already by `NodeConfig::validate`), and the Evidence Store
    /// / Reward Ledger over the shared `kv` collaborator.
    pub fn new(config: NodeConfig, kv: Arc<dyn KvStore>, event_sink: Arc<dyn PotsoEventSink>) -> Result<Self, NodeError> {
        config.validate()?;

        let weight_ledger = Arc::new(WeightLedger::new(
            Amount::from_u64(config.weight_bounds.floor),
            Amount::from_u64(config.weight_bounds.ceiling),
        )?);

        let catalog = PenaltyCatalog::new(config.penalties.slash_enabled)
            .with_equivocation(config.equivocation_config())?
            .with_downtime(config.downtime_config())?
            .with_invalid_proposal(config.invalid_proposal_config())?;
        let penalty_engine = PenaltyEngine::new(catalog);

        Ok(Self {
            weight_ledger,
            penalty_engine,
            evidence_store: EvidenceStore::new(kv.clone()),
            reward_ledger: RewardLedger::new(kv),
            reward_bucket: RoundingBucket::new(),
            config,
            event_sink,
        })
    }

    /// Validates and stores a piece of evidence (spec §4.3); returns the
    /// stored record plus whether this call actually wrote it, or the
    /// stable `RejectReason` tag on rejection (spec §7: "acknowledged with a
    /// `Rejected` receipt carrying the reason tag").
    pub async fn ingest_evidence(
        &self,
        evidence: Evidence,
        current_height: u64,
        height_lookup: Option<&dyn HeightLookup>,
        received_at: Option<i64>,
    ) -> Result<(EvidenceRecord, bool), NodeError> {
        let hash = potso_evidence::canonical_hash(&evidence);
        validate(&evidence, &hash, current_height, self.config.evidence.max_age_blocks, height_lookup)
            .map_err(NodeError::from)?;
        self.evidence_store
            .put(hash, evidence, received_at)
            .await
            .map_err(NodeError::from)
    }

    /// Applies the penalty rule for a stored evidence record's kind (spec
    /// §4.2 `Apply`), using the evidence store's insertion order as the
    /// resolution for the spec §9 open question on same-block application
    /// order (callers iterate `EvidenceStore::list` and apply in that
    /// order). Emits `potso.penalty.applied` on success.
    pub fn apply_penalty(
        &self,
        record: &EvidenceRecord,
        block: u64,
        missed_epochs: u64,
        base_override: Option<Amount>,
        slasher: Option<&dyn Slasher>,
    ) -> Result<potso_weights::PenaltyOutcome, NodeError> {
        let input = PenaltyInput {
            hash: record.hash,
            kind: record.evidence.kind,
            offender: record.evidence.offender,
            missed_epochs,
            block,
        };
        let outcome = self.penalty_engine.apply(
            &self.weight_ledger,
            input,
            PenaltyContext { base_override, slasher },
        )?;
        self.event_sink.on_penalty_applied(&outcome.event);
        Ok(outcome)
    }

    /// Pages through the Evidence Store for a given offender and kind, for
    /// callers implementing the spec §9 "apply in insertion order" choice.
    pub async fn list_evidence(&self, filter: &EvidenceFilter) -> Result<(Vec<EvidenceRecord>, i64), NodeError> {
        self.evidence_store.list(filter).await.map_err(NodeError::from)
    }

    /// Snapshot of every validator's current weight, ordered by address
    /// (spec §4.1 / §9 determinism surface) — the input both the Reward
    /// Distributor and a `BftEngine`'s proposer selection consume.
    pub fn weight_snapshot(&self) -> std::collections::BTreeMap<Address, Amount> {
        self.weight_ledger.snapshot()
    }

    /// Computes and persists one epoch's reward distribution (spec §4.6),
    /// emitting `potso.rewards.ready`.
    pub async fn distribute_epoch(
        &self,
        epoch: u64,
        pool: Amount,
        weights: &[(Address, Amount)],
        now: i64,
    ) -> Result<DistributionOutcome, NodeError> {
        let outcome = distribute(epoch, pool, weights, &self.reward_bucket);
        let entries = self.reward_ledger.record_distribution(&outcome, now).await?;
        self.event_sink.on_rewards_ready(&RewardsReadyEvent { epoch, entries });
        Ok(outcome)
    }

    /// Marks a set of reward references Paid (spec §4.6 `MarkPaid`),
    /// emitting `potso.rewards.paid` for the call.
    pub async fn mark_rewards_paid(
        &self,
        epoch: u64,
        refs: &[PaidRef],
        tx_ref: String,
        actor: Address,
        paid_at: i64,
    ) -> Result<Vec<potso_rewards::RewardEntry>, NodeError> {
        let entries = self.reward_ledger.mark_paid(epoch, refs, tx_ref, actor, paid_at).await?;
        self.event_sink.on_rewards_paid(&RewardsPaidEvent { epoch, entries: entries.clone() });
        Ok(entries)
    }

    /// Starts the BFT Engine over this node's Weight Ledger (spec §4.5),
    /// given the Block Executor / Broadcaster / Signer collaborators the
    /// engine is driven by (spec §6). Returns the engine handle; callers
    /// call `start_new_round` on it to begin consensus at `height`.
    pub fn bft_engine(
        &self,
        executor: Arc<dyn BlockExecutor>,
        broadcaster: Arc<dyn Broadcaster>,
        signer: Arc<dyn Signer>,
        self_address: Address,
        height: u64,
    ) -> Result<Arc<BftEngine>, NodeError> {
        let engine_config: BftEngineConfig = self.config.bft_engine_config();
        BftEngine::new(engine_config, self.weight_ledger.clone(), executor, broadcaster, signer, self_address, height)
            .map_err(NodeError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventSink;
    use potso_crypto::Signature65;
    use potso_storage::MemoryKvStore;
    use potso_types::EvidenceKind;

    fn node() -> PotsoNode {
        PotsoNode::new(NodeConfig::default(), Arc::new(MemoryKvStore::new()), Arc::new(NoopEventSink)).unwrap()
    }

    fn evidence(offender: Address) -> Evidence {
        Evidence {
            kind: EvidenceKind::Equivocation,
            offender,
            reporter: Address([9u8; 20]),
            heights: vec![1, 2],
            details: b"conflict".to_vec(),
            reporter_sig: Signature65([0u8; 65]),
            timestamp: 1,
        }
    }

    #[tokio::test]
    async fn ingest_evidence_rejects_unsigned_evidence() {
        let node = node();
        let err = node
            .ingest_evidence(evidence(Address([1u8; 20])), 100, None, Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::EvidenceRejected(RejectReason::InvalidSignature)));
    }

    #[tokio::test]
    async fn distribute_and_mark_paid_round_trip() {
        let node = node();
        let weights = vec![(Address([1u8; 20]), Amount::from_u64(5))];
        let outcome = node.distribute_epoch(1, Amount::from_u64(10), &weights, 100).await.unwrap();
        assert_eq!(outcome.shares.len(), 1);

        let refs = vec![PaidRef { address: Address([1u8; 20]), amount: outcome.shares[0].amount.clone() }];
        let paid = node
            .mark_rewards_paid(1, &refs, "tx-1".into(), Address([2u8; 20]), 200)
            .await
            .unwrap();
        assert_eq!(paid[0].status, potso_rewards::RewardStatus::Paid);
    }

    #[test]
    fn weight_snapshot_is_empty_for_a_fresh_node() {
        let node = node();
        assert!(node.weight_snapshot().is_empty());
    }
}
