//! The BFT Engine driver (spec §4.5): owns `CoreState` behind a lock,
//! reacts to externally-delivered votes/proposals, and runs the
//! timeout-driven phase fallback as a background task per round.
//!
//! Grounded in the teacher's `bpi-math::consensus_integration` driver
//! pattern (an `Arc<RwLock<State>>` mutated both by inbound messages and by
//! a background task), adapted to the weighted quorum and five-state table
//! of spec §4.5 instead of the teacher's action-queue model.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use potso_crypto::Signer;
use potso_types::{Address, Amount};
use potso_weights::WeightLedger;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::collaborators::{Block, BlockExecutor, Broadcaster, BroadcastMessage};
use crate::core::{BftError, CoreState, VoteAdmission};
use crate::selector::{collect_powers, select_proposer};
use crate::wire::{sign_proposal, sign_vote, verify_proposal, verify_vote, Proposal, SignedProposal, SignedVote, Vote, VoteKind};

#[derive(Debug, Clone, Copy)]
pub struct BftEngineConfig {
    pub proposal_timeout: Duration,
    pub prevote_timeout: Duration,
    pub precommit_timeout: Duration,
    pub commit_timeout: Duration,
}

impl BftEngineConfig {
    pub fn validate(&self) -> Result<(), BftError> {
        if self.proposal_timeout.is_zero()
            || self.prevote_timeout.is_zero()
            || self.precommit_timeout.is_zero()
            || self.commit_timeout.is_zero()
        {
            return Err(BftError::InvalidTimeouts);
        }
        Ok(())
    }
}

/// Which phase of the current round the engine is waiting in. Drives which
/// timeout fallback a stale round-timer task should apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Propose,
    Prevote,
    Precommit,
}

pub struct BftEngine {
    config: BftEngineConfig,
    ledger: Arc<WeightLedger>,
    executor: Arc<dyn BlockExecutor>,
    broadcaster: Arc<dyn Broadcaster>,
    signer: Arc<dyn Signer>,
    self_address: Address,
    state: Mutex<CoreState>,
    phase: Mutex<Phase>,
    /// Bumped on every phase/round transition; a round-timer task that
    /// observes a stale generation on wake simply does nothing, which is
    /// how timer "cancellation" is implemented without real task handles
    /// (spec §5: "cancelling ... stops it at the next step boundary").
    generation: AtomicU64,
    /// Lets `&self` methods hand an owned `Arc<Self>` to `tokio::spawn`
    /// without requiring callers to hold one. Set once at construction via
    /// `Arc::new_cyclic`; always upgradable for the engine's own lifetime.
    self_ref: Weak<BftEngine>,
}

impl BftEngine {
    pub fn new(
        config: BftEngineConfig,
        ledger: Arc<WeightLedger>,
        executor: Arc<dyn BlockExecutor>,
        broadcaster: Arc<dyn Broadcaster>,
        signer: Arc<dyn Signer>,
        self_address: Address,
        height: u64,
    ) -> Result<Arc<Self>, BftError> {
        config.validate()?;
        Ok(Arc::new_cyclic(|weak| Self {
            config,
            ledger,
            executor,
            broadcaster,
            signer,
            self_address,
            state: Mutex::new(CoreState::new(height)),
            phase: Mutex::new(Phase::Propose),
            generation: AtomicU64::new(0),
            self_ref: weak.clone(),
        }))
    }

    fn arc_self(&self) -> Arc<BftEngine> {
        self.self_ref
            .upgrade()
            .expect("BftEngine methods only run while an Arc<BftEngine> is alive")
    }

    pub async fn current_height(&self) -> u64 {
        self.state.lock().await.height
    }

    async fn snapshot_validators(&self) -> BTreeMap<Address, Amount> {
        let validator_addrs = self.executor.get_validator_set().await;
        validator_addrs
            .keys()
            .map(|addr| (*addr, self.ledger.entry(addr).current))
            .collect()
    }

    /// `NewRound` (spec §4.5): snapshot the validator set, clear
    /// round-scoped state, and enter `Propose`. If this node is the
    /// selected proposer it immediately builds and broadcasts a proposal;
    /// otherwise it waits (for a proposal or the propose timeout).
    pub async fn start_new_round(&self, height_advanced: bool) {
        let validators = self.snapshot_validators().await;
        let round = {
            let mut state = self.state.lock().await;
            state.enter_new_round(validators.clone(), height_advanced);
            state.round
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.phase.lock().await = Phase::Propose;

        let powers = collect_powers(self.executor.as_ref(), &validators).await;
        if select_proposer(round as u64, &powers) == Some(self.self_address) {
            self.propose(round).await;
        }

        self.spawn_round_timer(generation, Phase::Propose, self.config.proposal_timeout);
    }

    async fn propose(&self, round: u32) {
        let txs = self.executor.get_mempool().await;
        let block = match self.executor.create_block(txs).await {
            Ok(block) => block,
            Err(e) => {
                warn!(error = %e, "block executor failed to create a block, skipping proposal");
                return;
            }
        };
        let proposal = Proposal { block, round };
        let signed = match sign_proposal(proposal, self.self_address, self.signer.as_ref()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to sign proposal");
                return;
            }
        };
        self.broadcaster.broadcast(BroadcastMessage::Proposal(signed.clone())).await;
        let _ = self.handle_proposal(signed).await;
    }

    /// Proposal admission + the Propose -> Prevote transition.
    pub async fn handle_proposal(&self, signed: SignedProposal) -> Result<(), BftError> {
        if !verify_proposal(&signed) {
            return Err(BftError::InvalidSignature);
        }
        let round = signed.proposal.round;
        let block_hash = Some(signed.proposal.block.hash());
        {
            let mut state = self.state.lock().await;
            if !state.validators.contains_key(&signed.proposer) {
                return Err(BftError::NonValidator(signed.proposer));
            }
            state.admit_proposal(signed)?;
        }
        self.enter_prevote(round, block_hash).await;
        Ok(())
    }

    async fn enter_prevote(&self, round: u32, block_hash: Option<potso_types::Hash32>) {
        *self.phase.lock().await = Phase::Prevote;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let vote = Vote { height: self.current_height().await, round, kind: VoteKind::Prevote, block_hash };
        self.cast_vote(vote).await;
        self.spawn_round_timer(generation, Phase::Prevote, self.config.prevote_timeout);
    }

    async fn cast_vote(&self, vote: Vote) {
        match sign_vote(vote, self.self_address, self.signer.as_ref()) {
            Ok(signed) => {
                self.broadcaster.broadcast(BroadcastMessage::Vote(signed.clone())).await;
                let _ = self.handle_vote(signed).await;
            }
            Err(e) => warn!(error = %e, "failed to sign vote"),
        }
    }

    /// Vote admission + quorum-triggered transitions
    /// (Prevote -> Precommit, Precommit -> Commit).
    pub async fn handle_vote(&self, signed: SignedVote) -> Result<VoteAdmission, BftError> {
        if !verify_vote(&signed) {
            return Err(BftError::InvalidSignature);
        }
        let kind = signed.vote.kind;
        let round = signed.vote.round;
        let block_hash = signed.vote.block_hash;
        let admission = {
            let mut state = self.state.lock().await;
            state.add_vote_if_relevant(signed)?
        };

        if admission.reached_prevote_quorum {
            self.enter_precommit(round, block_hash).await;
        } else if admission.reached_precommit_quorum {
            self.commit(round, block_hash).await;
        }
        Ok(admission)
    }

    async fn enter_precommit(&self, round: u32, block_hash: Option<potso_types::Hash32>) {
        *self.phase.lock().await = Phase::Precommit;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let vote = Vote { height: self.current_height().await, round, kind: VoteKind::Precommit, block_hash };
        self.cast_vote(vote).await;
        self.spawn_round_timer(generation, Phase::Precommit, self.config.precommit_timeout);
    }

    /// The Commit state (spec §4.5): invoke the Block Executor; on success
    /// advance height, on failure run the Prevote(nil) recovery path.
    async fn commit(&self, round: u32, block_hash: Option<potso_types::Hash32>) {
        let block = {
            let state = self.state.lock().await;
            match (block_hash, &state.active_proposal) {
                (Some(hash), Some(active)) if active.proposal.block.hash() == hash => {
                    Some(active.proposal.block.clone())
                }
                _ => None,
            }
        };
        let Some(block) = block else {
            // Nil-hash quorum: nothing to commit, just start the next round.
            // Spawned rather than awaited inline: each round's propose ->
            // prevote -> precommit -> commit chain otherwise re-enters this
            // function from within itself every round, growing one async
            // stack frame per height forever.
            self.spawn_new_round(false);
            return;
        };

        match self.executor.commit_block(&block).await {
            Ok(()) => {
                let height = {
                    let mut state = self.state.lock().await;
                    state.mark_committed();
                    state.height
                };
                info!(height, "block committed");
                self.spawn_new_round(true);
            }
            Err(e) => {
                warn!(error = %e, "block executor rejected commit, recovering with a nil prevote");
                // Spec §4.5 Commit bullets order the broadcast before the
                // reset; casting first (which also self-records the vote)
                // and only then clearing `receivedVotes[Prevote]` is what
                // makes the post-recovery prevote map empty, per §8
                // scenario 5, rather than containing our own just-cast nil
                // vote.
                let vote = Vote { height: self.current_height().await, round, kind: VoteKind::Prevote, block_hash: None };
                self.cast_vote(vote).await;
                {
                    let mut state = self.state.lock().await;
                    state.recover_from_commit_failure();
                }
            }
        }
    }

    fn spawn_new_round(&self, height_advanced: bool) {
        let engine = self.arc_self();
        tokio::spawn(async move {
            engine.start_new_round(height_advanced).await;
        });
    }

    fn spawn_round_timer(&self, generation: u64, phase: Phase, timeout: Duration) {
        let engine = self.arc_self();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if engine.generation.load(Ordering::SeqCst) != generation {
                return; // superseded by a quorum-triggered transition
            }
            debug!(?phase, "phase timed out");
            match phase {
                Phase::Propose => engine.enter_prevote(engine.current_round().await, None).await,
                Phase::Prevote => engine.enter_precommit(engine.current_round().await, None).await,
                Phase::Precommit => engine.start_new_round(false).await,
            }
        });
    }

    async fn current_round(&self) -> u32 {
        self.state.lock().await.round
    }
}
