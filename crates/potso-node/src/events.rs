//! The event surface (spec §6): `potso.penalty.applied`,
//! `potso.rewards.ready`, and `potso.rewards.paid`, emitted to an external
//! collaborator in the order the spec defines.
//!
//! Grounded in the teacher's habit of pairing functional code with an
//! explicit metrics/event struct (`CoreValidatorMetrics`,
//! `ConsensusRoundStatus` in `bpi-validator-set`) rather than leaving event
//! emission as an afterthought: `PotsoEventSink` is a first-class trait here
//! (spec §9 supplement), not just a log line.

use potso_rewards::{RewardEntry, RewardStatus};
use potso_weights::PenaltyEvent;
use tracing::info;

/// `potso.rewards.ready` payload (spec §4.6 / §6): one epoch's freshly
/// computed, not-yet-paid distribution.
#[derive(Debug, Clone)]
pub struct RewardsReadyEvent {
    pub epoch: u64,
    pub entries: Vec<RewardEntry>,
}

/// `potso.rewards.paid` payload: the subset of a `MarkPaid` call that
/// actually transitioned Ready -> Paid this call (idempotent repeats of an
/// already-`Paid` entry are not re-announced).
#[derive(Debug, Clone)]
pub struct RewardsPaidEvent {
    pub epoch: u64,
    pub entries: Vec<RewardEntry>,
}

/// The external emitter collaborator (spec §6: "emitted to an external
/// emitter"). Default methods no-op so implementors only override the
/// events they care about.
pub trait PotsoEventSink: Send + Sync {
    fn on_penalty_applied(&self, _event: &PenaltyEvent) {}
    fn on_rewards_ready(&self, _event: &RewardsReadyEvent) {}
    fn on_rewards_paid(&self, _event: &RewardsPaidEvent) {}
}

/// A sink that never observes anything, for embedding contexts where events
/// are consumed purely via log lines (already emitted by the crates
/// themselves at `info!`) rather than a structured subscriber.
pub struct NoopEventSink;

impl PotsoEventSink for NoopEventSink {}

/// A sink that re-announces each event at `info!` with the dotted event
/// name from spec §6, for deployments that want the event surface visible
/// in the same log stream as everything else without wiring a real
/// subscriber.
pub struct TracingEventSink;

impl PotsoEventSink for TracingEventSink {
    fn on_penalty_applied(&self, event: &PenaltyEvent) {
        info!(
            event = "potso.penalty.applied",
            hash = %event.hash,
            kind = %event.kind,
            offender = %event.offender,
            decay_bps = event.decay_bps,
            slash_amount = %event.slash_amount,
            new_weight = %event.new_weight,
            block = event.block,
            idempotent = event.idempotent,
            "penalty event"
        );
    }

    fn on_rewards_ready(&self, event: &RewardsReadyEvent) {
        info!(
            event = "potso.rewards.ready",
            epoch = event.epoch,
            count = event.entries.len(),
            "rewards ready"
        );
    }

    fn on_rewards_paid(&self, event: &RewardsPaidEvent) {
        let paid = event.entries.iter().filter(|e| e.status == RewardStatus::Paid).count();
        info!(
            event = "potso.rewards.paid",
            epoch = event.epoch,
            count = paid,
            "rewards paid"
        );
    }
}
