//! The Penalty Engine (spec §4.2): a pure rule catalog over evidence kinds,
//! composed with the Weight Ledger and an optional `Slasher` collaborator.
//!
//! Grounded in the teacher's `bpi-slashing` crate, which pairs a detector
//! (`EquivocationDetector`) with typed evidence/proof structs and a
//! `thiserror` error enum of similar shape to `SlashingError`. Here the
//! "detector" role is filled by `potso-evidence`; this crate only computes
//! and applies the penalty once evidence has already been validated and
//! stored.

use std::collections::HashMap;
use std::time::Duration;

use potso_types::{mul_div_floor, Address, Amount, EvidenceKind, Hash32, Severity, BPS_DENOM};
use thiserror::Error;
use tracing::{debug, info};

use crate::ledger::WeightLedger;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PenaltyError {
    #[error("no rule configured for evidence kind {0}")]
    MissingRule(EvidenceKind),
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
    #[error("slashing failed for {offender}: {reason}")]
    SlashFailed { offender: Address, reason: String },
}

/// `Slasher` collaborator (spec §4.2 / §6): a side-effecting stake-burn
/// operation distinct from the in-ledger weight decay. Slashing errors
/// abort `apply()` entirely — no marker is written, so callers must retry
/// with the same evidence hash (spec §4.2 failure semantics).
pub trait Slasher: Send + Sync {
    fn slash(&self, offender: Address, amount: Amount) -> Result<(), String>;
}

/// A `Slasher` that never slashes, for deployments that only want the
/// weight-decay half of the penalty (spec allows `slashEnabled = false`).
pub struct NoopSlasher;

impl Slasher for NoopSlasher {
    fn slash(&self, _offender: Address, _amount: Amount) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EquivocationConfig {
    pub theta_bps: u32,
    pub min_decay: Amount,
    pub slash_bps: u32,
    pub cooldown: Duration,
}

/// One rung of the downtime ladder: once `missed_epochs >= threshold`, the
/// associated `decay_bps` applies (the highest satisfied rung wins).
#[derive(Debug, Clone, Copy)]
pub struct DowntimeRung {
    pub missed_threshold: u64,
    pub decay_bps: u32,
}

#[derive(Debug, Clone)]
pub struct DowntimeConfig {
    pub ladder: Vec<DowntimeRung>,
    pub cooldown: Duration,
}

#[derive(Debug, Clone)]
pub struct InvalidProposalConfig {
    pub decay_bps: u32,
    pub cooldown: Duration,
}

#[derive(Debug, Clone)]
enum RuleConfig {
    Equivocation(EquivocationConfig),
    Downtime(DowntimeConfig),
    InvalidBlockProposal(InvalidProposalConfig),
}

/// The rule catalog keyed by evidence type (spec §4.2 `Catalog`).
///
/// Intentionally a sparse map rather than three mandatory fields: a
/// deployment that hasn't configured a rule for a given evidence kind gets
/// `PenaltyError::MissingRule` rather than a silent no-op, matching spec
/// step 1 ("Reject ... missing rule").
#[derive(Debug, Clone, Default)]
pub struct PenaltyCatalog {
    rules: HashMap<EvidenceKind, RuleConfig>,
    pub slash_enabled: bool,
}

impl PenaltyCatalog {
    pub fn new(slash_enabled: bool) -> Self {
        Self {
            rules: HashMap::new(),
            slash_enabled,
        }
    }

    pub fn with_equivocation(mut self, cfg: EquivocationConfig) -> Result<Self, PenaltyError> {
        if cfg.theta_bps > BPS_DENOM {
            return Err(PenaltyError::InvalidPolicy(format!(
                "equivocationThetaBps {} exceeds BPS_DENOM",
                cfg.theta_bps
            )));
        }
        self.rules.insert(EvidenceKind::Equivocation, RuleConfig::Equivocation(cfg));
        Ok(self)
    }

    pub fn with_downtime(mut self, mut cfg: DowntimeConfig) -> Result<Self, PenaltyError> {
        cfg.ladder.sort_by_key(|r| r.missed_threshold);
        self.rules.insert(EvidenceKind::Downtime, RuleConfig::Downtime(cfg));
        Ok(self)
    }

    pub fn with_invalid_proposal(mut self, cfg: InvalidProposalConfig) -> Result<Self, PenaltyError> {
        if cfg.decay_bps > BPS_DENOM {
            return Err(PenaltyError::InvalidPolicy(format!(
                "invalidProposalDecay {} exceeds BPS_DENOM",
                cfg.decay_bps
            )));
        }
        self.rules
            .insert(EvidenceKind::InvalidBlockProposal, RuleConfig::InvalidBlockProposal(cfg));
        Ok(self)
    }
}

/// The pure output of a rule's compute step, before it is applied to the
/// ledger.
#[derive(Debug, Clone)]
struct PenaltyCompute {
    decay: Amount,
    decay_bps: u32,
    slash: Amount,
    severity: Severity,
}

fn compute_equivocation(cfg: &EquivocationConfig, base: &Amount, current: &Amount, slash_enabled: bool) -> PenaltyCompute {
    let pct_decay = Amount(mul_div_floor(base, cfg.theta_bps as u64, BPS_DENOM as u64));
    let mut decay = if pct_decay > cfg.min_decay { pct_decay } else { cfg.min_decay.clone() };
    if decay > *current {
        decay = current.clone();
    }
    let slash = if slash_enabled {
        Amount(mul_div_floor(base, cfg.slash_bps as u64, BPS_DENOM as u64))
    } else {
        Amount::zero()
    };
    PenaltyCompute {
        decay,
        decay_bps: cfg.theta_bps,
        slash,
        severity: Severity::Critical,
    }
}

fn compute_downtime(cfg: &DowntimeConfig, current: &Amount, missed_epochs: u64) -> PenaltyCompute {
    let decay_bps = cfg
        .ladder
        .iter()
        .filter(|r| r.missed_threshold <= missed_epochs)
        .map(|r| r.decay_bps)
        .max()
        .unwrap_or(0);
    let decay = Amount(mul_div_floor(current, decay_bps as u64, BPS_DENOM as u64));
    PenaltyCompute {
        decay,
        decay_bps,
        slash: Amount::zero(),
        severity: Severity::Medium,
    }
}

fn compute_invalid_proposal(cfg: &InvalidProposalConfig, current: &Amount) -> PenaltyCompute {
    let decay = Amount(mul_div_floor(current, cfg.decay_bps as u64, BPS_DENOM as u64));
    PenaltyCompute {
        decay,
        decay_bps: cfg.decay_bps,
        slash: Amount::zero(),
        severity: Severity::High,
    }
}

/// A request to apply a penalty, derived from a stored `EvidenceRecord`
/// (spec §4.2 `Apply(record, ctx)`).
#[derive(Debug, Clone)]
pub struct PenaltyInput {
    pub hash: Hash32,
    pub kind: EvidenceKind,
    pub offender: Address,
    /// Only meaningful for `Downtime`; ignored by other rules.
    pub missed_epochs: u64,
    pub block: u64,
}

/// Per-call context (spec §4.2 step 3: `ctx.baseOverride`).
#[derive(Default)]
pub struct PenaltyContext<'a> {
    pub base_override: Option<Amount>,
    pub slasher: Option<&'a dyn Slasher>,
}

/// `potso.penalty.applied` event payload (spec §6).
#[derive(Debug, Clone)]
pub struct PenaltyEvent {
    pub hash: Hash32,
    pub kind: EvidenceKind,
    pub offender: Address,
    pub decay_bps: u32,
    pub slash_amount: Amount,
    pub new_weight: Amount,
    pub block: u64,
    pub idempotent: bool,
}

#[derive(Debug, Clone)]
pub struct PenaltyOutcome {
    pub idempotent: bool,
    pub decay_applied: Amount,
    pub slash_applied: Amount,
    pub event: PenaltyEvent,
}

pub struct PenaltyEngine {
    catalog: PenaltyCatalog,
}

impl PenaltyEngine {
    pub fn new(catalog: PenaltyCatalog) -> Self {
        Self { catalog }
    }

    /// `Apply(record, ctx)` (spec §4.2), the 7-step algorithm.
    pub fn apply(
        &self,
        ledger: &WeightLedger,
        input: PenaltyInput,
        ctx: PenaltyContext<'_>,
    ) -> Result<PenaltyOutcome, PenaltyError> {
        // Step 2: idempotent short-circuit.
        if ledger.was_penalty_applied(&input.hash, &input.offender) {
            let current = ledger.entry(&input.offender).current;
            debug!(hash = %input.hash, offender = %input.offender, "penalty already applied, idempotent");
            return Ok(PenaltyOutcome {
                idempotent: true,
                decay_applied: Amount::zero(),
                slash_applied: Amount::zero(),
                event: PenaltyEvent {
                    hash: input.hash,
                    kind: input.kind,
                    offender: input.offender,
                    decay_bps: 0,
                    slash_amount: Amount::zero(),
                    new_weight: current,
                    block: input.block,
                    idempotent: true,
                },
            });
        }

        // Step 3: read entry, resolve base, compute the rule.
        let entry = ledger.entry(&input.offender);
        let base = ctx.base_override.clone().unwrap_or_else(|| entry.base.clone());
        let rule = self
            .catalog
            .rules
            .get(&input.kind)
            .ok_or(PenaltyError::MissingRule(input.kind))?;
        let compute = match rule {
            RuleConfig::Equivocation(cfg) => {
                compute_equivocation(cfg, &base, &entry.current, self.catalog.slash_enabled)
            }
            RuleConfig::Downtime(cfg) => compute_downtime(cfg, &entry.current, input.missed_epochs),
            RuleConfig::InvalidBlockProposal(cfg) => compute_invalid_proposal(cfg, &entry.current),
        };

        // Step 4: apply decay to the ledger.
        let decay_result = ledger.apply_decay(input.offender, compute.decay.clone());

        // Step 5: slash, if the rule called for it and a slasher is wired up.
        let mut slash_applied = Amount::zero();
        if !compute.slash.is_zero() {
            if let Some(slasher) = ctx.slasher {
                slasher
                    .slash(input.offender, compute.slash.clone())
                    .map_err(|reason| PenaltyError::SlashFailed {
                        offender: input.offender,
                        reason,
                    })?;
                slash_applied = compute.slash.clone();
            }
        }

        // Step 6: mark applied — only reached once slashing (if any) succeeded.
        ledger.mark_penalty_applied(&input.hash, &input.offender);

        info!(
            hash = %input.hash,
            offender = %input.offender,
            kind = %input.kind,
            severity = ?compute.severity,
            decay = %decay_result.applied,
            slash = %slash_applied,
            new_weight = %decay_result.current,
            "penalty applied"
        );

        // Step 7: event.
        Ok(PenaltyOutcome {
            idempotent: false,
            decay_applied: decay_result.applied,
            slash_applied: slash_applied.clone(),
            event: PenaltyEvent {
                hash: input.hash,
                kind: input.kind,
                offender: input.offender,
                decay_bps: compute.decay_bps,
                slash_amount: slash_applied,
                new_weight: decay_result.current,
                block: input.block,
                idempotent: false,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use potso_types::Hash32;

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address(bytes)
    }

    fn engine_with_equivocation() -> PenaltyEngine {
        let catalog = PenaltyCatalog::new(true)
            .with_equivocation(EquivocationConfig {
                theta_bps: 4000,
                min_decay: Amount::from_u64(50),
                slash_bps: 0,
                cooldown: Duration::from_secs(60),
            })
            .unwrap();
        PenaltyEngine::new(catalog)
    }

    #[test]
    fn scenario_1_equivocation_decay_70() {
        let ledger = WeightLedger::new(Amount::zero(), Amount::from_u64(1_000_000)).unwrap();
        ledger.set(addr(1), Some(Amount::from_u64(200)), Some(Amount::from_u64(150)));
        let engine = engine_with_equivocation();
        let outcome = engine
            .apply(
                &ledger,
                PenaltyInput {
                    hash: Hash32([1u8; 32]),
                    kind: EvidenceKind::Equivocation,
                    offender: addr(1),
                    missed_epochs: 0,
                    block: 10,
                },
                PenaltyContext::default(),
            )
            .unwrap();
        assert_eq!(outcome.decay_applied, Amount::from_u64(80));
        assert_eq!(outcome.event.new_weight, Amount::from_u64(70));
        assert!(!outcome.idempotent);
    }

    #[test]
    fn scenario_2_downtime_ladder() {
        let catalog = PenaltyCatalog::new(false)
            .with_downtime(DowntimeConfig {
                ladder: vec![
                    DowntimeRung { missed_threshold: 1, decay_bps: 200 },
                    DowntimeRung { missed_threshold: 2, decay_bps: 500 },
                    DowntimeRung { missed_threshold: 3, decay_bps: 1000 },
                ],
                cooldown: Duration::from_secs(60),
            })
            .unwrap();
        let engine = PenaltyEngine::new(catalog);
        let ledger = WeightLedger::new(Amount::zero(), Amount::from_u64(1_000_000)).unwrap();
        ledger.set(addr(1), Some(Amount::from_u64(1000)), Some(Amount::from_u64(1000)));
        let outcome = engine
            .apply(
                &ledger,
                PenaltyInput {
                    hash: Hash32([2u8; 32]),
                    kind: EvidenceKind::Downtime,
                    offender: addr(1),
                    missed_epochs: 3,
                    block: 11,
                },
                PenaltyContext::default(),
            )
            .unwrap();
        assert_eq!(outcome.decay_applied, Amount::from_u64(100));
    }

    #[test]
    fn repeated_application_is_idempotent() {
        let ledger = WeightLedger::new(Amount::zero(), Amount::from_u64(1_000_000)).unwrap();
        ledger.set(addr(1), Some(Amount::from_u64(200)), Some(Amount::from_u64(150)));
        let engine = engine_with_equivocation();
        let input = || PenaltyInput {
            hash: Hash32([9u8; 32]),
            kind: EvidenceKind::Equivocation,
            offender: addr(1),
            missed_epochs: 0,
            block: 1,
        };
        let first = engine.apply(&ledger, input(), PenaltyContext::default()).unwrap();
        assert!(!first.idempotent);
        let second = engine.apply(&ledger, input(), PenaltyContext::default()).unwrap();
        assert!(second.idempotent);
        assert_eq!(second.decay_applied, Amount::zero());
        // Weight must not have decayed a second time.
        assert_eq!(ledger.entry(&addr(1)).current, Amount::from_u64(70));
    }

    #[test]
    fn missing_rule_is_rejected() {
        let catalog = PenaltyCatalog::new(false);
        let engine = PenaltyEngine::new(catalog);
        let ledger = WeightLedger::new(Amount::zero(), Amount::from_u64(1000)).unwrap();
        let result = engine.apply(
            &ledger,
            PenaltyInput {
                hash: Hash32([3u8; 32]),
                kind: EvidenceKind::Downtime,
                offender: addr(1),
                missed_epochs: 1,
                block: 1,
            },
            PenaltyContext::default(),
        );
        assert!(matches!(result, Err(PenaltyError::MissingRule(EvidenceKind::Downtime))));
    }

    struct FailingSlasher;
    impl Slasher for FailingSlasher {
        fn slash(&self, _offender: Address, _amount: Amount) -> Result<(), String> {
            Err("slasher unavailable".into())
        }
    }

    #[test]
    fn slash_failure_aborts_without_marking_applied() {
        let catalog = PenaltyCatalog::new(true)
            .with_equivocation(EquivocationConfig {
                theta_bps: 4000,
                min_decay: Amount::from_u64(50),
                slash_bps: 1000,
                cooldown: Duration::from_secs(60),
            })
            .unwrap();
        let engine = PenaltyEngine::new(catalog);
        let ledger = WeightLedger::new(Amount::zero(), Amount::from_u64(1_000_000)).unwrap();
        ledger.set(addr(1), Some(Amount::from_u64(200)), Some(Amount::from_u64(150)));
        let slasher = FailingSlasher;
        let result = engine.apply(
            &ledger,
            PenaltyInput {
                hash: Hash32([4u8; 32]),
                kind: EvidenceKind::Equivocation,
                offender: addr(1),
                missed_epochs: 0,
                block: 1,
            },
            PenaltyContext {
                base_override: None,
                slasher: Some(&slasher),
            },
        );
        assert!(result.is_err());
        assert!(!ledger.was_penalty_applied(&Hash32([4u8; 32]), &addr(1)));
    }
}
