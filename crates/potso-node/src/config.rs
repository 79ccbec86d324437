//! Node configuration (ambient concern carried per spec §9 even though the
//! CLI/config-file loader itself is an external collaborator): a single
//! TOML document covering the Weight Ledger bounds, Penalty Engine rule
//! catalog, and BFT timeouts, validated once at startup per spec §7 ("Config
//! errors ... Fatal at startup").
//!
//! Grounded in the teacher's `IbftConfig`/`ValidatorSetConfig` pattern: a
//! plain `serde`-derived struct loaded with `toml`, validated by a
//! dedicated `validate()` step rather than trusting the file blindly.

use std::path::Path;
use std::time::Duration;

use potso_weights::{DowntimeConfig, DowntimeRung, EquivocationConfig, InvalidProposalConfig};
use serde::Deserialize;

use crate::error::NodeError;

#[derive(Debug, Clone, Deserialize)]
pub struct WeightBoundsConfig {
    pub floor: u64,
    pub ceiling: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EquivocationRuleConfig {
    pub theta_bps: u32,
    pub min_decay: u64,
    pub slash_bps: u32,
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DowntimeRungConfig {
    pub missed_threshold: u64,
    pub decay_bps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DowntimeRuleConfig {
    pub ladder: Vec<DowntimeRungConfig>,
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvalidProposalRuleConfig {
    pub decay_bps: u32,
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PenaltyPolicyConfig {
    pub slash_enabled: bool,
    pub equivocation: EquivocationRuleConfig,
    pub downtime: DowntimeRuleConfig,
    pub invalid_proposal: InvalidProposalRuleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BftTimeoutsConfig {
    pub proposal_ms: u64,
    pub prevote_ms: u64,
    pub precommit_ms: u64,
    pub commit_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvidencePolicyConfig {
    pub max_age_blocks: u64,
}

/// Top-level node policy, the union of every fatal-at-startup knob named in
/// spec §4.1/§4.2/§4.3/§4.5.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub weight_bounds: WeightBoundsConfig,
    pub penalties: PenaltyPolicyConfig,
    pub bft_timeouts: BftTimeoutsConfig,
    pub evidence: EvidencePolicyConfig,
}

impl NodeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let cfg: NodeConfig = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| NodeError::Config(format!("reading {}: {e}", path.as_ref().display())))?;
        Self::from_toml_str(&contents)
    }

    /// Fatal-at-startup checks (spec §7 Config errors): `quorum < threshold`
    /// is enforced structurally by `quorum_threshold` always computing from
    /// live weights rather than a configurable override, so the remaining
    /// checks here are `floor <= ceiling` and "all four timeouts positive".
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.weight_bounds.floor > self.weight_bounds.ceiling {
            return Err(NodeError::Config(format!(
                "weight_bounds.floor ({}) exceeds weight_bounds.ceiling ({})",
                self.weight_bounds.floor, self.weight_bounds.ceiling
            )));
        }
        if self.penalties.equivocation.theta_bps > 10_000 {
            return Err(NodeError::Config(format!(
                "penalties.equivocation.theta_bps ({}) exceeds 10000",
                self.penalties.equivocation.theta_bps
            )));
        }
        if self.penalties.invalid_proposal.decay_bps > 10_000 {
            return Err(NodeError::Config(format!(
                "penalties.invalid_proposal.decay_bps ({}) exceeds 10000",
                self.penalties.invalid_proposal.decay_bps
            )));
        }
        let t = &self.bft_timeouts;
        if t.proposal_ms == 0 || t.prevote_ms == 0 || t.precommit_ms == 0 || t.commit_ms == 0 {
            return Err(NodeError::Config(
                "bft_timeouts: proposal/prevote/precommit/commit must all be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn equivocation_config(&self) -> EquivocationConfig {
        let e = &self.penalties.equivocation;
        EquivocationConfig {
            theta_bps: e.theta_bps,
            min_decay: potso_types::Amount::from_u64(e.min_decay),
            slash_bps: e.slash_bps,
            cooldown: Duration::from_secs(e.cooldown_secs),
        }
    }

    pub fn downtime_config(&self) -> DowntimeConfig {
        let d = &self.penalties.downtime;
        DowntimeConfig {
            ladder: d
                .ladder
                .iter()
                .map(|r| DowntimeRung { missed_threshold: r.missed_threshold, decay_bps: r.decay_bps })
                .collect(),
            cooldown: Duration::from_secs(d.cooldown_secs),
        }
    }

    pub fn invalid_proposal_config(&self) -> InvalidProposalConfig {
        let i = &self.penalties.invalid_proposal;
        InvalidProposalConfig { decay_bps: i.decay_bps, cooldown: Duration::from_secs(i.cooldown_secs) }
    }

    pub fn bft_engine_config(&self) -> potso_consensus::BftEngineConfig {
        let t = &self.bft_timeouts;
        potso_consensus::BftEngineConfig {
            proposal_timeout: Duration::from_millis(t.proposal_ms),
            prevote_timeout: Duration::from_millis(t.prevote_ms),
            precommit_timeout: Duration::from_millis(t.precommit_ms),
            commit_timeout: Duration::from_millis(t.commit_ms),
        }
    }
}

/// A conservative default policy, used when no config file is supplied —
/// mirrors the teacher's `Default` impls for its consensus configs so a
/// node can boot without requiring an operator to hand-author every knob.
impl Default for NodeConfig {
    fn default() -> Self {
        Self::from_toml_str(DEFAULT_CONFIG_TOML).expect("DEFAULT_CONFIG_TOML is valid")
    }
}

const DEFAULT_CONFIG_TOML: &str = r#"
[weight_bounds]
floor = 0
ceiling = 1000000000

[penalties]
slash_enabled = false

[penalties.equivocation]
theta_bps = 4000
min_decay = 50
slash_bps = 0
cooldown_secs = 3600

[penalties.downtime]
cooldown_secs = 1800
ladder = [
  { missed_threshold = 1, decay_bps = 200 },
  { missed_threshold = 2, decay_bps = 500 },
  { missed_threshold = 3, decay_bps = 1000 },
]

[penalties.invalid_proposal]
decay_bps = 300
cooldown_secs = 3600

[bft_timeouts]
proposal_ms = 3000
prevote_ms = 1000
precommit_ms = 1000
commit_ms = 2000

[evidence]
max_age_blocks = 100000
"#;
