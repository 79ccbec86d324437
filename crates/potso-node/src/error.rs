//! The node-level error taxonomy (spec §7): wraps each crate's own error
//! type into the five categories the spec names (Validation / State /
//! Protocol / Execution / Config), so callers embedding this crate can match
//! on propagation policy without reaching into every sub-crate's error enum.

use potso_consensus::BftError;
use potso_evidence::{EvidenceError, RejectReason};
use potso_rewards::RewardError;
use potso_storage::StorageError;
use potso_weights::{PenaltyError, WeightLedgerError};
use thiserror::Error;

/// Node-level error, one variant per spec §7 category. Validation and
/// Protocol errors are recovered locally by callers (never fatal); State
/// errors should be retried; Execution errors never advance height; Config
/// errors abort initialization.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Input violates a documented invariant (evidence rejection, bad
    /// ledger arguments). Carries the structured reason where one exists.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Evidence rejected with a stable `RejectReason` tag (spec §7: "invalid
    /// evidence is acknowledged with a `Rejected` receipt carrying the
    /// reason tag").
    #[error("evidence rejected: {0}")]
    EvidenceRejected(RejectReason),

    /// Persistence/lookup failure. Callers retry.
    #[error("state unavailable: {0}")]
    State(#[from] StorageError),

    /// BFT-level anomaly (non-validator vote, duplicate vote, wrong
    /// height/round). Logged and dropped; never fatal.
    #[error("protocol anomaly: {0}")]
    Protocol(#[from] BftError),

    /// Block Executor rejection at commit time; the engine itself already
    /// runs the Prevote(nil) recovery path, so this variant only surfaces
    /// when a caller drives `commit_block` outside the engine.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Bad startup parameters: quorum/threshold, floor/ceiling, non-positive
    /// timeouts. Fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<WeightLedgerError> for NodeError {
    fn from(e: WeightLedgerError) -> Self {
        NodeError::Config(e.to_string())
    }
}

impl From<PenaltyError> for NodeError {
    fn from(e: PenaltyError) -> Self {
        match e {
            PenaltyError::InvalidPolicy(msg) => NodeError::Config(msg),
            other => NodeError::Validation(other.to_string()),
        }
    }
}

impl From<EvidenceError> for NodeError {
    fn from(e: EvidenceError) -> Self {
        match e {
            EvidenceError::Storage(s) => NodeError::State(s),
        }
    }
}

impl From<RewardError> for NodeError {
    fn from(e: RewardError) -> Self {
        match e {
            RewardError::Storage(s) => NodeError::State(s),
            other => NodeError::Validation(other.to_string()),
        }
    }
}

impl From<RejectReason> for NodeError {
    fn from(r: RejectReason) -> Self {
        NodeError::EvidenceRejected(r)
    }
}
