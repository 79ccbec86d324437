//! `Validate(evidence, hash, currentHeight, maxAge, heightLookup?)` (spec §4.3).

use std::fmt;

use potso_crypto::recover;
use potso_types::{Address, Hash32};

use crate::record::{signing_digest, Evidence};

/// The closed set of rejection tags (spec §4.3 / §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidType,
    InvalidReporter,
    InvalidSignature,
    InvalidOffender,
    EmptyHeights,
    UnsortedHeights,
    FutureHeight,
    Expired,
    UnknownHeight,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::InvalidType => "invalid_type",
            RejectReason::InvalidReporter => "invalid_reporter",
            RejectReason::InvalidSignature => "invalid_signature",
            RejectReason::InvalidOffender => "invalid_offender",
            RejectReason::EmptyHeights => "empty_heights",
            RejectReason::UnsortedHeights => "unsorted_heights",
            RejectReason::FutureHeight => "future_height",
            RejectReason::Expired => "expired",
            RejectReason::UnknownHeight => "unknown_height",
        };
        write!(f, "{s}")
    }
}

/// Optional external collaborator rejecting evidence that references a
/// height the caller has no record of.
pub trait HeightLookup: Send + Sync {
    fn exists(&self, height: u64) -> bool;
}

/// `Validate` enforces every clause in spec §4.3 in order, short-circuiting
/// on the first violation.
pub fn validate(
    evidence: &Evidence,
    hash: &Hash32,
    current_height: u64,
    max_age: u64,
    height_lookup: Option<&dyn HeightLookup>,
) -> Result<(), RejectReason> {
    if evidence.offender.is_zero() {
        return Err(RejectReason::InvalidOffender);
    }
    if evidence.reporter.is_zero() {
        return Err(RejectReason::InvalidReporter);
    }
    if evidence.heights.is_empty() {
        return Err(RejectReason::EmptyHeights);
    }
    if !evidence.heights.windows(2).all(|w| w[0] < w[1]) {
        return Err(RejectReason::UnsortedHeights);
    }
    if evidence.heights.iter().any(|h| *h > current_height) {
        return Err(RejectReason::FutureHeight);
    }
    let cutoff = current_height.saturating_sub(max_age);
    if evidence.heights.iter().any(|h| *h < cutoff) {
        return Err(RejectReason::Expired);
    }
    if let Some(lookup) = height_lookup {
        if evidence.heights.iter().any(|h| !lookup.exists(*h)) {
            return Err(RejectReason::UnknownHeight);
        }
    }

    let digest = signing_digest(hash, evidence.timestamp);
    let recovered = recover(&digest, &evidence.reporter_sig).map_err(|_| RejectReason::InvalidSignature)?;
    let recovered_addr = potso_crypto::address_of(&recovered);
    if recovered_addr != evidence.reporter {
        return Err(RejectReason::InvalidSignature);
    }

    Ok(())
}

/// A `HeightLookup` that accepts every height; the default when no external
/// height oracle is wired up.
pub struct AcceptAllHeights;

impl HeightLookup for AcceptAllHeights {
    fn exists(&self, _height: u64) -> bool {
        true
    }
}

/// A `HeightLookup` backed by an explicit allow-list, useful in tests and in
/// nodes that track a bounded recent-height window directly.
pub struct KnownHeights(pub std::collections::BTreeSet<u64>);

impl HeightLookup for KnownHeights {
    fn exists(&self, height: u64) -> bool {
        self.0.contains(&height)
    }
}
