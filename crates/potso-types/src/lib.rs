//! Shared primitives for the POTSO consensus core: addresses, hashes, and
//! arbitrary-precision amounts.
//!
//! These types are deliberately dependency-light — every other crate in the
//! workspace (`potso-weights`, `potso-evidence`, `potso-consensus`,
//! `potso-rewards`) depends on this one, never the other way around.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod amount;

pub use amount::Amount;

/// A 20-byte validator / account identifier.
///
/// Ordering is byte-lexicographic; every deterministic iteration in this
/// workspace (proposer selection, reward distribution, vote admission) sorts
/// by this order rather than relying on hash-map iteration order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const LEN: usize = 20;

    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypesError> {
        if bytes.len() != Self::LEN {
            return Err(TypesError::InvalidLength {
                what: "address",
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        let mut buf = [0u8; Self::LEN];
        buf.copy_from_slice(bytes);
        Ok(Address(buf))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; Self::LEN]
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{})", self.to_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// A 32-byte canonical hash (blake3 or sha256 output, depending on the
/// caller's domain — see each crate's canonical-hash function).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub const LEN: usize = 32;

    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypesError> {
        if bytes.len() != Self::LEN {
            return Err(TypesError::InvalidLength {
                what: "hash",
                expected: Self::LEN,
                actual: bytes.len(),
            });
        }
        let mut buf = [0u8; Self::LEN];
        buf.copy_from_slice(bytes);
        Ok(Hash32(buf))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32(0x{})", self.to_hex())
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// The closed set of evidence/misbehavior kinds the penalty engine has a
/// rule for (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EvidenceKind {
    Downtime,
    Equivocation,
    InvalidBlockProposal,
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvidenceKind::Downtime => "downtime",
            EvidenceKind::Equivocation => "equivocation",
            EvidenceKind::InvalidBlockProposal => "invalid_block_proposal",
        };
        write!(f, "{s}")
    }
}

impl EvidenceKind {
    /// Stable single-byte discriminant used in the canonical evidence hash.
    /// Never reorder these: doing so would change every existing
    /// `canonicalHash` for affected evidence.
    pub fn wire_tag(self) -> u8 {
        match self {
            EvidenceKind::Downtime => 0,
            EvidenceKind::Equivocation => 1,
            EvidenceKind::InvalidBlockProposal => 2,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(EvidenceKind::Downtime),
            1 => Some(EvidenceKind::Equivocation),
            2 => Some(EvidenceKind::InvalidBlockProposal),
            _ => None,
        }
    }
}

/// Severity attached to a penalty rule's outcome (spec §4.2), surfaced in
/// events and logs but not otherwise interpreted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Medium,
    High,
    Critical,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid {what} length: expected {expected}, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("negative amount is not permitted")]
    NegativeAmount,
}

/// Basis-point denominator used throughout penalty and reward math.
pub const BPS_DENOM: u32 = 10_000;

/// `floor(a * num / denom)`, all arguments non-negative.
///
/// This is the one piece of arithmetic every penalty/reward computation in
/// this workspace bottoms out in, so it lives here rather than being
/// duplicated per crate.
pub fn mul_div_floor(a: &BigUint, num: u64, denom: u64) -> BigUint {
    debug_assert!(denom != 0, "mul_div_floor: denominator must be non-zero");
    if a.is_zero() || num == 0 {
        return BigUint::zero();
    }
    (a * BigUint::from(num)) / BigUint::from(denom)
}

/// `floor(a * num / denom)` over arbitrary-precision operands, for math that
/// outgrows `u64` (reward shares: pool and weight can both be unbounded
/// `BigInt`s, unlike the fixed bps denominators `mul_div_floor` covers).
pub fn mul_div_floor_big(a: &BigUint, num: &BigUint, denom: &BigUint) -> BigUint {
    debug_assert!(!denom.is_zero(), "mul_div_floor_big: denominator must be non-zero");
    if a.is_zero() || num.is_zero() {
        return BigUint::zero();
    }
    (a * num) / denom
}

/// Clamp `value` into `[floor, ceiling]` (ceiling is exclusive of wraparound
/// concerns since everything here is non-negative).
pub fn clamp_biguint(value: BigUint, floor: &BigUint, ceiling: &BigUint) -> BigUint {
    if &value < floor {
        floor.clone()
    } else if &value > ceiling {
        ceiling.clone()
    } else {
        value
    }
}

/// Lightweight helper so callers can compare orderings without importing
/// `std::cmp::Ordering` directly at every call site.
pub fn address_order(a: &Address, b: &Address) -> Ordering {
    a.0.cmp(&b.0)
}

pub trait Zeroable {
    fn is_zero_value(&self) -> bool;
}

impl Zeroable for BigUint {
    fn is_zero_value(&self) -> bool {
        self.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_orders_lexicographically() {
        let a = Address([0u8; 20]);
        let mut b = [0u8; 20];
        b[19] = 1;
        let b = Address(b);
        assert!(a < b);
    }

    #[test]
    fn mul_div_floor_matches_scenario_1() {
        // base=200, thetaBps=4000 -> 200*4000/10000 = 80
        let base = BigUint::from(200u32);
        let decay = mul_div_floor(&base, 4000, BPS_DENOM as u64);
        assert_eq!(decay, BigUint::from(80u32));
    }

    #[test]
    fn mul_div_floor_big_matches_scenario_3() {
        // effectiveP=10, weight=1, total=3 -> floor(10*1/3) = 3.
        let effective_p = BigUint::from(10u32);
        let share = mul_div_floor_big(&effective_p, &BigUint::from(1u32), &BigUint::from(3u32));
        assert_eq!(share, BigUint::from(3u32));
    }

    #[test]
    fn clamp_respects_bounds() {
        let floor = BigUint::from(10u32);
        let ceiling = BigUint::from(100u32);
        assert_eq!(clamp_biguint(BigUint::from(5u32), &floor, &ceiling), floor);
        assert_eq!(
            clamp_biguint(BigUint::from(1000u32), &floor, &ceiling),
            ceiling
        );
        assert_eq!(
            clamp_biguint(BigUint::from(50u32), &floor, &ceiling),
            BigUint::from(50u32)
        );
    }

    proptest::proptest! {
        // spec §8: "∀ ledger update: floor <= current <= ceiling after the call."
        #[test]
        fn clamp_always_lands_in_bounds(value in 0u64..1_000_000, floor in 0u64..500_000, ceiling_offset in 0u64..500_000) {
            let floor = BigUint::from(floor);
            let ceiling = &floor + BigUint::from(ceiling_offset);
            let clamped = clamp_biguint(BigUint::from(value), &floor, &ceiling);
            proptest::prop_assert!(clamped >= floor);
            proptest::prop_assert!(clamped <= ceiling);
        }

        // mul_div_floor with num <= denom must never overshoot the input (it
        // computes a fraction of `a`, never a multiple).
        #[test]
        fn mul_div_floor_never_exceeds_input(a in 0u64..1_000_000, denom in 1u64..=(BPS_DENOM as u64), num_frac in 0u64..=10_000) {
            let num = num_frac % (denom + 1);
            let result = mul_div_floor(&BigUint::from(a), num, denom);
            proptest::prop_assert!(result <= BigUint::from(a));
        }
    }
}
