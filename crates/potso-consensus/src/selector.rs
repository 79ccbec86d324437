//! Proposer Selection (spec §4.4): deterministic weighted pick over the
//! current validator set, with a round-robin fallback when total power is
//! zero.
//!
//! Grounded in the teacher's `bpi-leader-selection` crate (a dedicated
//! selection module separate from the BFT state machine itself), rebuilt
//! around weighted voting power instead of VRF+stake.

use std::collections::BTreeMap;

use num_bigint::BigUint;
use num_traits::Zero;
use potso_types::{Address, Amount};

use crate::collaborators::{AccountInfo, BlockExecutor};

/// Sum of `stake + engagementScore` for every validator whose account
/// lookup succeeded (spec §4.4 step 1: "skip validators whose account
/// fetch fails"). Ascending address order falls out of `BTreeMap` directly.
pub async fn collect_powers(
    executor: &dyn BlockExecutor,
    validators: &BTreeMap<Address, Amount>,
) -> BTreeMap<Address, Amount> {
    let mut powers = BTreeMap::new();
    for addr in validators.keys() {
        if let Ok(AccountInfo { stake, engagement_score }) = executor.get_account(addr).await {
            powers.insert(*addr, stake + engagement_score);
        }
    }
    powers
}

/// Pure selection function over a pre-fetched power map (spec §4.4 steps
/// 2-4). Kept free of I/O so it is directly unit-testable and so that two
/// independent nodes given the same `powers`/`round` provably agree.
pub fn select_proposer(round: u64, powers: &BTreeMap<Address, Amount>) -> Option<Address> {
    if powers.is_empty() {
        return None;
    }
    let total: Amount = powers.values().cloned().sum();
    if total.is_zero() {
        let n = powers.len();
        let idx = (round as usize) % n;
        return powers.keys().nth(idx).copied();
    }
    let pick = BigUint::from(round) % &total.0;
    let mut accumulated = BigUint::zero();
    for (addr, power) in powers.iter() {
        accumulated += &power.0;
        if accumulated > pick {
            return Some(*addr);
        }
    }
    // Unreachable: `accumulated` reaches `total > pick` by the loop's end.
    None
}
