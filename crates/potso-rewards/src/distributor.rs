//! The Reward Distributor (spec §4.6): pure pro-rata split of an epoch pool
//! over a Weight Ledger snapshot, with dust carried by a `RoundingBucket`.
//!
//! Grounded in the teacher's `bpi-math::reward_engine` pro-rata split, with
//! the carry bucket pulled out as an explicit collaborator (here
//! `RoundingBucket`) rather than a module-level static, per spec §9's "no
//! ambient singletons" resolution.

use std::collections::BTreeMap;

use potso_types::{mul_div_floor_big, Address, Amount};
use tracing::info;

use crate::bucket::RoundingBucket;

/// One address's settled share of an epoch's distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardShare {
    pub address: Address,
    pub amount: Amount,
}

/// Result of one `distribute` call (spec §4.6 steps 1-5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionOutcome {
    pub epoch: u64,
    /// Sorted by ascending address (spec §8: "shares are sorted by
    /// ascending address").
    pub shares: Vec<RewardShare>,
    pub dust: Amount,
}

/// Step 1: merge duplicate addresses by addition, drop zero weights, and
/// settle into ascending-address order. `Amount` can never be negative (it
/// wraps a `BigUint`), so the spec's "reject negatives" clause is enforced
/// by the type system rather than a runtime check.
fn normalise_weights(weights: &[(Address, Amount)]) -> BTreeMap<Address, Amount> {
    let mut merged: BTreeMap<Address, Amount> = BTreeMap::new();
    for (addr, weight) in weights {
        if weight.is_zero() {
            continue;
        }
        merged
            .entry(*addr)
            .and_modify(|existing| *existing = existing.clone() + weight.clone())
            .or_insert_with(|| weight.clone());
    }
    merged.retain(|_, w| !w.is_zero());
    merged
}

/// `distribute(epoch, pool, weights, bucket)` (spec §4.6). Pure aside from
/// the `RoundingBucket` mutation, which is itself lock-guarded and
/// side-effect-free (no I/O), so this is safe to call from any thread.
pub fn distribute(
    epoch: u64,
    pool: Amount,
    weights: &[(Address, Amount)],
    bucket: &RoundingBucket,
) -> DistributionOutcome {
    let normalised = normalise_weights(weights);
    let effective_p = pool + bucket.take();

    let total_weight: Amount = normalised.values().cloned().sum();
    if total_weight.is_zero() {
        bucket.add(effective_p.clone());
        info!(epoch, dust = %effective_p, "zero total weight, entire pool carried as dust");
        return DistributionOutcome {
            epoch,
            shares: Vec::new(),
            dust: effective_p,
        };
    }

    let mut shares = Vec::with_capacity(normalised.len());
    let mut assigned = Amount::zero();
    for (addr, weight) in &normalised {
        let share = Amount(mul_div_floor_big(&effective_p.0, &weight.0, &total_weight.0));
        assigned = assigned + share.clone();
        shares.push(RewardShare {
            address: *addr,
            amount: share,
        });
    }

    let dust = effective_p.saturating_sub(&assigned);
    bucket.add(dust.clone());
    info!(epoch, assigned = %assigned, dust = %dust, "epoch distribution computed");

    DistributionOutcome { epoch, shares, dust }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    #[test]
    fn scenario_3_reward_split_with_dust_across_two_epochs() {
        let bucket = RoundingBucket::new();
        let weights = vec![(addr(1), Amount::from_u64(1)), (addr(2), Amount::from_u64(2))];

        let first = distribute(1, Amount::from_u64(10), &weights, &bucket);
        assert_eq!(
            first.shares,
            vec![
                RewardShare { address: addr(1), amount: Amount::from_u64(3) },
                RewardShare { address: addr(2), amount: Amount::from_u64(6) },
            ]
        );
        assert_eq!(first.dust, Amount::from_u64(1));
        assert_eq!(bucket.carry(), Amount::from_u64(1));

        let second = distribute(2, Amount::from_u64(5), &weights, &bucket);
        assert_eq!(
            second.shares,
            vec![
                RewardShare { address: addr(1), amount: Amount::from_u64(2) },
                RewardShare { address: addr(2), amount: Amount::from_u64(4) },
            ]
        );
        assert_eq!(second.dust, Amount::zero());
        assert_eq!(bucket.carry(), Amount::zero());
    }

    #[test]
    fn zero_total_weight_carries_entire_pool_as_dust() {
        let bucket = RoundingBucket::new();
        let weights = vec![(addr(1), Amount::zero())];
        let outcome = distribute(1, Amount::from_u64(42), &weights, &bucket);
        assert!(outcome.shares.is_empty());
        assert_eq!(outcome.dust, Amount::from_u64(42));
        assert_eq!(bucket.carry(), Amount::from_u64(42));
    }

    #[test]
    fn duplicate_addresses_are_merged_by_addition() {
        let bucket = RoundingBucket::new();
        let weights = vec![
            (addr(1), Amount::from_u64(1)),
            (addr(1), Amount::from_u64(1)),
            (addr(2), Amount::from_u64(2)),
        ];
        let outcome = distribute(1, Amount::from_u64(40), &weights, &bucket);
        // Merged weight for addr(1) is 2, so both addresses split evenly.
        assert_eq!(outcome.shares[0], RewardShare { address: addr(1), amount: Amount::from_u64(20) });
        assert_eq!(outcome.shares[1], RewardShare { address: addr(2), amount: Amount::from_u64(20) });
    }

    #[test]
    fn reconciliation_invariant_holds_over_consecutive_epochs() {
        let bucket = RoundingBucket::new();
        let weights = vec![(addr(1), Amount::from_u64(3)), (addr(2), Amount::from_u64(7))];
        let pools = [Amount::from_u64(10), Amount::from_u64(3), Amount::from_u64(1)];
        let mut total_in = Amount::zero();
        let mut total_out = Amount::zero();
        for (epoch, pool) in pools.into_iter().enumerate() {
            total_in = total_in + pool.clone();
            let outcome = distribute(epoch as u64, pool, &weights, &bucket);
            total_out = total_out + outcome.shares.iter().map(|s| s.amount.clone()).sum::<Amount>();
        }
        assert_eq!(total_out + bucket.carry(), total_in);
    }

    proptest::proptest! {
        // spec §8: "∀ reward distribution: Σ shares + dust = effectivePool"
        // over any prefix of epochs, tokens are neither created nor
        // destroyed by rounding (spec §4.6 reconciliation invariant).
        #[test]
        fn reconciliation_holds_for_arbitrary_pools_and_weights(
            w1 in 0u64..1000,
            w2 in 0u64..1000,
            w3 in 0u64..1000,
            pools in proptest::collection::vec(0u64..10_000, 1..8),
        ) {
            let bucket = RoundingBucket::new();
            let weights = vec![
                (addr(1), Amount::from_u64(w1)),
                (addr(2), Amount::from_u64(w2)),
                (addr(3), Amount::from_u64(w3)),
            ];
            let mut total_in = Amount::zero();
            let mut total_out = Amount::zero();
            for (epoch, pool) in pools.into_iter().enumerate() {
                let pool = Amount::from_u64(pool);
                total_in = total_in + pool.clone();
                let outcome = distribute(epoch as u64, pool, &weights, &bucket);
                let shares_sorted_by_address = outcome
                    .shares
                    .windows(2)
                    .all(|pair| pair[0].address < pair[1].address);
                proptest::prop_assert!(shares_sorted_by_address);
                total_out = total_out + outcome.shares.iter().map(|s| s.amount.clone()).sum::<Amount>();
            }
            proptest::prop_assert_eq!(total_out + bucket.carry(), total_in);
        }
    }
}
