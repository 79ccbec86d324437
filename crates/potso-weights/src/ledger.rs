//! The Weight Ledger (spec §4.1): bounded per-validator `{base, current}`
//! weights with idempotency markers for applied penalties.
//!
//! Grounded in the teacher's `bpi-validator-set` crate: a `BTreeMap`-backed
//! set (here keyed by `Address` rather than index) so that every iteration
//! that feeds a deterministic output — quorum totals, proposer selection,
//! reward snapshots — walks entries in ascending address order rather than
//! relying on hash-map iteration order (spec §9).

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use potso_types::{clamp_biguint, Address, Amount, Hash32};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WeightLedgerError {
    #[error("floor ({floor}) must not exceed ceiling ({ceiling})")]
    InvalidBounds { floor: String, ceiling: String },
}

/// A validator's bonded and live weight (spec §3 `ValidatorWeight`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorWeight {
    pub base: Amount,
    pub current: Amount,
}

/// Result of `ApplyDecay` (spec §4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecayResult {
    pub previous: Amount,
    pub current: Amount,
    pub applied: Amount,
    pub clamped: bool,
}

fn marker_key(hash: &Hash32, offender: &Address) -> String {
    format!("{}:{}", hash.to_hex(), offender.to_hex())
}

struct LedgerState {
    floor: Amount,
    ceiling: Amount,
    entries: BTreeMap<Address, ValidatorWeight>,
    penalty_markers: HashSet<String>,
}

impl LedgerState {
    fn clamp(&self, value: Amount) -> Amount {
        Amount(clamp_biguint(value.0, &self.floor, &self.ceiling))
    }

    fn default_weight(&self) -> ValidatorWeight {
        ValidatorWeight {
            base: self.floor.clone(),
            current: self.floor.clone(),
        }
    }
}

/// Bounded per-validator weight store, parameterised by `floor <= ceiling`.
///
/// All mutation goes through a single exclusive lock (`RwLock::write`);
/// pure reads (`entry`, `floor`, `ceiling`, `was_penalty_applied`) take a
/// shared lock. No operation here performs I/O, so lock scope is never a
/// concern for the "no lock held across I/O" rule in spec §5 — that rule
/// binds the Evidence Store and Reward Ledger, which do touch the KV store.
pub struct WeightLedger {
    state: RwLock<LedgerState>,
}

impl WeightLedger {
    pub fn new(floor: Amount, ceiling: Amount) -> Result<Self, WeightLedgerError> {
        if floor > ceiling {
            return Err(WeightLedgerError::InvalidBounds {
                floor: floor.decimal_string(),
                ceiling: ceiling.decimal_string(),
            });
        }
        Ok(Self {
            state: RwLock::new(LedgerState {
                floor,
                ceiling,
                entries: BTreeMap::new(),
                penalty_markers: HashSet::new(),
            }),
        })
    }

    pub fn floor(&self) -> Amount {
        self.state.read().unwrap().floor.clone()
    }

    pub fn ceiling(&self) -> Amount {
        self.state.read().unwrap().ceiling.clone()
    }

    /// `Entry(addr) -> {base, current}`. Unknown addresses default both
    /// fields to `floor` without creating a visible entry (creation happens
    /// lazily on first mutating reference, per spec §3's lifecycle note).
    pub fn entry(&self, addr: &Address) -> ValidatorWeight {
        let state = self.state.read().unwrap();
        state
            .entries
            .get(addr)
            .cloned()
            .unwrap_or_else(|| state.default_weight())
    }

    /// `Set(addr, base?, value?) -> entry`. `current` is always re-clamped
    /// into `[floor, ceiling]` after the update.
    pub fn set(&self, addr: Address, base: Option<Amount>, value: Option<Amount>) -> ValidatorWeight {
        let mut state = self.state.write().unwrap();
        let mut entry = state
            .entries
            .get(&addr)
            .cloned()
            .unwrap_or_else(|| state.default_weight());
        if let Some(b) = base {
            entry.base = b;
        }
        if let Some(v) = value {
            entry.current = v;
        }
        entry.current = state.clamp(entry.current);
        state.entries.insert(addr, entry.clone());
        entry
    }

    /// `ApplyDecay(addr, amount) -> {previous, current, applied, clamped}`.
    pub fn apply_decay(&self, addr: Address, amount: Amount) -> DecayResult {
        let mut state = self.state.write().unwrap();
        let mut entry = state
            .entries
            .get(&addr)
            .cloned()
            .unwrap_or_else(|| state.default_weight());
        let previous = entry.current.clone();
        let target = previous.saturating_sub(&amount);
        let clamped_target = state.clamp(target.clone());
        let applied = previous.saturating_sub(&clamped_target);
        let clamped = clamped_target != target || applied != amount;
        entry.current = clamped_target.clone();
        state.entries.insert(addr, entry);
        DecayResult {
            previous,
            current: clamped_target,
            applied,
            clamped,
        }
    }

    /// `SetBounds(floor', ceiling')`: re-clamps every existing entry in one
    /// pass, under the same exclusive lock used by every other mutation.
    pub fn set_bounds(&self, floor: Amount, ceiling: Amount) -> Result<(), WeightLedgerError> {
        if floor > ceiling {
            return Err(WeightLedgerError::InvalidBounds {
                floor: floor.decimal_string(),
                ceiling: ceiling.decimal_string(),
            });
        }
        let mut state = self.state.write().unwrap();
        state.floor = floor;
        state.ceiling = ceiling;
        let keys: Vec<Address> = state.entries.keys().copied().collect();
        for addr in keys {
            let entry = state.entries.get_mut(&addr).unwrap();
            entry.current = Amount(clamp_biguint(entry.current.clone().0, &state.floor, &state.ceiling));
        }
        Ok(())
    }

    pub fn was_penalty_applied(&self, hash: &Hash32, offender: &Address) -> bool {
        self.state
            .read()
            .unwrap()
            .penalty_markers
            .contains(&marker_key(hash, offender))
    }

    pub fn mark_penalty_applied(&self, hash: &Hash32, offender: &Address) {
        self.state
            .write()
            .unwrap()
            .penalty_markers
            .insert(marker_key(hash, offender));
    }

    /// Ordered snapshot of every known validator's current weight, used by
    /// the BFT quorum computation and the reward distributor. Addresses
    /// with no entry are simply absent (callers supply the validator set
    /// separately; this only reflects what has actually been touched).
    pub fn snapshot(&self) -> BTreeMap<Address, Amount> {
        self.state
            .read()
            .unwrap()
            .entries
            .iter()
            .map(|(addr, w)| (*addr, w.current.clone()))
            .collect()
    }
}
