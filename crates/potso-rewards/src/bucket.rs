//! The RoundingBucket (spec §3): a process-wide, non-negative dust carry
//! forwarded across epochs so integer-division remainders are never lost.

use std::sync::RwLock;

use potso_types::Amount;

/// Thread-safe carry accumulator. Mirrors `WeightLedger`'s single
/// `RwLock`-guarded state: no I/O happens under the lock, so it is always
/// held for the shortest possible scope.
pub struct RoundingBucket {
    carry: RwLock<Amount>,
}

impl RoundingBucket {
    pub fn new() -> Self {
        Self {
            carry: RwLock::new(Amount::zero()),
        }
    }

    pub fn carry(&self) -> Amount {
        self.carry.read().unwrap().clone()
    }

    /// Take the current carry and reset it to zero, in one locked step
    /// (spec §4.6 step 2: "effectiveP := P + B.carry; reset B.carry := 0").
    pub fn take(&self) -> Amount {
        let mut carry = self.carry.write().unwrap();
        std::mem::replace(&mut *carry, Amount::zero())
    }

    pub fn add(&self, dust: Amount) {
        let mut carry = self.carry.write().unwrap();
        *carry = std::mem::replace(&mut *carry, Amount::zero()) + dust;
    }
}

impl Default for RoundingBucket {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_resets_to_zero() {
        let bucket = RoundingBucket::new();
        bucket.add(Amount::from_u64(5));
        assert_eq!(bucket.take(), Amount::from_u64(5));
        assert_eq!(bucket.carry(), Amount::zero());
    }

    #[test]
    fn add_accumulates() {
        let bucket = RoundingBucket::new();
        bucket.add(Amount::from_u64(1));
        bucket.add(Amount::from_u64(2));
        assert_eq!(bucket.carry(), Amount::from_u64(3));
    }
}
