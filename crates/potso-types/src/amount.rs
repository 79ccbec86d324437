//! Non-negative arbitrary-precision amount, used for weights, penalties and
//! reward shares alike (spec §3: "BigInt — arbitrary-precision non-negative
//! integer").

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Deref, Sub};

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::TypesError;

/// A non-negative arbitrary-precision integer.
///
/// Thin wrapper around `BigUint` rather than a bare type alias so that
/// negative-rejection and decimal-string formatting (used by reward
/// checksums) live in one place.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub BigUint);

impl Amount {
    pub fn zero() -> Self {
        Amount(BigUint::zero())
    }

    pub fn from_u64(v: u64) -> Self {
        Amount(BigUint::from(v))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Saturating subtraction, clamped at zero (amounts are non-negative by
    /// construction; callers that need to detect underflow should compare
    /// operands before calling).
    pub fn saturating_sub(&self, other: &Amount) -> Amount {
        if self.0 < other.0 {
            Amount::zero()
        } else {
            Amount(&self.0 - &other.0)
        }
    }

    pub fn decimal_string(&self) -> String {
        self.0.to_string()
    }

    /// Parse a non-negative decimal string. Used when reading back
    /// persisted reward entries.
    pub fn parse_decimal(s: &str) -> Result<Self, TypesError> {
        s.parse::<BigUint>()
            .map(Amount)
            .map_err(|_| TypesError::NegativeAmount)
    }
}

impl Deref for Amount {
    type Target = BigUint;
    fn deref(&self) -> &BigUint {
        &self.0
    }
}

impl From<BigUint> for Amount {
    fn from(v: BigUint) -> Self {
        Amount(v)
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Amount::from_u64(v)
    }
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl<'a> Add<&'a Amount> for &'a Amount {
    type Output = Amount;
    fn add(self, rhs: &'a Amount) -> Amount {
        Amount(&self.0 + &rhs.0)
    }
}

impl Sub for Amount {
    type Output = Amount;
    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |acc, x| acc + x)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Amount {
    fn default() -> Self {
        Amount::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturating_sub_clamps_at_zero() {
        let a = Amount::from_u64(5);
        let b = Amount::from_u64(10);
        assert_eq!(a.saturating_sub(&b), Amount::zero());
    }

    #[test]
    fn decimal_roundtrip() {
        let a = Amount::from_u64(123456789);
        let s = a.decimal_string();
        assert_eq!(Amount::parse_decimal(&s).unwrap(), a);
    }
}
