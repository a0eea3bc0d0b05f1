//! Reduction operations and the numeric element types they run over.
//!
//! Every reduction is associative and commutative so that the merged result
//! does not depend on the order in which workers finish. Floating-point sums
//! are associative only up to rounding, which is why callers compare them with
//! a relative tolerance.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};
use std::str::FromStr;

/// A scalar that can be reduced and stored in a shared accumulator.
///
/// `to_bits`/`from_bits` give a lossless `u64` image so that the atomic
/// accumulator can hold any element type in a single `AtomicU64`.
pub trait Element: Copy + Send + Sync + PartialOrd + Debug + Display + 'static {
    /// Additive identity.
    const ZERO: Self;
    /// Identity of `min` (the largest representable value).
    const MIN_IDENTITY: Self;
    /// Identity of `max` (the smallest representable value).
    const MAX_IDENTITY: Self;

    fn add(self, other: Self) -> Self;
    fn to_bits(self) -> u64;
    fn from_bits(bits: u64) -> Self;
    fn to_f64(self) -> f64;
}

impl Element for i64 {
    const ZERO: Self = 0;
    const MIN_IDENTITY: Self = i64::MAX;
    const MAX_IDENTITY: Self = i64::MIN;

    #[inline]
    fn add(self, other: Self) -> Self {
        self.wrapping_add(other)
    }

    #[inline]
    fn to_bits(self) -> u64 {
        self as u64
    }

    #[inline]
    fn from_bits(bits: u64) -> Self {
        bits as i64
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Element for f64 {
    const ZERO: Self = 0.0;
    const MIN_IDENTITY: Self = f64::INFINITY;
    const MAX_IDENTITY: Self = f64::NEG_INFINITY;

    #[inline]
    fn add(self, other: Self) -> Self {
        self + other
    }

    #[inline]
    fn to_bits(self) -> u64 {
        f64::to_bits(self)
    }

    #[inline]
    fn from_bits(bits: u64) -> Self {
        f64::from_bits(bits)
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
}

/// Associative, commutative combine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

impl ReduceOp {
    pub const ALL: [ReduceOp; 3] = [ReduceOp::Sum, ReduceOp::Min, ReduceOp::Max];

    /// The value that leaves any other value unchanged under this operation.
    #[inline]
    pub fn identity<T: Element>(self) -> T {
        match self {
            ReduceOp::Sum => T::ZERO,
            ReduceOp::Min => T::MIN_IDENTITY,
            ReduceOp::Max => T::MAX_IDENTITY,
        }
    }

    #[inline]
    pub fn combine<T: Element>(self, a: T, b: T) -> T {
        match self {
            ReduceOp::Sum => a.add(b),
            // NaN never replaces the running value.
            ReduceOp::Min => {
                if b < a {
                    b
                } else {
                    a
                }
            }
            ReduceOp::Max => {
                if b > a {
                    b
                } else {
                    a
                }
            }
        }
    }

    /// Sequential fold, used as the single-worker reference.
    pub fn fold<T: Element>(self, values: impl IntoIterator<Item = T>) -> T {
        values
            .into_iter()
            .fold(self.identity(), |acc, v| self.combine(acc, v))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReduceOp::Sum => "sum",
            ReduceOp::Min => "min",
            ReduceOp::Max => "max",
        }
    }
}

impl Display for ReduceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReduceOp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" | "+" => Ok(ReduceOp::Sum),
            "min" => Ok(ReduceOp::Min),
            "max" => Ok(ReduceOp::Max),
            other => anyhow::bail!("Unknown reduction '{}', expected one of: sum, min, max", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identities_leave_values_unchanged() {
        for op in ReduceOp::ALL {
            for v in [-7i64, 0, 42] {
                assert_eq!(op.combine(op.identity(), v), v);
                assert_eq!(op.combine(v, op.identity()), v);
            }
            for v in [-1.5f64, 0.0, 99.9] {
                assert_eq!(op.combine(op.identity(), v), v);
            }
        }
    }

    #[test]
    fn float_identities_are_infinite() {
        assert_eq!(ReduceOp::Min.identity::<f64>(), f64::INFINITY);
        assert_eq!(ReduceOp::Max.identity::<f64>(), f64::NEG_INFINITY);
        assert_eq!(ReduceOp::Sum.identity::<f64>(), 0.0);
    }

    #[test]
    fn fold_matches_expected() {
        let data = [3i64, -1, 4, 1, 5, 9, 2, 6];
        assert_eq!(ReduceOp::Sum.fold(data), 29);
        assert_eq!(ReduceOp::Min.fold(data), -1);
        assert_eq!(ReduceOp::Max.fold(data), 9);
        assert_eq!(ReduceOp::Min.fold(Vec::<i64>::new()), i64::MAX);
    }

    #[test]
    fn bits_round_trip_negative_values() {
        assert_eq!(<i64 as Element>::from_bits((-5i64).to_bits()), -5);
        assert_eq!(<f64 as Element>::from_bits(Element::to_bits(-0.25f64)), -0.25);
    }

    #[test]
    fn parses_names() {
        assert_eq!("SUM".parse::<ReduceOp>().unwrap(), ReduceOp::Sum);
        assert_eq!("max".parse::<ReduceOp>().unwrap(), ReduceOp::Max);
        assert!("avg".parse::<ReduceOp>().is_err());
    }
}
