//! Exact bit-length-set arithmetic.
//!
//! A [`BitLengthSet`] is the finite set of every serialized length, in
//! bits, that a type can produce. Sets are combined with concatenation
//! (the pairwise-sum set) as fields are appended, and with plain set
//! union as union alternatives are collected. All operations are exact;
//! nothing is approximated or truncated.

use std::collections::BTreeSet;
use std::fmt;

/// An exact, finite, non-empty set of possible serialized bit lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitLengthSet {
    lengths: BTreeSet<u64>,
}

impl BitLengthSet {
    /// The singleton set `{n}`.
    pub fn singleton(n: u64) -> Self {
        Self {
            lengths: BTreeSet::from([n]),
        }
    }

    /// The identity of concatenation, `{0}`: the length set of nothing.
    pub fn zero() -> Self {
        Self::singleton(0)
    }

    /// Builds a set from arbitrary elements. Empty input yields `{0}`.
    pub fn from_lengths(lengths: impl IntoIterator<Item = u64>) -> Self {
        let lengths: BTreeSet<u64> = lengths.into_iter().collect();
        if lengths.is_empty() {
            Self::zero()
        } else {
            Self { lengths }
        }
    }

    /// Concatenation: `{a + b | a in self, b in other}`.
    ///
    /// Commutative and associative, with [`BitLengthSet::zero`] as the
    /// identity. Models appending one serialized object after another.
    pub fn concatenate(&self, other: &Self) -> Self {
        let mut lengths = BTreeSet::new();
        for a in &self.lengths {
            for b in &other.lengths {
                lengths.insert(a + b);
            }
        }
        Self { lengths }
    }

    /// Set union. Models alternatives: either length may occur.
    pub fn unite(&self, other: &Self) -> Self {
        Self {
            lengths: self.lengths.union(&other.lengths).copied().collect(),
        }
    }

    /// N-ary union over any number of sets. Empty input yields `{0}`.
    pub fn unify_over(sets: impl IntoIterator<Item = Self>) -> Self {
        let mut lengths = BTreeSet::new();
        for set in sets {
            lengths.extend(set.lengths);
        }
        if lengths.is_empty() {
            Self::zero()
        } else {
            Self { lengths }
        }
    }

    /// Concatenation of `count` copies of this set (fixed-length array).
    pub fn repeat(&self, count: u64) -> Self {
        // Singleton sets are the common case and close in one step.
        if let Some(&only) = self.single_element() {
            return Self::singleton(only * count);
        }
        let mut result = Self::zero();
        for _ in 0..count {
            result = result.concatenate(self);
        }
        result
    }

    /// Union of 0..=`count` concatenated copies (variable-length array
    /// payloads, before the length tag is prepended).
    pub fn repeat_up_to(&self, count: u64) -> Self {
        if let Some(&only) = self.single_element() {
            return Self::from_lengths((0..=count).map(|k| only * k));
        }
        let mut result = Self::zero();
        let mut power = Self::zero();
        for _ in 0..count {
            power = power.concatenate(self);
            result = result.unite(&power);
        }
        result
    }

    /// Rounds every element up to the next multiple of eight.
    pub fn pad_to_byte(&self) -> Self {
        Self {
            lengths: self.lengths.iter().map(|n| n.next_multiple_of(8)).collect(),
        }
    }

    /// The smallest possible serialized length.
    pub fn min(&self) -> u64 {
        *self.lengths.first().expect("bit length set is never empty")
    }

    /// The largest possible serialized length.
    pub fn max(&self) -> u64 {
        *self.lengths.last().expect("bit length set is never empty")
    }

    /// True iff every element is a multiple of `bits`.
    ///
    /// Alignments of zero and one are trivially satisfied.
    pub fn is_aligned_at(&self, bits: u64) -> bool {
        if bits < 2 {
            return true;
        }
        self.lengths.iter().all(|n| n % bits == 0)
    }

    /// True iff every element is a multiple of eight.
    pub fn is_aligned_at_byte(&self) -> bool {
        self.is_aligned_at(8)
    }

    /// The number of distinct lengths.
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    /// Always false; the set invariantly holds at least one element.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// True iff `length` is a possible serialized length.
    pub fn contains(&self, length: u64) -> bool {
        self.lengths.contains(&length)
    }

    /// Iterates the lengths in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.lengths.iter().copied()
    }

    fn single_element(&self) -> Option<&u64> {
        if self.lengths.len() == 1 {
            self.lengths.first()
        } else {
            None
        }
    }
}

impl fmt::Display for BitLengthSet {
    /// `{8, 16, 24}` rendering, used by diagnostics.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (index, length) in self.lengths.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{length}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_and_zero() {
        assert_eq!(BitLengthSet::singleton(8).min(), 8);
        assert_eq!(BitLengthSet::singleton(8).max(), 8);
        assert_eq!(BitLengthSet::zero(), BitLengthSet::singleton(0));
    }

    #[test]
    fn concatenate_pairwise_sums() {
        let a = BitLengthSet::from_lengths([0, 8]);
        let b = BitLengthSet::from_lengths([1, 16]);
        let c = a.concatenate(&b);
        assert_eq!(c, BitLengthSet::from_lengths([1, 16, 9, 24]));
    }

    #[test]
    fn concatenate_laws() {
        let a = BitLengthSet::from_lengths([1, 2]);
        let b = BitLengthSet::from_lengths([10, 20]);
        let c = BitLengthSet::from_lengths([100]);

        // Commutativity and associativity.
        assert_eq!(a.concatenate(&b), b.concatenate(&a));
        assert_eq!(
            a.concatenate(&b).concatenate(&c),
            a.concatenate(&b.concatenate(&c))
        );

        // {0} is the identity.
        assert_eq!(a.concatenate(&BitLengthSet::zero()), a);

        // Monotonicity of the extrema.
        let combined = a.concatenate(&b);
        assert_eq!(combined.min(), a.min() + b.min());
        assert_eq!(combined.max(), a.max() + b.max());
    }

    #[test]
    fn unite_and_unify_over() {
        let a = BitLengthSet::from_lengths([1, 2]);
        let b = BitLengthSet::from_lengths([2, 3]);
        assert_eq!(a.unite(&b), BitLengthSet::from_lengths([1, 2, 3]));

        let united = BitLengthSet::unify_over([a, b, BitLengthSet::singleton(9)]);
        assert_eq!(united, BitLengthSet::from_lengths([1, 2, 3, 9]));
        assert_eq!(BitLengthSet::unify_over([]), BitLengthSet::zero());
    }

    #[test]
    fn repeat_fixed_array() {
        assert_eq!(BitLengthSet::singleton(8).repeat(3), BitLengthSet::singleton(24));
        assert_eq!(BitLengthSet::singleton(8).repeat(0), BitLengthSet::zero());

        let varying = BitLengthSet::from_lengths([1, 2]);
        assert_eq!(varying.repeat(2), BitLengthSet::from_lengths([2, 3, 4]));
    }

    #[test]
    fn repeat_up_to_variable_array() {
        // Payload lengths of `uint8[<=3]`, before the 2-bit length tag.
        let payload = BitLengthSet::singleton(8).repeat_up_to(3);
        assert_eq!(payload, BitLengthSet::from_lengths([0, 8, 16, 24]));

        let varying = BitLengthSet::from_lengths([1, 2]).repeat_up_to(2);
        assert_eq!(varying, BitLengthSet::from_lengths([0, 1, 2, 3, 4]));
    }

    #[test]
    fn pad_to_byte_rounds_up() {
        let set = BitLengthSet::from_lengths([0, 1, 8, 9]);
        assert_eq!(set.pad_to_byte(), BitLengthSet::from_lengths([0, 8, 16]));
    }

    #[test]
    fn alignment() {
        let aligned = BitLengthSet::from_lengths([0, 8, 32]);
        assert!(aligned.is_aligned_at_byte());
        assert!(aligned.is_aligned_at(4));
        assert!(aligned.is_aligned_at(1));
        assert!(aligned.is_aligned_at(0));

        let unaligned = BitLengthSet::from_lengths([8, 12]);
        assert!(!unaligned.is_aligned_at_byte());
        assert!(unaligned.is_aligned_at(4));
    }

    #[test]
    fn display_form() {
        let set = BitLengthSet::from_lengths([2, 10, 18, 26]);
        assert_eq!(set.to_string(), "{2, 10, 18, 26}");
    }

    #[test]
    fn never_empty() {
        let set = BitLengthSet::from_lengths([]);
        assert!(!set.is_empty());
        assert_eq!(set.min(), 0);
    }
}
