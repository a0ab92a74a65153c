//! Length-based blockchain representation and the longest-chain rule

use std::{cmp::Ordering, fmt::Display};

/// Marks which side of a double-spend fork a [`Blockchain`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// The chain contains the legitimate payment.
    Legit,
    /// The chain contains the attacker's conflicting transaction.
    DoubleSpend,
}

/// A node's view of the blockchain.
///
/// Blocks carry no content in this model, so a chain is fully described by
/// its length, the difficulty it is mined at and an optional [`Tag`]. Chains
/// are owned by exactly one node and are replaced wholesale when a better
/// chain is received; copies sent to peers are independent values.
#[derive(Debug, Clone, PartialEq)]
pub struct Blockchain {
    length: u64,
    difficulty: f64,
    tag: Option<Tag>,
}

impl Blockchain {
    /// Creates an empty chain mined at the given per-tick success
    /// probability.
    pub fn new(difficulty: f64, tag: Option<Tag>) -> Self {
        Self { length: 0, difficulty, tag }
    }

    /// Creates a chain which already contains `length` blocks.
    pub fn with_length(length: u64, difficulty: f64, tag: Option<Tag>) -> Self {
        Self { length, difficulty, tag }
    }

    #[inline]
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Probability that a single mining tick finds a block on this chain.
    #[inline]
    pub fn difficulty(&self) -> f64 {
        self.difficulty
    }

    #[inline]
    pub fn tag(&self) -> Option<Tag> {
        self.tag
    }

    /// Returns true iff this chain contains the attacker's conflicting
    /// transaction.
    #[inline]
    pub fn carries_double_spend(&self) -> bool {
        self.tag == Some(Tag::DoubleSpend)
    }

    /// Appends one block to the tip of this chain.
    pub fn extend(&mut self) {
        self.length += 1;
    }

    /// Fork-choice comparison. Only the length of a chain is considered; two
    /// chains of equal length are equally good.
    #[inline]
    pub fn compare(&self, other: &Blockchain) -> Ordering {
        self.length.cmp(&other.length)
    }

    /// Returns true iff a node mining on `current` should switch to this
    /// chain under the longest-chain rule. Ties never cause a switch.
    #[inline]
    pub fn is_better_than(&self, current: &Blockchain) -> bool {
        self.compare(current) == Ordering::Greater
    }
}

impl Display for Blockchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.tag {
            None => write!(f, "[{}]", self.length),
            Some(Tag::Legit) => write!(f, "[{}; legit]", self.length),
            Some(Tag::DoubleSpend) => write!(f, "[{}; double spend]", self.length),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::{Blockchain, Tag};

    #[test]
    fn new_chain_is_empty() {
        let chain = Blockchain::new(0.5, Some(Tag::Legit));

        assert_eq!(chain.length(), 0);
        assert_eq!(chain.difficulty(), 0.5);
        assert!(!chain.carries_double_spend());
    }

    #[test]
    fn compare_only_looks_at_length() {
        let legit = Blockchain::with_length(4, 0.1, Some(Tag::Legit));
        let attack = Blockchain::with_length(4, 0.9, Some(Tag::DoubleSpend));
        let longer = Blockchain::with_length(5, 0.1, None);

        assert_eq!(legit.compare(&attack), Ordering::Equal);
        assert!(!attack.is_better_than(&legit));
        assert!(longer.is_better_than(&attack));
        assert!(!legit.is_better_than(&longer));
    }

    #[test]
    fn copies_are_independent() {
        let mut chain = Blockchain::new(0.1, Some(Tag::DoubleSpend));
        let copy = chain.clone();
        chain.extend();

        assert_eq!(chain.length(), 1);
        assert_eq!(copy.length(), 0);
        assert!(copy.carries_double_spend());
        assert_eq!(chain.to_string(), "[1; double spend]");
    }
}
