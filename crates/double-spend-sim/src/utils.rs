//! Helper functions and data types

use rand::Rng;

/// Multiset of node indices which supports removal of a uniformly random
/// element in constant time.
#[derive(Debug, Clone, Default)]
pub(crate) struct RandomMultiset {
    items: Vec<usize>,
}

impl RandomMultiset {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { items: Vec::with_capacity(capacity) }
    }

    /// Adds `count` copies of `item`.
    pub fn insert_n(&mut self, item: usize, count: usize) {
        self.items.extend(std::iter::repeat(item).take(count));
    }

    pub fn insert(&mut self, item: usize) {
        self.items.push(item);
    }

    /// Removes and returns a uniformly random element, or `None` if the set is
    /// empty.
    pub fn remove_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<usize> {
        if self.items.is_empty() {
            return None;
        }

        let index = rng.gen_range(0..self.items.len());
        Some(self.items.swap_remove(index))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Logarithm of `value` to the given `base`.
#[inline]
pub(crate) fn log_base(base: f64, value: f64) -> f64 {
    value.ln() / base.ln()
}
