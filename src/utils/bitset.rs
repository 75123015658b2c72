//! Fixed-capacity bit set over dense indices.
//!
//! Derived pipelines are views of the universal catalog: the set of included
//! catalog nodes is one `BitSet` indexed by node position. Two derivations are
//! structurally equal exactly when their sets are equal, and deriving from an
//! already-derived base is an intersection.
//!
//! # Example
//!
//! ```rust,ignore
//! use pcodeflow::utils::BitSet;
//!
//! let mut view = BitSet::new(12);
//! view.insert(0);
//! view.insert(7);
//!
//! assert!(view.contains(7));
//! assert_eq!(view.iter().collect::<Vec<_>>(), vec![0, 7]);
//! ```

/// A fixed-capacity set of small indices, 64 per word.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: Vec<u64>,
    len: usize,
}

impl BitSet {
    /// Creates an empty set able to hold indices `0..capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            len: capacity,
        }
    }

    /// Creates a set containing every index below `capacity`.
    #[must_use]
    pub fn full(capacity: usize) -> Self {
        let mut set = Self::new(capacity);
        for word in &mut set.words {
            *word = u64::MAX;
        }
        if capacity % 64 != 0 {
            if let Some(last) = set.words.last_mut() {
                *last = (1u64 << (capacity % 64)) - 1;
            }
        }
        set
    }

    /// Returns the capacity of this set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no index is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Adds `index` to the set. Returns `true` if it was not present before.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn insert(&mut self, index: usize) -> bool {
        assert!(index < self.len, "index out of bounds");
        let bit = 1u64 << (index % 64);
        let word = &mut self.words[index / 64];
        let fresh = *word & bit == 0;
        *word |= bit;
        fresh
    }

    /// Removes `index` from the set.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn remove(&mut self, index: usize) {
        assert!(index < self.len, "index out of bounds");
        self.words[index / 64] &= !(1u64 << (index % 64));
    }

    /// Returns `true` if `index` is present. Out-of-range indices are absent.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        index < self.len && self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// Returns the number of indices present.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Intersects with `other` in place. Returns `true` if `self` changed.
    ///
    /// # Panics
    ///
    /// Panics if the capacities differ.
    pub fn intersect_with(&mut self, other: &Self) -> bool {
        assert_eq!(self.len, other.len, "bit sets must have same length");
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            let old = *a;
            *a &= *b;
            changed |= old != *a;
        }
        changed
    }

    /// Returns `true` if every index of `self` is also in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.len == other.len
            && self
                .words
                .iter()
                .zip(&other.words)
                .all(|(a, b)| a & !b == 0)
    }

    /// Iterates over the present indices in ascending order.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            set: self,
            word_idx: 0,
            pending: self.words.first().copied().unwrap_or(0),
        }
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Iterator over the indices present in a [`BitSet`].
pub struct BitSetIter<'a> {
    set: &'a BitSet,
    word_idx: usize,
    pending: u64,
}

impl Iterator for BitSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.pending != 0 {
                let bit = self.pending.trailing_zeros() as usize;
                self.pending &= self.pending - 1;
                return Some(self.word_idx * 64 + bit);
            }
            self.word_idx += 1;
            self.pending = *self.set.words.get(self.word_idx)?;
        }
    }
}
