//! Fixed-capacity bit vector.
//!
//! Used for per-block live-in/live-out sets of virtual registers and for the
//! loop-nesting bitset of the predicated-break pass. Elements are small dense
//! integers (register numbers, loop depths), 64 per machine word.
//!
//! # Example
//!
//! ```rust
//! use simdcfg::utils::BitSet;
//!
//! let mut live = BitSet::new(96);
//! live.insert(3);
//! live.insert(70);
//!
//! assert!(live.contains(70));
//! assert_eq!(live.iter().collect::<Vec<_>>(), vec![3, 70]);
//! ```

/// A bit vector with a fixed number of addressable bits.
///
/// All mutating accessors panic when the index lies outside the capacity given
/// at construction, matching slice indexing.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BitSet {
    words: Vec<u64>,
    len: usize,
}

impl BitSet {
    /// Creates an empty set able to hold `capacity` bits.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            len: capacity,
        }
    }

    /// Number of addressable bits.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    #[inline]
    fn locate(&self, index: usize) -> (usize, u64) {
        assert!(
            index < self.len,
            "bit index {index} out of range for set of {}",
            self.len
        );
        (index / 64, 1u64 << (index % 64))
    }

    /// Sets bit `index`. Returns `true` if it was previously clear.
    pub fn insert(&mut self, index: usize) -> bool {
        let (word, mask) = self.locate(index);
        let was_clear = self.words[word] & mask == 0;
        self.words[word] |= mask;
        was_clear
    }

    /// Clears bit `index`. Returns `true` if it was previously set.
    pub fn remove(&mut self, index: usize) -> bool {
        let (word, mask) = self.locate(index);
        let was_set = self.words[word] & mask != 0;
        self.words[word] &= !mask;
        was_set
    }

    /// Tests bit `index`.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        let (word, mask) = self.locate(index);
        self.words[word] & mask != 0
    }

    /// Number of set bits.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Clears every bit.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// In-place union. Returns `true` if `self` changed.
    ///
    /// # Panics
    ///
    /// Panics if the capacities differ.
    pub fn union_with(&mut self, other: &Self) -> bool {
        self.combine(other, |a, b| a | b)
    }

    /// In-place intersection. Returns `true` if `self` changed.
    ///
    /// # Panics
    ///
    /// Panics if the capacities differ.
    pub fn intersect_with(&mut self, other: &Self) -> bool {
        self.combine(other, |a, b| a & b)
    }

    /// Removes every bit set in `other`. Returns `true` if `self` changed.
    ///
    /// # Panics
    ///
    /// Panics if the capacities differ.
    pub fn difference_with(&mut self, other: &Self) -> bool {
        self.combine(other, |a, b| a & !b)
    }

    fn combine(&mut self, other: &Self, op: impl Fn(u64, u64) -> u64) -> bool {
        assert_eq!(self.len, other.len, "bit sets must have same length");
        let mut changed = false;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            let next = op(*a, *b);
            changed |= next != *a;
            *a = next;
        }
        changed
    }

    /// Iterates over set bits in ascending order.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            words: &self.words,
            index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Iterator over the set bits of a [`BitSet`].
pub struct BitSetIter<'a> {
    words: &'a [u64],
    index: usize,
    current: u64,
}

impl Iterator for BitSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.index * 64 + bit);
            }
            self.index += 1;
            self.current = *self.words.get(self.index)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove_contains() {
        let mut set = BitSet::new(130);
        assert!(set.is_empty());

        assert!(set.insert(0));
        assert!(set.insert(64));
        assert!(set.insert(129));
        assert!(!set.insert(64));

        assert!(set.contains(129));
        assert!(!set.contains(1));
        assert_eq!(set.count(), 3);

        assert!(set.remove(64));
        assert!(!set.remove(64));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 129]);
    }

    #[test]
    fn test_live_set_transfer() {
        // in = use | (out - def)
        let mut out = BitSet::new(8);
        out.insert(1);
        out.insert(2);
        let mut def = BitSet::new(8);
        def.insert(2);
        let mut uses = BitSet::new(8);
        uses.insert(5);

        let mut live_in = out.clone();
        assert!(live_in.difference_with(&def));
        assert!(live_in.union_with(&uses));
        assert!(!live_in.union_with(&uses));
        assert_eq!(live_in.iter().collect::<Vec<_>>(), vec![1, 5]);

        assert!(live_in.intersect_with(&out));
        assert_eq!(live_in.iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_clear_and_debug() {
        let mut set = BitSet::new(10);
        set.insert(3);
        set.insert(7);
        assert_eq!(format!("{set:?}"), "{3, 7}");
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.len(), 10);
    }

    #[test]
    fn test_zero_capacity() {
        let set = BitSet::new(0);
        assert!(set.is_empty());
        assert_eq!(set.iter().count(), 0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_panics() {
        let mut set = BitSet::new(4);
        set.insert(4);
    }
}
