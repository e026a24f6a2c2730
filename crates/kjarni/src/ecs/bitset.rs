//! Fixed-capacity component signature.
//!
//! Every entity and archetype is described by the set of component ids it
//! carries. A [`BitSet`] stores that set as four machine words, so membership,
//! insertion and superset tests are a handful of bit operations and the whole
//! signature is `Copy` and usable as a hash-map key.

use std::fmt;

use super::component::ComponentId;

/// Maximum number of distinct component types per process.
pub const MAX_COMPONENTS: usize = 256;

const WORDS: usize = MAX_COMPONENTS / 64;

/// A set of [`ComponentId`]s backed by `MAX_COMPONENTS` bits.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitSet {
    words: [u64; WORDS],
}

impl BitSet {
    pub const EMPTY: BitSet = BitSet { words: [0; WORDS] };

    pub const fn new() -> Self {
        Self::EMPTY
    }

    #[inline]
    fn split(id: ComponentId) -> (usize, u64) {
        let index = id.index();
        (index / 64, 1u64 << (index % 64))
    }

    /// Insert `id`. Returns `true` if it was not already present.
    #[inline]
    pub fn insert(&mut self, id: ComponentId) -> bool {
        let (word, mask) = Self::split(id);
        let fresh = self.words[word] & mask == 0;
        self.words[word] |= mask;
        fresh
    }

    /// Remove `id`. Returns `true` if it was present.
    #[inline]
    pub fn remove(&mut self, id: ComponentId) -> bool {
        let (word, mask) = Self::split(id);
        let present = self.words[word] & mask != 0;
        self.words[word] &= !mask;
        present
    }

    #[inline]
    pub fn contains(&self, id: ComponentId) -> bool {
        let (word, mask) = Self::split(id);
        self.words[word] & mask != 0
    }

    /// Copy of this set with `id` added.
    pub fn with(mut self, id: ComponentId) -> Self {
        self.insert(id);
        self
    }

    /// Copy of this set with `id` removed.
    pub fn without(mut self, id: ComponentId) -> Self {
        self.remove(id);
        self
    }

    /// `true` if every id in `other` is also in `self`.
    pub fn is_superset(&self, other: &BitSet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == *b)
    }

    pub fn is_disjoint(&self, other: &BitSet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == 0)
    }

    pub fn union(&self, other: &BitSet) -> BitSet {
        let mut out = *self;
        for (a, b) in out.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn clear(&mut self) {
        self.words = [0; WORDS];
    }

    /// Ids in ascending order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            words: &self.words,
            word: 0,
            bits: self.words[0],
        }
    }
}

/// Ascending iterator over the ids of a [`BitSet`].
pub struct Iter<'a> {
    words: &'a [u64; WORDS],
    word: usize,
    bits: u64,
}

impl Iterator for Iter<'_> {
    type Item = ComponentId;

    fn next(&mut self) -> Option<ComponentId> {
        loop {
            if self.bits != 0 {
                let bit = self.bits.trailing_zeros() as usize;
                self.bits &= self.bits - 1;
                return Some(ComponentId::from_index(self.word * 64 + bit));
            }
            self.word += 1;
            if self.word >= WORDS {
                return None;
            }
            self.bits = self.words[self.word];
        }
    }
}

impl<'a> IntoIterator for &'a BitSet {
    type Item = ComponentId;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}

impl FromIterator<ComponentId> for BitSet {
    fn from_iter<I: IntoIterator<Item = ComponentId>>(iter: I) -> Self {
        let mut set = BitSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|id| id.index())).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(i: usize) -> ComponentId {
        ComponentId::from_index(i)
    }

    #[test]
    fn insert_remove_contains() {
        let mut set = BitSet::new();
        assert!(set.is_empty());
        assert!(set.insert(id(3)));
        assert!(!set.insert(id(3)));
        assert!(set.insert(id(200)));
        assert!(set.contains(id(3)));
        assert!(set.contains(id(200)));
        assert!(!set.contains(id(4)));
        assert_eq!(set.len(), 2);

        assert!(set.remove(id(3)));
        assert!(!set.remove(id(3)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let a: BitSet = [id(1), id(70), id(5)].into_iter().collect();
        let b: BitSet = [id(5), id(1), id(70)].into_iter().collect();
        assert_eq!(a, b);

        let mut seen = std::collections::HashSet::new();
        seen.insert(a);
        assert!(seen.contains(&b));
    }

    #[test]
    fn iterates_ascending_across_words() {
        let set: BitSet = [id(255), id(0), id(64), id(63), id(130)].into_iter().collect();
        let ids: Vec<usize> = set.iter().map(|c| c.index()).collect();
        assert_eq!(ids, vec![0, 63, 64, 130, 255]);
    }

    #[test]
    fn superset_and_disjoint() {
        let big: BitSet = [id(1), id(2), id(100)].into_iter().collect();
        let small: BitSet = [id(2), id(100)].into_iter().collect();
        let other: BitSet = [id(7)].into_iter().collect();

        assert!(big.is_superset(&small));
        assert!(!small.is_superset(&big));
        assert!(big.is_superset(&BitSet::EMPTY));
        assert!(big.is_disjoint(&other));
        assert!(!big.is_disjoint(&small));
        assert_eq!(small.union(&other).len(), 3);
    }

    #[test]
    fn debug_lists_indices() {
        let set = BitSet::new().with(id(9)).with(id(2));
        assert_eq!(format!("{set:?}"), "{2, 9}");
        assert_eq!(format!("{:?}", set.without(id(9))), "{2}");
    }
}
