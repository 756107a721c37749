//! Fixed-universe bit set over the subexon indices of one window.

use bitvec::prelude::*;
use std::cmp::Ordering;

const WORD_BITS: usize = u64::BITS as usize;

/// Set of subexon indices `0..universe` that an alignment (or a group of
/// equivalent fragments) is compatible with.
///
/// Subexon 0 occupies the least significant bit. Ordering follows the lowest
/// differing bit: the set containing that subexon sorts first.
#[derive(Debug, Clone)]
pub struct SubexonSet {
    bits: BitVec<u64, Lsb0>,
}

impl SubexonSet {
    /// Empty set over a universe of `universe` subexons.
    pub fn new(universe: usize) -> Self {
        Self { bits: BitVec::repeat(false, universe) }
    }

    /// Size of the universe (number of subexons in the window).
    pub fn universe(&self) -> usize {
        self.bits.len()
    }

    /// True when no subexon is set.
    pub fn is_clear(&self) -> bool {
        self.bits.not_any()
    }

    pub fn set(&mut self, idx: usize) {
        self.bits.set(idx, true);
    }

    pub fn test(&self, idx: usize) -> bool {
        self.bits.get(idx).is_some_and(|b| *b)
    }

    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }

    /// Set subexon indices in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }

    /// Lowest index at which the two sets differ, or `None` when they hold the
    /// same subexons. Bits past the end of the shorter universe count as unset.
    pub fn first_difference(&self, other: &Self) -> Option<usize> {
        let words = self.bits.as_raw_slice().len().max(other.bits.as_raw_slice().len());
        (0..words).find_map(|w| {
            let diff = self.word(w) ^ other.word(w);
            (diff != 0).then(|| w * WORD_BITS + diff.trailing_zeros() as usize)
        })
    }

    // Raw storage word `w` with the dead bits past `len` masked off.
    fn word(&self, w: usize) -> u64 {
        let Some(&raw) = self.bits.as_raw_slice().get(w) else {
            return 0;
        };
        let live = self.bits.len() - w * WORD_BITS;
        if live >= WORD_BITS { raw } else { raw & ((1u64 << live) - 1) }
    }
}

impl PartialEq for SubexonSet {
    fn eq(&self, other: &Self) -> bool {
        self.first_difference(other).is_none()
    }
}

impl Eq for SubexonSet {}

impl PartialOrd for SubexonSet {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SubexonSet {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.first_difference(other) {
            None => Ordering::Equal,
            Some(idx) if self.test(idx) => Ordering::Less,
            Some(_) => Ordering::Greater,
        }
    }
}

impl FromIterator<usize> for SubexonSet {
    /// Builds the smallest universe that holds every index.
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let indices: Vec<usize> = iter.into_iter().collect();
        let len = indices.iter().max().map_or(0, |&m| m + 1);
        let mut set = Self::new(len);
        for idx in indices {
            set.set(idx);
        }
        set
    }
}
