//! Reference-counted tuple multisets.

use crate::DefaultBuildHasher;
use core::hash::BuildHasher;
use hashbrown::hash_map::{Entry, HashMap};
use rete_core::{Error, Result, Tuple};

/// A multiset of tuples backed by a count map.
///
/// `add_one`/`remove_one` report the 0→1 and 1→0 transitions, which is
/// exactly what uniqueness enforcement and group bookkeeping need.
#[derive(Clone, Debug)]
pub struct TupleMultiset<S = DefaultBuildHasher> {
    counts: HashMap<Tuple, u32, S>,
    total: usize,
}

impl<S: BuildHasher + Default> Default for TupleMultiset<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: BuildHasher + Default> TupleMultiset<S> {
    /// Creates an empty multiset.
    pub fn new() -> Self {
        Self {
            counts: HashMap::with_hasher(S::default()),
            total: 0,
        }
    }

    /// Adds one occurrence; returns true if the tuple was not present before.
    pub fn add_one(&mut self, tuple: Tuple) -> bool {
        self.add_positive(tuple, 1)
    }

    /// Adds `count` occurrences; returns true if the tuple was not present before.
    pub fn add_positive(&mut self, tuple: Tuple, count: u32) -> bool {
        if count == 0 {
            return false;
        }
        self.total += count as usize;
        match self.counts.entry(tuple) {
            Entry::Occupied(mut e) => {
                *e.get_mut() += count;
                false
            }
            Entry::Vacant(e) => {
                e.insert(count);
                true
            }
        }
    }

    /// Removes one occurrence; returns true if it was the last one.
    ///
    /// Removing an absent tuple is a duplicate deletion.
    pub fn remove_one(&mut self, tuple: &Tuple) -> Result<bool> {
        let count = self.counts.get_mut(tuple).ok_or(Error::DuplicateDeletion)?;
        self.total -= 1;
        if *count > 1 {
            *count -= 1;
            Ok(false)
        } else {
            self.counts.remove(tuple);
            Ok(true)
        }
    }

    /// Removes every occurrence of `tuple`, returning how many there were.
    pub fn clear_all_of(&mut self, tuple: &Tuple) -> u32 {
        let count = self.counts.remove(tuple).unwrap_or(0);
        self.total -= count as usize;
        count
    }

    /// Multiplicity of `tuple`.
    #[inline]
    pub fn count(&self, tuple: &Tuple) -> u32 {
        self.counts.get(tuple).copied().unwrap_or(0)
    }

    #[inline]
    pub fn contains(&self, tuple: &Tuple) -> bool {
        self.counts.contains_key(tuple)
    }

    /// Distinct tuples.
    pub fn distinct(&self) -> impl Iterator<Item = &Tuple> + '_ {
        self.counts.keys()
    }

    /// Distinct tuples with their multiplicities.
    pub fn iter(&self) -> impl Iterator<Item = (&Tuple, u32)> + '_ {
        self.counts.iter().map(|(t, &c)| (t, c))
    }

    /// Any one tuple of the multiset.
    pub fn first(&self) -> Option<&Tuple> {
        self.counts.keys().next()
    }

    /// Number of distinct tuples.
    #[inline]
    pub fn distinct_len(&self) -> usize {
        self.counts.len()
    }

    /// Total number of occurrences.
    #[inline]
    pub fn len(&self) -> usize {
        self.total
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.total = 0;
    }
}
