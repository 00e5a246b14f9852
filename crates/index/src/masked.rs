//! Signature → group memories.

use crate::multiset::TupleMultiset;
use crate::traits::SignatureIndex;
use crate::DefaultBuildHasher;
use alloc::vec::Vec;
use core::hash::BuildHasher;
use hashbrown::HashMap;
use rete_core::{Error, Result, Tuple, TupleMask};

/// Groups tuples by the projection of a mask.
///
/// Each group is the multiset of received tuples whose projection equals
/// the signature, net of retractions. A group is dropped as soon as it
/// becomes empty.
#[derive(Clone)]
pub struct MaskedMemory<S = DefaultBuildHasher> {
    mask: TupleMask,
    groups: HashMap<Tuple, TupleMultiset<S>, S>,
    total: usize,
}

impl<S: BuildHasher + Default> MaskedMemory<S> {
    pub fn new(mask: TupleMask) -> Self {
        Self {
            mask,
            groups: HashMap::with_hasher(S::default()),
            total: 0,
        }
    }

    /// Projects `tuple` to its signature.
    #[inline]
    pub fn signature_of(&self, tuple: &Tuple) -> Result<Tuple> {
        self.mask.transform(tuple)
    }

    /// Adds a tuple under `signature`; returns true if the group was empty before.
    pub fn add(&mut self, tuple: Tuple, signature: Tuple) -> bool {
        self.total += 1;
        let mut created = false;
        self.groups
            .entry(signature)
            .or_insert_with(|| {
                created = true;
                TupleMultiset::new()
            })
            .add_one(tuple);
        created
    }

    /// Removes a tuple from `signature`; returns true if the group became empty.
    pub fn remove(&mut self, tuple: &Tuple, signature: &Tuple) -> Result<bool> {
        let group = self
            .groups
            .get_mut(signature)
            .ok_or(Error::DuplicateDeletion)?;
        group.remove_one(tuple)?;
        self.total -= 1;
        if group.is_empty() {
            self.groups.remove(signature);
            return Ok(true);
        }
        Ok(false)
    }

    /// The group of `signature`, if non-empty.
    pub fn get(&self, signature: &Tuple) -> Option<&TupleMultiset<S>> {
        self.groups.get(signature)
    }

    /// Iterates the non-empty groups.
    pub fn groups(&self) -> impl Iterator<Item = (&Tuple, &TupleMultiset<S>)> + '_ {
        self.groups.iter()
    }

    /// Every stored tuple occurrence with its multiplicity.
    pub fn iter(&self) -> impl Iterator<Item = (&Tuple, u32)> + '_ {
        self.groups.values().flat_map(|g| g.iter())
    }

    /// Total number of stored occurrences.
    #[inline]
    pub fn len(&self) -> usize {
        self.total
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.total = 0;
    }
}

impl<S: BuildHasher + Default> SignatureIndex for MaskedMemory<S> {
    fn mask(&self) -> &TupleMask {
        &self.mask
    }

    fn signature_count(&self) -> usize {
        self.groups.len()
    }

    fn contains_signature(&self, signature: &Tuple) -> bool {
        self.groups.contains_key(signature)
    }

    fn group(&self, signature: &Tuple) -> Vec<(Tuple, u32)> {
        self.groups
            .get(signature)
            .map(|g| g.iter().map(|(t, c)| (t.clone(), c)).collect())
            .unwrap_or_default()
    }

    fn signatures(&self) -> Vec<Tuple> {
        self.groups.keys().cloned().collect()
    }

    fn group_size(&self, signature: &Tuple) -> usize {
        self.groups.get(signature).map_or(0, |g| g.len())
    }
}
