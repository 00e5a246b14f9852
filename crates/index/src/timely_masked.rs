//! Signature → timely memory index.

use crate::masked::MaskedMemory;
use crate::timely::TimelyMemory;
use crate::traits::SignatureIndex;
use crate::DefaultBuildHasher;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::hash::BuildHasher;
use hashbrown::{HashMap, HashSet};
use rete_core::{Diff, Error, Result, Timeline, Timestamp, Tuple, TupleMask};

/// Groups tuples by signature, tracking a timeline per tuple.
///
/// In lazy mode the memory also tracks which signatures have pending
/// folding work at which timestamp, so the owner can resume them in
/// timestamp order.
#[derive(Clone)]
pub struct TimelyMaskedMemory<S = DefaultBuildHasher> {
    mask: TupleMask,
    groups: HashMap<Tuple, TimelyMemory<S>, S>,
    folding: BTreeMap<Timestamp, HashSet<Tuple, S>>,
    lazy: bool,
}

impl<S: BuildHasher + Default + Clone> TimelyMaskedMemory<S> {
    pub fn new(mask: TupleMask, lazy: bool) -> Self {
        Self {
            mask,
            groups: HashMap::with_hasher(S::default()),
            folding: BTreeMap::new(),
            lazy,
        }
    }

    /// Converts a timeless memory; every tuple occurrence is inserted at `timestamp`.
    pub fn initialize_with(&mut self, other: &MaskedMemory<S>, timestamp: Timestamp) -> Result<()> {
        for (signature, group) in other.groups() {
            for (tuple, count) in group.iter() {
                for _ in 0..count {
                    self.add_with_timestamp(tuple.clone(), signature.clone(), timestamp)?;
                }
            }
        }
        Ok(())
    }

    #[inline]
    pub fn signature_of(&self, tuple: &Tuple) -> Result<Tuple> {
        self.mask.transform(tuple)
    }

    #[inline]
    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    /// Records an insertion; returns the tuple's timeline change (empty when lazy).
    pub fn add_with_timestamp(
        &mut self,
        tuple: Tuple,
        signature: Tuple,
        timestamp: Timestamp,
    ) -> Result<Diff> {
        let lazy = self.lazy;
        let memory = self
            .groups
            .entry(signature.clone())
            .or_insert_with(|| TimelyMemory::new(lazy));
        let before = memory.resumable_timestamp();
        let diff = memory.put(tuple, timestamp)?;
        let after = memory.resumable_timestamp();
        self.reregister(&signature, before, after);
        Ok(diff)
    }

    /// Records a deletion; returns the tuple's timeline change (empty when lazy).
    pub fn remove_with_timestamp(
        &mut self,
        tuple: &Tuple,
        signature: &Tuple,
        timestamp: Timestamp,
    ) -> Result<Diff> {
        let memory = self
            .groups
            .get_mut(signature)
            .ok_or(Error::DuplicateDeletion)?;
        let before = memory.resumable_timestamp();
        let diff = memory.remove(tuple, timestamp)?;
        let after = memory.resumable_timestamp();
        if memory.is_empty() {
            self.groups.remove(signature);
        }
        self.reregister(signature, before, after);
        Ok(diff)
    }

    fn reregister(&mut self, signature: &Tuple, before: Option<Timestamp>, after: Option<Timestamp>) {
        if before == after {
            return;
        }
        if let Some(before) = before {
            if let Some(set) = self.folding.get_mut(&before) {
                set.remove(signature);
                if set.is_empty() {
                    self.folding.remove(&before);
                }
            }
        }
        if let Some(after) = after {
            self.folding
                .entry(after)
                .or_insert_with(|| HashSet::with_hasher(S::default()))
                .insert(signature.clone());
        }
    }

    /// The lowest timestamp at which some group has pending folding work.
    pub fn resumable_timestamp(&self) -> Option<Timestamp> {
        self.folding.keys().next().copied()
    }

    /// Signatures with pending folding work at the resumable timestamp.
    pub fn resumable_signatures(&self) -> Vec<Tuple> {
        self.folding
            .values()
            .next()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Folds every group registered at `timestamp`, returning per signature
    /// the timeline diffs of its tuples.
    pub fn resume_at(&mut self, timestamp: Timestamp) -> Result<Vec<(Tuple, Vec<(Tuple, Diff)>)>> {
        // groups registered earlier only hold cancelled states; fold them along
        let mut signatures: Vec<Tuple> = Vec::new();
        while let Some(current) = self.folding.keys().next().copied() {
            if current > timestamp {
                break;
            }
            if let Some(set) = self.folding.remove(&current) {
                signatures.extend(set);
            }
        }
        let mut result = Vec::new();
        for signature in signatures {
            let Some(memory) = self.groups.get_mut(&signature) else {
                continue;
            };
            let diffs = memory.resume_at(timestamp)?;
            let next = memory.resumable_timestamp();
            if memory.is_empty() && next.is_none() {
                self.groups.remove(&signature);
            }
            self.reregister(&signature, None, next);
            if !diffs.is_empty() {
                result.push((signature, diffs));
            }
        }
        Ok(result)
    }

    /// Timelines of the tuples in a group.
    pub fn timelines(&self, signature: &Tuple) -> Vec<(Tuple, Timeline)> {
        self.groups
            .get(signature)
            .map(|m| {
                m.timelines()
                    .map(|(t, tl)| (t.clone(), tl.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns true if some tuple of the group is present at infinity.
    pub fn is_present_at_infinity(&self, signature: &Tuple) -> bool {
        self.groups
            .get(signature)
            .is_some_and(|m| m.count_at_infinity() > 0)
    }

    /// Every tuple present at infinity, with its signature.
    pub fn iter_at_infinity(&self) -> impl Iterator<Item = (&Tuple, &Tuple)> + '_ {
        self.groups
            .iter()
            .flat_map(|(sig, m)| m.tuples_at_infinity().map(move |t| (sig, t)))
    }

    /// Every tuple with a non-empty timeline, across all groups.
    pub fn all_timelines(&self) -> impl Iterator<Item = (&Tuple, &Timeline)> + '_ {
        self.groups.values().flat_map(|m| m.timelines())
    }

    /// Every tuple present at infinity with its signature and multiplicity there.
    pub fn multiplicities_at_infinity(&self) -> impl Iterator<Item = (&Tuple, &Tuple, u32)> + '_ {
        self.groups.iter().flat_map(|(sig, m)| {
            m.tuples_at_infinity()
                .map(move |t| (sig, t, m.multiplicity_at_infinity(t)))
        })
    }

    /// Number of tuples with counters across all groups.
    pub fn len(&self) -> usize {
        self.groups.values().map(TimelyMemory::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.folding.clear();
    }
}

impl<S: BuildHasher + Default + Clone> SignatureIndex for TimelyMaskedMemory<S> {
    fn mask(&self) -> &TupleMask {
        &self.mask
    }

    fn signature_count(&self) -> usize {
        self.groups
            .values()
            .filter(|m| m.count_at_infinity() > 0)
            .count()
    }

    fn contains_signature(&self, signature: &Tuple) -> bool {
        self.is_present_at_infinity(signature)
    }

    fn group(&self, signature: &Tuple) -> Vec<(Tuple, u32)> {
        self.groups
            .get(signature)
            .map(|m| m.tuples_at_infinity().map(|t| (t.clone(), 1)).collect())
            .unwrap_or_default()
    }

    fn signatures(&self) -> Vec<Tuple> {
        self.groups
            .iter()
            .filter(|(_, m)| m.count_at_infinity() > 0)
            .map(|(sig, _)| sig.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rete_core::{tuple, Direction, Signed};

    fn ts(v: u32) -> Timestamp {
        Timestamp::new(v)
    }

    fn memory(lazy: bool) -> TimelyMaskedMemory {
        TimelyMaskedMemory::new(TupleMask::select_single(0, 2).unwrap(), lazy)
    }

    #[test]
    fn test_eager_groups() {
        let mut m = memory(false);
        let t = tuple![1, 2];
        let diff = m.add_with_timestamp(t.clone(), tuple![1], ts(0)).unwrap();
        assert_eq!(diff.as_slice(), &[Signed::new(Direction::Insert, ts(0))]);
        assert!(m.is_present_at_infinity(&tuple![1]));
        assert_eq!(m.group(&tuple![1]), alloc::vec![(t.clone(), 1)]);
        assert_eq!(m.timelines(&tuple![1]), alloc::vec![(t.clone(), Timeline::zero())]);

        m.remove_with_timestamp(&t, &tuple![1], ts(0)).unwrap();
        assert!(m.is_empty());
        assert_eq!(
            m.remove_with_timestamp(&t, &tuple![1], ts(0)),
            Err(Error::DuplicateDeletion)
        );
    }

    #[test]
    fn test_lazy_resume_by_signature() {
        let mut m = memory(true);
        m.add_with_timestamp(tuple![1, 2], tuple![1], ts(2)).unwrap();
        m.add_with_timestamp(tuple![2, 2], tuple![2], ts(1)).unwrap();
        assert_eq!(m.resumable_timestamp(), Some(ts(1)));
        assert_eq!(m.resumable_signatures(), alloc::vec![tuple![2]]);

        let folded = m.resume_at(ts(1)).unwrap();
        assert_eq!(folded.len(), 1);
        assert_eq!(folded[0].0, tuple![2]);
        assert_eq!(m.resumable_timestamp(), Some(ts(2)));

        let folded = m.resume_at(ts(2)).unwrap();
        assert_eq!(folded[0].0, tuple![1]);
        assert_eq!(m.resumable_timestamp(), None);
        assert_eq!(m.signature_count(), 2);
    }

    #[test]
    fn test_initialize_with_timeless() {
        let mask = TupleMask::select_single(0, 2).unwrap();
        let mut timeless: MaskedMemory = MaskedMemory::new(mask.clone());
        timeless.add(tuple![1, 2], tuple![1]);
        timeless.add(tuple![1, 2], tuple![1]);

        let mut m = memory(false);
        m.initialize_with(&timeless, Timestamp::ZERO).unwrap();
        assert!(m.is_present_at_infinity(&tuple![1]));
        m.remove_with_timestamp(&tuple![1, 2], &tuple![1], Timestamp::ZERO).unwrap();
        assert!(m.is_present_at_infinity(&tuple![1]));
    }
}
