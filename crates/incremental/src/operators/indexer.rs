//! Indexers: signature → group lookups over a node's output.
//!
//! A [`ProjectionIndexer`] is a child node with its own memory. A
//! [`SpecializedIndexer`] reads the memory of the uniqueness node it belongs
//! to and keeps no state of its own. Both notify their dual-input listeners
//! with an [`IndexerUpdate`] after every change.

use crate::dataflow::NodeId;
use crate::operators::{LeftJoinNode, UniquenessNode};
use rete_core::{Direction, Result, Timeline, Timestamp, Tuple, TupleMask};
use rete_index::{MaskedMemory, SignatureIndex, TimelyMaskedMemory};

/// A change notification sent from an indexer to its listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexerUpdate {
    pub direction: Direction,
    pub tuple: Tuple,
    pub signature: Tuple,
    /// The signature's group became non-empty (insert) or empty (delete).
    pub change: bool,
    pub timestamp: Timestamp,
}

enum IndexMemory {
    Timeless(MaskedMemory),
    Timely(TimelyMaskedMemory),
}

/// Indexer owning a masked memory of its parent's output.
pub struct ProjectionIndexer {
    mask: TupleMask,
    memory: IndexMemory,
}

impl ProjectionIndexer {
    pub fn new(mask: TupleMask) -> Self {
        Self {
            memory: IndexMemory::Timeless(MaskedMemory::new(mask.clone())),
            mask,
        }
    }

    pub fn mask(&self) -> &TupleMask {
        &self.mask
    }

    pub fn is_timely(&self) -> bool {
        matches!(self.memory, IndexMemory::Timely(_))
    }

    /// Converts the memory to timelines, every stored tuple present from zero.
    pub fn make_timely(&mut self, lazy: bool) -> Result<()> {
        let IndexMemory::Timeless(old) = &self.memory else {
            return Ok(());
        };
        let mut memory = TimelyMaskedMemory::new(self.mask.clone(), lazy);
        memory.initialize_with(old, Timestamp::ZERO)?;
        if lazy {
            // settle the folding state; listeners already saw these tuples
            memory.resume_at(Timestamp::ZERO)?;
        }
        self.memory = IndexMemory::Timely(memory);
        Ok(())
    }

    /// Converts the memory back to multisets, keeping multiplicities at infinity.
    pub fn make_timeless(&mut self) {
        let IndexMemory::Timely(old) = &self.memory else {
            return;
        };
        let mut memory = MaskedMemory::new(self.mask.clone());
        for (signature, tuple, count) in old.multiplicities_at_infinity() {
            for _ in 0..count {
                memory.add(tuple.clone(), signature.clone());
            }
        }
        self.memory = IndexMemory::Timeless(memory);
    }

    pub fn update(
        &mut self,
        direction: Direction,
        tuple: Tuple,
        timestamp: Timestamp,
    ) -> Result<Vec<IndexerUpdate>> {
        let signature = self.mask.transform(&tuple)?;
        match &mut self.memory {
            IndexMemory::Timeless(memory) => {
                let change = match direction {
                    Direction::Insert => memory.add(tuple.clone(), signature.clone()),
                    Direction::Delete => memory.remove(&tuple, &signature)?,
                };
                Ok(vec![IndexerUpdate {
                    direction,
                    tuple,
                    signature,
                    change,
                    timestamp,
                }])
            }
            IndexMemory::Timely(memory) => {
                let was_present = memory.is_present_at_infinity(&signature);
                let diff = match direction {
                    Direction::Insert => {
                        memory.add_with_timestamp(tuple.clone(), signature.clone(), timestamp)?
                    }
                    Direction::Delete => memory.remove_with_timestamp(&tuple, &signature, timestamp)?,
                };
                let change = was_present != memory.is_present_at_infinity(&signature);
                Ok(diff
                    .into_iter()
                    .map(|signed| IndexerUpdate {
                        direction: signed.direction,
                        tuple: tuple.clone(),
                        signature: signature.clone(),
                        change,
                        timestamp: signed.payload,
                    })
                    .collect())
            }
        }
    }

    pub fn resumable_timestamp(&self) -> Option<Timestamp> {
        match &self.memory {
            IndexMemory::Timely(memory) => memory.resumable_timestamp(),
            IndexMemory::Timeless(_) => None,
        }
    }

    /// Folds pending timeline changes at `timestamp` into notifications.
    ///
    /// The group change flag is reported on the first notification of each
    /// signature only.
    pub fn resume_at(&mut self, timestamp: Timestamp) -> Result<Vec<IndexerUpdate>> {
        let IndexMemory::Timely(memory) = &mut self.memory else {
            return Ok(Vec::new());
        };
        let was_present: Vec<(Tuple, bool)> = memory
            .resumable_signatures()
            .into_iter()
            .map(|sig| {
                let present = memory.is_present_at_infinity(&sig);
                (sig, present)
            })
            .collect();
        let mut output = Vec::new();
        for (signature, diffs) in memory.resume_at(timestamp)? {
            let before = was_present
                .iter()
                .find(|(sig, _)| *sig == signature)
                .is_some_and(|(_, present)| *present);
            let mut change = before != memory.is_present_at_infinity(&signature);
            for (tuple, diff) in diffs {
                for signed in diff {
                    output.push(IndexerUpdate {
                        direction: signed.direction,
                        tuple: tuple.clone(),
                        signature: signature.clone(),
                        change,
                        timestamp: signed.payload,
                    });
                    change = false;
                }
            }
        }
        Ok(output)
    }

    pub fn view(&self) -> IndexView<'_> {
        match &self.memory {
            IndexMemory::Timeless(memory) => IndexView::Masked(memory),
            IndexMemory::Timely(memory) => IndexView::TimelyMasked(memory),
        }
    }

    pub fn clear(&mut self) {
        match &mut self.memory {
            IndexMemory::Timeless(memory) => memory.clear(),
            IndexMemory::Timely(memory) => memory.clear(),
        }
    }
}

/// Mask shape of a specialized indexer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpecializedKind {
    /// The identity mask: each tuple is its own signature.
    Identity,
    /// The empty mask: all tuples share the empty signature.
    Null,
}

/// Indexer reading the memory of a uniqueness node.
pub struct SpecializedIndexer {
    owner: NodeId,
    kind: SpecializedKind,
    mask: TupleMask,
}

impl SpecializedIndexer {
    pub fn new(owner: NodeId, kind: SpecializedKind, width: usize) -> Self {
        let mask = match kind {
            SpecializedKind::Identity => TupleMask::identity(width),
            SpecializedKind::Null => TupleMask::empty(width),
        };
        Self { owner, kind, mask }
    }

    /// The node whose memory this indexer reads.
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn kind(&self) -> SpecializedKind {
        self.kind
    }

    pub fn mask(&self) -> &TupleMask {
        &self.mask
    }

    /// The notification for an output change of the owner, after the owner applied it.
    pub fn notification(
        &self,
        owner: &UniquenessNode,
        direction: Direction,
        tuple: Tuple,
        timestamp: Timestamp,
    ) -> IndexerUpdate {
        let (signature, change) = match self.kind {
            SpecializedKind::Identity => (tuple.clone(), true),
            SpecializedKind::Null => {
                let change = match direction {
                    Direction::Insert => owner.len() == 1,
                    Direction::Delete => owner.is_empty(),
                };
                (Tuple::empty(), change)
            }
        };
        IndexerUpdate {
            direction,
            tuple,
            signature,
            change,
            timestamp,
        }
    }

    pub fn view<'a>(&self, owner: &'a UniquenessNode) -> IndexView<'a> {
        match self.kind {
            SpecializedKind::Identity => IndexView::Identity(owner),
            SpecializedKind::Null => IndexView::Null(owner),
        }
    }
}

/// Read-only lookup over any kind of indexer, used by dual-input nodes.
#[derive(Clone, Copy)]
pub enum IndexView<'a> {
    Masked(&'a MaskedMemory),
    TimelyMasked(&'a TimelyMaskedMemory),
    Identity(&'a UniquenessNode),
    Null(&'a UniquenessNode),
    /// A left join's view of its timeless indexer.
    Outer(&'a MaskedMemory, &'a LeftJoinNode),
}

impl<'a> IndexView<'a> {
    /// Tuples of a group with multiplicities.
    pub fn group(&self, signature: &Tuple) -> Vec<(Tuple, u32)> {
        match self {
            IndexView::Masked(memory) => memory.group(signature),
            IndexView::TimelyMasked(memory) => memory.group(signature),
            IndexView::Identity(owner) => {
                if owner.contains(signature) {
                    vec![(signature.clone(), 1)]
                } else {
                    Vec::new()
                }
            }
            IndexView::Null(owner) if signature.is_empty() => {
                owner.tuples().into_iter().map(|t| (t, 1)).collect()
            }
            IndexView::Null(_) => Vec::new(),
            IndexView::Outer(memory, outer) => {
                let group = memory.group(signature);
                if group.is_empty() {
                    vec![(outer.default_tuple(signature), 1)]
                } else {
                    group
                }
            }
        }
    }

    pub fn contains_signature(&self, signature: &Tuple) -> bool {
        match self {
            IndexView::Masked(memory) => memory.contains_signature(signature),
            IndexView::TimelyMasked(memory) => memory.contains_signature(signature),
            IndexView::Identity(owner) => owner.contains(signature),
            IndexView::Null(owner) => signature.is_empty() && !owner.is_empty(),
            IndexView::Outer(_, outer) => signature.size() == outer.mask().arity(),
        }
    }

    /// All non-empty signatures. An outer view reports the stored ones.
    pub fn signatures(&self) -> Vec<Tuple> {
        match self {
            IndexView::Masked(memory) | IndexView::Outer(memory, _) => memory.signatures(),
            IndexView::TimelyMasked(memory) => memory.signatures(),
            IndexView::Identity(owner) => owner.tuples(),
            IndexView::Null(owner) if owner.is_empty() => Vec::new(),
            IndexView::Null(_) => vec![Tuple::empty()],
        }
    }

    /// Tuples of a group with their timelines. Timeless memories report
    /// every occurrence as present from zero.
    pub fn timelines(&self, signature: &Tuple) -> Vec<(Tuple, Timeline)> {
        match self {
            IndexView::TimelyMasked(memory) => memory.timelines(signature),
            IndexView::Masked(_) | IndexView::Outer(..) => zero_timelines(self.group(signature)),
            IndexView::Identity(owner) => owner
                .timeline(signature)
                .map(|timeline| vec![(signature.clone(), timeline)])
                .unwrap_or_default(),
            IndexView::Null(_) if !signature.is_empty() => Vec::new(),
            IndexView::Null(owner) => match owner.timelines() {
                Some(timelines) => timelines,
                None => zero_timelines(self.group(signature)),
            },
        }
    }

    /// Every stored tuple with multiplicity.
    pub fn tuples(&self) -> Vec<Tuple> {
        match self {
            IndexView::Masked(memory) | IndexView::Outer(memory, _) => memory
                .iter()
                .flat_map(|(t, count)| std::iter::repeat(t.clone()).take(count as usize))
                .collect(),
            IndexView::TimelyMasked(memory) => {
                memory.iter_at_infinity().map(|(_, t)| t.clone()).collect()
            }
            IndexView::Identity(owner) | IndexView::Null(owner) => owner.tuples(),
        }
    }

    /// Every tuple with a timeline, or `None` if the memory has no timelines.
    pub fn all_timelines(&self) -> Option<Vec<(Tuple, Timeline)>> {
        match self {
            IndexView::TimelyMasked(memory) => Some(
                memory
                    .all_timelines()
                    .map(|(t, tl)| (t.clone(), tl.clone()))
                    .collect(),
            ),
            IndexView::Identity(owner) | IndexView::Null(owner) => owner.timelines(),
            IndexView::Masked(_) | IndexView::Outer(..) => None,
        }
    }
}

fn zero_timelines(group: Vec<(Tuple, u32)>) -> Vec<(Tuple, Timeline)> {
    group
        .into_iter()
        .flat_map(|(t, count)| std::iter::repeat((t, Timeline::zero())).take(count as usize))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::UpdatePolicy;
    use rete_core::tuple;

    fn by_source() -> ProjectionIndexer {
        ProjectionIndexer::new(TupleMask::select_single(0, 2).unwrap())
    }

    #[test]
    fn test_timeless_change_flags() {
        let mut indexer = by_source();
        let first = indexer
            .update(Direction::Insert, tuple![1, 2], Timestamp::ZERO)
            .unwrap();
        assert_eq!(first[0].signature, tuple![1]);
        assert!(first[0].change);

        let second = indexer
            .update(Direction::Insert, tuple![1, 3], Timestamp::ZERO)
            .unwrap();
        assert!(!second[0].change);

        let removed = indexer
            .update(Direction::Delete, tuple![1, 2], Timestamp::ZERO)
            .unwrap();
        assert!(!removed[0].change);
        let last = indexer
            .update(Direction::Delete, tuple![1, 3], Timestamp::ZERO)
            .unwrap();
        assert!(last[0].change);
        assert!(indexer
            .update(Direction::Delete, tuple![1, 3], Timestamp::ZERO)
            .is_err());
    }

    #[test]
    fn test_group_lookup() {
        let mut indexer = by_source();
        for t in [tuple![1, 2], tuple![1, 2], tuple![2, 3]] {
            indexer.update(Direction::Insert, t, Timestamp::ZERO).unwrap();
        }
        let view = indexer.view();
        assert_eq!(view.group(&tuple![1]), vec![(tuple![1, 2], 2)]);
        assert!(view.contains_signature(&tuple![2]));
        assert!(!view.contains_signature(&tuple![3]));
        assert_eq!(view.timelines(&tuple![1]).len(), 2);
        assert_eq!(view.tuples().len(), 3);
    }

    #[test]
    fn test_timely_conversion_keeps_contents() {
        let mut indexer = by_source();
        indexer.update(Direction::Insert, tuple![1, 2], Timestamp::ZERO).unwrap();
        indexer.update(Direction::Insert, tuple![1, 2], Timestamp::ZERO).unwrap();
        indexer.make_timely(true).unwrap();
        assert!(indexer.is_timely());
        assert_eq!(indexer.resumable_timestamp(), None);
        assert_eq!(
            indexer.view().timelines(&tuple![1]),
            vec![(tuple![1, 2], Timeline::zero())]
        );

        indexer.make_timeless();
        indexer.update(Direction::Delete, tuple![1, 2], Timestamp::ZERO).unwrap();
        assert!(indexer.view().contains_signature(&tuple![1]));
    }

    #[test]
    fn test_timely_lazy_notifications() {
        let mut indexer = by_source();
        indexer.make_timely(true).unwrap();
        assert!(indexer
            .update(Direction::Insert, tuple![1, 2], Timestamp::new(1))
            .unwrap()
            .is_empty());
        let resumed = indexer.resume_at(Timestamp::new(1)).unwrap();
        assert_eq!(
            resumed,
            vec![IndexerUpdate {
                direction: Direction::Insert,
                tuple: tuple![1, 2],
                signature: tuple![1],
                change: true,
                timestamp: Timestamp::new(1),
            }]
        );
    }

    #[test]
    fn test_specialized_views() {
        let mut owner = UniquenessNode::new(2, true, None);
        owner
            .update(Direction::Insert, tuple![1, 2], Timestamp::ZERO, UpdatePolicy::Default)
            .unwrap();
        let null = SpecializedIndexer::new(NodeId::new(0), SpecializedKind::Null, 2);
        let identity = SpecializedIndexer::new(NodeId::new(0), SpecializedKind::Identity, 2);

        let update = null.notification(&owner, Direction::Insert, tuple![1, 2], Timestamp::ZERO);
        assert_eq!(update.signature, Tuple::empty());
        assert!(update.change);
        assert_eq!(null.view(&owner).group(&Tuple::empty()), vec![(tuple![1, 2], 1)]);

        assert!(identity.view(&owner).contains_signature(&tuple![1, 2]));
        assert!(identity.mask().is_identity());
        assert_eq!(identity.view(&owner).signatures(), vec![tuple![1, 2]]);
    }
}
