//! Uniqueness enforcement: multiset-to-set reduction.
//!
//! Input, production and plain uniqueness nodes all share this operator. In
//! timeless evaluation the node keeps a reference-counting memory; inside a
//! recursive group it additionally keeps a rederivable memory for the
//! delete-and-rederive protocol. In timely evaluation it keeps per-tuple
//! timelines instead.

use crate::delta::Delta;
use indexmap::IndexMap;
use rete_core::{Direction, Result, Signed, Timeline, Timestamp, Tuple, TupleMask};
use rete_index::{TimelyMemory, TupleMultiset};
use std::fmt;
use std::sync::Arc;

/// Compiled pattern identity of a production node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProductionInfo {
    pattern: String,
    parameters: IndexMap<String, usize>,
}

impl ProductionInfo {
    /// Maps the `i`-th parameter name to column `i`.
    pub fn new<I, S>(pattern: impl Into<String>, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pattern: pattern.into(),
            parameters: parameters
                .into_iter()
                .enumerate()
                .map(|(column, name)| (name.into(), column))
                .collect(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Parameter names with their columns, in declaration order.
    pub fn parameters(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.parameters.iter().map(|(name, &column)| (name.as_str(), column))
    }

    pub fn column(&self, parameter: &str) -> Option<usize> {
        self.parameters.get(parameter).copied()
    }

    pub fn arity(&self) -> usize {
        self.parameters.len()
    }
}

impl fmt::Display for ProductionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.pattern)?;
        for (i, name) in self.parameters.keys().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
        }
        f.write_str(")")
    }
}

/// Returns true if the first poset value is less than or equal to the second.
pub type PosetComparator = Arc<dyn Fn(&Tuple, &Tuple) -> bool + Send + Sync>;

/// Columns of a uniqueness node compared by a partial order.
///
/// Tuples agreeing on the core columns are alternatives of each other; a
/// deletion is monotone if an insertion of the same core group dominates it
/// on the poset columns.
#[derive(Clone)]
pub struct PosetInfo {
    pub core_mask: TupleMask,
    pub poset_mask: TupleMask,
    pub comparator: PosetComparator,
}

impl PosetInfo {
    pub fn new<F>(core_mask: TupleMask, poset_mask: TupleMask, comparator: F) -> Self
    where
        F: Fn(&Tuple, &Tuple) -> bool + Send + Sync + 'static,
    {
        Self {
            core_mask,
            poset_mask,
            comparator: Arc::new(comparator),
        }
    }

    /// Returns true if `positive` dominates the deletion of `negative`.
    pub fn dominates(&self, negative: &Tuple, positive: &Tuple) -> Result<bool> {
        if self.core_mask.transform(negative)? != self.core_mask.transform(positive)? {
            return Ok(false);
        }
        let lower = self.poset_mask.transform(negative)?;
        let upper = self.poset_mask.transform(positive)?;
        Ok((self.comparator)(&lower, &upper))
    }
}

impl fmt::Debug for PosetInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PosetInfo")
            .field("core_mask", &self.core_mask)
            .field("poset_mask", &self.poset_mask)
            .finish_non_exhaustive()
    }
}

/// Update policy chosen by the scheduler for one delivered message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// Plain reference counting.
    Default,
    /// Delete-and-rederive; `monotone` deletions bypass the staging area.
    Rederive { monotone: bool },
}

enum UniquenessMemory {
    Timeless {
        memory: TupleMultiset,
        rederivables: TupleMultiset,
    },
    Timely(TimelyMemory),
}

/// Reduces its input multiset to a set.
pub struct UniquenessNode {
    arity: usize,
    input: bool,
    production: Option<ProductionInfo>,
    poset: Option<PosetInfo>,
    memory: UniquenessMemory,
}

impl UniquenessNode {
    pub fn new(arity: usize, input: bool, production: Option<ProductionInfo>) -> Self {
        Self {
            arity,
            input,
            production,
            poset: None,
            memory: UniquenessMemory::Timeless {
                memory: TupleMultiset::new(),
                rederivables: TupleMultiset::new(),
            },
        }
    }

    /// Switches to timeline-keyed memory; `lazy` selects faithful folding.
    pub fn timely(mut self, lazy: bool) -> Self {
        self.memory = UniquenessMemory::Timely(TimelyMemory::new(lazy));
        self
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    #[inline]
    pub fn is_input(&self) -> bool {
        self.input
    }

    #[inline]
    pub fn is_timely(&self) -> bool {
        matches!(self.memory, UniquenessMemory::Timely(_))
    }

    pub fn production(&self) -> Option<&ProductionInfo> {
        self.production.as_ref()
    }

    pub fn set_production(&mut self, production: ProductionInfo) {
        self.production = Some(production);
    }

    pub fn poset(&self) -> Option<&PosetInfo> {
        self.poset.as_ref()
    }

    pub fn set_poset(&mut self, poset: PosetInfo) {
        self.poset = Some(poset);
    }

    /// Applies one message and returns the output changes.
    pub fn update(
        &mut self,
        direction: Direction,
        tuple: Tuple,
        timestamp: Timestamp,
        policy: UpdatePolicy,
    ) -> Result<Vec<Delta>> {
        match &mut self.memory {
            UniquenessMemory::Timely(memory) => {
                let diff = match direction {
                    Direction::Insert => memory.put(tuple.clone(), timestamp)?,
                    Direction::Delete => memory.remove(&tuple, timestamp)?,
                };
                Ok(diff
                    .into_iter()
                    .map(|signed| Delta::new(signed.direction, tuple.clone(), signed.payload))
                    .collect())
            }
            UniquenessMemory::Timeless {
                memory,
                rederivables,
            } => {
                let emit = match policy {
                    UpdatePolicy::Default => match direction {
                        Direction::Insert => memory.add_one(tuple.clone()),
                        Direction::Delete => memory.remove_one(&tuple)?,
                    },
                    UpdatePolicy::Rederive { monotone } => {
                        rederive_step(memory, rederivables, direction, &tuple, monotone)?
                    }
                };
                Ok(if emit {
                    vec![Delta::new(direction, tuple, timestamp)]
                } else {
                    Vec::new()
                })
            }
        }
    }

    pub fn has_rederivables(&self) -> bool {
        match &self.memory {
            UniquenessMemory::Timeless { rederivables, .. } => !rederivables.is_empty(),
            UniquenessMemory::Timely(_) => false,
        }
    }

    /// Moves one staged tuple back into the main memory and reinserts it.
    pub fn rederive_one(&mut self) -> Option<Delta> {
        let UniquenessMemory::Timeless {
            memory,
            rederivables,
        } = &mut self.memory
        else {
            return None;
        };
        let tuple = rederivables.first()?.clone();
        let count = rederivables.clear_all_of(&tuple);
        memory.add_positive(tuple.clone(), count);
        Some(Delta::insert(tuple))
    }

    pub fn resumable_timestamp(&self) -> Option<Timestamp> {
        match &self.memory {
            UniquenessMemory::Timely(memory) => memory.resumable_timestamp(),
            UniquenessMemory::Timeless { .. } => None,
        }
    }

    /// Folds lazily recorded changes at `timestamp` into output changes.
    pub fn resume_at(&mut self, timestamp: Timestamp) -> Result<Vec<Delta>> {
        let UniquenessMemory::Timely(memory) = &mut self.memory else {
            return Ok(Vec::new());
        };
        let mut output = Vec::new();
        for (tuple, diff) in memory.resume_at(timestamp)? {
            for Signed { direction, payload } in diff {
                output.push(Delta::new(direction, tuple.clone(), payload));
            }
        }
        Ok(output)
    }

    /// Returns true if the tuple is in the output set.
    pub fn contains(&self, tuple: &Tuple) -> bool {
        match &self.memory {
            UniquenessMemory::Timeless { memory, .. } => memory.contains(tuple),
            UniquenessMemory::Timely(memory) => memory.is_present_at_infinity(tuple),
        }
    }

    /// Size of the output set.
    pub fn len(&self) -> usize {
        match &self.memory {
            UniquenessMemory::Timeless { memory, .. } => memory.distinct_len(),
            UniquenessMemory::Timely(memory) => memory.count_at_infinity(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The output set.
    pub fn tuples(&self) -> Vec<Tuple> {
        match &self.memory {
            UniquenessMemory::Timeless { memory, .. } => memory.distinct().cloned().collect(),
            UniquenessMemory::Timely(memory) => memory.tuples_at_infinity().cloned().collect(),
        }
    }

    /// The timeline of an output tuple; timeless memories report presence from zero.
    pub fn timeline(&self, tuple: &Tuple) -> Option<Timeline> {
        match &self.memory {
            UniquenessMemory::Timeless { memory, .. } => {
                memory.contains(tuple).then(Timeline::zero)
            }
            UniquenessMemory::Timely(memory) => memory.timeline(tuple).cloned(),
        }
    }

    /// Every output tuple with its timeline, or `None` for timeless memories.
    pub fn timelines(&self) -> Option<Vec<(Tuple, Timeline)>> {
        match &self.memory {
            UniquenessMemory::Timely(memory) => Some(
                memory
                    .timelines()
                    .map(|(t, tl)| (t.clone(), tl.clone()))
                    .collect(),
            ),
            UniquenessMemory::Timeless { .. } => None,
        }
    }

    pub fn clear(&mut self) {
        match &mut self.memory {
            UniquenessMemory::Timeless {
                memory,
                rederivables,
            } => {
                memory.clear();
                rederivables.clear();
            }
            UniquenessMemory::Timely(memory) => memory.clear(),
        }
    }
}

/// One delete-and-rederive step; returns true if the change is visible downstream.
fn rederive_step(
    memory: &mut TupleMultiset,
    rederivables: &mut TupleMultiset,
    direction: Direction,
    tuple: &Tuple,
    monotone: bool,
) -> Result<bool> {
    let staged = rederivables.contains(tuple);
    match direction {
        Direction::Insert if staged => {
            rederivables.add_one(tuple.clone());
            Ok(false)
        }
        Direction::Insert => Ok(memory.add_one(tuple.clone())),
        Direction::Delete if staged => {
            rederivables.remove_one(tuple)?;
            Ok(false)
        }
        Direction::Delete if monotone => memory.remove_one(tuple),
        Direction::Delete => {
            let count = memory.count(tuple);
            if count == 0 {
                return Err(rete_core::Error::DuplicateDeletion);
            }
            // over-delete now, support left behind is rederived at fixpoint
            rederivables.add_positive(tuple.clone(), count - 1);
            memory.clear_all_of(tuple);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rete_core::tuple;

    fn insert(node: &mut UniquenessNode, t: Tuple, policy: UpdatePolicy) -> Vec<Delta> {
        node.update(Direction::Insert, t, Timestamp::ZERO, policy)
            .unwrap()
    }

    fn delete(node: &mut UniquenessNode, t: Tuple, policy: UpdatePolicy) -> Result<Vec<Delta>> {
        node.update(Direction::Delete, t, Timestamp::ZERO, policy)
    }

    #[test]
    fn test_default_reference_counting() {
        let mut node = UniquenessNode::new(1, true, None);
        assert_eq!(insert(&mut node, tuple![1], UpdatePolicy::Default), vec![Delta::insert(tuple![1])]);
        assert!(insert(&mut node, tuple![1], UpdatePolicy::Default).is_empty());
        assert!(delete(&mut node, tuple![1], UpdatePolicy::Default).unwrap().is_empty());
        assert!(node.contains(&tuple![1]));
        assert_eq!(
            delete(&mut node, tuple![1], UpdatePolicy::Default).unwrap(),
            vec![Delta::delete(tuple![1])]
        );
        assert_eq!(
            delete(&mut node, tuple![1], UpdatePolicy::Default),
            Err(rete_core::Error::DuplicateDeletion)
        );
    }

    #[test]
    fn test_rederive_stages_remaining_support() {
        let policy = UpdatePolicy::Rederive { monotone: false };
        let mut node = UniquenessNode::new(1, false, None);
        insert(&mut node, tuple![1], policy);
        insert(&mut node, tuple![1], policy);

        let out = delete(&mut node, tuple![1], policy).unwrap();
        assert_eq!(out, vec![Delta::delete(tuple![1])]);
        assert!(!node.contains(&tuple![1]));
        assert!(node.has_rederivables());

        // a staged tuple absorbs further deletions silently
        assert!(delete(&mut node, tuple![1], policy).unwrap().is_empty());
        assert!(!node.has_rederivables());
        assert_eq!(node.rederive_one(), None);
    }

    #[test]
    fn test_rederive_one_reinserts() {
        let policy = UpdatePolicy::Rederive { monotone: false };
        let mut node = UniquenessNode::new(1, false, None);
        for _ in 0..3 {
            insert(&mut node, tuple![7], policy);
        }
        delete(&mut node, tuple![7], policy).unwrap();
        assert!(insert(&mut node, tuple![7], policy).is_empty());

        assert_eq!(node.rederive_one(), Some(Delta::insert(tuple![7])));
        assert!(node.contains(&tuple![7]));
        assert!(!node.has_rederivables());
        // two remaining plus the cancelled deletion
        assert!(delete(&mut node, tuple![7], UpdatePolicy::Rederive { monotone: true })
            .unwrap()
            .is_empty());
        assert!(delete(&mut node, tuple![7], UpdatePolicy::Rederive { monotone: true })
            .unwrap()
            .is_empty());
        assert_eq!(
            delete(&mut node, tuple![7], UpdatePolicy::Rederive { monotone: true }).unwrap(),
            vec![Delta::delete(tuple![7])]
        );
    }

    #[test]
    fn test_timely_eager_output() {
        let mut node = UniquenessNode::new(1, false, None).timely(false);
        let out = node
            .update(Direction::Insert, tuple![1], Timestamp::new(2), UpdatePolicy::Default)
            .unwrap();
        assert_eq!(
            out,
            vec![Delta::new(Direction::Insert, tuple![1], Timestamp::new(2))]
        );
        assert!(node
            .update(Direction::Insert, tuple![1], Timestamp::new(4), UpdatePolicy::Default)
            .unwrap()
            .is_empty());
        assert_eq!(node.tuples(), vec![tuple![1]]);
        assert_eq!(node.timeline(&tuple![1]), Some(Timeline::present_from(Timestamp::new(2))));
    }

    #[test]
    fn test_timely_lazy_output_on_resume() {
        let mut node = UniquenessNode::new(1, false, None).timely(true);
        assert!(node
            .update(Direction::Insert, tuple![1], Timestamp::new(1), UpdatePolicy::Default)
            .unwrap()
            .is_empty());
        assert_eq!(node.resumable_timestamp(), Some(Timestamp::new(1)));
        assert_eq!(
            node.resume_at(Timestamp::new(1)).unwrap(),
            vec![Delta::new(Direction::Insert, tuple![1], Timestamp::new(1))]
        );
        assert_eq!(node.resumable_timestamp(), None);
    }

    #[test]
    fn test_production_info() {
        let info = ProductionInfo::new("reachable", ["source", "target"]);
        assert_eq!(info.pattern(), "reachable");
        assert_eq!(info.column("target"), Some(1));
        assert_eq!(info.arity(), 2);
        assert_eq!(info.to_string(), "reachable(source, target)");
    }

    #[test]
    fn test_poset_domination() {
        let poset = PosetInfo::new(
            TupleMask::select_single(0, 2).unwrap(),
            TupleMask::select_single(1, 2).unwrap(),
            |a, b| a <= b,
        );
        assert!(poset.dominates(&tuple![1, 3], &tuple![1, 5]).unwrap());
        assert!(!poset.dominates(&tuple![1, 5], &tuple![1, 3]).unwrap());
        assert!(!poset.dominates(&tuple![1, 3], &tuple![2, 5]).unwrap());
    }
}
