//! Grouped aggregation.
//!
//! Every group keeps the net input changes per timestamp. The aggregate at a
//! timestamp is computed from the cumulative multiset of all changes up to
//! it, so the result only depends on which values are present and never on
//! the order they arrived in. In timeless evaluation every change sits at
//! [`Timestamp::ZERO`] and a group has a single entry.

use crate::delta::Delta;
use hashbrown::HashMap;
use indexmap::IndexMap;
use rete_core::{Direction, Error, Result, Timeline, Timestamp, Tuple, TupleMask, Value};
use std::collections::BTreeMap;

/// The aggregate function of an [`AggregatorNode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    /// Number of tuples in the group, as `Int64`.
    Count,
    /// Sum of the numeric column. `Int64` while every value is an integer,
    /// `Float64` once a float is present. Non-numeric values count as zero.
    Sum,
    Min,
    Max,
}

/// Net value counts.
type Bag = BTreeMap<Value, i64>;

fn add_into(target: &mut Bag, changes: &Bag) {
    for (value, &count) in changes {
        let entry = target.entry(value.clone()).or_insert(0);
        *entry += count;
        if *entry == 0 {
            target.remove(value);
        }
    }
}

fn sum<'a>(values: impl Iterator<Item = (&'a Value, i64)>) -> Value {
    let mut integral: i128 = 0;
    let mut fractional: Option<f64> = None;
    for (value, count) in values {
        match value {
            Value::Float64(v) => *fractional.get_or_insert(0.0) += v * count as f64,
            other => {
                if let Some(v) = other.as_i64() {
                    integral += i128::from(v) * i128::from(count);
                }
            }
        }
    }
    match fractional {
        None => i64::try_from(integral).map_or(Value::Float64(integral as f64), Value::Int64),
        Some(fractional) => Value::Float64(integral as f64 + fractional),
    }
}

/// Aggregate of a cumulative multiset; `None` for an empty group.
///
/// Counts that are transiently negative while timely retractions are still
/// in flight are treated as absent.
fn aggregate(cumulative: &Bag, kind: AggregateKind) -> Option<Value> {
    let mut present = cumulative.iter().filter(|(_, c)| **c > 0).map(|(v, &c)| (v, c));
    match kind {
        AggregateKind::Count => {
            let count: i64 = present.map(|(_, c)| c).sum();
            (count > 0).then_some(Value::Int64(count))
        }
        AggregateKind::Sum => {
            let mut present = present.peekable();
            present.peek()?;
            Some(sum(present))
        }
        AggregateKind::Min => present.next().map(|(v, _)| v.clone()),
        AggregateKind::Max => present.last().map(|(v, _)| v.clone()),
    }
}

/// Input changes of one group, by timestamp.
#[derive(Clone, Debug, Default)]
struct GroupHistory {
    changes: BTreeMap<Timestamp, Bag>,
}

impl GroupHistory {
    fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Multiplicity of `value` including every change up to `timestamp`.
    fn count_at(&self, value: &Value, timestamp: Timestamp) -> i64 {
        self.changes
            .range(..=timestamp)
            .filter_map(|(_, bag)| bag.get(value))
            .sum()
    }

    fn record(&mut self, direction: Direction, value: Value, timestamp: Timestamp) {
        let bag = self.changes.entry(timestamp).or_default();
        let entry = bag.entry(value.clone()).or_insert(0);
        *entry += i64::from(direction.sign());
        if *entry == 0 {
            bag.remove(&value);
        }
        if bag.is_empty() {
            self.changes.remove(&timestamp);
        }
    }

    /// The aggregate just before `from` and at each of `breakpoints`.
    fn results(
        &self,
        from: Timestamp,
        breakpoints: &[Timestamp],
        kind: AggregateKind,
    ) -> (Option<Value>, Vec<Option<Value>>) {
        let mut cumulative = Bag::new();
        for (_, bag) in self.changes.range(..from) {
            add_into(&mut cumulative, bag);
        }
        let prior = aggregate(&cumulative, kind);
        let mut results = Vec::with_capacity(breakpoints.len());
        for timestamp in breakpoints {
            if let Some(bag) = self.changes.get(timestamp) {
                add_into(&mut cumulative, bag);
            }
            results.push(aggregate(&cumulative, kind));
        }
        (prior, results)
    }

    fn latest(&self, kind: AggregateKind) -> Option<Value> {
        let mut cumulative = Bag::new();
        for bag in self.changes.values() {
            add_into(&mut cumulative, bag);
        }
        aggregate(&cumulative, kind)
    }

    /// Change points of every aggregate value the group ever takes.
    fn value_changes(&self, kind: AggregateKind) -> IndexMap<Value, Vec<Timestamp>> {
        let breakpoints: Vec<Timestamp> = self.changes.keys().copied().collect();
        let Some(&first) = breakpoints.first() else {
            return IndexMap::new();
        };
        let (mut previous, results) = self.results(first, &breakpoints, kind);
        let mut points: IndexMap<Value, Vec<Timestamp>> = IndexMap::new();
        for (&timestamp, current) in breakpoints.iter().zip(results) {
            if current == previous {
                continue;
            }
            if let Some(old) = &previous {
                points.entry(old.clone()).or_default().push(timestamp);
            }
            if let Some(new) = &current {
                points.entry(new.clone()).or_default().push(timestamp);
            }
            previous = current;
        }
        points
    }
}

/// Signed output transitions of a group: an aggregate change at a timestamp
/// retracts the old output tuple and inserts the new one there.
fn transitions(
    group: &Tuple,
    prior: Option<Value>,
    breakpoints: &[Timestamp],
    results: Vec<Option<Value>>,
    net: &mut IndexMap<(Timestamp, Tuple), i64>,
    sign: i64,
) {
    let mut previous = prior;
    for (&timestamp, current) in breakpoints.iter().zip(results) {
        if current == previous {
            continue;
        }
        if let Some(old) = &previous {
            *net.entry((timestamp, AggregatorNode::output(group, old.clone()))).or_insert(0) -= sign;
        }
        if let Some(new) = &current {
            *net.entry((timestamp, AggregatorNode::output(group, new.clone()))).or_insert(0) += sign;
        }
        previous = current;
    }
}

/// Aggregates `column` per group of `group_mask` and emits
/// `(group columns…, aggregate)`.
///
/// When a group's aggregate changes the previous output tuple is retracted
/// before the new one is inserted. A change at a timestamp also corrects the
/// outputs at every later timestamp the group has changes at.
#[derive(Clone, Debug)]
pub struct AggregatorNode {
    group_mask: TupleMask,
    column: usize,
    kind: AggregateKind,
    groups: HashMap<Tuple, GroupHistory>,
}

impl AggregatorNode {
    pub fn new(group_mask: TupleMask, column: usize, kind: AggregateKind) -> Self {
        Self {
            group_mask,
            column,
            kind,
            groups: HashMap::new(),
        }
    }

    pub fn kind(&self) -> AggregateKind {
        self.kind
    }

    pub fn input_arity(&self) -> usize {
        self.group_mask.source_width()
    }

    pub fn output_arity(&self) -> usize {
        self.group_mask.arity() + 1
    }

    fn output(group: &Tuple, aggregate: Value) -> Tuple {
        let mut values = group.elements();
        values.push(aggregate);
        Tuple::new(values)
    }

    pub fn update(
        &mut self,
        direction: Direction,
        tuple: &Tuple,
        timestamp: Timestamp,
    ) -> Result<Vec<Delta>> {
        let group = self.group_mask.transform(tuple)?;
        let value = tuple.get(self.column)?.clone();
        let kind = self.kind;

        if direction == Direction::Delete && !self.groups.contains_key(&group) {
            return Err(Error::DuplicateDeletion);
        }
        let history = self.groups.entry(group.clone()).or_default();
        if direction == Direction::Delete && history.count_at(&value, timestamp) < 1 {
            return Err(Error::DuplicateDeletion);
        }

        let mut breakpoints = vec![timestamp];
        breakpoints.extend(
            history
                .changes
                .range(timestamp..)
                .map(|(t, _)| *t)
                .filter(|t| *t != timestamp),
        );
        let (prior, before) = history.results(timestamp, &breakpoints, kind);
        history.record(direction, value, timestamp);
        let (_, after) = history.results(timestamp, &breakpoints, kind);
        if history.is_empty() {
            self.groups.remove(&group);
        }

        let mut net = IndexMap::new();
        transitions(&group, prior.clone(), &breakpoints, before, &mut net, -1);
        transitions(&group, prior, &breakpoints, after, &mut net, 1);

        let mut changes: Vec<((Timestamp, Tuple), i64)> =
            net.into_iter().filter(|(_, count)| *count != 0).collect();
        // per timestamp, retractions go first
        changes.sort_by_key(|((t, _), count)| (*t, *count > 0));
        let mut output = Vec::new();
        for ((timestamp, tuple), count) in changes {
            let direction = if count > 0 {
                Direction::Insert
            } else {
                Direction::Delete
            };
            for _ in 0..count.unsigned_abs() {
                output.push(Delta::new(direction, tuple.clone(), timestamp));
            }
        }
        Ok(output)
    }

    /// The latest aggregate of every non-empty group.
    pub fn tuples(&self) -> Vec<Tuple> {
        self.groups
            .iter()
            .filter_map(|(group, history)| {
                history
                    .latest(self.kind)
                    .map(|aggregate| Self::output(group, aggregate))
            })
            .collect()
    }

    /// Every output tuple the node ever produced, with its timeline.
    pub fn timelines(&self) -> Result<Vec<(Tuple, Timeline)>> {
        let mut output = Vec::new();
        for (group, history) in &self.groups {
            for (aggregate, points) in history.value_changes(self.kind) {
                output.push((Self::output(group, aggregate), Timeline::from_changes(points)?));
            }
        }
        Ok(output)
    }

    pub fn clear(&mut self) {
        self.groups.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rete_core::tuple;

    fn by_first(kind: AggregateKind) -> AggregatorNode {
        AggregatorNode::new(TupleMask::select_single(0, 2).unwrap(), 1, kind)
    }

    fn apply(node: &mut AggregatorNode, direction: Direction, t: Tuple) -> Vec<Delta> {
        node.update(direction, &t, Timestamp::ZERO).unwrap()
    }

    fn at(node: &mut AggregatorNode, direction: Direction, t: Tuple, timestamp: u32) -> Vec<Delta> {
        node.update(direction, &t, Timestamp::new(timestamp)).unwrap()
    }

    fn out(group: &str, aggregate: Value) -> Tuple {
        Tuple::new(vec![group.into(), aggregate])
    }

    #[test]
    fn test_count_retracts_previous_value() {
        let mut node = by_first(AggregateKind::Count);
        assert_eq!(
            apply(&mut node, Direction::Insert, tuple!["a", 1]),
            vec![Delta::insert(out("a", Value::Int64(1)))]
        );
        assert_eq!(
            apply(&mut node, Direction::Insert, tuple!["a", 2]),
            vec![
                Delta::delete(out("a", Value::Int64(1))),
                Delta::insert(out("a", Value::Int64(2))),
            ]
        );
        apply(&mut node, Direction::Delete, tuple!["a", 1]);
        assert_eq!(
            apply(&mut node, Direction::Delete, tuple!["a", 2]),
            vec![Delta::delete(out("a", Value::Int64(1)))]
        );
        assert!(node.tuples().is_empty());
    }

    #[test]
    fn test_integer_sum_is_exact() {
        let mut node = by_first(AggregateKind::Sum);
        apply(&mut node, Direction::Insert, tuple!["a", 2]);
        apply(&mut node, Direction::Insert, tuple!["a", 3]);
        assert_eq!(node.tuples(), vec![out("a", Value::Int64(5))]);

        let mut node = by_first(AggregateKind::Sum);
        let big = Tuple::new(vec!["a".into(), Value::Int64(9_007_199_254_740_993)]);
        apply(&mut node, Direction::Insert, big);
        assert_eq!(node.tuples(), vec![out("a", Value::Int64(9_007_199_254_740_993))]);
    }

    #[test]
    fn test_float_sum_after_retraction_matches_fresh_sum() {
        let first = Tuple::new(vec!["a".into(), Value::Float64(0.1)]);
        let second = Tuple::new(vec!["a".into(), Value::Float64(0.2)]);
        let mut node = by_first(AggregateKind::Sum);
        apply(&mut node, Direction::Insert, first.clone());
        apply(&mut node, Direction::Insert, second);
        let out_deltas = apply(&mut node, Direction::Delete, first);
        assert_eq!(
            out_deltas.last(),
            Some(&Delta::insert(out("a", Value::Float64(0.2))))
        );
        assert_eq!(node.tuples(), vec![out("a", Value::Float64(0.2))]);
    }

    #[test]
    fn test_sum_overflowing_i64_falls_back_to_float() {
        let mut node = by_first(AggregateKind::Sum);
        for _ in 0..2 {
            apply(
                &mut node,
                Direction::Insert,
                Tuple::new(vec!["a".into(), Value::Int64(i64::MAX)]),
            );
        }
        assert_eq!(
            node.tuples(),
            vec![out("a", Value::Float64(2.0 * i64::MAX as f64))]
        );
    }

    #[test]
    fn test_min_survives_deletion_of_minimum() {
        let mut node = by_first(AggregateKind::Min);
        apply(&mut node, Direction::Insert, tuple!["a", 3]);
        apply(&mut node, Direction::Insert, tuple!["a", 1]);
        let out = apply(&mut node, Direction::Delete, tuple!["a", 1]);
        assert_eq!(
            out,
            vec![Delta::delete(tuple!["a", 1]), Delta::insert(tuple!["a", 3])]
        );
    }

    #[test]
    fn test_max_unchanged_emits_nothing() {
        let mut node = by_first(AggregateKind::Max);
        apply(&mut node, Direction::Insert, tuple!["a", 5]);
        assert!(apply(&mut node, Direction::Insert, tuple!["a", 2]).is_empty());
    }

    #[test]
    fn test_deleting_missing_value_fails() {
        let mut node = by_first(AggregateKind::Count);
        assert_eq!(
            node.update(Direction::Delete, &tuple!["a", 1], Timestamp::ZERO),
            Err(Error::DuplicateDeletion)
        );
        apply(&mut node, Direction::Insert, tuple!["a", 1]);
        assert_eq!(
            node.update(Direction::Delete, &tuple!["a", 2], Timestamp::ZERO),
            Err(Error::DuplicateDeletion)
        );
        assert_eq!(node.tuples(), vec![out("a", Value::Int64(1))]);
    }

    #[test]
    fn test_timely_change_emits_at_its_timestamp() {
        let mut node = by_first(AggregateKind::Count);
        assert_eq!(
            at(&mut node, Direction::Insert, tuple!["a", 1], 0),
            vec![Delta::new(Direction::Insert, out("a", Value::Int64(1)), Timestamp::new(0))]
        );
        assert_eq!(
            at(&mut node, Direction::Insert, tuple!["a", 2], 2),
            vec![
                Delta::new(Direction::Delete, out("a", Value::Int64(1)), Timestamp::new(2)),
                Delta::new(Direction::Insert, out("a", Value::Int64(2)), Timestamp::new(2)),
            ]
        );
        let timelines = node.timelines().unwrap();
        assert!(timelines.contains(&(
            out("a", Value::Int64(1)),
            Timeline::from_changes(vec![Timestamp::new(0), Timestamp::new(2)]).unwrap()
        )));
        assert!(timelines.contains(&(out("a", Value::Int64(2)), Timeline::present_from(Timestamp::new(2)))));
    }

    #[test]
    fn test_timely_early_retraction_corrects_later_timestamps() {
        let mut node = by_first(AggregateKind::Count);
        at(&mut node, Direction::Insert, tuple!["a", 5], 0);
        at(&mut node, Direction::Insert, tuple!["a", 7], 2);

        // the count was 1 from 0 and 2 from 2; it becomes absent before 2 and 1 from 2
        let mut deltas = at(&mut node, Direction::Delete, tuple!["a", 5], 0);
        deltas.sort_by_key(|d| (d.timestamp, d.tuple.clone(), d.is_insert()));
        assert_eq!(
            deltas,
            vec![
                Delta::new(Direction::Delete, out("a", Value::Int64(1)), Timestamp::new(0)),
                Delta::new(Direction::Insert, out("a", Value::Int64(1)), Timestamp::new(2)),
                Delta::new(Direction::Insert, out("a", Value::Int64(1)), Timestamp::new(2)),
                Delta::new(Direction::Delete, out("a", Value::Int64(2)), Timestamp::new(2)),
            ]
        );
        assert_eq!(
            node.timelines().unwrap(),
            vec![(out("a", Value::Int64(1)), Timeline::present_from(Timestamp::new(2)))]
        );
        assert_eq!(node.tuples(), vec![out("a", Value::Int64(1))]);
    }
}
