//! Graph nodes: transitive closure and representative election.
//!
//! Both consume binary edge tuples `(source, target)` and emit binary
//! tuples: reachable pairs for the closure, `(member, representative)`
//! pairs for the election.

use crate::delta::Delta;
use rete_core::{Direction, Result, Signed, Timestamp, Tuple, Value};
use rete_itc::{Connectivity, IncrementalTc, RepresentativeElection};

fn edge(tuple: &Tuple) -> Result<(Value, Value)> {
    Ok((tuple.get(0)?.clone(), tuple.get(1)?.clone()))
}

fn to_deltas(changes: Vec<Signed<(Value, Value)>>, timestamp: Timestamp) -> Vec<Delta> {
    changes
        .into_iter()
        .map(|Signed { direction, payload: (a, b) }| {
            Delta::new(direction, Tuple::new(vec![a, b]), timestamp)
        })
        .collect()
}

/// Maintains the transitive closure of its input edges.
#[derive(Clone, Debug, Default)]
pub struct TransitiveClosureNode {
    tc: IncrementalTc<Value>,
}

impl TransitiveClosureNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(
        &mut self,
        direction: Direction,
        tuple: &Tuple,
        timestamp: Timestamp,
    ) -> Result<Vec<Delta>> {
        let (source, target) = edge(tuple)?;
        let changes = match direction {
            Direction::Insert => self.tc.insert_edge(source, target),
            Direction::Delete => self.tc.delete_edge(&source, &target)?,
        };
        Ok(to_deltas(changes, timestamp))
    }

    pub fn is_reachable(&self, source: &Value, target: &Value) -> bool {
        self.tc.is_reachable(source, target)
    }

    /// Every reachable pair as a tuple.
    pub fn tuples(&self) -> Vec<Tuple> {
        self.tc
            .closure()
            .into_iter()
            .map(|(s, t)| Tuple::new(vec![s, t]))
            .collect()
    }

    pub fn clear(&mut self) {
        self.tc.clear();
    }
}

/// Elects one representative per connected component of its input edges.
#[derive(Clone, Debug)]
pub struct RepresentativeNode {
    election: RepresentativeElection<Value>,
}

impl RepresentativeNode {
    pub fn new(connectivity: Connectivity) -> Self {
        Self {
            election: RepresentativeElection::new(connectivity),
        }
    }

    pub fn connectivity(&self) -> Connectivity {
        self.election.connectivity()
    }

    pub fn update(
        &mut self,
        direction: Direction,
        tuple: &Tuple,
        timestamp: Timestamp,
    ) -> Result<Vec<Delta>> {
        let (source, target) = edge(tuple)?;
        let changes = match direction {
            Direction::Insert => self.election.insert_edge(source, target),
            Direction::Delete => self.election.delete_edge(&source, &target)?,
        };
        Ok(to_deltas(changes, timestamp))
    }

    pub fn representative(&self, node: &Value) -> Option<&Value> {
        self.election.representative(node)
    }

    pub fn tuples(&self) -> Vec<Tuple> {
        self.election
            .assignments()
            .into_iter()
            .map(|(member, root)| Tuple::new(vec![member, root]))
            .collect()
    }

    pub fn clear(&mut self) {
        self.election.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rete_core::{tuple, Error};

    #[test]
    fn test_closure_follows_edges() {
        let mut node = TransitiveClosureNode::new();
        node.update(Direction::Insert, &tuple![1, 2], Timestamp::ZERO).unwrap();
        let out = node
            .update(Direction::Insert, &tuple![2, 3], Timestamp::ZERO)
            .unwrap();
        let mut inserted: Vec<_> = out.into_iter().map(|d| d.tuple).collect();
        inserted.sort();
        assert_eq!(inserted, vec![tuple![1, 3], tuple![2, 3]]);
        assert!(node.is_reachable(&Value::Int32(1), &Value::Int32(3)));

        let out = node
            .update(Direction::Delete, &tuple![1, 2], Timestamp::ZERO)
            .unwrap();
        assert!(out.iter().all(|d| d.is_delete()));
        assert_eq!(node.tuples(), vec![tuple![2, 3]]);
    }

    #[test]
    fn test_closure_rejects_unknown_edge() {
        let mut node = TransitiveClosureNode::new();
        assert_eq!(
            node.update(Direction::Delete, &tuple![1, 2], Timestamp::ZERO),
            Err(Error::DuplicateDeletion)
        );
        assert!(node.update(Direction::Insert, &tuple![1], Timestamp::ZERO).is_err());
    }

    #[test]
    fn test_representatives_merge_on_cycle() {
        let mut node = RepresentativeNode::new(Connectivity::Strong);
        node.update(Direction::Insert, &tuple![1, 2], Timestamp::ZERO).unwrap();
        assert_ne!(
            node.representative(&Value::Int32(1)),
            node.representative(&Value::Int32(2))
        );
        node.update(Direction::Insert, &tuple![2, 1], Timestamp::ZERO).unwrap();
        assert_eq!(
            node.representative(&Value::Int32(1)),
            node.representative(&Value::Int32(2))
        );
        assert_eq!(node.tuples().len(), 2);
    }
}
