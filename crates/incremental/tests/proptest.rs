//! Property-based tests: incremental maintenance agrees with batch evaluation.

use proptest::prelude::*;
use rete_core::{Direction, Tuple, TupleMask, Value};
use rete_incremental::{Network, NetworkConfig, NodeId, ProductionInfo};
use std::collections::BTreeSet;

type Pair = (i64, i64);

fn pair(a: i64, b: i64) -> Tuple {
    Tuple::new(vec![Value::Int64(a), Value::Int64(b)])
}

fn contents(network: &mut Network, node: NodeId) -> BTreeSet<Tuple> {
    let mut out = Vec::new();
    network.pull_into(node, &mut out, true).unwrap();
    out.into_iter().collect()
}

/// Applies an operation to both the network and the reference set.
/// Inserting a present or deleting an absent pair is skipped.
fn apply(network: &mut Network, input: NodeId, reference: &mut BTreeSet<Pair>, op: (bool, i64, i64, bool)) {
    let (insert, a, b, flush) = op;
    let applied = if insert {
        reference.insert((a, b))
    } else {
        reference.remove(&(a, b))
    };
    if applied {
        let direction = if insert { Direction::Insert } else { Direction::Delete };
        network.update(input, direction, pair(a, b)).unwrap();
    }
    if flush {
        network.flush().unwrap();
    }
}

fn closure(edges: &BTreeSet<Pair>) -> BTreeSet<Tuple> {
    let mut reached: BTreeSet<Pair> = edges.clone();
    loop {
        let next: Vec<Pair> = reached
            .iter()
            .flat_map(|&(x, y)| edges.iter().filter(move |&&(a, _)| a == y).map(move |&(_, z)| (x, z)))
            .filter(|p| !reached.contains(p))
            .collect();
        if next.is_empty() {
            break;
        }
        reached.extend(next);
    }
    reached.into_iter().map(|(a, b)| pair(a, b)).collect()
}

fn ops() -> impl Strategy<Value = Vec<(bool, i64, i64, bool)>> {
    prop::collection::vec((any::<bool>(), 0i64..4, 0i64..4, any::<bool>()), 1..40)
}

proptest! {
    /// left(a, k), right(k, p) joined on k.
    #[test]
    fn join_matches_batch(left_ops in ops(), right_ops in ops()) {
        let mut network = Network::default();
        let left = network.input(2);
        let right = network.input(2);
        let left_key = network.indexer(left, TupleMask::select_single(1, 2).unwrap()).unwrap();
        let right_key = network.indexer(right, TupleMask::select_single(0, 2).unwrap()).unwrap();
        let join = network.join(left_key, right_key).unwrap();
        let out = network.production(ProductionInfo::new("joined", ["a", "k", "p"]));
        network.connect_and_synchronize(join, out).unwrap();

        let mut left_ref = BTreeSet::new();
        let mut right_ref = BTreeSet::new();
        for (l, r) in left_ops.into_iter().zip(right_ops) {
            apply(&mut network, left, &mut left_ref, l);
            apply(&mut network, right, &mut right_ref, r);
        }

        let expected: BTreeSet<Tuple> = left_ref
            .iter()
            .flat_map(|&(a, k)| {
                right_ref
                    .iter()
                    .filter(move |&&(k2, _)| k2 == k)
                    .map(move |&(_, p)| Tuple::new(vec![Value::Int64(a), Value::Int64(k), Value::Int64(p)]))
            })
            .collect();
        prop_assert_eq!(contents(&mut network, out), expected);
    }

    /// left(a, k) with no right(k, _).
    #[test]
    fn antijoin_matches_batch(left_ops in ops(), right_ops in ops()) {
        let mut network = Network::default();
        let left = network.input(2);
        let right = network.input(2);
        let left_key = network.indexer(left, TupleMask::select_single(1, 2).unwrap()).unwrap();
        let right_key = network.indexer(right, TupleMask::select_single(0, 2).unwrap()).unwrap();
        let unmatched = network.existence(left_key, right_key, true).unwrap();
        let out = network.production(ProductionInfo::new("unmatched", ["a", "k"]));
        network.connect_and_synchronize(unmatched, out).unwrap();

        let mut left_ref = BTreeSet::new();
        let mut right_ref = BTreeSet::new();
        for (l, r) in left_ops.into_iter().zip(right_ops) {
            apply(&mut network, left, &mut left_ref, l);
            apply(&mut network, right, &mut right_ref, r);
        }

        let expected: BTreeSet<Tuple> = left_ref
            .iter()
            .filter(|&&(_, k)| !right_ref.iter().any(|&(k2, _)| k2 == k))
            .map(|&(a, k)| pair(a, k))
            .collect();
        prop_assert_eq!(contents(&mut network, out), expected);
    }

    /// Projection followed by a set node keeps a column exactly while some
    /// tuple still carries it.
    #[test]
    fn uniqueness_of_projection_matches_batch(input_ops in ops()) {
        let mut network = Network::default();
        let input = network.input(2);
        let firsts = network.trimmer(input, TupleMask::select_single(0, 2).unwrap()).unwrap();
        let out = network.uniqueness(1);
        network.connect_and_synchronize(firsts, out).unwrap();

        let mut reference = BTreeSet::new();
        for op in input_ops {
            apply(&mut network, input, &mut reference, op);
        }

        let expected: BTreeSet<Tuple> = reference
            .iter()
            .map(|&(a, _)| Tuple::new(vec![Value::Int64(a)]))
            .collect();
        prop_assert_eq!(contents(&mut network, out), expected);
    }

    #[test]
    fn transitive_closure_node_matches_batch(edge_ops in ops()) {
        let mut network = Network::default();
        let edges = network.input(2);
        let tc = network.transitive_closure(edges).unwrap();
        let out = network.production(ProductionInfo::new("reachable", ["from", "to"]));
        network.connect_and_synchronize(tc, out).unwrap();

        let mut reference = BTreeSet::new();
        for op in edge_ops {
            apply(&mut network, edges, &mut reference, op);
        }
        prop_assert_eq!(contents(&mut network, out), closure(&reference));
    }

    /// Recursive reachability maintained by delete-and-rederive.
    #[test]
    fn recursive_reachability_matches_batch(edge_ops in ops()) {
        let mut network = Network::new(NetworkConfig::default());
        let edges = network.input(2);
        let reachable = network.production(ProductionInfo::new("reachable", ["x", "y"]));
        network.connect_and_synchronize(edges, reachable).unwrap();
        let by_target = network.indexer(reachable, TupleMask::select_single(1, 2).unwrap()).unwrap();
        let by_source = network.indexer(edges, TupleMask::select_single(0, 2).unwrap()).unwrap();
        let paths = network.join(by_target, by_source).unwrap();
        let ends = network.trimmer(paths, TupleMask::new(vec![0, 2], 3).unwrap()).unwrap();
        network.connect_and_synchronize(ends, reachable).unwrap();

        let mut reference = BTreeSet::new();
        for op in edge_ops {
            apply(&mut network, edges, &mut reference, op);
        }
        prop_assert_eq!(contents(&mut network, reachable), closure(&reference));
    }
}
