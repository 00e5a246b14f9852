//! End-to-end behavior of networks built through the public API.

use rete_core::{tuple, Direction, Tuple, TupleMask, Value};
use rete_incremental::{
    AggregateKind, Connectivity, Delta, Error, ErrorCategory, EvaluationMode, MailboxKind,
    Network, NetworkConfig, NodeId, PosetInfo, ProductionInfo, TimelineRepresentation,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

fn contents(network: &mut Network, node: NodeId) -> BTreeSet<Tuple> {
    let mut out = Vec::new();
    network.pull_into(node, &mut out, true).unwrap();
    out.into_iter().collect()
}

fn set(tuples: &[Tuple]) -> BTreeSet<Tuple> {
    tuples.iter().cloned().collect()
}

fn insert(network: &mut Network, node: NodeId, tuples: &[Tuple]) {
    for t in tuples {
        network.update(node, Direction::Insert, t.clone()).unwrap();
    }
}

fn delete(network: &mut Network, node: NodeId, tuples: &[Tuple]) {
    for t in tuples {
        network.update(node, Direction::Delete, t.clone()).unwrap();
    }
}

/// reachable(x, y) :- edge(x, y).
/// reachable(x, z) :- reachable(x, y), edge(y, z).
fn reachability(config: NetworkConfig) -> (Network, NodeId, NodeId) {
    let mut network = Network::new(config);
    let edges = network.input(2);
    let reachable = network.production(ProductionInfo::new("reachable", ["x", "y"]));
    network.connect_and_synchronize(edges, reachable).unwrap();
    let by_target = network
        .indexer(reachable, TupleMask::select_single(1, 2).unwrap())
        .unwrap();
    let by_source = network
        .indexer(edges, TupleMask::select_single(0, 2).unwrap())
        .unwrap();
    let paths = network.join(by_target, by_source).unwrap();
    let ends = network
        .trimmer(paths, TupleMask::new(vec![0, 2], 3).unwrap())
        .unwrap();
    network.connect_and_synchronize(ends, reachable).unwrap();
    (network, edges, reachable)
}

fn timely() -> NetworkConfig {
    NetworkConfig::builder()
        .evaluation_mode(EvaluationMode::Timely)
        .build()
}

#[test]
fn test_transitive_closure_node() {
    let mut network = Network::default();
    let edges = network.input(2);
    let closure = network.transitive_closure(edges).unwrap();
    let reachable = network.production(ProductionInfo::new("reachable", ["from", "to"]));
    network.connect_and_synchronize(closure, reachable).unwrap();

    insert(&mut network, edges, &[tuple![1, 2], tuple![2, 3]]);
    assert_eq!(
        contents(&mut network, reachable),
        set(&[tuple![1, 2], tuple![2, 3], tuple![1, 3]])
    );

    delete(&mut network, edges, &[tuple![1, 2]]);
    assert_eq!(contents(&mut network, reachable), set(&[tuple![2, 3]]));
}

#[test]
fn test_antijoin() {
    let mut network = Network::default();
    let people = network.input(1);
    let banned = network.input(1);
    let all_people = network.indexer(people, TupleMask::identity(1)).unwrap();
    let all_banned = network.indexer(banned, TupleMask::identity(1)).unwrap();
    let allowed = network.existence(all_people, all_banned, true).unwrap();

    insert(&mut network, people, &[tuple!["ann"], tuple!["bob"]]);
    insert(&mut network, banned, &[tuple!["bob"]]);
    assert_eq!(contents(&mut network, allowed), set(&[tuple!["ann"]]));

    delete(&mut network, banned, &[tuple!["bob"]]);
    assert_eq!(
        contents(&mut network, allowed),
        set(&[tuple!["ann"], tuple!["bob"]])
    );
}

#[test]
fn test_uniqueness_absorbs_duplicate_derivations() {
    let mut network = Network::default();
    let a = network.input(1);
    let b = network.input(1);
    let union = network.production(ProductionInfo::new("union", ["v"]));
    network.connect_and_synchronize(a, union).unwrap();
    network.connect_and_synchronize(b, union).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    network
        .attach_listener(union, move |delta: &Delta| sink.lock().unwrap().push(delta.clone()))
        .unwrap();

    insert(&mut network, a, &[tuple![1]]);
    insert(&mut network, b, &[tuple![1]]);
    network.flush().unwrap();
    delete(&mut network, a, &[tuple![1]]);
    network.flush().unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![Delta::insert(tuple![1])]);
    assert!(network.contains(union, &tuple![1]).unwrap());
}

#[test]
fn test_duplicate_deletion_is_consistency_error() {
    let mut network = Network::default();
    let facts = network.input(1);
    let out = network.production(ProductionInfo::new("facts", ["v"]));
    network.connect_and_synchronize(facts, out).unwrap();

    insert(&mut network, facts, &[tuple![7]]);
    network.flush().unwrap();
    delete(&mut network, facts, &[tuple![7], tuple![7]]);

    let err = network.flush().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Consistency);
    match err {
        Error::Consistency { node, patterns, .. } => {
            assert_eq!(node, facts);
            assert_eq!(patterns, vec!["facts".to_owned()]);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_recursive_chain_delete() {
    let (mut network, edges, reachable) = reachability(NetworkConfig::default());
    assert!(network.is_in_recursive_group(reachable));
    assert!(!network.is_in_recursive_group(edges));
    assert_eq!(
        network.mailbox_kind(reachable).unwrap(),
        Some(MailboxKind::Splitting)
    );

    insert(&mut network, edges, &[tuple![1, 2], tuple![2, 3], tuple![3, 4]]);
    assert_eq!(contents(&mut network, reachable).len(), 6);

    delete(&mut network, edges, &[tuple![2, 3]]);
    assert_eq!(
        contents(&mut network, reachable),
        set(&[tuple![1, 2], tuple![3, 4]])
    );
}

#[test]
fn test_recursive_cycle_rederives() {
    let (mut network, edges, reachable) = reachability(NetworkConfig::default());
    insert(&mut network, edges, &[tuple![1, 2], tuple![2, 1]]);
    assert_eq!(
        contents(&mut network, reachable),
        set(&[tuple![1, 1], tuple![1, 2], tuple![2, 1], tuple![2, 2]])
    );

    // the self-supporting part of the cycle must not survive
    delete(&mut network, edges, &[tuple![1, 2]]);
    assert_eq!(contents(&mut network, reachable), set(&[tuple![2, 1]]));

    insert(&mut network, edges, &[tuple![1, 2]]);
    assert_eq!(contents(&mut network, reachable).len(), 4);
}

#[test]
fn test_timely_recursion() {
    for representation in [TimelineRepresentation::Faithful, TimelineRepresentation::FirstOnly] {
        let config = NetworkConfig::builder()
            .evaluation_mode(EvaluationMode::Timely)
            .timeline_representation(representation)
            .build();
        let (mut network, edges, reachable) = reachability(config);
        assert_eq!(
            network.mailbox_kind(reachable).unwrap(),
            Some(MailboxKind::Timely)
        );

        insert(&mut network, edges, &[tuple![1, 2], tuple![2, 3]]);
        assert_eq!(
            contents(&mut network, reachable),
            set(&[tuple![1, 2], tuple![2, 3], tuple![1, 3]])
        );

        delete(&mut network, edges, &[tuple![2, 3]]);
        assert_eq!(contents(&mut network, reachable), set(&[tuple![1, 2]]));
    }
}

#[test]
fn test_timely_timelines_record_derivation_depth() {
    let (mut network, edges, reachable) = reachability(timely());
    insert(&mut network, edges, &[tuple![1, 2], tuple![2, 3]]);

    let timelines = network.pull_with_timeline(reachable, true).unwrap();
    let first = |t: &Tuple| {
        timelines
            .iter()
            .find(|(tuple, _)| tuple == t)
            .and_then(|(_, timeline)| timeline.first())
            .unwrap()
    };
    assert!(first(&tuple![1, 2]) < first(&tuple![1, 3]));
}

#[test]
fn test_join_is_commutative() {
    let mut network = Network::default();
    let left = network.input(2);
    let right = network.input(2);
    let left_key = network.indexer(left, TupleMask::select_single(1, 2).unwrap()).unwrap();
    let right_key = network.indexer(right, TupleMask::select_single(0, 2).unwrap()).unwrap();
    let forward = network.join(left_key, right_key).unwrap();
    let backward = network.join(right_key, left_key).unwrap();

    insert(&mut network, left, &[tuple![1, 10], tuple![2, 10], tuple![3, 30]]);
    insert(&mut network, right, &[tuple![10, "x"], tuple![30, "y"], tuple![40, "z"]]);
    delete(&mut network, left, &[tuple![2, 10]]);

    let forward = contents(&mut network, forward);
    let backward: BTreeSet<Tuple> = contents(&mut network, backward)
        .into_iter()
        .map(|t| {
            // (key, payload, left) -> (left, key, payload)
            tuple![t.get(2).unwrap().clone(), t.get(0).unwrap().clone(), t.get(1).unwrap().clone()]
        })
        .collect();
    assert_eq!(forward, set(&[tuple![1, 10, "x"], tuple![3, 30, "y"]]));
    assert_eq!(forward, backward);
}

#[test]
fn test_representative_election() {
    let mut network = Network::default();
    let edges = network.input(2);
    let representatives = network
        .representative_election(edges, Connectivity::Weak)
        .unwrap();

    insert(&mut network, edges, &[tuple![1, 2], tuple![3, 4]]);
    let pairs = contents(&mut network, representatives);
    assert_eq!(pairs.len(), 4);
    let representative = |node: i32| {
        pairs
            .iter()
            .find(|t| t.value(0) == Some(&Value::from(node)))
            .and_then(|t| t.value(1))
            .cloned()
    };
    assert_eq!(representative(1), representative(2));
    assert_eq!(representative(3), representative(4));
    assert_ne!(representative(1), representative(3));
}

#[test]
fn test_poset_deletion_dominated_by_insertion() {
    let mut network = Network::default();
    let facts = network.input(2);
    let levels = network.uniqueness(2);
    network.connect_and_synchronize(facts, levels).unwrap();
    let poset = PosetInfo::new(
        TupleMask::select_single(0, 2).unwrap(),
        TupleMask::select_single(1, 2).unwrap(),
        |lower: &Tuple, upper: &Tuple| lower <= upper,
    );
    network.set_poset(levels, poset).unwrap();
    assert_eq!(
        network.mailbox_kind(levels).unwrap(),
        Some(MailboxKind::PosetAware)
    );

    insert(&mut network, facts, &[tuple!["a", 1]]);
    network.flush().unwrap();
    // refine the level of "a" within one flush
    delete(&mut network, facts, &[tuple!["a", 1]]);
    insert(&mut network, facts, &[tuple!["a", 2]]);
    assert_eq!(contents(&mut network, levels), set(&[tuple!["a", 2]]));
}

#[test]
fn test_dispatcher_buckets() {
    let mut network = Network::default();
    let orders = network.input(2);
    let dispatcher = network.dispatcher(orders, 0).unwrap();
    let open = network.bucket(dispatcher, "open").unwrap();
    let closed = network.bucket(dispatcher, "closed").unwrap();

    insert(
        &mut network,
        orders,
        &[tuple!["open", 1], tuple!["closed", 2], tuple!["open", 3], tuple!["void", 4]],
    );
    assert_eq!(
        contents(&mut network, open),
        set(&[tuple!["open", 1], tuple!["open", 3]])
    );
    assert_eq!(contents(&mut network, closed), set(&[tuple!["closed", 2]]));

    assert!(matches!(
        network.bucket(orders, "open"),
        Err(Error::WrongKind { .. })
    ));
}

#[test]
fn test_aggregator_sum_per_group() {
    let mut network = Network::default();
    let sales = network.input(2);
    let totals = network
        .aggregator(sales, TupleMask::select_single(0, 2).unwrap(), 1, AggregateKind::Sum)
        .unwrap();
    let out = network.production(ProductionInfo::new("totals", ["region", "total"]));
    network.connect_and_synchronize(totals, out).unwrap();

    insert(&mut network, sales, &[tuple!["north", 5], tuple!["north", 7], tuple!["south", 1]]);
    assert_eq!(
        contents(&mut network, out),
        set(&[
            Tuple::new(vec!["north".into(), Value::Int64(12)]),
            Tuple::new(vec!["south".into(), Value::Int64(1)]),
        ])
    );

    delete(&mut network, sales, &[tuple!["south", 1]]);
    assert_eq!(
        contents(&mut network, out),
        set(&[Tuple::new(vec!["north".into(), Value::Int64(12)])])
    );
}

#[test]
fn test_aggregator_sum_exact_after_insert_then_delete() {
    let mut network = Network::default();
    let readings = network.input(2);
    let totals = network
        .aggregator(readings, TupleMask::select_single(0, 2).unwrap(), 1, AggregateKind::Sum)
        .unwrap();

    let big = 9_007_199_254_740_993_i64;
    insert(
        &mut network,
        readings,
        &[tuple!["ints", big], tuple!["ints", 1], tuple!["floats", 0.1], tuple!["floats", 0.2]],
    );
    network.flush().unwrap();
    delete(&mut network, readings, &[tuple!["ints", 1], tuple!["floats", 0.2]]);
    assert_eq!(
        contents(&mut network, totals),
        set(&[
            Tuple::new(vec!["ints".into(), Value::Int64(big)]),
            Tuple::new(vec!["floats".into(), Value::Float64(0.1)]),
        ])
    );
}

#[test]
fn test_timely_recursive_aggregation() {
    let mut network = Network::new(timely());
    let numbers = network.input(1);
    let all = network.uniqueness(1);
    network.connect_and_synchronize(numbers, all).unwrap();
    let max = network
        .aggregator(all, TupleMask::empty(1), 0, AggregateKind::Max)
        .unwrap();
    network.connect_and_synchronize(max, all).unwrap();
    assert!(network.is_in_recursive_group(max));

    insert(&mut network, numbers, &[tuple![3], tuple![5]]);
    assert_eq!(contents(&mut network, all), set(&[tuple![3], tuple![5]]));
    assert_eq!(contents(&mut network, max), set(&[tuple![5]]));

    insert(&mut network, numbers, &[tuple![9]]);
    assert_eq!(contents(&mut network, all), set(&[tuple![3], tuple![5], tuple![9]]));
    assert_eq!(contents(&mut network, max), set(&[tuple![9]]));
    let latest: BTreeSet<Tuple> = network
        .pull_with_timeline(max, true)
        .unwrap()
        .into_iter()
        .map(|(tuple, _)| tuple)
        .collect();
    assert_eq!(latest, set(&[tuple![9]]));
}

/// staffing(name, dept, building) with "none" for departments without a building.
#[test]
fn test_left_join_fills_missing_groups() {
    let mut network = Network::default();
    let staff = network.input(2);
    let buildings = network.input(2);
    let by_dept = network
        .indexer(staff, TupleMask::select_single(1, 2).unwrap())
        .unwrap();
    let located = network
        .indexer(buildings, TupleMask::select_single(0, 2).unwrap())
        .unwrap();
    let outer = network.left_join(located, "none").unwrap();
    let joined = network.join(by_dept, outer).unwrap();
    let out = network.production(ProductionInfo::new("staffing", ["name", "dept", "building"]));
    network.connect_and_synchronize(joined, out).unwrap();

    insert(&mut network, staff, &[tuple!["alice", "eng"], tuple!["bob", "ops"]]);
    insert(&mut network, buildings, &[tuple!["eng", "b1"]]);
    assert_eq!(
        contents(&mut network, out),
        set(&[tuple!["alice", "eng", "b1"], tuple!["bob", "ops", "none"]])
    );

    insert(&mut network, buildings, &[tuple!["ops", "b2"], tuple!["ops", "b3"]]);
    assert_eq!(
        contents(&mut network, out),
        set(&[
            tuple!["alice", "eng", "b1"],
            tuple!["bob", "ops", "b2"],
            tuple!["bob", "ops", "b3"],
        ])
    );

    delete(&mut network, buildings, &[tuple!["eng", "b1"], tuple!["ops", "b2"]]);
    assert_eq!(
        contents(&mut network, out),
        set(&[tuple!["alice", "eng", "none"], tuple!["bob", "ops", "b3"]])
    );
    assert_eq!(contents(&mut network, joined), contents(&mut network, out));
    assert_eq!(contents(&mut network, outer), set(&[tuple!["ops", "b3"]]));
}

#[test]
fn test_left_join_requires_single_omitted_column() {
    let mut network = Network::default();
    let facts = network.input(3);
    let wide = network
        .indexer(facts, TupleMask::select_single(0, 3).unwrap())
        .unwrap();
    assert!(matches!(network.left_join(wide, 0), Err(Error::WrongKind { .. })));
    assert!(matches!(network.left_join(facts, 0), Err(Error::WrongKind { .. })));
}

#[test]
fn test_timely_rejects_left_join_over_recursive_indexer() {
    let (mut network, _, reachable) = reachability(timely());
    let by_target = network
        .indexer(reachable, TupleMask::select_single(1, 2).unwrap())
        .unwrap();
    let err = network.left_join(by_target, 0).unwrap_err();
    assert!(matches!(err, Error::RecursiveTimelyNode { node, .. } if node == by_target));
}

#[test]
fn test_transformer_withdraws_what_it_emitted() {
    let mut network = Network::default();
    let facts = network.input(1);
    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);
    let stamped = network
        .transformer(
            facts,
            move |t: &Tuple| {
                let mut calls = counter.lock().unwrap();
                *calls += 1;
                Tuple::new(vec![t.value(0).cloned().unwrap_or(Value::Null), Value::Int32(*calls)])
            },
            Some(2),
        )
        .unwrap();
    let out = network.production(ProductionInfo::new("stamped", ["v", "call"]));
    network.connect_and_synchronize(stamped, out).unwrap();

    insert(&mut network, facts, &[tuple![7]]);
    assert_eq!(contents(&mut network, out), set(&[tuple![7, 1]]));

    delete(&mut network, facts, &[tuple![7]]);
    assert!(contents(&mut network, out).is_empty());
    assert!(contents(&mut network, stamped).is_empty());
    assert_eq!(*calls.lock().unwrap(), 1);
}

type Log = Arc<Mutex<Vec<(&'static str, Tuple)>>>;

fn record(network: &mut Network, node: NodeId, label: &'static str, log: &Log) {
    let log = Arc::clone(log);
    network
        .attach_listener(node, move |delta: &Delta| {
            log.lock().unwrap().push((label, delta.tuple.clone()));
        })
        .unwrap();
}

fn labels(log: &Log) -> Vec<&'static str> {
    log.lock().unwrap().iter().map(|(label, _)| *label).collect()
}

#[test]
fn test_listeners_run_most_recent_first() {
    let mut network = Network::default();
    let facts = network.input(1);
    let log = Log::default();
    record(&mut network, facts, "a", &log);
    record(&mut network, facts, "b", &log);
    record(&mut network, facts, "c", &log);

    insert(&mut network, facts, &[tuple![1]]);
    network.flush().unwrap();
    assert_eq!(labels(&log), ["c", "b", "a"]);
}

#[test]
fn test_children_most_recent_first() {
    let mut network = Network::default();
    let facts = network.input(1);
    let first = network.value_filter(facts, 0, 1).unwrap();
    let second = network.value_filter(facts, 0, 2).unwrap();
    let third = network.value_filter(facts, 0, 3).unwrap();
    assert_eq!(network.children(facts).unwrap(), &[third, second, first]);
}

#[test]
fn test_indexer_subscriptions_most_recent_first() {
    let mut network = Network::default();
    let left = network.input(2);
    let right = network.input(2);
    let by_second = network
        .indexer(left, TupleMask::select_single(1, 2).unwrap())
        .unwrap();
    let by_first = network
        .indexer(right, TupleMask::select_single(0, 2).unwrap())
        .unwrap();
    let log = Log::default();
    for label in ["j1", "j2", "j3"] {
        let join = network.join(by_second, by_first).unwrap();
        record(&mut network, join, label, &log);
    }

    insert(&mut network, right, &[tuple![2, 3]]);
    network.flush().unwrap();
    log.lock().unwrap().clear();
    insert(&mut network, left, &[tuple![1, 2]]);
    network.flush().unwrap();
    assert_eq!(labels(&log), ["j3", "j2", "j1"]);
}

#[test]
fn test_specialized_indexers_share_one_ordered_list() {
    let mut network = Network::default();
    let facts = network.input(1);
    let other = network.input(1);
    let facts_all = network.indexer(facts, TupleMask::identity(1)).unwrap();
    let facts_none = network.indexer(facts, TupleMask::empty(1)).unwrap();
    let other_all = network.indexer(other, TupleMask::identity(1)).unwrap();
    let other_none = network.indexer(other, TupleMask::empty(1)).unwrap();
    assert_eq!(network.kind_name(facts_all).unwrap(), "specialized indexer");
    assert_eq!(network.kind_name(facts_none).unwrap(), "specialized indexer");

    let log = Log::default();
    let first = network.join(facts_all, other_all).unwrap();
    record(&mut network, first, "identity-1", &log);
    let second = network.join(facts_none, other_none).unwrap();
    record(&mut network, second, "null", &log);
    let third = network.join(facts_all, other_all).unwrap();
    record(&mut network, third, "identity-2", &log);

    insert(&mut network, other, &[tuple![1]]);
    network.flush().unwrap();
    log.lock().unwrap().clear();
    insert(&mut network, facts, &[tuple![1]]);
    network.flush().unwrap();
    assert_eq!(labels(&log), ["identity-2", "null", "identity-1"]);
}

/// Both joins listen on `by_target`; the first feeds the second.
#[test]
fn test_downstream_listener_of_shared_indexer_runs_first() {
    let mut network = Network::default();
    let edges = network.input(2);
    let by_target = network
        .indexer(edges, TupleMask::select_single(1, 2).unwrap())
        .unwrap();
    let by_source = network
        .indexer(edges, TupleMask::select_single(0, 2).unwrap())
        .unwrap();
    let paths = network.join(by_target, by_source).unwrap();
    let ends = network
        .trimmer(paths, TupleMask::new(vec![0, 2], 3).unwrap())
        .unwrap();
    let ends_by_source = network
        .indexer(ends, TupleMask::select_single(0, 2).unwrap())
        .unwrap();
    let longer = network.join(by_target, ends_by_source).unwrap();

    let log = Log::default();
    record(&mut network, paths, "paths", &log);
    record(&mut network, longer, "longer", &log);

    insert(&mut network, edges, &[tuple![2, 3], tuple![3, 4]]);
    network.flush().unwrap();
    log.lock().unwrap().clear();
    insert(&mut network, edges, &[tuple![1, 2]]);
    network.flush().unwrap();
    assert_eq!(
        *log.lock().unwrap(),
        vec![("longer", tuple![1, 2, 4]), ("paths", tuple![1, 2, 3])]
    );
}

#[test]
fn test_filters_and_transformer() {
    let mut network = Network::default();
    let pairs = network.input(2);
    let distinct = network.inequality_filter(pairs, 0, vec![1]).unwrap();
    let doubled = network
        .transformer(
            distinct,
            |t: &Tuple| tuple![t.value(0).and_then(Value::as_i32).unwrap_or(0) * 2],
            Some(1),
        )
        .unwrap();

    insert(&mut network, pairs, &[tuple![1, 1], tuple![2, 3], tuple![4, 5]]);
    assert_eq!(contents(&mut network, distinct), set(&[tuple![2, 3], tuple![4, 5]]));
    assert_eq!(contents(&mut network, doubled), set(&[tuple![4], tuple![8]]));
}

#[test]
fn test_listener_detach() {
    let mut network = Network::default();
    let facts = network.input(1);
    let count = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&count);
    let listener = network
        .attach_listener(facts, move |_: &Delta| *sink.lock().unwrap() += 1)
        .unwrap();

    insert(&mut network, facts, &[tuple![1]]);
    network.flush().unwrap();
    assert!(network.detach_listener(facts, listener).unwrap());
    assert!(!network.detach_listener(facts, listener).unwrap());
    insert(&mut network, facts, &[tuple![2]]);
    network.flush().unwrap();

    assert_eq!(*count.lock().unwrap(), 1);
}

#[test]
fn test_single_parent_nodes_reject_second_parent() {
    let mut network = Network::default();
    let a = network.input(2);
    let b = network.input(2);
    let trimmer = network
        .trimmer(a, TupleMask::select_single(0, 2).unwrap())
        .unwrap();

    let err = network.connect(b, trimmer).unwrap_err();
    assert!(matches!(err, Error::ParentAlreadyConnected { child, existing, .. } if child == trimmer && existing == a));
    assert_eq!(err.category(), ErrorCategory::Structural);
    assert_eq!(network.parents(trimmer).unwrap(), &[a]);
}

#[test]
fn test_timely_rejects_recursive_closure() {
    let mut network = Network::new(timely());
    let edges = network.input(2);
    let all = network.uniqueness(2);
    network.connect_and_synchronize(edges, all).unwrap();
    let closure = network.transitive_closure(all).unwrap();

    let err = network.connect(closure, all).unwrap_err();
    assert!(matches!(err, Error::RecursiveTimelyNode { node, .. } if node == closure));
    assert!(!network.is_in_recursive_group(all));
    assert!(network.children(closure).unwrap().is_empty());
}

#[test]
fn test_remove_node_in_use() {
    let mut network = Network::default();
    let facts = network.input(1);
    let out = network.production(ProductionInfo::new("facts", ["v"]));
    network.connect_and_synchronize(facts, out).unwrap();

    assert!(matches!(network.remove_node(facts), Err(Error::NodeInUse(node)) if node == facts));
    network.disconnect_and_desynchronize(facts, out).unwrap();
    network.remove_node(facts).unwrap();
    assert!(!network.contains_node(facts));
}

#[test]
fn test_removed_node_slot_is_reused() {
    let mut network = Network::default();
    let stale = network.input(1);
    network.remove_node(stale).unwrap();

    let fresh = network.input(1);
    assert_eq!(fresh.index(), stale.index());
    assert_ne!(fresh, stale);
    assert!(!network.contains_node(stale));
    assert!(matches!(network.kind_name(stale), Err(Error::UnknownNode(node)) if node == stale));
    assert_eq!(network.node_count(), 1);
}

#[test]
fn test_synchronize_replays_existing_contents() {
    let mut network = Network::default();
    let facts = network.input(1);
    insert(&mut network, facts, &[tuple![1], tuple![2]]);
    network.flush().unwrap();

    let late = network.production(ProductionInfo::new("late", ["v"]));
    network.connect_and_synchronize(facts, late).unwrap();
    assert_eq!(contents(&mut network, late), set(&[tuple![1], tuple![2]]));

    network.disconnect_and_desynchronize(facts, late).unwrap();
    assert!(contents(&mut network, late).is_empty());
}

#[test]
fn test_clear_keeps_topology() {
    let (mut network, edges, reachable) = reachability(NetworkConfig::default());
    insert(&mut network, edges, &[tuple![1, 2], tuple![2, 3]]);
    network.flush().unwrap();
    let nodes = network.node_count();

    network.clear();
    assert_eq!(network.node_count(), nodes);
    assert!(contents(&mut network, reachable).is_empty());

    insert(&mut network, edges, &[tuple![5, 6]]);
    assert_eq!(contents(&mut network, reachable), set(&[tuple![5, 6]]));
}

#[test]
fn test_update_rejects_non_input() {
    let mut network = Network::default();
    let facts = network.input(1);
    let out = network.uniqueness(1);
    assert!(matches!(
        network.update(out, Direction::Insert, tuple![1]),
        Err(Error::NotAnInput(_))
    ));
    assert!(matches!(
        network.update(facts, Direction::Insert, tuple![1, 2]),
        Err(Error::ArityMismatch { .. })
    ));
}
