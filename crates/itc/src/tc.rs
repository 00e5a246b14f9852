//! Incremental transitive closure over strongly connected components.
//!
//! The graph is kept as a partition into SCCs plus the reduced DAG between
//! SCC roots (with edge multiplicities). `(s, t)` is in the closure iff
//!
//! - `s` and `t` share an SCC that has more than one member, or `s == t`
//!   and `s` has a self-loop; or
//! - the SCC of `t` is reachable from the SCC of `s` in the reduced DAG.
//!
//! Only nodes that reach the source of a changed edge can change their row
//! of the closure, so each update diffs exactly those rows.

use crate::graph::Graph;
use crate::scc::strongly_connected_components;
use crate::union_find::UnionFind;
use alloc::vec::Vec;
use core::hash::Hash;
use hashbrown::{HashMap, HashSet};
use rete_core::{Error, Result, Signed};

/// A reachability change `(source, target)`.
pub type ReachabilityChange<V> = Signed<(V, V)>;

/// Incrementally maintained transitive closure of a directed multigraph.
#[derive(Clone, Debug)]
pub struct IncrementalTc<V> {
    graph: Graph<V>,
    sccs: UnionFind<V>,
    reduced: Graph<V>,
}

impl<V: Clone + Eq + Hash + Ord> Default for IncrementalTc<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Eq + Hash + Ord> IncrementalTc<V> {
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
            sccs: UnionFind::new(),
            reduced: Graph::new(),
        }
    }

    fn ensure_node(&mut self, node: &V) {
        if self.graph.insert_node(node.clone()) {
            self.sccs.make_set(node.clone());
            self.reduced.insert_node(node.clone());
        }
    }

    fn root(&self, node: &V) -> Option<V> {
        self.sccs.find(node).cloned()
    }

    /// Inserts one `source -> target` edge, creating missing nodes, and
    /// returns the pairs that became reachable.
    pub fn insert_edge(&mut self, source: V, target: V) -> Vec<ReachabilityChange<V>> {
        self.ensure_node(&source);
        self.ensure_node(&target);
        let affected = self.nodes_reaching(&source);
        let before = self.rows(&affected);

        self.graph.insert_edge(source.clone(), target.clone());
        if let (Some(rs), Some(rt)) = (self.root(&source), self.root(&target)) {
            if rs != rt {
                if self.root_reaches(&rt, &rs) {
                    self.merge_cycle(&rs, &rt);
                } else {
                    self.reduced.insert_edge(rs, rt);
                }
            }
        }

        let after = self.rows(&affected);
        diff_rows(before, after)
    }

    /// Deletes one `source -> target` edge and returns the pairs that are no
    /// longer reachable. Endpoints left without edges are removed.
    pub fn delete_edge(&mut self, source: &V, target: &V) -> Result<Vec<ReachabilityChange<V>>> {
        if self.graph.edge_count(source, target) == 0 {
            return Err(Error::DuplicateDeletion);
        }
        let affected = self.nodes_reaching(source);
        let before = self.rows(&affected);

        self.graph.delete_edge(source, target);
        if let (Some(rs), Some(rt)) = (self.root(source), self.root(target)) {
            if rs != rt {
                self.reduced.delete_edge(&rs, &rt);
            } else if source != target {
                self.split_if_disconnected(&rs);
            }
        }

        let after = self.rows(&affected);
        for node in [source, target] {
            if self.graph.is_isolated(node) {
                self.graph.delete_node(node);
                self.sccs.delete_set(node);
                self.reduced.delete_node(node);
            }
        }
        Ok(diff_rows(before, after))
    }

    /// Roots reachable from `root` through at least one reduced edge.
    fn reachable_roots(&self, root: &V) -> HashSet<V> {
        let mut seen = HashSet::new();
        let mut pending: Vec<V> = self.reduced.targets(root).map(|(v, _)| v.clone()).collect();
        while let Some(next) = pending.pop() {
            if seen.insert(next.clone()) {
                pending.extend(self.reduced.targets(&next).map(|(v, _)| v.clone()));
            }
        }
        seen
    }

    /// Roots that reach `root` through at least one reduced edge.
    fn reaching_roots(&self, root: &V) -> HashSet<V> {
        let mut seen = HashSet::new();
        let mut pending: Vec<V> = self.reduced.sources(root).map(|(v, _)| v.clone()).collect();
        while let Some(next) = pending.pop() {
            if seen.insert(next.clone()) {
                pending.extend(self.reduced.sources(&next).map(|(v, _)| v.clone()));
            }
        }
        seen
    }

    fn root_reaches(&self, from: &V, to: &V) -> bool {
        self.reachable_roots(from).contains(to)
    }

    /// `node` and every node that reaches it.
    fn nodes_reaching(&self, node: &V) -> Vec<V> {
        let Some(root) = self.root(node) else {
            return Vec::new();
        };
        let mut roots = self.reaching_roots(&root);
        roots.insert(root);
        roots
            .iter()
            .filter_map(|r| self.sccs.members(r))
            .flat_map(|members| members.iter().cloned())
            .collect()
    }

    /// The closure row of `source`.
    fn row(&self, source: &V) -> HashSet<V> {
        let mut row = HashSet::new();
        let Some(root) = self.root(source) else {
            return row;
        };
        if let Some(members) = self.sccs.members(&root) {
            if members.len() > 1 || self.graph.edge_count(source, source) > 0 {
                row.extend(members.iter().cloned());
            }
        }
        for reachable in self.reachable_roots(&root) {
            if let Some(members) = self.sccs.members(&reachable) {
                row.extend(members.iter().cloned());
            }
        }
        row
    }

    fn rows(&self, sources: &[V]) -> Vec<(V, HashSet<V>)> {
        sources.iter().map(|s| (s.clone(), self.row(s))).collect()
    }

    /// Collapses every SCC on a cycle through `rt ->* rs` into one.
    fn merge_cycle(&mut self, rs: &V, rt: &V) {
        let mut forward = self.reachable_roots(rt);
        forward.insert(rt.clone());
        let mut backward = self.reaching_roots(rs);
        backward.insert(rs.clone());
        let merged: Vec<V> = forward.intersection(&backward).cloned().collect();

        for root in &merged {
            self.reduced.remove_node_with_edges(root);
        }
        let mut members = Vec::new();
        for root in &merged {
            members.extend(self.sccs.delete_set(root));
        }
        if let Some(root) = self.sccs.make_set_from(members) {
            self.reduced.insert_node(root.clone());
            self.connect_reduced(&[root]);
        }
    }

    /// Recomputes the SCCs inside the component rooted at `root` after an
    /// internal edge was removed.
    fn split_if_disconnected(&mut self, root: &V) {
        let members: Vec<V> = match self.sccs.members(root) {
            Some(m) => m.iter().cloned().collect(),
            None => return,
        };
        let graph = &self.graph;
        let components = strongly_connected_components(&members, |n| {
            graph.targets(n).map(|(v, _)| v.clone()).collect::<Vec<_>>()
        });
        if components.len() <= 1 {
            return;
        }
        self.reduced.remove_node_with_edges(root);
        self.sccs.delete_set(root);
        let mut roots = Vec::with_capacity(components.len());
        for component in components {
            if let Some(r) = self.sccs.make_set_from(component) {
                self.reduced.insert_node(r.clone());
                roots.push(r);
            }
        }
        self.connect_reduced(&roots);
    }

    /// Re-adds the reduced edges of freshly created roots from the node graph.
    fn connect_reduced(&mut self, fresh: &[V]) {
        let mut edges: Vec<(V, V, usize)> = Vec::new();
        for root in fresh {
            let Some(members) = self.sccs.members(root) else {
                continue;
            };
            for member in members {
                for (target, count) in self.graph.targets(member) {
                    if let Some(rt) = self.sccs.find(target) {
                        if rt != root {
                            edges.push((root.clone(), rt.clone(), count));
                        }
                    }
                }
                for (source, count) in self.graph.sources(member) {
                    if let Some(rs) = self.sccs.find(source) {
                        // edges between fresh roots are covered by the outgoing pass
                        if rs != root && !fresh.contains(rs) {
                            edges.push((rs.clone(), root.clone(), count));
                        }
                    }
                }
            }
        }
        for (s, t, count) in edges {
            self.reduced.add_edges(s, t, count);
        }
    }

    /// Returns true if `target` is reachable from `source` by a non-empty path.
    pub fn is_reachable(&self, source: &V, target: &V) -> bool {
        self.row(source).contains(target)
    }

    /// Every node reachable from `source`, sorted.
    pub fn reachable_targets(&self, source: &V) -> Vec<V> {
        let mut targets: Vec<V> = self.row(source).into_iter().collect();
        targets.sort();
        targets
    }

    /// The whole closure as sorted pairs.
    pub fn closure(&self) -> Vec<(V, V)> {
        let mut pairs: Vec<(V, V)> = self
            .graph
            .nodes()
            .flat_map(|s| self.row(s).into_iter().map(move |t| (s.clone(), t)))
            .collect();
        pairs.sort();
        pairs
    }

    /// The underlying graph.
    pub fn graph(&self) -> &Graph<V> {
        &self.graph
    }

    /// Number of strongly connected components.
    pub fn component_count(&self) -> usize {
        self.sccs.roots().count()
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

fn diff_rows<V: Clone + Eq + Hash + Ord>(
    before: Vec<(V, HashSet<V>)>,
    after: Vec<(V, HashSet<V>)>,
) -> Vec<ReachabilityChange<V>> {
    let after: HashMap<V, HashSet<V>> = after.into_iter().collect();
    let mut changes = Vec::new();
    for (source, old_row) in before {
        let empty = HashSet::new();
        let new_row = after.get(&source).unwrap_or(&empty);
        for target in old_row.difference(new_row) {
            changes.push(Signed::delete((source.clone(), target.clone())));
        }
        for target in new_row.difference(&old_row) {
            changes.push(Signed::insert((source.clone(), target.clone())));
        }
    }
    changes.sort_by(|a, b| {
        a.direction
            .cmp(&b.direction)
            .then_with(|| a.payload.cmp(&b.payload))
    });
    changes
}
