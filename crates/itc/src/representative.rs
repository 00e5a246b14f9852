//! Incremental representative election.
//!
//! Every node belongs to exactly one component and each component has one
//! representative (its root). Changes are reported as `(member, root)` pairs:
//! a node that joins the graph gets `insert (n, n)`, a node that moves to
//! another component gets `delete (n, old)` followed by `insert (n, new)`.

use crate::graph::Graph;
use crate::scc::strongly_connected_components;
use crate::union_find::UnionFind;
use alloc::vec::Vec;
use core::hash::Hash;
use hashbrown::HashSet;
use rete_core::{Error, Result, Signed};

/// A representative change `(member, representative)`.
pub type RepresentativeChange<V> = Signed<(V, V)>;

/// Which notion of connectedness defines a component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Connectivity {
    /// Nodes reachable from each other along edge directions.
    Strong,
    /// Nodes connected when edge directions are ignored.
    Weak,
}

#[derive(Clone, Debug)]
pub struct RepresentativeElection<V> {
    connectivity: Connectivity,
    graph: Graph<V>,
    components: UnionFind<V>,
}

impl<V: Clone + Eq + Hash + Ord> RepresentativeElection<V> {
    pub fn new(connectivity: Connectivity) -> Self {
        Self {
            connectivity,
            graph: Graph::new(),
            components: UnionFind::new(),
        }
    }

    #[inline]
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// Inserts one `source -> target` edge and returns the representative changes.
    pub fn insert_edge(&mut self, source: V, target: V) -> Vec<RepresentativeChange<V>> {
        let mut changes = Vec::new();
        for node in [&source, &target] {
            if self.graph.insert_node(node.clone()) {
                self.components.make_set(node.clone());
                changes.push(Signed::insert((node.clone(), node.clone())));
            }
        }
        self.graph.insert_edge(source.clone(), target.clone());

        let (Some(rs), Some(rt)) = (
            self.components.find(&source).cloned(),
            self.components.find(&target).cloned(),
        ) else {
            return changes;
        };
        if rs == rt {
            return changes;
        }
        match self.connectivity {
            Connectivity::Weak => self.merge(&[rs, rt], &mut changes),
            Connectivity::Strong => {
                let forward = self.reachable(&target, true);
                if forward.contains(&source) {
                    let backward = self.reachable(&source, false);
                    let mut roots: Vec<V> = forward
                        .intersection(&backward)
                        .filter_map(|n| self.components.find(n).cloned())
                        .collect();
                    roots.sort();
                    roots.dedup();
                    self.merge(&roots, &mut changes);
                }
            }
        }
        changes
    }

    /// Deletes one `source -> target` edge and returns the representative
    /// changes. Endpoints left without edges leave the graph.
    pub fn delete_edge(&mut self, source: &V, target: &V) -> Result<Vec<RepresentativeChange<V>>> {
        if self.graph.edge_count(source, target) == 0 {
            return Err(Error::DuplicateDeletion);
        }
        self.graph.delete_edge(source, target);
        let mut changes = Vec::new();

        if source != target {
            if let (Some(rs), Some(rt)) = (self.components.find(source), self.components.find(target)) {
                if rs == rt {
                    let root = rs.clone();
                    self.split(&root, &mut changes);
                }
            }
        }

        for node in [source, target] {
            if self.graph.is_isolated(node) {
                self.graph.delete_node(node);
                if let Some(root) = self.components.find(node).cloned() {
                    changes.push(Signed::delete((node.clone(), root.clone())));
                    self.components.delete_set(&root);
                }
            }
        }
        Ok(changes)
    }

    /// The representative of `node`, if it is part of the graph.
    pub fn representative(&self, node: &V) -> Option<&V> {
        self.components.find(node)
    }

    /// Every `(member, representative)` pair, sorted.
    pub fn assignments(&self) -> Vec<(V, V)> {
        let mut pairs: Vec<(V, V)> = self
            .components
            .roots()
            .filter_map(|root| self.components.members(root).map(|m| (root, m)))
            .flat_map(|(root, members)| members.iter().map(move |m| (m.clone(), root.clone())))
            .collect();
        pairs.sort();
        pairs
    }

    pub fn component_count(&self) -> usize {
        self.components.roots().count()
    }

    pub fn graph(&self) -> &Graph<V> {
        &self.graph
    }

    pub fn clear(&mut self) {
        self.graph = Graph::new();
        self.components = UnionFind::new();
    }

    /// Merges the sets rooted at `roots` into the largest one (the earliest on ties).
    fn merge(&mut self, roots: &[V], changes: &mut Vec<RepresentativeChange<V>>) {
        let Some(keep) = roots
            .iter()
            .rev()
            .max_by_key(|r| self.components.set_size(r))
            .cloned()
        else {
            return;
        };
        for other in roots.iter().filter(|r| **r != keep) {
            if let Some(members) = self.components.members(other) {
                for member in members {
                    changes.push(Signed::delete((member.clone(), other.clone())));
                    changes.push(Signed::insert((member.clone(), keep.clone())));
                }
            }
            self.components.merge_into(&keep, other);
        }
    }

    /// Re-partitions the component rooted at `root`; the part that still
    /// contains `root` keeps it.
    fn split(&mut self, root: &V, changes: &mut Vec<RepresentativeChange<V>>) {
        let members: Vec<V> = match self.components.members(root) {
            Some(m) => m.iter().cloned().collect(),
            None => return,
        };
        let parts = match self.connectivity {
            Connectivity::Strong => {
                let graph = &self.graph;
                strongly_connected_components(&members, |n| {
                    graph.targets(n).map(|(v, _)| v.clone()).collect::<Vec<_>>()
                })
            }
            Connectivity::Weak => self.weak_components(&members),
        };
        if parts.len() <= 1 {
            return;
        }
        for part in parts {
            if part.contains(root) {
                continue;
            }
            let moved = part.clone();
            if let Some(new_root) = self.components.split_off(root, part) {
                for member in moved {
                    changes.push(Signed::delete((member.clone(), root.clone())));
                    changes.push(Signed::insert((member, new_root.clone())));
                }
            }
        }
    }

    fn weak_components(&self, members: &[V]) -> Vec<Vec<V>> {
        let scope: HashSet<&V> = members.iter().collect();
        let mut seen: HashSet<V> = HashSet::new();
        let mut parts = Vec::new();
        for start in members {
            if seen.contains(start) {
                continue;
            }
            let mut part = Vec::new();
            let mut pending = alloc::vec![start.clone()];
            seen.insert(start.clone());
            while let Some(node) = pending.pop() {
                let neighbours = self
                    .graph
                    .targets(&node)
                    .chain(self.graph.sources(&node))
                    .map(|(v, _)| v);
                for next in neighbours {
                    if scope.contains(next) && seen.insert(next.clone()) {
                        pending.push(next.clone());
                    }
                }
                part.push(node);
            }
            parts.push(part);
        }
        parts
    }

    /// Nodes reachable from `start` (inclusive), along or against edge directions.
    fn reachable(&self, start: &V, forward: bool) -> HashSet<V> {
        let mut seen = HashSet::new();
        let mut pending = alloc::vec![start.clone()];
        seen.insert(start.clone());
        while let Some(node) = pending.pop() {
            let next: Vec<V> = if forward {
                self.graph.targets(&node).map(|(v, _)| v.clone()).collect()
            } else {
                self.graph.sources(&node).map(|(v, _)| v.clone()).collect()
            };
            for n in next {
                if seen.insert(n.clone()) {
                    pending.push(n);
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_weak_merge_and_split() {
        let mut re = RepresentativeElection::new(Connectivity::Weak);
        let changes = re.insert_edge(1, 2);
        assert_eq!(
            changes,
            vec![
                Signed::insert((1, 1)),
                Signed::insert((2, 2)),
                Signed::delete((2, 2)),
                Signed::insert((2, 1)),
            ]
        );
        re.insert_edge(3, 2);
        assert_eq!(re.assignments(), vec![(1, 1), (2, 1), (3, 1)]);

        let changes = re.delete_edge(&1, &2).unwrap();
        assert_eq!(changes.len(), 5);
        assert_eq!(re.representative(&1), None);
        assert_eq!(re.representative(&3), Some(&2));
        assert_eq!(re.assignments(), vec![(2, 2), (3, 2)]);
    }

    #[test]
    fn test_strong_requires_cycle() {
        let mut re = RepresentativeElection::new(Connectivity::Strong);
        re.insert_edge(1, 2);
        re.insert_edge(2, 3);
        assert_eq!(re.component_count(), 3);

        let changes = re.insert_edge(3, 1);
        assert_eq!(changes.len(), 4);
        assert_eq!(re.assignments(), vec![(1, 1), (2, 1), (3, 1)]);

        re.delete_edge(&2, &3).unwrap();
        assert_eq!(re.component_count(), 3);
        assert_eq!(re.representative(&3), Some(&3));
    }

    #[test]
    fn test_larger_component_keeps_root() {
        let mut re = RepresentativeElection::new(Connectivity::Weak);
        re.insert_edge(5, 6);
        re.insert_edge(5, 7);
        re.insert_edge(1, 2);
        re.insert_edge(2, 7);
        assert_eq!(re.representative(&1), Some(&5));
        assert_eq!(re.component_count(), 1);
    }

    #[test]
    fn test_missing_edge() {
        let mut re: RepresentativeElection<u32> = RepresentativeElection::new(Connectivity::Weak);
        assert_eq!(re.delete_edge(&1, &2), Err(Error::DuplicateDeletion));
    }
}
