//! Directed multigraph with edge multiplicities.

use alloc::vec::Vec;
use core::hash::Hash;
use hashbrown::HashMap;

/// A directed multigraph; parallel edges are counted, not stored.
#[derive(Clone, Debug)]
pub struct Graph<V> {
    targets: HashMap<V, HashMap<V, usize>>,
    sources: HashMap<V, HashMap<V, usize>>,
}

impl<V: Clone + Eq + Hash> Default for Graph<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Eq + Hash> Graph<V> {
    pub fn new() -> Self {
        Self {
            targets: HashMap::new(),
            sources: HashMap::new(),
        }
    }

    /// Adds a node; returns false if it already existed.
    pub fn insert_node(&mut self, node: V) -> bool {
        if self.targets.contains_key(&node) {
            return false;
        }
        self.targets.insert(node.clone(), HashMap::new());
        self.sources.insert(node, HashMap::new());
        true
    }

    /// Removes an isolated node; returns false if it is missing or still has edges.
    pub fn delete_node(&mut self, node: &V) -> bool {
        if !self.is_isolated(node) {
            return false;
        }
        self.targets.remove(node);
        self.sources.remove(node);
        true
    }

    /// Removes a node together with every incident edge.
    pub fn remove_node_with_edges(&mut self, node: &V) {
        if let Some(targets) = self.targets.remove(node) {
            for target in targets.keys() {
                if let Some(sources) = self.sources.get_mut(target) {
                    sources.remove(node);
                }
            }
        }
        if let Some(sources) = self.sources.remove(node) {
            for source in sources.keys() {
                if let Some(targets) = self.targets.get_mut(source) {
                    targets.remove(node);
                }
            }
        }
    }

    /// Adds one edge, creating missing endpoints; returns the new multiplicity.
    pub fn insert_edge(&mut self, source: V, target: V) -> usize {
        self.add_edges(source, target, 1)
    }

    /// Adds `count` parallel edges, creating missing endpoints.
    pub fn add_edges(&mut self, source: V, target: V, count: usize) -> usize {
        self.insert_node(source.clone());
        self.insert_node(target.clone());
        if let Some(sources) = self.sources.get_mut(&target) {
            *sources.entry(source.clone()).or_insert(0) += count;
        }
        self.targets
            .get_mut(&source)
            .map(|targets| {
                let m = targets.entry(target).or_insert(0);
                *m += count;
                *m
            })
            .unwrap_or(0)
    }

    /// Removes one edge; returns the remaining multiplicity, or None if absent.
    pub fn delete_edge(&mut self, source: &V, target: &V) -> Option<usize> {
        let remaining = decrement(self.targets.get_mut(source)?, target)?;
        if let Some(sources) = self.sources.get_mut(target) {
            decrement(sources, source);
        }
        Some(remaining)
    }

    /// Multiplicity of the edge `source -> target`.
    pub fn edge_count(&self, source: &V, target: &V) -> usize {
        self.targets
            .get(source)
            .and_then(|t| t.get(target))
            .copied()
            .unwrap_or(0)
    }

    #[inline]
    pub fn contains_node(&self, node: &V) -> bool {
        self.targets.contains_key(node)
    }

    /// Returns true if the node exists and has no edges at all.
    pub fn is_isolated(&self, node: &V) -> bool {
        self.targets.get(node).is_some_and(HashMap::is_empty)
            && self.sources.get(node).is_some_and(HashMap::is_empty)
    }

    /// Direct successors with edge multiplicities.
    pub fn targets(&self, node: &V) -> impl Iterator<Item = (&V, usize)> + '_ {
        self.targets
            .get(node)
            .into_iter()
            .flat_map(|t| t.iter().map(|(v, &c)| (v, c)))
    }

    /// Direct predecessors with edge multiplicities.
    pub fn sources(&self, node: &V) -> impl Iterator<Item = (&V, usize)> + '_ {
        self.sources
            .get(node)
            .into_iter()
            .flat_map(|s| s.iter().map(|(v, &c)| (v, c)))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &V> + '_ {
        self.targets.keys()
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.targets.len()
    }

    /// Every edge with its multiplicity.
    pub fn edges(&self) -> Vec<(V, V, usize)> {
        self.targets
            .iter()
            .flat_map(|(s, ts)| ts.iter().map(move |(t, &c)| (s.clone(), t.clone(), c)))
            .collect()
    }
}

fn decrement<V: Eq + Hash>(counts: &mut HashMap<V, usize>, key: &V) -> Option<usize> {
    let count = counts.get_mut(key)?;
    *count -= 1;
    let remaining = *count;
    if remaining == 0 {
        counts.remove(key);
    }
    Some(remaining)
}
