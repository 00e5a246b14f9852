//! Disjoint sets with explicit roots.

use alloc::vec::Vec;
use core::hash::Hash;
use hashbrown::{HashMap, HashSet};

/// Partition of nodes into disjoint sets, each identified by a root member.
///
/// Every node maps directly to its root, so lookups are O(1); merging moves
/// the members of the absorbed set.
#[derive(Clone, Debug)]
pub struct UnionFind<V> {
    root_of: HashMap<V, V>,
    members: HashMap<V, HashSet<V>>,
}

impl<V: Clone + Eq + Hash + Ord> Default for UnionFind<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Eq + Hash + Ord> UnionFind<V> {
    pub fn new() -> Self {
        Self {
            root_of: HashMap::new(),
            members: HashMap::new(),
        }
    }

    /// Adds `node` as a singleton set. Existing nodes are left alone.
    pub fn make_set(&mut self, node: V) -> V {
        if let Some(root) = self.root_of.get(&node) {
            return root.clone();
        }
        self.root_of.insert(node.clone(), node.clone());
        let mut set = HashSet::new();
        set.insert(node.clone());
        self.members.insert(node.clone(), set);
        node
    }

    /// The root of the set containing `node`.
    #[inline]
    pub fn find(&self, node: &V) -> Option<&V> {
        self.root_of.get(node)
    }

    /// Members of the set rooted at `root`.
    pub fn members(&self, root: &V) -> Option<&HashSet<V>> {
        self.members.get(root)
    }

    /// Size of the set rooted at `root`.
    pub fn set_size(&self, root: &V) -> usize {
        self.members.get(root).map_or(0, HashSet::len)
    }

    pub fn roots(&self) -> impl Iterator<Item = &V> + '_ {
        self.members.keys()
    }

    #[inline]
    pub fn contains(&self, node: &V) -> bool {
        self.root_of.contains_key(node)
    }

    /// Moves every member of the set rooted at `other` into the set rooted at `keep`.
    pub fn merge_into(&mut self, keep: &V, other: &V) {
        if keep == other {
            return;
        }
        let Some(moved) = self.members.remove(other) else {
            return;
        };
        for node in &moved {
            self.root_of.insert(node.clone(), keep.clone());
        }
        if let Some(set) = self.members.get_mut(keep) {
            set.extend(moved);
        }
    }

    /// Merges the sets rooted at `a` and `b`, keeping the root of the larger one
    /// (`a` on ties). Returns the surviving root.
    pub fn union(&mut self, a: &V, b: &V) -> V {
        let (keep, other) = if self.set_size(b) > self.set_size(a) {
            (b.clone(), a.clone())
        } else {
            (a.clone(), b.clone())
        };
        self.merge_into(&keep, &other);
        keep
    }

    /// Removes the set rooted at `root`, returning its members.
    pub fn delete_set(&mut self, root: &V) -> Vec<V> {
        let members: Vec<V> = self
            .members
            .remove(root)
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        for node in &members {
            self.root_of.remove(node);
        }
        members
    }

    /// Creates a set from nodes that belong to no set; the smallest becomes the root.
    pub fn make_set_from(&mut self, nodes: Vec<V>) -> Option<V> {
        let root = nodes.iter().min()?.clone();
        for node in &nodes {
            self.root_of.insert(node.clone(), root.clone());
        }
        self.members.insert(root.clone(), nodes.into_iter().collect());
        Some(root)
    }

    /// Moves `part` out of the set rooted at `root` into a new set; returns the new root.
    pub fn split_off(&mut self, root: &V, part: Vec<V>) -> Option<V> {
        if let Some(set) = self.members.get_mut(root) {
            for node in &part {
                set.remove(node);
            }
        }
        self.make_set_from(part)
    }
}
