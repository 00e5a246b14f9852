//! Communication groups and activation order.
//!
//! The dependency graph holds one edge per data connection (parent → child),
//! per indexer subscription (indexer → listener) and per specialized indexer
//! (owner → indexer). Its strongly connected components are the
//! communication groups, numbered in topological order so that a lower id is
//! always upstream of a higher one.

use crate::dataflow::NodeId;
use hashbrown::HashMap;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;
use rete_core::TimestampTransformation;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Position of a communication group in topological order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u32);

#[derive(Clone, Debug, Default)]
pub struct GroupInfo {
    /// Members in delivery order.
    pub members: Vec<NodeId>,
    pub recursive: bool,
}

pub struct CommunicationTracker {
    graph: DiGraphMap<NodeId, u32>,
    groups: Vec<GroupInfo>,
    group_of: HashMap<NodeId, GroupId>,
    rank_of: HashMap<NodeId, u32>,
    active: BTreeSet<GroupId>,
}

impl Default for CommunicationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunicationTracker {
    pub fn new() -> Self {
        Self {
            graph: DiGraphMap::new(),
            groups: Vec::new(),
            group_of: HashMap::new(),
            rank_of: HashMap::new(),
            active: BTreeSet::new(),
        }
    }

    pub fn add_node(&mut self, node: NodeId) {
        self.graph.add_node(node);
    }

    pub fn remove_node(&mut self, node: NodeId) {
        self.graph.remove_node(node);
    }

    /// Adds one dependency; parallel dependencies are counted.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        match self.graph.edge_weight_mut(from, to) {
            Some(count) => *count += 1,
            None => {
                self.graph.add_edge(from, to, 1);
            }
        }
    }

    pub fn remove_edge(&mut self, from: NodeId, to: NodeId) {
        if let Some(count) = self.graph.edge_weight_mut(from, to) {
            *count -= 1;
            if *count == 0 {
                self.graph.remove_edge(from, to);
            }
        }
    }

    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.graph.contains_edge(from, to)
    }

    /// Recomputes groups and ranks from scratch.
    ///
    /// `poset` marks nodes that make their group recursive on their own,
    /// `production` marks nodes whose incoming same-group edges are ignored
    /// when ranking.
    pub fn recompute(&mut self, poset: impl Fn(NodeId) -> bool, production: impl Fn(NodeId) -> bool) {
        // tarjan yields components in reverse topological order
        let mut components = tarjan_scc(&self.graph);
        components.reverse();

        self.groups.clear();
        self.group_of.clear();
        self.rank_of.clear();
        for (index, members) in components.into_iter().enumerate() {
            let id = GroupId(index as u32);
            let recursive = members.len() > 1
                || members.iter().any(|&n| self.graph.contains_edge(n, n) || poset(n));
            for &member in &members {
                self.group_of.insert(member, id);
            }
            let members = self.rank(&members, &production);
            for (rank, &member) in members.iter().enumerate() {
                self.rank_of.insert(member, rank as u32);
            }
            self.groups.push(GroupInfo { members, recursive });
        }
        debug!(
            groups = self.groups.len(),
            recursive = self.groups.iter().filter(|g| g.recursive).count(),
            "recomputed communication groups"
        );
    }

    /// Orders the members of one group: topologically once edges into
    /// production nodes are cut.
    fn rank(&self, members: &[NodeId], production: &impl Fn(NodeId) -> bool) -> Vec<NodeId> {
        if members.len() == 1 {
            return members.to_vec();
        }
        let mut subgraph: DiGraphMap<NodeId, ()> = DiGraphMap::new();
        for &member in members {
            subgraph.add_node(member);
        }
        for &from in members {
            for to in self.graph.neighbors(from) {
                if to != from && subgraph.contains_node(to) && !production(to) {
                    subgraph.add_edge(from, to, ());
                }
            }
        }
        match toposort(&subgraph, None) {
            Ok(order) => order,
            Err(cycle) => {
                warn!(node = %cycle.node_id(), "cycle without a production node, ranking by id");
                let mut order = members.to_vec();
                order.sort();
                order
            }
        }
    }

    pub fn group_of(&self, node: NodeId) -> Option<GroupId> {
        self.group_of.get(&node).copied()
    }

    pub fn group(&self, id: GroupId) -> Option<&GroupInfo> {
        self.groups.get(id.0 as usize)
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &GroupInfo)> + '_ {
        self.groups
            .iter()
            .enumerate()
            .map(|(i, g)| (GroupId(i as u32), g))
    }

    pub fn rank_of(&self, node: NodeId) -> u32 {
        self.rank_of.get(&node).copied().unwrap_or(u32::MAX)
    }

    pub fn is_in_recursive_group(&self, node: NodeId) -> bool {
        self.group_of(node)
            .and_then(|g| self.group(g))
            .map_or(false, |g| g.recursive)
    }

    pub fn same_group(&self, a: NodeId, b: NodeId) -> bool {
        match (self.group_of(a), self.group_of(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// The timestamp change of an update travelling from `source` to `target`.
    pub fn transformation(
        &self,
        source: NodeId,
        target: NodeId,
        target_is_production: bool,
    ) -> Option<TimestampTransformation> {
        let same = self.same_group(source, target);
        if !same && self.is_in_recursive_group(source) {
            Some(TimestampTransformation::Reset)
        } else if same && target_is_production {
            Some(TimestampTransformation::Increment)
        } else {
            None
        }
    }

    /// Every node reachable from `node`, itself included.
    pub fn downstream(&self, node: NodeId) -> Vec<NodeId> {
        if !self.graph.contains_node(node) {
            return Vec::new();
        }
        let mut dfs = Dfs::new(&self.graph, node);
        let mut reached = Vec::new();
        while let Some(next) = dfs.next(&self.graph) {
            reached.push(next);
        }
        reached
    }

    pub fn activate(&mut self, node: NodeId) {
        if let Some(group) = self.group_of(node) {
            self.active.insert(group);
        }
    }

    pub fn activate_group(&mut self, group: GroupId) {
        self.active.insert(group);
    }

    /// The most upstream active group.
    pub fn pop_active(&mut self) -> Option<GroupId> {
        self.active.pop_first()
    }

    pub fn has_active(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn clear_active(&mut self) {
        self.active.clear();
    }
}
