//! Node definitions.

use crate::delta::Delta;
use crate::mailbox::Mailbox;
use crate::operators::{
    AggregatorNode, BucketNode, DispatcherNode, ExistenceNode, FilterNode, JoinNode, LeftJoinNode,
    ProjectionIndexer, RepresentativeNode, SpecializedIndexer, TransformerNode, TransitiveClosureNode,
    TrimmerNode, UniquenessNode,
};

use super::NodeId;

/// Callback receiving the output deltas of a node.
pub type ListenerFn = Box<dyn FnMut(&Delta) + Send>;

/// Handle of an attached external listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

/// Which slot of a dual-input node an indexer feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Primary,
    Secondary,
    /// Both slots are the same indexer (self-join).
    Both,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Primary => Side::Secondary,
            Side::Secondary => Side::Primary,
            Side::Both => Side::Both,
        }
    }
}

/// An indexer → dual-input node subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub indexer: NodeId,
    pub listener: NodeId,
    pub side: Side,
}

/// Operator state of a node.
pub enum NodeKind {
    Uniqueness(UniquenessNode),
    Indexer(ProjectionIndexer),
    SpecializedIndexer(SpecializedIndexer),
    Join(JoinNode),
    Existence(ExistenceNode),
    Filter(FilterNode),
    Trimmer(TrimmerNode),
    Transformer(TransformerNode),
    Dispatcher(DispatcherNode),
    Bucket(BucketNode),
    TransitiveClosure(TransitiveClosureNode),
    Representative(RepresentativeNode),
    Aggregator(AggregatorNode),
    LeftJoin(LeftJoinNode),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Uniqueness(u) if u.is_input() => "input",
            NodeKind::Uniqueness(u) if u.production().is_some() => "production",
            NodeKind::Uniqueness(_) => "uniqueness",
            NodeKind::Indexer(_) => "indexer",
            NodeKind::SpecializedIndexer(_) => "specialized indexer",
            NodeKind::Join(_) => "join",
            NodeKind::Existence(e) if e.is_negative() => "antijoin",
            NodeKind::Existence(_) => "existence",
            NodeKind::Filter(_) => "filter",
            NodeKind::Trimmer(_) => "trimmer",
            NodeKind::Transformer(_) => "transformer",
            NodeKind::Dispatcher(_) => "dispatcher",
            NodeKind::Bucket(_) => "bucket",
            NodeKind::TransitiveClosure(_) => "transitive closure",
            NodeKind::Representative(_) => "representative election",
            NodeKind::Aggregator(_) => "aggregator",
            NodeKind::LeftJoin(_) => "left join",
        }
    }

    /// Nodes that accept any number of parents.
    pub fn accepts_many_parents(&self) -> bool {
        matches!(self, NodeKind::Uniqueness(_))
    }

    /// Nodes that receive updates through indexer subscriptions instead of a mailbox.
    pub fn is_dual_input(&self) -> bool {
        matches!(self, NodeKind::Join(_) | NodeKind::Existence(_))
    }

    pub fn is_indexer(&self) -> bool {
        matches!(self, NodeKind::Indexer(_) | NodeKind::SpecializedIndexer(_))
    }

    /// Nodes whose internal algorithm cannot run on virtual time.
    pub fn is_timeless_only(&self) -> bool {
        matches!(
            self,
            NodeKind::TransitiveClosure(_) | NodeKind::Representative(_) | NodeKind::LeftJoin(_)
        )
    }

    pub fn as_uniqueness(&self) -> Option<&UniquenessNode> {
        match self {
            NodeKind::Uniqueness(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_uniqueness_mut(&mut self) -> Option<&mut UniquenessNode> {
        match self {
            NodeKind::Uniqueness(u) => Some(u),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        match self {
            NodeKind::Uniqueness(u) => u.clear(),
            NodeKind::Indexer(i) => i.clear(),
            NodeKind::TransitiveClosure(n) => n.clear(),
            NodeKind::Representative(n) => n.clear(),
            NodeKind::Aggregator(n) => n.clear(),
            NodeKind::Transformer(n) => n.clear(),
            NodeKind::SpecializedIndexer(_)
            | NodeKind::LeftJoin(_)
            | NodeKind::Join(_)
            | NodeKind::Existence(_)
            | NodeKind::Filter(_)
            | NodeKind::Trimmer(_)
            | NodeKind::Dispatcher(_)
            | NodeKind::Bucket(_) => {}
        }
    }
}

/// A node: operator state plus its place in the network.
pub struct Node {
    pub kind: NodeKind,
    pub parents: Vec<NodeId>,
    /// Receivers of this node's output, most recently connected first.
    pub children: Vec<NodeId>,
    /// Dual-input listeners, most recently attached first. A uniqueness node
    /// holds the single shared list of all its specialized indexers.
    pub subscriptions: Vec<Subscription>,
    pub specialized_indexers: Vec<NodeId>,
    pub mailbox: Option<Mailbox>,
    pub arity: Option<usize>,
    pub listeners: Vec<(ListenerId, ListenerFn)>,
}

impl Node {
    pub fn new(kind: NodeKind, arity: Option<usize>) -> Self {
        Self {
            kind,
            parents: Vec::new(),
            children: Vec::new(),
            subscriptions: Vec::new(),
            specialized_indexers: Vec::new(),
            mailbox: None,
            arity,
            listeners: Vec::new(),
        }
    }

    /// Returns true if anything downstream still depends on this node.
    pub fn is_in_use(&self) -> bool {
        !self.children.is_empty()
            || !self.subscriptions.is_empty()
            || !self.specialized_indexers.is_empty()
            || !self.listeners.is_empty()
    }
}
