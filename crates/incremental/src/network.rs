//! The network: node construction, wiring and reads.
//!
//! Every structural change (new edge, removed edge, new subscription,
//! production or poset info) recomputes the communication groups and then
//! lets each node reselect its internal logic: indexers switch between
//! timeless and timely memories, mailboxes switch kinds, and the set of
//! active groups is rebuilt. Delivery lives in the scheduler.

use crate::config::NetworkConfig;
use crate::dataflow::{ListenerId, Node, NodeArena, NodeId, NodeKind, Side, Subscription};
use crate::delta::Delta;
use crate::error::{Error, Result};
use crate::mailbox::{Mailbox, MailboxKind};
use crate::operators::{
    AggregateKind, AggregatorNode, BucketNode, DispatcherNode, ExistenceNode, FilterNode,
    IndexView, JoinNode, LeftJoinNode, PosetInfo, ProductionInfo, ProjectionIndexer,
    RepresentativeNode, SpecializedIndexer, SpecializedKind, TransformerNode,
    TransitiveClosureNode, TrimmerNode, UniquenessNode,
};
use crate::tracker::CommunicationTracker;
use hashbrown::HashMap;
use rete_core::{Direction, Timeline, Timestamp, Tuple, TupleMask, Value};
use rete_itc::Connectivity;
use tracing::{debug, warn};

/// An incremental query network.
///
/// # Example
///
/// ```rust
/// use rete_core::{tuple, Direction, TupleMask};
/// use rete_incremental::{Network, NetworkConfig};
///
/// let mut network = Network::new(NetworkConfig::default());
/// let edges = network.input(2);
/// let by_target = network.indexer(edges, TupleMask::select_single(1, 2)?)?;
/// let by_source = network.indexer(edges, TupleMask::select_single(0, 2)?)?;
/// // two-step paths: edge(a, b), edge(b, c)
/// let paths = network.join(by_target, by_source)?;
///
/// network.update(edges, Direction::Insert, tuple![1, 2])?;
/// network.update(edges, Direction::Insert, tuple![2, 3])?;
///
/// let mut out = Vec::new();
/// network.pull_into(paths, &mut out, true)?;
/// assert_eq!(out, vec![tuple![1, 2, 3]]);
/// # Ok::<(), rete_incremental::Error>(())
/// ```
pub struct Network {
    pub(crate) config: NetworkConfig,
    pub(crate) arena: NodeArena,
    pub(crate) tracker: CommunicationTracker,
    indexers: HashMap<(NodeId, TupleMask), NodeId>,
    next_listener: u64,
}

impl Default for Network {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

impl Network {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            arena: NodeArena::new(),
            tracker: CommunicationTracker::new(),
            indexers: HashMap::new(),
            next_listener: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.arena.contains(node)
    }

    /// Output arity of a node, if known.
    pub fn arity(&self, node: NodeId) -> Result<Option<usize>> {
        Ok(self.arena.get(node)?.arity)
    }

    /// Human-readable kind of a node.
    pub fn kind_name(&self, node: NodeId) -> Result<&'static str> {
        Ok(self.arena.get(node)?.kind.name())
    }

    pub fn parents(&self, node: NodeId) -> Result<&[NodeId]> {
        Ok(&self.arena.get(node)?.parents)
    }

    /// Children in notification order.
    pub fn children(&self, node: NodeId) -> Result<&[NodeId]> {
        Ok(&self.arena.get(node)?.children)
    }

    pub fn is_in_recursive_group(&self, node: NodeId) -> bool {
        self.tracker.is_in_recursive_group(node)
    }

    pub fn same_group(&self, a: NodeId, b: NodeId) -> bool {
        self.tracker.same_group(a, b)
    }

    pub fn mailbox_kind(&self, node: NodeId) -> Result<Option<MailboxKind>> {
        Ok(self.arena.get(node)?.mailbox.as_ref().map(Mailbox::kind))
    }

    fn add_node(&mut self, kind: NodeKind, arity: Option<usize>) -> NodeId {
        let receives_messages = !matches!(
            kind,
            NodeKind::SpecializedIndexer(_)
                | NodeKind::Join(_)
                | NodeKind::Existence(_)
                | NodeKind::LeftJoin(_)
        );
        let mut node = Node::new(kind, arity);
        if receives_messages {
            let kind = if self.config.is_timely() {
                MailboxKind::Timely
            } else {
                MailboxKind::Default
            };
            node.mailbox = Some(Mailbox::new(kind, None));
        }
        let id = self.arena.insert(node);
        self.tracker.add_node(id);
        debug!(node = %id, kind = self.arena.get(id).map_or("?", |n| n.kind.name()), "created node");
        id
    }

    fn uniqueness_node(&self, arity: usize, input: bool, production: Option<ProductionInfo>) -> UniquenessNode {
        let node = UniquenessNode::new(arity, input, production);
        if self.config.is_timely() {
            node.timely(self.config.is_lazy())
        } else {
            node
        }
    }

    // ---- construction ----

    /// Creates an input node; the only nodes accepting external updates.
    pub fn input(&mut self, arity: usize) -> NodeId {
        let node = self.uniqueness_node(arity, true, None);
        let id = self.add_node(NodeKind::Uniqueness(node), Some(arity));
        self.refresh_after_change(id);
        id
    }

    /// Creates a set node; connect parents with [`Network::connect_and_synchronize`].
    pub fn uniqueness(&mut self, arity: usize) -> NodeId {
        let node = self.uniqueness_node(arity, false, None);
        let id = self.add_node(NodeKind::Uniqueness(node), Some(arity));
        self.refresh_after_change(id);
        id
    }

    /// Creates a production node serving `info`.
    pub fn production(&mut self, info: ProductionInfo) -> NodeId {
        let arity = info.arity();
        let node = self.uniqueness_node(arity, false, Some(info));
        let id = self.add_node(NodeKind::Uniqueness(node), Some(arity));
        self.refresh_after_change(id);
        id
    }

    /// Returns the indexer of `parent` under `mask`, creating it on first use.
    pub fn indexer(&mut self, parent: NodeId, mask: TupleMask) -> Result<NodeId> {
        if let Some(&existing) = self.indexers.get(&(parent, mask.clone())) {
            return Ok(existing);
        }
        let parent_node = self.arena.get(parent)?;
        if let Some(arity) = parent_node.arity {
            if arity != mask.source_width() {
                return Err(Error::ArityMismatch {
                    node: parent,
                    expected: mask.source_width(),
                    actual: arity,
                });
            }
        }
        if parent_node.kind.is_indexer() {
            return Err(Error::WrongKind {
                node: parent,
                expected: "node with output",
                actual: parent_node.kind.name(),
            });
        }

        let specialized = match &parent_node.kind {
            NodeKind::Uniqueness(_) if self.config.trivial_indexers && mask.is_identity() => {
                Some(SpecializedKind::Identity)
            }
            NodeKind::Uniqueness(_) if self.config.trivial_indexers && mask.is_empty() => {
                Some(SpecializedKind::Null)
            }
            _ => None,
        };

        let id = match specialized {
            Some(kind) => {
                let width = mask.source_width();
                let indexer = SpecializedIndexer::new(parent, kind, width);
                let id = self.add_node(NodeKind::SpecializedIndexer(indexer), Some(width));
                self.arena.get_mut(parent)?.specialized_indexers.insert(0, id);
                self.tracker.add_edge(parent, id);
                self.refresh_structure()?;
                id
            }
            None => {
                let width = mask.source_width();
                let id = self.add_node(
                    NodeKind::Indexer(ProjectionIndexer::new(mask.clone())),
                    Some(width),
                );
                if let Err(err) = self.connect_and_synchronize(parent, id) {
                    self.abandon(id);
                    return Err(err);
                }
                id
            }
        };
        self.indexers.insert((parent, mask), id);
        Ok(id)
    }

    fn indexer_mask(&self, indexer: NodeId) -> Result<TupleMask> {
        let node = self.arena.get(indexer)?;
        match &node.kind {
            NodeKind::Indexer(i) => Ok(i.mask().clone()),
            NodeKind::SpecializedIndexer(s) => Ok(s.mask().clone()),
            NodeKind::LeftJoin(l) => Ok(l.mask().clone()),
            other => Err(Error::WrongKind {
                node: indexer,
                expected: "indexer",
                actual: other.name(),
            }),
        }
    }

    /// Joins the groups of two indexers with equal signature arity.
    pub fn join(&mut self, primary: NodeId, secondary: NodeId) -> Result<NodeId> {
        let primary_mask = self.indexer_mask(primary)?;
        let secondary_mask = self.indexer_mask(secondary)?;
        if primary_mask.arity() != secondary_mask.arity() {
            return Err(Error::ArityMismatch {
                node: secondary,
                expected: primary_mask.arity(),
                actual: secondary_mask.arity(),
            });
        }
        let join = JoinNode::new(
            primary,
            secondary,
            &secondary_mask,
            self.config.shared_prefix_tuples,
        );
        let arity = primary_mask.source_width() + join.complementer_arity();
        let id = self.add_node(NodeKind::Join(join), Some(arity));
        self.subscribe(id, primary, secondary)?;
        Ok(id)
    }

    /// Passes primary tuples whose signature is present in the secondary
    /// indexer, or absent if `negative`.
    pub fn existence(&mut self, primary: NodeId, secondary: NodeId, negative: bool) -> Result<NodeId> {
        let primary_mask = self.indexer_mask(primary)?;
        let secondary_mask = self.indexer_mask(secondary)?;
        if primary_mask.arity() != secondary_mask.arity() {
            return Err(Error::ArityMismatch {
                node: secondary,
                expected: primary_mask.arity(),
                actual: secondary_mask.arity(),
            });
        }
        let node = ExistenceNode::new(primary, secondary, negative);
        let id = self.add_node(NodeKind::Existence(node), Some(primary_mask.source_width()));
        self.subscribe(id, primary, secondary)?;
        Ok(id)
    }

    /// Outer index over a projection indexer whose mask omits one column.
    ///
    /// Joining with the returned node as secondary keeps primary tuples
    /// without a match, completed with `default` in the omitted column.
    pub fn left_join(&mut self, indexer: NodeId, default: impl Into<Value>) -> Result<NodeId> {
        let node = self.arena.get(indexer)?;
        let NodeKind::Indexer(inner) = &node.kind else {
            return Err(Error::WrongKind {
                node: indexer,
                expected: "projection indexer",
                actual: node.kind.name(),
            });
        };
        let mask = inner.mask().clone();
        let width = mask.source_width();
        let Some(outer) = LeftJoinNode::new(indexer, mask, default.into()) else {
            return Err(Error::WrongKind {
                node: indexer,
                expected: "indexer omitting exactly one column",
                actual: node.kind.name(),
            });
        };
        let id = self.add_node(NodeKind::LeftJoin(outer), Some(width));
        self.add_subscription(id, indexer, Side::Primary)?;
        if let Err(err) = self.refresh_structure() {
            warn!(node = %id, error = %err, "rejected left join");
            self.abandon(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Where the subscriptions of an indexer are stored.
    fn subscription_holder(&self, indexer: NodeId) -> Result<NodeId> {
        match &self.arena.get(indexer)?.kind {
            NodeKind::SpecializedIndexer(s) => Ok(s.owner()),
            _ => Ok(indexer),
        }
    }

    fn subscribe(&mut self, listener: NodeId, primary: NodeId, secondary: NodeId) -> Result<()> {
        let sides = if primary == secondary {
            vec![(primary, Side::Both)]
        } else {
            vec![(primary, Side::Primary), (secondary, Side::Secondary)]
        };
        for &(indexer, side) in &sides {
            self.add_subscription(listener, indexer, side)?;
        }
        if let Err(err) = self.refresh_structure() {
            warn!(node = %listener, error = %err, "rejected subscription");
            self.abandon(listener);
            return Err(err);
        }
        Ok(())
    }

    fn add_subscription(&mut self, listener: NodeId, indexer: NodeId, side: Side) -> Result<()> {
        let holder = self.subscription_holder(indexer)?;
        self.arena.get_mut(holder)?.subscriptions.insert(
            0,
            Subscription {
                indexer,
                listener,
                side,
            },
        );
        self.tracker.add_edge(indexer, listener);
        Ok(())
    }

    fn single_parent_node(&mut self, parent: NodeId, kind: NodeKind, arity: Option<usize>) -> Result<NodeId> {
        self.arena.get(parent)?;
        let id = self.add_node(kind, arity);
        if let Err(err) = self.connect_and_synchronize(parent, id) {
            self.abandon(id);
            return Err(err);
        }
        Ok(id)
    }

    pub fn filter(&mut self, parent: NodeId, filter: FilterNode) -> Result<NodeId> {
        let arity = self.arena.get(parent)?.arity;
        if let (Some(arity), Some(column)) = (arity, filter.max_column()) {
            if column >= arity {
                return Err(rete_core::Error::index_out_of_bounds(column, arity).into());
            }
        }
        self.single_parent_node(parent, NodeKind::Filter(filter), arity)
    }

    /// Keeps tuples whose `column` equals `value`.
    pub fn value_filter(&mut self, parent: NodeId, column: usize, value: impl Into<Value>) -> Result<NodeId> {
        self.filter(parent, FilterNode::value(column, value.into()))
    }

    pub fn equality_filter(&mut self, parent: NodeId, columns: Vec<usize>) -> Result<NodeId> {
        self.filter(parent, FilterNode::equality(columns))
    }

    pub fn inequality_filter(&mut self, parent: NodeId, subject: usize, others: Vec<usize>) -> Result<NodeId> {
        self.filter(parent, FilterNode::inequality(subject, others))
    }

    pub fn predicate_filter<F>(&mut self, parent: NodeId, predicate: F) -> Result<NodeId>
    where
        F: Fn(&Tuple) -> bool + Send + Sync + 'static,
    {
        self.filter(parent, FilterNode::predicate(predicate))
    }

    /// Projects `parent` through `mask`, keeping duplicates.
    pub fn trimmer(&mut self, parent: NodeId, mask: TupleMask) -> Result<NodeId> {
        let arity = mask.arity();
        self.single_parent_node(parent, NodeKind::Trimmer(TrimmerNode::new(mask)), Some(arity))
    }

    pub fn transformer<F>(&mut self, parent: NodeId, mapper: F, output_arity: Option<usize>) -> Result<NodeId>
    where
        F: Fn(&Tuple) -> Tuple + Send + Sync + 'static,
    {
        let node = TransformerNode::new(mapper, output_arity);
        self.single_parent_node(parent, NodeKind::Transformer(node), output_arity)
    }

    pub fn dispatcher(&mut self, parent: NodeId, column: usize) -> Result<NodeId> {
        let arity = self.arena.get(parent)?.arity;
        if let Some(arity) = arity {
            if column >= arity {
                return Err(rete_core::Error::index_out_of_bounds(column, arity).into());
            }
        }
        self.single_parent_node(parent, NodeKind::Dispatcher(DispatcherNode::new(column)), arity)
    }

    /// The bucket of `dispatcher` receiving the tuples whose key equals `value`.
    pub fn bucket(&mut self, dispatcher: NodeId, value: impl Into<Value>) -> Result<NodeId> {
        let node = self.arena.get(dispatcher)?;
        if !matches!(node.kind, NodeKind::Dispatcher(_)) {
            return Err(Error::WrongKind {
                node: dispatcher,
                expected: "dispatcher",
                actual: node.kind.name(),
            });
        }
        let arity = node.arity;
        self.single_parent_node(dispatcher, NodeKind::Bucket(BucketNode::new(value.into())), arity)
    }

    /// Transitive closure of the binary edge relation of `parent`.
    pub fn transitive_closure(&mut self, parent: NodeId) -> Result<NodeId> {
        self.single_parent_node(
            parent,
            NodeKind::TransitiveClosure(TransitiveClosureNode::new()),
            Some(2),
        )
    }

    /// `(member, representative)` pairs of the components of `parent`'s edges.
    pub fn representative_election(&mut self, parent: NodeId, connectivity: Connectivity) -> Result<NodeId> {
        self.single_parent_node(
            parent,
            NodeKind::Representative(RepresentativeNode::new(connectivity)),
            Some(2),
        )
    }

    pub fn aggregator(
        &mut self,
        parent: NodeId,
        group_mask: TupleMask,
        column: usize,
        kind: AggregateKind,
    ) -> Result<NodeId> {
        if column >= group_mask.source_width() {
            return Err(rete_core::Error::index_out_of_bounds(column, group_mask.source_width()).into());
        }
        let node = AggregatorNode::new(group_mask, column, kind);
        let arity = node.output_arity();
        self.single_parent_node(parent, NodeKind::Aggregator(node), Some(arity))
    }

    // ---- production and poset ----

    /// Records the pattern a uniqueness node serves.
    pub fn set_production(&mut self, node: NodeId, info: ProductionInfo) -> Result<()> {
        let entry = self.arena.get_mut(node)?;
        let actual = entry.kind.name();
        let Some(uniqueness) = entry.kind.as_uniqueness_mut() else {
            return Err(Error::WrongKind {
                node,
                expected: "uniqueness",
                actual,
            });
        };
        if uniqueness.arity() != info.arity() {
            return Err(Error::ArityMismatch {
                node,
                expected: uniqueness.arity(),
                actual: info.arity(),
            });
        }
        uniqueness.set_production(info);
        self.refresh_structure()
    }

    /// Marks columns of a uniqueness node as ordered by a partial order.
    pub fn set_poset(&mut self, node: NodeId, poset: PosetInfo) -> Result<()> {
        let entry = self.arena.get_mut(node)?;
        let actual = entry.kind.name();
        let Some(uniqueness) = entry.kind.as_uniqueness_mut() else {
            return Err(Error::WrongKind {
                node,
                expected: "uniqueness",
                actual,
            });
        };
        if poset.core_mask.source_width() != uniqueness.arity()
            || poset.poset_mask.source_width() != uniqueness.arity()
        {
            return Err(Error::ArityMismatch {
                node,
                expected: uniqueness.arity(),
                actual: poset.core_mask.source_width(),
            });
        }
        uniqueness.set_poset(poset);
        self.refresh_structure()
    }

    // ---- edges ----

    fn expected_input_arity(node: &Node) -> Option<usize> {
        match &node.kind {
            NodeKind::Uniqueness(u) => Some(u.arity()),
            NodeKind::Indexer(i) => Some(i.mask().source_width()),
            NodeKind::Trimmer(t) => Some(t.mask().source_width()),
            NodeKind::TransitiveClosure(_) | NodeKind::Representative(_) => Some(2),
            NodeKind::Aggregator(a) => Some(a.input_arity()),
            NodeKind::Filter(_) | NodeKind::Dispatcher(_) | NodeKind::Bucket(_) => node.arity,
            _ => None,
        }
    }

    /// Adds a data edge without replaying the parent's contents.
    pub fn connect(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let parent_node = self.arena.get(parent)?;
        if parent_node.kind.is_indexer() {
            return Err(Error::WrongKind {
                node: parent,
                expected: "node with output",
                actual: parent_node.kind.name(),
            });
        }
        let parent_arity = parent_node.arity;
        let child_node = self.arena.get(child)?;
        if child_node.mailbox.is_none() {
            return Err(Error::WrongKind {
                node: child,
                expected: "node with a single input",
                actual: child_node.kind.name(),
            });
        }
        if !child_node.kind.accepts_many_parents() {
            if let Some(&existing) = child_node.parents.first() {
                return Err(Error::ParentAlreadyConnected {
                    child,
                    existing,
                    parent,
                });
            }
        }
        if let (Some(expected), Some(actual)) = (Self::expected_input_arity(child_node), parent_arity) {
            if expected != actual {
                return Err(Error::ArityMismatch {
                    node: child,
                    expected,
                    actual,
                });
            }
        }

        self.link(parent, child)?;
        if let Err(err) = self.refresh_structure() {
            warn!(%parent, %child, error = %err, "rejected edge");
            self.unlink(parent, child)?;
            self.refresh_structure()?;
            return Err(err);
        }
        debug!(%parent, %child, "connected");
        Ok(())
    }

    fn link(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.arena.get_mut(parent)?.children.insert(0, child);
        self.arena.get_mut(child)?.parents.push(parent);
        self.tracker.add_edge(parent, child);
        Ok(())
    }

    fn unlink(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let parent_node = self.arena.get_mut(parent)?;
        let Some(position) = parent_node.children.iter().position(|&c| c == child) else {
            return Err(Error::NotConnected { parent, child });
        };
        parent_node.children.remove(position);
        let child_node = self.arena.get_mut(child)?;
        if let Some(position) = child_node.parents.iter().position(|&p| p == parent) {
            child_node.parents.remove(position);
        }
        self.tracker.remove_edge(parent, child);
        Ok(())
    }

    /// Removes a data edge without retracting what the child received.
    pub fn disconnect(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.unlink(parent, child)?;
        self.refresh_structure()?;
        debug!(%parent, %child, "disconnected");
        Ok(())
    }

    /// Adds a data edge and replays the parent's current contents into the child.
    pub fn connect_and_synchronize(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.flush()?;
        self.connect(parent, child)?;
        self.replay(parent, child, Direction::Insert)?;
        self.flush()
    }

    /// Retracts the parent's contents from the child, then removes the edge.
    pub fn disconnect_and_desynchronize(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.flush()?;
        if !self.arena.get(parent)?.children.contains(&child) {
            return Err(Error::NotConnected { parent, child });
        }
        self.replay(parent, child, Direction::Delete)?;
        self.flush()?;
        self.disconnect(parent, child)
    }

    /// Posts the contents of `parent` to `child` with `direction`.
    fn replay(&mut self, parent: NodeId, child: NodeId, direction: Direction) -> Result<()> {
        if self.config.is_timely() {
            match self.pull_timelines(parent) {
                Ok(timelines) => {
                    for (tuple, timeline) in timelines {
                        for change in timeline.changes() {
                            let direction = change.direction.multiply(direction);
                            self.post(parent, child, direction, tuple.clone(), change.payload)?;
                        }
                    }
                    return Ok(());
                }
                Err(Error::Unsupported { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        for tuple in self.pull_tuples(parent)? {
            self.post(parent, child, direction, tuple, Timestamp::ZERO)?;
        }
        Ok(())
    }

    /// Removes a node nothing depends on.
    pub fn remove_node(&mut self, node: NodeId) -> Result<()> {
        let entry = self.arena.get(node)?;
        // subscriptions of a specialized indexer live in its owner
        let shared_in_use = match &entry.kind {
            NodeKind::SpecializedIndexer(s) => self
                .arena
                .get(s.owner())?
                .subscriptions
                .iter()
                .any(|sub| sub.indexer == node),
            _ => false,
        };
        if shared_in_use || entry.is_in_use() {
            return Err(Error::NodeInUse(node));
        }
        self.flush()?;
        self.discard(node);
        self.refresh_structure()?;
        debug!(%node, "removed node");
        Ok(())
    }

    /// Detaches a node from everything upstream and drops it.
    fn discard(&mut self, id: NodeId) {
        let Some(node) = self.arena.remove(id) else {
            return;
        };
        for parent in &node.parents {
            if let Ok(parent_node) = self.arena.get_mut(*parent) {
                parent_node.children.retain(|&c| c != id);
            }
            self.tracker.remove_edge(*parent, id);
        }
        let indexers = match &node.kind {
            NodeKind::Join(j) => vec![j.primary(), j.secondary()],
            NodeKind::Existence(e) => vec![e.primary(), e.secondary()],
            NodeKind::LeftJoin(l) => vec![l.indexer()],
            _ => Vec::new(),
        };
        for indexer in indexers {
            if let Ok(holder) = self.subscription_holder(indexer) {
                if let Ok(holder_node) = self.arena.get_mut(holder) {
                    holder_node.subscriptions.retain(|s| s.listener != id);
                }
            }
            while self.tracker.has_edge(indexer, id) {
                self.tracker.remove_edge(indexer, id);
            }
        }
        if let NodeKind::SpecializedIndexer(s) = &node.kind {
            if let Ok(owner) = self.arena.get_mut(s.owner()) {
                owner.specialized_indexers.retain(|&i| i != id);
            }
            self.tracker.remove_edge(s.owner(), id);
        }
        self.indexers.retain(|_, &mut cached| cached != id);
        self.tracker.remove_node(id);
    }

    /// Drops a node whose construction failed half-way.
    fn abandon(&mut self, id: NodeId) {
        self.discard(id);
        if let Err(err) = self.refresh_structure() {
            warn!(node = %id, error = %err, "structure refresh failed");
        }
    }

    // ---- structure ----

    fn refresh_after_change(&mut self, node: NodeId) {
        // a parentless node cannot violate any group constraint
        if let Err(err) = self.refresh_structure() {
            warn!(%node, error = %err, "structure refresh failed");
        }
    }

    /// Recomputes groups, validates them and reclassifies every node.
    pub(crate) fn refresh_structure(&mut self) -> Result<()> {
        let arena = &self.arena;
        let timeless = !self.config.is_timely();
        self.tracker.recompute(
            |id| {
                timeless
                    && arena
                        .get(id)
                        .ok()
                        .and_then(|n| n.kind.as_uniqueness())
                        .map_or(false, |u| u.poset().is_some())
            },
            |id| is_production(arena, id),
        );
        self.validate()?;
        self.reclassify()
    }

    fn validate(&self) -> Result<()> {
        if !self.config.is_timely() {
            return Ok(());
        }
        for (id, node) in self.arena.iter() {
            // outer views read a timeless memory
            if let NodeKind::LeftJoin(l) = &node.kind {
                if self.tracker.is_in_recursive_group(l.indexer()) {
                    return Err(Error::RecursiveTimelyNode {
                        node: l.indexer(),
                        kind: "left-joined indexer",
                    });
                }
            }
            if !self.tracker.is_in_recursive_group(id) {
                continue;
            }
            if node.kind.is_timeless_only() {
                return Err(Error::RecursiveTimelyNode {
                    node: id,
                    kind: node.kind.name(),
                });
            }
            if let NodeKind::Existence(e) = &node.kind {
                if e.primary() != e.secondary() && self.tracker.same_group(e.secondary(), id) {
                    return Err(Error::SecondaryInSameGroup {
                        node: id,
                        secondary: e.secondary(),
                    });
                }
            }
        }
        Ok(())
    }

    fn reclassify(&mut self) -> Result<()> {
        let timely = self.config.is_timely();
        let lazy = self.config.is_lazy();
        let ids: Vec<NodeId> = self.arena.ids().collect();

        let mut mailbox_kinds = Vec::with_capacity(ids.len());
        for &id in &ids {
            mailbox_kinds.push(self.desired_mailbox(id)?);
        }

        for (&id, desired) in ids.iter().zip(mailbox_kinds) {
            let recursive = self.tracker.is_in_recursive_group(id);
            let node = self.arena.get_mut(id)?;
            if let NodeKind::Indexer(indexer) = &mut node.kind {
                if timely && recursive {
                    indexer.make_timely(lazy)?;
                } else {
                    indexer.make_timeless();
                }
            }
            let Some((kind, poset)) = desired else {
                continue;
            };
            if let Some(mailbox) = node.mailbox.take() {
                node.mailbox = Some(if mailbox.kind() == kind && kind != MailboxKind::PosetAware {
                    mailbox
                } else {
                    mailbox.migrate(kind, poset)?
                });
            }
        }

        self.tracker.clear_active();
        for (id, node) in self.arena.iter() {
            if needs_delivery(node) {
                self.tracker.activate(id);
            }
        }
        Ok(())
    }

    fn desired_mailbox(&self, id: NodeId) -> Result<Option<(MailboxKind, Option<PosetInfo>)>> {
        let node = self.arena.get(id)?;
        if node.mailbox.is_none() {
            return Ok(None);
        }
        if self.config.is_timely() {
            return Ok(Some((MailboxKind::Timely, None)));
        }
        if let Some(poset) = node.kind.as_uniqueness().and_then(UniquenessNode::poset) {
            return Ok(Some((MailboxKind::PosetAware, Some(poset.clone()))));
        }
        if self.tracker.is_in_recursive_group(id) && self.is_group_boundary(id, node)? {
            return Ok(Some((MailboxKind::Splitting, None)));
        }
        Ok(Some((MailboxKind::Default, None)))
    }

    /// True if updates can reach `id` from outside its group.
    fn is_group_boundary(&self, id: NodeId, node: &Node) -> Result<bool> {
        for &parent in &node.parents {
            if !self.tracker.same_group(parent, id) {
                return Ok(true);
            }
            let indexers = match &self.arena.get(parent)?.kind {
                NodeKind::Join(j) => [j.primary(), j.secondary()],
                NodeKind::Existence(e) => [e.primary(), e.secondary()],
                NodeKind::LeftJoin(l) => [l.indexer(), l.indexer()],
                _ => continue,
            };
            if indexers.iter().any(|&i| !self.tracker.same_group(i, id)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ---- data ----

    /// Queues an external update of an input node; applied by the next flush.
    pub fn update(&mut self, node: NodeId, direction: Direction, tuple: Tuple) -> Result<()> {
        let entry = self.arena.get_mut(node)?;
        let Some(input) = entry.kind.as_uniqueness().filter(|u| u.is_input()) else {
            return Err(Error::NotAnInput(node));
        };
        if input.arity() != tuple.size() {
            return Err(Error::ArityMismatch {
                node,
                expected: input.arity(),
                actual: tuple.size(),
            });
        }
        if let Some(mailbox) = entry.mailbox.as_mut() {
            mailbox.post(direction, tuple, Timestamp::ZERO);
        }
        self.tracker.activate(node);
        Ok(())
    }

    /// Appends the current contents of `node` to `out`, flushing first if asked.
    pub fn pull_into(&mut self, node: NodeId, out: &mut Vec<Tuple>, flush: bool) -> Result<()> {
        if flush {
            self.flush()?;
        }
        out.extend(self.pull_tuples(node)?);
        Ok(())
    }

    /// Current contents of `node` with their timelines.
    pub fn pull_with_timeline(&mut self, node: NodeId, flush: bool) -> Result<Vec<(Tuple, Timeline)>> {
        if flush {
            self.flush()?;
        }
        self.pull_timelines(node)
    }

    /// Returns true if `tuple` is in the output of a uniqueness node.
    pub fn contains(&self, node: NodeId, tuple: &Tuple) -> Result<bool> {
        let entry = self.arena.get(node)?;
        match entry.kind.as_uniqueness() {
            Some(u) => Ok(u.contains(tuple)),
            None => Err(Error::WrongKind {
                node,
                expected: "uniqueness",
                actual: entry.kind.name(),
            }),
        }
    }

    pub(crate) fn index_view(&self, id: NodeId) -> Result<IndexView<'_>> {
        let node = self.arena.get(id)?;
        match &node.kind {
            NodeKind::Indexer(indexer) => Ok(indexer.view()),
            NodeKind::SpecializedIndexer(s) => {
                let owner = self.arena.get(s.owner())?;
                match owner.kind.as_uniqueness() {
                    Some(u) => Ok(s.view(u)),
                    None => Err(Error::WrongKind {
                        node: s.owner(),
                        expected: "uniqueness",
                        actual: owner.kind.name(),
                    }),
                }
            }
            NodeKind::LeftJoin(l) => match self.index_view(l.indexer())? {
                IndexView::Masked(memory) => Ok(IndexView::Outer(memory, l)),
                _ => Err(Error::Unsupported {
                    node: id,
                    operation: "outer view of a timely indexer",
                }),
            },
            other => Err(Error::WrongKind {
                node: id,
                expected: "indexer",
                actual: other.name(),
            }),
        }
    }

    fn single_parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.arena.get(id)?.parents.first().copied())
    }

    pub(crate) fn pull_tuples(&self, id: NodeId) -> Result<Vec<Tuple>> {
        let node = self.arena.get(id)?;
        let from_parent = |this: &Self| -> Result<Vec<Tuple>> {
            match this.single_parent(id)? {
                Some(parent) => this.pull_tuples(parent),
                None => Ok(Vec::new()),
            }
        };
        let tuples = match &node.kind {
            NodeKind::Uniqueness(u) => u.tuples(),
            NodeKind::Indexer(_) | NodeKind::SpecializedIndexer(_) => self.index_view(id)?.tuples(),
            NodeKind::Join(j) => j.pull(self.index_view(j.primary())?, self.index_view(j.secondary())?)?,
            NodeKind::Existence(e) => {
                e.pull(self.index_view(e.primary())?, self.index_view(e.secondary())?)
            }
            NodeKind::Filter(f) => {
                let mut kept = Vec::new();
                for tuple in from_parent(self)? {
                    if f.accepts(&tuple)? {
                        kept.push(tuple);
                    }
                }
                kept
            }
            NodeKind::Trimmer(t) => from_parent(self)?
                .iter()
                .map(|tuple| t.apply(tuple))
                .collect::<rete_core::Result<Vec<_>>>()?,
            NodeKind::Transformer(t) => t.tuples(),
            NodeKind::Dispatcher(_) => from_parent(self)?,
            NodeKind::Bucket(b) => {
                let Some(dispatcher) = self.dispatcher_of(id)? else {
                    return Ok(Vec::new());
                };
                let mut kept = Vec::new();
                for tuple in from_parent(self)? {
                    if dispatcher.key(&tuple)? == b.value() {
                        kept.push(tuple);
                    }
                }
                kept
            }
            NodeKind::TransitiveClosure(tc) => tc.tuples(),
            NodeKind::Representative(r) => r.tuples(),
            NodeKind::Aggregator(a) => a.tuples(),
            NodeKind::LeftJoin(l) => self.index_view(l.indexer())?.tuples(),
        };
        Ok(tuples)
    }

    fn dispatcher_of(&self, bucket: NodeId) -> Result<Option<&DispatcherNode>> {
        let Some(parent) = self.single_parent(bucket)? else {
            return Ok(None);
        };
        match &self.arena.get(parent)?.kind {
            NodeKind::Dispatcher(d) => Ok(Some(d)),
            _ => Ok(None),
        }
    }

    pub(crate) fn pull_timelines(&self, id: NodeId) -> Result<Vec<(Tuple, Timeline)>> {
        let node = self.arena.get(id)?;
        let unsupported = || Error::Unsupported {
            node: id,
            operation: "timeline pull",
        };
        let from_parent = |this: &Self| -> Result<Vec<(Tuple, Timeline)>> {
            match this.single_parent(id)? {
                Some(parent) => this.pull_timelines(parent),
                None => Ok(Vec::new()),
            }
        };
        let timelines = match &node.kind {
            NodeKind::Uniqueness(u) => u.timelines().ok_or_else(unsupported)?,
            NodeKind::Indexer(_) | NodeKind::SpecializedIndexer(_) => {
                self.index_view(id)?.all_timelines().ok_or_else(unsupported)?
            }
            NodeKind::Join(j) if self.config.is_timely() => j.pull_with_timelines(
                self.index_view(j.primary())?,
                self.index_view(j.secondary())?,
            )?,
            NodeKind::Existence(e) if self.config.is_timely() => e.pull_with_timelines(
                self.index_view(e.primary())?,
                self.index_view(e.secondary())?,
            ),
            NodeKind::Filter(f) => {
                let mut kept = Vec::new();
                for (tuple, timeline) in from_parent(self)? {
                    if f.accepts(&tuple)? {
                        kept.push((tuple, timeline));
                    }
                }
                kept
            }
            NodeKind::Trimmer(t) => {
                let mut mapped = Vec::new();
                for (tuple, timeline) in from_parent(self)? {
                    mapped.push((t.apply(&tuple)?, timeline));
                }
                mapped
            }
            NodeKind::Transformer(t) => from_parent(self)?
                .into_iter()
                .map(|(tuple, timeline)| (t.output_of(&tuple), timeline))
                .collect(),
            NodeKind::Dispatcher(_) => from_parent(self)?,
            NodeKind::Bucket(b) => {
                let Some(d) = self.dispatcher_of(id)? else {
                    return Ok(Vec::new());
                };
                let mut kept = Vec::new();
                for (tuple, timeline) in from_parent(self)? {
                    if d.key(&tuple)? == b.value() {
                        kept.push((tuple, timeline));
                    }
                }
                kept
            }
            NodeKind::Aggregator(a) => a.timelines()?,
            NodeKind::LeftJoin(l) => self.pull_timelines(l.indexer())?,
            _ => return Err(unsupported()),
        };
        Ok(timelines)
    }

    // ---- listeners ----

    /// Calls `listener` with every output delta of `node`.
    pub fn attach_listener<F>(&mut self, node: NodeId, listener: F) -> Result<ListenerId>
    where
        F: FnMut(&Delta) + Send + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.arena
            .get_mut(node)?
            .listeners
            .insert(0, (id, Box::new(listener)));
        Ok(id)
    }

    /// Returns false if the listener was not attached to `node`.
    pub fn detach_listener(&mut self, node: NodeId, listener: ListenerId) -> Result<bool> {
        let listeners = &mut self.arena.get_mut(node)?.listeners;
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != listener);
        Ok(listeners.len() != before)
    }

    /// Number of external listeners attached to `node`.
    pub fn listener_count(&self, node: NodeId) -> Result<usize> {
        Ok(self.arena.get(node)?.listeners.len())
    }

    /// Drops all memories and pending messages; the topology is kept.
    pub fn clear(&mut self) {
        for (_, node) in self.arena.iter_mut() {
            node.kind.clear();
            if let Some(mailbox) = node.mailbox.as_mut() {
                mailbox.clear();
            }
        }
        self.tracker.clear_active();
        debug!("cleared network");
    }
}

pub(crate) fn is_production(arena: &NodeArena, id: NodeId) -> bool {
    arena
        .get(id)
        .ok()
        .and_then(|n| n.kind.as_uniqueness())
        .map_or(false, |u| u.production().is_some())
}

/// True if a node has messages or folded changes waiting.
pub(crate) fn needs_delivery(node: &Node) -> bool {
    node.mailbox.as_ref().map_or(false, |m| !m.is_empty())
        || match &node.kind {
            NodeKind::Uniqueness(u) => u.has_rederivables() || u.resumable_timestamp().is_some(),
            NodeKind::Indexer(i) => i.resumable_timestamp().is_some(),
            _ => false,
        }
}
