//! Message delivery.
//!
//! A flush repeatedly takes the most upstream active communication group and
//! drains it:
//!
//! - a non-recursive timeless group delivers its single mailbox;
//! - a recursive timeless group runs delete-and-rederive rounds: anti-monotone
//!   messages until quiet, then every staged rederivation, then monotone
//!   messages until quiet, until nothing is left;
//! - a timely group always delivers the lowest pending timestamp first and
//!   resumes lazily folded memories after each delivery.
//!
//! Output of a node is propagated synchronously to specialized indexer
//! subscriptions, then posted to child mailboxes, then passed to external
//! listeners.

use crate::dataflow::{Node, NodeId, NodeKind, Subscription};
use crate::delta::Delta;
use crate::error::{Error, Result};
use crate::mailbox::{DeliveryPhase, Message};
use crate::network::{is_production, Network};
use crate::operators::{IndexerUpdate, UpdatePolicy};
use rete_core::{Direction, Timestamp, Tuple};
use tracing::{debug_span, error, trace};

/// What a node produced for one message.
enum Output {
    Deltas(Vec<Delta>),
    Indexer(Vec<IndexerUpdate>),
}

impl Network {
    /// Delivers every pending message until the network is quiet.
    ///
    /// On a consistency error the flush stops; messages not yet delivered
    /// stay queued and the failing group stays active.
    pub fn flush(&mut self) -> Result<()> {
        let _span = debug_span!("flush").entered();
        while let Some(group) = self.tracker.pop_active() {
            let Some(info) = self.tracker.group(group).cloned() else {
                continue;
            };
            let result = if self.config.is_timely() {
                self.deliver_timely(&info.members, info.recursive)
            } else if info.recursive {
                self.deliver_recursive(&info.members)
            } else {
                self.deliver_plain(&info.members)
            };
            if let Err(err) = result {
                self.tracker.activate_group(group);
                return Err(err);
            }
        }
        Ok(())
    }

    fn deliver_plain(&mut self, members: &[NodeId]) -> Result<()> {
        for &member in members {
            loop {
                let messages = self.take_messages(member, DeliveryPhase::All)?;
                if messages.is_empty() {
                    break;
                }
                self.deliver_batch(member, messages, false)?;
            }
        }
        Ok(())
    }

    fn deliver_recursive(&mut self, members: &[NodeId]) -> Result<()> {
        loop {
            while self.deliver_round(members, DeliveryPhase::AntiMonotone)? {}
            while let Some(member) = self.find_rederivable(members)? {
                let delta = self
                    .arena
                    .get_mut(member)?
                    .kind
                    .as_uniqueness_mut()
                    .and_then(|u| u.rederive_one());
                if let Some(delta) = delta {
                    trace!(node = %member, tuple = %delta.tuple, "rederived");
                    self.propagate(member, vec![delta])?;
                }
            }
            while self.deliver_round(members, DeliveryPhase::Monotone)? {}
            if !self.group_pending(members)? {
                return Ok(());
            }
        }
    }

    /// One pass over the members in rank order; returns true if anything was delivered.
    fn deliver_round(&mut self, members: &[NodeId], phase: DeliveryPhase) -> Result<bool> {
        let mut delivered = false;
        for &member in members {
            let messages = self.take_messages(member, phase)?;
            if !messages.is_empty() {
                delivered = true;
                self.deliver_batch(member, messages, true)?;
            }
        }
        Ok(delivered)
    }

    fn find_rederivable(&self, members: &[NodeId]) -> Result<Option<NodeId>> {
        for &member in members {
            let node = self.arena.get(member)?;
            if node.kind.as_uniqueness().map_or(false, |u| u.has_rederivables()) {
                return Ok(Some(member));
            }
        }
        Ok(None)
    }

    fn group_pending(&self, members: &[NodeId]) -> Result<bool> {
        for &member in members {
            let node = self.arena.get(member)?;
            if node.mailbox.as_ref().map_or(false, |m| !m.is_empty())
                || node.kind.as_uniqueness().map_or(false, |u| u.has_rederivables())
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn deliver_timely(&mut self, members: &[NodeId], recursive: bool) -> Result<()> {
        loop {
            let mut next: Option<(Timestamp, u32, NodeId)> = None;
            for &member in members {
                let node = self.arena.get(member)?;
                let pending = node.mailbox.as_ref().and_then(|m| m.lowest_timestamp());
                let candidate = match (pending, resumable_timestamp(node)) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                if let Some(timestamp) = candidate {
                    let key = (timestamp, self.tracker.rank_of(member), member);
                    if next.map_or(true, |current| key < current) {
                        next = Some(key);
                    }
                }
            }
            let Some((timestamp, _, member)) = next else {
                return Ok(());
            };
            let messages = match self.arena.get_mut(member)?.mailbox.as_mut() {
                Some(mailbox) => mailbox.take_at(timestamp),
                None => Vec::new(),
            };
            self.deliver_batch(member, messages, recursive)?;
            self.resume(member, timestamp)?;
        }
    }

    /// Folds the lazily recorded changes of `id` at `timestamp` and propagates them.
    fn resume(&mut self, id: NodeId, timestamp: Timestamp) -> Result<()> {
        let node = self.arena.get(id)?;
        if !resumable_timestamp(node).map_or(false, |r| r <= timestamp) {
            return Ok(());
        }
        let output = match &mut self.arena.get_mut(id)?.kind {
            NodeKind::Uniqueness(u) => u.resume_at(timestamp).map(Output::Deltas),
            NodeKind::Indexer(i) => i.resume_at(timestamp).map(Output::Indexer),
            _ => Ok(Output::Deltas(Vec::new())),
        };
        let output = output.map_err(|cause| self.node_error(id, cause))?;
        trace!(node = %id, %timestamp, "resumed");
        self.emit(id, output)
    }

    fn take_messages(&mut self, id: NodeId, phase: DeliveryPhase) -> Result<Vec<Message>> {
        let taken = match self.arena.get_mut(id)?.mailbox.as_mut() {
            Some(mailbox) => mailbox.take(phase),
            None => Ok(Vec::new()),
        };
        taken.map_err(|cause| self.node_error(id, cause))
    }

    /// Delivers messages in order; on failure the rest go back to the mailbox.
    fn deliver_batch(&mut self, id: NodeId, messages: Vec<Message>, recursive: bool) -> Result<()> {
        let mut pending = messages.into_iter();
        while let Some(message) = pending.next() {
            if let Err(err) = self.deliver(id, message, recursive) {
                if let Ok(node) = self.arena.get_mut(id) {
                    if let Some(mailbox) = node.mailbox.as_mut() {
                        for rest in pending {
                            mailbox.post(rest.direction, rest.tuple, rest.timestamp);
                        }
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn deliver(&mut self, id: NodeId, message: Message, recursive: bool) -> Result<()> {
        trace!(
            node = %id,
            direction = ?message.direction,
            tuple = %message.tuple,
            timestamp = %message.timestamp,
            monotone = message.monotone,
            "deliver"
        );
        let policy = if recursive && !self.config.is_timely() {
            UpdatePolicy::Rederive {
                monotone: message.monotone,
            }
        } else {
            UpdatePolicy::Default
        };
        let timely = self.config.is_timely();
        let mut node = self.arena.take(id)?;
        let output = apply(&mut node, message, policy, timely);
        self.arena.put_back(id, node);
        let output = output.map_err(|cause| self.node_error(id, cause))?;
        self.emit(id, output)
    }

    fn emit(&mut self, id: NodeId, output: Output) -> Result<()> {
        match output {
            Output::Deltas(deltas) => self.propagate(id, deltas),
            Output::Indexer(updates) => {
                let subscriptions = self.arena.get(id)?.subscriptions.clone();
                for update in updates {
                    for subscription in &subscriptions {
                        self.notify_subscriber(id, *subscription, update.clone())?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Sends output deltas of `source` downstream.
    pub(crate) fn propagate(&mut self, source: NodeId, deltas: Vec<Delta>) -> Result<()> {
        for delta in deltas {
            let node = self.arena.get(source)?;
            let shared = match &node.kind {
                NodeKind::Uniqueness(_) => node.subscriptions.clone(),
                _ => Vec::new(),
            };
            let children = node.children.clone();
            let routing_key = match &node.kind {
                NodeKind::Dispatcher(d) => Some(
                    d.key(&delta.tuple)
                        .map_err(|cause| self.node_error(source, cause))?
                        .clone(),
                ),
                _ => None,
            };

            for subscription in shared {
                let update = self.specialized_notification(source, subscription, &delta)?;
                self.notify_subscriber(source, subscription, update)?;
            }

            for child in children {
                if let (Some(key), NodeKind::Bucket(bucket)) = (&routing_key, &self.arena.get(child)?.kind) {
                    if bucket.value() != key {
                        continue;
                    }
                }
                self.post(source, child, delta.direction, delta.tuple.clone(), delta.timestamp)?;
            }

            for (_, listener) in self.arena.get_mut(source)?.listeners.iter_mut() {
                listener(&delta);
            }
        }
        Ok(())
    }

    fn specialized_notification(
        &self,
        owner: NodeId,
        subscription: Subscription,
        delta: &Delta,
    ) -> Result<IndexerUpdate> {
        let owner_node = self.arena.get(owner)?;
        let indexer = self.arena.get(subscription.indexer)?;
        match (&indexer.kind, owner_node.kind.as_uniqueness()) {
            (NodeKind::SpecializedIndexer(s), Some(u)) => {
                Ok(s.notification(u, delta.direction, delta.tuple.clone(), delta.timestamp))
            }
            (kind, _) => Err(Error::WrongKind {
                node: subscription.indexer,
                expected: "specialized indexer",
                actual: kind.name(),
            }),
        }
    }

    /// Passes an indexer notification to a dual-input node, or through a
    /// left join to the listeners of its outer index.
    ///
    /// `source` is the node whose group decides the timestamp transformation:
    /// the indexer itself, or the owner of a specialized indexer.
    fn notify_subscriber(
        &mut self,
        source: NodeId,
        subscription: Subscription,
        mut update: IndexerUpdate,
    ) -> Result<()> {
        let listener = subscription.listener;
        if self.config.is_timely() {
            if let Some(transformation) = self.tracker.transformation(source, listener, false) {
                update.timestamp = transformation.apply(update.timestamp);
            }
        }
        let timely = self.config.is_timely() && self.tracker.is_in_recursive_group(listener);
        let node = self.arena.get(listener)?;
        if let NodeKind::LeftJoin(outer) = &node.kind {
            let outer_updates = outer.notification(&update);
            let subscriptions = node.subscriptions.clone();
            let passed = Delta::new(update.direction, update.tuple, update.timestamp);
            self.propagate(listener, vec![passed])?;
            for outer_update in outer_updates {
                for subscription in &subscriptions {
                    self.notify_subscriber(listener, *subscription, outer_update.clone())?;
                }
            }
            return Ok(());
        }
        let deltas = match &node.kind {
            NodeKind::Join(join) => join.notify(
                subscription.side,
                &update,
                self.index_view(join.primary())?,
                self.index_view(join.secondary())?,
                timely,
            ),
            NodeKind::Existence(existence) => existence.notify(
                subscription.side,
                &update,
                self.index_view(existence.primary())?,
                self.index_view(existence.secondary())?,
                timely,
            ),
            other => {
                return Err(Error::WrongKind {
                    node: listener,
                    expected: "join or existence",
                    actual: other.name(),
                })
            }
        };
        let deltas = deltas.map_err(|cause| self.node_error(listener, cause))?;
        self.propagate(listener, deltas)
    }

    /// Queues an update from `source` in the mailbox of `target`.
    pub(crate) fn post(
        &mut self,
        source: NodeId,
        target: NodeId,
        direction: Direction,
        tuple: Tuple,
        timestamp: Timestamp,
    ) -> Result<()> {
        let timestamp = if self.config.is_timely() {
            let production = is_production(&self.arena, target);
            match self.tracker.transformation(source, target, production) {
                Some(transformation) => transformation.apply(timestamp),
                None => timestamp,
            }
        } else {
            Timestamp::ZERO
        };
        let node = self.arena.get_mut(target)?;
        let Some(mailbox) = node.mailbox.as_mut() else {
            return Err(Error::WrongKind {
                node: target,
                expected: "node with a mailbox",
                actual: node.kind.name(),
            });
        };
        mailbox.post(direction, tuple, timestamp);
        self.tracker.activate(target);
        Ok(())
    }

    /// Attributes a tuple-level failure to a node.
    pub(crate) fn node_error(&self, node: NodeId, cause: rete_core::Error) -> Error {
        if !cause.is_consistency() {
            return Error::Tuple(cause);
        }
        let mut patterns: Vec<String> = self
            .tracker
            .downstream(node)
            .into_iter()
            .filter_map(|id| self.arena.get(id).ok())
            .filter_map(|n| n.kind.as_uniqueness())
            .filter_map(|u| u.production())
            .map(|p| p.pattern().to_owned())
            .collect();
        patterns.sort();
        patterns.dedup();
        error!(%node, ?patterns, %cause, "consistency error during propagation");
        Error::Consistency {
            node,
            patterns,
            cause,
        }
    }
}

fn resumable_timestamp(node: &Node) -> Option<Timestamp> {
    match &node.kind {
        NodeKind::Uniqueness(u) => u.resumable_timestamp(),
        NodeKind::Indexer(i) => i.resumable_timestamp(),
        _ => None,
    }
}

/// Runs one message through a node's operator.
fn apply(
    node: &mut Node,
    message: Message,
    policy: UpdatePolicy,
    timely: bool,
) -> rete_core::Result<Output> {
    let Message {
        direction,
        tuple,
        timestamp,
        ..
    } = message;
    let pass = |tuple: Tuple| Output::Deltas(vec![Delta::new(direction, tuple, timestamp)]);
    let output = match &mut node.kind {
        NodeKind::Uniqueness(u) => Output::Deltas(u.update(direction, tuple, timestamp, policy)?),
        NodeKind::Indexer(i) => Output::Indexer(i.update(direction, tuple, timestamp)?),
        NodeKind::Filter(f) => {
            if f.accepts(&tuple)? {
                pass(tuple)
            } else {
                Output::Deltas(Vec::new())
            }
        }
        NodeKind::Trimmer(t) => pass(t.apply(&tuple)?),
        NodeKind::Transformer(t) => pass(t.update(direction, tuple, timely)?),
        NodeKind::Dispatcher(_) | NodeKind::Bucket(_) => pass(tuple),
        NodeKind::TransitiveClosure(tc) => Output::Deltas(tc.update(direction, &tuple, timestamp)?),
        NodeKind::Representative(r) => Output::Deltas(r.update(direction, &tuple, timestamp)?),
        NodeKind::Aggregator(a) => Output::Deltas(a.update(direction, &tuple, timestamp)?),
        NodeKind::SpecializedIndexer(_)
        | NodeKind::Join(_)
        | NodeKind::Existence(_)
        | NodeKind::LeftJoin(_) => Output::Deltas(Vec::new()),
    };
    Ok(output)
}
