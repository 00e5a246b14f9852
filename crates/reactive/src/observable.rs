//! Observable queries over production nodes.
//!
//! An [`ObservableQuery`] attaches a listener to a production node. The
//! listener only buffers output deltas while the network flushes; the query
//! turns the buffer into a [`ChangeSet`] when it is polled, keeps its own copy
//! of the result up to date and passes the change set to its subscribers.

use crate::change_set::ChangeSet;
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use rete_core::{Direction, Tuple};
use rete_incremental::{Delta, DeltaBatchExt, ListenerId, Network, NodeId, Result};
use std::sync::Arc;
use tracing::trace;

/// Handle of a change set subscriber.
pub type SubscriptionId = u64;

/// Callback receiving change sets.
pub type ChangeCallback = Box<dyn Fn(&ChangeSet) + Send>;

/// The result of a production node, observed through change sets.
///
/// # Example
///
/// ```rust
/// use rete_core::{tuple, Direction};
/// use rete_incremental::{Network, ProductionInfo};
/// use rete_reactive::ObservableQuery;
///
/// let mut network = Network::default();
/// let facts = network.input(1);
/// let out = network.production(ProductionInfo::new("facts", ["v"]));
/// network.connect_and_synchronize(facts, out)?;
///
/// let mut query = ObservableQuery::attach(&mut network, out)?;
/// network.update(facts, Direction::Insert, tuple![1])?;
/// network.flush()?;
///
/// let changes = query.poll().unwrap();
/// assert_eq!(changes.added, vec![tuple![1]]);
/// # Ok::<(), rete_incremental::Error>(())
/// ```
pub struct ObservableQuery {
    production: NodeId,
    listener: ListenerId,
    pending: Arc<Mutex<Vec<Delta>>>,
    result: HashSet<Tuple>,
    subscriptions: HashMap<SubscriptionId, ChangeCallback>,
    next_subscription: SubscriptionId,
}

impl ObservableQuery {
    /// Starts observing `production`; its current contents become the
    /// initial result.
    pub fn attach(network: &mut Network, production: NodeId) -> Result<Self> {
        let mut initial = Vec::new();
        network.pull_into(production, &mut initial, true)?;

        let pending = Arc::new(Mutex::new(Vec::new()));
        // inert once the query is dropped; `QueryRegistry::cleanup` detaches it
        let buffer = Arc::downgrade(&pending);
        let listener = network.attach_listener(production, move |delta: &Delta| {
            if let Some(buffer) = buffer.upgrade() {
                buffer.lock().push(delta.clone());
            }
        })?;

        Ok(Self {
            production,
            listener,
            pending,
            result: initial.into_iter().collect(),
            subscriptions: HashMap::new(),
            next_subscription: 1,
        })
    }

    /// Stops observing; returns false if the listener was already gone.
    pub fn detach(self, network: &mut Network) -> Result<bool> {
        network.detach_listener(self.production, self.listener)
    }

    #[inline]
    pub fn production(&self) -> NodeId {
        self.production
    }

    #[inline]
    pub fn listener(&self) -> ListenerId {
        self.listener
    }

    /// The current result in tuple order.
    pub fn result(&self) -> Vec<Tuple> {
        let mut tuples: Vec<Tuple> = self.result.iter().cloned().collect();
        tuples.sort();
        tuples
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.result.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.result.is_empty()
    }

    pub fn contains(&self, tuple: &Tuple) -> bool {
        self.result.contains(tuple)
    }

    /// The current result reported as additions.
    pub fn initial(&self) -> ChangeSet {
        ChangeSet::initial(self.result())
    }

    /// Returns the id used to unsubscribe.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&ChangeSet) + Send + 'static,
    {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscriptions.insert(id, Box::new(callback));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    #[inline]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns true if deltas arrived since the last poll.
    pub fn has_pending(&self) -> bool {
        !self.pending.lock().is_empty()
    }

    /// Folds buffered deltas into the result and notifies subscribers.
    ///
    /// Returns `None` if the result did not change.
    pub fn poll(&mut self) -> Option<ChangeSet> {
        let deltas = std::mem::take(&mut *self.pending.lock());
        if deltas.is_empty() {
            return None;
        }
        let mut changes = ChangeSet::new();
        for delta in deltas.compact() {
            match delta.direction {
                Direction::Insert => {
                    if self.result.insert(delta.tuple.clone()) {
                        changes.added.push(delta.tuple);
                    }
                }
                Direction::Delete => {
                    if self.result.remove(&delta.tuple) {
                        changes.removed.push(delta.tuple);
                    }
                }
            }
        }
        if changes.is_empty() {
            return None;
        }
        changes.current_result = self.result();
        trace!(
            production = %self.production,
            added = changes.added.len(),
            removed = changes.removed.len(),
            "query changed"
        );
        for callback in self.subscriptions.values() {
            callback(&changes);
        }
        Some(changes)
    }

    /// Drops the local result and any buffered deltas.
    pub fn clear(&mut self) {
        self.result.clear();
        self.pending.lock().clear();
    }
}
