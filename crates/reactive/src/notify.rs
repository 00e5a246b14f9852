//! Query registry.
//!
//! [`QueryRegistry`] keeps weak handles to observable queries grouped by the
//! production node they observe. [`QueryRegistry::flush`] drives the network
//! to quiescence and then lets every live query publish its change set.
//! Listeners of queries that were dropped are detached from the network on
//! the next flush or [`QueryRegistry::cleanup`].

use crate::change_set::ChangeSet;
use crate::observable::ObservableQuery;
use hashbrown::HashMap;
use parking_lot::Mutex;
use rete_incremental::{ListenerId, Network, NodeId, Result};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Handle of a registered query.
pub type QueryId = u64;

/// Routes network flushes to the queries observing its production nodes.
///
/// # Example
///
/// ```rust
/// use parking_lot::Mutex;
/// use rete_core::{tuple, Direction};
/// use rete_incremental::{Network, ProductionInfo};
/// use rete_reactive::{ObservableQuery, QueryRegistry};
/// use std::sync::Arc;
///
/// let mut network = Network::default();
/// let facts = network.input(1);
/// let out = network.production(ProductionInfo::new("facts", ["v"]));
/// network.connect_and_synchronize(facts, out)?;
///
/// let query = Arc::new(Mutex::new(ObservableQuery::attach(&mut network, out)?));
/// let mut registry = QueryRegistry::new();
/// registry.register(&query);
///
/// network.update(facts, Direction::Insert, tuple![1])?;
/// let published = registry.flush(&mut network)?;
/// assert_eq!(published.len(), 1);
/// # Ok::<(), rete_incremental::Error>(())
/// ```
pub struct QueryRegistry {
    production_queries: HashMap<NodeId, Vec<QueryId>>,
    queries: HashMap<QueryId, Registered>,
    next_id: QueryId,
}

struct Registered {
    production: NodeId,
    listener: ListenerId,
    query: Weak<Mutex<ObservableQuery>>,
}

impl Registered {
    fn is_live(&self) -> bool {
        self.query.strong_count() > 0
    }
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryRegistry {
    pub fn new() -> Self {
        Self {
            production_queries: HashMap::new(),
            queries: HashMap::new(),
            next_id: 1,
        }
    }

    /// Registers a query; the registry does not keep it alive.
    pub fn register(&mut self, query: &Arc<Mutex<ObservableQuery>>) -> QueryId {
        let id = self.next_id;
        self.next_id += 1;
        let (production, listener) = {
            let query = query.lock();
            (query.production(), query.listener())
        };
        self.production_queries.entry(production).or_default().push(id);
        self.queries.insert(
            id,
            Registered {
                production,
                listener,
                query: Arc::downgrade(query),
            },
        );
        debug!(query = id, %production, "registered query");
        id
    }

    /// Returns true if the query was registered. The query stays attached to
    /// the network.
    pub fn unregister(&mut self, id: QueryId) -> bool {
        let Some(entry) = self.queries.remove(&id) else {
            return false;
        };
        self.forget(entry.production, id);
        true
    }

    fn forget(&mut self, production: NodeId, id: QueryId) {
        if let Some(ids) = self.production_queries.get_mut(&production) {
            ids.retain(|&query| query != id);
            if ids.is_empty() {
                self.production_queries.remove(&production);
            }
        }
    }

    /// Flushes the network, then polls every live query.
    ///
    /// Returns the published change sets by query. If the flush fails no
    /// query is polled; buffered deltas stay for the next call.
    pub fn flush(&mut self, network: &mut Network) -> Result<Vec<(QueryId, ChangeSet)>> {
        network.flush()?;
        let mut published = Vec::new();
        for (&id, entry) in &self.queries {
            let Some(query) = entry.query.upgrade() else {
                continue;
            };
            let polled = query.lock().poll();
            if let Some(changes) = polled {
                published.push((id, changes));
            }
        }
        published.sort_by_key(|(id, _)| *id);
        self.cleanup(network);
        Ok(published)
    }

    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Number of live queries observing `production`.
    pub fn queries_for_production(&self, production: NodeId) -> usize {
        self.production_queries.get(&production).map_or(0, |ids| {
            ids.iter()
                .filter(|id| self.queries.get(*id).map_or(false, Registered::is_live))
                .count()
        })
    }

    /// Forgets queries that were dropped and detaches their listeners.
    ///
    /// Returns the number of detached listeners.
    pub fn cleanup(&mut self, network: &mut Network) -> usize {
        let dead: Vec<QueryId> = self
            .queries
            .iter()
            .filter(|(_, entry)| !entry.is_live())
            .map(|(&id, _)| id)
            .collect();
        let mut detached = 0;
        for id in dead {
            let Some(entry) = self.queries.remove(&id) else {
                continue;
            };
            self.forget(entry.production, id);
            match network.detach_listener(entry.production, entry.listener) {
                Ok(true) => detached += 1,
                Ok(false) => {}
                // the production node is gone and took its listeners with it
                Err(error) => warn!(query = id, %error, "could not detach query listener"),
            }
        }
        if detached > 0 {
            debug!(detached, "detached listeners of dropped queries");
        }
        detached
    }

    pub fn clear(&mut self) {
        self.production_queries.clear();
        self.queries.clear();
    }
}
