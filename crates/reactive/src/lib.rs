//! Rete Reactive - change-set subscriptions on top of the rete network.
//!
//! A production node already emits output deltas to external listeners.
//! This crate turns those deltas into per-flush change sets:
//!
//! - `ChangeSet`: tuples added to and removed from a query result
//! - `ObservableQuery`: the result of one production node plus its subscribers
//! - `QueryRegistry`: flushes the network and publishes change sets of every
//!   registered query
//!
//! # Example
//!
//! ```rust
//! use rete_core::{tuple, Direction};
//! use rete_incremental::{Network, ProductionInfo};
//! use rete_reactive::ObservableQuery;
//!
//! let mut network = Network::default();
//! let edges = network.input(2);
//! let closure = network.transitive_closure(edges)?;
//! let reachable = network.production(ProductionInfo::new("reachable", ["from", "to"]));
//! network.connect_and_synchronize(closure, reachable)?;
//!
//! let mut query = ObservableQuery::attach(&mut network, reachable)?;
//! query.subscribe(|changes| {
//!     println!("+{} -{}", changes.added.len(), changes.removed.len());
//! });
//!
//! network.update(edges, Direction::Insert, tuple![1, 2])?;
//! network.update(edges, Direction::Insert, tuple![2, 3])?;
//! network.flush()?;
//! assert_eq!(query.poll().map(|c| c.added.len()), Some(3));
//! # Ok::<(), rete_incremental::Error>(())
//! ```

pub mod change_set;
pub mod notify;
pub mod observable;

pub use change_set::ChangeSet;
pub use notify::{QueryId, QueryRegistry};
pub use observable::{ChangeCallback, ObservableQuery, SubscriptionId};
