//! Rete Incremental - an incremental query network with recursive groups.
//!
//! A [`Network`] is a dataflow graph of relational operators. External
//! updates enter at input nodes, are queued in per-node mailboxes and are
//! delivered by [`Network::flush`] in dependency order. Cycles form
//! recursive communication groups that are drained to a local fixpoint.
//!
//! # Core Concepts
//!
//! - `Delta`: one output change of a node (direction, tuple, timestamp)
//! - `NodeKind`: the operator of a node (uniqueness, indexer, join, ...)
//! - `Mailbox`: pending messages of a node (default, splitting, poset-aware, timely)
//! - `CommunicationTracker`: groups, ranks and activation order
//! - `NetworkConfig`: timeless or timely evaluation and memory options
//!
//! # Evaluation modes
//!
//! - Timeless: reference counting; recursive groups use delete-and-rederive
//! - Timely: every update carries a virtual timestamp and memories keep
//!   per-tuple timelines, so recursive joins stay well-founded
//!
//! # Example
//!
//! ```rust
//! use rete_core::{tuple, Direction};
//! use rete_incremental::{Network, ProductionInfo};
//!
//! let mut network = Network::default();
//! let edges = network.input(2);
//! let closure = network.transitive_closure(edges)?;
//! let reachable = network.production(ProductionInfo::new("reachable", ["source", "target"]));
//! network.connect_and_synchronize(closure, reachable)?;
//!
//! network.update(edges, Direction::Insert, tuple![1, 2])?;
//! network.update(edges, Direction::Insert, tuple![2, 3])?;
//! network.flush()?;
//! assert!(network.contains(reachable, &tuple![1, 3])?);
//! # Ok::<(), rete_incremental::Error>(())
//! ```

pub mod config;
pub mod dataflow;
pub mod delta;
pub mod error;
pub mod mailbox;
pub mod network;
pub mod operators;
mod scheduler;
pub mod tracker;

pub use config::{EvaluationMode, NetworkConfig, NetworkConfigBuilder, TimelineRepresentation};
pub use dataflow::{ListenerId, NodeId, NodeKind, Side};
pub use delta::{Delta, DeltaBatch, DeltaBatchExt};
pub use error::{Error, ErrorCategory, Result};
pub use mailbox::{DeliveryPhase, MailboxKind};
pub use network::Network;
pub use operators::{AggregateKind, FilterNode, PosetInfo, ProductionInfo};
pub use rete_itc::Connectivity;
pub use tracker::GroupId;
