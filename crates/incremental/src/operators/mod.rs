//! Node operators of the incremental network.
//!
//! Each operator holds only its own state; wiring, mailboxes and
//! propagation live in the network.

mod aggregate;
mod dispatch;
mod existence;
mod filter;
mod graph;
mod indexer;
mod join;
mod left_join;
mod map;
mod uniqueness;

pub use aggregate::{AggregateKind, AggregatorNode};
pub use dispatch::{BucketNode, DispatcherNode};
pub use existence::ExistenceNode;
pub use filter::{FilterNode, TuplePredicate};
pub use graph::{RepresentativeNode, TransitiveClosureNode};
pub use indexer::{IndexView, IndexerUpdate, ProjectionIndexer, SpecializedIndexer, SpecializedKind};
pub use join::JoinNode;
pub use left_join::LeftJoinNode;
pub use map::{TransformerNode, TrimmerNode, TupleMapper};
pub use uniqueness::{PosetComparator, PosetInfo, ProductionInfo, UniquenessNode, UpdatePolicy};
