//! Rete ITC - incremental graph algorithms for the rete incremental query network.
//!
//! - `Graph`: directed multigraph with edge multiplicities
//! - `UnionFind`: disjoint sets with explicit roots
//! - `strongly_connected_components`: Tarjan over an induced subgraph
//! - `IncrementalTc`: transitive closure maintained under edge insert/delete
//! - `RepresentativeElection`: component representatives under edge insert/delete
//!
//! Both incremental algorithms report their effect as signed `(V, V)` pairs so
//! a network node can forward them as tuple deltas.
//!
//! # Example
//!
//! ```rust
//! use rete_itc::IncrementalTc;
//!
//! let mut tc = IncrementalTc::new();
//! tc.insert_edge(1, 2);
//! tc.insert_edge(2, 3);
//! assert_eq!(tc.closure(), vec![(1, 2), (1, 3), (2, 3)]);
//!
//! tc.delete_edge(&2, &3).unwrap();
//! assert_eq!(tc.closure(), vec![(1, 2)]);
//! ```

#![no_std]

extern crate alloc;

pub mod graph;
pub mod representative;
pub mod scc;
pub mod tc;
pub mod union_find;

pub use graph::Graph;
pub use representative::{Connectivity, RepresentativeChange, RepresentativeElection};
pub use scc::strongly_connected_components;
pub use tc::{IncrementalTc, ReachabilityChange};
pub use union_find::UnionFind;
