//! Rete Index - tuple memories for the rete incremental query network.
//!
//! This crate provides the stateful building blocks nodes keep their tuples in:
//!
//! - `TupleMultiset`: reference-counted multiset of tuples
//! - `MaskedMemory`: signature → group index over a projection mask
//! - `TimelyMemory`: per-tuple multiplicities over virtual time, eager or lazy
//! - `TimelyMaskedMemory`: signature → timely memory index
//! - `SignatureIndex`: read-only group lookup shared by both masked memories
//!
//! Every memory is generic over the `BuildHasher` used for its maps, with
//! [`DefaultBuildHasher`] as the default.
//!
//! # Example
//!
//! ```rust
//! use rete_core::{tuple, TupleMask};
//! use rete_index::{MaskedMemory, SignatureIndex};
//!
//! let mut memory: MaskedMemory = MaskedMemory::new(TupleMask::select_single(0, 2).unwrap());
//! let edge = tuple![1, 2];
//! let signature = memory.signature_of(&edge).unwrap();
//!
//! assert!(memory.add(edge, signature));
//! assert!(memory.contains_signature(&tuple![1]));
//! ```

#![no_std]

extern crate alloc;

pub mod masked;
pub mod multiset;
pub mod timely;
pub mod timely_masked;
pub mod traits;

pub use masked::MaskedMemory;
pub use multiset::TupleMultiset;
pub use timely::TimelyMemory;
pub use timely_masked::TimelyMaskedMemory;
pub use traits::SignatureIndex;

/// Hasher used by memories unless another one is injected.
pub type DefaultBuildHasher = rustc_hash::FxBuildHasher;
