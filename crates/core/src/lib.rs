//! Rete Core - tuples, masks and timelines for the rete incremental query network.
//!
//! This crate provides the value model shared by every layer of the network:
//!
//! - `Value`: an opaque, nullable tuple element
//! - `Tuple`: immutable, arity-specialized, structurally hashed value sequences
//! - `TupleMask`: reusable column projections
//! - `Direction` / `Signed`: delta directions
//! - `Timestamp` / `Timeline` / `Diff`: virtual time for timely evaluation
//! - `Error`: error types for the layers above
//!
//! # Example
//!
//! ```rust
//! use rete_core::{tuple, TupleMask};
//!
//! let edge = tuple![1, 2];
//! let target = TupleMask::select_single(1, 2).unwrap();
//!
//! assert_eq!(target.transform(&edge).unwrap(), tuple![2]);
//! ```

#![no_std]

extern crate alloc;

mod direction;
mod error;
mod mask;
mod timeline;
mod tuple;
mod value;

pub use direction::{Direction, Signed};
pub use error::{Error, Result};
pub use mask::TupleMask;
pub use timeline::{Diff, Timeline, Timestamp, TimestampTransformation};
pub use tuple::Tuple;
pub use value::Value;

#[doc(hidden)]
pub use alloc::vec as __vec;
