//! Node arena and node definitions of the network.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`] handles, so
//! owner relations (an indexer's parent, a specialized indexer's owner, a
//! bucket's dispatcher) never form reference cycles.

mod graph;
pub mod node;

pub use graph::NodeArena;
pub use node::{ListenerFn, ListenerId, Node, NodeKind, Side, Subscription};

use core::fmt;

/// Handle of a node in a network.
///
/// Slots of removed nodes are reused; the generation tells a stale handle
/// apart from the node that took its slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Handle of the first node to occupy slot `index`.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self::with_generation(index, 0)
    }

    #[inline]
    pub(crate) const fn with_generation(index: u32, generation: u32) -> Self {
        NodeId { index, generation }
    }

    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "#{}", self.index)
        } else {
            write!(f, "#{}v{}", self.index, self.generation)
        }
    }
}
