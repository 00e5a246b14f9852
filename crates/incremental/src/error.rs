//! Network error types.

use crate::dataflow::NodeId;

/// Result type alias for network operations.
pub type Result<T> = std::result::Result<T, Error>;

/// How an error should be treated by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid network shape or configuration. Raised at build or connect time.
    Structural,
    /// Internal reference counting went wrong while propagating an update.
    Consistency,
    /// The node cannot perform the requested operation.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Tuple(#[from] rete_core::Error),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("illegal edge: {child} already has a parent ({existing}) and cannot connect to {parent}")]
    ParentAlreadyConnected {
        child: NodeId,
        existing: NodeId,
        parent: NodeId,
    },

    #[error("illegal edge removal: {parent} is not a parent of {child}")]
    NotConnected { parent: NodeId, child: NodeId },

    #[error("node {0} is not an input node")]
    NotAnInput(NodeId),

    #[error("node {node} is a {actual} node, expected {expected}")]
    WrongKind {
        node: NodeId,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("{kind} node {node} cannot be part of a recursive group in timely evaluation")]
    RecursiveTimelyNode { node: NodeId, kind: &'static str },

    #[error("existence node {node} reads indexer {secondary} of its own recursive group in timely evaluation")]
    SecondaryInSameGroup { node: NodeId, secondary: NodeId },

    #[error("node {node} expects tuples of arity {expected}, got {actual}")]
    ArityMismatch {
        node: NodeId,
        expected: usize,
        actual: usize,
    },

    #[error("node {0} still has children or listeners")]
    NodeInUse(NodeId),

    #[error("[INTERNAL ERROR] {cause} in node {node} for pattern(s) {patterns:?}")]
    Consistency {
        node: NodeId,
        patterns: Vec<String>,
        cause: rete_core::Error,
    },

    #[error("node {node} does not support {operation}")]
    Unsupported {
        node: NodeId,
        operation: &'static str,
    },
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Tuple(inner) if inner.is_consistency() => ErrorCategory::Consistency,
            Error::Consistency { .. } => ErrorCategory::Consistency,
            Error::Unsupported { .. } => ErrorCategory::Unsupported,
            _ => ErrorCategory::Structural,
        }
    }

    /// The node the error is attributed to, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Error::UnknownNode(node)
            | Error::NotAnInput(node)
            | Error::NodeInUse(node)
            | Error::WrongKind { node, .. }
            | Error::RecursiveTimelyNode { node, .. }
            | Error::SecondaryInSameGroup { node, .. }
            | Error::ArityMismatch { node, .. }
            | Error::Consistency { node, .. }
            | Error::Unsupported { node, .. } => Some(*node),
            Error::ParentAlreadyConnected { child, .. } | Error::NotConnected { child, .. } => {
                Some(*child)
            }
            Error::Tuple(_) => None,
        }
    }
}
