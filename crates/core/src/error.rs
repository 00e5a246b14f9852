//! Error types shared by the tuple, mask and timeline layers.

use crate::timeline::Timestamp;

/// Result type alias for core operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors raised by tuples, masks, timelines and memories.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Element access outside `[0, size)`.
    #[error("index {index} out of bounds for tuple of size {size}")]
    IndexOutOfBounds { index: usize, size: usize },
    /// A mask refers to a column the source does not have.
    #[error("mask index {index} out of bounds for source width {source_width}")]
    MaskIndexOutOfBounds { index: usize, source_width: usize },
    /// A mask was applied to (or composed with) something of the wrong width.
    #[error("mask arity mismatch: expected width {expected}, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },
    /// `revert_from` on a mask that selects a column more than once.
    #[error("mask selects column {column} more than once and cannot be reverted")]
    RepeatingMask { column: usize },
    /// A timeline diff does not alternate between insertions and deletions.
    #[error("timeline change at {timestamp} does not alternate direction")]
    TimelineOrder { timestamp: Timestamp },
    /// A timeline diff touches an existing change point without cancelling it.
    #[error("timeline change at {timestamp} does not cancel the existing change")]
    TimelineCancel { timestamp: Timestamp },
    /// A reference count dropped below zero.
    #[error("reference count became negative")]
    NegativeCount,
    /// A tuple was deleted that is not present.
    #[error("deletion of a tuple that is not present")]
    DuplicateDeletion,
}

impl Error {
    /// Creates an index-out-of-bounds error.
    pub fn index_out_of_bounds(index: usize, size: usize) -> Self {
        Error::IndexOutOfBounds { index, size }
    }

    /// Creates an arity mismatch error.
    pub fn arity_mismatch(expected: usize, actual: usize) -> Self {
        Error::ArityMismatch { expected, actual }
    }

    /// Returns true if this error signals inconsistent reference counting.
    pub fn is_consistency(&self) -> bool {
        matches!(self, Error::NegativeCount | Error::DuplicateDeletion)
    }
}
