//! Change sets delivered to query subscribers.
//!
//! A [`ChangeSet`] is the net difference of a query result between two
//! flushes: tuples that appeared and tuples that disappeared.

use rete_core::{Direction, Tuple};
use rete_incremental::{Delta, DeltaBatchExt};

/// Net changes of a query result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Tuples that entered the result.
    pub added: Vec<Tuple>,
    /// Tuples that left the result.
    pub removed: Vec<Tuple>,
    /// The complete result after the changes.
    pub current_result: Vec<Tuple>,
}

impl ChangeSet {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a change set from raw output deltas of a production node.
    ///
    /// Deltas of the same tuple are netted first, so a tuple that was
    /// inserted and retracted in the same flush (or at several virtual
    /// timestamps) only shows up if its presence actually changed.
    pub fn from_deltas(deltas: Vec<Delta>, current_result: Vec<Tuple>) -> Self {
        let mut changes = Self {
            current_result,
            ..Self::default()
        };
        for delta in deltas.compact() {
            match delta.direction {
                Direction::Insert => changes.added.push(delta.tuple),
                Direction::Delete => changes.removed.push(delta.tuple),
            }
        }
        changes
    }

    /// A change set reporting every tuple of `tuples` as added.
    pub fn initial(tuples: Vec<Tuple>) -> Self {
        Self {
            added: tuples.clone(),
            removed: Vec::new(),
            current_result: tuples,
        }
    }

    /// Returns true if nothing was added or removed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }

    /// Appends the changes of a later change set; the later result wins.
    pub fn merge(&mut self, other: ChangeSet) {
        for tuple in other.added {
            match self.removed.iter().position(|t| *t == tuple) {
                Some(i) => {
                    self.removed.swap_remove(i);
                }
                None => self.added.push(tuple),
            }
        }
        for tuple in other.removed {
            match self.added.iter().position(|t| *t == tuple) {
                Some(i) => {
                    self.added.swap_remove(i);
                }
                None => self.removed.push(tuple),
            }
        }
        self.current_result = other.current_result;
    }

    pub fn clear(&mut self) {
        self.added.clear();
        self.removed.clear();
    }
}
