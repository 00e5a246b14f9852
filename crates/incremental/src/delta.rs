//! Output deltas of network nodes.
//!
//! A [`Delta`] is one incremental change of a node's output: a direction, the
//! tuple, and the virtual timestamp the change happened at (always
//! [`Timestamp::ZERO`] in timeless evaluation).

use hashbrown::HashMap;
use rete_core::{Direction, Timestamp, Tuple};

/// One change of a node's output relation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delta {
    pub direction: Direction,
    pub tuple: Tuple,
    pub timestamp: Timestamp,
}

impl Delta {
    #[inline]
    pub fn new(direction: Direction, tuple: Tuple, timestamp: Timestamp) -> Self {
        Self {
            direction,
            tuple,
            timestamp,
        }
    }

    /// Creates an insertion at timestamp zero.
    #[inline]
    pub fn insert(tuple: Tuple) -> Self {
        Self::new(Direction::Insert, tuple, Timestamp::ZERO)
    }

    /// Creates a deletion at timestamp zero.
    #[inline]
    pub fn delete(tuple: Tuple) -> Self {
        Self::new(Direction::Delete, tuple, Timestamp::ZERO)
    }

    #[inline]
    pub fn is_insert(&self) -> bool {
        self.direction == Direction::Insert
    }

    #[inline]
    pub fn is_delete(&self) -> bool {
        self.direction == Direction::Delete
    }

    /// The same change in the opposite direction.
    #[inline]
    pub fn negate(self) -> Self {
        Self {
            direction: self.direction.opposite(),
            ..self
        }
    }

    /// Replaces the tuple, keeping direction and timestamp.
    #[inline]
    pub fn map<F>(self, f: F) -> Delta
    where
        F: FnOnce(Tuple) -> Tuple,
    {
        Delta {
            tuple: f(self.tuple),
            ..self
        }
    }
}

/// A batch of deltas.
pub type DeltaBatch = Vec<Delta>;

/// Extension trait for working with delta batches.
pub trait DeltaBatchExt {
    /// Cancels insertions against deletions of the same tuple, keeping the
    /// first-seen order of the surviving tuples.
    fn compact(self) -> Self;

    /// Number of insertions minus number of deletions.
    fn net_count(&self) -> i64;
}

impl DeltaBatchExt for DeltaBatch {
    fn compact(self) -> Self {
        let mut order = Vec::new();
        let mut counts: HashMap<Tuple, (i32, Timestamp)> = HashMap::new();
        for delta in self {
            let entry = counts.entry(delta.tuple.clone()).or_insert_with(|| {
                order.push(delta.tuple.clone());
                (0, delta.timestamp)
            });
            entry.0 += delta.direction.sign();
            entry.1 = entry.1.max(delta.timestamp);
        }
        let mut result = Vec::new();
        for tuple in order {
            let Some(&(count, timestamp)) = counts.get(&tuple) else {
                continue;
            };
            let Some(direction) = Direction::of_count(count) else {
                continue;
            };
            for _ in 0..count.unsigned_abs() {
                result.push(Delta::new(direction, tuple.clone(), timestamp));
            }
        }
        result
    }

    fn net_count(&self) -> i64 {
        self.iter().map(|d| i64::from(d.direction.sign())).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rete_core::tuple;

    #[test]
    fn test_delta_insert() {
        let d = Delta::insert(tuple![42]);
        assert!(d.is_insert());
        assert!(!d.is_delete());
        assert_eq!(d.timestamp, Timestamp::ZERO);
    }

    #[test]
    fn test_delta_negate() {
        let d = Delta::new(Direction::Insert, tuple![42], Timestamp::new(3)).negate();
        assert!(d.is_delete());
        assert_eq!(d.tuple, tuple![42]);
        assert_eq!(d.timestamp, Timestamp::new(3));
    }

    #[test]
    fn test_delta_map() {
        let d = Delta::delete(tuple![1, 2]).map(|t| tuple![t.get(1).unwrap().clone()]);
        assert_eq!(d, Delta::delete(tuple![2]));
    }

    #[test]
    fn test_delta_batch_compact() {
        let batch: DeltaBatch = vec![
            Delta::insert(tuple![1]),
            Delta::insert(tuple![2]),
            Delta::delete(tuple![1]),
            Delta::delete(tuple![3]),
        ];
        assert_eq!(
            batch.compact(),
            vec![Delta::insert(tuple![2]), Delta::delete(tuple![3])]
        );
    }

    #[test]
    fn test_delta_batch_net_count() {
        let batch: DeltaBatch = vec![
            Delta::insert(tuple![1]),
            Delta::insert(tuple![2]),
            Delta::delete(tuple![3]),
        ];
        assert_eq!(batch.net_count(), 1);
    }
}
