//! Dispatch-by-value.

use rete_core::{Result, Tuple, Value};

/// Routes each tuple to the bucket registered for its value in `column`.
///
/// Buckets are ordinary children of the dispatcher; the network consults
/// [`BucketNode::value`] when propagating so each tuple reaches at most one
/// bucket. Children that are not buckets receive every tuple.
#[derive(Clone, Debug)]
pub struct DispatcherNode {
    column: usize,
}

impl DispatcherNode {
    pub fn new(column: usize) -> Self {
        Self { column }
    }

    #[inline]
    pub fn column(&self) -> usize {
        self.column
    }

    /// The routing key of `tuple`.
    pub fn key<'t>(&self, tuple: &'t Tuple) -> Result<&'t Value> {
        tuple.get(self.column)
    }
}

/// Receives the tuples of a dispatcher whose routing key equals `value`.
#[derive(Clone, Debug)]
pub struct BucketNode {
    value: Value,
}

impl BucketNode {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }
}
