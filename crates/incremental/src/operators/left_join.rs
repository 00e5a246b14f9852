//! Outer indexing for left joins.

use crate::dataflow::NodeId;
use crate::operators::IndexerUpdate;
use rete_core::{Tuple, TupleMask, Value};

/// Reads a projection indexer as an outer index.
///
/// The indexer's mask must omit exactly one column. A signature whose group
/// is empty reads as a single default tuple carrying `default` in that
/// column, so a join over this node keeps every primary tuple. The node's
/// own output is the indexer's input.
#[derive(Clone, Debug)]
pub struct LeftJoinNode {
    indexer: NodeId,
    mask: TupleMask,
    column: usize,
    default: Value,
}

impl LeftJoinNode {
    /// Returns `None` unless `mask` omits exactly one column.
    pub fn new(indexer: NodeId, mask: TupleMask, default: Value) -> Option<Self> {
        if !mask.is_non_repeating() || mask.arity() + 1 != mask.source_width() {
            return None;
        }
        let column = *mask.complementer().indices().first()?;
        Some(Self {
            indexer,
            mask,
            column,
            default,
        })
    }

    pub fn indexer(&self) -> NodeId {
        self.indexer
    }

    pub fn mask(&self) -> &TupleMask {
        &self.mask
    }

    /// The column filled in by the default value.
    pub fn column(&self) -> usize {
        self.column
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// The tuple an empty group of `signature` reads as.
    pub fn default_tuple(&self, signature: &Tuple) -> Tuple {
        let mut values = vec![Value::Null; self.mask.source_width()];
        for (value, &column) in signature.iter().zip(self.mask.indices()) {
            values[column] = value.clone();
        }
        values[self.column] = self.default.clone();
        Tuple::new(values)
    }

    /// Outer index updates for one update of the underlying indexer.
    ///
    /// Outer groups are never empty, so no update carries a change flag.
    /// When the inner group fills up or drains, the default tuple leaves or
    /// returns right after the update itself.
    pub fn notification(&self, update: &IndexerUpdate) -> Vec<IndexerUpdate> {
        let mut updates = vec![IndexerUpdate {
            change: false,
            ..update.clone()
        }];
        if update.change {
            updates.push(IndexerUpdate {
                direction: update.direction.opposite(),
                tuple: self.default_tuple(&update.signature),
                signature: update.signature.clone(),
                change: false,
                timestamp: update.timestamp,
            });
        }
        updates
    }
}
