//! Stateless tuple filters.

use rete_core::{Result, Tuple, Value};
use std::fmt;
use std::sync::Arc;

/// User predicate over a whole tuple.
pub type TuplePredicate = Arc<dyn Fn(&Tuple) -> bool + Send + Sync>;

enum FilterCondition {
    /// `t[column] == value`
    Value { column: usize, value: Value },
    /// All listed columns hold equal values.
    Equality { columns: Vec<usize> },
    /// `t[subject]` differs from every listed column.
    Inequality { subject: usize, others: Vec<usize> },
    Predicate(TuplePredicate),
}

/// Passes through the tuples that satisfy a condition, preserving direction.
pub struct FilterNode {
    condition: FilterCondition,
}

impl FilterNode {
    pub fn value(column: usize, value: Value) -> Self {
        Self {
            condition: FilterCondition::Value { column, value },
        }
    }

    pub fn equality(columns: Vec<usize>) -> Self {
        Self {
            condition: FilterCondition::Equality { columns },
        }
    }

    pub fn inequality(subject: usize, others: Vec<usize>) -> Self {
        Self {
            condition: FilterCondition::Inequality { subject, others },
        }
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Tuple) -> bool + Send + Sync + 'static,
    {
        Self {
            condition: FilterCondition::Predicate(Arc::new(predicate)),
        }
    }

    /// Highest column index the condition reads, if any.
    pub fn max_column(&self) -> Option<usize> {
        match &self.condition {
            FilterCondition::Value { column, .. } => Some(*column),
            FilterCondition::Equality { columns } => columns.iter().copied().max(),
            FilterCondition::Inequality { subject, others } => {
                others.iter().copied().chain(Some(*subject)).max()
            }
            FilterCondition::Predicate(_) => None,
        }
    }

    /// Evaluates the condition; fails only if a column is out of range.
    pub fn accepts(&self, tuple: &Tuple) -> Result<bool> {
        match &self.condition {
            FilterCondition::Value { column, value } => Ok(tuple.get(*column)? == value),
            FilterCondition::Equality { columns } => {
                let Some((&first, rest)) = columns.split_first() else {
                    return Ok(true);
                };
                let first = tuple.get(first)?;
                for &column in rest {
                    if tuple.get(column)? != first {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            FilterCondition::Inequality { subject, others } => {
                let subject = tuple.get(*subject)?;
                for &column in others {
                    if tuple.get(column)? == subject {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            FilterCondition::Predicate(predicate) => Ok(predicate(tuple)),
        }
    }
}

impl fmt::Debug for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.condition {
            FilterCondition::Value { column, value } => {
                write!(f, "FilterNode(#{} == {})", column, value)
            }
            FilterCondition::Equality { columns } => write!(f, "FilterNode(equal {:?})", columns),
            FilterCondition::Inequality { subject, others } => {
                write!(f, "FilterNode(#{} != {:?})", subject, others)
            }
            FilterCondition::Predicate(_) => f.write_str("FilterNode(<predicate>)"),
        }
    }
}
