//! Projection masks over tuples.

use crate::error::{Error, Result};
use crate::tuple::Tuple;
use crate::value::Value;
use alloc::vec;
use alloc::vec::Vec;

/// Selects (and possibly reorders or repeats) columns of a source tuple.
///
/// Every index is `< source_width`. A mask is a plain value object and may be
/// shared freely between nodes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TupleMask {
    indices: Vec<usize>,
    source_width: usize,
    identity: bool,
    non_repeating: bool,
}

impl TupleMask {
    /// Creates a mask, validating every index against `source_width`.
    pub fn new(indices: Vec<usize>, source_width: usize) -> Result<Self> {
        if let Some(&index) = indices.iter().find(|&&i| i >= source_width) {
            return Err(Error::MaskIndexOutOfBounds {
                index,
                source_width,
            });
        }
        Ok(Self::from_valid(indices, source_width))
    }

    fn from_valid(indices: Vec<usize>, source_width: usize) -> Self {
        let identity =
            indices.len() == source_width && indices.iter().enumerate().all(|(i, &c)| i == c);
        let non_repeating = first_repeat(&indices).is_none();
        Self {
            indices,
            source_width,
            identity,
            non_repeating,
        }
    }

    /// Selects every column in order.
    pub fn identity(width: usize) -> Self {
        Self::from_valid((0..width).collect(), width)
    }

    /// Selects no columns; every tuple projects to the empty tuple.
    pub fn empty(source_width: usize) -> Self {
        Self::from_valid(Vec::new(), source_width)
    }

    /// Selects the first `arity` columns.
    pub fn linear(arity: usize, source_width: usize) -> Result<Self> {
        Self::new((0..arity).collect(), source_width)
    }

    /// Selects every column except `column`.
    pub fn omit(column: usize, source_width: usize) -> Self {
        Self::from_valid(
            (0..source_width).filter(|&i| i != column).collect(),
            source_width,
        )
    }

    /// Selects the single column `column`.
    pub fn select_single(column: usize, source_width: usize) -> Result<Self> {
        Self::new(vec![column], source_width)
    }

    /// Selects the columns whose indicator is true.
    pub fn from_keep_indicators(keep: &[bool]) -> Self {
        Self::from_valid(
            keep.iter()
                .enumerate()
                .filter(|(_, &k)| k)
                .map(|(i, _)| i)
                .collect(),
            keep.len(),
        )
    }

    /// The selected source columns in output order.
    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Width of the tuples this mask is applied to.
    #[inline]
    pub fn source_width(&self) -> usize {
        self.source_width
    }

    /// Width of the projected tuples.
    #[inline]
    pub fn arity(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Returns true if the mask selects no columns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Returns true if no column is selected twice.
    #[inline]
    pub fn is_non_repeating(&self) -> bool {
        self.non_repeating
    }

    /// The sorted columns this mask does not select.
    pub fn complementer(&self) -> Self {
        let mut keep = vec![true; self.source_width];
        for &i in &self.indices {
            keep[i] = false;
        }
        Self::from_keep_indicators(&keep)
    }

    fn check_width(&self, tuple: &Tuple) -> Result<()> {
        if tuple.size() != self.source_width {
            return Err(Error::arity_mismatch(self.source_width, tuple.size()));
        }
        Ok(())
    }

    /// Projects `tuple` to the selected columns, in mask order.
    pub fn transform(&self, tuple: &Tuple) -> Result<Tuple> {
        self.check_width(tuple)?;
        if self.identity {
            return Ok(tuple.clone());
        }
        if self.indices.is_empty() {
            return Ok(Tuple::empty());
        }
        let values = self
            .indices
            .iter()
            .map(|&i| tuple.get(i).cloned())
            .collect::<Result<Vec<_>>>()?;
        Ok(Tuple::new(values))
    }

    /// Rebuilds a full-width tuple from a projected one; unselected columns are null.
    pub fn revert_from(&self, masked: &Tuple) -> Result<Tuple> {
        if let Some(column) = first_repeat(&self.indices) {
            return Err(Error::RepeatingMask { column });
        }
        if masked.size() != self.indices.len() {
            return Err(Error::arity_mismatch(self.indices.len(), masked.size()));
        }
        let mut values = vec![Value::Null; self.source_width];
        for (value, &column) in masked.iter().zip(&self.indices) {
            values[column] = value.clone();
        }
        Ok(Tuple::new(values))
    }

    /// Composes `self` after `inner`: the result applied to `t` equals
    /// `self.transform(inner.transform(t))`.
    pub fn compose(&self, inner: &TupleMask) -> Result<TupleMask> {
        if self.source_width != inner.arity() {
            return Err(Error::arity_mismatch(self.source_width, inner.arity()));
        }
        let indices = self.indices.iter().map(|&i| inner.indices[i]).collect();
        Ok(Self::from_valid(indices, inner.source_width))
    }

    /// Appends columns of `secondary` to `primary`.
    ///
    /// With `as_complementer` the columns selected by this mask are appended;
    /// otherwise the columns it does not select are appended in column order.
    /// With `use_inheritance` the result shares `primary` as its prefix.
    pub fn combine(
        &self,
        primary: &Tuple,
        secondary: &Tuple,
        use_inheritance: bool,
        as_complementer: bool,
    ) -> Result<Tuple> {
        self.check_width(secondary)?;
        let suffix: Vec<Value> = if as_complementer {
            self.indices
                .iter()
                .map(|&i| secondary.get(i).cloned())
                .collect::<Result<_>>()?
        } else {
            let mut sorted = self.indices.clone();
            sorted.sort_unstable();
            secondary
                .iter()
                .enumerate()
                .filter(|(i, _)| sorted.binary_search(i).is_err())
                .map(|(_, v)| v.clone())
                .collect()
        };
        if use_inheritance {
            Ok(Tuple::with_prefix(primary, suffix))
        } else {
            let mut values = primary.elements();
            values.extend(suffix);
            Ok(Tuple::new(values))
        }
    }
}

fn first_repeat(indices: &[usize]) -> Option<usize> {
    indices
        .iter()
        .enumerate()
        .find(|(pos, i)| indices[..*pos].contains(*i))
        .map(|(_, &i)| i)
}
