//! Immutable, structurally hashed tuples.
//!
//! Tuples of arity 0..=4 use fixed-size backing arrays; wider tuples use a
//! shared slice. A left-inheritance tuple stores a shared ancestor (prefix)
//! plus its own trailing columns, and derives its hash by extending the
//! ancestor's hash instead of rehashing every column.

use crate::error::{Error, Result};
use crate::value::Value;
use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use rustc_hash::FxHasher;

const HASH_SEED: u64 = 1;
const HASH_FACTOR: u64 = 31;

#[derive(Clone)]
enum Repr {
    Flat0,
    Flat1(Arc<[Value; 1]>),
    Flat2(Arc<[Value; 2]>),
    Flat3(Arc<[Value; 3]>),
    Flat4(Arc<[Value; 4]>),
    FlatN(Arc<[Value]>),
    Left(Arc<LeftInheritance>),
}

struct LeftInheritance {
    ancestor: Tuple,
    local: Box<[Value]>,
    size: usize,
}

/// An ordered, fixed-size sequence of values.
#[derive(Clone)]
pub struct Tuple {
    hash: u64,
    repr: Repr,
}

#[inline]
fn element_hash(value: &Value) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

#[inline]
fn extend_hash<'a>(seed: u64, values: impl IntoIterator<Item = &'a Value>) -> u64 {
    values.into_iter().fold(seed, |h, v| {
        h.wrapping_mul(HASH_FACTOR).wrapping_add(element_hash(v))
    })
}

impl Tuple {
    /// The canonical 0-arity tuple. Does not allocate.
    #[inline]
    pub const fn empty() -> Self {
        Tuple {
            hash: HASH_SEED,
            repr: Repr::Flat0,
        }
    }

    /// Creates a flat tuple from its elements.
    pub fn new(values: Vec<Value>) -> Self {
        let hash = extend_hash(HASH_SEED, &values);
        let repr = match values.len() {
            0 => Repr::Flat0,
            1 => Self::fixed(values, Repr::Flat1),
            2 => Self::fixed(values, Repr::Flat2),
            3 => Self::fixed(values, Repr::Flat3),
            4 => Self::fixed(values, Repr::Flat4),
            _ => Repr::FlatN(Arc::from(values)),
        };
        Tuple { hash, repr }
    }

    fn fixed<const N: usize>(values: Vec<Value>, wrap: fn(Arc<[Value; N]>) -> Repr) -> Repr {
        match <[Value; N]>::try_from(values) {
            Ok(array) => wrap(Arc::new(array)),
            Err(values) => Repr::FlatN(Arc::from(values)),
        }
    }

    /// Creates a tuple that shares `ancestor` as its prefix and appends `local`.
    ///
    /// The hash extends the ancestor's hash, so equal contents hash equally
    /// regardless of representation.
    pub fn with_prefix(ancestor: &Tuple, local: Vec<Value>) -> Self {
        if local.is_empty() {
            return ancestor.clone();
        }
        if ancestor.size() == 0 {
            return Tuple::new(local);
        }
        let hash = extend_hash(ancestor.hash, &local);
        let size = ancestor.size() + local.len();
        Tuple {
            hash,
            repr: Repr::Left(Arc::new(LeftInheritance {
                ancestor: ancestor.clone(),
                local: local.into_boxed_slice(),
                size,
            })),
        }
    }

    /// Number of elements.
    pub fn size(&self) -> usize {
        match &self.repr {
            Repr::Left(left) => left.size,
            _ => self.flat().map_or(0, <[Value]>::len),
        }
    }

    /// Returns true for the 0-arity tuple.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the backing slice if this tuple is stored flat.
    pub fn flat(&self) -> Option<&[Value]> {
        match &self.repr {
            Repr::Flat0 => Some(&[]),
            Repr::Flat1(a) => Some(&a[..]),
            Repr::Flat2(a) => Some(&a[..]),
            Repr::Flat3(a) => Some(&a[..]),
            Repr::Flat4(a) => Some(&a[..]),
            Repr::FlatN(a) => Some(a),
            Repr::Left(_) => None,
        }
    }

    /// Returns the element at `index`, or None outside `[0, size)`.
    pub fn value(&self, index: usize) -> Option<&Value> {
        match &self.repr {
            Repr::Left(left) => {
                let prefix = left.ancestor.size();
                if index < prefix {
                    left.ancestor.value(index)
                } else {
                    left.local.get(index - prefix)
                }
            }
            _ => self.flat().and_then(|values| values.get(index)),
        }
    }

    /// Bounds-checked element access.
    pub fn get(&self, index: usize) -> Result<&Value> {
        self.value(index)
            .ok_or_else(|| Error::index_out_of_bounds(index, self.size()))
    }

    /// Iterates the elements in column order.
    pub fn iter(&self) -> impl Iterator<Item = &Value> + '_ {
        (0..self.size()).filter_map(move |i| self.value(i))
    }

    /// Copies the elements into a vector.
    pub fn elements(&self) -> Vec<Value> {
        match self.flat() {
            Some(values) => values.to_vec(),
            None => self.iter().cloned().collect(),
        }
    }

    /// Returns true if this tuple shares a prefix with an ancestor tuple.
    pub fn is_left_inheritance(&self) -> bool {
        matches!(self.repr, Repr::Left(_))
    }

    /// The precomputed structural hash.
    #[inline]
    pub fn structural_hash(&self) -> u64 {
        self.hash
    }
}

impl Default for Tuple {
    fn default() -> Self {
        Tuple::empty()
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        if self.hash != other.hash || self.size() != other.size() {
            return false;
        }
        match (self.flat(), other.flat()) {
            (Some(a), Some(b)) => a == b,
            _ => self.iter().eq(other.iter()),
        }
    }
}

impl Eq for Tuple {}

impl Hash for Tuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialOrd for Tuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Tuple {
    fn cmp(&self, other: &Self) -> Ordering {
        self.iter().cmp(other.iter())
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, value) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", value)?;
        }
        f.write_str(")")
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Tuple::new(values)
    }
}

impl FromIterator<Value> for Tuple {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Tuple::new(iter.into_iter().collect())
    }
}

/// Builds a flat tuple from values convertible into [`Value`].
///
/// ```rust
/// use rete_core::tuple;
///
/// let t = tuple![1, "a"];
/// assert_eq!(t.size(), 2);
/// ```
#[macro_export]
macro_rules! tuple {
    () => {
        $crate::Tuple::empty()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Tuple::new($crate::__vec![$($crate::Value::from($value)),+])
    };
}
