//! Update directions and signed payloads.

use core::fmt;

/// Whether a delta adds or retracts a tuple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Insert,
    Delete,
}

impl Direction {
    /// The inverse direction.
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Insert => Direction::Delete,
            Direction::Delete => Direction::Insert,
        }
    }

    /// Sign product: equal directions give `Insert`, differing ones `Delete`.
    #[inline]
    pub fn multiply(self, other: Direction) -> Self {
        if self == other {
            Direction::Insert
        } else {
            Direction::Delete
        }
    }

    /// `+1` for insertions, `-1` for deletions.
    #[inline]
    pub fn sign(self) -> i32 {
        match self {
            Direction::Insert => 1,
            Direction::Delete => -1,
        }
    }

    /// Direction of a non-zero signed count.
    #[inline]
    pub fn of_count(count: i32) -> Option<Self> {
        match count.signum() {
            1 => Some(Direction::Insert),
            -1 => Some(Direction::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Insert => f.write_str("+"),
            Direction::Delete => f.write_str("-"),
        }
    }
}

/// A payload tagged with a direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Signed<T> {
    pub direction: Direction,
    pub payload: T,
}

impl<T> Signed<T> {
    pub fn new(direction: Direction, payload: T) -> Self {
        Self { direction, payload }
    }

    pub fn insert(payload: T) -> Self {
        Self::new(Direction::Insert, payload)
    }

    pub fn delete(payload: T) -> Self {
        Self::new(Direction::Delete, payload)
    }

    /// The same payload with the direction flipped.
    pub fn opposite(self) -> Self {
        Self::new(self.direction.opposite(), self.payload)
    }
}

impl<T: fmt::Display> fmt::Display for Signed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.direction, self.payload)
    }
}
