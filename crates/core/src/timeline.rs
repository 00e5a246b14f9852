//! Virtual timestamps and presence timelines for timely evaluation.
//!
//! A [`Timeline`] is a sorted list of change points that alternates between
//! insertion and deletion, starting with an insertion. A tuple is present
//! between an insertion point and the following deletion point.

use crate::direction::{Direction, Signed};
use crate::error::{Error, Result};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

/// A totally ordered point of virtual time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(u32);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    #[inline]
    pub const fn new(value: u32) -> Self {
        Timestamp(value)
    }

    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// The following timestamp.
    #[inline]
    pub fn next(self) -> Self {
        Timestamp(self.0.saturating_add(1))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a timestamp changes when an update crosses between nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimestampTransformation {
    /// Leaving a recursive group: the group's internal time collapses to zero.
    Reset,
    /// Re-entering a production node within the same recursive group.
    Increment,
}

impl TimestampTransformation {
    #[inline]
    pub fn apply(self, timestamp: Timestamp) -> Timestamp {
        match self {
            TimestampTransformation::Reset => Timestamp::ZERO,
            TimestampTransformation::Increment => timestamp.next(),
        }
    }
}

/// An ordered sequence of signed timestamps describing a timeline change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diff(Vec<Signed<Timestamp>>);

impl Diff {
    pub fn new() -> Self {
        Diff(Vec::new())
    }

    pub fn push(&mut self, change: Signed<Timestamp>) {
        self.0.push(change);
    }

    pub fn extend(&mut self, other: Diff) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Signed<Timestamp>> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Signed<Timestamp>] {
        &self.0
    }
}

impl IntoIterator for Diff {
    type Item = Signed<Timestamp>;
    type IntoIter = vec::IntoIter<Signed<Timestamp>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diff {
    type Item = &'a Signed<Timestamp>;
    type IntoIter = core::slice::Iter<'a, Signed<Timestamp>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Signed<Timestamp>> for Diff {
    fn from_iter<I: IntoIterator<Item = Signed<Timestamp>>>(iter: I) -> Self {
        Diff(iter.into_iter().collect())
    }
}

/// Presence of a tuple over virtual time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Timeline {
    changes: Vec<Timestamp>,
}

impl Timeline {
    /// Never present.
    pub fn empty() -> Self {
        Timeline::default()
    }

    /// Present from `timestamp` onwards.
    pub fn present_from(timestamp: Timestamp) -> Self {
        Timeline {
            changes: vec![timestamp],
        }
    }

    /// Present from the beginning of time.
    pub fn zero() -> Self {
        Self::present_from(Timestamp::ZERO)
    }

    /// Builds a timeline from alternating, strictly increasing change points.
    pub fn from_changes(changes: Vec<Timestamp>) -> Result<Self> {
        if let Some(pair) = changes.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::TimelineOrder { timestamp: pair[1] });
        }
        Ok(Timeline { changes })
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of change points.
    #[inline]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// True if the last change is an insertion.
    #[inline]
    pub fn is_present_at_infinity(&self) -> bool {
        self.changes.len() % 2 == 1
    }

    /// The earliest insertion point.
    pub fn first(&self) -> Option<Timestamp> {
        self.changes.first().copied()
    }

    /// Change point `index` without its direction.
    pub fn unsigned(&self, index: usize) -> Option<Timestamp> {
        self.changes.get(index).copied()
    }

    /// Change point `index` with its direction.
    pub fn signed(&self, index: usize) -> Option<Signed<Timestamp>> {
        self.unsigned(index)
            .map(|t| Signed::new(direction_at(index), t))
    }

    /// The change points as a signed sequence.
    pub fn changes(&self) -> impl Iterator<Item = Signed<Timestamp>> + '_ {
        self.changes
            .iter()
            .enumerate()
            .map(|(i, &t)| Signed::new(direction_at(i), t))
    }

    /// Returns true if the tuple is present at `timestamp`.
    pub fn is_present_at(&self, timestamp: Timestamp) -> bool {
        self.changes.partition_point(|&t| t <= timestamp) % 2 == 1
    }

    /// The change sequence as a diff against the empty timeline.
    pub fn to_diff(&self) -> Diff {
        self.changes().collect()
    }

    /// Intersection of presence: present wherever both timelines are present.
    pub fn merge_multiplicative(&self, other: &Timeline) -> Timeline {
        let (a, b) = (&self.changes, &other.changes);
        let (mut i, mut j) = (0, 0);
        let mut result = Vec::new();
        while i < a.len() || j < b.len() {
            let step_a = j >= b.len() || (i < a.len() && a[i] <= b[j]);
            let step_b = i >= a.len() || (j < b.len() && b[j] <= a[i]);
            if step_a && step_b {
                // both flip at the same point; combined presence changes only
                // if they were in the same state before
                if i % 2 == j % 2 {
                    result.push(a[i]);
                }
                i += 1;
                j += 1;
            } else if step_a {
                if j % 2 == 1 {
                    result.push(a[i]);
                }
                i += 1;
            } else {
                if i % 2 == 1 {
                    result.push(b[j]);
                }
                j += 1;
            }
        }
        Timeline { changes: result }
    }

    /// Applies a signed diff; equal timestamps must carry opposite signs and cancel.
    pub fn merge_additive(&self, diff: &Diff) -> Result<Timeline> {
        let mut existing = self.changes().peekable();
        let mut incoming = diff.iter().copied().peekable();
        let mut expected = Direction::Insert;
        let mut result = Vec::with_capacity(self.changes.len() + diff.len());

        loop {
            let next = match (existing.peek().copied(), incoming.peek().copied()) {
                (None, None) => break,
                (Some(_), None) => existing.next(),
                (None, Some(_)) => incoming.next(),
                (Some(e), Some(d)) if e.payload < d.payload => existing.next(),
                (Some(e), Some(d)) if e.payload > d.payload => incoming.next(),
                (Some(e), Some(d)) => {
                    if e.direction == d.direction {
                        return Err(Error::TimelineCancel {
                            timestamp: e.payload,
                        });
                    }
                    existing.next();
                    incoming.next();
                    continue;
                }
            };
            if let Some(change) = next {
                if change.direction != expected {
                    return Err(Error::TimelineOrder {
                        timestamp: change.payload,
                    });
                }
                result.push(change.payload);
                expected = expected.opposite();
            }
        }
        Ok(Timeline { changes: result })
    }
}

#[inline]
fn direction_at(index: usize) -> Direction {
    if index % 2 == 0 {
        Direction::Insert
    } else {
        Direction::Delete
    }
}

impl fmt::Display for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, change) in self.changes().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", change)?;
        }
        f.write_str("]")
    }
}
