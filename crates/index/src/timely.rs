//! Timeline-keyed tuple memory for timely evaluation.
//!
//! For every tuple the memory keeps, per timestamp, the net number of
//! insertions at that timestamp (`diff`) and the running multiplicity up to
//! and including it (`cumulative`). The tuple's [`Timeline`] is the set of
//! intervals where the cumulative count is positive.
//!
//! In eager mode every `put`/`remove` immediately returns the resulting
//! timeline change. In lazy mode changes are recorded as folding states and
//! only turned into timeline changes when [`TimelyMemory::resume_at`] is
//! called for their timestamp, in increasing timestamp order.

use crate::DefaultBuildHasher;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::hash::BuildHasher;
use core::ops::Bound;
use hashbrown::{HashMap, HashSet};
use rete_core::{Diff, Direction, Error, Result, Signed, Timeline, Timestamp, Tuple};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct CumulativeCounter {
    diff: i32,
    cumulative: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SignChange {
    BecamePositive,
    BecameZero,
    Irrelevant,
}

type CounterMap = BTreeMap<Timestamp, CumulativeCounter>;

/// Per-tuple multiplicities over virtual time.
#[derive(Clone)]
pub struct TimelyMemory<S = DefaultBuildHasher> {
    counters: HashMap<Tuple, CounterMap, S>,
    timelines: HashMap<Tuple, Timeline, S>,
    folding: Option<BTreeMap<Timestamp, HashMap<Tuple, i32, S>>>,
    present_at_infinity: HashSet<Tuple, S>,
}

impl<S: BuildHasher + Default> TimelyMemory<S> {
    /// Creates an empty memory; `lazy` selects deferred folding.
    pub fn new(lazy: bool) -> Self {
        Self {
            counters: HashMap::with_hasher(S::default()),
            timelines: HashMap::with_hasher(S::default()),
            folding: lazy.then(BTreeMap::new),
            present_at_infinity: HashSet::with_hasher(S::default()),
        }
    }

    #[inline]
    pub fn is_lazy(&self) -> bool {
        self.folding.is_some()
    }

    /// Records one insertion of `tuple` at `timestamp`.
    pub fn put(&mut self, tuple: Tuple, timestamp: Timestamp) -> Result<Diff> {
        if self.is_lazy() {
            counter_at(&mut self.counters, &tuple, timestamp).diff += 1;
            self.add_folding_state(tuple, 1, timestamp);
            return Ok(Diff::new());
        }
        let mut diff = Diff::new();
        {
            let counters = self.counters.entry(tuple.clone()).or_default();
            counter_in(counters, timestamp).diff += 1;
            let mut previous = SignChange::Irrelevant;
            for (&t, counter) in counters.range_mut(timestamp..) {
                counter.cumulative += 1;
                previous = eager_step(Direction::Insert, counter, previous, t, &mut diff)?;
            }
        }
        gc_counter(&mut self.counters, &tuple, timestamp);
        self.update_timeline(&tuple, &diff)?;
        Ok(diff)
    }

    /// Records one deletion of `tuple` at `timestamp`.
    ///
    /// In eager mode a deletion that would make any cumulative count negative
    /// is rejected before the memory is touched.
    pub fn remove(&mut self, tuple: &Tuple, timestamp: Timestamp) -> Result<Diff> {
        let counters = self
            .counters
            .get_mut(tuple)
            .ok_or(Error::DuplicateDeletion)?;
        if self.folding.is_some() {
            counter_in(counters, timestamp).diff -= 1;
            self.add_folding_state(tuple.clone(), -1, timestamp);
            return Ok(Diff::new());
        }
        let at_or_before = counters
            .range(..=timestamp)
            .next_back()
            .map_or(0, |(_, c)| c.cumulative);
        if at_or_before < 1 || counters.range(timestamp..).any(|(_, c)| c.cumulative < 1) {
            return Err(Error::DuplicateDeletion);
        }
        let mut diff = Diff::new();
        counter_in(counters, timestamp).diff -= 1;
        let mut previous = SignChange::Irrelevant;
        for (&t, counter) in counters.range_mut(timestamp..) {
            counter.cumulative -= 1;
            previous = eager_step(Direction::Delete, counter, previous, t, &mut diff)?;
        }
        gc_counter(&mut self.counters, tuple, timestamp);
        self.update_timeline(tuple, &diff)?;
        Ok(diff)
    }

    fn add_folding_state(&mut self, tuple: Tuple, diff: i32, timestamp: Timestamp) {
        if let Some(folding) = self.folding.as_mut() {
            *folding
                .entry(timestamp)
                .or_insert_with(|| HashMap::with_hasher(S::default()))
                .entry(tuple)
                .or_insert(0) += diff;
        }
    }

    /// The lowest timestamp with pending folding work.
    pub fn resumable_timestamp(&self) -> Option<Timestamp> {
        self.folding
            .as_ref()
            .and_then(|f| f.keys().next().copied())
    }

    /// Tuples with pending folding work at the resumable timestamp.
    pub fn resumable_tuples(&self) -> Vec<Tuple> {
        self.folding
            .as_ref()
            .and_then(|f| f.values().next())
            .map(|states| states.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Folds every pending change at `timestamp` into the timelines and
    /// returns the resulting timeline diffs per tuple.
    ///
    /// Pending states below `timestamp` must have cancelled out to zero; they
    /// are garbage collected first.
    pub fn resume_at(&mut self, timestamp: Timestamp) -> Result<Vec<(Tuple, Diff)>> {
        loop {
            let stale = match self.folding.as_mut() {
                None => return Ok(Vec::new()),
                Some(folding) => match folding.keys().next().copied() {
                    Some(current) if current < timestamp => {
                        folding.remove(&current).map(|states| (current, states))
                    }
                    _ => None,
                },
            };
            let Some((current, states)) = stale else {
                break;
            };
            for (tuple, diff) in states {
                if diff != 0 {
                    return Err(Error::TimelineOrder { timestamp: current });
                }
                self.fold_step(&tuple, 0, current)?;
            }
        }

        let states = self
            .folding
            .as_mut()
            .and_then(|folding| folding.remove(&timestamp));
        let mut result = Vec::new();
        for (tuple, diff) in states.into_iter().flatten() {
            let changes = self.fold_step(&tuple, diff, timestamp)?;
            if !changes.is_empty() {
                result.push((tuple, changes));
            }
        }
        Ok(result)
    }

    fn fold_step(&mut self, tuple: &Tuple, state_diff: i32, timestamp: Timestamp) -> Result<Diff> {
        let mut diff = Diff::new();
        let next = {
            let counters = self.counters.entry(tuple.clone()).or_default();
            let counter = counter_in(counters, timestamp);
            let old = counter.cumulative;
            counter.cumulative += state_diff;
            let new = counter.cumulative;
            let next = counters
                .range((Bound::Excluded(timestamp), Bound::Unbounded))
                .next()
                .map(|(&t, _)| t);
            if state_diff != 0 {
                lazy_step(state_diff, old, new, timestamp, next, &mut diff)?;
            }
            next
        };
        gc_counter(&mut self.counters, tuple, timestamp);
        if state_diff == 0 {
            return Ok(diff);
        }
        self.update_timeline(tuple, &diff)?;
        if let Some(next) = next {
            // the incoming change carries over, not the counter's own diff
            self.add_folding_state(tuple.clone(), state_diff, next);
        }
        Ok(diff)
    }

    fn update_timeline(&mut self, tuple: &Tuple, diff: &Diff) -> Result<()> {
        if diff.is_empty() {
            return Ok(());
        }
        let timeline = match self.timelines.get(tuple) {
            Some(old) => old.merge_additive(diff)?,
            None => Timeline::empty().merge_additive(diff)?,
        };
        if timeline.is_present_at_infinity() {
            self.present_at_infinity.insert(tuple.clone());
        } else {
            self.present_at_infinity.remove(tuple);
        }
        if timeline.is_empty() {
            self.timelines.remove(tuple);
        } else {
            self.timelines.insert(tuple.clone(), timeline);
        }
        Ok(())
    }

    /// The current timeline of `tuple`.
    pub fn timeline(&self, tuple: &Tuple) -> Option<&Timeline> {
        self.timelines.get(tuple)
    }

    /// Every tuple with a non-empty timeline.
    pub fn timelines(&self) -> impl Iterator<Item = (&Tuple, &Timeline)> + '_ {
        self.timelines.iter()
    }

    /// Tuples whose timeline ends with an insertion.
    pub fn tuples_at_infinity(&self) -> impl Iterator<Item = &Tuple> + '_ {
        self.present_at_infinity.iter()
    }

    #[inline]
    pub fn count_at_infinity(&self) -> usize {
        self.present_at_infinity.len()
    }

    #[inline]
    pub fn is_present_at_infinity(&self, tuple: &Tuple) -> bool {
        self.present_at_infinity.contains(tuple)
    }

    /// The multiplicity of `tuple` after its last recorded timestamp.
    pub fn multiplicity_at_infinity(&self, tuple: &Tuple) -> u32 {
        self.counters
            .get(tuple)
            .and_then(|counters| counters.values().next_back())
            .map_or(0, |c| c.cumulative.max(0) as u32)
    }

    /// Returns true if the memory holds no counters at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Number of tuples with counters.
    #[inline]
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    #[inline]
    pub fn contains(&self, tuple: &Tuple) -> bool {
        self.counters.contains_key(tuple)
    }

    pub fn clear(&mut self) {
        self.counters.clear();
        self.timelines.clear();
        self.present_at_infinity.clear();
        if let Some(folding) = self.folding.as_mut() {
            folding.clear();
        }
    }
}

/// The counter at `timestamp`, created with the cumulative count inherited
/// from the previous timestamp.
fn counter_in(counters: &mut CounterMap, timestamp: Timestamp) -> &mut CumulativeCounter {
    let inherited = counters
        .range(..timestamp)
        .next_back()
        .map_or(0, |(_, c)| c.cumulative);
    counters.entry(timestamp).or_insert(CumulativeCounter {
        diff: 0,
        cumulative: inherited,
    })
}

fn counter_at<'a, S: BuildHasher>(
    counters: &'a mut HashMap<Tuple, CounterMap, S>,
    tuple: &Tuple,
    timestamp: Timestamp,
) -> &'a mut CumulativeCounter {
    counter_in(counters.entry(tuple.clone()).or_default(), timestamp)
}

fn gc_counter<S: BuildHasher>(
    counters: &mut HashMap<Tuple, CounterMap, S>,
    tuple: &Tuple,
    timestamp: Timestamp,
) {
    if let Some(map) = counters.get_mut(tuple) {
        if map.get(&timestamp).is_some_and(|c| c.diff == 0) {
            map.remove(&timestamp);
        }
        if map.is_empty() {
            counters.remove(tuple);
        }
    }
}

fn eager_step(
    direction: Direction,
    counter: &CumulativeCounter,
    previous: SignChange,
    timestamp: Timestamp,
    diff: &mut Diff,
) -> Result<SignChange> {
    match direction {
        Direction::Insert => {
            if counter.cumulative <= 0 {
                return Err(Error::NegativeCount);
            }
            if counter.cumulative == 1 {
                if previous == SignChange::BecamePositive {
                    // two consecutive timestamps cannot both become positive
                    return Err(Error::TimelineCancel { timestamp });
                }
                diff.push(Signed::insert(timestamp));
                Ok(SignChange::BecamePositive)
            } else {
                if previous == SignChange::BecamePositive {
                    diff.push(Signed::delete(timestamp));
                }
                Ok(SignChange::Irrelevant)
            }
        }
        Direction::Delete => {
            if counter.cumulative < 0 {
                return Err(Error::NegativeCount);
            }
            if counter.cumulative == 0 {
                if previous == SignChange::BecameZero {
                    return Err(Error::TimelineCancel { timestamp });
                }
                diff.push(Signed::delete(timestamp));
                Ok(SignChange::BecameZero)
            } else {
                if previous == SignChange::BecameZero {
                    diff.push(Signed::insert(timestamp));
                }
                Ok(SignChange::Irrelevant)
            }
        }
    }
}

fn lazy_step(
    state_diff: i32,
    old: i32,
    new: i32,
    timestamp: Timestamp,
    next: Option<Timestamp>,
    diff: &mut Diff,
) -> Result<()> {
    if new < 0 || (state_diff > 0 && new == 0) {
        return Err(Error::NegativeCount);
    }
    let (here, after) = if state_diff > 0 && old == 0 {
        (Direction::Insert, Direction::Delete)
    } else if state_diff < 0 && new == 0 {
        (Direction::Delete, Direction::Insert)
    } else {
        return Ok(());
    };
    diff.push(Signed::new(here, timestamp));
    if let Some(next) = next {
        diff.push(Signed::new(after, next));
    }
    Ok(())
}
