//! Incremental join over two indexers.

use crate::dataflow::{NodeId, Side};
use crate::delta::Delta;
use crate::operators::{IndexView, IndexerUpdate};
use rete_core::{Result, Timeline, Tuple, TupleMask};

/// Joins the primary and secondary indexer on their signatures.
///
/// The output is the primary tuple extended with the secondary columns
/// that the secondary mask does not select.
pub struct JoinNode {
    primary: NodeId,
    secondary: NodeId,
    complementer: TupleMask,
    shared_prefix: bool,
}

impl JoinNode {
    pub fn new(
        primary: NodeId,
        secondary: NodeId,
        secondary_mask: &TupleMask,
        shared_prefix: bool,
    ) -> Self {
        Self {
            primary,
            secondary,
            complementer: secondary_mask.complementer(),
            shared_prefix,
        }
    }

    pub fn primary(&self) -> NodeId {
        self.primary
    }

    pub fn secondary(&self) -> NodeId {
        self.secondary
    }

    /// Number of columns appended to a primary tuple.
    pub fn complementer_arity(&self) -> usize {
        self.complementer.arity()
    }

    #[inline]
    fn unify(&self, primary: &Tuple, secondary: &Tuple) -> Result<Tuple> {
        self.complementer
            .combine(primary, secondary, self.shared_prefix, true)
    }

    fn unify_side(&self, side: Side, update: &Tuple, opposite: &Tuple) -> Result<Tuple> {
        match side {
            Side::Secondary => self.unify(opposite, update),
            Side::Primary | Side::Both => self.unify(update, opposite),
        }
    }

    /// Reacts to an indexer notification on `side`.
    pub fn notify(
        &self,
        side: Side,
        update: &IndexerUpdate,
        primary: IndexView<'_>,
        secondary: IndexView<'_>,
        timely: bool,
    ) -> Result<Vec<Delta>> {
        let opposite = match side {
            Side::Primary => secondary,
            Side::Secondary | Side::Both => primary,
        };
        if timely {
            self.notify_timely(side, update, opposite)
        } else {
            self.notify_timeless(side, update, opposite)
        }
    }

    fn notify_timeless(
        &self,
        side: Side,
        update: &IndexerUpdate,
        opposite: IndexView<'_>,
    ) -> Result<Vec<Delta>> {
        let IndexerUpdate {
            direction,
            tuple,
            signature,
            timestamp,
            ..
        } = update;
        let group = opposite.group(signature);
        let mut output = Vec::new();
        let mut emit = |t: Tuple, times: u32| {
            for _ in 0..times {
                output.push(Delta::new(*direction, t.clone(), *timestamp));
            }
        };
        if side != Side::Both {
            for (other, count) in &group {
                emit(self.unify_side(side, tuple, other)?, *count);
            }
            return Ok(output);
        }
        // the group already reflects the update
        let inserted = direction.sign() > 0;
        for (other, count) in &group {
            let reverse = if inserted && other == tuple {
                count - 1
            } else {
                *count
            };
            emit(self.unify(tuple, other)?, *count);
            emit(self.unify(other, tuple)?, reverse);
        }
        if !inserted {
            emit(self.unify(tuple, tuple)?, 1);
        }
        Ok(output)
    }

    fn notify_timely(
        &self,
        side: Side,
        update: &IndexerUpdate,
        opposite: IndexView<'_>,
    ) -> Result<Vec<Delta>> {
        let changed_from = Timeline::present_from(update.timestamp);
        let mut output = Vec::new();
        for (other, timeline) in opposite.timelines(&update.signature) {
            if side == Side::Both && other == update.tuple {
                continue;
            }
            let overlap = changed_from.merge_multiplicative(&timeline);
            if overlap.is_empty() {
                continue;
            }
            let forward = self.unify_side(side, &update.tuple, &other)?;
            let backward = match side {
                Side::Both => Some(self.unify(&other, &update.tuple)?),
                Side::Primary | Side::Secondary => None,
            };
            for change in overlap.to_diff() {
                let direction = update.direction.multiply(change.direction);
                output.push(Delta::new(direction, forward.clone(), change.payload));
                if let Some(backward) = &backward {
                    output.push(Delta::new(direction, backward.clone(), change.payload));
                }
            }
        }
        if side == Side::Both {
            output.push(Delta::new(
                update.direction,
                self.unify(&update.tuple, &update.tuple)?,
                update.timestamp,
            ));
        }
        Ok(output)
    }

    /// The current join result, with multiplicities.
    pub fn pull(&self, primary: IndexView<'_>, secondary: IndexView<'_>) -> Result<Vec<Tuple>> {
        let mut output = Vec::new();
        for signature in primary.signatures() {
            let opposites = secondary.group(&signature);
            if opposites.is_empty() {
                continue;
            }
            for (p, p_count) in primary.group(&signature) {
                for (s, s_count) in &opposites {
                    let joined = self.unify(&p, s)?;
                    for _ in 0..p_count * s_count {
                        output.push(joined.clone());
                    }
                }
            }
        }
        Ok(output)
    }

    /// The current join result with merged timelines.
    pub fn pull_with_timelines(
        &self,
        primary: IndexView<'_>,
        secondary: IndexView<'_>,
    ) -> Result<Vec<(Tuple, Timeline)>> {
        let mut output = Vec::new();
        for signature in primary.signatures() {
            let opposites = secondary.timelines(&signature);
            for (p, p_timeline) in primary.timelines(&signature) {
                for (s, s_timeline) in &opposites {
                    let merged = p_timeline.merge_multiplicative(s_timeline);
                    if !merged.is_empty() {
                        output.push((self.unify(&p, s)?, merged));
                    }
                }
            }
        }
        Ok(output)
    }
}
