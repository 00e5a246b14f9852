//! Semi-join and anti-join over two indexers.

use crate::dataflow::{NodeId, Side};
use crate::delta::Delta;
use crate::operators::{IndexView, IndexerUpdate};
use rete_core::{Result, Timeline, Tuple};

/// Passes primary tuples whose signature is present (or, if negative,
/// absent) on the secondary side.
pub struct ExistenceNode {
    primary: NodeId,
    secondary: NodeId,
    negative: bool,
}

impl ExistenceNode {
    pub fn new(primary: NodeId, secondary: NodeId, negative: bool) -> Self {
        Self {
            primary,
            secondary,
            negative,
        }
    }

    pub fn primary(&self) -> NodeId {
        self.primary
    }

    pub fn secondary(&self) -> NodeId {
        self.secondary
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn notify(
        &self,
        side: Side,
        update: &IndexerUpdate,
        primary: IndexView<'_>,
        secondary: IndexView<'_>,
        timely: bool,
    ) -> Result<Vec<Delta>> {
        let mut output = Vec::new();
        match side {
            Side::Primary => {
                if secondary.contains_signature(&update.signature) != self.negative {
                    output.push(Delta::new(
                        update.direction,
                        update.tuple.clone(),
                        update.timestamp,
                    ));
                }
            }
            Side::Secondary if !update.change => {}
            Side::Secondary if timely => {
                // the secondary lives upstream; replay the primaries' own history
                for (tuple, timeline) in primary.timelines(&update.signature) {
                    for change in timeline.changes() {
                        let direction = update.direction.multiply(change.direction);
                        let direction = if self.negative {
                            direction.opposite()
                        } else {
                            direction
                        };
                        output.push(Delta::new(direction, tuple.clone(), change.payload));
                    }
                }
            }
            Side::Secondary => {
                let direction = if self.negative {
                    update.direction.opposite()
                } else {
                    update.direction
                };
                for (tuple, count) in primary.group(&update.signature) {
                    for _ in 0..count {
                        output.push(Delta::new(direction, tuple.clone(), update.timestamp));
                    }
                }
            }
            // coinciding slots: identity when positive, empty when negative
            Side::Both if self.negative => {}
            Side::Both => output.push(Delta::new(
                update.direction,
                update.tuple.clone(),
                update.timestamp,
            )),
        }
        Ok(output)
    }

    fn passes(&self, secondary: IndexView<'_>, signature: &Tuple) -> bool {
        secondary.contains_signature(signature) != self.negative
    }

    pub fn pull(&self, primary: IndexView<'_>, secondary: IndexView<'_>) -> Vec<Tuple> {
        let mut output = Vec::new();
        for signature in primary.signatures() {
            if self.passes(secondary, &signature) {
                for (tuple, count) in primary.group(&signature) {
                    output.extend(std::iter::repeat(tuple).take(count as usize));
                }
            }
        }
        output
    }

    pub fn pull_with_timelines(
        &self,
        primary: IndexView<'_>,
        secondary: IndexView<'_>,
    ) -> Vec<(Tuple, Timeline)> {
        primary
            .signatures()
            .into_iter()
            .filter(|signature| self.passes(secondary, signature))
            .flat_map(|signature| primary.timelines(&signature))
            .collect()
    }
}
