//! Per-node message queues.
//!
//! A mailbox collects the updates posted to a node between deliveries and
//! cancels opposite updates of the same tuple. Four kinds exist:
//!
//! - default: one net-count queue;
//! - splitting: separate monotone and anti-monotone queues, used at the
//!   boundary of a recursive group so deletions arriving from outside can be
//!   delivered before insertions;
//! - poset-aware: one queue whose deletions are classified at delivery time
//!   against dominating insertions of the same core group;
//! - timely: one net-count queue per timestamp, delivered in timestamp order.

use crate::operators::PosetInfo;
use indexmap::IndexMap;
use rete_core::{Direction, Result, Timestamp, Tuple};
use std::collections::BTreeMap;

/// Net counts per tuple, in first-posted order.
type Queue = IndexMap<Tuple, i32>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MailboxKind {
    Default,
    Splitting,
    PosetAware,
    Timely,
}

/// Which messages a timeless delivery round may take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryPhase {
    AntiMonotone,
    Monotone,
    All,
}

/// One delivered update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub direction: Direction,
    pub tuple: Tuple,
    pub timestamp: Timestamp,
    /// False for deletions that may retract support other derivations rely on.
    pub monotone: bool,
}

enum Queues {
    Default(Queue),
    Splitting { monotone: Queue, anti_monotone: Queue },
    PosetAware { queue: Queue, poset: PosetInfo },
    Timely(BTreeMap<Timestamp, Queue>),
}

pub struct Mailbox {
    queues: Queues,
}

fn post_into(queue: &mut Queue, tuple: Tuple, delta: i32) {
    let count = queue.entry(tuple.clone()).or_insert(0);
    *count += delta;
    if *count == 0 {
        queue.shift_remove(&tuple);
    }
}

fn push_messages(
    tuple: &Tuple,
    count: i32,
    timestamp: Timestamp,
    monotone: bool,
    into: &mut Vec<Message>,
) {
    let Some(direction) = Direction::of_count(count) else {
        return;
    };
    let monotone = monotone || direction == Direction::Insert;
    for _ in 0..count.unsigned_abs() {
        into.push(Message {
            direction,
            tuple: tuple.clone(),
            timestamp,
            monotone,
        });
    }
}

fn expand(queue: Queue, timestamp: Timestamp, monotone: bool, into: &mut Vec<Message>) {
    for (tuple, count) in &queue {
        push_messages(tuple, *count, timestamp, monotone, into);
    }
}

impl Mailbox {
    pub fn new(kind: MailboxKind, poset: Option<PosetInfo>) -> Self {
        let queues = match (kind, poset) {
            (MailboxKind::Timely, _) => Queues::Timely(BTreeMap::new()),
            (MailboxKind::Splitting, _) => Queues::Splitting {
                monotone: Queue::new(),
                anti_monotone: Queue::new(),
            },
            (MailboxKind::PosetAware, Some(poset)) => Queues::PosetAware {
                queue: Queue::new(),
                poset,
            },
            (MailboxKind::Default | MailboxKind::PosetAware, _) => Queues::Default(Queue::new()),
        };
        Self { queues }
    }

    pub fn kind(&self) -> MailboxKind {
        match self.queues {
            Queues::Default(_) => MailboxKind::Default,
            Queues::Splitting { .. } => MailboxKind::Splitting,
            Queues::PosetAware { .. } => MailboxKind::PosetAware,
            Queues::Timely(_) => MailboxKind::Timely,
        }
    }

    pub fn post(&mut self, direction: Direction, tuple: Tuple, timestamp: Timestamp) {
        let delta = direction.sign();
        match &mut self.queues {
            Queues::Default(queue) | Queues::PosetAware { queue, .. } => {
                post_into(queue, tuple, delta)
            }
            Queues::Splitting {
                monotone,
                anti_monotone,
            } => {
                // an update cancels a pending opposite one in the queue that holds it
                let target = match direction {
                    Direction::Insert if anti_monotone.contains_key(&tuple) => anti_monotone,
                    Direction::Insert => monotone,
                    Direction::Delete if monotone.contains_key(&tuple) => monotone,
                    Direction::Delete => anti_monotone,
                };
                post_into(target, tuple, delta);
            }
            Queues::Timely(queues) => {
                let queue = queues.entry(timestamp).or_default();
                post_into(queue, tuple, delta);
                if queue.is_empty() {
                    queues.remove(&timestamp);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.queues {
            Queues::Default(queue) | Queues::PosetAware { queue, .. } => queue.is_empty(),
            Queues::Splitting {
                monotone,
                anti_monotone,
            } => monotone.is_empty() && anti_monotone.is_empty(),
            Queues::Timely(queues) => queues.is_empty(),
        }
    }

    /// Number of pending net messages.
    pub fn len(&self) -> usize {
        fn size(queue: &Queue) -> usize {
            queue.values().map(|c| c.unsigned_abs() as usize).sum()
        }
        match &self.queues {
            Queues::Default(queue) | Queues::PosetAware { queue, .. } => size(queue),
            Queues::Splitting {
                monotone,
                anti_monotone,
            } => size(monotone) + size(anti_monotone),
            Queues::Timely(queues) => queues.values().map(size).sum(),
        }
    }

    /// Takes the timeless messages deliverable in `phase`.
    pub fn take(&mut self, phase: DeliveryPhase) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        match &mut self.queues {
            Queues::Default(queue) => {
                expand(std::mem::take(queue), Timestamp::ZERO, false, &mut messages)
            }
            Queues::Splitting {
                monotone,
                anti_monotone,
            } => {
                if phase != DeliveryPhase::Monotone {
                    expand(std::mem::take(anti_monotone), Timestamp::ZERO, false, &mut messages);
                }
                if phase != DeliveryPhase::AntiMonotone {
                    expand(std::mem::take(monotone), Timestamp::ZERO, true, &mut messages);
                }
            }
            Queues::PosetAware { queue, poset } => {
                let mut keep = Queue::new();
                for (tuple, &count) in queue.iter() {
                    let monotone = count > 0 || dominated_in(poset, queue, tuple)?;
                    let deliver = match phase {
                        DeliveryPhase::AntiMonotone => !monotone,
                        DeliveryPhase::Monotone => monotone,
                        DeliveryPhase::All => true,
                    };
                    if deliver {
                        push_messages(tuple, count, Timestamp::ZERO, monotone, &mut messages);
                    } else {
                        keep.insert(tuple.clone(), count);
                    }
                }
                *queue = keep;
            }
            Queues::Timely(queues) => {
                for (timestamp, queue) in std::mem::take(queues) {
                    expand(queue, timestamp, false, &mut messages);
                }
            }
        }
        Ok(messages)
    }

    /// The lowest timestamp with pending messages.
    pub fn lowest_timestamp(&self) -> Option<Timestamp> {
        match &self.queues {
            Queues::Timely(queues) => queues.keys().next().copied(),
            _ if self.is_empty() => None,
            _ => Some(Timestamp::ZERO),
        }
    }

    /// Takes the messages posted at `timestamp`.
    pub fn take_at(&mut self, timestamp: Timestamp) -> Vec<Message> {
        let mut messages = Vec::new();
        if let Queues::Timely(queues) = &mut self.queues {
            if let Some(queue) = queues.remove(&timestamp) {
                expand(queue, timestamp, false, &mut messages);
            }
        }
        messages
    }

    /// Moves every pending message into a mailbox of another kind.
    pub fn migrate(mut self, kind: MailboxKind, poset: Option<PosetInfo>) -> Result<Mailbox> {
        let mut target = Mailbox::new(kind, poset);
        for message in self.take(DeliveryPhase::All)? {
            let timestamp = match kind {
                MailboxKind::Timely => message.timestamp,
                _ => Timestamp::ZERO,
            };
            target.post(message.direction, message.tuple, timestamp);
        }
        Ok(target)
    }

    pub fn clear(&mut self) {
        match &mut self.queues {
            Queues::Default(queue) | Queues::PosetAware { queue, .. } => queue.clear(),
            Queues::Splitting {
                monotone,
                anti_monotone,
            } => {
                monotone.clear();
                anti_monotone.clear();
            }
            Queues::Timely(queues) => queues.clear(),
        }
    }
}

/// True if a pending insertion dominates the deletion of `tuple`.
fn dominated_in(poset: &PosetInfo, queue: &Queue, tuple: &Tuple) -> Result<bool> {
    for (other, &count) in queue {
        if count > 0 && poset.dominates(tuple, other)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rete_core::{tuple, TupleMask};

    fn directions(messages: &[Message]) -> Vec<(Direction, Tuple, bool)> {
        messages
            .iter()
            .map(|m| (m.direction, m.tuple.clone(), m.monotone))
            .collect()
    }

    #[test]
    fn test_default_cancels_opposites() {
        let mut mailbox = Mailbox::new(MailboxKind::Default, None);
        mailbox.post(Direction::Insert, tuple![1], Timestamp::ZERO);
        mailbox.post(Direction::Delete, tuple![1], Timestamp::ZERO);
        assert!(mailbox.is_empty());

        mailbox.post(Direction::Insert, tuple![2], Timestamp::ZERO);
        mailbox.post(Direction::Insert, tuple![2], Timestamp::ZERO);
        assert_eq!(mailbox.len(), 2);
        let messages = mailbox.take(DeliveryPhase::All).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_splitting_separates_phases() {
        let mut mailbox = Mailbox::new(MailboxKind::Splitting, None);
        mailbox.post(Direction::Insert, tuple![1], Timestamp::ZERO);
        mailbox.post(Direction::Delete, tuple![2], Timestamp::ZERO);

        let first = mailbox.take(DeliveryPhase::AntiMonotone).unwrap();
        assert_eq!(directions(&first), vec![(Direction::Delete, tuple![2], false)]);
        let second = mailbox.take(DeliveryPhase::Monotone).unwrap();
        assert_eq!(directions(&second), vec![(Direction::Insert, tuple![1], true)]);
    }

    #[test]
    fn test_splitting_cancels_across_queues() {
        let mut mailbox = Mailbox::new(MailboxKind::Splitting, None);
        mailbox.post(Direction::Delete, tuple![1], Timestamp::ZERO);
        mailbox.post(Direction::Insert, tuple![1], Timestamp::ZERO);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_poset_aware_classifies_dominated_deletes() {
        // (key, level): a higher level replaces a lower one
        let poset = PosetInfo::new(
            TupleMask::select_single(0, 2).unwrap(),
            TupleMask::select_single(1, 2).unwrap(),
            |low: &Tuple, high: &Tuple| low.value(0) <= high.value(0),
        );
        let mut mailbox = Mailbox::new(MailboxKind::PosetAware, Some(poset));
        mailbox.post(Direction::Delete, tuple!["a", 1], Timestamp::ZERO);
        mailbox.post(Direction::Insert, tuple!["a", 2], Timestamp::ZERO);
        mailbox.post(Direction::Delete, tuple!["b", 1], Timestamp::ZERO);

        let anti = mailbox.take(DeliveryPhase::AntiMonotone).unwrap();
        assert_eq!(directions(&anti), vec![(Direction::Delete, tuple!["b", 1], false)]);
        let rest = mailbox.take(DeliveryPhase::Monotone).unwrap();
        assert_eq!(
            directions(&rest),
            vec![
                (Direction::Delete, tuple!["a", 1], true),
                (Direction::Insert, tuple!["a", 2], true),
            ]
        );
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_timely_orders_by_timestamp() {
        let mut mailbox = Mailbox::new(MailboxKind::Timely, None);
        mailbox.post(Direction::Insert, tuple![1], Timestamp::new(3));
        mailbox.post(Direction::Insert, tuple![2], Timestamp::new(1));
        assert_eq!(mailbox.lowest_timestamp(), Some(Timestamp::new(1)));
        let messages = mailbox.take_at(Timestamp::new(1));
        assert_eq!(messages[0].tuple, tuple![2]);
        assert_eq!(mailbox.lowest_timestamp(), Some(Timestamp::new(3)));

        let migrated = mailbox.migrate(MailboxKind::Default, None).unwrap();
        assert_eq!(migrated.kind(), MailboxKind::Default);
        assert_eq!(migrated.len(), 1);
    }
}
