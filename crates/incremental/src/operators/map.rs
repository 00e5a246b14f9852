//! Projection and per-tuple mapping.

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use rete_core::{Direction, Error, Result, Tuple, TupleMask};
use std::fmt;
use std::sync::Arc;

/// User mapping closure.
pub type TupleMapper = Arc<dyn Fn(&Tuple) -> Tuple + Send + Sync>;

/// Projects each tuple through a mask.
///
/// The output is a multiset: two inputs with the same projection produce
/// two outputs. A downstream uniqueness node removes duplicates.
#[derive(Clone, Debug)]
pub struct TrimmerNode {
    mask: TupleMask,
}

impl TrimmerNode {
    pub fn new(mask: TupleMask) -> Self {
        Self { mask }
    }

    #[inline]
    pub fn mask(&self) -> &TupleMask {
        &self.mask
    }

    #[inline]
    pub fn apply(&self, tuple: &Tuple) -> Result<Tuple> {
        self.mask.transform(tuple)
    }
}

/// Maps each tuple with a closure, preserving direction.
///
/// The output of every input tuple is cached, so a deletion withdraws exactly
/// the tuple its insertion produced even if the closure is not
/// deterministic. Cached inputs are counted; a timely retraction may arrive
/// before the insertion it cancels, which leaves a negative count until then.
pub struct TransformerNode {
    mapper: TupleMapper,
    output_arity: Option<usize>,
    cache: HashMap<Tuple, (Tuple, i32)>,
}

impl TransformerNode {
    pub fn new<F>(mapper: F, output_arity: Option<usize>) -> Self
    where
        F: Fn(&Tuple) -> Tuple + Send + Sync + 'static,
    {
        Self {
            mapper: Arc::new(mapper),
            output_arity,
            cache: HashMap::new(),
        }
    }

    pub fn output_arity(&self) -> Option<usize> {
        self.output_arity
    }

    /// Maps one update; `timely` tolerates retractions ahead of insertions.
    pub fn update(&mut self, direction: Direction, tuple: Tuple, timely: bool) -> Result<Tuple> {
        if direction == Direction::Delete && !timely && !self.cache.contains_key(&tuple) {
            return Err(Error::DuplicateDeletion);
        }
        let output = match self.cache.entry(tuple) {
            Entry::Occupied(mut occupied) => {
                let (output, count) = occupied.get_mut();
                *count += direction.sign();
                let output = output.clone();
                if *count == 0 {
                    occupied.remove();
                }
                output
            }
            Entry::Vacant(vacant) => {
                let output = (self.mapper)(vacant.key());
                vacant.insert((output.clone(), direction.sign()));
                output
            }
        };
        Ok(output)
    }

    /// Cached output of a present input, or a fresh evaluation.
    pub fn output_of(&self, tuple: &Tuple) -> Tuple {
        match self.cache.get(tuple) {
            Some((output, _)) => output.clone(),
            None => (self.mapper)(tuple),
        }
    }

    /// Outputs of every present input, with multiplicity.
    pub fn tuples(&self) -> Vec<Tuple> {
        self.cache
            .values()
            .filter(|(_, count)| *count > 0)
            .flat_map(|(output, count)| std::iter::repeat(output.clone()).take(*count as usize))
            .collect()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

impl fmt::Debug for TransformerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformerNode")
            .field("output_arity", &self.output_arity)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rete_core::{tuple, Value};
    use std::sync::atomic::{AtomicI64, Ordering};

    #[test]
    fn test_trimmer_projects() {
        let trimmer = TrimmerNode::new(TupleMask::new(vec![2, 0], 3).unwrap());
        assert_eq!(trimmer.apply(&tuple![1, 2, 3]).unwrap(), tuple![3, 1]);
        assert!(trimmer.apply(&tuple![1, 2]).is_err());
    }

    fn double() -> TransformerNode {
        TransformerNode::new(
            |t: &Tuple| {
                let v = t.value(0).and_then(Value::as_i64).unwrap_or_default();
                Tuple::new(vec![Value::Int64(v * 2)])
            },
            Some(1),
        )
    }

    #[test]
    fn test_transformer_maps() {
        let mut node = double();
        assert_eq!(
            node.update(Direction::Insert, tuple![21], false).unwrap(),
            Tuple::new(vec![Value::Int64(42)])
        );
        assert_eq!(node.output_arity(), Some(1));
        assert_eq!(node.tuples(), vec![Tuple::new(vec![Value::Int64(42)])]);
    }

    #[test]
    fn test_transformer_deletion_withdraws_cached_output() {
        let calls = Arc::new(AtomicI64::new(0));
        let counter = Arc::clone(&calls);
        let mut node = TransformerNode::new(
            move |_: &Tuple| Tuple::new(vec![Value::Int64(counter.fetch_add(1, Ordering::SeqCst))]),
            Some(1),
        );
        let inserted = node.update(Direction::Insert, tuple![1], false).unwrap();
        let again = node.update(Direction::Insert, tuple![1], false).unwrap();
        assert_eq!(inserted, again);
        assert_eq!(node.update(Direction::Delete, tuple![1], false).unwrap(), inserted);
        assert_eq!(node.update(Direction::Delete, tuple![1], false).unwrap(), inserted);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(node.tuples().is_empty());
    }

    #[test]
    fn test_transformer_rejects_unknown_deletion() {
        let mut node = double();
        assert_eq!(
            node.update(Direction::Delete, tuple![1], false),
            Err(Error::DuplicateDeletion)
        );
    }

    #[test]
    fn test_timely_retraction_ahead_of_insertion() {
        let mut node = double();
        let early = node.update(Direction::Delete, tuple![3], true).unwrap();
        assert!(node.tuples().is_empty());
        assert_eq!(node.update(Direction::Insert, tuple![3], true).unwrap(), early);
        assert!(node.tuples().is_empty());
        assert_eq!(node.output_of(&tuple![3]), Tuple::new(vec![Value::Int64(6)]));
    }
}
