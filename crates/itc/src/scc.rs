//! Strongly connected components (iterative Tarjan).

use alloc::vec::Vec;
use core::hash::Hash;
use hashbrown::{HashMap, HashSet};

struct Frame<V> {
    node: V,
    successors: Vec<V>,
    next: usize,
}

struct Tarjan<V> {
    index: HashMap<V, usize>,
    lowlink: HashMap<V, usize>,
    on_stack: HashSet<V>,
    stack: Vec<V>,
    frames: Vec<Frame<V>>,
    counter: usize,
}

impl<V: Clone + Eq + Hash> Tarjan<V> {
    fn enter(&mut self, node: V, successors: Vec<V>) {
        self.index.insert(node.clone(), self.counter);
        self.lowlink.insert(node.clone(), self.counter);
        self.counter += 1;
        self.on_stack.insert(node.clone());
        self.stack.push(node.clone());
        self.frames.push(Frame {
            node,
            successors,
            next: 0,
        });
    }

    fn lower(&mut self, node: &V, value: usize) {
        if let Some(low) = self.lowlink.get_mut(node) {
            *low = (*low).min(value);
        }
    }
}

/// Computes the strongly connected components of the subgraph induced by
/// `nodes`. Successors outside `nodes` are ignored.
///
/// Components are returned in reverse topological order (sinks first).
pub fn strongly_connected_components<V, F, I>(nodes: &[V], mut successors: F) -> Vec<Vec<V>>
where
    V: Clone + Eq + Hash,
    F: FnMut(&V) -> I,
    I: IntoIterator<Item = V>,
{
    let member: HashSet<&V> = nodes.iter().collect();
    let mut neighbours = |node: &V| -> Vec<V> {
        successors(node)
            .into_iter()
            .filter(|s| member.contains(s))
            .collect()
    };
    let mut state = Tarjan {
        index: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: HashSet::new(),
        stack: Vec::new(),
        frames: Vec::new(),
        counter: 0,
    };
    let mut components = Vec::new();

    for start in nodes {
        if state.index.contains_key(start) {
            continue;
        }
        let succ = neighbours(start);
        state.enter(start.clone(), succ);

        while let Some(frame) = state.frames.last_mut() {
            if frame.next < frame.successors.len() {
                let next = frame.successors[frame.next].clone();
                frame.next += 1;
                let node = frame.node.clone();
                match state.index.get(&next).copied() {
                    None => {
                        let succ = neighbours(&next);
                        state.enter(next, succ);
                    }
                    Some(next_index) => {
                        if state.on_stack.contains(&next) {
                            state.lower(&node, next_index);
                        }
                    }
                }
                continue;
            }

            let Some(done) = state.frames.pop() else {
                break;
            };
            let low = state.lowlink.get(&done.node).copied().unwrap_or(0);
            if let Some(parent) = state.frames.last().map(|f| f.node.clone()) {
                state.lower(&parent, low);
            }
            if state.index.get(&done.node).copied() == Some(low) {
                let mut component = Vec::new();
                while let Some(v) = state.stack.pop() {
                    state.on_stack.remove(&v);
                    let is_root = v == done.node;
                    component.push(v);
                    if is_root {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }
    components
}
