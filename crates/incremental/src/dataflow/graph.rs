//! Node arena.

use crate::dataflow::node::Node;
use crate::dataflow::NodeId;
use crate::error::{Error, Result};

#[derive(Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Owns every node of a network, addressed by [`NodeId`].
///
/// A slot is empty either because its node was removed or because the node
/// is temporarily checked out while it processes an update. Removed slots go
/// on a free list and are handed out again with the next generation.
#[derive(Default)]
pub struct NodeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl NodeArena {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Adds a node and returns its id.
    pub fn insert(&mut self, node: Node) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId::with_generation(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId::new(index)
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let slot = self.slot_mut(id)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index() as u32);
        self.live -= 1;
        Some(node)
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
    }

    pub fn get(&self, id: NodeId) -> Result<&Node> {
        self.slot(id)
            .and_then(|slot| slot.node.as_ref())
            .ok_or(Error::UnknownNode(id))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.slot_mut(id)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(Error::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_ok()
    }

    /// Checks a node out for exclusive processing; pair with [`NodeArena::put_back`].
    pub fn take(&mut self, id: NodeId) -> Result<Node> {
        self.slot_mut(id)
            .and_then(|slot| slot.node.take())
            .ok_or(Error::UnknownNode(id))
    }

    pub fn put_back(&mut self, id: NodeId, node: Node) {
        if let Some(slot) = self.slot_mut(id) {
            slot.node = Some(node);
        }
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots, live or free.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.iter().map(|(id, _)| id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.node
                .as_ref()
                .map(|n| (NodeId::with_generation(i as u32, slot.generation), n))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (NodeId, &mut Node)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(i, slot)| {
            let generation = slot.generation;
            slot.node
                .as_mut()
                .map(|n| (NodeId::with_generation(i as u32, generation), n))
        })
    }
}
