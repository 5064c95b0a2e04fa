//! Node handles.
//!
//! Rules hold on to [`NodeId`]s across passes while the tree underneath them
//! is cleared, re-mounted and edited. A handle therefore names both a storage
//! slot and the *generation* of the node living in it: destroying a node
//! retires its generation, and a handle from an older generation never
//! resolves again, even after the slot is reused by a freshly mounted node.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Handle to a node in a [`SceneTree`](crate::tree::SceneTree).
///
/// Handles order by slot, then generation, so maps keyed by `NodeId` iterate
/// in roughly creation order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    slot: u32,
    generation: u32,
}

impl NodeId {
    #[inline]
    pub fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Storage slot in the owning tree.
    #[inline]
    pub fn slot(self) -> u32 {
        self.slot
    }

    /// How many nodes lived in this slot before this one.
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }

    /// Packed `generation << 32 | slot`, used where a single integer key is
    /// wanted (fingerprints, logs).
    #[inline]
    pub fn to_raw(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.slot)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node#{}@{}", self.slot, self.generation)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.slot, self.generation)
    }
}

#[derive(Debug, Clone, Copy)]
enum SlotState {
    Live(u32),
    /// Holds the generation the next occupant will get.
    Retired(u32),
}

/// Slot bookkeeping behind a tree: hands out [`NodeId`]s and answers whether
/// a handle still names a live node.
///
/// Retired slots are reused oldest first, which keeps a just-destroyed slot
/// out of circulation for as long as possible.
#[derive(Debug, Default)]
pub struct NodeSlots {
    states: Vec<SlotState>,
    retired: VecDeque<u32>,
    live: usize,
}

impl NodeSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a slot for a new node.
    pub fn claim(&mut self) -> NodeId {
        self.live += 1;
        if let Some(slot) = self.retired.pop_front() {
            let generation = match self.states[slot as usize] {
                SlotState::Retired(g) | SlotState::Live(g) => g,
            };
            self.states[slot as usize] = SlotState::Live(generation);
            return NodeId::new(slot, generation);
        }
        let slot = self.states.len() as u32;
        self.states.push(SlotState::Live(0));
        NodeId::new(slot, 0)
    }

    /// Retire a node's slot. Returns `false` if `id` was not live.
    pub fn retire(&mut self, id: NodeId) -> bool {
        if !self.is_live(id) {
            return false;
        }
        self.states[id.slot() as usize] = SlotState::Retired(id.generation().wrapping_add(1));
        self.retired.push_back(id.slot());
        self.live -= 1;
        true
    }

    /// `true` if `id` names the node currently living in its slot.
    pub fn is_live(&self, id: NodeId) -> bool {
        matches!(
            self.states.get(id.slot() as usize),
            Some(SlotState::Live(g)) if *g == id.generation()
        )
    }

    /// Number of live nodes.
    pub fn live_count(&self) -> usize {
        self.live
    }
}
