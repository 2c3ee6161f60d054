//! Team and player storage.
//!
//! Players live in a slot pool addressed by [`PlayerId`]. Freeing a player
//! bumps the slot generation so stale handles are detected instead of
//! silently aliasing a recycled player. Freed slots keep their name: a
//! re-allocated player gets back the name it had.

use serde::{Deserialize, Serialize};

use crate::core::Variant;
use crate::input::HardwareKey;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Stable handle to a player.
///
/// Survives moves between mates and teams. Becomes invalid when the player
/// is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId {
    slot: u32,
    generation: u32,
}

impl PlayerId {
    #[inline]
    pub(crate) fn slot(self) -> usize {
        self.slot as usize
    }
}

// =============================================================================
// DATA
// =============================================================================

/// Key of a capability bound to a key action of a player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct KeyBinding {
    /// Index into the capability classes.
    pub class: usize,
    /// Index of the capability within its class.
    pub capa: usize,
    /// The bound key.
    pub key: HardwareKey,
}

/// A player's data.
#[derive(Clone, Debug)]
pub(crate) struct PlayerData {
    pub name: String,
    /// Team number. Meaningless while the player is free.
    pub team: usize,
    /// Mate number within the team.
    pub mate: usize,
    /// Player number over all teams.
    pub number: usize,
    /// Aligned with the player options of the config.
    pub options: Vec<Variant>,
    /// Explicitly assigned capabilities as `(class, capa)` indices, oldest first.
    pub capabilities: Vec<(usize, usize)>,
    /// One entry per key action. `None` while undefined or for AI players.
    pub key_actions: Vec<Option<KeyBinding>>,
}

/// A team's data. Its team number is its position in the team list.
#[derive(Clone, Debug)]
pub(crate) struct TeamData {
    pub name: String,
    /// Aligned with the team options of the config.
    pub options: Vec<Variant>,
    pub mates: Vec<PlayerId>,
}

// =============================================================================
// PLAYER POOL
// =============================================================================

#[derive(Clone, Debug)]
struct PlayerSlot {
    generation: u32,
    live: bool,
    data: PlayerData,
}

/// Slot pool of players with a LIFO free list.
#[derive(Clone, Debug, Default)]
pub(crate) struct PlayerPool {
    slots: Vec<PlayerSlot>,
    free: Vec<u32>,
}

impl PlayerPool {
    /// Take the most recently freed slot, or create one with `make`.
    ///
    /// The returned player keeps the data it had when freed.
    pub fn alloc(&mut self, make: impl FnOnce() -> PlayerData) -> PlayerId {
        match self.free.pop() {
            Some(slot) => {
                let entry = &mut self.slots[slot as usize];
                entry.live = true;
                PlayerId { slot, generation: entry.generation }
            }
            None => {
                let slot = self.slots.len() as u32;
                self.slots.push(PlayerSlot { generation: 0, live: true, data: make() });
                PlayerId { slot, generation: 0 }
            }
        }
    }

    /// Release a player. Its handle becomes stale.
    pub fn free(&mut self, id: PlayerId) {
        if let Some(entry) = self.slots.get_mut(id.slot()) {
            if entry.live && entry.generation == id.generation {
                entry.live = false;
                entry.generation = entry.generation.wrapping_add(1);
                self.free.push(id.slot);
            }
        }
    }

    /// Forget the free list. Freed slots stay allocated but are never reused.
    pub fn forget_free(&mut self) {
        self.free.clear();
    }

    /// Live player data.
    pub fn get(&self, id: PlayerId) -> Option<&PlayerData> {
        self.slots
            .get(id.slot())
            .filter(|entry| entry.live && entry.generation == id.generation)
            .map(|entry| &entry.data)
    }

    /// Live player data, mutable.
    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut PlayerData> {
        self.slots
            .get_mut(id.slot())
            .filter(|entry| entry.live && entry.generation == id.generation)
            .map(|entry| &mut entry.data)
    }

    fn live_slot(&self, id: PlayerId) -> usize {
        debug_assert!(self.get(id).is_some(), "stale player handle {id:?}");
        id.slot()
    }

    /// Data of a live player.
    ///
    /// Callers pass only handles held in a team's mate list or just returned
    /// by [`PlayerPool::alloc`], which are live by construction. Handles from
    /// outside the engine go through [`PlayerPool::get`]. A stale handle
    /// panics in debug builds.
    pub fn data(&self, id: PlayerId) -> &PlayerData {
        &self.slots[self.live_slot(id)].data
    }

    /// Mutable counterpart of [`PlayerPool::data`].
    pub fn data_mut(&mut self, id: PlayerId) -> &mut PlayerData {
        let slot = self.live_slot(id);
        &mut self.slots[slot].data
    }
}

// =============================================================================
// TESTS
// =============================================================================
