//! The editable preferences engine.
//!
//! [`StdPreferences`] keeps three things consistent with each other:
//!
//! - teams and their mates (players), with dense team and player numbers
//! - the capabilities of the plugged devices, grouped by capability class,
//!   and the player each one is explicitly assigned to
//! - per player key action bindings `(class, capability, key)` and, per
//!   capability, the reverse map `key -> (player, key action)`
//!
//! ## Modes
//!
//! In edit mode (the default) the structure can be changed and device
//! removals compact the capability arrays. In runtime mode the structure is
//! frozen: a removed capability leaves a hole that keeps its bindings, so
//! that a device unplugged during a game and plugged back in is picked up
//! again. Switching back to edit mode drops the holes.
//!
//! ## Failure
//!
//! Mutating operations return `false` instead of failing loudly: when the
//! preferences are in runtime mode, when a handle is stale, when a name is
//! unknown, or when the operation would break the [`AppConstraints`].
//!
//! Not thread safe: the engine holds `Rc`s and is driven synchronously by
//! the caller and the device manager's events.
//!
//! [`AppConstraints`]: crate::config::AppConstraints

use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::debug;
#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::config::StdConfig;
use crate::core::{OwnerType, StateHash, StateHasher, Variant};
use crate::input::{Capability, CapabilityClass, DeviceEvent, DeviceManager, HardwareKey};
use super::arena::{KeyBinding, PlayerData, PlayerId, PlayerPool, TeamData};
use super::AppPreferences;

/// Maximum length of a team name, in characters.
pub const MAX_TEAM_NAME_LENGTH: usize = 12;
/// Maximum length of a player name, in characters.
pub const MAX_PLAYER_NAME_LENGTH: usize = 12;

const TEAM_NAME_BASE: &str = "Team";
const PLAYER_NAME_BASE: &str = "Player";

#[inline]
fn count(n: i32) -> usize {
    usize::try_from(n).unwrap_or(0)
}

/// Prefix of `base` that leaves room for a space and the widest number up to `max_nr`.
fn name_base(base: &str, max_len: usize, max_nr: usize) -> String {
    let digits = max_nr.to_string().len();
    base.chars().take(max_len.saturating_sub(1 + digits)).collect()
}

// =============================================================================
// CAPABILITY DATA
// =============================================================================

#[derive(Clone, Debug, Default)]
struct CapabilitySlot {
    /// `None` only in runtime mode, after the device was removed.
    capability: Option<Rc<Capability>>,
    /// Player the capability is explicitly assigned to.
    player: Option<PlayerId>,
    /// Keys bound to key actions of players.
    keys: BTreeMap<HardwareKey, (PlayerId, usize)>,
    runtime_removed: bool,
    /// Added in runtime mode. Never referenced.
    runtime_added: bool,
}

#[derive(Clone, Debug)]
struct CapabilityClassData {
    class: CapabilityClass,
    slots: Vec<CapabilitySlot>,
    tot_assigned: usize,
}

/// Where the previous key action of the player being populated was bound.
#[derive(Clone, Copy, Debug, Default)]
struct KeyPriority {
    capa: Option<(usize, usize)>,
    default_idx: Option<usize>,
}

/// Capability search order while populating key actions.
#[derive(Clone, Copy, Debug)]
enum SlotOwner {
    Me,
    Nobody,
    NotMe,
}

// =============================================================================
// STD PREFERENCES
// =============================================================================

/// Teams, players, capability assignments and key bindings.
#[derive(Debug)]
pub struct StdPreferences {
    config: Rc<StdConfig>,
    edit_mode: bool,
    undefined_key_actions: bool,
    /// Game option values, aligned with the config's game options.
    options: Vec<Variant>,
    teams: Vec<TeamData>,
    free_teams: Vec<TeamData>,
    team_names: BTreeMap<String, usize>,
    players: PlayerPool,
    player_names: BTreeMap<String, PlayerId>,
    /// Players by number.
    player_order: Vec<PlayerId>,
    /// The only human player, if capabilities are auto assigned.
    default_player: Option<PlayerId>,
    /// Aligned with the config's capability classes.
    class_data: Vec<CapabilityClassData>,
}

impl StdPreferences {
    /// Preferences with the minimum number of teams, one human player each.
    ///
    /// The capabilities of the devices currently plugged into
    /// `device_manager` are registered in plug order. Device events
    /// produced afterwards must be passed to [`StdPreferences::handle_device_event`].
    pub fn new(config: Rc<StdConfig>, device_manager: &DeviceManager) -> Self {
        let options = Self::default_options(&config, OwnerType::Game);
        let class_data = config
            .capability_classes()
            .iter()
            .map(|&class| CapabilityClassData {
                class,
                slots: device_manager
                    .devices()
                    .iter()
                    .filter_map(|device| device.capability(class))
                    .map(|capability| CapabilitySlot { capability: Some(Rc::clone(capability)), ..Default::default() })
                    .collect(),
                tot_assigned: 0,
            })
            .collect();
        let teams_min = count(config.app_constraints().teams_min);
        let mut prefs = Self {
            config,
            edit_mode: true,
            undefined_key_actions: false,
            options,
            teams: Vec::new(),
            free_teams: Vec::new(),
            team_names: BTreeMap::new(),
            players: PlayerPool::default(),
            player_names: BTreeMap::new(),
            player_order: Vec::new(),
            default_player: None,
            class_data,
        };
        for _ in 0..teams_min {
            let team = prefs.team_alloc();
            let id = prefs.player_alloc(false);
            prefs.add_to_team(team, id);
        }
        prefs.populate();
        prefs.recalc();
        debug!("Preferences created: {} teams, {} players", prefs.tot_teams(), prefs.tot_players());
        prefs
    }

    fn default_options(config: &StdConfig, owner: OwnerType) -> Vec<Variant> {
        config.options(owner).iter().map(|(_, option)| option.default_value()).collect()
    }

    /// The shared configuration.
    pub fn config(&self) -> &Rc<StdConfig> {
        &self.config
    }

    /// Whether the structure can be edited.
    pub fn is_in_edit_mode(&self) -> bool {
        self.edit_mode
    }

    /// Capability classes, in config order.
    pub fn capability_classes(&self) -> Vec<CapabilityClass> {
        self.class_data.iter().map(|data| data.class).collect()
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    fn team_alloc(&mut self) -> usize {
        let max_teams = count(self.config.app_constraints().max_teams());
        let base = name_base(TEAM_NAME_BASE, MAX_TEAM_NAME_LENGTH, max_teams);
        let mut team = self
            .free_teams
            .pop()
            .unwrap_or_else(|| TeamData { name: base.clone(), options: Vec::new(), mates: Vec::new() });
        if self.team_names.contains_key(&team.name) {
            if let Some(name) = (1..=max_teams)
                .map(|nr| format!("{} {}", base, nr))
                .find(|name| !self.team_names.contains_key(name))
            {
                team.name = name;
            }
        }
        team.options = Self::default_options(&self.config, OwnerType::Team);
        team.mates.clear();
        let idx = self.teams.len();
        self.team_names.insert(team.name.clone(), idx);
        self.teams.push(team);
        idx
    }

    /// Allocate a player that is not yet in a team.
    fn player_alloc(&mut self, ai: bool) -> PlayerId {
        let max_players = count(self.config.app_constraints().max_players());
        let base = name_base(PLAYER_NAME_BASE, MAX_PLAYER_NAME_LENGTH, max_players);
        let tot_key_actions = self.config.tot_key_actions();
        let id = self.players.alloc(|| PlayerData {
            name: base.clone(),
            team: 0,
            mate: 0,
            number: 0,
            options: Vec::new(),
            capabilities: Vec::new(),
            key_actions: vec![None; tot_key_actions],
        });
        let mut name = self.players.data(id).name.clone();
        if self.player_names.contains_key(&name) {
            if let Some(free) = (1..max_players)
                .map(|nr| format!("{} {}", base, nr))
                .find(|candidate| !self.player_names.contains_key(candidate))
            {
                name = free;
            }
        }
        let mut options = Self::default_options(&self.config, OwnerType::Player);
        if let Some(value) = options.get_mut(self.config.ai_option_index(OwnerType::Player)) {
            *value = Variant::Bool(ai);
        }
        let data = self.players.data_mut(id);
        data.name = name.clone();
        data.options = options;
        data.capabilities.clear();
        data.key_actions = vec![None; tot_key_actions];
        self.player_names.insert(name, id);
        if !ai {
            self.undefined_key_actions = true;
        }
        id
    }

    fn add_to_team(&mut self, team: usize, id: PlayerId) {
        let mates = &mut self.teams[team].mates;
        let mate = mates.len();
        mates.push(id);
        let data = self.players.data_mut(id);
        data.team = team;
        data.mate = mate;
    }

    fn remove_from_team(&mut self, id: PlayerId) {
        let (team, mate) = {
            let data = self.players.data(id);
            (data.team, data.mate)
        };
        let mates = &mut self.teams[team].mates;
        mates.remove(mate);
        for (nr, &mate_id) in mates.iter().enumerate().skip(mate) {
            self.players.data_mut(mate_id).mate = nr;
        }
    }

    /// Drop the capabilities and key bindings of a player.
    fn unbind_player(&mut self, id: PlayerId) {
        let data = self.players.data_mut(id);
        let capabilities = std::mem::take(&mut data.capabilities);
        let bindings: Vec<KeyBinding> = data.key_actions.iter_mut().filter_map(Option::take).collect();
        for (class, capa) in capabilities {
            self.class_data[class].slots[capa].player = None;
        }
        for binding in bindings {
            self.class_data[binding.class].slots[binding.capa].keys.remove(&binding.key);
        }
    }

    /// Free a player already removed from its team.
    fn player_free(&mut self, id: PlayerId) {
        self.unbind_player(id);
        let name = self.players.data(id).name.clone();
        self.player_names.remove(&name);
        self.players.free(id);
    }

    fn team_free_last(&mut self) {
        let Some(mut team) = self.teams.pop() else {
            return;
        };
        for id in std::mem::take(&mut team.mates) {
            self.player_free(id);
        }
        self.team_names.remove(&team.name);
        self.free_teams.push(team);
    }

    /// Restore numbers, the default player and assignment counts.
    fn recalc(&mut self) {
        let order: Vec<PlayerId> = self.teams.iter().flat_map(|team| team.mates.iter().copied()).collect();
        for (number, &id) in order.iter().enumerate() {
            self.players.data_mut(id).number = number;
        }
        let mut humans = order.iter().copied().filter(|&id| !self.is_ai(id));
        let first_human = humans.next();
        let single_human = first_human.filter(|_| humans.next().is_none());
        self.default_player = single_human.filter(|_| self.config.is_auto_assign_to_active_player());
        for data in &mut self.class_data {
            data.tot_assigned = data.slots.iter().filter(|slot| slot.player.is_some()).count();
        }
        self.player_order = order;
    }

    fn is_ai(&self, id: PlayerId) -> bool {
        let ai_idx = self.config.ai_option_index(OwnerType::Player);
        self.players.data(id).options.get(ai_idx).is_some_and(Variant::as_bool)
    }

    fn team_tot_ai(&self, team: usize) -> usize {
        self.teams[team].mates.iter().filter(|&&id| self.is_ai(id)).count()
    }

    /// Whether a non-empty team has only AI mates.
    fn is_ai_team(&self, team: usize) -> bool {
        let mates = self.teams[team].mates.len();
        mates > 0 && self.team_tot_ai(team) == mates
    }

    // =========================================================================
    // Key action population
    // =========================================================================

    /// Bind every undefined key action of every human player, if possible.
    fn populate(&mut self) {
        if !self.undefined_key_actions {
            return;
        }
        self.undefined_key_actions = false;
        let ids: Vec<PlayerId> = self.teams.iter().flat_map(|team| team.mates.iter().copied()).collect();
        for id in ids {
            if self.is_ai(id) {
                continue;
            }
            let mut priority = KeyPriority::default();
            for ka in 0..self.config.tot_key_actions() {
                if self.players.data(id).key_actions[ka].is_some() {
                    continue;
                }
                match self.find_key(id, ka, &mut priority) {
                    Some(binding) => {
                        #[cfg(feature = "debug-tracing")]
                        trace!(
                            "Player {} key action {} bound to class {} capability {} key {}",
                            self.players.data(id).name,
                            ka,
                            binding.class,
                            binding.capa,
                            binding.key
                        );
                        self.class_data[binding.class].slots[binding.capa].keys.insert(binding.key, (id, ka));
                        self.players.data_mut(id).key_actions[ka] = Some(binding);
                    }
                    None => self.undefined_key_actions = true,
                }
            }
        }
    }

    /// Find a free key for key action `ka` of a player.
    ///
    /// Searched in order: the capability of the previous binding (first the
    /// same default key position, then any default key), the default keys
    /// of the player's capabilities, of unassigned capabilities and of the
    /// other players' capabilities. As a last resort the first capability
    /// met during the search gets its first free key.
    fn find_key(&self, id: PlayerId, ka: usize, priority: &mut KeyPriority) -> Option<KeyBinding> {
        let key_action = self.config.key_action(ka);
        let is_free = |class: usize, capa: usize, key: HardwareKey| !self.class_data[class].slots[capa].keys.contains_key(&key);
        let mut fallback: Option<(usize, usize)> = None;

        if let Some((class, capa)) = priority.capa {
            fallback = Some((class, capa));
            let keys = key_action.class_default_keys(self.class_data[class].class);
            let preferred = priority.default_idx.into_iter();
            for idx in preferred.chain(0..keys.len()) {
                if let Some(&key) = keys.get(idx) {
                    if is_free(class, capa, key) {
                        priority.default_idx = Some(idx);
                        return Some(KeyBinding { class, capa, key });
                    }
                }
            }
        }

        for owner in [SlotOwner::Me, SlotOwner::Nobody, SlotOwner::NotMe] {
            for (class, data) in self.class_data.iter().enumerate() {
                let keys = key_action.class_default_keys(data.class);
                for (idx, &key) in keys.iter().enumerate() {
                    for (capa, slot) in data.slots.iter().enumerate() {
                        fallback.get_or_insert((class, capa));
                        let matches = match owner {
                            SlotOwner::Me => slot.player == Some(id),
                            SlotOwner::Nobody => slot.player.is_none(),
                            SlotOwner::NotMe => slot.player != Some(id),
                        };
                        if matches && is_free(class, capa, key) {
                            *priority = KeyPriority { capa: Some((class, capa)), default_idx: Some(idx) };
                            return Some(KeyBinding { class, capa, key });
                        }
                    }
                }
            }
        }

        let (class, capa) = fallback?;
        let key = HardwareKey::ALL.iter().copied().find(|&key| is_free(class, capa, key))?;
        *priority = KeyPriority { capa: Some((class, capa)), default_idx: None };
        Some(KeyBinding { class, capa, key })
    }

    // =========================================================================
    // Capability references
    // =========================================================================

    /// Class and capability index of a known capability.
    fn find_capability(&self, capability_id: i32) -> Option<(usize, usize)> {
        self.class_data.iter().enumerate().find_map(|(class, data)| {
            data.slots
                .iter()
                .position(|slot| slot.capability.as_ref().is_some_and(|c| c.id() == capability_id))
                .map(|capa| (class, capa))
        })
    }

    /// Unbind the keys of a slot and unassign it from its player.
    fn remove_references(&mut self, class: usize, capa: usize) {
        let slot = &mut self.class_data[class].slots[capa];
        let keys = std::mem::take(&mut slot.keys);
        let player = slot.player.take();
        for (id, ka) in keys.into_values() {
            if let Some(data) = self.players.get_mut(id) {
                data.key_actions[ka] = None;
            }
            self.undefined_key_actions = true;
        }
        if let Some(data) = player.and_then(|id| self.players.get_mut(id)) {
            data.capabilities.retain(|&pair| pair != (class, capa));
        }
    }

    /// Rewrite the references to slot `from` as references to slot `to`.
    fn move_references(&mut self, class: usize, from: usize, to: usize) {
        let slot = &self.class_data[class].slots[from];
        let bound: Vec<(PlayerId, usize)> = slot.keys.values().copied().collect();
        let player = slot.player;
        for (id, ka) in bound {
            if let Some(binding) = self.players.get_mut(id).and_then(|data| data.key_actions[ka].as_mut()) {
                binding.capa = to;
            }
        }
        if let Some(data) = player.and_then(|id| self.players.get_mut(id)) {
            for pair in data.capabilities.iter_mut().filter(|pair| **pair == (class, from)) {
                pair.1 = to;
            }
        }
    }

    fn unassign_pair(&mut self, id: PlayerId, (class, capa): (usize, usize)) {
        if let Some(data) = self.players.get_mut(id) {
            data.capabilities.retain(|&pair| pair != (class, capa));
        }
        self.class_data[class].slots[capa].player = None;
    }

    // =========================================================================
    // Devices and modes
    // =========================================================================

    /// Update the capabilities after a device was plugged or unplugged.
    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        let edit = self.edit_mode;
        match event {
            DeviceEvent::Added(device) => {
                for data in &mut self.class_data {
                    let Some(capability) = device.capability(data.class) else {
                        continue;
                    };
                    if !edit {
                        if let Some(slot) = data.slots.iter_mut().find(|slot| slot.capability.is_none()) {
                            slot.capability = Some(Rc::clone(capability));
                            slot.runtime_removed = false;
                            continue;
                        }
                    }
                    data.slots.push(CapabilitySlot {
                        capability: Some(Rc::clone(capability)),
                        runtime_added: !edit,
                        ..Default::default()
                    });
                }
                debug!("Device {} added (edit mode: {})", device.id(), edit);
                if edit {
                    self.recalc();
                }
            }
            DeviceEvent::Removed(device) => {
                for class in 0..self.class_data.len() {
                    let Some(capability) = device.capability(self.class_data[class].class) else {
                        continue;
                    };
                    let Some((_, capa)) = self.find_capability(capability.id()).filter(|&(c, _)| c == class) else {
                        continue;
                    };
                    let slot = &mut self.class_data[class].slots[capa];
                    if !edit && !slot.runtime_added {
                        slot.capability = None;
                        slot.runtime_removed = true;
                        continue;
                    }
                    if edit {
                        self.remove_references(class, capa);
                    }
                    let last = self.class_data[class].slots.len() - 1;
                    if capa < last {
                        self.move_references(class, last, capa);
                    }
                    let slots = &mut self.class_data[class].slots;
                    slots.swap(capa, last);
                    slots.pop();
                }
                debug!("Device {} removed (edit mode: {})", device.id(), edit);
                if edit {
                    self.populate();
                    self.recalc();
                }
            }
        }
    }

    /// Switch between edit and runtime mode.
    ///
    /// Entering edit mode drops the capabilities removed during runtime,
    /// along with their bindings and assignments, and rebinds what was lost.
    pub fn set_edit_mode(&mut self, edit: bool) {
        if self.edit_mode == edit {
            return;
        }
        self.edit_mode = edit;
        if !edit {
            debug!("Preferences in runtime mode");
            return;
        }
        for class in 0..self.class_data.len() {
            for capa in 0..self.class_data[class].slots.len() {
                if self.class_data[class].slots[capa].capability.is_none() {
                    self.remove_references(class, capa);
                    self.undefined_key_actions = true;
                }
                let slot = &mut self.class_data[class].slots[capa];
                slot.runtime_removed = false;
                slot.runtime_added = false;
            }
            while let Some(last) = self.class_data[class].slots.len().checked_sub(1) {
                let slots = &self.class_data[class].slots;
                if slots[last].capability.is_some() {
                    let Some(hole) = slots.iter().position(|slot| slot.capability.is_none()) else {
                        break;
                    };
                    self.move_references(class, last, hole);
                    self.class_data[class].slots.swap(hole, last);
                }
                self.class_data[class].slots.pop();
            }
        }
        debug!("Preferences in edit mode");
        self.populate();
        self.recalc();
    }

    // =========================================================================
    // Capability assignment
    // =========================================================================

    /// Explicitly assign a capability to a player.
    ///
    /// If the player can't own two capabilities of the class, its current
    /// one is given to the player who owned `capability`, if any. If the
    /// player exceeds the maximum number of explicit capabilities, its
    /// second newest non playback capability is unassigned.
    pub fn assign_capability(&mut self, id: PlayerId, capability: &Rc<Capability>) -> bool {
        if !self.edit_mode || self.players.get(id).is_none() || self.is_ai(id) {
            return false;
        }
        let class_kind = capability.class();
        let assignment = self.config.capability_assignment().clone();
        if class_kind.is_playback() {
            if !self.config.is_sound_per_player_allowed() {
                return false;
            }
        } else if assignment.max_explicit_per_player <= 0 {
            return false;
        }
        let Some((class, capa)) = self.find_capability(capability.id()) else {
            return false;
        };
        if !self.config.is_class_assignable(class_kind) {
            return false;
        }
        let owner = self.class_data[class].slots[capa].player;
        if owner == Some(id) {
            return false;
        }

        let mut swap_gift = None;
        if class_kind.is_playback() || !assignment.more_than_one_per_class {
            let same_class: Vec<(usize, usize)> =
                self.players.data(id).capabilities.iter().copied().filter(|&(c, _)| c == class).collect();
            for pair in same_class {
                self.unassign_pair(id, pair);
                swap_gift = Some(pair);
            }
        }
        if let Some(other) = owner {
            self.unassign_pair(other, (class, capa));
            let gift = swap_gift.and_then(|(gc, gcapa)| self.class_data[gc].slots[gcapa].capability.clone());
            if let Some(gift) = gift {
                self.assign_capability(other, &gift);
            }
        }
        self.players.data_mut(id).capabilities.push((class, capa));
        self.class_data[class].slots[capa].player = Some(id);

        if !class_kind.is_playback() {
            let capabilities = &self.players.data(id).capabilities;
            let playback_pos = capabilities.iter().position(|&(c, _)| self.class_data[c].class.is_playback());
            let tot = capabilities.len() - usize::from(playback_pos.is_some());
            if tot > count(assignment.max_explicit_per_player) {
                let mut idx = tot.saturating_sub(2);
                if Some(idx) == playback_pos {
                    idx = if idx > 0 { idx - 1 } else { idx + 1 };
                }
                let evicted = capabilities[idx];
                debug!("Player {} exceeds explicit capabilities, unassigning {:?}", self.players.data(id).name, evicted);
                self.unassign_pair(id, evicted);
            }
        }
        self.recalc();
        true
    }

    /// Remove an explicit assignment.
    pub fn unassign_capability(&mut self, id: PlayerId, capability: &Capability) -> bool {
        if !self.edit_mode {
            return false;
        }
        let Some((class, capa)) = self.find_capability(capability.id()) else {
            return false;
        };
        if self.class_data[class].slots[capa].player != Some(id) {
            return false;
        }
        self.unassign_pair(id, (class, capa));
        self.recalc();
        true
    }

    // =========================================================================
    // Key bindings
    // =========================================================================

    /// Bind a key of a capability to a key action of a player.
    ///
    /// If another key action (of any player) was bound to the key, it gets
    /// the previous binding of this one. Returns whether such a swap
    /// happened.
    pub fn set_key_value(&mut self, id: PlayerId, key_action: usize, capability: &Capability, key: HardwareKey) -> bool {
        if !self.edit_mode || key_action >= self.config.tot_key_actions() {
            return false;
        }
        if self.players.get(id).is_none() || self.is_ai(id) {
            return false;
        }
        let Some((class, capa)) = self.find_capability(capability.id()) else {
            return false;
        };
        let old = self.players.data(id).key_actions[key_action];
        let new = KeyBinding { class, capa, key };
        if old == Some(new) {
            return false;
        }
        let holder = self.class_data[class].slots[capa].keys.get(&key).copied();
        let swapped = match holder {
            Some((other, other_ka)) => {
                self.players.data_mut(other).key_actions[other_ka] = old;
                match old {
                    Some(old) => {
                        self.class_data[old.class].slots[old.capa].keys.insert(old.key, (other, other_ka));
                    }
                    None => self.undefined_key_actions = true,
                }
                true
            }
            None => {
                if let Some(old) = old {
                    self.class_data[old.class].slots[old.capa].keys.remove(&old.key);
                }
                false
            }
        };
        self.class_data[class].slots[capa].keys.insert(key, (id, key_action));
        self.players.data_mut(id).key_actions[key_action] = Some(new);
        swapped
    }

    /// Capability and key bound to a key action of a player.
    ///
    /// The capability is `None` if it was removed in runtime mode. Both are
    /// `None` for AI players and undefined bindings.
    pub fn key_value(&self, id: PlayerId, key_action: usize) -> (Option<Rc<Capability>>, Option<HardwareKey>) {
        let Some(data) = self.players.get(id) else {
            return (None, None);
        };
        if self.is_ai(id) {
            return (None, None);
        }
        match data.key_actions.get(key_action).copied().flatten() {
            Some(binding) => {
                let capability = self.class_data[binding.class].slots[binding.capa].capability.clone();
                (capability, Some(binding.key))
            }
            None => (None, None),
        }
    }

    /// Player and key action bound to a key of a capability.
    pub fn key_action_player(&self, capability_id: i32, key: HardwareKey) -> Option<(PlayerId, usize)> {
        let (class, capa) = self.find_capability(capability_id)?;
        self.class_data[class].slots[capa].keys.get(&key).copied()
    }

    /// Player a capability acts for.
    ///
    /// The player it is assigned to or else, when capabilities are auto
    /// assigned and there is a single human player, that player: for every
    /// capability if a player can own several of a class, otherwise only for
    /// the first capability of a class nobody owns a capability of.
    pub fn capability_player_id(&self, capability_id: i32) -> Option<PlayerId> {
        let (class, capa) = self.find_capability(capability_id)?;
        let data = &self.class_data[class];
        if let Some(id) = data.slots[capa].player {
            return Some(id);
        }
        let default_player = self.default_player?;
        if self.config.capability_assignment().more_than_one_per_class {
            return Some(default_player);
        }
        (data.tot_assigned == 0 && capa == 0).then_some(default_player)
    }

    /// Index of a known capability within its class.
    ///
    /// Together with [`StdPreferences::capability_from_class_device_idx`]
    /// this identifies capabilities independently of their process wide id.
    pub fn capability_class_device_idx(&self, capability: &Capability) -> Option<usize> {
        self.find_capability(capability.id()).map(|(_, capa)| capa)
    }

    /// Capability at an index of its class.
    pub fn capability_from_class_device_idx(&self, class: CapabilityClass, idx: usize) -> Option<Rc<Capability>> {
        let data = self.class_data.iter().find(|data| data.class == class)?;
        data.slots.get(idx)?.capability.clone()
    }
}

// =============================================================================
// STRUCTURE
// =============================================================================

impl StdPreferences {
    /// Number of teams.
    pub fn tot_teams(&self) -> usize {
        self.teams.len()
    }

    /// Number of players.
    pub fn tot_players(&self) -> usize {
        self.player_order.len()
    }

    /// Change the number of teams.
    ///
    /// Added teams get a new player each while the player limit allows,
    /// then the last mates of the existing teams. Removed teams are taken
    /// from the end, never below the minimum. Returns whether exactly
    /// `tot_teams` teams are left.
    pub fn set_tot_teams(&mut self, tot_teams: usize) -> bool {
        if !self.edit_mode || tot_teams == 0 {
            return false;
        }
        let old_tot = self.teams.len();
        if tot_teams == old_tot {
            return true;
        }
        let app = self.config.app_constraints().clone();
        let capped = tot_teams.min(count(app.max_teams()));
        if capped > old_tot {
            let added = capped - old_tot;
            let missing = (self.tot_players() + added).saturating_sub(count(app.max_players()));
            for _ in 0..added.saturating_sub(missing) {
                let team = self.team_alloc();
                let id = self.player_alloc(false);
                self.add_to_team(team, id);
            }
            let mut stolen = 0;
            let mut team = old_tot;
            while stolen < missing && team > 0 {
                team -= 1;
                while stolen < missing && self.teams[team].mates.len() > 1 {
                    let Some(&id) = self.teams[team].mates.last() else {
                        break;
                    };
                    self.remove_from_team(id);
                    let new_team = self.team_alloc();
                    self.add_to_team(new_team, id);
                    stolen += 1;
                }
            }
        } else {
            let to_delete = old_tot.saturating_sub(capped.max(count(app.teams_min)));
            if to_delete == 0 {
                debug!("Cannot remove teams: minimum reached");
                return false;
            }
            for _ in 0..to_delete {
                self.team_free_last();
            }
        }
        self.populate();
        self.recalc();
        debug!("Teams: {} -> {}", old_tot, self.teams.len());
        tot_teams == self.teams.len()
    }

    /// Change the number of players.
    ///
    /// Players are added to the last team with room, or to new teams, and
    /// removed from the last team with more than one mate, or with their
    /// team. Returns whether exactly `tot_players` players are left.
    pub fn set_tot_players(&mut self, tot_players: usize) -> bool {
        self.set_tot_players_in(tot_players, None)
    }

    /// Change the number of mates of a team.
    pub fn set_team_tot_mates(&mut self, team: usize, tot_mates: usize) -> bool {
        if team >= self.teams.len() {
            return false;
        }
        let others = self.tot_players() - self.teams[team].mates.len();
        self.set_tot_players_in(others + tot_mates, Some(team))
    }

    fn set_tot_players_in(&mut self, tot_players: usize, force_team: Option<usize>) -> bool {
        if !self.edit_mode || tot_players == 0 {
            return false;
        }
        let old_tot = self.tot_players();
        if tot_players == old_tot {
            return true;
        }
        let app = self.config.app_constraints().clone();
        let max_teammates = count(app.max_teammates());
        let max_ai = count(app.ai_mates_per_team_max);
        let capped = tot_players.min(count(app.max_players()));
        let mut tot = old_tot;
        let teams_range = |tot_teams: usize| match force_team {
            Some(team) => team..team + 1,
            None => 0..tot_teams,
        };

        while tot < capped {
            let has_room = |team: usize| {
                self.teams[team].mates.len() < max_teammates
                    && (app.allow_mixed_ai_human_team || !self.is_ai_team(team) || self.team_tot_ai(team) < max_ai)
            };
            let found = teams_range(self.teams.len()).rev().find(|&team| has_room(team));
            let target = match found {
                Some(team) => team,
                None if force_team.is_some() || self.teams.len() >= count(app.max_teams()) => break,
                None => self.team_alloc(),
            };
            let ai = !app.allow_mixed_ai_human_team && self.is_ai_team(target);
            let id = self.player_alloc(ai);
            self.add_to_team(target, id);
            tot += 1;
        }
        while tot > capped {
            let found = teams_range(self.teams.len()).rev().find(|&team| self.teams[team].mates.len() > 1);
            match found {
                Some(team) => {
                    if let Some(&id) = self.teams[team].mates.last() {
                        self.remove_from_team(id);
                        self.player_free(id);
                    }
                }
                None if force_team.is_some() || self.teams.len() <= count(app.teams_min) => break,
                None => self.team_free_last(),
            }
            tot -= 1;
        }
        self.populate();
        self.recalc();
        debug!("Players: {} -> {}", old_tot, self.tot_players());
        tot_players == self.tot_players()
    }

    // =========================================================================
    // Moves
    // =========================================================================

    /// Whether the last mate of `upper` and the first of `lower` can be swapped.
    fn can_swap_boundary(&self, upper: usize, lower: usize) -> bool {
        let app = self.config.app_constraints();
        let (Some(&upper_id), Some(&lower_id)) = (self.teams[upper].mates.last(), self.teams[lower].mates.first()) else {
            return false;
        };
        let upper_ai = self.is_ai(upper_id);
        let lower_ai = self.is_ai(lower_id);
        if upper_ai == lower_ai {
            return true;
        }
        if !app.allow_mixed_ai_human_team && (self.teams[upper].mates.len() > 1 || self.teams[lower].mates.len() > 1) {
            return false;
        }
        let max_ai = count(app.ai_mates_per_team_max);
        !((lower_ai && self.team_tot_ai(upper) == max_ai) || (upper_ai && self.team_tot_ai(lower) == max_ai))
    }

    fn swap_boundary(&mut self, upper: usize, lower: usize) {
        let upper_mate = self.teams[upper].mates.len() - 1;
        let upper_id = self.teams[upper].mates[upper_mate];
        let lower_id = self.teams[lower].mates[0];
        self.teams[upper].mates[upper_mate] = lower_id;
        self.teams[lower].mates[0] = upper_id;
        let data = self.players.data_mut(lower_id);
        data.team = upper;
        data.mate = upper_mate;
        let data = self.players.data_mut(upper_id);
        data.team = lower;
        data.mate = 0;
    }

    fn edit_player_by_name(&self, name: &str) -> Option<(PlayerId, usize, usize)> {
        if !self.edit_mode {
            return None;
        }
        let &id = self.player_names.get(name)?;
        let data = self.players.data(id);
        Some((id, data.team, data.mate))
    }

    /// Move a player one position up: before the previous mate, or into
    /// the previous team swapping with its last mate.
    pub fn player_move_up(&mut self, name: &str) -> bool {
        let Some((_, team, mate)) = self.edit_player_by_name(name) else {
            return false;
        };
        if mate > 0 {
            self.swap_mates(team, mate - 1);
        } else if team > 0 {
            if !self.can_swap_boundary(team - 1, team) {
                debug!("Player {} can't move up: AI constraints", name);
                return false;
            }
            self.swap_boundary(team - 1, team);
        } else {
            return false;
        }
        self.recalc();
        true
    }

    /// Move a player one position down: after the next mate, or into the
    /// next team swapping with its first mate.
    pub fn player_move_down(&mut self, name: &str) -> bool {
        let Some((_, team, mate)) = self.edit_player_by_name(name) else {
            return false;
        };
        if mate + 1 < self.teams[team].mates.len() {
            self.swap_mates(team, mate);
        } else if team + 1 < self.teams.len() {
            if !self.can_swap_boundary(team, team + 1) {
                debug!("Player {} can't move down: AI constraints", name);
                return false;
            }
            self.swap_boundary(team, team + 1);
        } else {
            return false;
        }
        self.recalc();
        true
    }

    /// Swap mates `mate` and `mate + 1` of a team.
    fn swap_mates(&mut self, team: usize, mate: usize) {
        let mates = &mut self.teams[team].mates;
        mates.swap(mate, mate + 1);
        let (first, second) = (mates[mate], mates[mate + 1]);
        self.players.data_mut(first).mate = mate;
        self.players.data_mut(second).mate = mate + 1;
    }

    /// Move a player to the end of the previous team.
    pub fn player_team_up(&mut self, name: &str) -> bool {
        let Some((id, team, _)) = self.edit_player_by_name(name) else {
            return false;
        };
        team > 0 && self.change_team(id, team, team - 1)
    }

    /// Move a player to the end of the next team.
    pub fn player_team_down(&mut self, name: &str) -> bool {
        let Some((id, team, _)) = self.edit_player_by_name(name) else {
            return false;
        };
        team + 1 < self.teams.len() && self.change_team(id, team, team + 1)
    }

    /// Move a player to another team. An AI player that can't join the
    /// target team as AI becomes human.
    fn change_team(&mut self, id: PlayerId, from: usize, to: usize) -> bool {
        let app = self.config.app_constraints().clone();
        if !(self.teams[from].mates.len() > 1 && self.teams[to].mates.len() < count(app.max_teammates())) {
            return false;
        }
        let max_ai = count(app.ai_mates_per_team_max);
        let target_ai = self.team_tot_ai(to);
        let mut invert = false;
        if self.is_ai(id) {
            if !app.allow_mixed_ai_human_team {
                if target_ai == 0 {
                    invert = true;
                } else if target_ai == max_ai {
                    return false;
                }
            } else if target_ai == max_ai {
                invert = true;
            }
        } else if !app.allow_mixed_ai_human_team && target_ai > 0 {
            return false;
        }
        self.remove_from_team(id);
        self.add_to_team(to, id);
        if invert {
            let ai_idx = self.config.ai_option_index(OwnerType::Player);
            if let Some(value) = self.players.data_mut(id).options.get_mut(ai_idx) {
                *value = Variant::Bool(false);
            }
            self.undefined_key_actions = true;
            self.populate();
        }
        self.recalc();
        debug!("Player {} moved from team {} to team {}", self.players.data(id).name, from, to);
        true
    }

    // =========================================================================
    // AI and options
    // =========================================================================

    /// Turn a player into an AI or a human.
    ///
    /// An AI loses its capabilities and key bindings; a new human gets
    /// default bindings. Fails if the team would exceed its AI mates or
    /// mix AI and humans when that is not allowed.
    pub fn set_player_ai(&mut self, id: PlayerId, ai: bool) -> bool {
        if !self.edit_mode {
            return false;
        }
        let Some(team) = self.players.get(id).map(|data| data.team) else {
            return false;
        };
        if self.is_ai(id) == ai {
            return true;
        }
        let app = self.config.app_constraints();
        if ai && self.team_tot_ai(team) >= count(app.ai_mates_per_team_max) {
            return false;
        }
        if !app.allow_mixed_ai_human_team && self.teams[team].mates.len() > 1 {
            return false;
        }
        let ai_idx = self.config.ai_option_index(OwnerType::Player);
        if let Some(value) = self.players.data_mut(id).options.get_mut(ai_idx) {
            *value = Variant::Bool(ai);
        }
        if ai {
            self.unbind_player(id);
        } else {
            self.undefined_key_actions = true;
            self.populate();
        }
        self.recalc();
        debug!("Player {} is now {}", self.players.data(id).name, if ai { "AI" } else { "human" });
        true
    }

    /// Set a game option.
    pub fn set_option_value(&mut self, name: &str, value: Variant) -> bool {
        if !self.edit_mode {
            return false;
        }
        let options = self.config.options(OwnerType::Game);
        let Some(idx) = options.index_of(name) else {
            return false;
        };
        let option = options.obj(idx);
        if option.is_read_only() || !option.is_valid_value(&value) {
            return false;
        }
        self.options[idx] = value;
        true
    }

    /// Set a team option. The team's AI option is read-only.
    pub fn set_team_option_value(&mut self, team: usize, name: &str, value: Variant) -> bool {
        if !self.edit_mode || team >= self.teams.len() {
            return false;
        }
        let options = self.config.options(OwnerType::Team);
        let Some(idx) = options.index_of(name) else {
            return false;
        };
        let option = options.obj(idx);
        if idx == self.config.ai_option_index(OwnerType::Team) || option.is_read_only() || !option.is_valid_value(&value) {
            return false;
        }
        self.teams[team].options[idx] = value;
        true
    }

    /// Set a player option. Setting the AI option is [`StdPreferences::set_player_ai`].
    pub fn set_player_option_value(&mut self, id: PlayerId, name: &str, value: Variant) -> bool {
        if !self.edit_mode || self.players.get(id).is_none() {
            return false;
        }
        let options = self.config.options(OwnerType::Player);
        let Some(idx) = options.index_of(name) else {
            return false;
        };
        if idx == self.config.ai_option_index(OwnerType::Player) {
            return match value {
                Variant::Bool(ai) => self.set_player_ai(id, ai),
                _ => false,
            };
        }
        let option = options.obj(idx);
        if option.is_read_only() || !option.is_valid_value(&value) {
            return false;
        }
        self.players.data_mut(id).options[idx] = value;
        true
    }

    fn player_option(&self, id: PlayerId, name: &str) -> Variant {
        let Some(data) = self.players.get(id) else {
            return Variant::Null;
        };
        self.config
            .options(OwnerType::Player)
            .index_of(name)
            .and_then(|idx| data.options.get(idx).copied())
            .unwrap_or_default()
    }

    fn team_option(&self, team: usize, name: &str) -> Variant {
        let Some(idx) = self.config.options(OwnerType::Team).index_of(name) else {
            return Variant::Null;
        };
        if idx == self.config.ai_option_index(OwnerType::Team) {
            return Variant::Bool(self.is_ai_team(team));
        }
        self.teams[team].options.get(idx).copied().unwrap_or_default()
    }

    // =========================================================================
    // Names and lookups
    // =========================================================================

    /// Rename a player. Names are unique, not empty and at most
    /// [`MAX_PLAYER_NAME_LENGTH`] characters long.
    pub fn set_player_name(&mut self, id: PlayerId, name: &str) -> bool {
        if !self.edit_mode || name.is_empty() || name.chars().count() > MAX_PLAYER_NAME_LENGTH {
            return false;
        }
        let Some(old) = self.players.get(id).map(|data| data.name.clone()) else {
            return false;
        };
        if old == name {
            return true;
        }
        if self.player_names.contains_key(name) {
            return false;
        }
        self.player_names.remove(&old);
        self.player_names.insert(name.to_string(), id);
        self.players.data_mut(id).name = name.to_string();
        true
    }

    /// Rename a team. Names are unique, not empty and at most
    /// [`MAX_TEAM_NAME_LENGTH`] characters long.
    pub fn set_team_name(&mut self, team: usize, name: &str) -> bool {
        if !self.edit_mode || team >= self.teams.len() || name.is_empty() || name.chars().count() > MAX_TEAM_NAME_LENGTH {
            return false;
        }
        if self.teams[team].name == name {
            return true;
        }
        if self.team_names.contains_key(name) {
            return false;
        }
        let old = std::mem::replace(&mut self.teams[team].name, name.to_string());
        self.team_names.remove(&old);
        self.team_names.insert(name.to_string(), team);
        true
    }

    /// Id of the player with the given number.
    pub fn player_id(&self, number: usize) -> Option<PlayerId> {
        self.player_order.get(number).copied()
    }

    /// Id of a player by name.
    pub fn player_id_by_name(&self, name: &str) -> Option<PlayerId> {
        self.player_names.get(name).copied()
    }

    /// A player. `None` if the handle is stale.
    pub fn player(&self, id: PlayerId) -> Option<PrefPlayer<'_>> {
        self.players.get(id).map(|data| PrefPlayer { prefs: self, id, data })
    }

    /// The player with the given number.
    pub fn player_by_number(&self, number: usize) -> Option<PrefPlayer<'_>> {
        self.player_id(number).and_then(|id| self.player(id))
    }

    /// A player by name.
    pub fn player_by_name(&self, name: &str) -> Option<PrefPlayer<'_>> {
        self.player_id_by_name(name).and_then(|id| self.player(id))
    }

    /// A team by number.
    pub fn team(&self, team: usize) -> Option<PrefTeam<'_>> {
        self.teams.get(team).map(|data| PrefTeam { prefs: self, number: team, data })
    }

    /// A team by name.
    pub fn team_by_name(&self, name: &str) -> Option<PrefTeam<'_>> {
        self.team_names.get(name).and_then(|&team| self.team(team))
    }

    /// Team names, in team order.
    pub fn team_names(&self) -> Vec<String> {
        self.teams.iter().map(|team| team.name.clone()).collect()
    }

    /// Class and index within the class of each capability assigned to a player.
    pub fn capability_idxs(&self, id: PlayerId) -> Vec<(CapabilityClass, usize)> {
        self.players
            .get(id)
            .map(|data| data.capabilities.iter().map(|&(class, capa)| (self.class_data[class].class, capa)).collect())
            .unwrap_or_default()
    }

    /// Digest of the observable state.
    pub fn compute_hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_preferences();
        hasher.flag(self.edit_mode);
        hasher.values(&self.options);
        hasher.count(self.teams.len());
        for team in &self.teams {
            hasher.text(&team.name);
            hasher.values(&team.options);
            hasher.count(team.mates.len());
            for &id in &team.mates {
                let data = self.players.data(id);
                hasher.text(&data.name);
                hasher.values(&data.options);
                hasher.count(data.capabilities.len());
                for &(class, capa) in &data.capabilities {
                    hasher.count(class);
                    hasher.count(capa);
                }
                for binding in &data.key_actions {
                    match binding {
                        Some(binding) => {
                            hasher.flag(true);
                            hasher.count(binding.class);
                            hasher.count(binding.capa);
                            hasher.count(binding.key as usize);
                        }
                        None => hasher.flag(false),
                    }
                }
            }
        }
        hasher.finalize()
    }
}

impl Clone for StdPreferences {
    /// Independent copy in edit mode. Free lists are not shared.
    fn clone(&self) -> Self {
        let mut players = self.players.clone();
        players.forget_free();
        let mut copy = Self {
            config: Rc::clone(&self.config),
            edit_mode: self.edit_mode,
            undefined_key_actions: self.undefined_key_actions,
            options: self.options.clone(),
            teams: self.teams.clone(),
            free_teams: Vec::new(),
            team_names: self.team_names.clone(),
            players,
            player_names: self.player_names.clone(),
            player_order: self.player_order.clone(),
            default_player: self.default_player,
            class_data: self.class_data.clone(),
        };
        copy.set_edit_mode(true);
        copy
    }
}

// =============================================================================
// VIEWS
// =============================================================================

/// Read-only view of a player.
#[derive(Clone, Copy, Debug)]
pub struct PrefPlayer<'a> {
    prefs: &'a StdPreferences,
    id: PlayerId,
    data: &'a PlayerData,
}

impl<'a> PrefPlayer<'a> {
    /// Stable handle.
    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// Unique name.
    pub fn name(&self) -> &'a str {
        &self.data.name
    }

    /// Team number.
    pub fn team(&self) -> usize {
        self.data.team
    }

    /// Mate number within the team.
    pub fn mate(&self) -> usize {
        self.data.mate
    }

    /// Player number over all teams.
    pub fn number(&self) -> usize {
        self.data.number
    }

    /// Whether the player is an AI.
    pub fn is_ai(&self) -> bool {
        self.prefs.is_ai(self.id)
    }

    /// Value of a player option. `Variant::Null` if unknown.
    pub fn option_value(&self, name: &str) -> Variant {
        self.prefs.player_option(self.id, name)
    }

    /// Explicitly assigned capabilities, oldest first.
    pub fn capabilities(&self) -> Vec<Rc<Capability>> {
        self.data
            .capabilities
            .iter()
            .filter_map(|&(class, capa)| self.prefs.class_data[class].slots[capa].capability.clone())
            .collect()
    }

    /// The assigned capability of a class, if any.
    pub fn capability(&self, class: CapabilityClass) -> Option<Rc<Capability>> {
        self.capabilities().into_iter().find(|capability| capability.class() == class)
    }

    /// Capability and key bound to a key action.
    pub fn key_value(&self, key_action: usize) -> (Option<Rc<Capability>>, Option<HardwareKey>) {
        self.prefs.key_value(self.id, key_action)
    }
}

/// Read-only view of a team.
#[derive(Clone, Copy, Debug)]
pub struct PrefTeam<'a> {
    prefs: &'a StdPreferences,
    number: usize,
    data: &'a TeamData,
}

impl<'a> PrefTeam<'a> {
    /// Team number.
    pub fn number(&self) -> usize {
        self.number
    }

    /// Unique name.
    pub fn name(&self) -> &'a str {
        &self.data.name
    }

    /// Number of mates.
    pub fn tot_mates(&self) -> usize {
        self.data.mates.len()
    }

    /// Number of AI mates.
    pub fn tot_ai_mates(&self) -> usize {
        self.prefs.team_tot_ai(self.number)
    }

    /// Whether all mates are AI.
    pub fn is_ai(&self) -> bool {
        self.prefs.is_ai_team(self.number)
    }

    /// Id of a mate.
    pub fn mate_id(&self, mate: usize) -> Option<PlayerId> {
        self.data.mates.get(mate).copied()
    }

    /// A mate.
    pub fn mate(&self, mate: usize) -> Option<PrefPlayer<'a>> {
        self.mate_id(mate).and_then(|id| self.prefs.player(id))
    }

    /// Value of a team option. `Variant::Null` if unknown.
    pub fn option_value(&self, name: &str) -> Variant {
        self.prefs.team_option(self.number, name)
    }
}

// =============================================================================
// APP PREFERENCES
// =============================================================================

impl AppPreferences for StdPreferences {
    fn std_config(&self) -> &Rc<StdConfig> {
        &self.config
    }

    fn tot_teams(&self) -> usize {
        self.teams.len()
    }

    fn tot_players(&self) -> usize {
        self.player_order.len()
    }

    fn team_name(&self, team: usize) -> &str {
        &self.teams[team].name
    }

    fn team_tot_mates(&self, team: usize) -> usize {
        self.teams[team].mates.len()
    }

    fn team_tot_ai_mates(&self, team: usize) -> usize {
        self.team_tot_ai(team)
    }

    fn mate_name(&self, team: usize, mate: usize) -> &str {
        &self.players.data(self.teams[team].mates[mate]).name
    }

    fn is_mate_ai(&self, team: usize, mate: usize) -> bool {
        self.is_ai(self.teams[team].mates[mate])
    }

    fn option_value(&self, name: &str) -> Variant {
        self.config
            .options(OwnerType::Game)
            .index_of(name)
            .and_then(|idx| self.options.get(idx).copied())
            .unwrap_or_default()
    }

    fn team_option_value(&self, team: usize, name: &str) -> Variant {
        self.team_option(team, name)
    }

    fn mate_option_value(&self, team: usize, mate: usize, name: &str) -> Variant {
        self.player_option(self.teams[team].mates[mate], name)
    }

    fn teammate(&self, player: usize) -> (usize, usize) {
        let data = self.players.data(self.player_order[player]);
        (data.team, data.mate)
    }

    fn capability_player(&self, capability_id: i32) -> Option<(usize, usize)> {
        let data = self.players.get(self.capability_player_id(capability_id)?)?;
        Some((data.team, data.mate))
    }

    fn key_action_from_capability_key(&self, capability_id: i32, key: HardwareKey) -> Option<(usize, usize, usize)> {
        let (id, key_action) = self.key_action_player(capability_id, key)?;
        let data = self.players.get(id)?;
        Some((data.team, data.mate, key_action))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GameOption, KeyAction, StdConfigInit, AI_OPTION_NAME};
    use proptest::prelude::*;

    const CLASSES: [CapabilityClass; 4] =
        [CapabilityClass::Keys, CapabilityClass::Pointer, CapabilityClass::Joystick, CapabilityClass::Playback];

    fn device_manager() -> DeviceManager {
        DeviceManager::new(&CLASSES)
    }

    /// Two key actions, a game, a team and a player option. One to two teams
    /// of up to three humans, capabilities auto assigned.
    fn config_with(dm: &DeviceManager, tweak: impl FnOnce(&mut StdConfigInit)) -> Rc<StdConfig> {
        use CapabilityClass::{Joystick, Keys, Pointer};
        let mut init = StdConfigInit::new("prefs-test", "1.0", dm);
        init.app_constraints.teams_min = 1;
        init.app_constraints.teams_max = 2;
        init.app_constraints.mates_per_team_max = 3;
        init.app_constraints.ai_mates_per_team_max = 0;
        init.app_constraints.allow_mixed_ai_human_team = false;
        init.app_constraints.players_max = 6;
        init.capability_assignment.all_classes = true;
        init.capability_assignment.max_explicit_per_player = 1000;
        init.capability_assignment.more_than_one_per_class = false;
        init.capability_assignment.auto_assign_to_active_player = true;
        init.sound_per_player_allowed = true;
        init.key_actions = vec![
            KeyAction::new(
                &["MoveUp", "Fire"],
                "Move up",
                vec![
                    (Keys, vec![HardwareKey::Up, HardwareKey::W, HardwareKey::Digit8]),
                    (Pointer, vec![HardwareKey::ScrollUp]),
                    (Joystick, vec![HardwareKey::Up, HardwareKey::BtnY]),
                ],
            ),
            KeyAction::new(
                &["MoveDown"],
                "Move down",
                vec![
                    (Keys, vec![HardwareKey::Down, HardwareKey::S, HardwareKey::Digit2]),
                    (Pointer, vec![HardwareKey::ScrollDown]),
                    (Joystick, vec![HardwareKey::Down, HardwareKey::BtnA]),
                ],
            ),
        ];
        init.options = vec![
            Rc::new(GameOption::new_int(OwnerType::Game, "GameSpeed", 1, "Speed", 1, 3).unwrap()),
            Rc::new(GameOption::new_bool(OwnerType::Team, "AllowSwap", false, "Swap").unwrap()),
            Rc::new(GameOption::new_bool(OwnerType::Player, "CWRotation", false, "Rotation").unwrap()),
        ];
        tweak(&mut init);
        Rc::new(StdConfig::new(init).unwrap())
    }

    fn config(dm: &DeviceManager) -> Rc<StdConfig> {
        config_with(dm, |_| {})
    }

    /// Up to three teams of three, eight players, one AI per team.
    fn three_teams(init: &mut StdConfigInit) {
        init.app_constraints.teams_max = 3;
        init.app_constraints.players_max = 8;
        init.app_constraints.ai_mates_per_team_max = 1;
    }

    fn plug(dm: &mut DeviceManager, name: &str, class: CapabilityClass) -> (DeviceEvent, i32, Rc<Capability>) {
        let event = dm.add_device(name, &[class]);
        let DeviceEvent::Added(device) = &event else { panic!("expected add") };
        let capability = Rc::clone(device.capability(class).unwrap());
        let id = device.id();
        (event, id, capability)
    }

    fn plug_into(dm: &mut DeviceManager, prefs: &mut StdPreferences, name: &str, class: CapabilityClass) -> (i32, Rc<Capability>) {
        let (event, id, capability) = plug(dm, name, class);
        prefs.handle_device_event(&event);
        (id, capability)
    }

    fn unplug(dm: &mut DeviceManager, prefs: &mut StdPreferences, device_id: i32) {
        let event = dm.remove_device(device_id).unwrap();
        prefs.handle_device_event(&event);
    }

    fn key_of(prefs: &StdPreferences, number: usize, key_action: &str) -> (Option<i32>, Option<HardwareKey>) {
        let ka = prefs.config().key_action_id(key_action).unwrap();
        let (capability, key) = prefs.player_by_number(number).unwrap().key_value(ka);
        (capability.map(|c| c.id()), key)
    }

    fn mate_id(prefs: &StdPreferences, team: usize, mate: usize) -> PlayerId {
        prefs.team(team).unwrap().mate_id(mate).unwrap()
    }

    #[test]
    fn test_constructor() {
        let dm = device_manager();
        let prefs = StdPreferences::new(config(&dm), &dm);
        assert!(prefs.is_in_edit_mode());
        assert_eq!(prefs.option_value("GameSpeed"), Variant::Int(1));
        assert_eq!(prefs.tot_teams(), 1);
        assert_eq!(prefs.tot_players(), 1);

        let team = prefs.team(0).unwrap();
        assert_eq!(team.name(), "Team");
        assert_eq!(prefs.team_by_name("Team").unwrap().number(), 0);
        assert!(!team.is_ai());
        assert_eq!(team.option_value("AllowSwap"), Variant::Bool(false));
        assert_eq!(team.tot_mates(), 1);

        let player = team.mate(0).unwrap();
        assert_eq!(player.name(), "Player");
        assert!(!player.is_ai());
        assert_eq!((player.team(), player.mate(), player.number()), (0, 0, 0));
        assert!(player.capabilities().is_empty());
        assert_eq!(player.option_value("CWRotation"), Variant::Bool(false));
        assert_eq!(player.option_value("Nope"), Variant::Null);
        assert_eq!(key_of(&prefs, 0, "MoveUp"), (None, None), "no device, no binding");
    }

    #[test]
    fn test_set_option() {
        let dm = device_manager();
        let mut prefs = StdPreferences::new(config(&dm), &dm);
        let p0 = prefs.player_id(0).unwrap();
        assert!(prefs.set_option_value("GameSpeed", Variant::Int(3)));
        assert_eq!(prefs.option_value("GameSpeed"), Variant::Int(3));
        assert!(!prefs.set_option_value("GameSpeed", Variant::Int(4)), "out of range");
        assert!(!prefs.set_option_value("Nope", Variant::Int(1)));

        assert!(prefs.set_team_option_value(0, "AllowSwap", Variant::Bool(true)));
        assert_eq!(prefs.team(0).unwrap().option_value("AllowSwap"), Variant::Bool(true));
        assert!(!prefs.set_team_option_value(0, AI_OPTION_NAME, Variant::Bool(true)));

        assert!(prefs.set_player_option_value(p0, "CWRotation", Variant::Bool(true)));
        assert_eq!(prefs.player(p0).unwrap().option_value("CWRotation"), Variant::Bool(true));
        assert!(!prefs.set_player_option_value(p0, "CWRotation", Variant::Int(1)), "wrong type");
        assert!(!prefs.set_player_option_value(p0, AI_OPTION_NAME, Variant::Bool(true)), "AI not allowed");
    }

    #[test]
    fn test_one_capability_one_player() {
        let mut dm = device_manager();
        let (_, _, kbd) = plug(&mut dm, "kbd", CapabilityClass::Keys);
        let prefs = StdPreferences::new(config(&dm), &dm);
        assert_eq!(key_of(&prefs, 0, "MoveUp"), (Some(kbd.id()), Some(HardwareKey::Up)));
        assert_eq!(key_of(&prefs, 0, "Fire"), (Some(kbd.id()), Some(HardwareKey::Up)));
        assert_eq!(key_of(&prefs, 0, "MoveDown"), (Some(kbd.id()), Some(HardwareKey::Down)));
    }

    #[test]
    fn test_one_mate_per_team() {
        let mut dm = device_manager();
        let (_, _, kbd) = plug(&mut dm, "kbd", CapabilityClass::Keys);
        let config = config_with(&dm, |init| init.app_constraints.mates_per_team_max = 1);
        let mut prefs = StdPreferences::new(config, &dm);

        assert!(prefs.set_tot_players(2));
        assert_eq!(prefs.tot_players(), 2);
        assert_eq!(prefs.tot_teams(), 2);
        assert_eq!(prefs.tot_ai_players(), 0);
        assert_eq!(prefs.tot_ai_teams(), 0);

        assert_eq!(key_of(&prefs, 0, "MoveUp"), (Some(kbd.id()), Some(HardwareKey::Up)));
        assert_eq!(key_of(&prefs, 0, "MoveDown"), (Some(kbd.id()), Some(HardwareKey::Down)));
        assert_eq!(key_of(&prefs, 1, "MoveUp"), (Some(kbd.id()), Some(HardwareKey::W)));
        assert_eq!(key_of(&prefs, 1, "MoveDown"), (Some(kbd.id()), Some(HardwareKey::S)));

        let p0 = prefs.player_id(0).unwrap();
        let p1 = prefs.player_id(1).unwrap();
        assert_eq!(prefs.key_action_player(kbd.id(), HardwareKey::W), Some((p1, 0)));
        assert_eq!(prefs.key_action_player(kbd.id(), HardwareKey::Down), Some((p0, 1)));
        assert_eq!(prefs.key_action_from_capability_key(kbd.id(), HardwareKey::W), Some((1, 0, 0)));
        assert_eq!(prefs.key_action_player(kbd.id(), HardwareKey::Left), None);
        assert_eq!(prefs.capability_player(kbd.id()), None, "two humans, no default player");

        assert!(!prefs.set_tot_players(3));
        assert!(!prefs.set_tot_teams(3));
        assert_eq!(prefs.tot_players(), 2);
    }

    #[test]
    fn test_two_capabilities_one_team_three_players() {
        let mut dm = device_manager();
        let (_, _, kbd1) = plug(&mut dm, "kbd1", CapabilityClass::Keys);
        let mut prefs = StdPreferences::new(config(&dm), &dm);
        let (kbd2_device, kbd2) = plug_into(&mut dm, &mut prefs, "kbd2", CapabilityClass::Keys);

        assert!(prefs.set_tot_players(2));
        assert_eq!(prefs.tot_teams(), 1);
        assert_eq!(key_of(&prefs, 0, "MoveUp"), (Some(kbd1.id()), Some(HardwareKey::Up)));
        assert_eq!(key_of(&prefs, 0, "MoveDown"), (Some(kbd1.id()), Some(HardwareKey::Down)));
        assert_eq!(key_of(&prefs, 1, "MoveUp"), (Some(kbd2.id()), Some(HardwareKey::Up)));
        assert_eq!(key_of(&prefs, 1, "MoveDown"), (Some(kbd2.id()), Some(HardwareKey::Down)));

        assert!(prefs.set_tot_players(3));
        assert_eq!(prefs.tot_teams(), 1);
        assert_eq!(key_of(&prefs, 2, "MoveUp"), (Some(kbd1.id()), Some(HardwareKey::W)));
        assert_eq!(key_of(&prefs, 2, "MoveDown"), (Some(kbd1.id()), Some(HardwareKey::S)));

        let p0 = prefs.player_id(0).unwrap();
        let p1 = prefs.player_id(1).unwrap();
        assert_eq!(prefs.key_action_player(kbd2.id(), HardwareKey::Down), Some((p1, 1)));

        unplug(&mut dm, &mut prefs, kbd2_device);
        assert_eq!(key_of(&prefs, 1, "MoveUp"), (Some(kbd1.id()), Some(HardwareKey::Digit8)));
        assert_eq!(key_of(&prefs, 1, "MoveDown"), (Some(kbd1.id()), Some(HardwareKey::Digit2)));

        assert!(prefs.set_tot_players(1));
        assert_eq!(prefs.tot_players(), 1);
        assert_eq!(prefs.tot_teams(), 1);
        assert_eq!(prefs.key_action_player(kbd2.id(), HardwareKey::Down), None);
        assert_eq!(prefs.player_id(0), Some(p0));
        assert!(prefs.player(p1).is_none(), "removed player handle is stale");
    }

    #[test]
    fn test_runtime_capabilities() {
        let mut dm = device_manager();
        let (_, kbd1_device, _) = plug(&mut dm, "kbd1", CapabilityClass::Keys);
        let mut prefs = StdPreferences::new(config(&dm), &dm);
        let (_, kbd2) = plug_into(&mut dm, &mut prefs, "kbd2", CapabilityClass::Keys);
        plug_into(&mut dm, &mut prefs, "mouse", CapabilityClass::Pointer);
        assert!(prefs.set_tot_players(3));

        prefs.set_edit_mode(false);
        assert!(!prefs.set_tot_players(2), "structure is frozen");
        unplug(&mut dm, &mut prefs, kbd1_device);
        assert_eq!(key_of(&prefs, 0, "MoveUp"), (None, Some(HardwareKey::Up)));
        assert_eq!(key_of(&prefs, 0, "MoveDown"), (None, Some(HardwareKey::Down)));

        let (kbd1b_device, kbd1b) = plug_into(&mut dm, &mut prefs, "kbd1b", CapabilityClass::Keys);
        assert_eq!(key_of(&prefs, 0, "MoveUp"), (Some(kbd1b.id()), Some(HardwareKey::Up)));
        assert_eq!(key_of(&prefs, 0, "MoveDown"), (Some(kbd1b.id()), Some(HardwareKey::Down)));

        unplug(&mut dm, &mut prefs, kbd1b_device);
        prefs.set_edit_mode(true);
        assert_eq!(key_of(&prefs, 0, "MoveUp"), (Some(kbd2.id()), Some(HardwareKey::W)));
        assert_eq!(key_of(&prefs, 0, "MoveDown"), (Some(kbd2.id()), Some(HardwareKey::S)));
        assert_eq!(prefs.capability_from_class_device_idx(CapabilityClass::Keys, 0).map(|c| c.id()), Some(kbd2.id()));
        assert!(prefs.capability_from_class_device_idx(CapabilityClass::Keys, 1).is_none());
    }

    #[test]
    fn test_runtime_added_device_removed() {
        let mut dm = device_manager();
        let (_, _, kbd1) = plug(&mut dm, "kbd1", CapabilityClass::Keys);
        let mut prefs = StdPreferences::new(config(&dm), &dm);
        prefs.set_edit_mode(false);
        prefs.set_edit_mode(false);
        let (kbd2_device, kbd2) = plug_into(&mut dm, &mut prefs, "kbd2", CapabilityClass::Keys);
        assert_eq!(prefs.capability_class_device_idx(&kbd2), Some(1));
        unplug(&mut dm, &mut prefs, kbd2_device);
        assert_eq!(prefs.capability_class_device_idx(&kbd2), None);
        prefs.set_edit_mode(true);
        assert_eq!(key_of(&prefs, 0, "MoveUp"), (Some(kbd1.id()), Some(HardwareKey::Up)));
    }

    #[test]
    fn test_move_players() {
        let mut dm = device_manager();
        plug(&mut dm, "kbd1", CapabilityClass::Keys);
        let mut prefs = StdPreferences::new(config(&dm), &dm);
        plug_into(&mut dm, &mut prefs, "kbd2", CapabilityClass::Keys);
        plug_into(&mut dm, &mut prefs, "mouse", CapabilityClass::Pointer);

        assert!(prefs.set_tot_teams(2));
        assert_eq!(prefs.tot_players(), 2);
        assert!(prefs.set_tot_players(4));
        assert_eq!(prefs.tot_teams(), 2);

        let p2 = prefs.player_id(2).unwrap();
        let name = prefs.player(p2).unwrap().name().to_string();
        let position = |prefs: &StdPreferences| {
            let player = prefs.player(p2).unwrap();
            (player.team(), player.mate())
        };
        assert_eq!(position(&prefs), (1, 1));

        assert!(prefs.player_move_up(&name));
        assert_eq!(position(&prefs), (1, 0));
        assert!(prefs.player_move_up(&name));
        assert_eq!(position(&prefs), (0, 0));
        assert!(!prefs.player_move_up(&name));

        assert!(prefs.player_move_down(&name));
        assert_eq!(position(&prefs), (1, 0));
        assert!(prefs.player_move_down(&name));
        assert_eq!(position(&prefs), (1, 1));
        assert!(prefs.player_move_down(&name));
        assert_eq!(position(&prefs), (1, 2));
        assert!(!prefs.player_move_down(&name));
        assert!(!prefs.player_move_down("Nobody"));
    }

    #[test]
    fn test_move_teams() {
        let dm = device_manager();
        let config = config_with(&dm, three_teams);
        assert_eq!(config.app_constraints().max_teams(), 3);
        assert_eq!(config.app_constraints().max_players(), 8);
        let mut prefs = StdPreferences::new(config, &dm);

        assert!(prefs.set_tot_teams(3));
        assert!(prefs.set_tot_players(7));
        let mates = |prefs: &StdPreferences| (0..3).map(|t| prefs.team_tot_mates(t)).collect::<Vec<_>>();
        assert_eq!(mates(&prefs), [1, 3, 3]);

        let name = |prefs: &StdPreferences, id: PlayerId| prefs.player(id).unwrap().name().to_string();
        let position = |prefs: &StdPreferences, id: PlayerId| {
            let player = prefs.player(id).unwrap();
            (player.team(), player.mate())
        };
        let x = mate_id(&prefs, 2, 2);
        assert!(!prefs.player_team_up(&name(&prefs, x)), "previous team is full");

        let y = mate_id(&prefs, 1, 1);
        assert!(prefs.player_team_up(&name(&prefs, y)));
        assert_eq!(mates(&prefs), [2, 2, 3]);
        assert_eq!(position(&prefs, y), (0, 1));

        assert!(prefs.player_team_up(&name(&prefs, x)));
        assert_eq!(mates(&prefs), [2, 3, 2]);
        assert_eq!(position(&prefs, x), (1, 2));
        assert!(prefs.player_team_up(&name(&prefs, x)));
        assert_eq!(mates(&prefs), [3, 2, 2]);
        assert_eq!(position(&prefs, x), (0, 2));
        assert!(!prefs.player_team_up(&name(&prefs, x)));

        let z = mate_id(&prefs, 0, 0);
        assert!(prefs.player_team_down(&name(&prefs, z)));
        assert_eq!(mates(&prefs), [2, 3, 2]);
        assert_eq!(position(&prefs, z), (1, 2));
        assert_eq!(position(&prefs, y), (0, 0));
        assert_eq!(position(&prefs, x), (0, 1));
        assert!(prefs.player_team_down(&name(&prefs, z)));
        assert_eq!(mates(&prefs), [2, 2, 3]);
        assert!(!prefs.player_team_down(&name(&prefs, z)));
    }

    #[test]
    fn test_move_ai_no_mixed() {
        let dm = device_manager();
        let mut prefs = StdPreferences::new(config_with(&dm, three_teams), &dm);
        assert!(prefs.set_tot_players(2));
        assert!(prefs.set_tot_teams(2));
        assert!(prefs.set_tot_players(4));
        assert_eq!((prefs.team_tot_mates(0), prefs.team_tot_mates(1)), (2, 2));

        let p2 = mate_id(&prefs, 1, 0);
        let name2 = prefs.player(p2).unwrap().name().to_string();
        assert!(!prefs.player(p2).unwrap().is_ai());
        assert!(!prefs.set_player_ai(p2, true), "team would be mixed");

        assert!(prefs.player_team_up(&name2));
        assert_eq!((prefs.team_tot_mates(0), prefs.team_tot_mates(1)), (3, 1));

        let p3 = mate_id(&prefs, 1, 0);
        assert!(prefs.set_player_ai(p3, true));
        assert!(prefs.is_team_ai(1));
        assert!(!prefs.player_team_down(&name2), "human can't join an AI team");
        assert!(!prefs.player_move_down(&name2), "swap would mix teams");
    }

    #[test]
    fn test_set_name() {
        let dm = device_manager();
        let mut prefs = StdPreferences::new(config_with(&dm, three_teams), &dm);
        assert!(prefs.set_tot_players(2));
        assert!(prefs.set_tot_teams(2));
        assert!(prefs.set_tot_players(4));

        let p0 = mate_id(&prefs, 0, 0);
        let p2 = mate_id(&prefs, 1, 0);
        assert!(prefs.set_player_name(p0, "Holly"));
        assert!(prefs.set_player_name(p0, "Holly"));
        assert!(!prefs.set_player_name(p2, "Holly"));
        assert!(!prefs.set_player_name(p2, ""));
        assert!(!prefs.set_player_name(p2, "Much too long name"));
        assert_eq!(prefs.player_id_by_name("Holly"), Some(p0));
        assert!(prefs.player_by_name("Player").is_none(), "old name is released");

        assert!(prefs.set_team_name(1, "Blue"));
        assert!(!prefs.set_team_name(0, "Blue"));
        assert_eq!(prefs.team_names(), ["Team", "Blue"]);
        assert_eq!(prefs.team_by_name("Blue").unwrap().number(), 1);
    }

    #[test]
    fn test_generated_names_fill_gaps() {
        let dm = device_manager();
        let mut prefs = StdPreferences::new(config_with(&dm, three_teams), &dm);
        assert!(prefs.set_tot_players(3));
        let names: Vec<String> = (0..3).map(|n| prefs.player_by_number(n).unwrap().name().to_string()).collect();
        assert_eq!(names, ["Player", "Player 1", "Player 2"]);
        assert!(prefs.set_tot_teams(3));
        assert_eq!(prefs.team_names(), ["Team", "Team 1", "Team 2"]);
        assert_eq!(name_base("Player", 6, 10), "Pla");
    }

    #[test]
    fn test_move_ai_mixed() {
        let dm = device_manager();
        let config = config_with(&dm, |init| {
            three_teams(init);
            init.app_constraints.allow_mixed_ai_human_team = true;
        });
        let mut prefs = StdPreferences::new(config, &dm);
        assert!(prefs.set_tot_players(2));
        assert!(prefs.set_tot_teams(2));
        assert!(prefs.set_tot_players(4));

        let p2 = mate_id(&prefs, 1, 0);
        let name2 = prefs.player(p2).unwrap().name().to_string();
        assert!(prefs.set_player_ai(p2, true));
        let p0 = mate_id(&prefs, 0, 0);
        assert!(prefs.set_player_ai(p0, true));

        assert!(prefs.player_team_up(&name2));
        assert!(!prefs.player(p2).unwrap().is_ai(), "turned human to join the team");
        assert!(!prefs.set_player_option_value(p2, AI_OPTION_NAME, Variant::Bool(true)));

        assert!(prefs.player_team_down(&name2));
        let player = prefs.player(p2).unwrap();
        assert_eq!((player.team(), player.mate()), (1, 1));
        assert_eq!(prefs.team_tot_mates(1), 2);
        assert_eq!(prefs.team_tot_ai_mates(1), 0);
        assert!(prefs.set_player_ai(p2, true));

        let p3 = mate_id(&prefs, 1, 0);
        assert!(!prefs.player(p3).unwrap().is_ai());
        assert!(prefs.player_team_up(&prefs.player(p3).unwrap().name().to_string()));
        assert_eq!(prefs.team_tot_mates(1), 1);
        assert_eq!(prefs.team_tot_ai_mates(1), 1);
        assert_eq!(prefs.team_option_value(1, AI_OPTION_NAME), Variant::Bool(true));
    }

    /// Devices: keys 0, keys 1, pointer 2, joystick 3, pointer 4, joystick 5.
    fn devices(dm: &mut DeviceManager) -> Vec<Rc<Capability>> {
        use CapabilityClass::{Joystick, Keys, Pointer};
        [Keys, Keys, Pointer, Joystick, Pointer, Joystick]
            .iter()
            .enumerate()
            .map(|(nr, &class)| plug(dm, &format!("dev{}", nr), class).2)
            .collect()
    }

    fn two_teams_min(init: &mut StdConfigInit) {
        three_teams(init);
        init.app_constraints.teams_min = 2;
    }

    #[test]
    fn test_add_and_remove_team() {
        let mut dm = device_manager();
        devices(&mut dm);
        let mut prefs = StdPreferences::new(config_with(&dm, two_teams_min), &dm);
        assert_eq!((prefs.tot_teams(), prefs.tot_players()), (2, 2));
        assert!(prefs.set_tot_teams(2));
        assert!(!prefs.set_tot_teams(1), "minimum reached");
        assert!(!prefs.set_tot_teams(0));
        assert_eq!(prefs.tot_teams(), 2);
        assert!(prefs.set_tot_teams(3));
        assert_eq!((prefs.tot_teams(), prefs.tot_players()), (3, 3));
        assert!(prefs.set_tot_teams(2));
        assert_eq!((prefs.tot_teams(), prefs.tot_players()), (2, 2));
    }

    #[test]
    fn test_add_and_remove_player() {
        let mut dm = device_manager();
        devices(&mut dm);
        let mut prefs = StdPreferences::new(config_with(&dm, two_teams_min), &dm);
        assert!(prefs.set_tot_players(3));
        assert_eq!((prefs.tot_teams(), prefs.tot_players()), (2, 3));
        assert!(prefs.set_tot_players(2));
        assert_eq!((prefs.tot_teams(), prefs.tot_players()), (2, 2));
        assert!(prefs.set_team_tot_mates(0, 3));
        assert_eq!(prefs.team_tot_mates(0), 3);
        assert!(!prefs.set_team_tot_mates(1, 4), "team is capped");
        assert_eq!(prefs.team_tot_mates(1), 3);
    }

    #[test]
    fn test_players_stolen_for_new_teams() {
        let dm = device_manager();
        let config = config_with(&dm, |init| {
            init.app_constraints.teams_max = 3;
            init.app_constraints.players_max = 3;
        });
        let mut prefs = StdPreferences::new(config, &dm);
        assert!(prefs.set_tot_players(3));
        assert_eq!(prefs.team_tot_mates(0), 3);
        let last = mate_id(&prefs, 0, 2);
        assert!(prefs.set_tot_teams(3));
        assert_eq!(prefs.tot_players(), 3);
        assert_eq!((0..3).map(|t| prefs.team_tot_mates(t)).collect::<Vec<_>>(), [1, 1, 1]);
        assert_eq!(prefs.player(last).unwrap().team(), 1, "last mate moves first");
    }

    #[test]
    fn test_set_key_action_value() {
        let mut dm = device_manager();
        devices(&mut dm);
        let mut prefs = StdPreferences::new(config_with(&dm, two_teams_min), &dm);
        assert!(prefs.set_tot_players(5));
        assert_eq!((prefs.team_tot_mates(0), prefs.team_tot_mates(1)), (2, 3));

        let p2 = mate_id(&prefs, 1, 0);
        let p3 = mate_id(&prefs, 1, 1);
        let (capa2, key2) = prefs.key_value(p2, 0);
        let (capa3, key3) = prefs.key_value(p3, 0);
        let (capa2, key2) = (capa2.unwrap(), key2.unwrap());
        let (capa3, key3) = (capa3.unwrap(), key3.unwrap());

        assert!(prefs.set_key_value(p3, 0, &capa2, key2), "keys swapped");
        let (capa, key) = prefs.key_value(p3, 0);
        assert_eq!((capa.unwrap().id(), key), (capa2.id(), Some(key2)));
        let (capa, key) = prefs.key_value(p2, 0);
        assert_eq!((capa.unwrap().id(), key), (capa3.id(), Some(key3)));
        assert_eq!(prefs.key_action_player(capa2.id(), key2), Some((p3, 0)));
        assert_eq!(prefs.key_action_player(capa3.id(), key3), Some((p2, 0)));

        assert!(!prefs.set_key_value(p3, 0, &capa3, HardwareKey::Backspace));
        assert_eq!(prefs.key_action_player(capa2.id(), key2), None, "old key released");
        assert_eq!(prefs.key_action_player(capa3.id(), HardwareKey::Backspace), Some((p3, 0)));
        assert!(!prefs.set_key_value(p3, 0, &capa3, HardwareKey::Backspace), "unchanged");
    }

    #[test]
    fn test_unassign_capability() {
        let mut dm = device_manager();
        let capas = devices(&mut dm);
        let mut prefs = StdPreferences::new(config_with(&dm, two_teams_min), &dm);
        assert!(prefs.set_tot_players(7));
        assert_eq!((prefs.tot_teams(), prefs.tot_players()), (3, 7));

        let p0 = mate_id(&prefs, 0, 0);
        let p1 = mate_id(&prefs, 1, 0);
        let p2 = mate_id(&prefs, 1, 1);
        let p3 = mate_id(&prefs, 2, 0);
        assert!(prefs.assign_capability(p0, &capas[3]));
        assert!(prefs.assign_capability(p1, &capas[3]));
        assert!(prefs.assign_capability(p1, &capas[5]));
        assert!(prefs.assign_capability(p1, &capas[0]));
        assert!(prefs.assign_capability(p2, &capas[2]));
        assert!(prefs.assign_capability(p3, &capas[4]));

        let ids = |prefs: &StdPreferences, id: PlayerId| -> Vec<i32> {
            prefs.player(id).unwrap().capabilities().iter().map(|c| c.id()).collect()
        };
        assert!(ids(&prefs, p0).is_empty());
        assert_eq!(ids(&prefs, p1), [capas[5].id(), capas[0].id()]);
        assert_eq!(ids(&prefs, p2), [capas[2].id()]);
        assert_eq!(ids(&prefs, p3), [capas[4].id()]);
        assert_eq!(
            prefs.capability_idxs(p1),
            [(CapabilityClass::Joystick, 1), (CapabilityClass::Keys, 0)]
        );

        assert!(!prefs.unassign_capability(p0, &capas[4]));
        assert!(prefs.unassign_capability(p2, &capas[2]));
        assert!(ids(&prefs, p2).is_empty());
        assert!(!prefs.unassign_capability(p1, &capas[3]));
        assert!(prefs.unassign_capability(p1, &capas[5]));
        assert_eq!(ids(&prefs, p1), [capas[0].id()]);
        assert!(prefs.unassign_capability(p1, &capas[0]));
        assert!(ids(&prefs, p1).is_empty());
    }

    #[test]
    fn test_assign_swap_gift() {
        let mut dm = device_manager();
        let (_, _, key0) = plug(&mut dm, "kbd0", CapabilityClass::Keys);
        let (_, _, key1) = plug(&mut dm, "kbd1", CapabilityClass::Keys);
        let mut prefs = StdPreferences::new(config(&dm), &dm);
        assert!(prefs.set_tot_players(2));
        let p0 = prefs.player_id(0).unwrap();
        let p1 = prefs.player_id(1).unwrap();
        assert!(prefs.assign_capability(p0, &key0));
        assert!(prefs.assign_capability(p1, &key1));
        assert!(!prefs.assign_capability(p0, &key0), "already owned");

        assert!(prefs.assign_capability(p0, &key1));
        assert_eq!(prefs.player(p0).unwrap().capability(CapabilityClass::Keys).unwrap().id(), key1.id());
        assert_eq!(prefs.player(p1).unwrap().capability(CapabilityClass::Keys).unwrap().id(), key0.id());
        assert_eq!(prefs.capability_player_id(key0.id()), Some(p1));
    }

    #[test]
    fn test_assign_evicts_second_newest() {
        let mut dm = device_manager();
        let (_, _, key) = plug(&mut dm, "kbd", CapabilityClass::Keys);
        let (_, _, mouse) = plug(&mut dm, "mouse", CapabilityClass::Pointer);
        let (_, _, pad) = plug(&mut dm, "pad", CapabilityClass::Joystick);
        let config = config_with(&dm, |init| init.capability_assignment.max_explicit_per_player = 2);
        let mut prefs = StdPreferences::new(config, &dm);
        let p0 = prefs.player_id(0).unwrap();
        assert!(prefs.assign_capability(p0, &key));
        assert!(prefs.assign_capability(p0, &mouse));
        assert!(prefs.assign_capability(p0, &pad));
        let ids: Vec<i32> = prefs.player(p0).unwrap().capabilities().iter().map(|c| c.id()).collect();
        assert_eq!(ids, [key.id(), pad.id()]);
    }

    #[test]
    fn test_assign_eviction_skips_playback() {
        let mut dm = device_manager();
        let (_, _, phones) = plug(&mut dm, "phones", CapabilityClass::Playback);
        let (_, _, key) = plug(&mut dm, "kbd", CapabilityClass::Keys);
        let (_, _, mouse) = plug(&mut dm, "mouse", CapabilityClass::Pointer);
        let config = config_with(&dm, |init| init.capability_assignment.max_explicit_per_player = 1);
        let mut prefs = StdPreferences::new(config, &dm);
        let p0 = prefs.player_id(0).unwrap();
        assert!(prefs.assign_capability(p0, &phones));
        assert!(prefs.assign_capability(p0, &key));
        assert!(prefs.assign_capability(p0, &mouse));
        let ids: Vec<i32> = prefs.player(p0).unwrap().capabilities().iter().map(|c| c.id()).collect();
        assert_eq!(ids, [phones.id(), mouse.id()]);
    }

    #[test]
    fn test_assign_refused() {
        let mut dm = device_manager();
        let (_, _, phones) = plug(&mut dm, "phones", CapabilityClass::Playback);
        let (_, _, key) = plug(&mut dm, "kbd", CapabilityClass::Keys);
        let restricted = config_with(&dm, |init| {
            init.capability_assignment.max_explicit_per_player = 0;
            init.sound_per_player_allowed = false;
        });
        let mut prefs = StdPreferences::new(restricted, &dm);
        let p0 = prefs.player_id(0).unwrap();
        assert!(!prefs.assign_capability(p0, &key), "explicit assignment disabled");
        assert!(!prefs.assign_capability(p0, &phones), "no per player sound");

        let mut prefs = StdPreferences::new(config(&dm), &dm);
        let p0 = prefs.player_id(0).unwrap();
        assert!(prefs.assign_capability(p0, &key));
        prefs.set_edit_mode(false);
        assert!(!prefs.assign_capability(p0, &phones), "runtime mode");
        assert!(!prefs.unassign_capability(p0, &key), "runtime mode");
        prefs.set_edit_mode(true);
        assert!(!prefs.unassign_capability(p0, &phones), "not assigned");
    }

    #[test]
    fn test_capability_player_default() {
        let mut dm = device_manager();
        let (_, _, key0) = plug(&mut dm, "kbd0", CapabilityClass::Keys);
        let (_, _, key1) = plug(&mut dm, "kbd1", CapabilityClass::Keys);
        let mut prefs = StdPreferences::new(config(&dm), &dm);
        let p0 = prefs.player_id(0).unwrap();
        assert_eq!(prefs.capability_player_id(key0.id()), Some(p0), "first capability of the class");
        assert_eq!(prefs.capability_player_id(key1.id()), None);
        assert_eq!(prefs.capability_player(key0.id()), Some((0, 0)));

        assert!(prefs.assign_capability(p0, &key1));
        assert_eq!(prefs.capability_player_id(key1.id()), Some(p0));
        assert_eq!(prefs.capability_player_id(key0.id()), None, "class has an explicit assignment");

        assert!(prefs.set_tot_players(2));
        assert!(prefs.unassign_capability(p0, &key1));
        assert_eq!(prefs.capability_player_id(key0.id()), None, "two humans");

        let config = config_with(&dm, |init| init.capability_assignment.more_than_one_per_class = true);
        let prefs = StdPreferences::new(config, &dm);
        let p0 = prefs.player_id(0).unwrap();
        assert_eq!(prefs.capability_player_id(key1.id()), Some(p0), "every capability acts for the only human");
        assert_eq!(prefs.capability_player_id(-1), None);
    }

    #[test]
    fn test_ai_toggle_clears_and_rebinds() {
        let mut dm = device_manager();
        let (_, _, kbd) = plug(&mut dm, "kbd", CapabilityClass::Keys);
        let config = config_with(&dm, |init| init.app_constraints.ai_mates_per_team_max = 1);
        let mut prefs = StdPreferences::new(config, &dm);
        let p0 = prefs.player_id(0).unwrap();
        assert!(prefs.assign_capability(p0, &kbd));

        assert!(prefs.set_player_option_value(p0, AI_OPTION_NAME, Variant::Bool(true)));
        assert!(prefs.player(p0).unwrap().is_ai());
        assert_eq!(prefs.key_value(p0, 0), (None, None));
        assert_eq!(prefs.key_action_player(kbd.id(), HardwareKey::Up), None);
        assert!(prefs.player(p0).unwrap().capabilities().is_empty());
        assert!(!prefs.assign_capability(p0, &kbd), "AI players own no capabilities");
        assert_eq!(prefs.tot_human_players(), 0);
        assert!(prefs.set_player_ai(p0, true), "unchanged");

        assert!(prefs.set_player_ai(p0, false));
        assert_eq!(key_of(&prefs, 0, "MoveUp"), (Some(kbd.id()), Some(HardwareKey::Up)));
        assert_eq!(prefs.key_action_player(kbd.id(), HardwareKey::Down), Some((p0, 1)));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut dm = device_manager();
        plug(&mut dm, "kbd", CapabilityClass::Keys);
        let mut prefs = StdPreferences::new(config(&dm), &dm);
        assert!(prefs.set_tot_players(3));
        assert!(prefs.set_tot_players(2));

        let mut copy = prefs.clone();
        assert_eq!(copy.compute_hash(), prefs.compute_hash());
        assert!(copy.set_tot_players(3));
        let p0 = copy.player_id(0).unwrap();
        assert!(copy.set_player_name(p0, "Copy"));

        assert_eq!(prefs.tot_players(), 2);
        assert_eq!(prefs.player_by_number(0).unwrap().name(), "Player");
        assert_ne!(copy.compute_hash(), prefs.compute_hash());
        let names: Vec<String> = (0..3).map(|n| copy.player_by_number(n).unwrap().name().to_string()).collect();
        assert_eq!(names[2], "Player 2", "freed players of the source are not reused");
    }

    #[test]
    fn test_hash_tracks_changes() {
        let dm = device_manager();
        let mut prefs = StdPreferences::new(config(&dm), &dm);
        let before = prefs.compute_hash();
        assert!(prefs.set_option_value("GameSpeed", Variant::Int(2)));
        let after = prefs.compute_hash();
        assert_ne!(before, after);
        assert!(prefs.set_option_value("GameSpeed", Variant::Int(1)));
        assert_eq!(prefs.compute_hash(), before);
    }

    // =========================================================================
    // Properties
    // =========================================================================

    fn check_invariants(prefs: &StdPreferences) {
        let app = prefs.config().app_constraints();
        let tot_teams = prefs.tot_teams();
        assert!(tot_teams >= count(app.teams_min) && tot_teams <= count(app.max_teams()));
        let sum: usize = (0..tot_teams).map(|t| prefs.team_tot_mates(t)).sum();
        assert_eq!(prefs.tot_players(), sum);
        assert!(prefs.tot_players() <= count(app.max_players()));

        for number in 0..prefs.tot_players() {
            let player = prefs.player_by_number(number).unwrap();
            assert_eq!(player.number(), number);
            assert_eq!(prefs.teammate(number), (player.team(), player.mate()));
            assert_eq!(prefs.team(player.team()).unwrap().mate_id(player.mate()), Some(player.id()));
            assert_eq!(prefs.player_id_by_name(player.name()), Some(player.id()));
        }
        for team in 0..tot_teams {
            let mates = prefs.team_tot_mates(team);
            let ai = prefs.team_tot_ai_mates(team);
            assert!(mates >= 1 && mates <= count(app.max_teammates()));
            assert!(ai <= count(app.ai_mates_per_team_max));
            if !app.allow_mixed_ai_human_team {
                assert!(ai == 0 || ai == mates, "team {} mixes AI and humans", team);
            }
        }

        for (class, data) in prefs.class_data.iter().enumerate() {
            assert_eq!(data.tot_assigned, data.slots.iter().filter(|s| s.player.is_some()).count());
            for (capa, slot) in data.slots.iter().enumerate() {
                if prefs.is_in_edit_mode() {
                    assert!(slot.capability.is_some(), "hole left in edit mode");
                }
                if let Some(capability) = &slot.capability {
                    assert_eq!(prefs.capability_class_device_idx(capability), Some(capa));
                    let found = prefs.capability_from_class_device_idx(data.class, capa).unwrap();
                    assert_eq!(found.id(), capability.id());
                }
                if let Some(id) = slot.player {
                    assert!(prefs.players.get(id).unwrap().capabilities.contains(&(class, capa)));
                }
                for (&key, &(id, ka)) in &slot.keys {
                    let binding = prefs.players.get(id).unwrap().key_actions[ka];
                    assert_eq!(binding, Some(KeyBinding { class, capa, key }));
                }
            }
        }
        for &id in &prefs.player_order {
            let data = prefs.players.get(id).unwrap();
            for &(class, capa) in &data.capabilities {
                assert_eq!(prefs.class_data[class].slots[capa].player, Some(id));
            }
            for (ka, binding) in data.key_actions.iter().enumerate() {
                if let Some(b) = binding {
                    assert!(!prefs.is_ai(id), "AI with a binding");
                    assert_eq!(prefs.class_data[b.class].slots[b.capa].keys.get(&b.key), Some(&(id, ka)));
                }
            }
        }
    }

    #[derive(Clone, Debug)]
    enum Op {
        TotTeams(usize),
        TotPlayers(usize),
        TeamMates(usize, usize),
        MoveUp(usize),
        MoveDown(usize),
        TeamUp(usize),
        TeamDown(usize),
        SetAi(usize, bool),
        Assign(usize, usize),
        Unassign(usize, usize),
        Plug(usize),
        Unplug(usize),
        EditMode(bool),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..5).prop_map(Op::TotTeams),
            (0usize..10).prop_map(Op::TotPlayers),
            (0usize..3, 0usize..4).prop_map(|(t, n)| Op::TeamMates(t, n)),
            (0usize..8).prop_map(Op::MoveUp),
            (0usize..8).prop_map(Op::MoveDown),
            (0usize..8).prop_map(Op::TeamUp),
            (0usize..8).prop_map(Op::TeamDown),
            (0usize..8, any::<bool>()).prop_map(|(p, ai)| Op::SetAi(p, ai)),
            (0usize..8, 0usize..8).prop_map(|(p, c)| Op::Assign(p, c)),
            (0usize..8, 0usize..8).prop_map(|(p, c)| Op::Unassign(p, c)),
            (0usize..4).prop_map(Op::Plug),
            (0usize..8).prop_map(Op::Unplug),
            any::<bool>().prop_map(Op::EditMode),
        ]
    }

    fn apply(prefs: &mut StdPreferences, dm: &mut DeviceManager, op: &Op) {
        let name_of = |prefs: &StdPreferences, nr: usize| {
            let tot = prefs.tot_players();
            prefs.player_by_number(nr % tot).map(|p| p.name().to_string())
        };
        let capability_at = |dm: &DeviceManager, nr: usize| {
            let all: Vec<Rc<Capability>> = dm.devices().iter().flat_map(|d| d.capabilities().iter().cloned()).collect();
            (!all.is_empty()).then(|| Rc::clone(&all[nr % all.len()]))
        };
        match *op {
            Op::TotTeams(n) => {
                prefs.set_tot_teams(n);
            }
            Op::TotPlayers(n) => {
                prefs.set_tot_players(n);
            }
            Op::TeamMates(team, n) => {
                prefs.set_team_tot_mates(team, n);
            }
            Op::MoveUp(nr) => {
                if let Some(name) = name_of(prefs, nr) {
                    prefs.player_move_up(&name);
                }
            }
            Op::MoveDown(nr) => {
                if let Some(name) = name_of(prefs, nr) {
                    prefs.player_move_down(&name);
                }
            }
            Op::TeamUp(nr) => {
                if let Some(name) = name_of(prefs, nr) {
                    prefs.player_team_up(&name);
                }
            }
            Op::TeamDown(nr) => {
                if let Some(name) = name_of(prefs, nr) {
                    prefs.player_team_down(&name);
                }
            }
            Op::SetAi(nr, ai) => {
                if let Some(id) = prefs.player_id(nr % prefs.tot_players()) {
                    prefs.set_player_ai(id, ai);
                }
            }
            Op::Assign(nr, capa) => {
                if let (Some(id), Some(capability)) = (prefs.player_id(nr % prefs.tot_players()), capability_at(dm, capa)) {
                    prefs.assign_capability(id, &capability);
                }
            }
            Op::Unassign(nr, capa) => {
                if let (Some(id), Some(capability)) = (prefs.player_id(nr % prefs.tot_players()), capability_at(dm, capa)) {
                    prefs.unassign_capability(id, &capability);
                }
            }
            Op::Plug(class) => {
                plug_into(dm, prefs, "dev", CLASSES[class]);
            }
            Op::Unplug(nr) => {
                let ids: Vec<i32> = dm.devices().iter().map(|d| d.id()).collect();
                if !ids.is_empty() {
                    unplug(dm, prefs, ids[nr % ids.len()]);
                }
            }
            Op::EditMode(edit) => prefs.set_edit_mode(edit),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_operations_keep_invariants(mixed in any::<bool>(), ops in proptest::collection::vec(op(), 1..40)) {
            let mut dm = device_manager();
            plug(&mut dm, "kbd", CapabilityClass::Keys);
            plug(&mut dm, "pad", CapabilityClass::Joystick);
            let config = config_with(&dm, |init| {
                three_teams(init);
                init.app_constraints.allow_mixed_ai_human_team = mixed;
                init.capability_assignment.max_explicit_per_player = 2;
            });
            let mut prefs = StdPreferences::new(config, &dm);
            check_invariants(&prefs);
            for op in &ops {
                apply(&mut prefs, &mut dm, op);
                check_invariants(&prefs);
            }
            prefs.set_edit_mode(true);
            check_invariants(&prefs);
            let copy = prefs.clone();
            check_invariants(&copy);
            prop_assert_eq!(copy.compute_hash(), prefs.compute_hash());
        }
    }
}
