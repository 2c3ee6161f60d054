//! Level simulation seam.
//!
//! The game engine owns variables, ranks and input routing. What happens
//! inside a level (boards, blocks, animations) is supplied by a
//! [`LevelDriver`]. Drivers act on the game only through a
//! [`LevelContext`], which scopes every call to the driver's level.

use std::rc::Rc;

use crate::core::OwnerType;
use crate::input::{Capability, InputEvent, KeyInputType};
use crate::prefs::AppPreferences;

use super::game::{GameState, VarScope};
use super::variable::{GameClock, Variable};

// =============================================================================
// KEY ACTION EVENT
// =============================================================================

/// A key bound to a key action of a player was pressed or released.
#[derive(Clone, Debug)]
pub struct KeyActionEvent {
    /// Timestamp of the originating input, in microseconds.
    pub time_usec: i64,
    /// Capability the key belongs to.
    pub capability: Rc<Capability>,
    /// Press, release or cancel.
    pub input_type: KeyInputType,
    /// Index of the key action in the config.
    pub key_action: usize,
}

// =============================================================================
// DRIVER
// =============================================================================

/// The simulation of one level.
///
/// One driver is created per level when the game is built. All callbacks
/// run synchronously within [`super::Game::start`] or
/// [`super::Game::handle_timer`].
pub trait LevelDriver {
    /// Called by [`super::Game::start`] after the variables were reset.
    fn game_start(&mut self, _ctx: &mut LevelContext<'_>) {}

    /// Called at the very beginning of a tick, before inputs are dispatched.
    fn pre_timer(&mut self, _ctx: &mut LevelContext<'_>) {}

    /// Advance the level by one tick.
    fn handle_timer(&mut self, ctx: &mut LevelContext<'_>);

    /// Called at the end of a tick, after all messages were delivered.
    fn post_timer(&mut self, _ctx: &mut LevelContext<'_>) {}

    /// A key action of a player of this level.
    fn handle_key_action(&mut self, _ctx: &mut LevelContext<'_>, _level_team: usize, _mate: usize, _event: &KeyActionEvent) {}

    /// A raw input routed to a player of this level.
    fn handle_input(&mut self, _ctx: &mut LevelContext<'_>, _level_team: usize, _mate: usize, _event: &InputEvent) {}

    /// A message sent by another level with [`LevelContext::others_send`].
    fn others_receive(&mut self, _ctx: &mut LevelContext<'_>, _sender_level: usize, _msg: i32, _value: i32) {}
}

// =============================================================================
// CONTEXT
// =============================================================================

/// The game as seen by the driver of one level.
pub struct LevelContext<'a> {
    state: &'a mut GameState,
    level: usize,
    depth: u32,
}

impl<'a> LevelContext<'a> {
    pub(crate) fn new(state: &'a mut GameState, level: usize, depth: u32) -> Self {
        Self { state, level, depth }
    }

    /// The level this context is bound to.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Read access to the whole game.
    pub fn game(&self) -> &GameState {
        self.state
    }

    /// The preferences the game was built from.
    pub fn prefs(&self) -> &Rc<dyn AppPreferences> {
        self.state.prefs()
    }

    /// Current game clock.
    pub fn clock(&self) -> GameClock {
        self.state.clock()
    }

    /// Number of teams playing in this level.
    pub fn tot_level_teams(&self) -> usize {
        self.state.level_tot_teams(self.level)
    }

    /// Number of mates of a team of this level.
    pub fn tot_mates(&self, level_team: usize) -> usize {
        self.state.level_team_tot_mates(self.level, level_team)
    }

    /// Id and owner of a variable by name.
    pub fn variable_id_and_owner(&self, name: &str) -> Option<(usize, OwnerType)> {
        self.state.variable_id_and_owner(name)
    }

    /// A game variable.
    pub fn game_variable(&self, id: usize) -> &Variable {
        self.state.variable(id, VarScope::Game)
    }

    /// A team variable of this level.
    pub fn team_variable(&self, id: usize, level_team: usize) -> &Variable {
        self.state.variable(id, VarScope::Team { level: self.level, level_team })
    }

    /// A player variable of this level.
    pub fn mate_variable(&self, id: usize, level_team: usize, mate: usize) -> &Variable {
        self.state.variable(id, VarScope::Player { level: self.level, level_team, mate })
    }

    /// Set a variable. `scope` may address any level.
    pub fn set_variable(&mut self, id: usize, scope: VarScope, value: i32) {
        self.state.set_variable(id, scope, value);
    }

    /// Add to a variable. `scope` may address any level.
    pub fn inc_variable(&mut self, id: usize, scope: VarScope, delta: i32) {
        self.state.inc_variable(id, scope, delta);
    }

    /// A team of this level completed. Returns `false` if it already finished.
    pub fn status_completed(&mut self, level_team: usize, force_others_failed: bool) -> bool {
        self.state.status_completed(self.level, level_team, force_others_failed)
    }

    /// A team of this level failed. Returns `false` if it already finished.
    pub fn status_failed(&mut self, level_team: usize, force_other_completed: bool) -> bool {
        self.state.status_failed(self.level, level_team, force_other_completed)
    }

    /// A player of this level is out. The team fails with its last player.
    pub fn status_player_out(&mut self, level_team: usize, mate: usize, force_other_completed: bool) -> bool {
        self.state.status_player_out(self.level, level_team, mate, force_other_completed)
    }

    /// Abort the game because of an unrecoverable level error.
    pub fn status_technical(&mut self, issue: &[String]) {
        self.state.status_technical(self.level, issue);
    }

    /// Whether a team of this level is still playing.
    pub fn is_team_playing(&self, level_team: usize) -> bool {
        self.state.is_team_playing(self.level, level_team)
    }

    /// Deliver a message to every other level within this tick.
    pub fn others_send(&mut self, msg: i32, value: i32) {
        self.state.others_send(self.level, msg, value, self.depth);
    }

    /// Change the preferred tick interval of this level, in milliseconds.
    pub fn set_interval(&mut self, interval_millisec: f64) {
        self.state.set_level_interval(self.level, interval_millisec);
    }

    /// Random number in `from..=to` from the game's seeded generator.
    pub fn random(&mut self, from: i32, to: i32) -> i32 {
        self.state.random(from, to)
    }

    /// Inject an input. It is dispatched before the current tick ends.
    pub fn push_input(&mut self, event: InputEvent) {
        self.state.handle_input(event);
    }
}
