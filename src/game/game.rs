//! The game tick engine.
//!
//! A game owns the variables of the game, its teams and its players, routes
//! inputs to the level drivers and keeps the completed/failed bookkeeping
//! that produces ranks, the winner and the in-game highscore.
//!
//! Depending on the layout either all teams play in one level, or each team
//! plays in a level of its own. Variables are addressed through [`VarScope`].

use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;
use std::sync::atomic::{AtomicI32, Ordering};

use tracing::{debug, error, info, trace, warn};

use crate::core::{GameRng, NamedObjIndex, OwnerType};
use crate::highscore::{Highscore, HighscoresDefinition, ScoreElement};
use crate::input::{InputEvent, KeyInputType};
use crate::prefs::AppPreferences;

use super::error::GameError;
use super::level::{KeyActionEvent, LevelContext, LevelDriver};
use super::variable::{make_variables, GameClock, Variable, VariableType, VariableValue, Variables};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Game variable: game time in milliseconds when the game ended, `-1` while running.
pub const GAME_VAR_GAME_OVER_TIME: &str = "__GameOverTime";
/// Game variable: team number of the winner, `-1` if none yet.
pub const GAME_VAR_WINNER_TEAM: &str = "__WinnerTeam";
/// Team variable: game time when the team finished, `-1` while playing.
pub const TEAM_VAR_FINISHED_TIME: &str = "__TeamFinishedTime";
/// Team variable: final rank starting from 1, `-1` while playing.
pub const TEAM_VAR_RANK: &str = "__Rank";
/// Team variable: position in the in-game highscore starting from 1.
pub const TEAM_VAR_HIGHSCORE_RANK: &str = "__HighscoreRank";
/// Team variable: one of the `TEAM_STATUS_*` values.
pub const TEAM_VAR_STATUS: &str = "__TeamStatus";
/// Player variable: game time when the player finished, `-1` while playing.
pub const PLAYER_VAR_FINISHED_TIME: &str = "__PlayerFinishedTime";
/// Player variable: one of the `PLAYER_STATUS_*` values.
pub const PLAYER_VAR_STATUS: &str = "__PlayerStatus";

/// Team is playing.
pub const TEAM_STATUS_PLAYING: i32 = 0;
/// Team completed.
pub const TEAM_STATUS_COMPLETED: i32 = 1;
/// Team failed.
pub const TEAM_STATUS_FAILED: i32 = -1;

/// Player is playing.
pub const PLAYER_STATUS_PLAYING: i32 = 0;
/// Player's team completed.
pub const PLAYER_STATUS_COMPLETED: i32 = 1;
/// Player's team failed.
pub const PLAYER_STATUS_FAILED: i32 = -1;
/// Player is out while its team still plays.
pub const PLAYER_STATUS_OUT: i32 = -2;

/// Messages sent while handling a message nested this deep are dropped.
pub const MAX_MESSAGE_DEPTH: u32 = 10;

const MAX_INTERVAL_MILLISEC: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

static NEXT_GAME_ID: AtomicI32 = AtomicI32::new(0);

fn new_game_id() -> i32 {
    NEXT_GAME_ID.fetch_add(1, Ordering::Relaxed) + 1
}

// =============================================================================
// INIT
// =============================================================================

/// Parameters of [`Game::new`].
#[derive(Clone, Debug)]
pub struct GameInit {
    /// Game name. Alphanumerics, `-` and `_` only.
    pub name: String,
    /// Game variables in id order.
    pub game_variables: Vec<(String, VariableType)>,
    /// Team variables in id order.
    pub team_variables: Vec<(String, VariableType)>,
    /// Player variables in id order.
    pub player_variables: Vec<(String, VariableType)>,
    /// One level for all teams, or one level per team.
    pub all_teams_in_one_level: bool,
    /// Base seed of the random generator.
    pub seed: u64,
    /// Shortest tick interval in milliseconds. At least 1.
    pub min_interval: f64,
    /// Tick interval levels start with, in milliseconds.
    pub initial_interval: f64,
    /// Ranking definition. Taken from `highscore` if `None`, else defaults to rank only.
    pub highscores_definition: Option<Rc<HighscoresDefinition>>,
    /// The persisted highscore table of the current preferences, if any.
    pub highscore: Option<Rc<Highscore>>,
}

impl GameInit {
    /// Defaults for a game named `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            game_variables: Vec::new(),
            team_variables: Vec::new(),
            player_variables: Vec::new(),
            all_teams_in_one_level: false,
            seed: 0,
            min_interval: 1.0,
            initial_interval: 100.0,
            highscores_definition: None,
            highscore: None,
        }
    }
}

// =============================================================================
// STATE
// =============================================================================

/// Address of a variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VarScope {
    /// Game variable.
    Game,
    /// Variable of a team within a level.
    Team {
        /// Level.
        level: usize,
        /// Team within the level.
        level_team: usize,
    },
    /// Variable of a player.
    Player {
        /// Level.
        level: usize,
        /// Team within the level.
        level_team: usize,
        /// Mate within the team.
        mate: usize,
    },
}

#[derive(Clone, Copy, Debug)]
struct SystemVarIds {
    game_over_time: usize,
    winner_team: usize,
    team_finished_time: usize,
    rank: usize,
    highscore_rank: usize,
    team_status: usize,
    player_finished_time: usize,
    player_status: usize,
}

#[derive(Clone, Debug)]
struct TeamState {
    pref_team: usize,
    variables: Variables,
    mates: Vec<Variables>,
}

#[derive(Clone, Copy, Debug)]
struct Message {
    sender: usize,
    msg: i32,
    value: i32,
    depth: u32,
}

#[derive(Clone, Debug)]
struct LevelState {
    teams: Vec<TeamState>,
    interval: f64,
    inbox: VecDeque<Message>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct OpenKeyAction {
    level: usize,
    level_team: usize,
    mate: usize,
    key_action: usize,
    capability_id: i32,
}

/// Everything of a game except the level drivers.
///
/// Drivers see it through [`LevelContext`]; highscores read it to build scores.
pub struct GameState {
    name: String,
    id: i32,
    prefs: Rc<dyn AppPreferences>,
    all_teams_in_one_level: bool,
    game_var_types: NamedObjIndex<VariableType>,
    team_var_types: NamedObjIndex<VariableType>,
    player_var_types: NamedObjIndex<VariableType>,
    sys: SystemVarIds,
    game_vars: Variables,
    levels: Vec<LevelState>,
    input_queue: VecDeque<InputEvent>,
    open_key_actions: Vec<OpenKeyAction>,
    rank_completed: i32,
    rank_failed: i32,
    ended: bool,
    ended_emitted: bool,
    tick: i32,
    in_tick: bool,
    elapsed_millisec: f64,
    min_interval: f64,
    initial_interval: f64,
    next_interval: f64,
    last_interval: f64,
    seed: u64,
    rng: GameRng,
    games_started: i32,
    highscores_definition: Rc<HighscoresDefinition>,
    highscore: Option<Rc<Highscore>>,
    in_game_highscore: Option<Highscore>,
}

impl GameState {
    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Game name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process wide id of the current (or last) game, `-1` before the first start.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// The preferences.
    pub fn prefs(&self) -> &Rc<dyn AppPreferences> {
        &self.prefs
    }

    /// Whether all teams play in level 0.
    pub fn is_all_teams_in_one_level(&self) -> bool {
        self.all_teams_in_one_level
    }

    /// Number of levels.
    pub fn tot_levels(&self) -> usize {
        self.levels.len()
    }

    /// Number of teams in a level.
    pub fn level_tot_teams(&self, level: usize) -> usize {
        self.levels[level].teams.len()
    }

    /// Number of mates of a team in a level.
    pub fn level_team_tot_mates(&self, level: usize, level_team: usize) -> usize {
        self.levels[level].teams[level_team].mates.len()
    }

    /// Preferences team of a team in a level.
    pub fn pref_team(&self, level: usize, level_team: usize) -> usize {
        self.levels[level].teams[level_team].pref_team
    }

    /// Level and team within the level of a preferences team.
    pub fn level_team_of(&self, pref_team: usize) -> (usize, usize) {
        if self.all_teams_in_one_level {
            (0, pref_team)
        } else {
            (pref_team, 0)
        }
    }

    /// Scope of the team variables of a preferences team.
    pub fn team_scope(&self, pref_team: usize) -> VarScope {
        let (level, level_team) = self.level_team_of(pref_team);
        VarScope::Team { level, level_team }
    }

    /// Scope of the variables of a player of a preferences team.
    pub fn mate_scope(&self, pref_team: usize, mate: usize) -> VarScope {
        let (level, level_team) = self.level_team_of(pref_team);
        VarScope::Player { level, level_team, mate }
    }

    /// Current game clock.
    pub fn clock(&self) -> GameClock {
        GameClock { tick: self.tick, elapsed_millisec: self.elapsed_millisec as i32, in_tick: self.in_tick }
    }

    /// Number of completed ticks.
    pub fn tick(&self) -> i32 {
        self.tick
    }

    /// Whether a tick is being processed.
    pub fn is_in_tick(&self) -> bool {
        self.in_tick
    }

    /// Game time in milliseconds.
    pub fn elapsed_millisec(&self) -> i32 {
        self.elapsed_millisec as i32
    }

    /// Whether the game was started and has not ended.
    pub fn is_running(&self) -> bool {
        !self.ended
    }

    /// Interval of the next tick in milliseconds.
    pub fn interval(&self) -> f64 {
        self.next_interval
    }

    /// Interval the current (or last) tick advanced the clock by.
    pub fn last_interval(&self) -> f64 {
        self.last_interval
    }

    /// Interval requested by a level.
    pub fn level_interval(&self, level: usize) -> f64 {
        self.levels[level].interval
    }

    /// The ranking definition.
    pub fn highscores_definition(&self) -> &Rc<HighscoresDefinition> {
        &self.highscores_definition
    }

    /// The persisted highscore table the game was created with.
    pub fn highscore(&self) -> Option<&Rc<Highscore>> {
        self.highscore.as_ref()
    }

    /// Ranking of the teams of the current (or last) game.
    pub fn in_game_highscore(&self) -> Option<&Highscore> {
        self.in_game_highscore.as_ref()
    }

    fn var_types(&self, owner: OwnerType) -> &NamedObjIndex<VariableType> {
        match owner {
            OwnerType::Game => &self.game_var_types,
            OwnerType::Team => &self.team_var_types,
            OwnerType::Player => &self.player_var_types,
        }
    }

    /// Id and owner of a variable by name.
    pub fn variable_id_and_owner(&self, name: &str) -> Option<(usize, OwnerType)> {
        OwnerType::ALL
            .iter()
            .find_map(|&owner| self.var_types(owner).index_of(name).map(|id| (id, owner)))
    }

    /// Whether `id` is a variable of the owner type.
    pub fn has_variable_id(&self, id: usize, owner: OwnerType) -> bool {
        id < self.var_types(owner).len()
    }

    /// Name of a variable.
    pub fn variable_name(&self, id: usize, owner: OwnerType) -> &str {
        self.var_types(owner).name(id)
    }

    /// A variable. Panics if the id or scope is out of range.
    pub fn variable(&self, id: usize, scope: VarScope) -> &Variable {
        match scope {
            VarScope::Game => &self.game_vars[id],
            VarScope::Team { level, level_team } => &self.levels[level].teams[level_team].variables[id],
            VarScope::Player { level, level_team, mate } => &self.levels[level].teams[level_team].mates[mate][id],
        }
    }

    fn variable_mut(&mut self, id: usize, scope: VarScope) -> &mut Variable {
        match scope {
            VarScope::Game => &mut self.game_vars[id],
            VarScope::Team { level, level_team } => &mut self.levels[level].teams[level_team].variables[id],
            VarScope::Player { level, level_team, mate } => &mut self.levels[level].teams[level_team].mates[mate][id],
        }
    }

    /// Current value of a variable.
    pub fn variable_get(&self, id: usize, scope: VarScope) -> i32 {
        self.variable(id, scope).get(&self.clock())
    }

    /// Current value of a variable with its format.
    pub fn variable_value(&self, id: usize, scope: VarScope) -> VariableValue {
        self.variable(id, scope).value(&self.clock())
    }

    /// Set a variable. Ignored for read-only and inhibited variables.
    pub fn set_variable(&mut self, id: usize, scope: VarScope, value: i32) {
        let clock = self.clock();
        self.variable_mut(id, scope).set(&clock, value);
    }

    /// Add to a variable.
    pub fn inc_variable(&mut self, id: usize, scope: VarScope, delta: i32) {
        let clock = self.clock();
        self.variable_mut(id, scope).inc(&clock, delta);
    }

    /// Id of the `__TeamFinishedTime` team variable.
    pub fn team_var_id_finished_time(&self) -> usize {
        self.sys.team_finished_time
    }

    /// Id of the `__Rank` team variable.
    pub fn team_var_id_rank(&self) -> usize {
        self.sys.rank
    }

    /// Id of the `__HighscoreRank` team variable.
    pub fn team_var_id_highscore_rank(&self) -> usize {
        self.sys.highscore_rank
    }

    /// Id of the `__TeamStatus` team variable.
    pub fn team_var_id_status(&self) -> usize {
        self.sys.team_status
    }

    /// Id of the `__PlayerFinishedTime` player variable.
    pub fn player_var_id_finished_time(&self) -> usize {
        self.sys.player_finished_time
    }

    /// Id of the `__PlayerStatus` player variable.
    pub fn player_var_id_status(&self) -> usize {
        self.sys.player_status
    }

    /// Id of the `__GameOverTime` game variable.
    pub fn game_var_id_game_over_time(&self) -> usize {
        self.sys.game_over_time
    }

    /// Id of the `__WinnerTeam` game variable.
    pub fn game_var_id_winner_team(&self) -> usize {
        self.sys.winner_team
    }

    /// Preferences team of the winner, if decided.
    pub fn winner_team(&self) -> Option<usize> {
        usize::try_from(self.variable_get(self.sys.winner_team, VarScope::Game)).ok()
    }

    /// Whether a team has not finished yet.
    pub fn is_team_playing(&self, level: usize, level_team: usize) -> bool {
        self.variable_get(self.sys.team_finished_time, VarScope::Team { level, level_team }) < 0
    }

    fn team_slots(&self) -> Vec<(usize, usize)> {
        self.levels
            .iter()
            .enumerate()
            .flat_map(|(level, state)| (0..state.teams.len()).map(move |level_team| (level, level_team)))
            .collect()
    }

    fn playing_teams(&self) -> usize {
        if self.ended {
            return 0;
        }
        let playing = self
            .team_slots()
            .into_iter()
            .filter(|&(level, level_team)| self.is_team_playing(level, level_team))
            .count();
        debug_assert_eq!(self.rank_failed + 1 - self.rank_completed, playing as i32);
        playing
    }

    /// The only human player that is still playing, if exactly one exists.
    fn unique_active_human(&self) -> Option<(usize, usize, usize)> {
        let clock = self.clock();
        let mut found = None;
        for (level, state) in self.levels.iter().enumerate() {
            for (level_team, team) in state.teams.iter().enumerate() {
                for (mate, vars) in team.mates.iter().enumerate() {
                    if self.prefs.is_mate_ai(team.pref_team, mate)
                        || vars[self.sys.player_status].get(&clock) != PLAYER_STATUS_PLAYING
                    {
                        continue;
                    }
                    if found.is_some() {
                        return None;
                    }
                    found = Some((level, level_team, mate));
                }
            }
        }
        found
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    fn build_levels(&self) -> Vec<LevelState> {
        let tot_teams = self.prefs.tot_teams();
        let groups: Vec<Vec<usize>> = if self.all_teams_in_one_level {
            vec![(0..tot_teams).collect()]
        } else {
            (0..tot_teams).map(|team| vec![team]).collect()
        };
        groups
            .into_iter()
            .map(|teams| LevelState {
                teams: teams
                    .into_iter()
                    .map(|pref_team| TeamState {
                        pref_team,
                        variables: make_variables(self.team_var_types.iter().map(|(_, t)| t)),
                        mates: (0..self.prefs.team_tot_mates(pref_team))
                            .map(|_| make_variables(self.player_var_types.iter().map(|(_, t)| t)))
                            .collect(),
                    })
                    .collect(),
                interval: self.initial_interval,
                inbox: VecDeque::new(),
            })
            .collect()
    }

    fn begin(&mut self) {
        self.id = new_game_id();
        self.ended = false;
        self.ended_emitted = false;
        self.rank_completed = 1;
        self.rank_failed = self.prefs.tot_teams() as i32;
        self.tick = 0;
        self.in_tick = false;
        self.elapsed_millisec = 0.0;
        self.game_vars = make_variables(self.game_var_types.iter().map(|(_, t)| t));
        self.levels = self.build_levels();
        self.input_queue.clear();
        self.open_key_actions.clear();
        self.in_game_highscore = Some(Highscore::empty(Rc::clone(&self.highscores_definition)));
        self.rng = GameRng::for_game(&self.name, self.seed, self.games_started);
        self.games_started += 1;
    }

    // -------------------------------------------------------------------------
    // Status
    // -------------------------------------------------------------------------

    fn set_team_status(&mut self, level: usize, level_team: usize, completed: bool) {
        let clock = self.clock();
        let sys = self.sys;
        let team = &mut self.levels[level].teams[level_team];
        team.variables[sys.team_finished_time].force_set(&clock, clock.elapsed_millisec);
        let status = if completed { TEAM_STATUS_COMPLETED } else { TEAM_STATUS_FAILED };
        team.variables[sys.team_status].force_set(&clock, status);
        team.variables.iter_mut().for_each(|var| var.inhibit(&clock));
        let mate_status = if completed { PLAYER_STATUS_COMPLETED } else { PLAYER_STATUS_FAILED };
        for mate in &mut team.mates {
            mate.iter_mut().for_each(|var| var.inhibit(&clock));
            // Players already out keep their status
            if mate[sys.player_finished_time].get(&clock) < 0 {
                mate[sys.player_status].force_set(&clock, mate_status);
                mate[sys.player_finished_time].force_set(&clock, clock.elapsed_millisec);
            }
        }
    }

    fn set_team_rank(&mut self, level: usize, level_team: usize, rank: i32) {
        let clock = self.clock();
        let rank_id = self.sys.rank;
        self.levels[level].teams[level_team].variables[rank_id].force_set(&clock, rank);
    }

    fn set_winner(&mut self, level: usize, level_team: usize) {
        let clock = self.clock();
        let winner = self.pref_team(level, level_team) as i32;
        self.game_vars[self.sys.winner_team].force_set(&clock, winner);
    }

    pub(crate) fn status_completed(&mut self, level: usize, level_team: usize, force_others_failed: bool) -> bool {
        if self.ended || !self.is_team_playing(level, level_team) {
            return false;
        }
        self.set_team_status(level, level_team, true);
        let rank = self.rank_completed;
        if rank == 1 {
            self.set_winner(level, level_team);
        }
        self.rank_completed += 1;
        self.set_team_rank(level, level_team, rank);
        debug!(level, level_team, rank, "Team completed");

        if force_others_failed {
            for (other_level, other_team) in self.team_slots() {
                if self.is_team_playing(other_level, other_team) {
                    self.status_failed(other_level, other_team, false);
                }
            }
        }
        if !self.ended && self.playing_teams() == 0 {
            self.game_has_ended();
        }
        true
    }

    pub(crate) fn status_failed(&mut self, level: usize, level_team: usize, force_other_completed: bool) -> bool {
        if self.ended || !self.is_team_playing(level, level_team) {
            return false;
        }
        self.set_team_status(level, level_team, false);
        let rank = self.rank_failed;
        if rank == 1 {
            // The last team to fail wins
            self.set_winner(level, level_team);
        }
        self.rank_failed -= 1;
        self.set_team_rank(level, level_team, rank);
        debug!(level, level_team, rank, "Team failed");

        if force_other_completed {
            let playing: Vec<(usize, usize)> = self
                .team_slots()
                .into_iter()
                .filter(|&(l, t)| self.is_team_playing(l, t))
                .collect();
            if let [(last_level, last_team)] = playing[..] {
                self.status_completed(last_level, last_team, false);
            }
        }
        if !self.ended && self.playing_teams() == 0 {
            self.game_has_ended();
        }
        true
    }

    pub(crate) fn status_player_out(&mut self, level: usize, level_team: usize, mate: usize, force_other_completed: bool) -> bool {
        if self.ended || !self.is_team_playing(level, level_team) {
            return false;
        }
        let clock = self.clock();
        let sys = self.sys;
        let team = &mut self.levels[level].teams[level_team];
        let vars = &mut team.mates[mate];
        if vars[sys.player_finished_time].get(&clock) >= 0 {
            return false;
        }
        vars[sys.player_finished_time].force_set(&clock, clock.elapsed_millisec);
        vars[sys.player_status].force_set(&clock, PLAYER_STATUS_OUT);
        vars.iter_mut().for_each(|var| var.inhibit(&clock));
        let all_out = team.mates.iter().all(|vars| vars[sys.player_finished_time].get(&clock) >= 0);
        debug!(level, level_team, mate, all_out, "Player out");
        if all_out {
            self.status_failed(level, level_team, force_other_completed);
        }
        true
    }

    pub(crate) fn status_technical(&mut self, level: usize, issue: &[String]) {
        if self.ended {
            return;
        }
        error!(game = %self.name, level, tick = self.tick, issue = ?issue, "Technical game over");
        self.ended = true;
        self.ended_emitted = false;
    }

    fn game_has_ended(&mut self) {
        let clock = self.clock();
        self.game_vars[self.sys.game_over_time].force_set(&clock, clock.elapsed_millisec);
        if let Some(mut highscore) = self.in_game_highscore.take() {
            highscore.include_game(self, false);
            let highscore_rank = self.sys.highscore_rank;
            for (position, score) in highscore.scores().iter().enumerate() {
                if let Some(pref_team) = score.team() {
                    let (level, level_team) = self.level_team_of(pref_team);
                    self.levels[level].teams[level_team].variables[highscore_rank].force_set(&clock, position as i32 + 1);
                }
            }
            self.in_game_highscore = Some(highscore);
        }
        self.game_vars.iter_mut().for_each(|var| var.inhibit(&clock));
        self.ended = true;
        self.ended_emitted = false;
        info!(game = %self.name, id = self.id, tick = self.tick, winner = ?self.winner_team(), "Game over");
    }

    fn end(&mut self) {
        for (level, level_team) in self.team_slots() {
            self.status_failed(level, level_team, false);
        }
        self.ended = true;
        self.ended_emitted = true;
    }

    // -------------------------------------------------------------------------
    // Messages, intervals, randomness, input
    // -------------------------------------------------------------------------

    pub(crate) fn others_send(&mut self, sender: usize, msg: i32, value: i32, depth: u32) {
        if depth >= MAX_MESSAGE_DEPTH {
            warn!(sender, msg, value, depth, "Message dropped: nesting too deep");
            return;
        }
        for (level, state) in self.levels.iter_mut().enumerate() {
            if level != sender {
                state.inbox.push_back(Message { sender, msg, value, depth });
            }
        }
    }

    pub(crate) fn set_level_interval(&mut self, level: usize, interval_millisec: f64) {
        self.levels[level].interval = interval_millisec;
        self.changed_interval(level);
    }

    fn changed_interval(&mut self, level: usize) {
        let interval = self.levels[level].interval.max(self.min_interval);
        if interval < self.next_interval {
            self.next_interval = interval;
        } else if interval > self.next_interval {
            // Might slow down if this level was the fastest
            self.calc_game_interval();
        }
    }

    fn calc_game_interval(&mut self) {
        let smallest = self.levels.iter().map(|level| level.interval).fold(MAX_INTERVAL_MILLISEC, f64::min);
        self.next_interval = smallest.max(self.min_interval);
    }

    /// Random number in `from..=to`.
    pub fn random(&mut self, from: i32, to: i32) -> i32 {
        debug_assert!(from <= to);
        self.rng.between(from, to)
    }

    /// Queue an input. Ignored once the game ended.
    ///
    /// Inputs queued between ticks are dispatched at the start of the next
    /// tick, inputs queued during a tick before the tick ends.
    pub fn handle_input(&mut self, event: InputEvent) {
        if self.ended {
            return;
        }
        self.input_queue.push_back(event);
    }

    /// Record a key action transition. Returns whether it must be dispatched.
    fn track_key_action(&mut self, open: OpenKeyAction, input_type: KeyInputType) -> bool {
        match input_type {
            KeyInputType::Press => {
                let already_open = self.open_key_actions.iter().any(|oka| {
                    oka.key_action == open.key_action
                        && oka.level == open.level
                        && oka.level_team == open.level_team
                        && oka.mate == open.mate
                });
                if already_open {
                    return false;
                }
                self.open_key_actions.push(open);
                true
            }
            KeyInputType::Release | KeyInputType::ReleaseCancel => {
                match self.open_key_actions.iter().position(|oka| *oka == open) {
                    Some(idx) => {
                        self.open_key_actions.swap_remove(idx);
                        true
                    }
                    None => false,
                }
            }
        }
    }
}

// =============================================================================
// GAME
// =============================================================================

/// Result of a tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickResult {
    /// The tick that was processed.
    pub tick: i32,
    /// Whether the game ended. Reported once.
    pub game_ended: bool,
    /// Preferences team of the winner, if any.
    pub winner_team: Option<usize>,
}

/// A game: its state plus one driver per level.
pub struct Game {
    state: GameState,
    drivers: Vec<Box<dyn LevelDriver>>,
}

fn register_variables(
    owner: OwnerType,
    variables: Vec<(String, VariableType)>,
    seen: &mut BTreeSet<String>,
) -> Result<NamedObjIndex<VariableType>, GameError> {
    let mut types = NamedObjIndex::new();
    for (name, var_type) in variables {
        if name.is_empty() {
            return Err(GameError::EmptyVariableName(owner));
        }
        if name.starts_with("__") {
            return Err(GameError::ReservedVariableName(name));
        }
        if !seen.insert(name.clone()) {
            return Err(GameError::DuplicateVariable(name));
        }
        types.add(&name, var_type);
    }
    Ok(types)
}

impl Game {
    /// Build a game for the current preferences.
    ///
    /// `create_level` is called once per level with the level number and the
    /// freshly built state, which can be used to look up variable ids.
    pub fn new<F>(init: GameInit, prefs: Rc<dyn AppPreferences>, mut create_level: F) -> Result<Self, GameError>
    where
        F: FnMut(usize, &GameState) -> Box<dyn LevelDriver>,
    {
        let name_ok = !init.name.is_empty()
            && init.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !name_ok {
            return Err(GameError::InvalidName(init.name));
        }
        let tot_teams = prefs.tot_teams();
        if tot_teams == 0 {
            return Err(GameError::NoTeams);
        }

        let mut seen = BTreeSet::new();
        let mut game_var_types = register_variables(OwnerType::Game, init.game_variables, &mut seen)?;
        let mut team_var_types = register_variables(OwnerType::Team, init.team_variables, &mut seen)?;
        let mut player_var_types = register_variables(OwnerType::Player, init.player_variables, &mut seen)?;

        let system = VariableType::read_only(-1);
        let sys = SystemVarIds {
            game_over_time: game_var_types.add(GAME_VAR_GAME_OVER_TIME, system),
            winner_team: game_var_types.add(GAME_VAR_WINNER_TEAM, system),
            team_finished_time: team_var_types.add(TEAM_VAR_FINISHED_TIME, system),
            rank: team_var_types.add(TEAM_VAR_RANK, system),
            highscore_rank: team_var_types.add(TEAM_VAR_HIGHSCORE_RANK, system),
            team_status: team_var_types.add(TEAM_VAR_STATUS, VariableType::read_only(TEAM_STATUS_PLAYING)),
            player_finished_time: player_var_types.add(PLAYER_VAR_FINISHED_TIME, system),
            player_status: player_var_types.add(PLAYER_VAR_STATUS, VariableType::read_only(PLAYER_STATUS_PLAYING)),
        };

        let mut definition = init.highscores_definition;
        if let Some(highscore) = &init.highscore {
            match &definition {
                Some(def) if **def != **highscore.definition() => {
                    return Err(GameError::HighscoreDefinitionMismatch);
                }
                Some(_) => {}
                None => definition = Some(Rc::clone(highscore.definition())),
            }
        }
        let definition = match definition {
            Some(def) => def,
            None => Rc::new(HighscoresDefinition::new(
                Rc::clone(prefs.std_config()),
                Vec::new(),
                Vec::new(),
                Vec::new(),
                vec![ScoreElement::new("Rank", TEAM_VAR_RANK, true)],
                tot_teams,
            )?),
        };
        if definition.max_scores() < tot_teams {
            return Err(GameError::HighscoreTooSmall { max_scores: definition.max_scores(), teams: tot_teams });
        }

        let min_interval = init.min_interval.max(1.0);
        let initial_interval = init.initial_interval.max(min_interval);
        let game_vars = make_variables(game_var_types.iter().map(|(_, t)| t));
        let mut state = GameState {
            name: init.name,
            id: -1,
            prefs,
            all_teams_in_one_level: init.all_teams_in_one_level,
            game_var_types,
            team_var_types,
            player_var_types,
            sys,
            game_vars,
            levels: Vec::new(),
            input_queue: VecDeque::new(),
            open_key_actions: Vec::new(),
            rank_completed: 1,
            rank_failed: tot_teams as i32,
            ended: true,
            ended_emitted: true,
            tick: 0,
            in_tick: false,
            elapsed_millisec: 0.0,
            min_interval,
            initial_interval,
            next_interval: initial_interval,
            last_interval: initial_interval,
            seed: init.seed,
            rng: GameRng::seeded(init.seed),
            games_started: 0,
            highscores_definition: definition,
            highscore: init.highscore,
            in_game_highscore: None,
        };
        state.levels = state.build_levels();
        state
            .highscores_definition
            .is_compatible_with_game(&state)
            .map_err(GameError::IncompatibleHighscore)?;

        let drivers = (0..state.levels.len()).map(|level| create_level(level, &state)).collect();
        debug!(game = %state.name, levels = state.levels.len(), teams = tot_teams, "Game created");
        Ok(Self { state, drivers })
    }

    /// Read access to the state.
    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Mutable access to the state, e.g. to set variables between ticks.
    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    /// Whether the game was started and has not ended.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    fn with_level<R>(&mut self, level: usize, depth: u32, f: impl FnOnce(&mut dyn LevelDriver, &mut LevelContext<'_>) -> R) -> R {
        let mut ctx = LevelContext::new(&mut self.state, level, depth);
        f(self.drivers[level].as_mut(), &mut ctx)
    }

    /// Start (or restart) the game. Ignored while running.
    pub fn start(&mut self) {
        if self.state.is_running() {
            return;
        }
        self.state.begin();
        for level in 0..self.drivers.len() {
            self.with_level(level, 0, |driver, ctx| driver.game_start(ctx));
        }
        self.state.calc_game_interval();
        self.state.last_interval = self.state.next_interval;
        info!(game = %self.state.name, id = self.state.id, teams = self.state.prefs.tot_teams(), "Game started");
    }

    /// Queue an input. See [`GameState::handle_input`].
    pub fn handle_input(&mut self, event: InputEvent) {
        self.state.handle_input(event);
    }

    /// Advance the game by one tick.
    ///
    /// 1. Pre-timer callbacks
    /// 2. Dispatch queued inputs
    /// 3. Level ticks
    /// 4. Deliver messages and inputs until none are left
    /// 5. Post-timer callbacks
    pub fn handle_timer(&mut self) -> TickResult {
        self.state.last_interval = self.state.next_interval;
        let tot_levels = self.drivers.len();
        for level in 0..tot_levels {
            self.with_level(level, 0, |driver, ctx| driver.pre_timer(ctx));
        }

        self.state.in_tick = true;
        while let Some(event) = self.state.input_queue.pop_front() {
            self.dispatch_input(&event);
        }
        for level in 0..tot_levels {
            self.with_level(level, 0, |driver, ctx| driver.handle_timer(ctx));
        }
        self.deliver_pending();
        self.state.in_tick = false;

        for level in 0..tot_levels {
            self.with_level(level, 0, |driver, ctx| driver.post_timer(ctx));
        }

        let mut result = TickResult { tick: self.state.tick, ..TickResult::default() };
        if self.state.ended && !self.state.ended_emitted {
            self.state.ended_emitted = true;
            result.game_ended = true;
            result.winner_team = self.state.winner_team();
        }
        self.state.tick += 1;
        self.state.elapsed_millisec += self.state.last_interval;
        result
    }

    fn deliver_pending(&mut self) {
        loop {
            if let Some(event) = self.state.input_queue.pop_front() {
                self.dispatch_input(&event);
                continue;
            }
            let Some(level) = self.state.levels.iter().position(|state| !state.inbox.is_empty()) else {
                break;
            };
            while let Some(message) = self.state.levels[level].inbox.pop_front() {
                self.with_level(level, message.depth + 1, |driver, ctx| {
                    driver.others_receive(ctx, message.sender, message.msg, message.value)
                });
            }
        }
    }

    fn dispatch_input(&mut self, event: &InputEvent) {
        let prefs = Rc::clone(&self.state.prefs);
        let capability_id = event.capability_id();
        for (key, input_type) in event.as_keys() {
            let Some((pref_team, mate, key_action)) = prefs.key_action_from_capability_key(capability_id, key) else {
                continue;
            };
            let (level, level_team) = self.state.level_team_of(pref_team);
            let open = OpenKeyAction { level, level_team, mate, key_action, capability_id };
            if !self.state.track_key_action(open, input_type) {
                continue;
            }
            let ka_event = KeyActionEvent {
                time_usec: event.time_usec,
                capability: Rc::clone(&event.capability),
                input_type,
                key_action,
            };
            self.with_level(level, 0, |driver, ctx| driver.handle_key_action(ctx, level_team, mate, &ka_event));
        }

        let target = match prefs.capability_player(capability_id) {
            Some((pref_team, mate)) => {
                let (level, level_team) = self.state.level_team_of(pref_team);
                Some((level, level_team, mate))
            }
            None if prefs.std_config().is_auto_assign_to_active_player() => self.state.unique_active_human(),
            None => None,
        };
        match target {
            Some((level, level_team, mate)) => {
                self.with_level(level, 0, |driver, ctx| driver.handle_input(ctx, level_team, mate, event));
            }
            None => trace!(capability_id, "Input without player dropped"),
        }
    }

    /// End the game. Teams still playing fail. No end of game is reported.
    pub fn end(&mut self) {
        self.state.end();
    }

    /// A team completed. See [`LevelContext::status_completed`].
    pub fn status_completed(&mut self, level: usize, level_team: usize, force_others_failed: bool) -> bool {
        self.state.status_completed(level, level_team, force_others_failed)
    }

    /// A team failed. See [`LevelContext::status_failed`].
    pub fn status_failed(&mut self, level: usize, level_team: usize, force_other_completed: bool) -> bool {
        self.state.status_failed(level, level_team, force_other_completed)
    }

    /// A player is out. See [`LevelContext::status_player_out`].
    pub fn status_player_out(&mut self, level: usize, level_team: usize, mate: usize, force_other_completed: bool) -> bool {
        self.state.status_player_out(level, level_team, mate, force_other_completed)
    }

    /// Abort the game. See [`LevelContext::status_technical`].
    pub fn status_technical(&mut self, level: usize, issue: &[String]) {
        self.state.status_technical(level, issue);
    }

    /// Random number in `from..=to`.
    pub fn random(&mut self, from: i32, to: i32) -> i32 {
        self.state.random(from, to)
    }
}

// =============================================================================
// TESTS
// =============================================================================
