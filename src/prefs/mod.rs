//! Player, team and capability preferences.
//!
//! ## Module Structure
//!
//! - `arena`: Team and player storage with generation checked handles
//! - `std_preferences`: The editable preferences engine
//!
//! ## Read-only interface
//!
//! Games, highscores and layouts only see [`AppPreferences`]: plain
//! index based queries (team number, mate number within the team) that
//! never mutate. Structural edits go through [`StdPreferences`].

pub mod arena;
pub mod std_preferences;

use std::rc::Rc;

use crate::config::StdConfig;
use crate::core::{OwnerType, Variant};
use crate::input::HardwareKey;

pub use arena::PlayerId;
pub use std_preferences::{PrefPlayer, PrefTeam, StdPreferences};

/// Read-only view of the preferences.
///
/// Teams are numbered `0..tot_teams()`, mates `0..team_tot_mates(team)`
/// and players `0..tot_players()` in team then mate order. Methods taking
/// indices panic if they are out of range.
pub trait AppPreferences {
    /// The configuration the preferences were built from.
    fn std_config(&self) -> &Rc<StdConfig>;

    /// Number of teams.
    fn tot_teams(&self) -> usize;

    /// Number of players over all teams.
    fn tot_players(&self) -> usize;

    /// Team name.
    fn team_name(&self, team: usize) -> &str;

    /// Number of mates of a team.
    fn team_tot_mates(&self, team: usize) -> usize;

    /// Number of AI mates of a team.
    fn team_tot_ai_mates(&self, team: usize) -> usize;

    /// Name of a player.
    fn mate_name(&self, team: usize, mate: usize) -> &str;

    /// Whether a player is an AI.
    fn is_mate_ai(&self, team: usize, mate: usize) -> bool;

    /// Value of a game option. `Variant::Null` if unknown.
    fn option_value(&self, name: &str) -> Variant;

    /// Value of a team option. `Variant::Null` if unknown.
    fn team_option_value(&self, team: usize, name: &str) -> Variant;

    /// Value of a player option. `Variant::Null` if unknown.
    fn mate_option_value(&self, team: usize, mate: usize, name: &str) -> Variant;

    /// Team and mate of the player with the given number.
    fn teammate(&self, player: usize) -> (usize, usize);

    /// Team and mate of the player a capability acts for.
    ///
    /// Either the capability is assigned to the player or it is implicitly
    /// owned by the only human player.
    fn capability_player(&self, capability_id: i32) -> Option<(usize, usize)>;

    /// Team, mate and key action bound to a key of a capability.
    fn key_action_from_capability_key(&self, capability_id: i32, key: HardwareKey) -> Option<(usize, usize, usize)>;

    /// Whether a team has no human mate.
    fn is_team_ai(&self, team: usize) -> bool {
        self.team_tot_ai_mates(team) == self.team_tot_mates(team)
    }

    /// Number of AI players.
    fn tot_ai_players(&self) -> usize {
        (0..self.tot_teams()).map(|team| self.team_tot_ai_mates(team)).sum()
    }

    /// Number of human players.
    fn tot_human_players(&self) -> usize {
        self.tot_players() - self.tot_ai_players()
    }

    /// Number of AI teams.
    fn tot_ai_teams(&self) -> usize {
        (0..self.tot_teams()).filter(|&team| self.is_team_ai(team)).count()
    }

    /// Number of teams with at least one human.
    fn tot_human_teams(&self) -> usize {
        self.tot_teams() - self.tot_ai_teams()
    }

    /// Whether an option is enabled in the scope of a team or mate.
    ///
    /// `team` is ignored for game options, `mate` for game and team options.
    /// Master values are read in the same scope, narrowed to each master's owner.
    fn is_option_enabled(&self, option_owner: OwnerType, option_name: &str, team: usize, mate: usize) -> bool {
        let Some(option) = self.std_config().option(option_owner, option_name) else {
            return false;
        };
        option.is_master_or_enabled_slave(|master| {
            let value = match master.owner() {
                OwnerType::Game => self.option_value(master.name()),
                OwnerType::Team => self.team_option_value(team, master.name()),
                OwnerType::Player => self.mate_option_value(team, mate, master.name()),
            };
            (!value.is_null()).then_some(value)
        })
    }
}
