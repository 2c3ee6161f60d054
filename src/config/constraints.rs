//! Team and player cardinality constraints.
//!
//! [`AppConstraints`] bound every structural edit of the preferences.
//! [`GameConstraints`] narrow them down for a specific game and decide
//! whether the current preferences can play it.

use serde::{Deserialize, Serialize};

use crate::prefs::AppPreferences;

// =============================================================================
// APP CONSTRAINTS
// =============================================================================

/// Application wide limits on teams, mates and players.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConstraints {
    /// Minimum number of teams. Must be positive.
    pub teams_min: i32,
    /// Maximum number of teams. Not smaller than `teams_min`.
    pub teams_max: i32,
    /// Maximum number of mates in a team. Must be positive.
    pub mates_per_team_max: i32,
    /// Maximum number of AI mates in a team. `0` disables AI players.
    pub ai_mates_per_team_max: i32,
    /// Whether a team can have both AI and human mates.
    pub allow_mixed_ai_human_team: bool,
    /// Maximum number of players in a game.
    pub players_max: i32,
}

impl Default for AppConstraints {
    fn default() -> Self {
        Self {
            teams_min: 1,
            teams_max: 1,
            mates_per_team_max: 1,
            ai_mates_per_team_max: 0,
            allow_mixed_ai_human_team: false,
            players_max: 1,
        }
    }
}

impl AppConstraints {
    /// Effective maximum number of teams.
    #[inline]
    pub fn max_teams(&self) -> i32 {
        self.teams_max.min(self.players_max)
    }

    /// Effective maximum number of mates per team.
    #[inline]
    pub fn max_teammates(&self) -> i32 {
        self.mates_per_team_max.min(self.players_max)
    }

    /// Effective maximum number of players.
    #[inline]
    pub fn max_players(&self) -> i32 {
        self.players_max.min(self.teams_max * self.mates_per_team_max)
    }

    /// Whether AI players are allowed at all.
    #[inline]
    pub fn allows_ai(&self) -> bool {
        self.ai_mates_per_team_max > 0
    }

    /// Whether the values are consistent.
    pub fn is_valid(&self) -> bool {
        self.teams_min >= 1
            && self.teams_min <= self.teams_max
            && self.mates_per_team_max >= 1
            && self.ai_mates_per_team_max >= 0
            && self.ai_mates_per_team_max <= self.mates_per_team_max
            && self.players_max >= self.teams_min
    }
}

// =============================================================================
// GAME CONSTRAINTS
// =============================================================================

/// The conditions under which a game can be played.
///
/// Valid only if either all teams play in one level or each team plays in
/// its own level: `levels_max > 1` together with `teams_per_level_max > 1`
/// is rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConstraints {
    /// The application part.
    #[serde(flatten)]
    pub app: AppConstraints,
    /// Minimum number of levels.
    pub levels_min: i32,
    /// Maximum number of levels.
    pub levels_max: i32,
    /// Minimum number of teams in a level.
    pub teams_per_level_min: i32,
    /// Maximum number of teams in a level.
    pub teams_per_level_max: i32,
    /// Minimum number of mates in a team.
    pub mates_per_team_min: i32,
    /// Minimum number of players.
    pub players_min: i32,
    /// Minimum number of AI teams.
    pub ai_teams_min: i32,
    /// Maximum number of AI teams.
    pub ai_teams_max: i32,
}

impl Default for GameConstraints {
    fn default() -> Self {
        Self {
            app: AppConstraints::default(),
            levels_min: 1,
            levels_max: 1,
            teams_per_level_min: 1,
            teams_per_level_max: 4,
            mates_per_team_min: 1,
            players_min: 1,
            ai_teams_min: 0,
            ai_teams_max: 0,
        }
    }
}

impl GameConstraints {
    /// Constraints compatible with `app`: all teams in one level, no AI.
    pub fn from_app_constraints(app: &AppConstraints) -> Self {
        debug_assert!(app.is_valid());
        let mut app = app.clone();
        app.ai_mates_per_team_max = 0;
        app.allow_mixed_ai_human_team = false;
        let teams_min = app.teams_min;
        let gc = Self {
            app,
            levels_min: 1,
            levels_max: 1,
            teams_per_level_min: teams_min,
            teams_per_level_max: teams_min,
            mates_per_team_min: 1,
            players_min: teams_min,
            ai_teams_min: 0,
            ai_teams_max: 0,
        };
        debug_assert!(gc.is_valid());
        gc
    }

    /// Whether the values are consistent.
    pub fn is_valid(&self) -> bool {
        let app = &self.app;
        if !app.is_valid() {
            return false;
        }
        if !(self.levels_min >= 1 && self.levels_min <= self.levels_max) {
            return false;
        }
        if !(self.teams_per_level_min >= 1 && self.teams_per_level_min <= self.teams_per_level_max) {
            return false;
        }
        if !(self.mates_per_team_min >= 1 && self.mates_per_team_min <= app.mates_per_team_max) {
            return false;
        }
        if !(self.players_min >= 1 && self.players_min <= app.players_max) {
            return false;
        }
        if !(self.ai_teams_min >= 0 && self.ai_teams_min <= self.ai_teams_max) {
            return false;
        }
        if app.teams_max < self.levels_min
            || app.teams_max < self.teams_per_level_min
            || app.teams_max < self.ai_teams_min
        {
            return false;
        }
        if app.players_max < app.teams_min * self.mates_per_team_min {
            return false;
        }
        if app.teams_max * app.mates_per_team_max < self.players_min {
            return false;
        }
        !(self.levels_max > 1 && self.teams_per_level_max > 1)
    }

    /// Minimum number of teams that can play.
    pub fn min_teams(&self) -> i32 {
        self.app.teams_min.max(self.levels_min.max(self.teams_per_level_min))
    }

    /// Maximum number of teams that can play.
    pub fn max_teams(&self) -> i32 {
        self.app.max_teams().min(self.levels_max.max(self.teams_per_level_max))
    }

    /// Minimum number of players that can play.
    pub fn min_players(&self) -> i32 {
        self.players_min.max(self.min_teams())
    }

    /// Maximum number of players that can play.
    pub fn max_players(&self) -> i32 {
        self.app
            .max_players()
            .min(self.app.mates_per_team_max * self.levels_max.max(self.teams_per_level_max))
    }

    /// Whether all teams play in the same level.
    pub fn is_all_teams_in_one_level(&self) -> bool {
        self.levels_max == 1
    }

    /// Whether the current preferences satisfy these constraints.
    pub fn is_selected_by(&self, prefs: &dyn AppPreferences) -> bool {
        if !self.is_valid() {
            return false;
        }
        let app = &self.app;
        let tot_teams = prefs.tot_teams() as i32;
        let tot_players = prefs.tot_players() as i32;
        if tot_teams < app.teams_min || tot_teams > app.teams_max {
            return false;
        }
        if !(tot_players >= self.players_min && tot_players <= app.players_max) {
            return false;
        }
        if tot_teams == 1 {
            // Both one team per level and all teams in one level
            if !(tot_players >= self.mates_per_team_min && tot_players <= app.mates_per_team_max) {
                return false;
            }
            return self.teams_per_level_min <= 1 && self.ai_teams_min <= 1 && self.levels_min <= 1;
        }
        let tot_ai_teams = prefs.tot_ai_teams() as i32;
        if !(tot_ai_teams >= self.ai_teams_min && tot_ai_teams <= self.ai_teams_max) {
            return false;
        }
        let all_in_one = self.is_all_teams_in_one_level();
        let tot_level_teams = if all_in_one { tot_teams } else { 1 };
        if !(tot_level_teams >= self.teams_per_level_min && tot_level_teams <= self.teams_per_level_max) {
            return false;
        }
        (0..prefs.tot_teams()).all(|team| {
            let mates = prefs.team_tot_mates(team) as i32;
            let ai_mates = prefs.team_tot_ai_mates(team) as i32;
            mates >= self.mates_per_team_min
                && mates <= app.mates_per_team_max
                && ai_mates <= app.ai_mates_per_team_max
        })
    }

    /// Whether a game with these constraints can be played at all within `app`.
    pub fn is_compatible_with(&self, app: &AppConstraints) -> bool {
        if !self.is_valid() || !app.is_valid() {
            return false;
        }
        if self.app.teams_max < app.teams_min {
            return false;
        }
        if self.app.teams_min > app.max_teams() || self.levels_min > app.max_teams() {
            return false;
        }
        if self.mates_per_team_min > app.max_teammates() {
            return false;
        }
        if self.players_min > app.max_players() {
            return false;
        }
        !(self.ai_teams_min > 0 && !app.allows_ai())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn app(teams_min: i32, teams_max: i32, mates: i32, ai: i32, players: i32) -> AppConstraints {
        AppConstraints {
            teams_min,
            teams_max,
            mates_per_team_max: mates,
            ai_mates_per_team_max: ai,
            allow_mixed_ai_human_team: false,
            players_max: players,
        }
    }

    #[test]
    fn test_app_derived_maxima() {
        let ac = app(1, 4, 3, 0, 6);
        assert_eq!(ac.max_teams(), 4);
        assert_eq!(ac.max_teammates(), 3);
        assert_eq!(ac.max_players(), 6);
        assert!(!ac.allows_ai());

        let ac = app(1, 8, 2, 1, 5);
        assert_eq!(ac.max_teams(), 5, "bounded by players");
        assert_eq!(ac.max_players(), 5);
        assert!(ac.allows_ai());
    }

    #[test]
    fn test_app_validity() {
        assert!(AppConstraints::default().is_valid());
        assert!(!app(0, 1, 1, 0, 1).is_valid(), "teams_min must be positive");
        assert!(!app(2, 1, 1, 0, 2).is_valid(), "teams_min above teams_max");
        assert!(!app(1, 1, 1, 2, 1).is_valid(), "more AI mates than mates");
        assert!(!app(2, 2, 1, 0, 1).is_valid(), "players below teams_min");
    }

    #[test]
    fn test_game_from_app_is_valid() {
        let ac = app(2, 4, 3, 2, 8);
        let gc = GameConstraints::from_app_constraints(&ac);
        assert!(gc.is_valid());
        assert!(gc.is_all_teams_in_one_level());
        assert_eq!((gc.levels_min, gc.levels_max), (1, 1));
        assert_eq!((gc.teams_per_level_min, gc.teams_per_level_max), (2, 2));
        assert_eq!(gc.app.ai_mates_per_team_max, 0);
        assert!(gc.is_compatible_with(&ac));

        for teams_min in 1..=4 {
            let ac = app(teams_min, 4, 1, 0, 4);
            let gc = GameConstraints::from_app_constraints(&ac);
            assert!(gc.is_valid(), "teams_min {teams_min}");
            assert_eq!(gc.min_teams(), teams_min);
        }
    }

    #[test]
    fn test_game_multi_level_and_multi_team_invalid() {
        let gc = GameConstraints {
            app: app(1, 4, 1, 0, 4),
            levels_max: 2,
            teams_per_level_max: 2,
            ..GameConstraints::default()
        };
        assert!(!gc.is_valid());
    }

    #[test]
    fn test_game_min_max_teams_players() {
        let gc = GameConstraints {
            app: app(1, 4, 2, 0, 8),
            levels_min: 1,
            levels_max: 1,
            teams_per_level_min: 2,
            teams_per_level_max: 3,
            players_min: 1,
            ..GameConstraints::default()
        };
        assert!(gc.is_valid());
        assert_eq!(gc.min_teams(), 2);
        assert_eq!(gc.max_teams(), 3);
        assert_eq!(gc.min_players(), 2);
        assert_eq!(gc.max_players(), 6);
        assert!(gc.is_all_teams_in_one_level());
    }

    #[test]
    fn test_game_incompatible_ai() {
        let gc = GameConstraints {
            app: app(1, 2, 2, 1, 4),
            ai_teams_min: 1,
            ai_teams_max: 1,
            ..GameConstraints::default()
        };
        assert!(gc.is_valid());
        assert!(!gc.is_compatible_with(&app(1, 2, 2, 0, 4)));
        assert!(gc.is_compatible_with(&app(1, 2, 2, 1, 4)));
    }
}
