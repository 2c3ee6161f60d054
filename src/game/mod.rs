//! Game Logic Module
//!
//! The tick engine that owns game variables, routes input to level drivers
//! and keeps team status and ranks. Deterministic for a given seed and input
//! sequence.
//!
//! ## Module Structure
//!
//! - `variable`: Variable types, values and formats
//! - `level`: The level driver seam and its context
//! - `game`: Game state, tick loop, status and rank bookkeeping
//! - `error`: Game construction errors

pub mod variable;
pub mod level;
#[allow(clippy::module_inception)]
pub mod game;
pub mod error;

// Re-export key types
pub use variable::{
    make_variables, GameClock, TimeBase, Variable, VariableFormat, VariableType, VariableValue, Variables,
};
pub use level::{KeyActionEvent, LevelContext, LevelDriver};
pub use game::{
    Game, GameInit, GameState, TickResult, VarScope, GAME_VAR_GAME_OVER_TIME, GAME_VAR_WINNER_TEAM,
    MAX_MESSAGE_DEPTH, PLAYER_STATUS_COMPLETED, PLAYER_STATUS_FAILED, PLAYER_STATUS_OUT, PLAYER_STATUS_PLAYING,
    PLAYER_VAR_FINISHED_TIME, PLAYER_VAR_STATUS, TEAM_STATUS_COMPLETED, TEAM_STATUS_FAILED, TEAM_STATUS_PLAYING,
    TEAM_VAR_FINISHED_TIME, TEAM_VAR_HIGHSCORE_RANK, TEAM_VAR_RANK, TEAM_VAR_STATUS,
};
pub use error::GameError;
