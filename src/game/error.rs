//! Game construction errors.

use thiserror::Error;

use crate::core::OwnerType;
use crate::highscore::HighscoreError;

/// Errors building a [`super::Game`].
#[derive(Debug, Error)]
pub enum GameError {
    /// Game name empty or with characters other than alphanumerics, `-`, `_`.
    #[error("invalid game name '{0}'")]
    InvalidName(String),

    /// Variable name empty.
    #[error("{0:?} variable without name")]
    EmptyVariableName(OwnerType),

    /// Names starting with `__` are reserved for system variables.
    #[error("variable name '{0}' is reserved")]
    ReservedVariableName(String),

    /// The same name is used twice, possibly in different scopes.
    #[error("duplicate variable name '{0}'")]
    DuplicateVariable(String),

    /// The preferences have no team.
    #[error("preferences have no team")]
    NoTeams,

    /// The highscore definition keeps fewer scores than there are teams.
    #[error("highscore keeps {max_scores} scores but the game has {teams} teams")]
    HighscoreTooSmall {
        /// Configured table size.
        max_scores: usize,
        /// Number of teams.
        teams: usize,
    },

    /// The highscore definition references something the game lacks.
    #[error("highscore definition incompatible with game: {0}")]
    IncompatibleHighscore(String),

    /// The highscore table belongs to another definition.
    #[error("highscore table was made for a different definition")]
    HighscoreDefinitionMismatch,

    /// Building the default highscore definition failed.
    #[error(transparent)]
    Highscore(#[from] HighscoreError),
}
