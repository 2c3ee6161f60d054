//! Highscore errors.

use thiserror::Error;

use crate::core::OwnerType;

/// Errors building highscore definitions and tables.
#[derive(Debug, Error)]
pub enum HighscoreError {
    /// A definition needs at least one score element.
    #[error("at least one score element is required")]
    NoScoreElements,

    /// A table must keep at least one score.
    #[error("max scores must be positive")]
    ZeroMaxScores,

    /// A constraint or eligibility range with negative minimum or `min > max`.
    #[error("invalid range {min}..={max}")]
    InvalidRange {
        /// Minimum.
        min: i32,
        /// Maximum.
        max: i32,
    },

    /// An eligibility or score element without variable name.
    #[error("variable name must not be empty")]
    EmptyVariableName,

    /// A discriminator names an option the config lacks.
    #[error("unknown {owner:?} option '{name}'")]
    UnknownOption {
        /// Owner scope.
        owner: OwnerType,
        /// Option name.
        name: String,
    },

    /// The code was not produced by the definition.
    #[error("invalid highscore code '{0}'")]
    InvalidCode(String),

    /// More scores than the definition keeps.
    #[error("{scores} scores exceed the maximum of {max}")]
    TooManyScores {
        /// Number of scores given.
        scores: usize,
        /// Table size.
        max: usize,
    },

    /// A score has the wrong number of values or no team name.
    #[error("malformed score at position {0}")]
    MalformedScore(usize),

    /// JSON encoding or decoding failed.
    #[error("highscore serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
