//! Highscores.
//!
//! ## Module Structure
//!
//! - `definition`: What is ranked, for which preferences, and how tables are named
//! - `table`: The ranked table and the inclusion of finished games
//! - `error`: Highscore errors

pub mod definition;
pub mod table;
pub mod error;

// Re-export key types
pub use definition::{
    ConstraintKind, Discriminator, Eligibility, HighscoreConstraint, HighscoresDefinition, ScoreElement,
};
pub use table::{Highscore, Score};
pub use error::HighscoreError;
