//! Owner scope of options and variables.

use serde::{Deserialize, Serialize};

/// Scope an option or variable belongs to.
///
/// Ordered from the widest to the narrowest scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    /// One instance per game.
    Game,
    /// One instance per team.
    Team,
    /// One instance per player (mate).
    Player,
}

impl OwnerType {
    /// All owner types, widest first.
    pub const ALL: [OwnerType; 3] = [OwnerType::Game, OwnerType::Team, OwnerType::Player];

    /// Position in [`OwnerType::ALL`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}
