//! # STMG Engine
//!
//! Rules and state core of a tick-based multi-player game framework:
//! player/team preferences with device-to-player capability assignment,
//! per-entity game variables driven by a tick engine, and a highscore
//! ranking engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        STMG ENGINE                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── variant.rs  - Option values and value sets              │
//! │  ├── named.rs    - Name to index registry                    │
//! │  ├── rng.rs      - Seeded Xorshift128+ game streams          │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  input/          - Devices, capabilities, input events       │
//! │  config/         - Constraints, options, key actions         │
//! │  prefs/          - Teams, players, capability assignment     │
//! │                                                              │
//! │  game/           - Tick engine                               │
//! │  ├── variable.rs - Game, team and player variables           │
//! │  ├── level.rs    - Level driver seam                         │
//! │  └── game.rs     - Input routing, status, ranks              │
//! │                                                              │
//! │  highscore/      - Ranking                                   │
//! │  ├── definition.rs - Constraints, discriminators, scores     │
//! │  └── table.rs    - Top-k tables and game inclusion           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness from seeded Xorshift128+
//!
//! Given identical preferences, inputs and seed, games and highscore
//! tables evolve identically on any platform.
//!
//! ## Threading
//!
//! Everything is single threaded. [`StdPreferences`] and [`Game`] share
//! state through `Rc` and are neither `Send` nor `Sync`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod input;
pub mod config;
pub mod prefs;
pub mod game;
pub mod highscore;

// Re-export commonly used types
pub use core::{GameRng, OwnerType, Variant, VariantSet};
pub use input::{Capability, CapabilityClass, DeviceManager, HardwareKey, InputEvent, KeyInputType};
pub use config::{AppConstraints, ConfigError, GameOption, KeyAction, StdConfig, StdConfigInit};
pub use prefs::{AppPreferences, PlayerId, StdPreferences};
pub use game::{Game, GameError, GameInit, GameState, LevelContext, LevelDriver, VarScope, VariableType};
pub use highscore::{Highscore, HighscoreError, HighscoresDefinition};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
