//! Application configuration.
//!
//! ## Module Structure
//!
//! - `constraints`: Team and player cardinality limits
//! - `option`: Typed options with master/slave gating
//! - `key_action`: Logical inputs and their default keys
//! - `std_config`: The shared, validated configuration
//! - `error`: Configuration errors

pub mod constraints;
pub mod option;
pub mod key_action;
pub mod std_config;
pub mod error;

// Re-export key types
pub use constraints::{AppConstraints, GameConstraints};
pub use option::{EnumEntry, GameOption, MasterValues, OptionKind, OptionValueError};
pub use key_action::{ClassDefaultKeys, KeyAction};
pub use std_config::{
    CapabilityAssignment, StdConfig, StdConfigFile, StdConfigInit, AI_OPTION_NAME,
    PER_PLAYER_SOUND_OPTION_NAME, SOUND_ENABLED_OPTION_NAME, SOUND_VOLUME_OPTION_NAME,
};
pub use error::ConfigError;
