//! Configuration errors.

use thiserror::Error;

use crate::core::OwnerType;
use crate::input::{CapabilityClass, UnknownKey};

/// Errors building options or a [`super::StdConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// App name empty or with characters other than alphanumerics, `-`, `_`.
    #[error("invalid application name '{0}'")]
    InvalidAppName(String),

    /// App version empty or with invalid characters.
    #[error("invalid application version '{0}'")]
    InvalidAppVersion(String),

    /// App constraints are inconsistent.
    #[error("invalid application constraints")]
    InvalidAppConstraints,

    /// No key action was declared.
    #[error("at least one key action is required")]
    NoKeyActions,

    /// A key action has no name.
    #[error("key action without name")]
    KeyActionWithoutName,

    /// A key action name was used twice.
    #[error("duplicate key action name '{0}'")]
    DuplicateKeyAction(String),

    /// Capability class not supported by the device manager.
    #[error("capability class '{0}' not supported by the device manager")]
    UnsupportedCapabilityClass(CapabilityClass),

    /// Option name empty or with invalid characters.
    #[error("invalid option name '{0}'")]
    InvalidOptionName(String),

    /// Names starting with `_` are reserved for built-in options.
    #[error("option name '{0}' is reserved")]
    ReservedOptionName(String),

    /// Two options with the same name and owner.
    #[error("duplicate {owner:?} option '{name}'")]
    DuplicateOption {
        /// Owner scope.
        owner: OwnerType,
        /// Option name.
        name: String,
    },

    /// Default value not valid for the option.
    #[error("invalid default value for option '{0}'")]
    InvalidDefault(String),

    /// Int option with `min > max`.
    #[error("option '{name}': min {min} greater than max {max}")]
    InvalidRange {
        /// Option name.
        name: String,
        /// Minimum.
        min: i32,
        /// Maximum.
        max: i32,
    },

    /// Enum option entry problem (empty, duplicate, negative value, bad name).
    #[error("option '{name}': invalid enum entry '{entry}'")]
    InvalidEnumEntry {
        /// Option name.
        name: String,
        /// Entry name.
        entry: String,
    },

    /// A master option is itself a slave.
    #[error("option '{slave}': master '{master}' is itself a slave")]
    MasterIsSlave {
        /// Slave option.
        slave: String,
        /// Offending master.
        master: String,
    },

    /// A master option has a narrower owner scope than its slave.
    #[error("option '{slave}': master '{master}' has a narrower owner than the slave")]
    MasterOwnerNarrower {
        /// Slave option.
        slave: String,
        /// Offending master.
        master: String,
    },

    /// The enabling values of a master are empty or invalid.
    #[error("option '{slave}': invalid enabling values for master '{master}'")]
    InvalidMasterValues {
        /// Slave option.
        slave: String,
        /// Offending master.
        master: String,
    },

    /// A master option is not registered in the configuration.
    #[error("option '{slave}': master '{master}' is not part of the configuration")]
    UnknownMaster {
        /// Slave option.
        slave: String,
        /// Missing master.
        master: String,
    },

    /// A user supplied built-in option (AI, sound) breaks its contract.
    #[error("built-in option '{0}' has the wrong type, owner or flags")]
    InvalidBuiltinOption(String),

    /// Capability assignment policy is inconsistent.
    #[error("invalid capability assignment")]
    InvalidCapabilityAssignment,

    /// Unknown key name in a configuration file.
    #[error(transparent)]
    UnknownKey(#[from] UnknownKey),

    /// Configuration file could not be read.
    #[error("config file: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration file.
    #[error("config file: {0}")]
    Json(#[from] serde_json::Error),
}
