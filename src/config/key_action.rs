//! Key action declarations.
//!
//! A key action is a logical input ("MoveUp", "Fire") a player triggers by
//! pressing a hardware key of one of its capabilities. Each action lists,
//! per capability class, the default keys tried (in order) when bindings
//! are populated.

use serde::{Deserialize, Serialize};

use crate::input::{CapabilityClass, HardwareKey};
use super::error::ConfigError;

/// Default keys of a key action for one capability class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDefaultKeys {
    /// Capability class.
    pub class: CapabilityClass,
    /// Keys in preference order.
    pub keys: Vec<HardwareKey>,
}

/// A key action declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAction {
    names: Vec<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    default_keys: Vec<ClassDefaultKeys>,
}

impl KeyAction {
    /// Create a key action with one or more alias names.
    pub fn new(names: &[&str], description: &str, default_keys: Vec<(CapabilityClass, Vec<HardwareKey>)>) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            description: description.to_string(),
            default_keys: default_keys
                .into_iter()
                .map(|(class, keys)| ClassDefaultKeys { class, keys })
                .collect(),
        }
    }

    /// Alias names, the first being the main name.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Human description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether one of the aliases is `name`.
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Capability classes with declared defaults, in declaration order.
    pub fn classes(&self) -> impl Iterator<Item = CapabilityClass> + '_ {
        self.default_keys.iter().map(|ck| ck.class)
    }

    /// Default keys for `class`. Empty if the class has no defaults.
    pub fn class_default_keys(&self, class: CapabilityClass) -> &[HardwareKey] {
        self.default_keys
            .iter()
            .find(|ck| ck.class == class)
            .map(|ck| ck.keys.as_slice())
            .unwrap_or(&[])
    }

    /// Check names are non-empty, start alphanumeric and are unique, and
    /// that no class is declared twice.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.names.is_empty() {
            return Err(ConfigError::KeyActionWithoutName);
        }
        for (idx, name) in self.names.iter().enumerate() {
            let starts_ok = name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
            if !starts_ok {
                return Err(ConfigError::KeyActionWithoutName);
            }
            if self.names[idx + 1..].contains(name) {
                return Err(ConfigError::DuplicateKeyAction(name.clone()));
            }
        }
        for (idx, ck) in self.default_keys.iter().enumerate() {
            if self.default_keys[idx + 1..].iter().any(|other| other.class == ck.class) {
                return Err(ConfigError::DuplicateKeyAction(format!("{}:{}", self.names[0], ck.class)));
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
