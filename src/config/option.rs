//! Named, typed configuration options.
//!
//! An option is owned by the game, a team or a player. Its value is a
//! [`Variant`] validated by the option's kind (bool, int range or enum).
//!
//! ## Master/slave gating
//!
//! A slave option is enabled only while every master holds one of the
//! listed values. Masters cannot themselves be slaves, so the dependency
//! graph is flat: `slave -> [(master, allowed values)]`.
//!
//! ## Codes
//!
//! Each value has a stable machine code (used in highscore table keys)
//! and a human description:
//!
//! | Kind | Code | Description |
//! |------|------|-------------|
//! | Bool | `t` / `f` | `true` / `false` |
//! | Int  | `7`, `m7` for -7 | `7`, `-7` |
//! | Enum | entry name | entry description |

use std::rc::Rc;

use thiserror::Error;

use crate::core::{OwnerType, Variant, VariantSet};
use super::error::ConfigError;

// =============================================================================
// TYPES
// =============================================================================

/// An enum option entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumEntry {
    /// Value stored in the option (non-negative).
    pub value: i32,
    /// Case sensitive alphanumeric name, also the value's code.
    pub name: String,
    /// Human description.
    pub description: String,
}

/// Value domain of an option.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptionKind {
    /// `Variant::Bool`.
    Bool,
    /// `Variant::Int` within `min..=max`.
    Int {
        /// Smallest value.
        min: i32,
        /// Largest value.
        max: i32,
    },
    /// `Variant::Int` equal to one of the entries' values.
    Enum(Vec<EnumEntry>),
}

/// Master of a slave option and the master values enabling the slave.
#[derive(Clone, Debug)]
pub struct MasterValues {
    /// The master option.
    pub master: Rc<GameOption>,
    /// Values of the master for which the slave is enabled.
    pub values: VariantSet,
}

/// Why a code or string could not be turned into a value.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum OptionValueError {
    /// Empty input or input containing whitespace.
    #[error("code cannot contain spaces or be empty")]
    EmptyOrWhitespace,
    /// Bool code other than `t`/`f`.
    #[error("invalid bool code")]
    InvalidBool,
    /// Unknown enum name.
    #[error("invalid enum code")]
    InvalidEnum,
    /// Not a number.
    #[error("not a number")]
    NotANumber,
    /// Number outside the option's range.
    #[error("value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Parsed value.
        value: i64,
        /// Minimum.
        min: i32,
        /// Maximum.
        max: i32,
    },
}

/// A configuration option.
#[derive(Clone, Debug)]
pub struct GameOption {
    owner: OwnerType,
    name: String,
    description: String,
    default: Variant,
    read_only: bool,
    visible: bool,
    masters: Vec<MasterValues>,
    kind: OptionKind,
}

fn is_valid_option_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c == '_' || c.is_ascii_alphanumeric())
}

impl GameOption {
    fn new(owner: OwnerType, name: &str, default: Variant, description: &str, kind: OptionKind) -> Result<Self, ConfigError> {
        if !is_valid_option_name(name) {
            return Err(ConfigError::InvalidOptionName(name.to_string()));
        }
        let option = Self {
            owner,
            name: name.to_string(),
            description: description.to_string(),
            default,
            read_only: false,
            visible: true,
            masters: Vec::new(),
            kind,
        };
        if !option.is_valid_value(&default) {
            return Err(ConfigError::InvalidDefault(name.to_string()));
        }
        Ok(option)
    }

    /// A boolean option.
    pub fn new_bool(owner: OwnerType, name: &str, default: bool, description: &str) -> Result<Self, ConfigError> {
        Self::new(owner, name, Variant::Bool(default), description, OptionKind::Bool)
    }

    /// An integer option with inclusive range.
    pub fn new_int(owner: OwnerType, name: &str, default: i32, description: &str, min: i32, max: i32) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::InvalidRange { name: name.to_string(), min, max });
        }
        Self::new(owner, name, Variant::Int(default), description, OptionKind::Int { min, max })
    }

    /// An enum option from `(value, name, description)` entries.
    pub fn new_enum(
        owner: OwnerType,
        name: &str,
        default: i32,
        description: &str,
        entries: &[(i32, &str, &str)],
    ) -> Result<Self, ConfigError> {
        let mut list: Vec<EnumEntry> = Vec::with_capacity(entries.len());
        for &(value, entry_name, entry_desc) in entries {
            let bad_name = entry_name.is_empty() || !entry_name.chars().all(|c| c.is_ascii_alphanumeric());
            let duplicate = list.iter().any(|e| e.value == value || e.name == entry_name);
            if value < 0 || bad_name || duplicate {
                return Err(ConfigError::InvalidEnumEntry { name: name.to_string(), entry: entry_name.to_string() });
            }
            list.push(EnumEntry { value, name: entry_name.to_string(), description: entry_desc.to_string() });
        }
        if list.is_empty() {
            return Err(ConfigError::InvalidEnumEntry { name: name.to_string(), entry: String::new() });
        }
        Self::new(owner, name, Variant::Int(default), description, OptionKind::Enum(list))
    }

    /// Set the read-only and visibility flags.
    pub fn with_flags(mut self, read_only: bool, visible: bool) -> Self {
        self.read_only = read_only;
        self.visible = visible;
        self
    }

    /// Make this option a slave of `master`, enabled for the given master values.
    pub fn with_master(mut self, master: &Rc<GameOption>, values: Vec<Variant>) -> Result<Self, ConfigError> {
        let err_names = || (self.name.clone(), master.name.clone());
        if master.is_slave() {
            let (slave, master) = err_names();
            return Err(ConfigError::MasterIsSlave { slave, master });
        }
        if master.owner > self.owner {
            let (slave, master) = err_names();
            return Err(ConfigError::MasterOwnerNarrower { slave, master });
        }
        let mut seen: Vec<Variant> = Vec::with_capacity(values.len());
        for value in &values {
            if !master.is_valid_value(value) || seen.contains(value) {
                let (slave, master) = err_names();
                return Err(ConfigError::InvalidMasterValues { slave, master });
            }
            seen.push(*value);
        }
        if seen.is_empty() {
            let (slave, master) = err_names();
            return Err(ConfigError::InvalidMasterValues { slave, master });
        }
        self.masters.push(MasterValues { master: Rc::clone(master), values: VariantSet::from_values(seen) });
        Ok(self)
    }

    /// Owner scope.
    pub fn owner(&self) -> OwnerType {
        self.owner
    }

    /// Name, unique among options of the same owner.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Default value.
    pub fn default_value(&self) -> Variant {
        self.default
    }

    /// Whether the user cannot change the value.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the option is shown to the user.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Value domain.
    pub fn kind(&self) -> &OptionKind {
        &self.kind
    }

    /// Masters gating this option (empty if not a slave).
    pub fn masters(&self) -> &[MasterValues] {
        &self.masters
    }

    /// Whether the option has masters.
    pub fn is_slave(&self) -> bool {
        !self.masters.is_empty()
    }

    /// Whether the option is enabled given the current value of each master.
    ///
    /// `master_value` returns the value of a master option in the scope of
    /// the slave (`None` is treated as not enabling).
    pub fn is_master_or_enabled_slave<F>(&self, mut master_value: F) -> bool
    where
        F: FnMut(&GameOption) -> Option<Variant>,
    {
        self.masters.iter().all(|mv| match master_value(&mv.master) {
            Some(value) => mv.values.contains(&value),
            None => false,
        })
    }

    /// Whether `value` belongs to the option's domain.
    pub fn is_valid_value(&self, value: &Variant) -> bool {
        match (&self.kind, value) {
            (OptionKind::Bool, Variant::Bool(_)) => true,
            (OptionKind::Int { min, max }, Variant::Int(n)) => n >= min && n <= max,
            (OptionKind::Enum(entries), Variant::Int(n)) => entries.iter().any(|e| e.value == *n),
            _ => false,
        }
    }

    fn enum_entry(&self, value: &Variant) -> Option<&EnumEntry> {
        match (&self.kind, value) {
            (OptionKind::Enum(entries), Variant::Int(n)) => entries.iter().find(|e| e.value == *n),
            _ => None,
        }
    }

    /// Machine code of a value. `None` if the value is not valid.
    pub fn value_as_code(&self, value: &Variant) -> Option<String> {
        if !self.is_valid_value(value) {
            return None;
        }
        match &self.kind {
            OptionKind::Bool => Some(if value.as_bool() { "t" } else { "f" }.to_string()),
            OptionKind::Int { .. } => {
                let n = value.as_int();
                Some(if n >= 0 { n.to_string() } else { format!("m{}", -(n as i64)) })
            }
            OptionKind::Enum(_) => self.enum_entry(value).map(|e| e.name.clone()),
        }
    }

    /// Value from its machine code.
    pub fn value_from_code(&self, code: &str) -> Result<Variant, OptionValueError> {
        if code.is_empty() || code.chars().any(char::is_whitespace) {
            return Err(OptionValueError::EmptyOrWhitespace);
        }
        match &self.kind {
            OptionKind::Bool => match code {
                "t" => Ok(Variant::Bool(true)),
                "f" => Ok(Variant::Bool(false)),
                _ => Err(OptionValueError::InvalidBool),
            },
            OptionKind::Int { min, max } => {
                let (negative, digits) = match code.strip_prefix('m') {
                    Some(rest) => (true, rest),
                    None => (false, code),
                };
                if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                    return Err(OptionValueError::NotANumber);
                }
                let magnitude: i64 = digits.parse().map_err(|_| OptionValueError::NotANumber)?;
                // "m0" is not a code: zero is always "0"
                if negative && magnitude == 0 {
                    return Err(OptionValueError::NotANumber);
                }
                let value = if negative { -magnitude } else { magnitude };
                if value < *min as i64 || value > *max as i64 {
                    return Err(OptionValueError::OutOfRange { value, min: *min, max: *max });
                }
                Ok(Variant::Int(value as i32))
            }
            OptionKind::Enum(entries) => entries
                .iter()
                .find(|e| e.name == code)
                .map(|e| Variant::Int(e.value))
                .ok_or(OptionValueError::InvalidEnum),
        }
    }

    /// Human readable form of a value. `None` if the value is not valid.
    pub fn value_as_descriptive(&self, value: &Variant) -> Option<String> {
        if !self.is_valid_value(value) {
            return None;
        }
        match &self.kind {
            OptionKind::Bool => Some(if value.as_bool() { "true" } else { "false" }.to_string()),
            OptionKind::Int { .. } => Some(value.as_int().to_string()),
            OptionKind::Enum(_) => self.enum_entry(value).map(|e| e.description.clone()),
        }
    }

    /// Value from user input (`true`/`false`, a number, an enum name).
    pub fn value_from_string(&self, input: &str) -> Result<Variant, OptionValueError> {
        let input = input.trim();
        match &self.kind {
            OptionKind::Bool => match input.to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Ok(Variant::Bool(true)),
                "false" | "f" | "no" | "0" => Ok(Variant::Bool(false)),
                _ => Err(OptionValueError::InvalidBool),
            },
            OptionKind::Int { min, max } => {
                let value: i64 = input.parse().map_err(|_| OptionValueError::NotANumber)?;
                if value < *min as i64 || value > *max as i64 {
                    return Err(OptionValueError::OutOfRange { value, min: *min, max: *max });
                }
                Ok(Variant::Int(value as i32))
            }
            OptionKind::Enum(entries) => entries
                .iter()
                .find(|e| e.name == input)
                .map(|e| Variant::Int(e.value))
                .ok_or(OptionValueError::InvalidEnum),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
