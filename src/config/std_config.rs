//! Application configuration.
//!
//! [`StdConfig`] is built once from a [`StdConfigInit`] and then shared
//! (`Rc`) by the preferences and every game. It owns the option registries
//! of the three owner scopes, the key actions and the capability
//! assignment policy.
//!
//! ## Built-in options
//!
//! | Owner | Name | Kind | Notes |
//! |-------|------|------|-------|
//! | Game, Team, Player | `AI` | Bool | player option editable only if AI is allowed |
//! | Game | `SoundEnabled` | Bool | read-only, hidden |
//! | Game | `PerPlayerSound` | Bool | editable only if per player sound is allowed |
//! | Game, Player | `SoundVolume` | Int 0..=100 | gated by `PerPlayerSound` and `AI` |
//!
//! AI options come first, then user options, then sound options. A user
//! option with a built-in name replaces the built-in one.

use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::{NamedObjIndex, OwnerType, Variant};
use crate::input::{CapabilityClass, DeviceManager};
use super::constraints::AppConstraints;
use super::error::ConfigError;
use super::key_action::KeyAction;
use super::option::{GameOption, OptionKind};

/// Name of the AI option (all owners).
pub const AI_OPTION_NAME: &str = "AI";
/// Name of the game sound switch.
pub const SOUND_ENABLED_OPTION_NAME: &str = "SoundEnabled";
/// Name of the per player sound switch.
pub const PER_PLAYER_SOUND_OPTION_NAME: &str = "PerPlayerSound";
/// Name of the volume options (game and player).
pub const SOUND_VOLUME_OPTION_NAME: &str = "SoundVolume";

const DEFAULT_MAX_GAME_PLAYED_HISTORY: i32 = 10;

// =============================================================================
// CAPABILITY ASSIGNMENT
// =============================================================================

/// How device capabilities can be assigned to players.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityAssignment {
    /// Every capability class can be explicitly assigned.
    pub all_classes: bool,
    /// Classes that can be explicitly assigned when `all_classes` is false.
    pub classes: Vec<CapabilityClass>,
    /// Maximum explicitly assigned capabilities per player. `0` disables explicit assignment.
    pub max_explicit_per_player: i32,
    /// Whether a player can own two capabilities of the same class.
    pub more_than_one_per_class: bool,
    /// Unassigned capabilities act for the only human player, if there is one.
    pub auto_assign_to_active_player: bool,
}

impl Default for CapabilityAssignment {
    fn default() -> Self {
        Self {
            all_classes: true,
            classes: Vec::new(),
            max_explicit_per_player: 0,
            more_than_one_per_class: false,
            auto_assign_to_active_player: false,
        }
    }
}

impl CapabilityAssignment {
    /// Whether the values are consistent.
    pub fn is_valid(&self) -> bool {
        self.max_explicit_per_player >= 0
    }

    /// Whether capabilities of `class` can be explicitly assigned.
    pub fn can_be_assigned(&self, class: CapabilityClass) -> bool {
        self.all_classes || self.classes.contains(&class)
    }
}

// =============================================================================
// INIT
// =============================================================================

/// Everything needed to build a [`StdConfig`].
#[derive(Clone, Debug)]
pub struct StdConfigInit {
    /// Alphanumerics, `-` and `_` only.
    pub app_name: String,
    /// Alphanumerics, `.`, `-` and `_` only.
    pub app_version: String,
    /// Classes supported by the device manager.
    pub capability_classes: Vec<CapabilityClass>,
    /// Limits on teams and players.
    pub app_constraints: AppConstraints,
    /// Capability assignment policy.
    pub capability_assignment: CapabilityAssignment,
    /// At least one key action.
    pub key_actions: Vec<KeyAction>,
    /// User options. Built-in options are added if missing.
    pub options: Vec<Rc<GameOption>>,
    /// Games remembered by the history.
    pub max_game_played_history: i32,
    /// Whether the application plays sounds.
    pub sound_enabled: bool,
    /// Whether each player can have its own playback capability and volume.
    pub sound_per_player_allowed: bool,
    /// Test mode.
    pub test_mode: bool,
}

impl StdConfigInit {
    /// Init with defaults, taking the capability classes from `device_manager`.
    pub fn new(app_name: &str, app_version: &str, device_manager: &DeviceManager) -> Self {
        Self {
            app_name: app_name.to_string(),
            app_version: app_version.to_string(),
            capability_classes: device_manager.capability_classes().to_vec(),
            app_constraints: AppConstraints::default(),
            capability_assignment: CapabilityAssignment::default(),
            key_actions: Vec::new(),
            options: Vec::new(),
            max_game_played_history: DEFAULT_MAX_GAME_PLAYED_HISTORY,
            sound_enabled: true,
            sound_per_player_allowed: false,
            test_mode: false,
        }
    }
}

/// Serializable subset of [`StdConfigInit`], loaded from JSON.
///
/// Options are not part of the file: they carry master references and are
/// added in code.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StdConfigFile {
    /// Application name.
    pub app_name: String,
    /// Application version.
    pub app_version: String,
    /// Limits on teams and players.
    #[serde(default)]
    pub app_constraints: AppConstraints,
    /// Capability assignment policy.
    #[serde(default)]
    pub capability_assignment: CapabilityAssignment,
    /// Key actions with key names.
    pub key_actions: Vec<KeyAction>,
    /// Games remembered by the history.
    #[serde(default = "default_history")]
    pub max_game_played_history: i32,
    /// Whether the application plays sounds.
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
    /// Whether each player can have its own playback capability.
    #[serde(default)]
    pub sound_per_player_allowed: bool,
    /// Test mode.
    #[serde(default)]
    pub test_mode: bool,
}

fn default_history() -> i32 {
    DEFAULT_MAX_GAME_PLAYED_HISTORY
}

fn default_true() -> bool {
    true
}

impl StdConfigFile {
    /// Parse a JSON description.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        info!("Loading config from {}", path.display());
        Self::from_json(&json)
    }

    /// Turn into an init for `device_manager` with the given user options.
    pub fn into_init(self, device_manager: &DeviceManager, options: Vec<Rc<GameOption>>) -> StdConfigInit {
        StdConfigInit {
            app_name: self.app_name,
            app_version: self.app_version,
            capability_classes: device_manager.capability_classes().to_vec(),
            app_constraints: self.app_constraints,
            capability_assignment: self.capability_assignment,
            key_actions: self.key_actions,
            options,
            max_game_played_history: self.max_game_played_history,
            sound_enabled: self.sound_enabled,
            sound_per_player_allowed: self.sound_per_player_allowed,
            test_mode: self.test_mode,
        }
    }
}

// =============================================================================
// STD CONFIG
// =============================================================================

/// Immutable application configuration.
#[derive(Debug)]
pub struct StdConfig {
    app_name: String,
    app_version: String,
    capability_classes: Vec<CapabilityClass>,
    app_constraints: AppConstraints,
    capability_assignment: CapabilityAssignment,
    key_actions: Vec<KeyAction>,
    options: [NamedObjIndex<Rc<GameOption>>; 3],
    max_game_played_history: i32,
    sound_enabled: bool,
    sound_per_player_allowed: bool,
    test_mode: bool,
}

fn is_valid_app_name(name: &str, extra: &[char]) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || extra.contains(&c))
}

impl StdConfig {
    /// Validate `init` and build the configuration.
    pub fn new(init: StdConfigInit) -> Result<Self, ConfigError> {
        let StdConfigInit {
            app_name,
            app_version,
            capability_classes,
            app_constraints,
            capability_assignment,
            key_actions,
            options: user_options,
            max_game_played_history,
            sound_enabled,
            mut sound_per_player_allowed,
            test_mode,
        } = init;

        if !is_valid_app_name(&app_name, &[]) {
            return Err(ConfigError::InvalidAppName(app_name));
        }
        if !is_valid_app_name(&app_version, &['.']) {
            return Err(ConfigError::InvalidAppVersion(app_version));
        }
        if !app_constraints.is_valid() {
            return Err(ConfigError::InvalidAppConstraints);
        }
        if !capability_assignment.is_valid() {
            return Err(ConfigError::InvalidCapabilityAssignment);
        }
        if let Some(&class) = capability_assignment.classes.iter().find(|c| !capability_classes.contains(c)) {
            return Err(ConfigError::UnsupportedCapabilityClass(class));
        }
        Self::check_key_actions(&key_actions, &capability_classes)?;
        if !sound_enabled && sound_per_player_allowed {
            debug!("Sound disabled: per player sound not allowed");
            sound_per_player_allowed = false;
        }

        let mut options: [NamedObjIndex<Rc<GameOption>>; 3] = Default::default();
        for option in &user_options {
            let name = option.name();
            if name.starts_with('_') {
                return Err(ConfigError::ReservedOptionName(name.to_string()));
            }
            if user_options.iter().filter(|o| o.owner() == option.owner() && o.name() == name).count() > 1 {
                return Err(ConfigError::DuplicateOption { owner: option.owner(), name: name.to_string() });
            }
        }
        let user_defined = |owner: OwnerType, name: &str| -> Option<&Rc<GameOption>> {
            user_options.iter().find(|o| o.owner() == owner && o.name() == name)
        };

        // AI options
        let allows_ai = app_constraints.allows_ai();
        for owner in OwnerType::ALL {
            let ai = match user_defined(owner, AI_OPTION_NAME) {
                Some(option) => {
                    if !matches!(option.kind(), OptionKind::Bool) || option.is_slave() {
                        return Err(ConfigError::InvalidBuiltinOption(AI_OPTION_NAME.to_string()));
                    }
                    Rc::clone(option)
                }
                None => Rc::new(match owner {
                    OwnerType::Game => GameOption::new_bool(owner, AI_OPTION_NAME, allows_ai, "AI allowed")?
                        .with_flags(true, false),
                    OwnerType::Team => GameOption::new_bool(owner, AI_OPTION_NAME, false, "AI team")?
                        .with_flags(true, false),
                    OwnerType::Player => GameOption::new_bool(owner, AI_OPTION_NAME, false, "AI player")?
                        .with_flags(!allows_ai, allows_ai),
                }),
            };
            options[owner.index()].add(AI_OPTION_NAME, ai);
        }

        // User options
        for option in &user_options {
            if options[option.owner().index()].contains(option.name()) {
                continue;
            }
            for mv in option.masters() {
                let registered = options[mv.master.owner().index()].get(mv.master.name());
                if !registered.is_some_and(|m| Rc::ptr_eq(m, &mv.master)) {
                    return Err(ConfigError::UnknownMaster {
                        slave: option.name().to_string(),
                        master: mv.master.name().to_string(),
                    });
                }
            }
            options[option.owner().index()].add(option.name(), Rc::clone(option));
        }

        // Sound options
        let game = OwnerType::Game.index();
        if !options[game].contains(SOUND_ENABLED_OPTION_NAME) {
            let option = GameOption::new_bool(OwnerType::Game, SOUND_ENABLED_OPTION_NAME, sound_enabled, "Sound enabled")?
                .with_flags(true, false);
            options[game].add(SOUND_ENABLED_OPTION_NAME, Rc::new(option));
        }
        Self::check_builtin_bool(&options[game], SOUND_ENABLED_OPTION_NAME)?;
        if !options[game].contains(PER_PLAYER_SOUND_OPTION_NAME) {
            let option = GameOption::new_bool(OwnerType::Game, PER_PLAYER_SOUND_OPTION_NAME, false, "Per player sound")?
                .with_flags(!sound_per_player_allowed, sound_per_player_allowed);
            options[game].add(PER_PLAYER_SOUND_OPTION_NAME, Rc::new(option));
        }
        Self::check_builtin_bool(&options[game], PER_PLAYER_SOUND_OPTION_NAME)?;
        let per_player_sound = options[game].get(PER_PLAYER_SOUND_OPTION_NAME).cloned();

        if !options[game].contains(SOUND_VOLUME_OPTION_NAME) {
            let mut option = GameOption::new_int(OwnerType::Game, SOUND_VOLUME_OPTION_NAME, 100, "Game volume", 0, 100)?;
            let mut visible = sound_enabled;
            if sound_per_player_allowed {
                if let Some(pps) = &per_player_sound {
                    option = option.with_master(pps, vec![Variant::Bool(false)])?;
                    visible = true;
                }
            }
            let option = option.with_flags(!sound_enabled, visible);
            options[game].add(SOUND_VOLUME_OPTION_NAME, Rc::new(option));
        }
        let player = OwnerType::Player.index();
        if !options[player].contains(SOUND_VOLUME_OPTION_NAME) {
            let mut option = GameOption::new_int(OwnerType::Player, SOUND_VOLUME_OPTION_NAME, 100, "Player volume", 0, 100)?;
            let mut visible = false;
            if sound_enabled {
                if let Some(ai) = options[player].get(AI_OPTION_NAME) {
                    option = option.with_master(ai, vec![Variant::Bool(false)])?;
                }
                if sound_per_player_allowed {
                    if let Some(pps) = &per_player_sound {
                        option = option.with_master(pps, vec![Variant::Bool(true)])?;
                        visible = true;
                    }
                }
            }
            let option = option.with_flags(!sound_enabled, visible);
            options[player].add(SOUND_VOLUME_OPTION_NAME, Rc::new(option));
        }
        for owner in [OwnerType::Game, OwnerType::Player] {
            let volume = options[owner.index()].get(SOUND_VOLUME_OPTION_NAME);
            if !volume.is_some_and(|v| matches!(v.kind(), OptionKind::Int { .. })) {
                return Err(ConfigError::InvalidBuiltinOption(SOUND_VOLUME_OPTION_NAME.to_string()));
            }
        }

        info!(
            "Config {} {}: {} key actions, {}/{}/{} options",
            app_name,
            app_version,
            key_actions.len(),
            options[0].len(),
            options[1].len(),
            options[2].len()
        );
        Ok(Self {
            app_name,
            app_version,
            capability_classes,
            app_constraints,
            capability_assignment,
            key_actions,
            options,
            max_game_played_history,
            sound_enabled,
            sound_per_player_allowed,
            test_mode,
        })
    }

    /// Build from a JSON description.
    pub fn from_json(json: &str, device_manager: &DeviceManager, options: Vec<Rc<GameOption>>) -> Result<Self, ConfigError> {
        Self::new(StdConfigFile::from_json(json)?.into_init(device_manager, options))
    }

    fn check_key_actions(key_actions: &[KeyAction], classes: &[CapabilityClass]) -> Result<(), ConfigError> {
        if key_actions.is_empty() {
            return Err(ConfigError::NoKeyActions);
        }
        for (idx, ka) in key_actions.iter().enumerate() {
            ka.validate()?;
            if let Some(class) = ka.classes().find(|c| !classes.contains(c)) {
                return Err(ConfigError::UnsupportedCapabilityClass(class));
            }
            let later = &key_actions[idx + 1..];
            if let Some(name) = ka.names().iter().find(|n| later.iter().any(|other| other.has_name(n))) {
                return Err(ConfigError::DuplicateKeyAction(name.clone()));
            }
        }
        Ok(())
    }

    fn check_builtin_bool(index: &NamedObjIndex<Rc<GameOption>>, name: &str) -> Result<(), ConfigError> {
        match index.get(name) {
            Some(option) if matches!(option.kind(), OptionKind::Bool) && !option.is_slave() => Ok(()),
            _ => Err(ConfigError::InvalidBuiltinOption(name.to_string())),
        }
    }

    /// Application name.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Application version.
    pub fn app_version(&self) -> &str {
        &self.app_version
    }

    /// Capability classes supported by the device manager.
    pub fn capability_classes(&self) -> &[CapabilityClass] {
        &self.capability_classes
    }

    /// Limits on teams and players.
    pub fn app_constraints(&self) -> &AppConstraints {
        &self.app_constraints
    }

    /// Capability assignment policy.
    pub fn capability_assignment(&self) -> &CapabilityAssignment {
        &self.capability_assignment
    }

    /// Whether a capability of `class` can be explicitly assigned to a player.
    ///
    /// Playback capabilities can always be assigned if per player sound is allowed.
    pub fn is_class_assignable(&self, class: CapabilityClass) -> bool {
        self.capability_assignment.can_be_assigned(class) || (class.is_playback() && self.sound_per_player_allowed)
    }

    /// Whether unassigned capabilities act for the only human player.
    pub fn is_auto_assign_to_active_player(&self) -> bool {
        self.capability_assignment.auto_assign_to_active_player
    }

    /// Number of key actions.
    pub fn tot_key_actions(&self) -> usize {
        self.key_actions.len()
    }

    /// Key actions, indexed by key action id.
    pub fn key_actions(&self) -> &[KeyAction] {
        &self.key_actions
    }

    /// Key action by id.
    pub fn key_action(&self, key_action: usize) -> &KeyAction {
        &self.key_actions[key_action]
    }

    /// Id of the key action having `name` among its aliases.
    pub fn key_action_id(&self, name: &str) -> Option<usize> {
        self.key_actions.iter().position(|ka| ka.has_name(name))
    }

    /// Options of an owner scope, in registration order.
    pub fn options(&self, owner: OwnerType) -> &NamedObjIndex<Rc<GameOption>> {
        &self.options[owner.index()]
    }

    /// Option by owner and name.
    pub fn option(&self, owner: OwnerType, name: &str) -> Option<&Rc<GameOption>> {
        self.options[owner.index()].get(name)
    }

    /// Index of the AI option of an owner scope.
    pub fn ai_option_index(&self, owner: OwnerType) -> usize {
        // Always registered by `new`
        self.options[owner.index()].index_of(AI_OPTION_NAME).unwrap_or(0)
    }

    /// Games remembered by the history.
    pub fn max_game_played_history(&self) -> i32 {
        self.max_game_played_history
    }

    /// Whether the application plays sounds.
    pub fn is_sound_enabled(&self) -> bool {
        self.sound_enabled
    }

    /// Whether per player sound is allowed.
    pub fn is_sound_per_player_allowed(&self) -> bool {
        self.sound_per_player_allowed
    }

    /// Test mode.
    pub fn is_test_mode(&self) -> bool {
        self.test_mode
    }
}

// =============================================================================
// TESTS
// =============================================================================
