//! Highscore definitions.
//!
//! A definition says which variables make a score, which teams qualify, and
//! which preferences a table applies to. Discriminators split highscores
//! into separate tables, one per distinct preference setting: a table code
//! like `2_Hard` (two teams, difficulty Hard) identifies the table that
//! games played with those preferences go to.

use std::rc::Rc;

use crate::config::StdConfig;
use crate::core::OwnerType;
use crate::game::GameState;
use crate::prefs::AppPreferences;

use super::error::HighscoreError;

// =============================================================================
// TYPES
// =============================================================================

/// Quantity a [`HighscoreConstraint`] restricts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// Number of teams.
    TotTeams,
    /// Number of teams with at least one human.
    TotHumanTeams,
    /// Number of AI teams.
    TotAiTeams,
    /// Number of mates of every human team.
    TotMatesOfHumanTeam,
}

/// Preferences outside the range have no highscore table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HighscoreConstraint {
    /// What is restricted.
    pub kind: ConstraintKind,
    /// Inclusive minimum. Not negative.
    pub min: i32,
    /// Inclusive maximum.
    pub max: i32,
}

/// One component of a table code.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Discriminator {
    /// Value of an option. Team and player options must be enabled for
    /// exactly one team or player.
    Option {
        /// Owner of the option.
        owner: OwnerType,
        /// Option name.
        name: String,
    },
    /// Number of teams.
    TotTeams,
    /// Number of human teams.
    TotHumanTeams,
    /// Number of AI teams.
    TotAiTeams,
    /// Number of mates of the only human team.
    TotMatesOfHumanTeam,
}

/// A team only gets into the table if the variable is within range.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Eligibility {
    /// Game, team or player variable name.
    pub var_name: String,
    /// Inclusive minimum. Not negative.
    pub min: i32,
    /// Inclusive maximum.
    pub max: i32,
}

/// One value of a score. Earlier elements take precedence.
#[derive(Clone, Debug)]
pub struct ScoreElement {
    /// Column title.
    pub description: String,
    /// Game, team or player variable name.
    pub var_name: String,
    /// Whether lower values rank higher.
    pub lowest_best: bool,
}

impl ScoreElement {
    /// A score element.
    pub fn new(description: &str, var_name: &str, lowest_best: bool) -> Self {
        Self { description: description.to_string(), var_name: var_name.to_string(), lowest_best }
    }
}

// The description is presentation only.
impl PartialEq for ScoreElement {
    fn eq(&self, other: &Self) -> bool {
        self.var_name == other.var_name && self.lowest_best == other.lowest_best
    }
}

impl Eq for ScoreElement {}

// =============================================================================
// DEFINITION
// =============================================================================

/// How scores are computed and which preferences they apply to.
#[derive(Clone, Debug)]
pub struct HighscoresDefinition {
    config: Rc<StdConfig>,
    constraints: Vec<HighscoreConstraint>,
    discriminators: Vec<Discriminator>,
    eligibilities: Vec<Eligibility>,
    score_elements: Vec<ScoreElement>,
    max_scores: usize,
}

impl HighscoresDefinition {
    /// Build and validate a definition.
    pub fn new(
        config: Rc<StdConfig>,
        constraints: Vec<HighscoreConstraint>,
        discriminators: Vec<Discriminator>,
        eligibilities: Vec<Eligibility>,
        score_elements: Vec<ScoreElement>,
        max_scores: usize,
    ) -> Result<Self, HighscoreError> {
        if score_elements.is_empty() {
            return Err(HighscoreError::NoScoreElements);
        }
        if max_scores == 0 {
            return Err(HighscoreError::ZeroMaxScores);
        }
        let ranges = constraints.iter().map(|c| (c.min, c.max)).chain(eligibilities.iter().map(|e| (e.min, e.max)));
        for (min, max) in ranges {
            if min < 0 || min > max {
                return Err(HighscoreError::InvalidRange { min, max });
            }
        }
        let names = eligibilities.iter().map(|e| &e.var_name).chain(score_elements.iter().map(|s| &s.var_name));
        if names.into_iter().any(String::is_empty) {
            return Err(HighscoreError::EmptyVariableName);
        }
        for discriminator in &discriminators {
            if let Discriminator::Option { owner, name } = discriminator {
                if config.option(*owner, name).is_none() {
                    return Err(HighscoreError::UnknownOption { owner: *owner, name: name.clone() });
                }
            }
        }
        Ok(Self { config, constraints, discriminators, eligibilities, score_elements, max_scores })
    }

    /// The configuration.
    pub fn config(&self) -> &Rc<StdConfig> {
        &self.config
    }

    /// Constraints on the preferences.
    pub fn constraints(&self) -> &[HighscoreConstraint] {
        &self.constraints
    }

    /// Table code components.
    pub fn discriminators(&self) -> &[Discriminator] {
        &self.discriminators
    }

    /// Conditions for a team to get into the table.
    pub fn eligibilities(&self) -> &[Eligibility] {
        &self.eligibilities
    }

    /// Score values in order of precedence.
    pub fn score_elements(&self) -> &[ScoreElement] {
        &self.score_elements
    }

    /// Maximum number of scores in a table.
    pub fn max_scores(&self) -> usize {
        self.max_scores
    }

    /// Whether the constraints hold for the preferences.
    pub fn preferences_satisfy_constraints(&self, prefs: &dyn AppPreferences) -> bool {
        debug_assert!(Rc::ptr_eq(&self.config, prefs.std_config()));
        let tot_teams = prefs.tot_teams() as i32;
        let tot_human_teams = prefs.tot_human_teams() as i32;
        let tot_ai_teams = tot_teams - tot_human_teams;
        self.constraints.iter().all(|constraint| {
            let range = constraint.min..=constraint.max;
            match constraint.kind {
                ConstraintKind::TotTeams => range.contains(&tot_teams),
                ConstraintKind::TotHumanTeams => range.contains(&tot_human_teams),
                ConstraintKind::TotAiTeams => range.contains(&tot_ai_teams),
                ConstraintKind::TotMatesOfHumanTeam => (0..prefs.tot_teams())
                    .filter(|&team| !prefs.is_team_ai(team))
                    .all(|team| range.contains(&(prefs.team_tot_mates(team) as i32))),
            }
        })
    }

    /// Whether a table exists for the preferences.
    pub fn satisfies_preferences(&self, prefs: &dyn AppPreferences) -> bool {
        self.code_from_preferences(prefs).is_some()
    }

    /// Code of the table the preferences map to, e.g. `2_Hard`.
    ///
    /// `None` if a constraint fails or a discriminator is ambiguous.
    pub fn code_from_preferences(&self, prefs: &dyn AppPreferences) -> Option<String> {
        if !self.preferences_satisfy_constraints(prefs) {
            return None;
        }
        self.string_from_preferences(prefs, true)
    }

    /// Human readable title of the table, e.g. `Teams: 2, Difficulty: Hard`.
    pub fn title_from_preferences(&self, prefs: &dyn AppPreferences) -> Option<String> {
        if !self.preferences_satisfy_constraints(prefs) {
            return None;
        }
        self.string_from_preferences(prefs, false)
    }

    fn string_from_preferences(&self, prefs: &dyn AppPreferences, code: bool) -> Option<String> {
        let labeled = |label: &str, n: usize| if code { n.to_string() } else { format!("{label}: {n}") };
        let mut parts = Vec::with_capacity(self.discriminators.len());
        for discriminator in &self.discriminators {
            let part = match discriminator {
                Discriminator::Option { owner, name } => {
                    let option = self.config.option(*owner, name)?;
                    let value = match owner {
                        OwnerType::Game => {
                            if !prefs.is_option_enabled(OwnerType::Game, name, 0, 0) {
                                return None;
                            }
                            prefs.option_value(name)
                        }
                        OwnerType::Team => {
                            let team = exactly_one(
                                (0..prefs.tot_teams()).filter(|&team| prefs.is_option_enabled(OwnerType::Team, name, team, 0)),
                            )?;
                            prefs.team_option_value(team, name)
                        }
                        OwnerType::Player => {
                            let (team, mate) = exactly_one(
                                (0..prefs.tot_players())
                                    .map(|player| prefs.teammate(player))
                                    .filter(|&(team, mate)| prefs.is_option_enabled(OwnerType::Player, name, team, mate)),
                            )?;
                            prefs.mate_option_value(team, mate, name)
                        }
                    };
                    if code {
                        option.value_as_code(&value)?
                    } else {
                        format!("{}: {}", option.description(), option.value_as_descriptive(&value)?)
                    }
                }
                Discriminator::TotTeams => labeled("Teams", prefs.tot_teams()),
                Discriminator::TotHumanTeams => labeled("Human teams", prefs.tot_human_teams()),
                Discriminator::TotAiTeams => labeled("AI teams", prefs.tot_ai_teams()),
                Discriminator::TotMatesOfHumanTeam => {
                    let team = exactly_one((0..prefs.tot_teams()).filter(|&team| !prefs.is_team_ai(team)))?;
                    labeled("Mates", prefs.team_tot_mates(team))
                }
            };
            parts.push(part);
        }
        Some(parts.join(if code { "_" } else { ", " }))
    }

    /// Whether `code` could have been produced by [`Self::code_from_preferences`].
    pub fn is_valid_code(&self, code: &str) -> bool {
        if self.discriminators.is_empty() {
            return code.is_empty();
        }
        let constraints = self.config.app_constraints();
        let max_teams = constraints.max_teams();
        let mut parts = code.split('_');
        for discriminator in &self.discriminators {
            let Some(part) = parts.next() else {
                return false;
            };
            let valid = match discriminator {
                Discriminator::Option { owner, name } => self
                    .config
                    .option(*owner, name)
                    .is_some_and(|option| option.value_from_code(part).is_ok()),
                Discriminator::TotTeams => is_count_in(part, constraints.teams_min, max_teams),
                Discriminator::TotHumanTeams => is_count_in(part, 0, max_teams),
                Discriminator::TotAiTeams => {
                    is_count_in(part, 0, if constraints.allows_ai() { max_teams } else { 0 })
                }
                Discriminator::TotMatesOfHumanTeam => is_count_in(part, 1, constraints.max_teammates()),
            };
            if !valid {
                return false;
            }
        }
        parts.next().is_none()
    }

    /// Check that every referenced variable exists in the game.
    ///
    /// The error names the first missing variable.
    pub fn is_compatible_with_game(&self, game: &GameState) -> Result<(), String> {
        for eligibility in &self.eligibilities {
            if game.variable_id_and_owner(&eligibility.var_name).is_none() {
                return Err(format!("eligibility variable '{}' not found", eligibility.var_name));
            }
        }
        for element in &self.score_elements {
            if game.variable_id_and_owner(&element.var_name).is_none() {
                return Err(format!("score element variable '{}' not found", element.var_name));
            }
        }
        Ok(())
    }
}

/// Equal definitions rank alike. The table size is not compared.
impl PartialEq for HighscoresDefinition {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.config, &other.config)
            && self.constraints == other.constraints
            && self.discriminators == other.discriminators
            && self.eligibilities == other.eligibilities
            && self.score_elements == other.score_elements
    }
}

fn exactly_one<T>(mut iter: impl Iterator<Item = T>) -> Option<T> {
    let first = iter.next()?;
    iter.next().is_none().then_some(first)
}

fn is_count_in(code: &str, min: i32, max: i32) -> bool {
    !code.is_empty()
        && code.bytes().all(|b| b.is_ascii_digit())
        && code.parse::<i32>().is_ok_and(|n| (min..=max).contains(&n))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::{GameOption, KeyAction, StdConfigInit};
    use crate::core::Variant;
    use crate::input::{CapabilityClass, DeviceManager, HardwareKey};
    use crate::prefs::StdPreferences;

    fn config(dm: &DeviceManager) -> Rc<StdConfig> {
        let mut init = StdConfigInit::new("highscore-test", "1.0", dm);
        init.app_constraints.teams_min = 1;
        init.app_constraints.teams_max = 2;
        init.app_constraints.mates_per_team_max = 2;
        init.app_constraints.ai_mates_per_team_max = 1;
        init.app_constraints.allow_mixed_ai_human_team = false;
        init.app_constraints.players_max = 4;
        init.key_actions =
            vec![KeyAction::new(&["Fire"], "Fire", vec![(CapabilityClass::Keys, vec![HardwareKey::Space])])];
        let use_handicap = Rc::new(GameOption::new_bool(OwnerType::Team, "UseHandicap", false, "Use handicap").unwrap());
        let handicap = GameOption::new_int(OwnerType::Team, "Handicap", 2, "Handicap", 0, 5)
            .unwrap()
            .with_master(&use_handicap, vec![Variant::Bool(true)])
            .unwrap();
        init.options = vec![
            Rc::new(
                GameOption::new_enum(
                    OwnerType::Game,
                    "Difficulty",
                    1,
                    "Difficulty",
                    &[(0, "Easy", "Relaxed"), (1, "Medium", "Normal"), (2, "Hard", "Brutal")],
                )
                .unwrap(),
            ),
            use_handicap,
            Rc::new(handicap),
        ];
        Rc::new(StdConfig::new(init).unwrap())
    }

    fn fixture() -> (DeviceManager, Rc<StdConfig>, StdPreferences) {
        let mut dm = DeviceManager::new(&[CapabilityClass::Keys]);
        dm.add_device("keyboard", &[CapabilityClass::Keys]);
        let config = config(&dm);
        let prefs = StdPreferences::new(Rc::clone(&config), &dm);
        (dm, config, prefs)
    }

    fn definition(config: &Rc<StdConfig>, constraints: Vec<HighscoreConstraint>, discriminators: Vec<Discriminator>) -> HighscoresDefinition {
        HighscoresDefinition::new(
            Rc::clone(config),
            constraints,
            discriminators,
            Vec::new(),
            vec![ScoreElement::new("Points", "Points", false)],
            10,
        )
        .unwrap()
    }

    fn difficulty() -> Discriminator {
        Discriminator::Option { owner: OwnerType::Game, name: "Difficulty".to_string() }
    }

    #[test]
    fn test_new_validates() {
        let (_dm, config, _prefs) = fixture();
        let points = || vec![ScoreElement::new("Points", "Points", false)];
        let new = |constraints, discriminators, eligibilities, elements, max| {
            HighscoresDefinition::new(Rc::clone(&config), constraints, discriminators, eligibilities, elements, max)
        };
        assert!(matches!(new(vec![], vec![], vec![], vec![], 5), Err(HighscoreError::NoScoreElements)));
        assert!(matches!(new(vec![], vec![], vec![], points(), 0), Err(HighscoreError::ZeroMaxScores)));
        let bad = HighscoreConstraint { kind: ConstraintKind::TotTeams, min: 3, max: 2 };
        assert!(matches!(new(vec![bad], vec![], vec![], points(), 5), Err(HighscoreError::InvalidRange { .. })));
        let negative = Eligibility { var_name: "Lives".to_string(), min: -1, max: 3 };
        assert!(matches!(new(vec![], vec![], vec![negative], points(), 5), Err(HighscoreError::InvalidRange { .. })));
        let unnamed = vec![ScoreElement::new("Points", "", false)];
        assert!(matches!(new(vec![], vec![], vec![], unnamed, 5), Err(HighscoreError::EmptyVariableName)));
        let unknown = Discriminator::Option { owner: OwnerType::Team, name: "Difficulty".to_string() };
        assert!(matches!(new(vec![], vec![unknown], vec![], points(), 5), Err(HighscoreError::UnknownOption { .. })));
    }

    #[test]
    fn test_is_valid_code() {
        let (_dm, config, _prefs) = fixture();
        let def = definition(&config, Vec::new(), vec![Discriminator::TotTeams, difficulty()]);
        assert!(def.is_valid_code("1_Easy"));
        assert!(def.is_valid_code("2_Hard"));
        assert!(!def.is_valid_code("3_Hard"), "too many teams");
        assert!(!def.is_valid_code("0_Medium"), "too few teams");
        assert!(!def.is_valid_code("1_EASY"), "enum names are case sensitive");
        assert!(!def.is_valid_code("1"), "missing component");
        assert!(!def.is_valid_code(""));
        assert!(!def.is_valid_code("2_"), "empty component");
        assert!(!def.is_valid_code("+1_Easy"));
        assert!(!def.is_valid_code("1_Easy_Hard"), "trailing component");

        let counts = definition(
            &config,
            Vec::new(),
            vec![Discriminator::TotHumanTeams, Discriminator::TotAiTeams, Discriminator::TotMatesOfHumanTeam],
        );
        assert!(counts.is_valid_code("1_1_2"));
        assert!(counts.is_valid_code("0_2_1"));
        assert!(!counts.is_valid_code("1_1_0"), "human team has at least one mate");
        assert!(!counts.is_valid_code("1_3_1"));

        let plain = definition(&config, Vec::new(), Vec::new());
        assert!(plain.is_valid_code(""));
        assert!(!plain.is_valid_code("1"));
    }

    #[test]
    fn test_code_and_title() {
        let (_dm, config, mut prefs) = fixture();
        let def = definition(&config, Vec::new(), vec![Discriminator::TotTeams, difficulty()]);
        assert_eq!(def.code_from_preferences(&prefs).as_deref(), Some("1_Medium"));
        assert_eq!(def.title_from_preferences(&prefs).as_deref(), Some("Teams: 1, Difficulty: Normal"));

        assert!(prefs.set_option_value("Difficulty", Variant::Int(2)));
        assert!(prefs.set_tot_teams(2));
        let code = def.code_from_preferences(&prefs).unwrap();
        assert_eq!(code, "2_Hard");
        assert!(def.is_valid_code(&code));
    }

    #[test]
    fn test_constraints() {
        let (_dm, config, mut prefs) = fixture();
        let two_teams = HighscoreConstraint { kind: ConstraintKind::TotTeams, min: 2, max: 2 };
        let def = definition(&config, vec![two_teams], vec![Discriminator::TotTeams]);
        assert!(!def.satisfies_preferences(&prefs));
        assert_eq!(def.code_from_preferences(&prefs), None);
        assert_eq!(def.title_from_preferences(&prefs), None);

        assert!(prefs.set_tot_teams(2));
        assert!(def.satisfies_preferences(&prefs));
        assert_eq!(def.title_from_preferences(&prefs).as_deref(), Some("Teams: 2"));

        let solo = HighscoreConstraint { kind: ConstraintKind::TotMatesOfHumanTeam, min: 1, max: 1 };
        let def = definition(&config, vec![solo], Vec::new());
        assert!(def.satisfies_preferences(&prefs));
        assert!(prefs.set_team_tot_mates(0, 2));
        assert!(!def.satisfies_preferences(&prefs));
    }

    #[test]
    fn test_team_option_must_be_enabled_once() {
        let (_dm, config, mut prefs) = fixture();
        let handicap = Discriminator::Option { owner: OwnerType::Team, name: "Handicap".to_string() };
        let def = definition(&config, Vec::new(), vec![handicap]);
        assert!(prefs.set_tot_teams(2));
        assert_eq!(def.code_from_preferences(&prefs), None, "no team uses a handicap");

        assert!(prefs.set_team_option_value(1, "UseHandicap", Variant::Bool(true)));
        assert!(prefs.set_team_option_value(1, "Handicap", Variant::Int(4)));
        assert_eq!(def.code_from_preferences(&prefs).as_deref(), Some("4"));
        assert_eq!(def.title_from_preferences(&prefs).as_deref(), Some("Handicap: 4"));

        assert!(prefs.set_team_option_value(0, "UseHandicap", Variant::Bool(true)));
        assert_eq!(def.code_from_preferences(&prefs), None, "two teams use a handicap");
    }

    #[test]
    fn test_team_counts() {
        let (_dm, config, mut prefs) = fixture();
        let def = definition(
            &config,
            Vec::new(),
            vec![Discriminator::TotHumanTeams, Discriminator::TotAiTeams, Discriminator::TotMatesOfHumanTeam],
        );
        assert!(prefs.set_tot_teams(2));
        assert_eq!(def.code_from_preferences(&prefs), None, "two human teams");

        let ai = prefs.team(1).unwrap().mate_id(0).unwrap();
        assert!(prefs.set_player_ai(ai, true));
        assert_eq!(def.code_from_preferences(&prefs).as_deref(), Some("1_1_1"));
        assert_eq!(def.title_from_preferences(&prefs).as_deref(), Some("Human teams: 1, AI teams: 1, Mates: 1"));
    }

    #[test]
    fn test_equality_ignores_table_size() {
        let (_dm, config, _prefs) = fixture();
        let make = |description: &str, max| {
            HighscoresDefinition::new(
                Rc::clone(&config),
                Vec::new(),
                vec![Discriminator::TotTeams],
                Vec::new(),
                vec![ScoreElement::new(description, "Points", false)],
                max,
            )
            .unwrap()
        };
        assert_eq!(make("Points", 5), make("Score", 10));
        let lowest = HighscoresDefinition::new(
            Rc::clone(&config),
            Vec::new(),
            vec![Discriminator::TotTeams],
            Vec::new(),
            vec![ScoreElement::new("Points", "Points", true)],
            5,
        )
        .unwrap();
        assert_ne!(make("Points", 5), lowest);
    }
}
