//! Highscore tables.
//!
//! A [`Highscore`] holds the best scores for one table code, best first.
//! Finished games are merged in with [`Highscore::include_game`], which is
//! an online top-k insertion: each team's score is placed by scanning the
//! table backwards, equal scores never displace existing ones, and the table
//! is cut back to the definition's size after every insertion.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::core::OwnerType;
use crate::game::{GameState, VarScope, VariableValue};
use crate::prefs::AppPreferences;

use super::definition::HighscoresDefinition;
use super::error::HighscoreError;

// =============================================================================
// SCORE
// =============================================================================

/// One row of a highscore table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    /// Preference team that made this score in the last included game.
    #[serde(skip)]
    team: Option<usize>,
    /// Displayed name. Not empty.
    pub team_name: String,
    /// One value per score element of the definition.
    pub values: Vec<VariableValue>,
}

impl Score {
    /// A score not tied to a just played team.
    pub fn new(team_name: &str, values: Vec<VariableValue>) -> Self {
        Self { team: None, team_name: team_name.to_string(), values }
    }

    /// The team that made the score in the last included game, if any.
    pub fn team(&self) -> Option<usize> {
        self.team
    }
}

#[derive(Serialize, Deserialize)]
struct HighscoreFile {
    code: String,
    title: String,
    scores: Vec<Score>,
}

// =============================================================================
// HIGHSCORE
// =============================================================================

/// Ranked scores of one table, position 0 is the best.
#[derive(Clone, Debug)]
pub struct Highscore {
    definition: Rc<HighscoresDefinition>,
    code: String,
    title: String,
    scores: Vec<Score>,
}

impl Highscore {
    /// An empty table without code, as used during a game.
    pub fn empty(definition: Rc<HighscoresDefinition>) -> Self {
        Self { definition, code: String::new(), title: String::new(), scores: Vec::new() }
    }

    /// An empty table. The code must be empty or valid for the definition.
    pub fn new(definition: Rc<HighscoresDefinition>, code: &str, title: &str) -> Result<Self, HighscoreError> {
        Self::with_scores(definition, code, title, Vec::new())
    }

    /// A table with existing scores, which must already be ranked.
    pub fn with_scores(
        definition: Rc<HighscoresDefinition>,
        code: &str,
        title: &str,
        scores: Vec<Score>,
    ) -> Result<Self, HighscoreError> {
        if !code.is_empty() && !definition.is_valid_code(code) {
            return Err(HighscoreError::InvalidCode(code.to_string()));
        }
        if scores.len() > definition.max_scores() {
            return Err(HighscoreError::TooManyScores { scores: scores.len(), max: definition.max_scores() });
        }
        let tot_elements = definition.score_elements().len();
        if let Some(position) =
            scores.iter().position(|score| score.team_name.is_empty() || score.values.len() != tot_elements)
        {
            return Err(HighscoreError::MalformedScore(position));
        }
        Ok(Self { definition, code: code.to_string(), title: title.to_string(), scores })
    }

    /// The definition.
    pub fn definition(&self) -> &Rc<HighscoresDefinition> {
        &self.definition
    }

    /// Table code, see [`HighscoresDefinition::code_from_preferences`].
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Table title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// All scores, best first.
    pub fn scores(&self) -> &[Score] {
        &self.scores
    }

    /// Score at `position`.
    pub fn score(&self, position: usize) -> Option<&Score> {
        self.scores.get(position)
    }

    /// Number of scores.
    pub fn tot_scores(&self) -> usize {
        self.scores.len()
    }

    /// Rename the team of a score, e.g. after the player typed a name.
    pub fn set_score_team_name(&mut self, position: usize, name: &str) -> bool {
        match self.scores.get_mut(position) {
            Some(score) if !name.is_empty() => {
                score.team_name = name.to_string();
                true
            }
            _ => false,
        }
    }

    // -------------------------------------------------------------------------
    // Inclusion
    // -------------------------------------------------------------------------

    /// Merge the teams of a finished game into the table.
    ///
    /// With `check_eligibility`, AI teams, teams still playing and teams
    /// failing an eligibility range are skipped. Returns the final positions
    /// of the teams that made it, in inclusion order.
    pub fn include_game(&mut self, game: &GameState, check_eligibility: bool) -> Vec<usize> {
        for score in &mut self.scores {
            score.team = None;
        }
        let prefs = game.prefs();
        if check_eligibility {
            debug_assert!(self.definition.preferences_satisfy_constraints(prefs.as_ref()));
        }
        let max_scores = self.definition.max_scores();
        let mut positions: Vec<usize> = Vec::new();
        for level in 0..game.tot_levels() {
            for level_team in 0..game.level_tot_teams(level) {
                let pref_team = game.pref_team(level, level_team);
                if check_eligibility && (prefs.is_team_ai(pref_team) || !self.is_team_eligible(game, pref_team)) {
                    continue;
                }
                let Some(position) = self.insert(game, pref_team) else {
                    continue;
                };
                positions.retain_mut(|cur| {
                    if *cur >= position {
                        *cur += 1;
                    }
                    *cur < max_scores
                });
                positions.push(position);
            }
        }
        positions
    }

    /// Where the team's current score would land, without changing the table.
    ///
    /// Eligibility is ignored.
    pub fn position_if_included(&self, game: &GameState, pref_team: usize) -> Option<usize> {
        let score = self.create_score(game, pref_team);
        self.find_position(&score)
    }

    fn is_team_eligible(&self, game: &GameState, pref_team: usize) -> bool {
        let team_scope = game.team_scope(pref_team);
        if game.variable_get(game.team_var_id_finished_time(), team_scope) < 0 {
            return false;
        }
        self.definition.eligibilities().iter().all(|eligibility| {
            match self.scope_of(game, &eligibility.var_name, pref_team) {
                Some((id, scope)) => (eligibility.min..=eligibility.max).contains(&game.variable_get(id, scope)),
                None => false,
            }
        })
    }

    /// Variable id and scope of `var_name` for a team. Player variables are
    /// read from the first human mate, or the first mate of an AI team.
    fn scope_of(&self, game: &GameState, var_name: &str, pref_team: usize) -> Option<(usize, VarScope)> {
        let (id, owner) = game.variable_id_and_owner(var_name)?;
        let scope = match owner {
            OwnerType::Game => VarScope::Game,
            OwnerType::Team => game.team_scope(pref_team),
            OwnerType::Player => {
                let prefs = game.prefs();
                let mate = (0..prefs.team_tot_mates(pref_team))
                    .find(|&mate| !prefs.is_mate_ai(pref_team, mate))
                    .unwrap_or(0);
                game.mate_scope(pref_team, mate)
            }
        };
        Some((id, scope))
    }

    fn create_score(&self, game: &GameState, pref_team: usize) -> Score {
        let values = self
            .definition
            .score_elements()
            .iter()
            .map(|element| match self.scope_of(game, &element.var_name, pref_team) {
                Some((id, scope)) => game.variable_value(id, scope),
                None => VariableValue::number(0),
            })
            .collect();
        Score { team: None, team_name: String::new(), values }
    }

    /// Reverse linear scan: stop at the first existing score better than or
    /// equal to `score`, so ties keep their place. `None` if that lands
    /// outside the table.
    fn find_position(&self, score: &Score) -> Option<usize> {
        let elements = self.definition.score_elements();
        let position = self
            .scores
            .iter()
            .rposition(|cur| {
                elements
                    .iter()
                    .zip(cur.values.iter().zip(&score.values))
                    .find_map(|(element, (cur, new))| {
                        debug_assert_eq!(cur.format, new.format);
                        let ord = cur.value.cmp(&new.value);
                        let ord = if element.lowest_best { ord.reverse() } else { ord };
                        ord.is_ne().then_some(ord.is_gt())
                    })
                    .unwrap_or(true)
            })
            .map_or(0, |better| better + 1);
        (position < self.definition.max_scores()).then_some(position)
    }

    fn insert(&mut self, game: &GameState, pref_team: usize) -> Option<usize> {
        let mut score = self.create_score(game, pref_team);
        let position = self.find_position(&score)?;
        let prefs = game.prefs();
        let tot_mates = prefs.team_tot_mates(pref_team);
        let max_teams = self.definition.config().app_constraints().max_teams();
        score.team = Some(pref_team);
        score.team_name = if max_teams == 1 || tot_mates == 1 {
            let humans: Vec<&str> = (0..tot_mates)
                .filter(|&mate| !prefs.is_mate_ai(pref_team, mate))
                .map(|mate| prefs.mate_name(pref_team, mate))
                .collect();
            humans.join("+")
        } else {
            String::new()
        };
        if score.team_name.is_empty() {
            score.team_name = prefs.team_name(pref_team).to_string();
        }
        self.scores.insert(position, score);
        self.scores.truncate(self.definition.max_scores());
        Some(position)
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// JSON with code, title and scores. Team markers are not stored.
    pub fn to_json(&self) -> Result<String, HighscoreError> {
        let file = HighscoreFile { code: self.code.clone(), title: self.title.clone(), scores: self.scores.clone() };
        Ok(serde_json::to_string(&file)?)
    }

    /// Load a table written by [`Self::to_json`] for `definition`.
    pub fn from_json(definition: Rc<HighscoresDefinition>, json: &str) -> Result<Self, HighscoreError> {
        let file: HighscoreFile = serde_json::from_str(json)?;
        Self::with_scores(definition, &file.code, &file.title, file.scores)
    }

    /// Hex SHA-256 of the JSON form, equal for equal tables.
    pub fn digest(&self) -> Result<String, HighscoreError> {
        use sha2::{Digest, Sha256};
        let json = self.to_json()?;
        Ok(hex::encode(Sha256::digest(json.as_bytes())))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::{KeyAction, StdConfig, StdConfigInit};
    use crate::game::{Game, GameInit, LevelContext, LevelDriver, VariableFormat, VariableType};
    use crate::highscore::{ConstraintKind, Discriminator, Eligibility, HighscoreConstraint, ScoreElement};
    use crate::input::{CapabilityClass, DeviceManager, HardwareKey};
    use crate::prefs::StdPreferences;

    struct Idle;

    impl LevelDriver for Idle {
        fn handle_timer(&mut self, _ctx: &mut LevelContext<'_>) {}
    }

    fn prefs(tot_teams: usize, ai_team: Option<usize>) -> Rc<StdPreferences> {
        let mut dm = DeviceManager::new(&[CapabilityClass::Keys]);
        dm.add_device("keyboard", &[CapabilityClass::Keys]);
        let mut init = StdConfigInit::new("table-test", "1.0", &dm);
        init.app_constraints.teams_min = 1;
        init.app_constraints.teams_max = 2;
        init.app_constraints.mates_per_team_max = 2;
        init.app_constraints.ai_mates_per_team_max = 1;
        init.app_constraints.players_max = 4;
        init.key_actions =
            vec![KeyAction::new(&["Fire"], "Fire", vec![(CapabilityClass::Keys, vec![HardwareKey::Space])])];
        let config = Rc::new(StdConfig::new(init).unwrap());
        let mut prefs = StdPreferences::new(config, &dm);
        assert!(prefs.set_tot_teams(tot_teams));
        if let Some(team) = ai_team {
            let id = prefs.team(team).unwrap().mate_id(0).unwrap();
            assert!(prefs.set_player_ai(id, true));
        }
        prefs.set_edit_mode(false);
        Rc::new(prefs)
    }

    fn definition(prefs: &StdPreferences, max_scores: usize) -> Rc<HighscoresDefinition> {
        Rc::new(
            HighscoresDefinition::new(
                Rc::clone(prefs.config()),
                vec![HighscoreConstraint { kind: ConstraintKind::TotTeams, min: 1, max: 2 }],
                vec![Discriminator::TotTeams],
                vec![Eligibility { var_name: "Points".to_string(), min: 0, max: i32::MAX }],
                vec![ScoreElement::new("Points", "Points", false)],
                max_scores,
            )
            .unwrap(),
        )
    }

    /// A game where every team ends with the given points.
    fn ended_game(prefs: &Rc<StdPreferences>, points: &[i32]) -> Game {
        let mut init = GameInit::new("table-test");
        init.all_teams_in_one_level = true;
        init.team_variables = vec![("Points".to_string(), VariableType::new(1000))];
        let app_prefs: Rc<dyn AppPreferences> = Rc::clone(prefs) as Rc<dyn AppPreferences>;
        let mut game = Game::new(init, app_prefs, |_, _| Box::new(Idle)).unwrap();
        game.start();
        game.handle_timer();
        let (points_id, _) = game.state().variable_id_and_owner("Points").unwrap();
        for (team, &value) in points.iter().enumerate() {
            let scope = game.state().team_scope(team);
            game.state_mut().set_variable(points_id, scope, value);
        }
        game.end();
        assert!(!game.is_running());
        game
    }

    fn scores(points: &[i32]) -> Vec<Score> {
        points.iter().map(|&p| Score::new(&format!("T{p}"), vec![VariableValue::number(p)])).collect()
    }

    fn values(highscore: &Highscore) -> Vec<i32> {
        highscore.scores().iter().map(|score| score.values[0].value).collect()
    }

    #[test]
    fn test_include_into_empty_table() {
        let prefs = prefs(1, None);
        let def = definition(&prefs, 5);
        let code = def.code_from_preferences(&*prefs).unwrap();
        let title = def.title_from_preferences(&*prefs).unwrap();
        let game = ended_game(&prefs, &[1000]);

        let mut highscore = Highscore::new(Rc::clone(&def), &code, &title).unwrap();
        assert_eq!(highscore.tot_scores(), 0);
        assert!(Rc::ptr_eq(highscore.definition(), &def));
        assert_eq!(highscore.include_game(game.state(), true), vec![0]);
        let score = highscore.score(0).unwrap();
        assert_eq!(score.team(), Some(0));
        assert_eq!(score.values, vec![VariableValue { value: 1000, format: VariableFormat::Number }]);
        assert_eq!(score.values[0].to_string(), "1000");
        assert_eq!(score.team_name, prefs.mate_name(0, 0));
    }

    #[test]
    fn test_add_position() {
        let prefs = prefs(1, None);
        let def = definition(&prefs, 5);
        let game = ended_game(&prefs, &[1000]);
        let mut highscore = Highscore::with_scores(def, "1", "Teams: 1", scores(&[5000, 4000, 3000, 500])).unwrap();

        assert_eq!(highscore.include_game(game.state(), true), vec![3]);
        assert_eq!(values(&highscore), vec![5000, 4000, 3000, 1000, 500]);
        assert_eq!(highscore.score(3).unwrap().team(), Some(0));
        assert_eq!(highscore.score(2).unwrap().team(), None);
        assert_eq!(highscore.score(4).unwrap().team(), None);
    }

    #[test]
    fn test_pole_position_evicts_last() {
        let prefs = prefs(1, None);
        let def = definition(&prefs, 5);
        let game = ended_game(&prefs, &[1000]);
        let mut highscore = Highscore::with_scores(def, "1", "", scores(&[800, 400, 300, 50, 20])).unwrap();

        assert_eq!(highscore.include_game(game.state(), true), vec![0]);
        assert_eq!(values(&highscore), vec![1000, 800, 400, 300, 50]);
    }

    #[test]
    fn test_full_table_rejects_worse_score() {
        let prefs = prefs(1, None);
        let def = definition(&prefs, 3);
        let game = ended_game(&prefs, &[1000]);
        let mut highscore = Highscore::with_scores(def, "", "", scores(&[5000, 3000, 2000])).unwrap();

        assert!(highscore.include_game(game.state(), true).is_empty());
        assert_eq!(values(&highscore), vec![5000, 3000, 2000]);
        assert_eq!(highscore.position_if_included(game.state(), 0), None);
    }

    #[test]
    fn test_ties_do_not_displace() {
        let prefs = prefs(1, None);
        let def = definition(&prefs, 5);
        let game = ended_game(&prefs, &[1000]);
        let mut highscore = Highscore::with_scores(def, "", "", scores(&[2000, 1000, 500])).unwrap();

        assert_eq!(highscore.position_if_included(game.state(), 0), Some(2));
        assert_eq!(highscore.include_game(game.state(), true), vec![2]);
        assert_eq!(highscore.score(1).unwrap().team_name, "T1000");
        assert_eq!(highscore.score(2).unwrap().team(), Some(0));
        assert_eq!(values(&highscore), vec![2000, 1000, 1000, 500]);

        // A tie with the last entry of a full table stays out.
        let def = definition(&prefs, 2);
        let mut full = Highscore::with_scores(def, "", "", scores(&[2000, 1000])).unwrap();
        assert_eq!(full.position_if_included(game.state(), 0), None);
        assert!(full.include_game(game.state(), true).is_empty());
        assert_eq!(values(&full), vec![2000, 1000]);
    }

    #[test]
    fn test_lowest_best_with_tie_break() {
        let prefs = prefs(1, None);
        let def = Rc::new(
            HighscoresDefinition::new(
                Rc::clone(prefs.config()),
                Vec::new(),
                Vec::new(),
                Vec::new(),
                vec![ScoreElement::new("Time", "Time", true), ScoreElement::new("Points", "Points", false)],
                5,
            )
            .unwrap(),
        );
        let mut init = GameInit::new("lowest");
        init.team_variables =
            vec![("Time".to_string(), VariableType::new(70)), ("Points".to_string(), VariableType::new(300))];
        let app_prefs: Rc<dyn AppPreferences> = Rc::clone(&prefs) as Rc<dyn AppPreferences>;
        let mut game = Game::new(init, app_prefs, |_, _| Box::new(Idle)).unwrap();
        game.start();
        game.end();

        let row = |name: &str, time, points| Score::new(name, vec![VariableValue::number(time), VariableValue::number(points)]);
        let existing = vec![row("a", 60, 100), row("b", 70, 500), row("c", 70, 200), row("d", 90, 900)];
        let mut highscore = Highscore::with_scores(def, "", "", existing).unwrap();
        assert_eq!(highscore.include_game(game.state(), true), vec![2]);
        let names: Vec<&str> = highscore.scores().iter().map(|s| s.team_name.as_str()).collect();
        assert_eq!(names[..2], ["a", "b"]);
        assert_eq!(names[3..], ["c", "d"]);
    }

    #[test]
    fn test_batch_positions_shift() {
        let prefs = prefs(2, None);
        let def = definition(&prefs, 4);
        let game = ended_game(&prefs, &[800, 3000]);
        let mut highscore = Highscore::with_scores(Rc::clone(&def), "", "", scores(&[5000, 1000, 500, 400])).unwrap();

        assert_eq!(highscore.include_game(game.state(), true), vec![3, 1]);
        assert_eq!(values(&highscore), vec![5000, 3000, 1000, 800]);
        assert_eq!(highscore.score(1).unwrap().team(), Some(1));
        assert_eq!(highscore.score(3).unwrap().team(), Some(0));

        // A position pushed out of the table by a later team is dropped.
        let game = ended_game(&prefs, &[450, 3000]);
        let mut highscore = Highscore::with_scores(def, "", "", scores(&[5000, 1000, 500, 400])).unwrap();
        assert_eq!(highscore.include_game(game.state(), true), vec![1]);
        assert_eq!(values(&highscore), vec![5000, 3000, 1000, 500]);
    }

    #[test]
    fn test_team_name_of_single_mate_teams() {
        let prefs = prefs(2, None);
        let def = definition(&prefs, 4);
        let game = ended_game(&prefs, &[10, 20]);
        let mut highscore = Highscore::empty(def);
        assert_eq!(highscore.include_game(game.state(), true), vec![1, 0]);
        assert_eq!(highscore.score(0).unwrap().team_name, prefs.mate_name(1, 0));
        assert_eq!(highscore.score(1).unwrap().team_name, prefs.mate_name(0, 0));
        assert!(highscore.set_score_team_name(0, "Ace"));
        assert!(!highscore.set_score_team_name(0, ""));
        assert!(!highscore.set_score_team_name(7, "Nobody"));
        assert_eq!(highscore.score(0).unwrap().team_name, "Ace");
    }

    #[test]
    fn test_eligibility() {
        let prefs = prefs(2, Some(1));
        let def = definition(&prefs, 5);
        let game = ended_game(&prefs, &[-5, 2000]);

        let mut highscore = Highscore::empty(Rc::clone(&def));
        assert!(highscore.include_game(game.state(), true).is_empty(), "negative points and AI team");

        let mut highscore = Highscore::empty(def);
        assert_eq!(highscore.include_game(game.state(), false), vec![1, 0]);
        assert_eq!(values(&highscore), vec![2000, -5]);
    }

    #[test]
    fn test_teams_still_playing_are_not_eligible() {
        let prefs = prefs(1, None);
        let def = definition(&prefs, 5);
        let mut init = GameInit::new("running");
        init.team_variables = vec![("Points".to_string(), VariableType::new(1000))];
        let app_prefs: Rc<dyn AppPreferences> = Rc::clone(&prefs) as Rc<dyn AppPreferences>;
        let mut game = Game::new(init, app_prefs, |_, _| Box::new(Idle)).unwrap();
        game.start();
        game.handle_timer();

        let mut highscore = Highscore::with_scores(def, "", "", scores(&[5000])).unwrap();
        assert!(highscore.include_game(game.state(), true).is_empty());
        assert_eq!(highscore.position_if_included(game.state(), 0), Some(1));
    }

    #[test]
    fn test_with_scores_validates() {
        let prefs = prefs(1, None);
        let def = definition(&prefs, 2);
        let too_many = Highscore::with_scores(Rc::clone(&def), "", "", scores(&[3, 2, 1]));
        assert!(matches!(too_many, Err(HighscoreError::TooManyScores { scores: 3, max: 2 })));
        let unnamed = Highscore::with_scores(Rc::clone(&def), "", "", vec![Score::new("", vec![VariableValue::number(1)])]);
        assert!(matches!(unnamed, Err(HighscoreError::MalformedScore(0))));
        let short = Highscore::with_scores(Rc::clone(&def), "", "", vec![Score::new("T", Vec::new())]);
        assert!(matches!(short, Err(HighscoreError::MalformedScore(0))));
        assert!(matches!(Highscore::new(def, "3", ""), Err(HighscoreError::InvalidCode(_))));
    }

    #[test]
    fn test_json_and_digest() {
        let prefs = prefs(1, None);
        let def = definition(&prefs, 5);
        let game = ended_game(&prefs, &[1000]);
        let mut highscore = Highscore::with_scores(Rc::clone(&def), "1", "Teams: 1", scores(&[5000, 500])).unwrap();
        highscore.include_game(game.state(), true);

        let json = highscore.to_json().unwrap();
        let loaded = Highscore::from_json(Rc::clone(&def), &json).unwrap();
        assert_eq!(loaded.code(), "1");
        assert_eq!(loaded.title(), "Teams: 1");
        assert_eq!(values(&loaded), vec![5000, 1000, 500]);
        assert!(loaded.scores().iter().all(|score| score.team().is_none()));
        assert_eq!(loaded.digest().unwrap(), highscore.digest().unwrap());

        let mut renamed = loaded.clone();
        renamed.set_score_team_name(1, "Someone");
        assert_ne!(renamed.digest().unwrap(), highscore.digest().unwrap());

        assert!(matches!(Highscore::from_json(def, "{"), Err(HighscoreError::Json(_))));
    }
}
