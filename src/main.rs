//! STMG Engine demo
//!
//! Plays a small two-team race on the engine, merges the result into a
//! highscore table and replays it to check the table digest is stable.
//!
//! Usage: `stmg-demo [config.json]`

use std::rc::Rc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use stmg::{
    config::StdConfigFile,
    game::{GameInit, KeyActionEvent, VarScope, TEAM_VAR_FINISHED_TIME},
    highscore::{ConstraintKind, Discriminator, Eligibility, HighscoreConstraint, ScoreElement},
    AppPreferences, CapabilityClass, DeviceManager, Game, GameOption, Highscore, HighscoresDefinition,
    InputEvent, KeyInputType, LevelContext, LevelDriver, OwnerType, StdConfig, StdPreferences, Variant,
    VariableType, VERSION,
};

/// Points a team needs to finish the race.
const FINISH_POINTS: i32 = 500;
/// Safety stop for the demo loop.
const MAX_TICKS: i32 = 10_000;

const DEFAULT_CONFIG: &str = r#"{
    "app_name": "stmg-demo",
    "app_version": "1.0",
    "app_constraints": {
        "teams_min": 1, "teams_max": 2, "mates_per_team_max": 2,
        "ai_mates_per_team_max": 1, "players_max": 4
    },
    "capability_assignment": { "auto_assign_to_active_player": false },
    "key_actions": [
        { "names": ["Boost"], "description": "Boost",
          "default_keys": [ { "class": "keys", "keys": ["SPACE", "ENTER"] } ] }
    ]
}"#;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    info!("STMG Engine demo v{}", VERSION);

    let mut dm = DeviceManager::new(&[CapabilityClass::Keys]);
    dm.add_device("keyboard", &[CapabilityClass::Keys]);

    let config = Rc::new(load_config(&dm)?);
    let mut prefs = StdPreferences::new(Rc::clone(&config), &dm);
    if !prefs.set_tot_teams(2) {
        bail!("config does not allow two teams");
    }
    if !prefs.set_option_value("Difficulty", Variant::Int(1)) {
        warn!("Difficulty option rejected, playing on default");
    }
    prefs.set_edit_mode(false);
    let prefs = Rc::new(prefs);

    let definition = Rc::new(
        HighscoresDefinition::new(
            Rc::clone(&config),
            vec![HighscoreConstraint { kind: ConstraintKind::TotTeams, min: 1, max: 2 }],
            vec![
                Discriminator::TotTeams,
                Discriminator::Option { owner: OwnerType::Game, name: "Difficulty".to_string() },
            ],
            vec![Eligibility { var_name: "Points".to_string(), min: 0, max: i32::MAX }],
            vec![ScoreElement::new("Points", "Points", false), ScoreElement::new("Time", TEAM_VAR_FINISHED_TIME, true)],
            5,
        )
        .context("Invalid highscore definition")?,
    );
    let code = definition.code_from_preferences(&*prefs).context("No highscore table for these preferences")?;
    let title = definition.title_from_preferences(&*prefs).unwrap_or_default();
    info!(%code, %title, "Highscore table");

    let first = play(&prefs, &dm, &definition, &code, &title)?;
    let replay = play(&prefs, &dm, &definition, &code, &title)?;

    info!("=== Highscores: {} ===", first.title());
    for (position, score) in first.scores().iter().enumerate() {
        let values: Vec<String> = score.values.iter().map(|v| v.to_string()).collect();
        info!("#{} {:<12} {}", position + 1, score.team_name, values.join("  "));
    }
    let digest = first.digest().context("Failed to hash highscore table")?;
    info!("Table digest: {}", digest);
    if digest == replay.digest().context("Failed to hash replayed table")? {
        info!("Replay produced the same table");
    } else {
        warn!("Replay produced a different table");
    }
    Ok(())
}

fn load_config(dm: &DeviceManager) -> Result<StdConfig> {
    let file = match std::env::args().nth(1) {
        Some(path) => StdConfigFile::from_path(&path).with_context(|| format!("Failed to read config {path}"))?,
        None => StdConfigFile::from_json(DEFAULT_CONFIG).context("Built-in config is invalid")?,
    };
    let difficulty = GameOption::new_enum(
        OwnerType::Game,
        "Difficulty",
        0,
        "Difficulty",
        &[(0, "Easy", "Easy"), (1, "Hard", "Hard")],
    )?;
    StdConfig::new(file.into_init(dm, vec![Rc::new(difficulty)])).context("Invalid configuration")
}

/// Play one game and merge it into a fresh table.
fn play(
    prefs: &Rc<StdPreferences>,
    dm: &DeviceManager,
    definition: &Rc<HighscoresDefinition>,
    code: &str,
    title: &str,
) -> Result<Highscore> {
    let mut init = GameInit::new("race");
    init.all_teams_in_one_level = true;
    init.seed = 12345;
    init.team_variables = vec![("Points".to_string(), VariableType::new(0))];
    init.highscores_definition = Some(Rc::clone(definition));
    let app_prefs: Rc<dyn AppPreferences> = Rc::clone(prefs) as Rc<dyn AppPreferences>;
    let mut game = Game::new(init, app_prefs, |_, _| Box::new(RaceLevel::default()))
        .context("Failed to create game")?;

    // The first player boosts every few ticks.
    let (capability, key) = prefs.player_by_number(0).map(|p| p.key_value(0)).unwrap_or((None, None));
    let boost = capability.zip(key);
    if boost.is_none() {
        warn!("First player has no boost key");
    }
    if let Some(device) = dm.devices().first() {
        debug!(device = device.name(), "Input device");
    }

    game.start();
    loop {
        let tick = game.state().tick();
        if let Some((capability, key)) = &boost {
            if tick % 4 == 0 {
                game.handle_input(InputEvent::key_press(capability, *key, i64::from(tick) * 1000));
            } else if tick % 4 == 1 {
                game.handle_input(InputEvent::key_release(capability, *key, i64::from(tick) * 1000));
            }
        }
        let result = game.handle_timer();
        if result.game_ended {
            info!(tick = result.tick, winner = ?result.winner_team, "Race over");
            break;
        }
        if tick >= MAX_TICKS {
            bail!("race did not finish within {MAX_TICKS} ticks");
        }
    }

    let mut highscore = Highscore::new(Rc::clone(definition), code, title).context("Invalid table code")?;
    let positions = highscore.include_game(game.state(), true);
    info!(?positions, "Included in highscores");
    Ok(highscore)
}

/// Teams gain random points each tick and finish at [`FINISH_POINTS`].
#[derive(Default)]
struct RaceLevel {
    points: Option<usize>,
}

impl LevelDriver for RaceLevel {
    fn game_start(&mut self, ctx: &mut LevelContext<'_>) {
        self.points = ctx.variable_id_and_owner("Points").map(|(id, _)| id);
    }

    fn handle_timer(&mut self, ctx: &mut LevelContext<'_>) {
        let Some(points) = self.points else {
            ctx.status_technical(&["Points variable missing".to_string()]);
            return;
        };
        let level = ctx.level();
        for level_team in 0..ctx.tot_level_teams() {
            if !ctx.is_team_playing(level_team) {
                continue;
            }
            let gain = ctx.random(0, 10);
            let scope = VarScope::Team { level, level_team };
            ctx.inc_variable(points, scope, gain);
            if ctx.team_variable(points, level_team).get(&ctx.clock()) >= FINISH_POINTS {
                ctx.status_completed(level_team, false);
            }
        }
    }

    fn handle_key_action(&mut self, ctx: &mut LevelContext<'_>, level_team: usize, _mate: usize, event: &KeyActionEvent) {
        if event.input_type != KeyInputType::Press {
            return;
        }
        if let Some(points) = self.points {
            let level = ctx.level();
            ctx.inc_variable(points, VarScope::Team { level, level_team }, 5);
        }
    }
}
