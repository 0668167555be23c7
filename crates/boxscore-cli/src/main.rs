// Box-score CLI entry point.
//
// Startup sequence:
// 1. Parse arguments
// 2. Initialize tracing (stderr, so JSON on stdout stays clean)
// 3. Load config (explicit --config, ./config, user config dir, defaults)
// 4. Open database (--db overrides the config path)
// 5. Run the command and print its report

mod cli;
mod report;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use boxscore_core::config::{self, Config};
use boxscore_core::db::Database;
use boxscore_stats::rollup::{self, Scope};
use boxscore_stats::{import_roster, ImportOptions, NotationMapping, StatsAggregator};

use cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    if let Commands::Init { dir } = &cli.command {
        return init(dir, cli.db.as_deref());
    }

    let config = match &cli.config {
        Some(path) => config::load_config_file(path),
        None => config::load_config(),
    }
    .context("failed to load configuration")?;

    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.database.path));
    let db = Database::open(&db_path.to_string_lossy()).context("failed to open database")?;
    info!("database opened at {}", db_path.display());

    run(cli, &config, &db)
}

fn init(dir: &Path, db_override: Option<&Path>) -> anyhow::Result<()> {
    match config::ensure_config_file(dir).context("failed to write default config")? {
        Some(path) => println!("wrote {}", path.display()),
        None => println!("config already present under {}", dir.join("config").display()),
    }

    let config = config::load_config_from(dir).context("failed to load configuration")?;
    let db_path = db_override
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dir.join(&config.database.path));
    let db = Database::open(&db_path.to_string_lossy()).context("failed to create database")?;
    println!(
        "database ready at {} (schema v{})",
        db_path.display(),
        db.schema_version()?
    );
    Ok(())
}

fn run(cli: Cli, config: &Config, db: &Database) -> anyhow::Result<()> {
    let json = cli.json;
    match cli.command {
        // Handled in `main` before the database is opened.
        Commands::Init { .. } => {}

        Commands::ImportRoster { file, dry_run } => {
            let text = read_input(&file)?;
            let result = import_roster(db, &text, dry_run);
            emit(json, &result, || report::roster_result(&result))?;
            if !result.is_ok() {
                bail!("roster import failed with {} error(s)", result.errors.len());
            }
        }

        Commands::ImportGame {
            files,
            dry_run,
            on_duplicate,
        } => {
            let mapping = NotationMapping::from_config(config);
            let aggregator = StatsAggregator::new(db, &mapping);
            let options = ImportOptions {
                on_duplicate: on_duplicate
                    .map(Into::into)
                    .unwrap_or(config.import.on_duplicate),
                dry_run,
            };

            let mut results = Vec::with_capacity(files.len());
            for file in &files {
                let text = read_input(file)?;
                let result = aggregator.import_csv(&text, options);
                if !json {
                    print!("{}", report::game_result(&file.display().to_string(), &result));
                }
                results.push(result);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            }

            let failed = results.iter().filter(|r| !r.is_ok()).count();
            if failed > 0 {
                bail!("{failed} of {} game file(s) failed to import", results.len());
            }
        }

        Commands::Games { from, to } => {
            let games = rollup::list_games(db, Scope::from_bounds(from, to))?;
            emit(json, &games, || report::game_list(&games))?;
        }

        Commands::BoxScore { game_id } => {
            let lines = rollup::player_game_lines(db, game_id)?;
            if lines.is_empty() {
                bail!("no box score stored for game {game_id}");
            }
            emit(json, &lines, || report::box_score(&lines))?;
        }

        Commands::PlayerStats {
            team,
            jersey,
            from,
            to,
        } => {
            let team_row = rollup::find_team(db, &team)?
                .with_context(|| format!("unknown team {team:?}"))?;
            let player = rollup::find_player(db, team_row.id, jersey)?
                .with_context(|| format!("{} has no player wearing #{jersey}", team_row.short_name))?;
            let totals = rollup::player_totals(db, player.id, Scope::from_bounds(from, to))?
                .with_context(|| format!("player {} disappeared", player.id))?;
            emit(json, &totals, || report::player_rollup(&totals))?;
        }

        Commands::TeamGame { game_id, team } => {
            let team_row = rollup::find_team(db, &team)?
                .with_context(|| format!("unknown team {team:?}"))?;
            let totals = rollup::team_game_totals(db, game_id, team_row.id)?;
            emit(json, &totals, || report::team_game(&totals))?;
        }

        Commands::Leaders {
            metric,
            min_attempts,
            limit,
            from,
            to,
        } => {
            let entries = rollup::leaders(
                db,
                metric,
                Scope::from_bounds(from, to),
                min_attempts.unwrap_or(config.rankings.min_attempts),
                limit.unwrap_or(config.rankings.limit),
            )?;
            emit(json, &entries, || report::leaderboard(metric, &entries))?;
        }
    }
    Ok(())
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Print `value` as JSON, or the text produced by `render`.
fn emit<T: Serialize>(json: bool, value: &T, render: impl FnOnce() -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", render());
    }
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("boxscore=info,warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
