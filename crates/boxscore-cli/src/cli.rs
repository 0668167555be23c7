// Command-line surface.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

use boxscore_core::config::DuplicatePolicy;
use boxscore_stats::rollup::RankMetric;

#[derive(Parser)]
#[command(name = "boxscore")]
#[command(version, about = "Import basketball box scores and report shooting stats", long_about = None)]
pub struct Cli {
    /// Config file (default: ./config/boxscore.toml, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Database file, overriding `database.path` from the config
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Print results as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write the default config file and create the database
    Init {
        /// Directory to create `config/boxscore.toml` under
        #[arg(long, value_name = "DIR", default_value = ".")]
        dir: PathBuf,
    },

    /// Register teams and players from a roster CSV
    ImportRoster {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Import one or more box-score CSV files
    ImportGame {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// What to do when the game is already stored (default from config)
        #[arg(long, value_enum)]
        on_duplicate: Option<OnDuplicate>,
    },

    /// List stored games
    Games {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Show every player line of one stored game
    BoxScore {
        #[arg(long)]
        game_id: i64,
    },

    /// Career or date-range totals for one player
    PlayerStats {
        /// Team short name
        #[arg(long)]
        team: String,

        #[arg(long)]
        jersey: u32,

        /// First game date to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last game date to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// One team's totals in one game
    TeamGame {
        #[arg(long)]
        game_id: i64,

        /// Team short name
        #[arg(long)]
        team: String,
    },

    /// Rank players by a shooting metric
    Leaders {
        /// points, fg, fg3, ft, efg, ts or ppsa
        #[arg(long, default_value = "points")]
        metric: RankMetric,

        /// Minimum attempts in the metric's denominator (default from config)
        #[arg(long)]
        min_attempts: Option<u32>,

        /// Number of players to show (default from config)
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        from: Option<NaiveDate>,

        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnDuplicate {
    Reject,
    Skip,
    Overwrite,
}

impl From<OnDuplicate> for DuplicatePolicy {
    fn from(value: OnDuplicate) -> Self {
        match value {
            OnDuplicate::Reject => DuplicatePolicy::Reject,
            OnDuplicate::Skip => DuplicatePolicy::Skip,
            OnDuplicate::Overwrite => DuplicatePolicy::Overwrite,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_import_game_with_globals_after_subcommand() {
        let cli = Cli::try_parse_from([
            "boxscore",
            "import-game",
            "a.csv",
            "b.csv",
            "--on-duplicate",
            "overwrite",
            "--json",
            "--db",
            "league.db",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.db, Some(PathBuf::from("league.db")));
        match cli.command {
            Commands::ImportGame {
                files,
                dry_run,
                on_duplicate,
            } => {
                assert_eq!(files.len(), 2);
                assert!(!dry_run);
                assert_eq!(on_duplicate, Some(OnDuplicate::Overwrite));
            }
            _ => panic!("expected import-game"),
        }
    }

    #[test]
    fn parses_dates_and_metric() {
        let cli = Cli::try_parse_from([
            "boxscore", "leaders", "--metric", "ts", "--from", "2024-01-01",
        ])
        .unwrap();
        match cli.command {
            Commands::Leaders { metric, from, .. } => {
                assert_eq!(metric, RankMetric::TsPct);
                assert_eq!(from, NaiveDate::from_ymd_opt(2024, 1, 1));
            }
            _ => panic!("expected leaders"),
        }

        assert!(Cli::try_parse_from(["boxscore", "leaders", "--metric", "rebounds"]).is_err());
        assert!(Cli::try_parse_from(["boxscore", "games", "--from", "01/05/2024"]).is_err());
    }

    #[test]
    fn import_game_requires_a_file() {
        assert!(Cli::try_parse_from(["boxscore", "import-game"]).is_err());
    }
}
