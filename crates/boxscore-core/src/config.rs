// Configuration loading and parsing (config/boxscore.toml).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::model::ShotCategory;

/// File name looked up inside a `config/` directory.
pub const CONFIG_FILE: &str = "boxscore.toml";

/// The shipped defaults, embedded so the binary works without any file on
/// disk.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../defaults/boxscore.toml");

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// boxscore.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub rankings: RankingsConfig,
    /// Shot notation table keyed by the single character written in a
    /// quarter cell.
    pub notation: BTreeMap<String, NotationSymbol>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportConfig {
    #[serde(default)]
    pub on_duplicate: DuplicatePolicy,
}

/// How a game import treats a box score that already exists for the same
/// home team, visitor and date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail the import with a duplicate-game error.
    #[default]
    Reject,
    /// Leave the stored box score untouched and report the game as skipped.
    Skip,
    /// Replace the stored box score with the imported one.
    Overwrite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankingsConfig {
    #[serde(default = "default_min_attempts")]
    pub min_attempts: u32,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for RankingsConfig {
    fn default() -> Self {
        Self {
            min_attempts: default_min_attempts(),
            limit: default_limit(),
        }
    }
}

fn default_min_attempts() -> u32 {
    10
}

fn default_limit() -> usize {
    10
}

/// What one notation character means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotationSymbol {
    pub category: ShotCategory,
    pub made: bool,
}

impl Config {
    /// The configuration shipped in `defaults/boxscore.toml`.
    pub fn builtin() -> Result<Self, ConfigError> {
        parse_config(DEFAULT_CONFIG_TOML, Path::new("<builtin>"))
    }

    /// Notation entries as `(char, symbol)` pairs. Keys are validated to be
    /// exactly one character when the config is loaded.
    pub fn notation_symbols(&self) -> impl Iterator<Item = (char, NotationSymbol)> + '_ {
        self.notation
            .iter()
            .filter_map(|(key, symbol)| key.chars().next().map(|c| (c, *symbol)))
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Parse and validate config text. `path` is only used for error messages.
pub fn parse_config(text: &str, path: &Path) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;
    validate(&config)?;
    Ok(config)
}

/// Load and validate `config/boxscore.toml` relative to `base_dir`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    load_config_file(&path)
}

/// Load and validate an explicit config file.
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let text = read_file(path)?;
    parse_config(&text, path)
}

/// Write the default config to `config/boxscore.toml` under `base_dir` if
/// it is not there yet. Returns the path written, or `None` when a config
/// file already existed.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let config_dir = base_dir.join("config");
    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let target = config_dir.join(CONFIG_FILE);
    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
    {
        Ok(mut dest) => {
            std::io::Write::write_all(&mut dest, DEFAULT_CONFIG_TOML.as_bytes()).map_err(|e| {
                ConfigError::DefaultsCopyError {
                    message: format!("failed to write {}: {e}", target.display()),
                }
            })?;
            Ok(Some(target))
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(ConfigError::DefaultsCopyError {
            message: format!("failed to create {}: {e}", target.display()),
        }),
    }
}

/// Resolve the configuration the way the CLI does: `./config/boxscore.toml`
/// first, then the per-user config directory, then the built-in defaults.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;

    let local = cwd.join("config").join(CONFIG_FILE);
    if local.exists() {
        info!("using config {}", local.display());
        return load_config_file(&local);
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", "boxscore") {
        let user = dirs.config_dir().join(CONFIG_FILE);
        if user.exists() {
            info!("using config {}", user.display());
            return load_config_file(&user);
        }
    }

    info!("no config file found, using built-in defaults");
    Config::builtin()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.database.path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    if config.notation.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "notation".into(),
            message: "at least one shot symbol must be defined".into(),
        });
    }

    for key in config.notation.keys() {
        let mut chars = key.chars();
        let single = matches!((chars.next(), chars.next()), (Some(c), None) if !c.is_whitespace());
        if !single {
            return Err(ConfigError::ValidationError {
                field: format!("notation.{key:?}"),
                message: "keys must be exactly one non-whitespace character".into(),
            });
        }
    }

    if config.rankings.limit == 0 {
        return Err(ConfigError::ValidationError {
            field: "rankings.limit".into(),
            message: "must be greater than 0".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
