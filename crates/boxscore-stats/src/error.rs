// Error taxonomy for the import pipeline.

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use boxscore_core::model::ShotCategory;

/// A quarter cell contained a character the notation table does not map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized shot symbol {character:?} at position {position}")]
pub struct ParseError {
    pub character: char,
    /// Zero-based character offset within the notation string.
    pub position: usize,
}

/// A malformed or missing CSV field. `line` is the 1-based line in the
/// source file, absent for file-level problems (e.g. no header row).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{}{}", location(.line, .column), .message)]
pub struct ValidationError {
    pub line: Option<u64>,
    pub column: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub(crate) fn file(message: impl Into<String>) -> Self {
        Self {
            line: None,
            column: None,
            message: message.into(),
        }
    }

    pub(crate) fn at(line: u64, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            column: None,
            message: message.into(),
        }
    }

    pub(crate) fn cell(line: u64, column: &str, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            column: Some(column.to_string()),
            message: message.into(),
        }
    }
}

fn location(line: &Option<u64>, column: &Option<String>) -> String {
    match (line, column) {
        (Some(line), Some(column)) => format!("line {line}, column `{column}`: "),
        (Some(line), None) => format!("line {line}: "),
        (None, Some(column)) => format!("column `{column}`: "),
        (None, None) => String::new(),
    }
}

fn line_prefix(line: &Option<u64>) -> String {
    line.map(|line| format!("line {line}: ")).unwrap_or_default()
}

/// A uniqueness clash that would require guessing a player's identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictError {
    #[error("team {team}: jersey #{jersey} already belongs to {existing}, not {incoming}")]
    JerseyTaken {
        team: String,
        jersey: u32,
        existing: String,
        incoming: String,
    },

    #[error("team {team}: {name} is already registered as #{existing_jersey}, not #{incoming_jersey}")]
    NameTaken {
        team: String,
        name: String,
        existing_jersey: u32,
        incoming_jersey: u32,
    },
}

/// Which half of a make/attempt pair disagreed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountKind {
    Made,
    Attempted,
}

impl std::fmt::Display for CountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountKind::Made => f.write_str("made"),
            CountKind::Attempted => f.write_str("attempted"),
        }
    }
}

/// Quarter rows and the game total for one player disagree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "{}{}: {} {} sums to {} across quarters but the total is {}",
    line_prefix(.line), .player, .category, .kind, .quarters, .total
)]
pub struct IntegrityError {
    pub line: Option<u64>,
    pub player: String,
    pub category: ShotCategory,
    pub kind: CountKind,
    pub quarters: u32,
    pub total: u32,
}

/// A quarter cell that failed to parse, with the row it came from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {player}, quarter {quarter}: {source}")]
pub struct NotationError {
    pub line: u64,
    pub player: String,
    pub quarter: u8,
    pub source: ParseError,
}

/// A conflict raised while resolving the entity on `line`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {source}")]
pub struct RowConflict {
    pub line: u64,
    pub source: ConflictError,
}

/// Failure of a single entity lookup/creation.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Everything that can abort a roster or game import. Nothing is persisted
/// when an import returns one of these.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{} validation error(s)", .0.len())]
    Validation(Vec<ValidationError>),

    #[error("{} notation error(s)", .0.len())]
    Notation(Vec<NotationError>),

    #[error("{} conflict(s)", .0.len())]
    Conflict(Vec<RowConflict>),

    #[error("{} integrity error(s)", .0.len())]
    Integrity(Vec<IntegrityError>),

    #[error("a game between {home} and {visitor} on {date} is already stored")]
    DuplicateGame {
        home: String,
        visitor: String,
        date: NaiveDate,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// One user-facing problem report, tied to a file line when there is one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportIssue {
    pub line: Option<u64>,
    pub message: String,
}

impl ImportError {
    /// Flatten the error into per-row issues, ordered by line.
    pub fn issues(&self) -> Vec<ImportIssue> {
        let mut issues: Vec<ImportIssue> = match self {
            ImportError::Validation(errors) => errors
                .iter()
                .map(|e| ImportIssue {
                    line: e.line,
                    message: e.to_string(),
                })
                .collect(),
            ImportError::Notation(errors) => errors
                .iter()
                .map(|e| ImportIssue {
                    line: Some(e.line),
                    message: e.to_string(),
                })
                .collect(),
            ImportError::Conflict(errors) => errors
                .iter()
                .map(|e| ImportIssue {
                    line: Some(e.line),
                    message: e.to_string(),
                })
                .collect(),
            ImportError::Integrity(errors) => errors
                .iter()
                .map(|e| ImportIssue {
                    line: e.line,
                    message: e.to_string(),
                })
                .collect(),
            other => vec![ImportIssue {
                line: None,
                message: other.to_string(),
            }],
        };
        issues.sort_by_key(|issue| issue.line);
        issues
    }
}
