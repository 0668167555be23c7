// Box-score import: notation parsing, entity resolution and stat writes for
// one game, committed as a single transaction.

use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{info, warn};

use boxscore_core::config::DuplicatePolicy;
use boxscore_core::db::Database;
use boxscore_core::model::{Player, ShotCategory};

use crate::error::{
    CountKind, ImportError, ImportIssue, IntegrityError, NotationError, ResolveError, RowConflict,
};
use crate::notation::{self, NotationMapping, ShotCounts};
use crate::resolver::{EntityChange, EntityResolver, ResolveMode};
use crate::validate::{self, GameHeader, PlayerRow, Side, ValidatedGame};

/// Caller choices for one import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    pub on_duplicate: DuplicatePolicy,
    pub dry_run: bool,
}

/// Outcome of a game import, successful or not.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GameImportResult {
    pub game_id: Option<i64>,
    pub game: Option<GameHeader>,
    pub rows_processed: usize,
    pub quarters_written: usize,
    /// The game already existed and the duplicate policy said to skip it.
    pub skipped: bool,
    /// The game already existed and its box score was rewritten.
    pub replaced: bool,
    pub dry_run: bool,
    pub changes: Vec<EntityChange>,
    pub errors: Vec<ImportIssue>,
}

impl GameImportResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn failed(game: Option<GameHeader>, dry_run: bool, error: &ImportError) -> Self {
        Self {
            game,
            dry_run,
            errors: error.issues(),
            ..Default::default()
        }
    }
}

/// A player row with every present quarter parsed.
struct ParsedRow<'g> {
    row: &'g PlayerRow,
    quarters: [Option<ShotCounts>; 4],
    totals: ShotCounts,
}

pub struct StatsAggregator<'a> {
    db: &'a Database,
    mapping: &'a NotationMapping,
}

impl<'a> StatsAggregator<'a> {
    pub fn new(db: &'a Database, mapping: &'a NotationMapping) -> Self {
        Self { db, mapping }
    }

    /// Validate and import a box-score file, flattening any failure into
    /// the result's `errors`.
    pub fn import_csv(&self, text: &str, options: ImportOptions) -> GameImportResult {
        let game = match validate::validate_game(text) {
            Ok(game) => game,
            Err(errors) => {
                let error = ImportError::Validation(errors);
                warn!("box score rejected: {error}");
                return GameImportResult::failed(None, options.dry_run, &error);
            }
        };
        match self.import_game(&game, options) {
            Ok(result) => result,
            Err(error) => {
                warn!(
                    "import of {} vs {} on {} failed: {error}",
                    game.header.home, game.header.visitor, game.header.date
                );
                GameImportResult::failed(Some(game.header), options.dry_run, &error)
            }
        }
    }

    /// Import a validated box score. Either every row is written or, on any
    /// error, nothing is.
    pub fn import_game(
        &self,
        game: &ValidatedGame,
        options: ImportOptions,
    ) -> Result<GameImportResult, ImportError> {
        let parsed = parse_rows(game, self.mapping)?;
        check_supplied_totals(&parsed)?;

        let result = if options.dry_run {
            let conn = self.db.conn();
            let mut resolver = EntityResolver::new(&conn, ResolveMode::DryRun);
            persist(&mut resolver, game, &parsed, options)?
        } else {
            self.db.transaction(|tx| {
                let mut resolver = EntityResolver::new(tx, ResolveMode::Apply);
                persist(&mut resolver, game, &parsed, options)
            })?
        };

        if !result.skipped {
            info!(
                "{} {} vs {} on {}: {} players, {} quarter rows{}",
                if options.dry_run { "planned" } else { "imported" },
                game.header.home,
                game.header.visitor,
                game.header.date,
                result.rows_processed,
                result.quarters_written,
                if result.replaced { " (replaced)" } else { "" }
            );
        }
        Ok(result)
    }
}

/// Parse every present quarter cell, collecting all notation errors.
fn parse_rows<'g>(
    game: &'g ValidatedGame,
    mapping: &NotationMapping,
) -> Result<Vec<ParsedRow<'g>>, ImportError> {
    let mut parsed = Vec::with_capacity(game.rows.len());
    let mut errors = Vec::new();

    for row in &game.rows {
        let mut quarters = [None; 4];
        for (idx, cell) in row.quarters.iter().enumerate() {
            let Some(cell) = cell else { continue };
            match notation::parse(cell, mapping) {
                Ok(counts) => quarters[idx] = Some(counts),
                Err(source) => errors.push(NotationError {
                    line: row.line,
                    player: row.name.clone(),
                    quarter: idx as u8 + 1,
                    source,
                }),
            }
        }
        let totals = quarters.iter().flatten().sum();
        parsed.push(ParsedRow {
            row,
            quarters,
            totals,
        });
    }

    if errors.is_empty() {
        Ok(parsed)
    } else {
        Err(ImportError::Notation(errors))
    }
}

/// Compare totals written in the file against the quarter sums.
fn check_supplied_totals(parsed: &[ParsedRow<'_>]) -> Result<(), ImportError> {
    let errors: Vec<IntegrityError> = parsed
        .iter()
        .filter_map(|p| {
            p.row
                .supplied_totals
                .map(|supplied| compare_counts(Some(p.row.line), &p.row.name, &p.totals, &supplied))
        })
        .flatten()
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ImportError::Integrity(errors))
    }
}

/// One `IntegrityError` per make/attempt count where `quarters` and
/// `total` disagree.
pub(crate) fn compare_counts(
    line: Option<u64>,
    player: &str,
    quarters: &ShotCounts,
    total: &ShotCounts,
) -> Vec<IntegrityError> {
    let mut errors = Vec::new();
    for category in ShotCategory::ALL {
        let pairs = [
            (CountKind::Made, quarters.made(category), total.made(category)),
            (CountKind::Attempted, quarters.attempted(category), total.attempted(category)),
        ];
        for (kind, from_quarters, stored) in pairs {
            if from_quarters != stored {
                errors.push(IntegrityError {
                    line,
                    player: player.to_string(),
                    category,
                    kind,
                    quarters: from_quarters,
                    total: stored,
                });
            }
        }
    }
    errors
}

fn persist(
    resolver: &mut EntityResolver<'_>,
    game: &ValidatedGame,
    parsed: &[ParsedRow<'_>],
    options: ImportOptions,
) -> Result<GameImportResult, ImportError> {
    let header = &game.header;
    let home = resolver.get_or_create_team(&header.home)?;
    let visitor = resolver.get_or_create_team(&header.visitor)?;

    let mut result = GameImportResult {
        game: Some(header.clone()),
        dry_run: options.dry_run,
        ..Default::default()
    };

    if let Some(existing) = resolver.find_game(header.date, home.id, visitor.id)? {
        match options.on_duplicate {
            DuplicatePolicy::Reject => {
                return Err(ImportError::DuplicateGame {
                    home: header.home.clone(),
                    visitor: header.visitor.clone(),
                    date: header.date,
                });
            }
            DuplicatePolicy::Skip => {
                info!(
                    "skipping {} vs {} on {}: already stored as game {}",
                    header.home, header.visitor, header.date, existing.id
                );
                result.game_id = Some(existing.id);
                result.skipped = true;
                result.changes = resolver.changes().to_vec();
                return Ok(result);
            }
            DuplicatePolicy::Overwrite => {
                if !resolver.is_dry_run() {
                    // Quarter rows go with their game rows (ON DELETE CASCADE).
                    resolver.connection().execute(
                        "DELETE FROM player_game_stats WHERE game_id = ?1",
                        params![existing.id],
                    )?;
                }
                result.replaced = true;
            }
        }
    }

    let game_row = resolver.get_or_create_game(header.date, home.id, visitor.id)?;

    // Resolve every player before writing anything so all conflicts are
    // reported together.
    let mut players: Vec<Player> = Vec::with_capacity(parsed.len());
    let mut conflicts = Vec::new();
    for p in parsed {
        let team_id = match p.row.side {
            Side::Home => home.id,
            Side::Visitor => visitor.id,
        };
        match resolver.get_or_create_player(team_id, p.row.jersey, &p.row.name) {
            Ok(player) => players.push(player),
            Err(ResolveError::Conflict(source)) => conflicts.push(RowConflict {
                line: p.row.line,
                source,
            }),
            Err(ResolveError::Database(e)) => return Err(e.into()),
        }
    }
    if !conflicts.is_empty() {
        return Err(ImportError::Conflict(conflicts));
    }

    for (p, player) in parsed.iter().zip(&players) {
        result.quarters_written += p.quarters.iter().flatten().count();
        if !resolver.is_dry_run() {
            write_player_stats(resolver.connection(), game_row.id, player.id, p)?;
        }
    }
    result.rows_processed = parsed.len();

    if !resolver.is_dry_run() {
        let errors = verify_game_integrity(resolver.connection(), game_row.id)?;
        if !errors.is_empty() {
            return Err(ImportError::Integrity(errors));
        }
    }

    result.game_id = Some(game_row.id);
    result.changes = resolver.changes().to_vec();
    Ok(result)
}

fn write_player_stats(
    conn: &Connection,
    game_id: i64,
    player_id: i64,
    parsed: &ParsedRow<'_>,
) -> rusqlite::Result<()> {
    let t = &parsed.totals;
    let stats_id: i64 = conn.query_row(
        "INSERT INTO player_game_stats
             (game_id, player_id, fouls, ftm, fta, fg2m, fg2a, fg3m, fg3a)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         RETURNING id",
        params![game_id, player_id, parsed.row.fouls, t.ftm, t.fta, t.fg2m, t.fg2a, t.fg3m, t.fg3a],
        |row| row.get(0),
    )?;

    let mut insert = conn.prepare_cached(
        "INSERT INTO player_quarter_stats
             (game_stats_id, quarter, ftm, fta, fg2m, fg2a, fg3m, fg3a)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for (idx, counts) in parsed.quarters.iter().enumerate() {
        if let Some(q) = counts {
            insert.execute(params![stats_id, idx as i64 + 1, q.ftm, q.fta, q.fg2m, q.fg2a, q.fg3m, q.fg3a])?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Integrity check
// ---------------------------------------------------------------------------

const INTEGRITY_SELECT: &str = "
    SELECT p.name,
           s.ftm, s.fta, s.fg2m, s.fg2a, s.fg3m, s.fg3a,
           COALESCE(SUM(q.ftm), 0), COALESCE(SUM(q.fta), 0),
           COALESCE(SUM(q.fg2m), 0), COALESCE(SUM(q.fg2a), 0),
           COALESCE(SUM(q.fg3m), 0), COALESCE(SUM(q.fg3a), 0)
    FROM player_game_stats s
    JOIN players p ON p.id = s.player_id
    LEFT JOIN player_quarter_stats q ON q.game_stats_id = s.id";

/// Re-read stored game totals for every player in `game_id` and compare
/// them with `SUM()` over the stored quarter rows.
pub fn verify_game_integrity(conn: &Connection, game_id: i64) -> rusqlite::Result<Vec<IntegrityError>> {
    integrity_errors(
        conn,
        &format!("{INTEGRITY_SELECT} WHERE s.game_id = ?1 GROUP BY s.id ORDER BY s.id"),
        game_id,
    )
}

/// Same check for a single box-score line.
pub(crate) fn verify_line_integrity(
    conn: &Connection,
    game_stats_id: i64,
) -> rusqlite::Result<Vec<IntegrityError>> {
    integrity_errors(
        conn,
        &format!("{INTEGRITY_SELECT} WHERE s.id = ?1 GROUP BY s.id"),
        game_stats_id,
    )
}

fn integrity_errors(conn: &Connection, sql: &str, id: i64) -> rusqlite::Result<Vec<IntegrityError>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![id], |row| {
        let name: String = row.get(0)?;
        let stored = ShotCounts {
            ftm: row.get(1)?,
            fta: row.get(2)?,
            fg2m: row.get(3)?,
            fg2a: row.get(4)?,
            fg3m: row.get(5)?,
            fg3a: row.get(6)?,
        };
        let summed = ShotCounts {
            ftm: row.get(7)?,
            fta: row.get(8)?,
            fg2m: row.get(9)?,
            fg2a: row.get(10)?,
            fg3m: row.get(11)?,
            fg3a: row.get(12)?,
        };
        Ok(compare_counts(None, &name, &summed, &stored))
    })?;

    let mut errors = Vec::new();
    for row in rows {
        errors.extend(row?);
    }
    Ok(errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAME: &str = "\
Home,Hawks
Visitor,Owls
Date,2024-01-05
Team,Jersey Number,Player Name,Fouls,QT1,QT2,QT3,QT4
Hawks,4,Ann Lee,2,22-,3/,,1x
Hawks,5,Cy Dee,1,-,,2
Owls,11,Bo Kim,3,33,2,,11
";

    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.conn()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    fn import(db: &Database, text: &str, options: ImportOptions) -> GameImportResult {
        let mapping = NotationMapping::default();
        StatsAggregator::new(db, &mapping).import_csv(text, options)
    }

    #[test]
    fn imports_rows_and_quarters() {
        let db = test_db();
        let result = import(&db, GAME, ImportOptions::default());
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.rows_processed, 3);
        // Ann: 4 present quarters; Cy: row ends after QT3; Bo: 4.
        assert_eq!(result.quarters_written, 11);
        assert!(result.game_id.is_some());

        assert_eq!(count(&db, "teams"), 2);
        assert_eq!(count(&db, "players"), 3);
        assert_eq!(count(&db, "player_game_stats"), 3);
        assert_eq!(count(&db, "player_quarter_stats"), 11);

        let (fouls, fg2m, fg2a, fg3m, fg3a, ftm, fta): (u32, u32, u32, u32, u32, u32, u32) = db
            .conn()
            .query_row(
                "SELECT s.fouls, s.fg2m, s.fg2a, s.fg3m, s.fg3a, s.ftm, s.fta
                 FROM player_game_stats s JOIN players p ON p.id = s.player_id
                 WHERE p.name = 'Ann Lee'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?, r.get(6)?)),
            )
            .unwrap();
        assert_eq!((fouls, fg2m, fg2a, fg3m, fg3a, ftm, fta), (2, 2, 3, 1, 2, 1, 2));
    }

    #[test]
    fn stored_totals_match_quarter_sums() {
        let db = test_db();
        let result = import(&db, GAME, ImportOptions::default());
        let game_id = result.game_id.unwrap();
        let errors = verify_game_integrity(&db.conn(), game_id).unwrap();
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn notation_errors_abort_before_writing() {
        let db = test_db();
        let text = GAME.replace("22-", "2?-").replace("33,2", "33,2z");
        let result = import(&db, &text, ImportOptions::default());
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].line, Some(5));
        assert!(result.errors[0].message.contains("'?'"));
        assert_eq!(result.errors[1].line, Some(7));
        assert_eq!(count(&db, "teams"), 0);
    }

    #[test]
    fn duplicate_policy_reject_skip_overwrite() {
        let db = test_db();
        let first = import(&db, GAME, ImportOptions::default());
        assert!(first.is_ok());

        let rejected = import(&db, GAME, ImportOptions::default());
        assert_eq!(rejected.errors.len(), 1);
        assert!(rejected.errors[0].message.contains("already stored"));

        let skipped = import(
            &db,
            GAME,
            ImportOptions {
                on_duplicate: DuplicatePolicy::Skip,
                dry_run: false,
            },
        );
        assert!(skipped.is_ok());
        assert!(skipped.skipped);
        assert_eq!(skipped.game_id, first.game_id);
        assert_eq!(count(&db, "player_game_stats"), 3);

        let corrected = GAME.replace("Owls,11,Bo Kim,3,33,2,,11", "Owls,11,Bo Kim,3,3,,,");
        let replaced = import(
            &db,
            &corrected,
            ImportOptions {
                on_duplicate: DuplicatePolicy::Overwrite,
                dry_run: false,
            },
        );
        assert!(replaced.is_ok(), "{:?}", replaced.errors);
        assert!(replaced.replaced);
        assert_eq!(replaced.game_id, first.game_id);
        assert_eq!(count(&db, "games"), 1);
        assert_eq!(count(&db, "player_game_stats"), 3);
        assert_eq!(count(&db, "player_quarter_stats"), 11);

        let bo_points: u32 = db
            .conn()
            .query_row(
                "SELECT s.ftm + 2 * s.fg2m + 3 * s.fg3m FROM player_game_stats s
                 JOIN players p ON p.id = s.player_id WHERE p.name = 'Bo Kim'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(bo_points, 3);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let db = test_db();
        let result = import(
            &db,
            GAME,
            ImportOptions {
                on_duplicate: DuplicatePolicy::Reject,
                dry_run: true,
            },
        );
        assert!(result.is_ok(), "{:?}", result.errors);
        assert!(result.dry_run);
        assert_eq!(result.rows_processed, 3);
        assert_eq!(result.quarters_written, 11);
        // Two teams, one game, three players.
        assert_eq!(result.changes.len(), 6);
        assert!(result.changes.iter().all(|c| c.id < 0));
        assert_eq!(count(&db, "teams"), 0);
        assert_eq!(count(&db, "player_quarter_stats"), 0);
    }

    #[test]
    fn compare_counts_reports_each_mismatch() {
        let quarters = ShotCounts {
            fg2m: 2,
            fg2a: 3,
            ..Default::default()
        };
        let total = ShotCounts {
            fg2m: 3,
            fg2a: 4,
            ..Default::default()
        };
        let errors = compare_counts(Some(9), "Ann Lee", &quarters, &total);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].kind, CountKind::Made);
        assert_eq!(errors[0].quarters, 2);
        assert_eq!(errors[0].total, 3);
        assert_eq!(errors[1].kind, CountKind::Attempted);
        assert!(compare_counts(None, "x", &total, &total).is_empty());
    }
}
