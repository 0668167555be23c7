// Corrections to stored box scores.
//
// Quarter rows are the source of truth: every edit rewrites the affected
// quarter, recomputes the game totals from the quarter rows and re-checks
// integrity before committing. Re-importing a file never reaches this path.

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::info;

use boxscore_core::db::Database;
use boxscore_core::model::{ShotCategory, QUARTERS};

use crate::aggregator::verify_line_integrity;
use crate::error::{IntegrityError, ParseError};
use crate::notation::{self, NotationMapping, ShotCounts};

#[derive(Debug, Error)]
pub enum EditError {
    #[error("no box-score line with id {0}")]
    UnknownLine(i64),

    #[error("quarter must be between 1 and {}, got {}", QUARTERS, .0)]
    InvalidQuarter(u8),

    #[error("{0} makes exceed attempts")]
    MakesExceedAttempts(ShotCategory),

    #[error("invalid notation: {0}")]
    Notation(#[from] ParseError),

    #[error("{} integrity error(s) after edit", .0.len())]
    Integrity(Vec<IntegrityError>),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Replace (or create) one quarter of a box-score line and return the
/// recomputed game totals.
pub fn update_quarter(
    db: &Database,
    game_stats_id: i64,
    quarter: u8,
    counts: ShotCounts,
) -> Result<ShotCounts, EditError> {
    check_quarter(quarter)?;
    if let Some(category) = ShotCategory::ALL
        .into_iter()
        .find(|&c| counts.made(c) > counts.attempted(c))
    {
        return Err(EditError::MakesExceedAttempts(category));
    }

    let totals = db.transaction(|tx| {
        ensure_line(tx, game_stats_id)?;
        tx.execute(
            "INSERT INTO player_quarter_stats
                 (game_stats_id, quarter, ftm, fta, fg2m, fg2a, fg3m, fg3a)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(game_stats_id, quarter) DO UPDATE SET
                 ftm = excluded.ftm, fta = excluded.fta,
                 fg2m = excluded.fg2m, fg2a = excluded.fg2a,
                 fg3m = excluded.fg3m, fg3a = excluded.fg3a",
            params![
                game_stats_id,
                quarter,
                counts.ftm,
                counts.fta,
                counts.fg2m,
                counts.fg2a,
                counts.fg3m,
                counts.fg3a
            ],
        )?;
        recompute_totals(tx, game_stats_id)
    })?;

    info!("line {game_stats_id}: quarter {quarter} updated, {} points", totals.points());
    Ok(totals)
}

/// [`update_quarter`] with the new quarter given as notation.
pub fn update_quarter_notation(
    db: &Database,
    game_stats_id: i64,
    quarter: u8,
    notation: &str,
    mapping: &NotationMapping,
) -> Result<ShotCounts, EditError> {
    let counts = notation::parse(notation.trim(), mapping)?;
    update_quarter(db, game_stats_id, quarter, counts)
}

/// Remove a quarter row entirely (the quarter becomes absent, not zero).
pub fn clear_quarter(db: &Database, game_stats_id: i64, quarter: u8) -> Result<ShotCounts, EditError> {
    check_quarter(quarter)?;
    let totals = db.transaction(|tx| {
        ensure_line(tx, game_stats_id)?;
        tx.execute(
            "DELETE FROM player_quarter_stats WHERE game_stats_id = ?1 AND quarter = ?2",
            params![game_stats_id, quarter],
        )?;
        recompute_totals(tx, game_stats_id)
    })?;
    info!("line {game_stats_id}: quarter {quarter} cleared");
    Ok(totals)
}

pub fn set_fouls(db: &Database, game_stats_id: i64, fouls: u32) -> Result<(), EditError> {
    let changed = db.conn().execute(
        "UPDATE player_game_stats SET fouls = ?1 WHERE id = ?2",
        params![fouls, game_stats_id],
    )?;
    if changed == 0 {
        return Err(EditError::UnknownLine(game_stats_id));
    }
    info!("line {game_stats_id}: fouls set to {fouls}");
    Ok(())
}

fn check_quarter(quarter: u8) -> Result<(), EditError> {
    if (1..=QUARTERS).contains(&quarter) {
        Ok(())
    } else {
        Err(EditError::InvalidQuarter(quarter))
    }
}

fn ensure_line(conn: &Connection, game_stats_id: i64) -> Result<(), EditError> {
    conn.query_row(
        "SELECT 1 FROM player_game_stats WHERE id = ?1",
        params![game_stats_id],
        |_| Ok(()),
    )
    .optional()?
    .ok_or(EditError::UnknownLine(game_stats_id))
}

/// Rewrite the line's totals as the sum of its quarter rows, then verify.
fn recompute_totals(conn: &Connection, game_stats_id: i64) -> Result<ShotCounts, EditError> {
    conn.execute(
        "UPDATE player_game_stats SET
             ftm  = (SELECT COALESCE(SUM(ftm), 0)  FROM player_quarter_stats WHERE game_stats_id = ?1),
             fta  = (SELECT COALESCE(SUM(fta), 0)  FROM player_quarter_stats WHERE game_stats_id = ?1),
             fg2m = (SELECT COALESCE(SUM(fg2m), 0) FROM player_quarter_stats WHERE game_stats_id = ?1),
             fg2a = (SELECT COALESCE(SUM(fg2a), 0) FROM player_quarter_stats WHERE game_stats_id = ?1),
             fg3m = (SELECT COALESCE(SUM(fg3m), 0) FROM player_quarter_stats WHERE game_stats_id = ?1),
             fg3a = (SELECT COALESCE(SUM(fg3a), 0) FROM player_quarter_stats WHERE game_stats_id = ?1)
         WHERE id = ?1",
        params![game_stats_id],
    )?;

    let errors = verify_line_integrity(conn, game_stats_id)?;
    if !errors.is_empty() {
        return Err(EditError::Integrity(errors));
    }

    Ok(conn.query_row(
        "SELECT ftm, fta, fg2m, fg2a, fg3m, fg3a FROM player_game_stats WHERE id = ?1",
        params![game_stats_id],
        |row| {
            Ok(ShotCounts {
                ftm: row.get(0)?,
                fta: row.get(1)?,
                fg2m: row.get(2)?,
                fg2a: row.get(3)?,
                fg3m: row.get(4)?,
                fg3a: row.get(5)?,
            })
        },
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{ImportOptions, StatsAggregator};

    const GAME: &str = "\
Home,Hawks
Visitor,Owls
Date,2024-01-05
Team,Jersey Number,Player Name,Fouls,QT1,QT2,QT3,QT4
Hawks,4,Ann Lee,2,22-,3/,,1x
Owls,11,Bo Kim,3,33
";

    /// Import the sample game and return the db plus Ann Lee's line id.
    fn setup() -> (Database, i64) {
        let db = Database::open(":memory:").expect("in-memory database should open");
        let mapping = NotationMapping::default();
        let result = StatsAggregator::new(&db, &mapping).import_csv(GAME, ImportOptions::default());
        assert!(result.is_ok(), "{:?}", result.errors);
        let id = db
            .conn()
            .query_row(
                "SELECT s.id FROM player_game_stats s JOIN players p ON p.id = s.player_id
                 WHERE p.name = 'Ann Lee'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        (db, id)
    }

    #[test]
    fn update_quarter_recomputes_totals() {
        let (db, id) = setup();
        let mapping = NotationMapping::default();
        // QT1 was "22-" (4 pts); make it a single three.
        let totals = update_quarter_notation(&db, id, 1, "3", &mapping).unwrap();
        assert_eq!(totals.fg2m, 0);
        assert_eq!(totals.fg2a, 0);
        assert_eq!(totals.fg3m, 2);
        assert_eq!(totals.fg3a, 3);
        assert_eq!(totals.points(), 7);
        assert!(verify_line_integrity(&db.conn(), id).unwrap().is_empty());
    }

    #[test]
    fn update_absent_quarter_inserts_it() {
        let (db, _) = setup();
        let bo: i64 = db
            .conn()
            .query_row(
                "SELECT s.id FROM player_game_stats s JOIN players p ON p.id = s.player_id
                 WHERE p.name = 'Bo Kim'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        let counts = ShotCounts {
            ftm: 2,
            fta: 2,
            ..Default::default()
        };
        let totals = update_quarter(&db, bo, 4, counts).unwrap();
        assert_eq!(totals.points(), 8);
        let quarters: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM player_quarter_stats WHERE game_stats_id = ?1",
                [bo],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(quarters, 2);
    }

    #[test]
    fn clear_quarter_removes_row() {
        let (db, id) = setup();
        let totals = clear_quarter(&db, id, 4).unwrap();
        assert_eq!(totals.fta, 0);
        assert_eq!(totals.ftm, 0);
    }

    #[test]
    fn rejects_bad_input() {
        let (db, id) = setup();
        assert!(matches!(
            update_quarter(&db, id, 5, ShotCounts::default()),
            Err(EditError::InvalidQuarter(5))
        ));
        let bad = ShotCounts {
            fg3m: 2,
            fg3a: 1,
            ..Default::default()
        };
        assert!(matches!(
            update_quarter(&db, id, 1, bad),
            Err(EditError::MakesExceedAttempts(ShotCategory::Fg3))
        ));
        assert!(matches!(
            update_quarter(&db, 9999, 1, ShotCounts::default()),
            Err(EditError::UnknownLine(9999))
        ));
        let mapping = NotationMapping::default();
        assert!(matches!(
            update_quarter_notation(&db, id, 1, "2q", &mapping),
            Err(EditError::Notation(_))
        ));
    }

    #[test]
    fn set_fouls_updates_and_checks_line() {
        let (db, id) = setup();
        set_fouls(&db, id, 5).unwrap();
        let fouls: u32 = db
            .conn()
            .query_row("SELECT fouls FROM player_game_stats WHERE id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(fouls, 5);
        assert!(matches!(set_fouls(&db, 4242, 1), Err(EditError::UnknownLine(4242))));
    }
}
