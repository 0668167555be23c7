// SQLite persistence layer for teams, players, games and shooting stats.

use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::debug;

/// Schema revision written to `PRAGMA user_version`. Databases stamped
/// with a newer revision are refused rather than silently misread.
pub const SCHEMA_VERSION: i64 = 1;

/// SQLite-backed store for league entities and box scores.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .context("failed to read schema version")?;
        if version > SCHEMA_VERSION {
            bail!(
                "database at {path} has schema version {version}, \
                 this build supports up to {SCHEMA_VERSION}"
            );
        }

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS teams (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                short_name   TEXT NOT NULL,
                name_key     TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS players (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                team_id    INTEGER NOT NULL REFERENCES teams(id),
                jersey     INTEGER NOT NULL CHECK (jersey >= 0),
                name       TEXT NOT NULL,
                name_key   TEXT NOT NULL,
                active     INTEGER NOT NULL DEFAULT 1,
                substitute INTEGER NOT NULL DEFAULT 0,
                UNIQUE(team_id, jersey),
                UNIQUE(team_id, name_key)
            );

            CREATE TABLE IF NOT EXISTS games (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                home_team_id INTEGER NOT NULL REFERENCES teams(id),
                away_team_id INTEGER NOT NULL REFERENCES teams(id),
                game_date    TEXT NOT NULL,
                CHECK (home_team_id <> away_team_id),
                UNIQUE(home_team_id, away_team_id, game_date)
            );

            CREATE TABLE IF NOT EXISTS player_game_stats (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                game_id   INTEGER NOT NULL REFERENCES games(id) ON DELETE CASCADE,
                player_id INTEGER NOT NULL REFERENCES players(id),
                fouls     INTEGER NOT NULL DEFAULT 0 CHECK (fouls >= 0),
                ftm       INTEGER NOT NULL DEFAULT 0,
                fta       INTEGER NOT NULL DEFAULT 0,
                fg2m      INTEGER NOT NULL DEFAULT 0,
                fg2a      INTEGER NOT NULL DEFAULT 0,
                fg3m      INTEGER NOT NULL DEFAULT 0,
                fg3a      INTEGER NOT NULL DEFAULT 0,
                CHECK (ftm <= fta AND fg2m <= fg2a AND fg3m <= fg3a),
                UNIQUE(game_id, player_id)
            );

            CREATE TABLE IF NOT EXISTS player_quarter_stats (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                game_stats_id  INTEGER NOT NULL REFERENCES player_game_stats(id) ON DELETE CASCADE,
                quarter        INTEGER NOT NULL CHECK (quarter BETWEEN 1 AND 4),
                ftm            INTEGER NOT NULL DEFAULT 0,
                fta            INTEGER NOT NULL DEFAULT 0,
                fg2m           INTEGER NOT NULL DEFAULT 0,
                fg2a           INTEGER NOT NULL DEFAULT 0,
                fg3m           INTEGER NOT NULL DEFAULT 0,
                fg3a           INTEGER NOT NULL DEFAULT 0,
                CHECK (ftm <= fta AND fg2m <= fg2a AND fg3m <= fg3a),
                UNIQUE(game_stats_id, quarter)
            );
            ",
        )
        .context("failed to create database schema")?;

        // Rollup queries filter by date range and player, neither of which
        // the unique indexes lead with.
        conn.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_games_date ON games(game_date);
             CREATE INDEX IF NOT EXISTS idx_game_stats_player ON player_game_stats(player_id);",
        )
        .context("failed to create lookup indexes")?;

        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))
            .context("failed to stamp schema version")?;

        debug!("database ready at {path} (schema v{SCHEMA_VERSION})");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Run `f` inside a single transaction. The transaction commits only
    /// when `f` returns `Ok`; any error (or panic) drops it, which rolls
    /// back every write `f` made.
    ///
    /// The write lock is taken at `BEGIN IMMEDIATE`, so writers on other
    /// connections queue behind `busy_timeout` and every lookup inside `f`
    /// sees their committed rows.
    pub fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        E: From<rusqlite::Error>,
        F: FnOnce(&Transaction<'_>) -> std::result::Result<T, E>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Read the schema revision stamped on this database.
    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.conn();
        let version = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .context("failed to read schema version")?;
        Ok(version)
    }
}

/// Storage format for game dates (ISO-8601, sorts lexically).
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Render a date the way the `games.game_date` column stores it.
pub fn date_to_sql(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a stored `game_date` value. `column` is the result-column index,
/// used only for the error report.
pub fn date_from_sql(value: &str, column: usize) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Returns `true` when `err` is SQLite reporting a UNIQUE (or PRIMARY KEY)
/// constraint violation.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.extended_code,
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::name_key;
    use rusqlite::params;

    /// Helper: create a fresh in-memory database for each test.
    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn insert_team_result(conn: &Connection, name: &str) -> rusqlite::Result<i64> {
        conn.query_row(
            "INSERT INTO teams (short_name, name_key, display_name) VALUES (?1, ?2, ?1) RETURNING id",
            params![name, name_key(name)],
            |row| row.get(0),
        )
    }

    fn insert_team(conn: &Connection, name: &str) -> i64 {
        insert_team_result(conn, name).unwrap()
    }

    // ------------------------------------------------------------------
    // Schema / open
    // ------------------------------------------------------------------

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "teams",
            "players",
            "games",
            "player_game_stats",
            "player_quarter_stats",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {table}");
        }
    }

    #[test]
    fn open_stamps_schema_version() {
        let db = test_db();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn reopen_file_database_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("league.db");
        let path = path.to_str().unwrap();

        {
            let db = Database::open(path).unwrap();
            insert_team(&db.conn(), "HAW");
        }
        let db = Database::open(path).expect("reopen should succeed");
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM teams", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn refuses_newer_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.db");
        let path = path.to_str().unwrap();
        {
            let conn = Connection::open(path).unwrap();
            conn.execute_batch("PRAGMA user_version = 99;").unwrap();
        }
        let err = Database::open(path).err().expect("newer schema must be refused");
        assert!(err.to_string().contains("schema version 99"));
    }

    // ------------------------------------------------------------------
    // Constraints
    // ------------------------------------------------------------------

    #[test]
    fn team_name_key_unique() {
        let db = test_db();
        let conn = db.conn();
        insert_team(&conn, "Harbor Hawks");
        let err = conn
            .execute(
                "INSERT INTO teams (short_name, name_key, display_name) VALUES (?1, ?2, ?1)",
                params!["harbor  HAWKS", name_key("harbor  HAWKS")],
            )
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn quarter_range_enforced() {
        let db = test_db();
        let conn = db.conn();
        let home = insert_team(&conn, "HAW");
        let away = insert_team(&conn, "OWL");
        conn.execute(
            "INSERT INTO players (team_id, jersey, name, name_key) VALUES (?1, 4, 'A', 'a')",
            params![home],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO games (home_team_id, away_team_id, game_date) VALUES (?1, ?2, '2024-01-05')",
            params![home, away],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO player_game_stats (game_id, player_id) VALUES (1, 1)",
            [],
        )
        .unwrap();

        let bad = conn.execute(
            "INSERT INTO player_quarter_stats (game_stats_id, quarter) VALUES (1, 5)",
            [],
        );
        assert!(bad.is_err());
        assert!(!is_unique_violation(&bad.unwrap_err()));
    }

    #[test]
    fn makes_cannot_exceed_attempts() {
        let db = test_db();
        let conn = db.conn();
        let home = insert_team(&conn, "HAW");
        let away = insert_team(&conn, "OWL");
        conn.execute(
            "INSERT INTO players (team_id, jersey, name, name_key) VALUES (?1, 4, 'A', 'a')",
            params![home],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO games (home_team_id, away_team_id, game_date) VALUES (?1, ?2, '2024-01-05')",
            params![home, away],
        )
        .unwrap();
        let bad = conn.execute(
            "INSERT INTO player_game_stats (game_id, player_id, ftm, fta) VALUES (1, 1, 3, 2)",
            [],
        );
        assert!(bad.is_err());
    }

    #[test]
    fn foreign_keys_enforced() {
        let db = test_db();
        let result = db.conn().execute(
            "INSERT INTO players (team_id, jersey, name, name_key) VALUES (9999, 1, 'X', 'x')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn dates_round_trip_through_storage_format() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let stored = date_to_sql(date);
        assert_eq!(stored, "2024-03-09");
        assert_eq!(date_from_sql(&stored, 0).unwrap(), date);
        assert!(date_from_sql("3/9/2024", 0).is_err());
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    #[test]
    fn transaction_commits_on_ok() {
        let db = test_db();
        db.transaction(|tx| -> rusqlite::Result<()> {
            insert_team(tx, "HAW");
            insert_team(tx, "OWL");
            Ok(())
        })
        .unwrap();

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM teams", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn transaction_rolls_back_on_err() {
        let db = test_db();
        let result = db.transaction(|tx| -> rusqlite::Result<()> {
            insert_team(tx, "HAW");
            Err(rusqlite::Error::QueryReturnedNoRows)
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM teams", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn transaction_holds_write_lock_from_begin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("league.db");
        let path = path.to_str().unwrap();
        let a = Database::open(path).unwrap();
        let b = Database::open(path).unwrap();
        b.conn()
            .busy_timeout(std::time::Duration::from_millis(50))
            .unwrap();

        // `a` has only read inside its transaction, yet `b` must already be
        // shut out of writing.
        a.transaction(|tx| -> rusqlite::Result<()> {
            let count: i64 = tx.query_row("SELECT COUNT(*) FROM teams", [], |row| row.get(0))?;
            assert_eq!(count, 0);

            let err = insert_team_result(&b.conn(), "OWL").unwrap_err();
            assert_eq!(
                err.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy)
            );
            insert_team(tx, "HAW");
            Ok(())
        })
        .unwrap();

        // Once `a` commits, `b` sees the row and can write again.
        let conn = b.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM teams", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        insert_team(&conn, "OWL");
    }
}
