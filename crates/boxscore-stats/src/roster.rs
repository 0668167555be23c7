// Roster import: register teams and players ahead of their first box score.

use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use boxscore_core::db::Database;

use crate::error::{ImportError, ImportIssue, ResolveError, RowConflict};
use crate::resolver::{ChangeAction, EntityChange, EntityResolver, ResolveMode};
use crate::validate::{validate_roster, RosterRow};

/// Outcome of a roster import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportResult {
    pub created: usize,
    pub updated: usize,
    pub reused: usize,
    pub dry_run: bool,
    pub changes: Vec<EntityChange>,
    pub errors: Vec<ImportIssue>,
}

impl ImportResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    fn from_changes(changes: Vec<EntityChange>, dry_run: bool) -> Self {
        let tally = |action| changes.iter().filter(|c| c.action == action).count();
        Self {
            created: tally(ChangeAction::Created),
            updated: tally(ChangeAction::Updated),
            reused: tally(ChangeAction::Reused),
            dry_run,
            changes,
            errors: Vec::new(),
        }
    }

    fn failed(error: &ImportError, dry_run: bool) -> Self {
        Self {
            dry_run,
            errors: error.issues(),
            ..Default::default()
        }
    }
}

/// Validate and import a roster file. Any validation error or conflict
/// leaves the database untouched.
pub fn import_roster(db: &Database, text: &str, dry_run: bool) -> ImportResult {
    let rows = match validate_roster(text) {
        Ok(rows) => rows,
        Err(errors) => {
            let error = ImportError::Validation(errors);
            warn!("roster rejected: {error}");
            return ImportResult::failed(&error, dry_run);
        }
    };

    match apply_roster(db, &rows, dry_run) {
        Ok(changes) => {
            let result = ImportResult::from_changes(changes, dry_run);
            info!(
                "{} roster: {} created, {} updated, {} unchanged",
                if dry_run { "planned" } else { "imported" },
                result.created,
                result.updated,
                result.reused
            );
            result
        }
        Err(error) => {
            warn!("roster rejected: {error}");
            ImportResult::failed(&error, dry_run)
        }
    }
}

/// Resolve every roster row in one transaction (or against a read-only
/// view in a dry run).
pub fn apply_roster(
    db: &Database,
    rows: &[RosterRow],
    dry_run: bool,
) -> Result<Vec<EntityChange>, ImportError> {
    if dry_run {
        let conn = db.conn();
        resolve_rows(&conn, rows, ResolveMode::DryRun)
    } else {
        db.transaction(|tx| resolve_rows(tx, rows, ResolveMode::Apply))
    }
}

fn resolve_rows(
    conn: &Connection,
    rows: &[RosterRow],
    mode: ResolveMode,
) -> Result<Vec<EntityChange>, ImportError> {
    let mut resolver = EntityResolver::new(conn, mode);
    let mut conflicts = Vec::new();

    for row in rows {
        let team = resolver.ensure_team(&row.team, row.team_display_name.as_deref())?;
        match resolver.sync_player(team.id, row.jersey, &row.name, row.active, row.substitute) {
            Ok(_) => {}
            Err(ResolveError::Conflict(source)) => conflicts.push(RowConflict {
                line: row.line,
                source,
            }),
            Err(ResolveError::Database(e)) => return Err(e.into()),
        }
    }

    if !conflicts.is_empty() {
        return Err(ImportError::Conflict(conflicts));
    }
    Ok(resolver.into_changes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER: &str = "\
Team,Team Name,Jersey Number,Player Name,Active,Substitute
HAW,Harbor Hawks,4,Ann Lee,yes,no
HAW,Harbor Hawks,5,Cy Dee,yes,yes
OWL,Night Owls,11,Bo Kim,,
";

    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.conn()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn first_import_creates_everything() {
        let db = test_db();
        let result = import_roster(&db, ROSTER, false);
        assert!(result.is_ok(), "{:?}", result.errors);
        // Two teams and three players.
        assert_eq!(result.created, 5);
        assert_eq!(result.updated, 0);
        assert_eq!(count(&db, "teams"), 2);
        assert_eq!(count(&db, "players"), 3);

        let substitute: bool = db
            .conn()
            .query_row("SELECT substitute FROM players WHERE name = 'Cy Dee'", [], |r| r.get(0))
            .unwrap();
        assert!(substitute);
    }

    #[test]
    fn reimport_is_idempotent_and_updates_flags() {
        let db = test_db();
        import_roster(&db, ROSTER, false);

        let again = import_roster(&db, ROSTER, false);
        assert_eq!(again.created, 0);
        assert_eq!(again.updated, 0);
        assert_eq!(again.reused, 5);

        let benched = ROSTER.replace("5,Cy Dee,yes,yes", "5,Cy Dee,no,yes");
        let result = import_roster(&db, &benched, false);
        assert_eq!(result.updated, 1);
        assert_eq!(count(&db, "players"), 3);
    }

    #[test]
    fn conflicts_roll_back_the_whole_file() {
        let db = test_db();
        import_roster(&db, ROSTER, false);

        let text = "\
Team,Jersey Number,Player Name
HAW,9,Dee Fox
HAW,4,Eve Gray
OWL,12,bo kim
";
        let result = import_roster(&db, text, false);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].line, Some(3));
        assert!(result.errors[0].message.contains("Ann Lee"));
        assert_eq!(result.errors[1].line, Some(4));
        // Dee Fox on line 2 was fine but nothing is kept.
        assert_eq!(count(&db, "players"), 3);
    }

    #[test]
    fn dry_run_counts_without_writing() {
        let db = test_db();
        let result = import_roster(&db, ROSTER, true);
        assert!(result.dry_run);
        assert_eq!(result.created, 5);
        assert_eq!(count(&db, "teams"), 0);
    }

    #[test]
    fn validation_errors_are_reported() {
        let db = test_db();
        let result = import_roster(&db, "Team,Player Name\nHAW,Ann Lee\n", false);
        assert!(!result.is_ok());
        assert!(result.errors[0].message.contains("Jersey Number"));
    }
}
