// Get-or-create resolution of teams, players and games.
//
// The resolver works on a borrowed connection (usually an open transaction)
// and never commits anything itself. In dry-run mode it reads the database
// but plans every insert or update instead of executing it, handing out
// negative provisional ids so later lookups in the same run see the planned
// entity.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::debug;

use boxscore_core::db::{date_from_sql, date_to_sql, is_unique_violation};
use boxscore_core::model::{name_key, Game, Player, Team};

use crate::error::{ConflictError, ResolveError};

/// Whether resolution writes to the database or only plans the writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    Apply,
    DryRun,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Team,
    Player,
    Game,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Created,
    Reused,
    Updated,
}

/// One entity touched during an import, for reporting. In a dry run
/// `Created` entries carry a negative provisional id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityChange {
    pub kind: EntityKind,
    pub action: ChangeAction,
    pub id: i64,
    pub label: String,
}

pub struct EntityResolver<'c> {
    conn: &'c Connection,
    mode: ResolveMode,
    changes: Vec<EntityChange>,
    planned_teams: Vec<Team>,
    planned_players: Vec<Player>,
    planned_games: Vec<Game>,
    last_provisional_id: i64,
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const TEAM_COLUMNS: &str = "id, short_name, display_name";
const PLAYER_COLUMNS: &str = "id, team_id, jersey, name, active, substitute";
const GAME_COLUMNS: &str = "id, home_team_id, away_team_id, game_date";

pub(crate) fn team_from_row(row: &Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        short_name: row.get(1)?,
        display_name: row.get(2)?,
    })
}

pub(crate) fn player_from_row(row: &Row<'_>) -> rusqlite::Result<Player> {
    Ok(Player {
        id: row.get(0)?,
        team_id: row.get(1)?,
        jersey: row.get(2)?,
        name: row.get(3)?,
        active: row.get(4)?,
        substitute: row.get(5)?,
    })
}

fn game_from_row(row: &Row<'_>) -> rusqlite::Result<Game> {
    let date: String = row.get(3)?;
    Ok(Game {
        id: row.get(0)?,
        home_team_id: row.get(1)?,
        away_team_id: row.get(2)?,
        date: date_from_sql(&date, 3)?,
    })
}

impl<'c> EntityResolver<'c> {
    pub fn new(conn: &'c Connection, mode: ResolveMode) -> Self {
        Self {
            conn,
            mode,
            changes: Vec::new(),
            planned_teams: Vec::new(),
            planned_players: Vec::new(),
            planned_games: Vec::new(),
            last_provisional_id: 0,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.mode == ResolveMode::DryRun
    }

    /// The connection resolution runs against.
    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    pub fn changes(&self) -> &[EntityChange] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<EntityChange> {
        self.changes
    }

    fn provisional_id(&mut self) -> i64 {
        self.last_provisional_id -= 1;
        self.last_provisional_id
    }

    /// Record what happened to an entity. Each entity is reported once per
    /// run; a later update upgrades an earlier `Reused` entry.
    fn record(&mut self, kind: EntityKind, action: ChangeAction, id: i64, label: String) {
        debug!(?kind, ?action, id, %label, "resolved entity");
        if let Some(existing) = self
            .changes
            .iter_mut()
            .find(|c| c.kind == kind && c.id == id)
        {
            if action == ChangeAction::Updated && existing.action == ChangeAction::Reused {
                existing.action = ChangeAction::Updated;
            }
            return;
        }
        self.changes.push(EntityChange {
            kind,
            action,
            id,
            label,
        });
    }

    // -----------------------------------------------------------------------
    // Teams
    // -----------------------------------------------------------------------

    /// Look up a team by short name, compared by [`name_key`], including
    /// teams planned earlier in a dry run.
    pub fn find_team(&self, short_name: &str) -> rusqlite::Result<Option<Team>> {
        let key = name_key(short_name);
        if let Some(team) = self
            .planned_teams
            .iter()
            .find(|t| name_key(&t.short_name) == key)
        {
            return Ok(Some(team.clone()));
        }
        self.conn
            .query_row(
                &format!("SELECT {TEAM_COLUMNS} FROM teams WHERE name_key = ?1"),
                params![key],
                team_from_row,
            )
            .optional()
    }

    /// Short name for `team_id`, used in conflict messages and labels.
    fn team_label(&self, team_id: i64) -> rusqlite::Result<String> {
        if let Some(team) = self.planned_teams.iter().find(|t| t.id == team_id) {
            return Ok(team.short_name.clone());
        }
        self.conn.query_row(
            "SELECT short_name FROM teams WHERE id = ?1",
            params![team_id],
            |row| row.get(0),
        )
    }

    pub fn get_or_create_team(&mut self, short_name: &str) -> rusqlite::Result<Team> {
        self.ensure_team(short_name, None)
    }

    /// Get or create a team. When `display_name` is given and differs from
    /// the stored one, the stored name is updated.
    pub fn ensure_team(
        &mut self,
        short_name: &str,
        display_name: Option<&str>,
    ) -> rusqlite::Result<Team> {
        let short_name = short_name.trim();
        let display_name = display_name.map(str::trim).filter(|d| !d.is_empty());

        let mut retried = false;
        loop {
            if let Some(mut team) = self.find_team(short_name)? {
                let action = match display_name {
                    Some(display) if display != team.display_name => {
                        self.rename_team(&team, display)?;
                        team.display_name = display.to_string();
                        ChangeAction::Updated
                    }
                    _ => ChangeAction::Reused,
                };
                self.record(EntityKind::Team, action, team.id, team.short_name.clone());
                return Ok(team);
            }

            let display = display_name.unwrap_or(short_name).to_string();
            if self.is_dry_run() {
                let team = Team {
                    id: self.provisional_id(),
                    short_name: short_name.to_string(),
                    display_name: display,
                };
                self.planned_teams.push(team.clone());
                self.record(EntityKind::Team, ChangeAction::Created, team.id, team.short_name.clone());
                return Ok(team);
            }

            let inserted = self.conn.query_row(
                &format!(
                    "INSERT INTO teams (short_name, name_key, display_name) VALUES (?1, ?2, ?3) \
                     RETURNING {TEAM_COLUMNS}"
                ),
                params![short_name, name_key(short_name), display],
                team_from_row,
            );
            match inserted {
                Ok(team) => {
                    self.record(EntityKind::Team, ChangeAction::Created, team.id, team.short_name.clone());
                    return Ok(team);
                }
                // Someone else inserted it between our lookup and insert.
                Err(e) if is_unique_violation(&e) && !retried => retried = true,
                Err(e) => return Err(e),
            }
        }
    }

    fn rename_team(&mut self, team: &Team, display: &str) -> rusqlite::Result<()> {
        if let Some(planned) = self.planned_teams.iter_mut().find(|t| t.id == team.id) {
            planned.display_name = display.to_string();
        } else if !self.is_dry_run() {
            self.conn.execute(
                "UPDATE teams SET display_name = ?1 WHERE id = ?2",
                params![display, team.id],
            )?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Players
    // -----------------------------------------------------------------------

    fn find_player_by_jersey(&self, team_id: i64, jersey: u32) -> rusqlite::Result<Option<Player>> {
        if let Some(player) = self
            .planned_players
            .iter()
            .find(|p| p.team_id == team_id && p.jersey == jersey)
        {
            return Ok(Some(player.clone()));
        }
        self.conn
            .query_row(
                &format!("SELECT {PLAYER_COLUMNS} FROM players WHERE team_id = ?1 AND jersey = ?2"),
                params![team_id, jersey],
                player_from_row,
            )
            .optional()
    }

    fn find_player_by_name(&self, team_id: i64, key: &str) -> rusqlite::Result<Option<Player>> {
        if let Some(player) = self
            .planned_players
            .iter()
            .find(|p| p.team_id == team_id && name_key(&p.name) == key)
        {
            return Ok(Some(player.clone()));
        }
        self.conn
            .query_row(
                &format!("SELECT {PLAYER_COLUMNS} FROM players WHERE team_id = ?1 AND name_key = ?2"),
                params![team_id, key],
                player_from_row,
            )
            .optional()
    }

    /// Get or create the player wearing `jersey` for `team_id`.
    ///
    /// The same name on the same jersey is the same player. A jersey held by
    /// someone else, or a name already registered under another jersey, is a
    /// conflict the caller has to settle.
    pub fn get_or_create_player(
        &mut self,
        team_id: i64,
        jersey: u32,
        name: &str,
    ) -> Result<Player, ResolveError> {
        let (player, action) = self.resolve_player(team_id, jersey, name, true, false)?;
        self.record(EntityKind::Player, action, player.id, player_label(&player));
        Ok(player)
    }

    /// Roster variant of [`get_or_create_player`](Self::get_or_create_player):
    /// new players get the given flags, existing players are updated to them.
    pub fn sync_player(
        &mut self,
        team_id: i64,
        jersey: u32,
        name: &str,
        active: bool,
        substitute: bool,
    ) -> Result<Player, ResolveError> {
        let (player, action) = self.resolve_player(team_id, jersey, name, active, substitute)?;
        self.record(EntityKind::Player, action, player.id, player_label(&player));
        if action == ChangeAction::Created {
            return Ok(player);
        }
        Ok(self.update_player_flags(&player, active, substitute)?)
    }

    /// Set a player's roster flags. Records `Updated` only when a flag
    /// actually changes.
    pub fn update_player_flags(
        &mut self,
        player: &Player,
        active: bool,
        substitute: bool,
    ) -> rusqlite::Result<Player> {
        if player.active == active && player.substitute == substitute {
            return Ok(player.clone());
        }

        if let Some(planned) = self.planned_players.iter_mut().find(|p| p.id == player.id) {
            planned.active = active;
            planned.substitute = substitute;
        } else if !self.is_dry_run() {
            self.conn.execute(
                "UPDATE players SET active = ?1, substitute = ?2 WHERE id = ?3",
                params![active, substitute, player.id],
            )?;
        }

        let updated = Player {
            active,
            substitute,
            ..player.clone()
        };
        self.record(EntityKind::Player, ChangeAction::Updated, updated.id, player_label(&updated));
        Ok(updated)
    }

    fn resolve_player(
        &mut self,
        team_id: i64,
        jersey: u32,
        name: &str,
        active: bool,
        substitute: bool,
    ) -> Result<(Player, ChangeAction), ResolveError> {
        let name = name.trim();
        let key = name_key(name);

        let mut retried = false;
        loop {
            if let Some(existing) = self.find_player_by_jersey(team_id, jersey)? {
                if name_key(&existing.name) == key {
                    return Ok((existing, ChangeAction::Reused));
                }
                return Err(ConflictError::JerseyTaken {
                    team: self.team_label(team_id)?,
                    jersey,
                    existing: existing.name,
                    incoming: name.to_string(),
                }
                .into());
            }

            if let Some(existing) = self.find_player_by_name(team_id, &key)? {
                return Err(ConflictError::NameTaken {
                    team: self.team_label(team_id)?,
                    name: name.to_string(),
                    existing_jersey: existing.jersey,
                    incoming_jersey: jersey,
                }
                .into());
            }

            if self.is_dry_run() {
                let player = Player {
                    id: self.provisional_id(),
                    team_id,
                    jersey,
                    name: name.to_string(),
                    active,
                    substitute,
                };
                self.planned_players.push(player.clone());
                return Ok((player, ChangeAction::Created));
            }

            let inserted = self.conn.query_row(
                &format!(
                    "INSERT INTO players (team_id, jersey, name, name_key, active, substitute) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING {PLAYER_COLUMNS}"
                ),
                params![team_id, jersey, name, key, active, substitute],
                player_from_row,
            );
            match inserted {
                Ok(player) => return Ok((player, ChangeAction::Created)),
                // Lost a race; the re-fetch decides between reuse and conflict.
                Err(e) if is_unique_violation(&e) && !retried => retried = true,
                Err(e) => return Err(e.into()),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Games
    // -----------------------------------------------------------------------

    pub fn find_game(
        &self,
        date: NaiveDate,
        home_team_id: i64,
        away_team_id: i64,
    ) -> rusqlite::Result<Option<Game>> {
        if let Some(game) = self.planned_games.iter().find(|g| {
            g.date == date && g.home_team_id == home_team_id && g.away_team_id == away_team_id
        }) {
            return Ok(Some(game.clone()));
        }
        self.conn
            .query_row(
                &format!(
                    "SELECT {GAME_COLUMNS} FROM games \
                     WHERE home_team_id = ?1 AND away_team_id = ?2 AND game_date = ?3"
                ),
                params![home_team_id, away_team_id, date_to_sql(date)],
                game_from_row,
            )
            .optional()
    }

    pub fn get_or_create_game(
        &mut self,
        date: NaiveDate,
        home_team_id: i64,
        away_team_id: i64,
    ) -> rusqlite::Result<Game> {
        let mut retried = false;
        loop {
            if let Some(game) = self.find_game(date, home_team_id, away_team_id)? {
                let label = self.game_label(&game)?;
                self.record(EntityKind::Game, ChangeAction::Reused, game.id, label);
                return Ok(game);
            }

            if self.is_dry_run() {
                let game = Game {
                    id: self.provisional_id(),
                    home_team_id,
                    away_team_id,
                    date,
                };
                self.planned_games.push(game.clone());
                let label = self.game_label(&game)?;
                self.record(EntityKind::Game, ChangeAction::Created, game.id, label);
                return Ok(game);
            }

            let inserted = self.conn.query_row(
                &format!(
                    "INSERT INTO games (home_team_id, away_team_id, game_date) \
                     VALUES (?1, ?2, ?3) RETURNING {GAME_COLUMNS}"
                ),
                params![home_team_id, away_team_id, date_to_sql(date)],
                game_from_row,
            );
            match inserted {
                Ok(game) => {
                    let label = self.game_label(&game)?;
                    self.record(EntityKind::Game, ChangeAction::Created, game.id, label);
                    return Ok(game);
                }
                Err(e) if is_unique_violation(&e) && !retried => retried = true,
                Err(e) => return Err(e),
            }
        }
    }

    fn game_label(&self, game: &Game) -> rusqlite::Result<String> {
        Ok(format!(
            "{} vs {} on {}",
            self.team_label(game.home_team_id)?,
            self.team_label(game.away_team_id)?,
            game.date
        ))
    }
}

fn player_label(player: &Player) -> String {
    format!("#{} {}", player.jersey, player.name)
}
