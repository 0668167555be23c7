// Read-side queries: career and date-range totals, per-game lines and
// leaderboards.
//
// Everything here sums raw counts in SQL and derives rates afterwards via
// `ShotCounts::summary`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use boxscore_core::db::{date_from_sql, date_to_sql, Database};
use boxscore_core::model::{name_key, Player, Team};

use crate::metrics::ShootingSummary;
use crate::notation::ShotCounts;
use crate::resolver::{player_from_row, team_from_row};

/// Which games a rollup covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Career,
    /// Inclusive on both ends.
    Between { from: NaiveDate, to: NaiveDate },
}

impl Scope {
    /// Build a scope from optional bounds; an open end is unbounded.
    pub fn from_bounds(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        match (from, to) {
            (None, None) => Scope::Career,
            (from, to) => Scope::Between {
                from: from.unwrap_or(NaiveDate::MIN),
                to: to.unwrap_or(NaiveDate::MAX),
            },
        }
    }

    /// SQL parameters for `(?N IS NULL OR g.game_date >= ?N)` style filters.
    /// The open ends produced by [`Scope::from_bounds`] become NULL.
    fn sql_bounds(&self) -> (Option<String>, Option<String>) {
        match *self {
            Scope::Career => (None, None),
            Scope::Between { from, to } => (
                (from != NaiveDate::MIN).then(|| date_to_sql(from)),
                (to != NaiveDate::MAX).then(|| date_to_sql(to)),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Summed stats for one player over a scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerRollup {
    pub player: Player,
    pub team: String,
    pub games: u32,
    pub fouls: u32,
    pub counts: ShotCounts,
    pub summary: ShootingSummary,
}

/// Summed stats for one team in one game.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamGameTotals {
    pub game_id: i64,
    pub team: String,
    pub players: u32,
    pub fouls: u32,
    pub counts: ShotCounts,
    pub summary: ShootingSummary,
}

/// One player's line in a stored box score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameLine {
    pub game_stats_id: i64,
    pub team: String,
    pub jersey: u32,
    pub name: String,
    pub fouls: u32,
    pub counts: ShotCounts,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameListing {
    pub id: i64,
    pub date: NaiveDate,
    pub home: String,
    pub visitor: String,
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

pub fn find_team(db: &Database, short_name: &str) -> rusqlite::Result<Option<Team>> {
    db.conn()
        .query_row(
            "SELECT id, short_name, display_name FROM teams WHERE name_key = ?1",
            params![name_key(short_name)],
            team_from_row,
        )
        .optional()
}

pub fn find_player(db: &Database, team_id: i64, jersey: u32) -> rusqlite::Result<Option<Player>> {
    db.conn()
        .query_row(
            "SELECT id, team_id, jersey, name, active, substitute FROM players
             WHERE team_id = ?1 AND jersey = ?2",
            params![team_id, jersey],
            player_from_row,
        )
        .optional()
}

/// Stored games within `scope`, oldest first.
pub fn list_games(db: &Database, scope: Scope) -> rusqlite::Result<Vec<GameListing>> {
    let (from, to) = scope.sql_bounds();
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT g.id, g.game_date, h.short_name, a.short_name
         FROM games g
         JOIN teams h ON h.id = g.home_team_id
         JOIN teams a ON a.id = g.away_team_id
         WHERE (?1 IS NULL OR g.game_date >= ?1) AND (?2 IS NULL OR g.game_date <= ?2)
         ORDER BY g.game_date, g.id",
    )?;
    let rows = stmt.query_map(params![from, to], |row| {
        let date: String = row.get(1)?;
        Ok(GameListing {
            id: row.get(0)?,
            date: date_from_sql(&date, 1)?,
            home: row.get(2)?,
            visitor: row.get(3)?,
        })
    })?;
    rows.collect()
}

// ---------------------------------------------------------------------------
// Rollups
// ---------------------------------------------------------------------------

/// Read six summed count columns starting at `start`.
fn counts_at(row: &Row<'_>, start: usize) -> rusqlite::Result<ShotCounts> {
    Ok(ShotCounts {
        ftm: row.get(start)?,
        fta: row.get(start + 1)?,
        fg2m: row.get(start + 2)?,
        fg2a: row.get(start + 3)?,
        fg3m: row.get(start + 4)?,
        fg3a: row.get(start + 5)?,
    })
}

const SUMMED_COUNTS: &str = "COALESCE(SUM(s.ftm), 0), COALESCE(SUM(s.fta), 0),
     COALESCE(SUM(s.fg2m), 0), COALESCE(SUM(s.fg2a), 0),
     COALESCE(SUM(s.fg3m), 0), COALESCE(SUM(s.fg3a), 0)";

/// Totals for one player over `scope`. `None` when the player does not exist.
pub fn player_totals(
    db: &Database,
    player_id: i64,
    scope: Scope,
) -> rusqlite::Result<Option<PlayerRollup>> {
    let conn = db.conn();
    let Some((player, team)) = conn
        .query_row(
            "SELECT p.id, p.team_id, p.jersey, p.name, p.active, p.substitute, t.short_name
             FROM players p JOIN teams t ON t.id = p.team_id
             WHERE p.id = ?1",
            params![player_id],
            |row| Ok((player_from_row(row)?, row.get::<_, String>(6)?)),
        )
        .optional()?
    else {
        return Ok(None);
    };

    let (from, to) = scope.sql_bounds();
    let (games, fouls, counts): (u32, u32, ShotCounts) = conn.query_row(
        &format!(
            "SELECT COUNT(s.id), COALESCE(SUM(s.fouls), 0), {SUMMED_COUNTS}
             FROM player_game_stats s
             JOIN games g ON g.id = s.game_id
             WHERE s.player_id = ?1
               AND (?2 IS NULL OR g.game_date >= ?2)
               AND (?3 IS NULL OR g.game_date <= ?3)"
        ),
        params![player_id, from, to],
        |row| Ok((row.get(0)?, row.get(1)?, counts_at(row, 2)?)),
    )?;

    Ok(Some(PlayerRollup {
        player,
        team,
        games,
        fouls,
        counts,
        summary: counts.summary(),
    }))
}

/// Summed stats for every player of `team_id` in `game_id`.
pub fn team_game_totals(db: &Database, game_id: i64, team_id: i64) -> rusqlite::Result<TeamGameTotals> {
    let conn = db.conn();
    let team: String = conn.query_row(
        "SELECT short_name FROM teams WHERE id = ?1",
        params![team_id],
        |row| row.get(0),
    )?;
    let (players, fouls, counts): (u32, u32, ShotCounts) = conn.query_row(
        &format!(
            "SELECT COUNT(s.id), COALESCE(SUM(s.fouls), 0), {SUMMED_COUNTS}
             FROM player_game_stats s
             JOIN players p ON p.id = s.player_id
             WHERE s.game_id = ?1 AND p.team_id = ?2"
        ),
        params![game_id, team_id],
        |row| Ok((row.get(0)?, row.get(1)?, counts_at(row, 2)?)),
    )?;

    Ok(TeamGameTotals {
        game_id,
        team,
        players,
        fouls,
        counts,
        summary: counts.summary(),
    })
}

/// Every stored player line for `game_id`, ordered by team then jersey.
pub fn player_game_lines(db: &Database, game_id: i64) -> rusqlite::Result<Vec<GameLine>> {
    let conn = db.conn();
    let mut stmt = conn.prepare(
        "SELECT s.id, t.short_name, p.jersey, p.name, s.fouls,
                s.ftm, s.fta, s.fg2m, s.fg2a, s.fg3m, s.fg3a
         FROM player_game_stats s
         JOIN players p ON p.id = s.player_id
         JOIN teams t ON t.id = p.team_id
         WHERE s.game_id = ?1
         ORDER BY t.short_name, p.jersey",
    )?;
    let rows = stmt.query_map(params![game_id], |row| {
        let counts = counts_at(row, 5)?;
        Ok(GameLine {
            game_stats_id: row.get(0)?,
            team: row.get(1)?,
            jersey: row.get(2)?,
            name: row.get(3)?,
            fouls: row.get(4)?,
            counts,
            points: counts.points(),
        })
    })?;
    rows.collect()
}

// ---------------------------------------------------------------------------
// Leaders
// ---------------------------------------------------------------------------

/// Stat a leaderboard can be ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RankMetric {
    Points,
    FgPct,
    Fg3Pct,
    FtPct,
    EfgPct,
    TsPct,
    Ppsa,
}

impl RankMetric {
    pub const ALL: [RankMetric; 7] = [
        RankMetric::Points,
        RankMetric::FgPct,
        RankMetric::Fg3Pct,
        RankMetric::FtPct,
        RankMetric::EfgPct,
        RankMetric::TsPct,
        RankMetric::Ppsa,
    ];

    pub fn label(self) -> &'static str {
        match self {
            RankMetric::Points => "points",
            RankMetric::FgPct => "fg",
            RankMetric::Fg3Pct => "fg3",
            RankMetric::FtPct => "ft",
            RankMetric::EfgPct => "efg",
            RankMetric::TsPct => "ts",
            RankMetric::Ppsa => "ppsa",
        }
    }

    /// The metric's value for `counts`, `None` when undefined.
    pub fn value(self, counts: &ShotCounts) -> Option<f64> {
        let summary = counts.summary();
        match self {
            RankMetric::Points => Some(f64::from(summary.points)),
            RankMetric::FgPct => summary.fg_pct,
            RankMetric::Fg3Pct => summary.fg3_pct,
            RankMetric::FtPct => summary.ft_pct,
            RankMetric::EfgPct => summary.efg_pct,
            RankMetric::TsPct => summary.ts_pct,
            RankMetric::Ppsa => summary.ppsa,
        }
    }

    /// Attempts in the metric's denominator, compared against the
    /// leaderboard's minimum. Points has no denominator.
    pub fn attempts(self, counts: &ShotCounts) -> Option<u32> {
        match self {
            RankMetric::Points => None,
            RankMetric::FgPct | RankMetric::EfgPct => Some(counts.fga()),
            RankMetric::Fg3Pct => Some(counts.fg3a),
            RankMetric::FtPct => Some(counts.fta),
            RankMetric::TsPct | RankMetric::Ppsa => Some(counts.fga() + counts.fta),
        }
    }
}

impl fmt::Display for RankMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RankMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        let key = key.trim_end_matches('%').trim_end_matches("_pct").trim_end_matches("pct");
        match key {
            "points" | "pts" => Ok(RankMetric::Points),
            "fg" => Ok(RankMetric::FgPct),
            "fg3" | "3p" | "3pt" => Ok(RankMetric::Fg3Pct),
            "ft" => Ok(RankMetric::FtPct),
            "efg" => Ok(RankMetric::EfgPct),
            "ts" => Ok(RankMetric::TsPct),
            "ppsa" => Ok(RankMetric::Ppsa),
            _ => {
                let known: Vec<&str> = RankMetric::ALL.iter().map(|m| m.label()).collect();
                Err(format!("unknown metric {s:?} (expected one of {})", known.join(", ")))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderEntry {
    pub rank: usize,
    pub player_id: i64,
    pub name: String,
    pub team: String,
    pub jersey: u32,
    pub games: u32,
    pub value: f64,
    pub counts: ShotCounts,
}

/// Rank players by `metric` over `scope`. Players below `min_attempts` in
/// the metric's denominator, or with an undefined value, are left out.
/// Ties are broken by name.
pub fn leaders(
    db: &Database,
    metric: RankMetric,
    scope: Scope,
    min_attempts: u32,
    limit: usize,
) -> rusqlite::Result<Vec<LeaderEntry>> {
    let (from, to) = scope.sql_bounds();
    let conn = db.conn();
    let mut stmt = conn.prepare(&format!(
        "SELECT p.id, p.name, t.short_name, p.jersey, COUNT(s.id), {SUMMED_COUNTS}
         FROM player_game_stats s
         JOIN games g ON g.id = s.game_id
         JOIN players p ON p.id = s.player_id
         JOIN teams t ON t.id = p.team_id
         WHERE (?1 IS NULL OR g.game_date >= ?1) AND (?2 IS NULL OR g.game_date <= ?2)
         GROUP BY p.id"
    ))?;
    let rows = stmt.query_map(params![from, to], |row| {
        Ok(LeaderEntry {
            rank: 0,
            player_id: row.get(0)?,
            name: row.get(1)?,
            team: row.get(2)?,
            jersey: row.get(3)?,
            games: row.get(4)?,
            value: 0.0,
            counts: counts_at(row, 5)?,
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let mut entry = row?;
        if metric
            .attempts(&entry.counts)
            .is_some_and(|attempts| attempts < min_attempts)
        {
            continue;
        }
        let Some(value) = metric.value(&entry.counts) else {
            continue;
        };
        entry.value = value;
        entries.push(entry);
    }

    entries.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    entries.truncate(limit);
    for (idx, entry) in entries.iter_mut().enumerate() {
        entry.rank = idx + 1;
    }
    Ok(entries)
}
