// Persistent league entities and the shot categories they are counted in.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Number of scoring periods recorded per game.
pub const QUARTERS: u8 = 4;

/// The three shot categories tracked for every player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShotCategory {
    /// Free throw, worth one point.
    Ft,
    /// Two-point field goal.
    Fg2,
    /// Three-point field goal.
    Fg3,
}

impl ShotCategory {
    pub const ALL: [ShotCategory; 3] = [ShotCategory::Ft, ShotCategory::Fg2, ShotCategory::Fg3];

    /// Points awarded for a made shot in this category.
    pub fn point_value(self) -> u32 {
        match self {
            ShotCategory::Ft => 1,
            ShotCategory::Fg2 => 2,
            ShotCategory::Fg3 => 3,
        }
    }

    /// Short label used in reports and error messages.
    pub fn label(self) -> &'static str {
        match self {
            ShotCategory::Ft => "FT",
            ShotCategory::Fg2 => "2PT",
            ShotCategory::Fg3 => "3PT",
        }
    }
}

impl fmt::Display for ShotCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A team, identified by its unique short name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub short_name: String,
    pub display_name: String,
}

/// A rostered player. Unique per (team, jersey) and per (team, name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    pub team_id: i64,
    pub jersey: u32,
    pub name: String,
    pub active: bool,
    pub substitute: bool,
}

/// A single matchup on a given date. Unique per (home, away, date).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub date: NaiveDate,
}

/// Normalize a name for identity comparisons: trimmed, inner whitespace
/// collapsed, lowercased.
pub fn name_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_values() {
        assert_eq!(ShotCategory::Ft.point_value(), 1);
        assert_eq!(ShotCategory::Fg2.point_value(), 2);
        assert_eq!(ShotCategory::Fg3.point_value(), 3);
    }

    #[test]
    fn category_serde_is_lowercase() {
        let json = serde_json::to_string(&ShotCategory::Fg3).unwrap();
        assert_eq!(json, "\"fg3\"");
        let back: ShotCategory = serde_json::from_str("\"ft\"").unwrap();
        assert_eq!(back, ShotCategory::Ft);
    }

    #[test]
    fn name_key_ignores_case_and_spacing() {
        assert_eq!(name_key("  Jane   Doe "), "jane doe");
        assert_eq!(name_key("JANE DOE"), name_key("jane doe"));
    }
}
