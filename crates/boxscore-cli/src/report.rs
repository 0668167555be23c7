// Plain-text rendering of import results and rollups.

use boxscore_stats::metrics::ShootingSummary;
use boxscore_stats::resolver::ChangeAction;
use boxscore_stats::rollup::{GameLine, GameListing, LeaderEntry, PlayerRollup, RankMetric, TeamGameTotals};
use boxscore_stats::{GameImportResult, ImportIssue, ImportResult, ShotCounts};

pub fn pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}%", v * 100.0),
        None => "-".to_string(),
    }
}

fn ratio(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    }
}

fn issues(out: &mut String, errors: &[ImportIssue]) {
    for issue in errors {
        out.push_str(&format!("  error: {}\n", issue.message));
    }
}

pub fn roster_result(result: &ImportResult) -> String {
    let mut out = String::new();
    let prefix = if result.dry_run { "[dry run] " } else { "" };
    if result.is_ok() {
        out.push_str(&format!(
            "{prefix}roster: {} created, {} updated, {} unchanged\n",
            result.created, result.updated, result.reused
        ));
    } else {
        out.push_str(&format!("{prefix}roster rejected, nothing written:\n"));
        issues(&mut out, &result.errors);
    }
    out
}

pub fn game_result(file: &str, result: &GameImportResult) -> String {
    let mut out = String::new();
    let prefix = if result.dry_run { "[dry run] " } else { "" };
    let matchup = result
        .game
        .as_ref()
        .map(|g| format!("{} vs {} on {}", g.home, g.visitor, g.date))
        .unwrap_or_else(|| file.to_string());

    if !result.is_ok() {
        out.push_str(&format!("{prefix}{matchup}: rejected, nothing written\n"));
        issues(&mut out, &result.errors);
    } else if result.skipped {
        out.push_str(&format!("{prefix}{matchup}: already stored, skipped\n"));
    } else {
        let created = result
            .changes
            .iter()
            .filter(|c| c.action == ChangeAction::Created)
            .count();
        out.push_str(&format!(
            "{prefix}{matchup}: {} players, {} quarters, {} new entities{}\n",
            result.rows_processed,
            result.quarters_written,
            created,
            if result.replaced { " (replaced previous box score)" } else { "" }
        ));
    }
    out
}

fn shooting_lines(out: &mut String, counts: &ShotCounts, summary: &ShootingSummary) {
    out.push_str(&format!("  points   {}\n", summary.points));
    out.push_str(&format!(
        "  FG       {}/{} ({})\n",
        counts.fgm(),
        counts.fga(),
        pct(summary.fg_pct)
    ));
    out.push_str(&format!(
        "  2PT      {}/{} ({})\n",
        counts.fg2m,
        counts.fg2a,
        pct(summary.fg2_pct)
    ));
    out.push_str(&format!(
        "  3PT      {}/{} ({})\n",
        counts.fg3m,
        counts.fg3a,
        pct(summary.fg3_pct)
    ));
    out.push_str(&format!("  FT       {}/{} ({})\n", counts.ftm, counts.fta, pct(summary.ft_pct)));
    out.push_str(&format!("  eFG%     {}\n", pct(summary.efg_pct)));
    out.push_str(&format!("  TS%      {}\n", pct(summary.ts_pct)));
    out.push_str(&format!("  PPSA     {}\n", ratio(summary.ppsa)));
    let d = &summary.distribution;
    out.push_str(&format!(
        "  points from FT {} / 2PT {} / 3PT {}\n",
        pct(d.ft_pct),
        pct(d.fg2_pct),
        pct(d.fg3_pct)
    ));
}

pub fn player_rollup(rollup: &PlayerRollup) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "#{} {} ({}): {} games, {} fouls\n",
        rollup.player.jersey, rollup.player.name, rollup.team, rollup.games, rollup.fouls
    ));
    shooting_lines(&mut out, &rollup.counts, &rollup.summary);
    out
}

pub fn team_game(totals: &TeamGameTotals) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} in game {}: {} players, {} fouls\n",
        totals.team, totals.game_id, totals.players, totals.fouls
    ));
    shooting_lines(&mut out, &totals.counts, &totals.summary);
    out
}

pub fn game_list(games: &[GameListing]) -> String {
    let mut out = String::new();
    for g in games {
        out.push_str(&format!("{:>5}  {}  {} vs {}\n", g.id, g.date, g.home, g.visitor));
    }
    out
}

pub fn box_score(lines: &[GameLine]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<8} {:>3}  {:<24} {:>2}  {:>5}  {:>5}  {:>5}  {:>3}\n",
        "team", "#", "player", "PF", "2PT", "3PT", "FT", "PTS"
    ));
    for l in lines {
        let c = &l.counts;
        out.push_str(&format!(
            "{:<8} {:>3}  {:<24} {:>2}  {:>5}  {:>5}  {:>5}  {:>3}\n",
            l.team,
            l.jersey,
            l.name,
            l.fouls,
            format!("{}/{}", c.fg2m, c.fg2a),
            format!("{}/{}", c.fg3m, c.fg3a),
            format!("{}/{}", c.ftm, c.fta),
            l.points
        ));
    }
    out
}

pub fn leaderboard(metric: RankMetric, entries: &[LeaderEntry]) -> String {
    let mut out = String::new();
    if entries.is_empty() {
        out.push_str(&format!("no players qualify for {metric}\n"));
        return out;
    }
    for e in entries {
        let value = match metric {
            RankMetric::Points => format!("{}", e.value),
            RankMetric::Ppsa => ratio(Some(e.value)),
            _ => pct(Some(e.value)),
        };
        out.push_str(&format!(
            "{:>3}. {:<24} {:<8} #{:<3} {:>7}  ({} games)\n",
            e.rank, e.name, e.team, e.jersey, value, e.games
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentages_and_missing_values() {
        assert_eq!(pct(Some(0.725)), "72.5%");
        assert_eq!(pct(None), "-");
        assert_eq!(ratio(Some(1.0)), "1.00");
    }

    #[test]
    fn rejected_roster_lists_every_issue() {
        let result = ImportResult {
            errors: vec![
                ImportIssue {
                    line: Some(2),
                    message: "line 2: bad".into(),
                },
                ImportIssue {
                    line: Some(5),
                    message: "line 5: worse".into(),
                },
            ],
            ..Default::default()
        };
        let text = roster_result(&result);
        assert!(text.contains("nothing written"));
        assert!(text.contains("line 2: bad"));
        assert!(text.contains("line 5: worse"));
    }

    #[test]
    fn box_score_has_one_line_per_player() {
        let counts = ShotCounts {
            ftm: 1,
            fta: 2,
            fg2m: 2,
            fg2a: 3,
            fg3m: 1,
            fg3a: 2,
        };
        let lines = vec![GameLine {
            game_stats_id: 1,
            team: "Hawks".into(),
            jersey: 4,
            name: "Ann Lee".into(),
            fouls: 2,
            counts,
            points: counts.points(),
        }];
        let text = box_score(&lines);
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("team"));
        assert!(rows[1].contains("Ann Lee"));
        assert!(rows[1].contains("2/3"));
        assert!(rows[1].trim_end().ends_with('8'));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn empty_leaderboard_says_so() {
        assert!(leaderboard(RankMetric::FtPct, &[]).contains("no players qualify for ft"));
    }
}
