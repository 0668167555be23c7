// Shooting metrics derived from raw makes and attempts.
//
// Every function here takes counts, never percentages. Season and career
// figures are computed by summing `ShotCounts` first and applying these
// formulas once to the sums; averaging per-game percentages would weight a
// 1-for-1 night the same as a 10-for-20 one.

use serde::Serialize;

use boxscore_core::model::ShotCategory;

use crate::notation::ShotCounts;

/// Free-throw attempt weight in the true-shooting denominator.
const TS_FTA_WEIGHT: f64 = 0.44;

/// `makes / attempts`, or `None` when there were no attempts.
pub fn percentage(makes: u32, attempts: u32) -> Option<f64> {
    if attempts == 0 {
        return None;
    }
    Some(f64::from(makes) / f64::from(attempts))
}

/// Points scored from made shots.
pub fn points(ftm: u32, fg2m: u32, fg3m: u32) -> u32 {
    ftm * ShotCategory::Ft.point_value()
        + fg2m * ShotCategory::Fg2.point_value()
        + fg3m * ShotCategory::Fg3.point_value()
}

/// Effective field-goal percentage: `(FGM + 0.5 * 3PM) / FGA`.
///
/// `total_fgm` already includes the threes; the extra half credits each one
/// for being worth 1.5 twos.
pub fn effective_fg_pct(total_fgm: u32, fg3m: u32, total_fga: u32) -> Option<f64> {
    if total_fga == 0 {
        return None;
    }
    Some((f64::from(total_fgm) + 0.5 * f64::from(fg3m)) / f64::from(total_fga))
}

/// True shooting percentage: `PTS / (2 * (FGA + 0.44 * FTA))`.
pub fn true_shooting_pct(points: u32, total_fga: u32, fta: u32) -> Option<f64> {
    let denominator = 2.0 * (f64::from(total_fga) + TS_FTA_WEIGHT * f64::from(fta));
    if denominator == 0.0 {
        return None;
    }
    Some(f64::from(points) / denominator)
}

/// Points per shot attempt: `PTS / (FGA + FTA)`.
pub fn points_per_shot_attempt(points: u32, total_fga: u32, fta: u32) -> Option<f64> {
    let attempts = total_fga + fta;
    if attempts == 0 {
        return None;
    }
    Some(f64::from(points) / f64::from(attempts))
}

/// Share of total points that came from each shot category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoringDistribution {
    pub ft_pct: Option<f64>,
    pub fg2_pct: Option<f64>,
    pub fg3_pct: Option<f64>,
}

/// Split points by category. All shares are `None` when nothing was scored.
pub fn scoring_distribution(ft_points: u32, fg2_points: u32, fg3_points: u32) -> ScoringDistribution {
    let total = ft_points + fg2_points + fg3_points;
    ScoringDistribution {
        ft_pct: percentage(ft_points, total),
        fg2_pct: percentage(fg2_points, total),
        fg3_pct: percentage(fg3_points, total),
    }
}

/// Every metric for one set of counts, ready to hand to a report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShootingSummary {
    pub points: u32,
    pub fg_pct: Option<f64>,
    pub fg2_pct: Option<f64>,
    pub fg3_pct: Option<f64>,
    pub ft_pct: Option<f64>,
    pub efg_pct: Option<f64>,
    pub ts_pct: Option<f64>,
    pub ppsa: Option<f64>,
    pub distribution: ScoringDistribution,
}

impl ShotCounts {
    /// Derive all shooting metrics from these raw counts.
    pub fn summary(&self) -> ShootingSummary {
        let pts = self.points();
        ShootingSummary {
            points: pts,
            fg_pct: percentage(self.fgm(), self.fga()),
            fg2_pct: percentage(self.fg2m, self.fg2a),
            fg3_pct: percentage(self.fg3m, self.fg3a),
            ft_pct: percentage(self.ftm, self.fta),
            efg_pct: effective_fg_pct(self.fgm(), self.fg3m, self.fga()),
            ts_pct: true_shooting_pct(pts, self.fga(), self.fta),
            ppsa: points_per_shot_attempt(pts, self.fga(), self.fta),
            distribution: scoring_distribution(
                self.made(ShotCategory::Ft) * ShotCategory::Ft.point_value(),
                self.made(ShotCategory::Fg2) * ShotCategory::Fg2.point_value(),
                self.made(ShotCategory::Fg3) * ShotCategory::Fg3.point_value(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("metric should be defined");
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn percentage_basic_and_zero_attempts() {
        approx(percentage(7, 10), 0.7);
        assert_eq!(percentage(0, 0), None);
        approx(percentage(0, 4), 0.0);
    }

    #[test]
    fn points_weights_categories() {
        assert_eq!(points(5, 10, 3), 34);
        assert_eq!(points(0, 0, 0), 0);
        assert_eq!(points(0, 0, 1), ShotCategory::Fg3.point_value());
    }

    #[test]
    fn effective_fg_pct_credits_threes() {
        approx(effective_fg_pct(13, 3, 20), 0.725);
        assert_eq!(effective_fg_pct(0, 0, 0), None);
    }

    #[test]
    fn true_shooting_pct_example() {
        let ts = true_shooting_pct(25, 15, 10).unwrap();
        assert!((ts - 0.644).abs() < 0.001, "got {ts}");
        assert_eq!(true_shooting_pct(0, 0, 0), None);
        // Free throws alone still give a denominator.
        approx(true_shooting_pct(2, 0, 2), 2.0 / (2.0 * 0.88));
    }

    #[test]
    fn points_per_shot_attempt_example() {
        approx(points_per_shot_attempt(30, 20, 10), 1.0);
        assert_eq!(points_per_shot_attempt(0, 0, 0), None);
    }

    #[test]
    fn scoring_distribution_shares() {
        let d = scoring_distribution(10, 40, 30);
        approx(d.ft_pct, 0.125);
        approx(d.fg2_pct, 0.5);
        approx(d.fg3_pct, 0.375);

        let none = scoring_distribution(0, 0, 0);
        assert_eq!(none.ft_pct, None);
        assert_eq!(none.fg2_pct, None);
        assert_eq!(none.fg3_pct, None);
    }

    #[test]
    fn summary_matches_individual_formulas() {
        let counts = ShotCounts {
            ftm: 5,
            fta: 6,
            fg2m: 10,
            fg2a: 17,
            fg3m: 3,
            fg3a: 3,
        };
        let s = counts.summary();
        assert_eq!(s.points, 34);
        approx(s.fg_pct, 13.0 / 20.0);
        approx(s.efg_pct, 0.725);
        approx(s.ft_pct, 5.0 / 6.0);
        approx(s.ppsa, 34.0 / 26.0);
        approx(s.distribution.fg3_pct, 9.0 / 34.0);
    }

    #[test]
    fn rollup_sums_counts_before_dividing() {
        // 1-for-1 one night, 2-for-10 the next: 3/11, not the 60% average.
        let nights = [
            ShotCounts {
                fg2m: 1,
                fg2a: 1,
                ..Default::default()
            },
            ShotCounts {
                fg2m: 2,
                fg2a: 10,
                ..Default::default()
            },
        ];
        let season: ShotCounts = nights.iter().sum();
        approx(season.summary().fg2_pct, 3.0 / 11.0);
    }

    #[test]
    fn empty_counts_have_no_rates() {
        let s = ShotCounts::default().summary();
        assert_eq!(s.points, 0);
        assert_eq!(s.fg_pct, None);
        assert_eq!(s.ts_pct, None);
        assert_eq!(s.ppsa, None);
        assert_eq!(s.distribution.ft_pct, None);
    }
}
