// Shot notation parsing: one character per shot, read left to right.
//
// What each character means comes from a `NotationMapping` table handed in
// by the caller, so leagues can redefine the symbols in config without any
// code change.

use std::collections::HashMap;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use boxscore_core::config::{Config, NotationSymbol};
use boxscore_core::model::ShotCategory;

use crate::error::ParseError;

// ---------------------------------------------------------------------------
// Shot counts
// ---------------------------------------------------------------------------

/// Raw makes and attempts for the three shot categories. This is the unit
/// every aggregate is built from: quarters sum into games, games into
/// seasons and careers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShotCounts {
    pub ftm: u32,
    pub fta: u32,
    pub fg2m: u32,
    pub fg2a: u32,
    pub fg3m: u32,
    pub fg3a: u32,
}

impl ShotCounts {
    /// Record one shot in `category`.
    pub fn record(&mut self, category: ShotCategory, made: bool) {
        let (makes, attempts) = match category {
            ShotCategory::Ft => (&mut self.ftm, &mut self.fta),
            ShotCategory::Fg2 => (&mut self.fg2m, &mut self.fg2a),
            ShotCategory::Fg3 => (&mut self.fg3m, &mut self.fg3a),
        };
        *attempts += 1;
        if made {
            *makes += 1;
        }
    }

    pub fn made(&self, category: ShotCategory) -> u32 {
        match category {
            ShotCategory::Ft => self.ftm,
            ShotCategory::Fg2 => self.fg2m,
            ShotCategory::Fg3 => self.fg3m,
        }
    }

    pub fn attempted(&self, category: ShotCategory) -> u32 {
        match category {
            ShotCategory::Ft => self.fta,
            ShotCategory::Fg2 => self.fg2a,
            ShotCategory::Fg3 => self.fg3a,
        }
    }

    /// Field goals made (2PT + 3PT).
    pub fn fgm(&self) -> u32 {
        self.fg2m + self.fg3m
    }

    /// Field goals attempted (2PT + 3PT).
    pub fn fga(&self) -> u32 {
        self.fg2a + self.fg3a
    }

    pub fn points(&self) -> u32 {
        crate::metrics::points(self.ftm, self.fg2m, self.fg3m)
    }

    pub fn is_empty(&self) -> bool {
        *self == ShotCounts::default()
    }

    /// True when no category has more makes than attempts.
    pub fn is_consistent(&self) -> bool {
        ShotCategory::ALL
            .iter()
            .all(|&c| self.made(c) <= self.attempted(c))
    }
}

impl AddAssign for ShotCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.ftm += rhs.ftm;
        self.fta += rhs.fta;
        self.fg2m += rhs.fg2m;
        self.fg2a += rhs.fg2a;
        self.fg3m += rhs.fg3m;
        self.fg3a += rhs.fg3a;
    }
}

impl Add for ShotCounts {
    type Output = ShotCounts;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl Sum for ShotCounts {
    fn sum<I: Iterator<Item = ShotCounts>>(iter: I) -> Self {
        iter.fold(ShotCounts::default(), Add::add)
    }
}

impl<'a> Sum<&'a ShotCounts> for ShotCounts {
    fn sum<I: Iterator<Item = &'a ShotCounts>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// ---------------------------------------------------------------------------
// Mapping table
// ---------------------------------------------------------------------------

/// Character → (category, made) lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotationMapping {
    symbols: HashMap<char, NotationSymbol>,
}

impl NotationMapping {
    pub fn new(entries: impl IntoIterator<Item = (char, NotationSymbol)>) -> Self {
        Self {
            symbols: entries.into_iter().collect(),
        }
    }

    /// Build the table from the `[notation]` section of the config.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.notation_symbols())
    }

    pub fn get(&self, c: char) -> Option<NotationSymbol> {
        self.symbols.get(&c).copied()
    }
}

impl Default for NotationMapping {
    /// `1`/`x` made/missed FT, `2`/`-` made/missed 2PT, `3`/`/` made/missed 3PT.
    fn default() -> Self {
        let sym = |category, made| NotationSymbol { category, made };
        Self::new([
            ('1', sym(ShotCategory::Ft, true)),
            ('x', sym(ShotCategory::Ft, false)),
            ('2', sym(ShotCategory::Fg2, true)),
            ('-', sym(ShotCategory::Fg2, false)),
            ('3', sym(ShotCategory::Fg3, true)),
            ('/', sym(ShotCategory::Fg3, false)),
        ])
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a quarter's notation string into shot counts.
///
/// An empty string is a quarter with no recorded shots. Any character the
/// mapping does not know (whitespace included) is an error naming the
/// character and its zero-based position; nothing is skipped.
pub fn parse(notation: &str, mapping: &NotationMapping) -> Result<ShotCounts, ParseError> {
    let mut counts = ShotCounts::default();
    for (position, character) in notation.chars().enumerate() {
        let symbol = mapping.get(character).ok_or(ParseError {
            character,
            position,
        })?;
        counts.record(symbol.category, symbol.made);
    }
    Ok(counts)
}
