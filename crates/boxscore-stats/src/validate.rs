// Schema validation for box-score and roster CSV files.
//
// Validation is exhaustive: every row is checked and every problem is
// collected, so a file is either fully typed or returned with its complete
// error list. Quarter notation is carried through as text; turning it into
// counts is the aggregator's job.

use std::collections::HashMap;

use chrono::NaiveDate;
use csv::StringRecord;
use serde::Serialize;

use boxscore_core::model::{name_key, ShotCategory, QUARTERS};

use crate::error::{CountKind, ValidationError};
use crate::notation::ShotCounts;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Which of the two teams in the metadata a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Visitor,
}

/// The three metadata lines at the top of a box-score file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameHeader {
    pub home: String,
    pub visitor: String,
    pub date: NaiveDate,
}

impl GameHeader {
    pub fn team(&self, side: Side) -> &str {
        match side {
            Side::Home => &self.home,
            Side::Visitor => &self.visitor,
        }
    }
}

/// One validated player line of a box score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRow {
    /// 1-based line in the source file.
    pub line: u64,
    pub side: Side,
    pub jersey: u32,
    pub name: String,
    pub fouls: u32,
    /// Notation per quarter. `Some("")` is a quarter with no shots;
    /// `None` means the row ended before that column.
    pub quarters: [Option<String>; QUARTERS as usize],
    /// Game totals written in the file, when it carries total columns.
    pub supplied_totals: Option<ShotCounts>,
}

/// A box-score file that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedGame {
    pub header: GameHeader,
    pub rows: Vec<PlayerRow>,
}

/// One validated roster line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    pub line: u64,
    pub team: String,
    pub team_display_name: Option<String>,
    pub jersey: u32,
    pub name: String,
    pub active: bool,
    pub substitute: bool,
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    Team,
    TeamName,
    Jersey,
    Name,
    Fouls,
    Active,
    Substitute,
    Quarter(u8),
    Total(ShotCategory, CountKind),
}

const TOTAL_COLUMNS: [Column; 6] = [
    Column::Total(ShotCategory::Ft, CountKind::Made),
    Column::Total(ShotCategory::Ft, CountKind::Attempted),
    Column::Total(ShotCategory::Fg2, CountKind::Made),
    Column::Total(ShotCategory::Fg2, CountKind::Attempted),
    Column::Total(ShotCategory::Fg3, CountKind::Made),
    Column::Total(ShotCategory::Fg3, CountKind::Attempted),
];

impl Column {
    /// Match a header cell, ignoring case and surrounding whitespace.
    fn classify(header: &str) -> Option<Column> {
        use CountKind::{Attempted, Made};
        use ShotCategory::{Fg2, Fg3, Ft};

        let column = match name_key(header).as_str() {
            "team" => Column::Team,
            "team name" | "team display name" => Column::TeamName,
            "jersey number" | "jersey" | "jersey #" | "number" | "no" | "no." | "#" => {
                Column::Jersey
            }
            "player name" | "player" | "name" => Column::Name,
            "fouls" | "pf" => Column::Fouls,
            "active" => Column::Active,
            "substitute" | "sub" => Column::Substitute,
            "qt1" | "q1" => Column::Quarter(1),
            "qt2" | "q2" => Column::Quarter(2),
            "qt3" | "q3" => Column::Quarter(3),
            "qt4" | "q4" => Column::Quarter(4),
            "ftm" => Column::Total(Ft, Made),
            "fta" => Column::Total(Ft, Attempted),
            "2pm" | "fg2m" => Column::Total(Fg2, Made),
            "2pa" | "fg2a" => Column::Total(Fg2, Attempted),
            "3pm" | "fg3m" => Column::Total(Fg3, Made),
            "3pa" | "fg3a" => Column::Total(Fg3, Attempted),
            _ => return None,
        };
        Some(column)
    }

    fn label(self) -> String {
        match self {
            Column::Team => "Team".into(),
            Column::TeamName => "Team Name".into(),
            Column::Jersey => "Jersey Number".into(),
            Column::Name => "Player Name".into(),
            Column::Fouls => "Fouls".into(),
            Column::Active => "Active".into(),
            Column::Substitute => "Substitute".into(),
            Column::Quarter(q) => format!("QT{q}"),
            Column::Total(category, kind) => {
                let prefix = match category {
                    ShotCategory::Ft => "FT",
                    ShotCategory::Fg2 => "2P",
                    ShotCategory::Fg3 => "3P",
                };
                let suffix = match kind {
                    CountKind::Made => "M",
                    CountKind::Attempted => "A",
                };
                format!("{prefix}{suffix}")
            }
        }
    }
}

/// Header row resolved to column positions.
struct ColumnMap {
    indices: HashMap<Column, usize>,
}

impl ColumnMap {
    fn from_header(line: u64, record: &StringRecord, errors: &mut Vec<ValidationError>) -> Self {
        let mut indices = HashMap::new();
        for (idx, cell) in record.iter().enumerate() {
            let Some(column) = Column::classify(cell) else {
                continue;
            };
            if indices.insert(column, idx).is_some() {
                errors.push(ValidationError::cell(
                    line,
                    &column.label(),
                    "column appears more than once in the header",
                ));
            }
        }
        Self { indices }
    }

    fn has(&self, column: Column) -> bool {
        self.indices.contains_key(&column)
    }

    /// Report every column in `required` the header lacks.
    fn require(&self, line: u64, required: &[Column], errors: &mut Vec<ValidationError>) {
        for &column in required {
            if !self.has(column) {
                errors.push(ValidationError::at(
                    line,
                    format!("header is missing required column `{}`", column.label()),
                ));
            }
        }
    }

    /// The cell for `column` in `record`; `None` when the header has no such
    /// column or the row is too short to reach it.
    fn get<'r>(&self, record: &'r StringRecord, column: Column) -> Option<&'r str> {
        self.indices.get(&column).and_then(|&idx| record.get(idx))
    }
}

// ---------------------------------------------------------------------------
// Record reading
// ---------------------------------------------------------------------------

/// Read all non-blank records with their 1-based line numbers. Cells are
/// trimmed; rows may have differing lengths.
fn read_records(text: &str) -> (Vec<(u64, StringRecord)>, Vec<ValidationError>) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    let mut errors = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) => {
                if record.iter().all(str::is_empty) {
                    continue;
                }
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                records.push((line, record));
            }
            Err(e) => {
                let recoverable = matches!(e.kind(), csv::ErrorKind::Utf8 { .. });
                errors.push(ValidationError {
                    line: e.position().map(|p| p.line()),
                    column: None,
                    message: format!("unreadable CSV record: {e}"),
                });
                if !recoverable {
                    break;
                }
            }
        }
    }
    (records, errors)
}

// ---------------------------------------------------------------------------
// Cell parsers
// ---------------------------------------------------------------------------

/// Parse a required non-negative integer cell (jersey numbers may carry a
/// leading `#`).
fn parse_count(raw: &str) -> Result<u32, String> {
    let digits = raw.strip_prefix('#').unwrap_or(raw).trim();
    digits
        .parse::<u32>()
        .map_err(|_| format!("must be a non-negative integer, got {raw:?}"))
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%m/%d/%Y"))
        .ok()
}

fn parse_flag(raw: &str, default: bool) -> Result<bool, String> {
    match raw.to_lowercase().as_str() {
        "" => Ok(default),
        "1" | "true" | "t" | "yes" | "y" | "x" => Ok(true),
        "0" | "false" | "f" | "no" | "n" => Ok(false),
        _ => Err(format!("must be yes/no, true/false or 1/0, got {raw:?}")),
    }
}

/// Required integer cell: missing or empty is an error.
fn required_count(
    columns: &ColumnMap,
    record: &StringRecord,
    line: u64,
    column: Column,
    errors: &mut Vec<ValidationError>,
) -> Option<u32> {
    match columns.get(record, column) {
        None | Some("") => {
            errors.push(ValidationError::cell(line, &column.label(), "value is required"));
            None
        }
        Some(raw) => match parse_count(raw) {
            Ok(value) => Some(value),
            Err(message) => {
                errors.push(ValidationError::cell(line, &column.label(), message));
                None
            }
        },
    }
}

/// Optional integer cell: missing or empty reads as zero.
fn optional_count(
    columns: &ColumnMap,
    record: &StringRecord,
    line: u64,
    column: Column,
    errors: &mut Vec<ValidationError>,
) -> Option<u32> {
    match columns.get(record, column) {
        None | Some("") => Some(0),
        Some(raw) => match parse_count(raw) {
            Ok(value) => Some(value),
            Err(message) => {
                errors.push(ValidationError::cell(line, &column.label(), message));
                None
            }
        },
    }
}

fn required_text(
    columns: &ColumnMap,
    record: &StringRecord,
    line: u64,
    column: Column,
    errors: &mut Vec<ValidationError>,
) -> Option<String> {
    match columns.get(record, column) {
        None | Some("") => {
            errors.push(ValidationError::cell(line, &column.label(), "value is required"));
            None
        }
        Some(value) => Some(value.to_string()),
    }
}

/// Tracks (team, jersey) and (team, name) pairs already seen in one file.
struct DuplicateGuard<K> {
    jerseys: HashMap<(K, u32), u64>,
    names: HashMap<(K, String), u64>,
}

impl<K> Default for DuplicateGuard<K> {
    fn default() -> Self {
        Self {
            jerseys: HashMap::new(),
            names: HashMap::new(),
        }
    }
}

impl<K: std::hash::Hash + Eq + Clone> DuplicateGuard<K> {
    fn check(
        &mut self,
        team: K,
        team_label: &str,
        jersey: u32,
        name: &str,
        line: u64,
        errors: &mut Vec<ValidationError>,
    ) {
        if let Some(first) = self.jerseys.insert((team.clone(), jersey), line) {
            errors.push(ValidationError::at(
                line,
                format!("jersey #{jersey} for {team_label} is already listed on line {first}"),
            ));
        }
        if let Some(first) = self.names.insert((team, name_key(name)), line) {
            errors.push(ValidationError::at(
                line,
                format!("{name} ({team_label}) is already listed on line {first}"),
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Box-score validation
// ---------------------------------------------------------------------------

/// Validate a box-score file: `Home,`/`Visitor,`/`Date,` metadata lines,
/// a header row, then one row per player.
pub fn validate_game(text: &str) -> Result<ValidatedGame, Vec<ValidationError>> {
    let (records, mut errors) = read_records(text);

    let header_pos = records.iter().position(|(_, record)| is_header(record));
    let Some(header_pos) = header_pos else {
        errors.push(ValidationError::file(
            "no header row found (expected a row with a `Team` column)",
        ));
        return Err(errors);
    };

    let header = validate_metadata(&records[..header_pos], &mut errors);

    let (header_line, header_record) = &records[header_pos];
    let columns = ColumnMap::from_header(*header_line, header_record, &mut errors);
    let mut required = vec![Column::Team, Column::Jersey, Column::Name];
    required.extend((1..=QUARTERS).map(Column::Quarter));
    columns.require(*header_line, &required, &mut errors);

    let total_columns_present = TOTAL_COLUMNS.iter().filter(|&&c| columns.has(c)).count();
    let has_totals = total_columns_present == TOTAL_COLUMNS.len();
    if total_columns_present > 0 && !has_totals {
        errors.push(ValidationError::at(
            *header_line,
            "total columns must include all of FTM, FTA, 2PM, 2PA, 3PM, 3PA or none of them",
        ));
    }

    let body = &records[header_pos + 1..];
    if body.is_empty() {
        errors.push(ValidationError::at(*header_line, "no player rows after the header"));
    }

    let mut rows = Vec::with_capacity(body.len());
    let mut guard = DuplicateGuard::<Side>::default();
    for (line, record) in body {
        let line = *line;
        let side = row_side(&columns, record, line, header.as_ref(), &mut errors);
        let jersey = required_count(&columns, record, line, Column::Jersey, &mut errors);
        let name = required_text(&columns, record, line, Column::Name, &mut errors);
        let fouls = optional_count(&columns, record, line, Column::Fouls, &mut errors);

        let quarters: [Option<String>; QUARTERS as usize] = std::array::from_fn(|i| {
            columns
                .get(record, Column::Quarter(i as u8 + 1))
                .map(str::to_string)
        });

        let supplied_totals = if has_totals {
            supplied_totals(&columns, record, line, &mut errors)
        } else {
            Some(ShotCounts::default())
        };

        if let (Some(side), Some(jersey), Some(name)) = (side, jersey, name.as_deref()) {
            let team_label = header.as_ref().map(|h| h.team(side)).unwrap_or_default();
            guard.check(side, team_label, jersey, name, line, &mut errors);
        }

        if let (Some(side), Some(jersey), Some(name), Some(fouls), Some(totals)) =
            (side, jersey, name, fouls, supplied_totals)
        {
            rows.push(PlayerRow {
                line,
                side,
                jersey,
                name,
                fouls,
                quarters,
                supplied_totals: has_totals.then_some(totals),
            });
        }
    }

    match header {
        Some(header) if errors.is_empty() => Ok(ValidatedGame { header, rows }),
        _ => {
            errors.sort_by_key(|e| e.line);
            Err(errors)
        }
    }
}

const METADATA_LABELS: [&str; 5] = ["home", "visitor", "visitors", "away", "date"];

/// The header is the first row that is not a metadata line and names a
/// `Team` column in any position.
fn is_header(record: &StringRecord) -> bool {
    let label = name_key(record.get(0).unwrap_or_default());
    !METADATA_LABELS.contains(&label.as_str())
        && record
            .iter()
            .any(|cell| Column::classify(cell) == Some(Column::Team))
}

/// Parse the metadata lines above the header. Returns `None` when any of
/// the three required values is missing or invalid (the errors say why).
fn validate_metadata(
    records: &[(u64, StringRecord)],
    errors: &mut Vec<ValidationError>,
) -> Option<GameHeader> {
    let mut home: Option<(u64, String)> = None;
    let mut visitor: Option<(u64, String)> = None;
    let mut date: Option<NaiveDate> = None;
    let mut date_seen = false;

    for (line, record) in records {
        let line = *line;
        let label = record.get(0).unwrap_or_default();
        let value = record.get(1).unwrap_or_default();
        let slot = match name_key(label).as_str() {
            "home" => Some((&mut home, "Home")),
            "visitor" | "visitors" | "away" => Some((&mut visitor, "Visitor")),
            "date" => {
                if date_seen {
                    errors.push(ValidationError::cell(line, "Date", "date is given more than once"));
                }
                date_seen = true;
                if value.is_empty() {
                    errors.push(ValidationError::cell(line, "Date", "value is required"));
                } else {
                    match parse_date(value) {
                        Some(parsed) => date = Some(parsed),
                        None => errors.push(ValidationError::cell(
                            line,
                            "Date",
                            format!("expected YYYY-MM-DD or M/D/YYYY, got {value:?}"),
                        )),
                    }
                }
                None
            }
            _ => {
                errors.push(ValidationError::at(
                    line,
                    format!("unexpected line before the header: {label:?}"),
                ));
                None
            }
        };

        if let Some((slot, label)) = slot {
            if slot.is_some() {
                errors.push(ValidationError::cell(line, label, "given more than once"));
            } else if value.is_empty() {
                errors.push(ValidationError::cell(line, label, "team name is required"));
            } else {
                *slot = Some((line, value.to_string()));
            }
        }
    }

    if home.is_none() {
        errors.push(ValidationError::file("missing `Home,<team>` line"));
    }
    if visitor.is_none() {
        errors.push(ValidationError::file("missing `Visitor,<team>` line"));
    }
    if !date_seen {
        errors.push(ValidationError::file("missing `Date,<date>` line"));
    }

    let ((_, home), (visitor_line, visitor), date) = (home?, visitor?, date?);
    if name_key(&home) == name_key(&visitor) {
        errors.push(ValidationError::cell(
            visitor_line,
            "Visitor",
            format!("visitor {visitor:?} is the same team as the home side"),
        ));
        return None;
    }
    Some(GameHeader {
        home,
        visitor,
        date,
    })
}

/// Which side a row's `Team` cell names. Without a valid header there is
/// nothing to match against, so only presence is checked.
fn row_side(
    columns: &ColumnMap,
    record: &StringRecord,
    line: u64,
    header: Option<&GameHeader>,
    errors: &mut Vec<ValidationError>,
) -> Option<Side> {
    let team = required_text(columns, record, line, Column::Team, errors)?;
    let header = header?;
    let key = name_key(&team);
    if key == name_key(&header.home) {
        Some(Side::Home)
    } else if key == name_key(&header.visitor) {
        Some(Side::Visitor)
    } else {
        errors.push(ValidationError::cell(
            line,
            "Team",
            format!(
                "{team:?} is neither the home team ({}) nor the visitor ({})",
                header.home, header.visitor
            ),
        ));
        None
    }
}

fn supplied_totals(
    columns: &ColumnMap,
    record: &StringRecord,
    line: u64,
    errors: &mut Vec<ValidationError>,
) -> Option<ShotCounts> {
    let mut values = [0u32; 6];
    let mut ok = true;
    for (slot, &column) in values.iter_mut().zip(TOTAL_COLUMNS.iter()) {
        match optional_count(columns, record, line, column, errors) {
            Some(v) => *slot = v,
            None => ok = false,
        }
    }
    if !ok {
        return None;
    }

    let [ftm, fta, fg2m, fg2a, fg3m, fg3a] = values;
    let totals = ShotCounts {
        ftm,
        fta,
        fg2m,
        fg2a,
        fg3m,
        fg3a,
    };
    for category in ShotCategory::ALL {
        if totals.made(category) > totals.attempted(category) {
            errors.push(ValidationError::at(
                line,
                format!(
                    "{category} makes ({}) exceed attempts ({})",
                    totals.made(category),
                    totals.attempted(category)
                ),
            ));
            ok = false;
        }
    }
    ok.then_some(totals)
}

// ---------------------------------------------------------------------------
// Roster validation
// ---------------------------------------------------------------------------

/// Validate a roster file: header row, then one row per player.
pub fn validate_roster(text: &str) -> Result<Vec<RosterRow>, Vec<ValidationError>> {
    let (records, mut errors) = read_records(text);

    let Some(((header_line, header_record), body)) = records.split_first() else {
        errors.push(ValidationError::file("roster file is empty"));
        return Err(errors);
    };

    let columns = ColumnMap::from_header(*header_line, header_record, &mut errors);
    columns.require(
        *header_line,
        &[Column::Team, Column::Jersey, Column::Name],
        &mut errors,
    );
    if body.is_empty() {
        errors.push(ValidationError::at(*header_line, "no player rows after the header"));
    }

    let mut rows = Vec::with_capacity(body.len());
    let mut guard = DuplicateGuard::<String>::default();
    for (line, record) in body {
        let line = *line;
        let team = required_text(&columns, record, line, Column::Team, &mut errors);
        let jersey = required_count(&columns, record, line, Column::Jersey, &mut errors);
        let name = required_text(&columns, record, line, Column::Name, &mut errors);
        let team_display_name = columns
            .get(record, Column::TeamName)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let mut flag = |column: Column, default: bool| {
            match parse_flag(columns.get(record, column).unwrap_or_default(), default) {
                Ok(value) => Some(value),
                Err(message) => {
                    errors.push(ValidationError::cell(line, &column.label(), message));
                    None
                }
            }
        };
        let active = flag(Column::Active, true);
        let substitute = flag(Column::Substitute, false);

        if let (Some(team), Some(jersey), Some(name)) = (team.as_deref(), jersey, name.as_deref()) {
            guard.check(name_key(team), team, jersey, name, line, &mut errors);
        }

        if let (Some(team), Some(jersey), Some(name), Some(active), Some(substitute)) =
            (team, jersey, name, active, substitute)
        {
            rows.push(RosterRow {
                line,
                team,
                team_display_name,
                jersey,
                name,
                active,
                substitute,
            });
        }
    }

    if errors.is_empty() {
        Ok(rows)
    } else {
        errors.sort_by_key(|e| e.line);
        Err(errors)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
