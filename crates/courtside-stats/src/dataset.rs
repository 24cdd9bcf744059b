// Season dataset reader.
//
// Season aggregates arrive as semicolon-delimited CSV (comma decimals, "-" for
// missing values) or as a JSON array of objects. A dataset is identified by a
// key such as `24_25_teams`. Reading a dataset produces an immutable
// `LoadBatch`: every row normalized, players below the impact thresholds
// removed, and columns without a home in the target table dropped.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use courtside_core::records::{
    DatasetKind, PlayerProfile, PlayerSeasonRow, SeasonId, StatColumns, TeamSeasonRow,
};
use courtside_core::schema;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::normalize::{normalize_row, FieldFamily, NormalizeError, RawStatRow, TypedRow};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },

    #[error("bad dataset key `{key}`: {reason}")]
    BadKey { key: String, reason: String },

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

// ---------------------------------------------------------------------------
// Dataset key
// ---------------------------------------------------------------------------

/// `<yy>_<yy>_<teams|players>`, e.g. `24_25_teams` -> season `2024-25`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    raw: String,
    pub season: SeasonId,
    pub kind: DatasetKind,
}

impl DatasetKey {
    pub fn parse(key: &str) -> Result<Self, DatasetError> {
        let bad = |reason: &str| DatasetError::BadKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = key.trim().split('_').collect();
        let &[start, end, kind] = parts.as_slice() else {
            return Err(bad("expected <yy>_<yy>_<teams|players>"));
        };
        let two_digits = |s: &str| s.len() == 2 && s.chars().all(|c| c.is_ascii_digit());
        if !two_digits(start) || !two_digits(end) {
            return Err(bad("season tokens must be two digits"));
        }
        let kind = match kind.to_ascii_lowercase().as_str() {
            "teams" => DatasetKind::Teams,
            "players" => DatasetKind::Players,
            _ => return Err(bad("entity kind must be `teams` or `players`")),
        };

        Ok(Self {
            raw: key.trim().to_string(),
            season: SeasonId::new(format!("20{start}-{end}")),
            kind,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for DatasetKey {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DatasetKey::parse(s)
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ---------------------------------------------------------------------------
// Impact filter
// ---------------------------------------------------------------------------

/// Players must exceed both thresholds to be loaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactFilter {
    pub min_games: f64,
    pub min_minutes: f64,
}

impl Default for ImpactFilter {
    fn default() -> Self {
        Self {
            min_games: 3.0,
            min_minutes: 10.0,
        }
    }
}

impl ImpactFilter {
    pub fn keeps(&self, games: f64, minutes: f64) -> bool {
        games > self.min_games && minutes > self.min_minutes
    }
}

// ---------------------------------------------------------------------------
// Load batch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum BatchRows {
    Teams(Vec<TeamSeasonRow>),
    Players(Vec<PlayerSeasonRow>),
}

/// Fully normalized and filtered rows of one dataset, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadBatch {
    key: DatasetKey,
    rows: BatchRows,
    filtered_out: usize,
    dropped_columns: Vec<String>,
}

impl LoadBatch {
    pub fn key(&self) -> &DatasetKey {
        &self.key
    }

    pub fn season(&self) -> &SeasonId {
        &self.key.season
    }

    pub fn rows(&self) -> &BatchRows {
        &self.rows
    }

    /// Player rows removed by the impact filter.
    pub fn filtered_out(&self) -> usize {
        self.filtered_out
    }

    /// Source columns not stored in the target table.
    pub fn dropped_columns(&self) -> &[String] {
        &self.dropped_columns
    }

    pub fn len(&self) -> usize {
        match &self.rows {
            BatchRows::Teams(rows) => rows.len(),
            BatchRows::Players(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Field family of a season dataset column.
pub fn classify_season_column(column: &str) -> FieldFamily {
    if schema::NUMERIC_PROFILE_COLUMNS.contains(&column) {
        FieldFamily::DescriptiveNumber
    } else if schema::TEXT_COLUMNS.contains(&column) {
        FieldFamily::DescriptiveText
    } else {
        FieldFamily::Counting
    }
}

fn is_known_column(kind: DatasetKind, column: &str) -> bool {
    match kind {
        DatasetKind::Teams => column == "tm_name" || schema::is_team_stat_column(column),
        DatasetKind::Players => {
            column == "name"
                || column == "tm_name"
                || schema::PLAYER_PROFILE_COLUMNS.contains(&column)
                || schema::is_player_stat_column(column)
        }
    }
}

fn stat_columns(typed: &TypedRow, is_stat: fn(&str) -> bool) -> StatColumns {
    typed
        .counting()
        .filter(|(name, _)| is_stat(name))
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Normalize `rows` into a batch for `key`. Fails on the first row without
/// its identifier (`tm_name` for teams, `name` for players).
pub fn build_batch(
    key: DatasetKey,
    rows: &[RawStatRow],
    filter: &ImpactFilter,
) -> Result<LoadBatch, NormalizeError> {
    let dropped: BTreeSet<String> = rows
        .iter()
        .flat_map(|row| row.keys())
        .filter(|column| !is_known_column(key.kind, column))
        .cloned()
        .collect();
    for column in &dropped {
        warn!(dataset = %key, column = %column, "column has no target field, dropping");
    }

    let mut filtered_out = 0;
    let batch_rows = match key.kind {
        DatasetKind::Teams => {
            let mut teams = Vec::with_capacity(rows.len());
            for (i, raw) in rows.iter().enumerate() {
                let typed = normalize_row(raw, "tm_name", i, classify_season_column)?;
                teams.push(TeamSeasonRow {
                    stats: stat_columns(&typed, schema::is_team_stat_column),
                    tm_name: typed.identifier,
                });
            }
            BatchRows::Teams(teams)
        }
        DatasetKind::Players => {
            let mut players = Vec::with_capacity(rows.len());
            for (i, raw) in rows.iter().enumerate() {
                let typed = normalize_row(raw, "name", i, classify_season_column)?;
                if let (Some(games), Some(minutes)) = (typed.number("gp"), typed.number("min")) {
                    if !filter.keeps(games, minutes) {
                        debug!(player = %typed.identifier, games, minutes, "below impact thresholds");
                        filtered_out += 1;
                        continue;
                    }
                }
                let profile = PlayerProfile {
                    role: typed.text("role").map(str::to_string),
                    nat: typed.text("nat").map(str::to_string),
                    height: typed.number("height"),
                    age: typed.number("age"),
                    tm_name: typed.text("tm_name").map(str::to_string),
                    name: typed.identifier.clone(),
                };
                players.push(PlayerSeasonRow {
                    stats: stat_columns(&typed, schema::is_player_stat_column),
                    profile,
                });
            }
            BatchRows::Players(players)
        }
    };

    Ok(LoadBatch {
        key,
        rows: batch_rows,
        filtered_out,
        dropped_columns: dropped.into_iter().collect(),
    })
}

// ---------------------------------------------------------------------------
// Reader-based loaders
// ---------------------------------------------------------------------------

/// Read semicolon-delimited rows as raw strings keyed by header. Ragged rows
/// are skipped with a warning.
pub fn read_csv_rows<R: Read>(rdr: R) -> Result<Vec<RawStatRow>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .from_reader(rdr);
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) => {
                let row: RawStatRow = headers
                    .iter()
                    .zip(record.iter())
                    .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
                    .collect();
                rows.push(row);
            }
            Err(e) => {
                warn!("skipping malformed dataset row: {}", e);
            }
        }
    }
    Ok(rows)
}

/// Read a JSON array of row objects.
pub fn read_json_rows<R: Read>(rdr: R) -> Result<Vec<RawStatRow>, serde_json::Error> {
    serde_json::from_reader(rdr)
}

/// Read and batch a dataset file. `.json` files are read as JSON, anything
/// else as semicolon-delimited CSV.
pub fn load_dataset(
    key: DatasetKey,
    path: &Path,
    filter: &ImpactFilter,
) -> Result<LoadBatch, DatasetError> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|source| DatasetError::Io {
        path: display.clone(),
        source,
    })?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let rows = if is_json {
        read_json_rows(file).map_err(|source| DatasetError::Json {
            path: display.clone(),
            source,
        })?
    } else {
        read_csv_rows(file).map_err(|source| DatasetError::Csv {
            path: display.clone(),
            source,
        })?
    };

    Ok(build_batch(key, &rows, filter)?)
}
