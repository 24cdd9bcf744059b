// Typed records exchanged between the stats engine, the load pipelines, and
// the persistence layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Season-aggregate records
// ---------------------------------------------------------------------------

/// Season identifier in `YYYY-YY` form (e.g. `2024-25`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeasonId(String);

impl SeasonId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeasonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which entity a season dataset describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DatasetKind {
    Teams,
    Players,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Teams => "teams",
            DatasetKind::Players => "players",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stats columns of one row, in source column order.
pub type StatColumns = Vec<(String, f64)>;

/// One team's season aggregate, ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamSeasonRow {
    pub tm_name: String,
    pub stats: StatColumns,
}

/// Descriptive attributes of a player. `None` means unknown, not zero.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerProfile {
    pub name: String,
    pub role: Option<String>,
    pub nat: Option<String>,
    pub height: Option<f64>,
    pub age: Option<f64>,
    pub tm_name: Option<String>,
}

/// One player's season aggregate, ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSeasonRow {
    pub profile: PlayerProfile,
    pub stats: StatColumns,
}

/// Look up a stat by column name.
pub fn stat_value(stats: &StatColumns, column: &str) -> Option<f64> {
    stats
        .iter()
        .find(|(name, _)| name == column)
        .map(|(_, value)| *value)
}

// ---------------------------------------------------------------------------
// Per-game event records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CompetitionRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventSeasonRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventTeamRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub abbreviation: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SportEventRecord {
    pub id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub competition_id: Option<String>,
    pub season_id: Option<String>,
    pub home_team_id: Option<String>,
    pub away_team_id: Option<String>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventPlayerRecord {
    pub id: String,
    pub name: Option<String>,
    pub team_id: String,
    pub season_id: String,
}

/// Team counting stats for a single game, as reported by the game feed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TeamGameCounts {
    pub assists: Option<f64>,
    pub defensive_rebounds: Option<f64>,
    pub offensive_rebounds: Option<f64>,
    pub rebounds: Option<f64>,
    pub fouls: Option<f64>,
    pub steals: Option<f64>,
    pub shots_blocked: Option<f64>,
    pub turnovers: Option<f64>,
    pub free_throw_attempts_successful: Option<f64>,
    pub free_throw_attempts_total: Option<f64>,
    pub two_point_attempts_successful: Option<f64>,
    pub two_point_attempts_total: Option<f64>,
    pub three_point_attempts_successful: Option<f64>,
    pub three_point_attempts_total: Option<f64>,
}

/// Derived single-game team metrics. NaN marks an undefined value and is
/// persisted as NULL.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeamGameMetrics {
    pub possessions: f64,
    pub oreb_pct: f64,
    pub dreb_pct: f64,
    pub ast_to: f64,
    pub to_pct: f64,
}

/// Player counting stats for a single game, as reported by the game feed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlayerGameCounts {
    pub minutes: Option<String>,
    pub points: Option<f64>,
    pub assists: Option<f64>,
    pub total_rebounds: Option<f64>,
    pub defensive_rebounds: Option<f64>,
    pub offensive_rebounds: Option<f64>,
    pub blocks: Option<f64>,
    pub steals: Option<f64>,
    pub turnovers: Option<f64>,
    pub personal_fouls: Option<f64>,
    pub field_goals_attempted: Option<f64>,
    pub field_goals_made: Option<f64>,
    pub three_pointers_attempted: Option<f64>,
    pub three_pointers_made: Option<f64>,
    pub free_throws_attempted: Option<f64>,
    pub free_throws_made: Option<f64>,
}
