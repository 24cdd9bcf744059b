// SQLite persistence layer for season aggregates and per-game events.
//
// Every statement runs in autocommit mode: rows written earlier in a load are
// visible to other readers while the load is still running, and a failure
// part-way through a dataset leaves the rows committed so far in place.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::records::{
    CompetitionRecord, EventPlayerRecord, EventSeasonRecord, EventTeamRecord, PlayerGameCounts,
    PlayerProfile, PlayerSeasonRow, SeasonId, SportEventRecord, TeamGameCounts, TeamGameMetrics,
    TeamSeasonRow,
};
use crate::schema;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    /// The row points at a parent (season, team, player, event) that has not
    /// been inserted.
    #[error("{table} row references a missing parent row: {message}")]
    Referential { table: &'static str, message: String },

    #[error("column `{column}` does not exist in {table}")]
    UnknownColumn { table: &'static str, column: String },

    #[error("sqlite error on {table}: {source}")]
    Sqlite {
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl StoreError {
    fn from_sqlite(table: &'static str, err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ffi_err, message) = &err {
            if ffi_err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
                return StoreError::Referential {
                    table,
                    message: message
                        .clone()
                        .unwrap_or_else(|| "FOREIGN KEY constraint failed".to_string()),
                };
            }
        }
        StoreError::Sqlite { table, source: err }
    }

    pub fn is_referential(&self) -> bool {
        matches!(self, StoreError::Referential { .. })
    }
}

// ---------------------------------------------------------------------------
// Persistence seams
// ---------------------------------------------------------------------------

/// Writes for the season-aggregate load. Parents (`Season`, `Team`,
/// `Player`) are insert-or-ignore; stats rows are always appended.
pub trait SeasonStore {
    fn ensure_season(&self, season: &SeasonId) -> Result<(), StoreError>;

    /// Returns `true` if a new team row was written, `false` if the name
    /// already existed.
    fn insert_team(&self, tm_name: &str, season: &SeasonId) -> Result<bool, StoreError>;

    /// Returns `true` if a new player row was written. Existing profiles are
    /// never updated.
    fn insert_player(&self, profile: &PlayerProfile, season: &SeasonId)
        -> Result<bool, StoreError>;

    fn insert_team_stats(&self, row: &TeamSeasonRow, season: &SeasonId) -> Result<(), StoreError>;

    fn insert_player_stats(
        &self,
        row: &PlayerSeasonRow,
        season: &SeasonId,
    ) -> Result<(), StoreError>;
}

/// Writes for the per-game event ingestion. Every insert ignores conflicts
/// on the natural key; season totals are recomputed on each call.
pub trait GameStore {
    fn insert_competition(&self, competition: &CompetitionRecord) -> Result<(), StoreError>;

    fn insert_event_season(
        &self,
        season: &EventSeasonRecord,
        competition_id: &str,
    ) -> Result<(), StoreError>;

    fn insert_event_team(&self, team: &EventTeamRecord) -> Result<(), StoreError>;

    fn insert_sport_event(&self, event: &SportEventRecord) -> Result<(), StoreError>;

    fn insert_team_game_stats(
        &self,
        event_id: &str,
        team_id: &str,
        counts: &TeamGameCounts,
        metrics: &TeamGameMetrics,
    ) -> Result<(), StoreError>;

    fn insert_event_player(&self, player: &EventPlayerRecord) -> Result<(), StoreError>;

    fn insert_player_game_stats(
        &self,
        event_id: &str,
        player_id: &str,
        counts: &PlayerGameCounts,
    ) -> Result<(), StoreError>;

    fn refresh_season_player_totals(
        &self,
        player_id: &str,
        season_id: &str,
    ) -> Result<(), StoreError>;
}

/// A row read back for reporting: column name -> JSON value.
pub type ReportRow = Map<String, Value>;

const KNOWN_TABLES: &[&str] = &[
    "seasons",
    "teams",
    "players",
    "team_stats",
    "player_stats",
    "competitions",
    "event_seasons",
    "event_teams",
    "sport_events",
    "team_game_stats",
    "event_players",
    "player_game_stats",
    "season_player_totals",
];

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// SQLite-backed store for both load paths and the report queries.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(&schema::create_statements())
            .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Number of rows in one of the schema's tables.
    pub fn row_count(&self, table: &str) -> Result<i64> {
        if !KNOWN_TABLES.contains(&table) {
            anyhow::bail!("unknown table {table}");
        }
        let conn = self.conn();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .with_context(|| format!("failed to count rows in {table}"))
    }

    // -----------------------------------------------------------------------
    // Report queries
    // -----------------------------------------------------------------------

    /// Full `player_stats` rows for each `(player name, season)` pair.
    pub fn player_season_stats(&self, pairs: &[(String, String)]) -> Result<Vec<ReportRow>> {
        self.stats_for_pairs("player_stats", "name", pairs)
    }

    /// Full `team_stats` rows for each `(team name, season)` pair.
    pub fn team_season_stats(&self, pairs: &[(String, String)]) -> Result<Vec<ReportRow>> {
        self.stats_for_pairs("team_stats", "tm_name", pairs)
    }

    /// League-wide average of every numeric `player_stats` column for a
    /// season. Rows with five minutes or less are excluded as outliers.
    pub fn player_season_averages(&self, season: &str) -> Result<Option<ReportRow>> {
        let mut columns = vec!["height", "age"];
        columns.extend_from_slice(schema::PLAYER_STAT_COLUMNS);
        self.season_averages("player_stats", &columns, "AND min > 5", season)
    }

    /// League-wide average of every numeric `team_stats` column for a season.
    pub fn team_season_averages(&self, season: &str) -> Result<Option<ReportRow>> {
        self.season_averages("team_stats", schema::TEAM_STAT_COLUMNS, "", season)
    }

    /// `player_stats` rows to compare a player against: every row except the
    /// player's own row for `season`, restricted to `role` when given.
    pub fn similarity_candidates(
        &self,
        name: &str,
        season: &str,
        role: Option<&str>,
    ) -> Result<Vec<ReportRow>> {
        let mut sql =
            String::from("SELECT * FROM player_stats WHERE (name != ?1 OR season_id != ?2)");
        let mut args = vec![name, season];
        if let Some(role) = role {
            sql.push_str(" AND role = ?3");
            args.push(role);
        }
        sql.push_str(" ORDER BY id");

        let conn = self.conn();
        let mut stmt = conn
            .prepare(&sql)
            .context("failed to prepare similarity candidates")?;
        let names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let rows = stmt
            .query_map(params_from_iter(args), |row| read_report_row(row, &names))
            .context("failed to query similarity candidates")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map similarity candidates")?;
        Ok(rows)
    }

    fn stats_for_pairs(
        &self,
        table: &str,
        key_column: &str,
        pairs: &[(String, String)],
    ) -> Result<Vec<ReportRow>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT * FROM {table} WHERE {key_column} = ?1 AND season_id = ?2 ORDER BY id"
            ))
            .with_context(|| format!("failed to prepare {table} lookup"))?;
        let names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut out = Vec::new();
        for (name, season) in pairs {
            let rows = stmt
                .query_map(params![name, season], |row| read_report_row(row, &names))
                .with_context(|| format!("failed to query {table}"))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("failed to map {table} rows"))?;
            out.extend(rows);
        }
        Ok(out)
    }

    fn season_averages(
        &self,
        table: &str,
        columns: &[&str],
        extra_filter: &str,
        season: &str,
    ) -> Result<Option<ReportRow>> {
        let avg_exprs = columns
            .iter()
            .map(|c| format!("AVG({c}) AS avg_{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT season_id, {avg_exprs} FROM {table}
             WHERE season_id = ?1 {extra_filter}
             GROUP BY season_id"
        );

        let conn = self.conn();
        let mut stmt = conn
            .prepare(&sql)
            .with_context(|| format!("failed to prepare {table} averages"))?;
        let names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt
            .query_map(params![season], |row| read_report_row(row, &names))
            .with_context(|| format!("failed to query {table} averages"))?;

        match rows.next() {
            Some(row) => Ok(Some(row.context("failed to map averages row")?)),
            None => Ok(None),
        }
    }
}

fn read_report_row(row: &rusqlite::Row<'_>, names: &[String]) -> rusqlite::Result<ReportRow> {
    let mut map = Map::new();
    for (i, name) in names.iter().enumerate() {
        let value = match row.get_ref(i)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(n) => Value::from(n),
            ValueRef::Real(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(_) => Value::Null,
        };
        map.insert(name.clone(), value);
    }
    Ok(map)
}

/// Finite floats become REAL, everything else NULL.
fn real(value: f64) -> SqlValue {
    if value.is_finite() {
        SqlValue::Real(value)
    } else {
        SqlValue::Null
    }
}

fn opt_int(value: Option<f64>) -> SqlValue {
    match value {
        Some(v) if v.is_finite() => SqlValue::Integer(v.round() as i64),
        _ => SqlValue::Null,
    }
}

fn opt_text(value: Option<&str>) -> SqlValue {
    value
        .map(|s| SqlValue::Text(s.to_string()))
        .unwrap_or(SqlValue::Null)
}

/// Build an INSERT for a dynamic column list, rejecting columns outside the
/// table vocabulary.
fn dynamic_insert(
    table: &'static str,
    columns: &[String],
    is_known: fn(&str) -> bool,
    key_columns: &[&str],
) -> Result<String, StoreError> {
    if let Some(bad) = columns.iter().find(|c| !is_known(c)) {
        return Err(StoreError::UnknownColumn {
            table,
            column: bad.clone(),
        });
    }
    let all: Vec<&str> = key_columns
        .iter()
        .copied()
        .chain(columns.iter().map(String::as_str))
        .collect();
    let placeholders = (1..=all.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        all.join(", ")
    ))
}

impl SeasonStore for Database {
    fn ensure_season(&self, season: &SeasonId) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO seasons (season_id, season_name) VALUES (?1, ?2)
             ON CONFLICT (season_id) DO NOTHING",
            params![season.as_str(), season.as_str()],
        )
        .map_err(|e| StoreError::from_sqlite("seasons", e))?;
        Ok(())
    }

    fn insert_team(&self, tm_name: &str, season: &SeasonId) -> Result<bool, StoreError> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "INSERT INTO teams (tm_name, season_id) VALUES (?1, ?2)
                 ON CONFLICT (tm_name) DO NOTHING",
                params![tm_name, season.as_str()],
            )
            .map_err(|e| StoreError::from_sqlite("teams", e))?;
        Ok(changed > 0)
    }

    fn insert_player(
        &self,
        profile: &PlayerProfile,
        season: &SeasonId,
    ) -> Result<bool, StoreError> {
        let conn = self.conn();
        let values = [
            SqlValue::Text(profile.name.clone()),
            opt_text(profile.role.as_deref()),
            opt_text(profile.nat.as_deref()),
            opt_int(profile.height),
            opt_int(profile.age),
            opt_text(profile.tm_name.as_deref()),
            SqlValue::Text(season.as_str().to_string()),
        ];
        let changed = conn
            .execute(
                "INSERT INTO players (name, role, nat, height, age, tm_name, season_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (name) DO NOTHING",
                params_from_iter(values.iter()),
            )
            .map_err(|e| StoreError::from_sqlite("players", e))?;
        Ok(changed > 0)
    }

    fn insert_team_stats(&self, row: &TeamSeasonRow, season: &SeasonId) -> Result<(), StoreError> {
        let columns: Vec<String> = row.stats.iter().map(|(c, _)| c.clone()).collect();
        let sql = dynamic_insert(
            "team_stats",
            &columns,
            schema::is_team_stat_column,
            &["tm_name", "season_id"],
        )?;

        let mut values = vec![
            SqlValue::Text(row.tm_name.clone()),
            SqlValue::Text(season.as_str().to_string()),
        ];
        values.extend(row.stats.iter().map(|(_, v)| real(*v)));

        let conn = self.conn();
        conn.execute(&sql, params_from_iter(values.iter()))
            .map_err(|e| StoreError::from_sqlite("team_stats", e))?;
        Ok(())
    }

    fn insert_player_stats(
        &self,
        row: &PlayerSeasonRow,
        season: &SeasonId,
    ) -> Result<(), StoreError> {
        let columns: Vec<String> = row.stats.iter().map(|(c, _)| c.clone()).collect();
        let sql = dynamic_insert(
            "player_stats",
            &columns,
            schema::is_player_stat_column,
            &["name", "tm_name", "season_id", "role", "nat", "height", "age"],
        )?;

        let p = &row.profile;
        let mut values = vec![
            SqlValue::Text(p.name.clone()),
            opt_text(p.tm_name.as_deref()),
            SqlValue::Text(season.as_str().to_string()),
            opt_text(p.role.as_deref()),
            opt_text(p.nat.as_deref()),
            opt_int(p.height),
            opt_int(p.age),
        ];
        values.extend(row.stats.iter().map(|(_, v)| real(*v)));

        let conn = self.conn();
        conn.execute(&sql, params_from_iter(values.iter()))
            .map_err(|e| StoreError::from_sqlite("player_stats", e))?;
        Ok(())
    }
}

impl GameStore for Database {
    fn insert_competition(&self, competition: &CompetitionRecord) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO competitions (id, name) VALUES (?1, ?2)",
            params![competition.id, competition.name],
        )
        .map_err(|e| StoreError::from_sqlite("competitions", e))?;
        Ok(())
    }

    fn insert_event_season(
        &self,
        season: &EventSeasonRecord,
        competition_id: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO event_seasons
                (id, name, year, start_date, end_date, competition_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                season.id,
                season.name,
                season.year,
                season.start_date,
                season.end_date,
                competition_id,
            ],
        )
        .map_err(|e| StoreError::from_sqlite("event_seasons", e))?;
        Ok(())
    }

    fn insert_event_team(&self, team: &EventTeamRecord) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO event_teams (id, name, country, country_code, abbreviation)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                team.id,
                team.name,
                team.country,
                team.country_code,
                team.abbreviation,
            ],
        )
        .map_err(|e| StoreError::from_sqlite("event_teams", e))?;
        Ok(())
    }

    fn insert_sport_event(&self, event: &SportEventRecord) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO sport_events
                (id, start_time, status, competition_id, season_id,
                 home_team_id, away_team_id, home_score, away_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.id,
                event.start_time.map(|t| t.to_rfc3339()),
                event.status,
                event.competition_id,
                event.season_id,
                event.home_team_id,
                event.away_team_id,
                event.home_score,
                event.away_score,
            ],
        )
        .map_err(|e| StoreError::from_sqlite("sport_events", e))?;
        Ok(())
    }

    fn insert_team_game_stats(
        &self,
        event_id: &str,
        team_id: &str,
        counts: &TeamGameCounts,
        metrics: &TeamGameMetrics,
    ) -> Result<(), StoreError> {
        let values = [
            SqlValue::Text(event_id.to_string()),
            SqlValue::Text(team_id.to_string()),
            opt_int(counts.assists),
            opt_int(counts.defensive_rebounds),
            opt_int(counts.offensive_rebounds),
            opt_int(counts.rebounds),
            opt_int(counts.fouls),
            opt_int(counts.steals),
            opt_int(counts.shots_blocked),
            opt_int(counts.turnovers),
            opt_int(counts.free_throw_attempts_successful),
            opt_int(counts.free_throw_attempts_total),
            opt_int(counts.two_point_attempts_successful),
            opt_int(counts.two_point_attempts_total),
            opt_int(counts.three_point_attempts_successful),
            opt_int(counts.three_point_attempts_total),
            real(metrics.possessions),
            real(metrics.oreb_pct),
            real(metrics.dreb_pct),
            real(metrics.ast_to),
            real(metrics.to_pct),
        ];
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO team_game_stats (
                sport_event_id, team_id, assists, defensive_rebounds, offensive_rebounds,
                rebounds, fouls, steals, shots_blocked, turnovers,
                free_throw_attempts_successful, free_throw_attempts_total,
                two_point_attempts_successful, two_point_attempts_total,
                three_point_attempts_successful, three_point_attempts_total,
                possessions, oreb_pct, dreb_pct, ast_to, to_pct
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                       ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
            params_from_iter(values.iter()),
        )
        .map_err(|e| StoreError::from_sqlite("team_game_stats", e))?;
        Ok(())
    }

    fn insert_event_player(&self, player: &EventPlayerRecord) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO event_players (id, name, team_id, season_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![player.id, player.name, player.team_id, player.season_id],
        )
        .map_err(|e| StoreError::from_sqlite("event_players", e))?;
        Ok(())
    }

    fn insert_player_game_stats(
        &self,
        event_id: &str,
        player_id: &str,
        counts: &PlayerGameCounts,
    ) -> Result<(), StoreError> {
        let values = [
            SqlValue::Text(player_id.to_string()),
            SqlValue::Text(event_id.to_string()),
            opt_text(counts.minutes.as_deref()),
            opt_int(counts.points),
            opt_int(counts.assists),
            opt_int(counts.total_rebounds),
            opt_int(counts.defensive_rebounds),
            opt_int(counts.offensive_rebounds),
            opt_int(counts.blocks),
            opt_int(counts.steals),
            opt_int(counts.turnovers),
            opt_int(counts.personal_fouls),
            opt_int(counts.field_goals_attempted),
            opt_int(counts.field_goals_made),
            opt_int(counts.three_pointers_attempted),
            opt_int(counts.three_pointers_made),
            opt_int(counts.free_throws_attempted),
            opt_int(counts.free_throws_made),
        ];
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO player_game_stats (
                player_id, sport_event_id, minutes, points, assists, total_rebounds,
                defensive_rebounds, offensive_rebounds, blocks, steals, turnovers,
                personal_fouls, field_goals_attempted, field_goals_made,
                three_pointers_attempted, three_pointers_made,
                free_throws_attempted, free_throws_made
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                       ?15, ?16, ?17, ?18)",
            params_from_iter(values.iter()),
        )
        .map_err(|e| StoreError::from_sqlite("player_game_stats", e))?;
        Ok(())
    }

    fn refresh_season_player_totals(
        &self,
        player_id: &str,
        season_id: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO season_player_totals (
                player_id, season_id, points_total, rebounds_total, assists_total,
                blocks_total, steals_total, games_played, updated_at
             )
             SELECT ?1, ?2,
                    SUM(ps.points), SUM(ps.total_rebounds), SUM(ps.assists),
                    SUM(ps.blocks), SUM(ps.steals), COUNT(*), ?3
             FROM player_game_stats ps
             JOIN sport_events se ON se.id = ps.sport_event_id
             WHERE ps.player_id = ?1 AND se.season_id = ?2
             ON CONFLICT (player_id, season_id) DO UPDATE SET
                points_total   = excluded.points_total,
                rebounds_total = excluded.rebounds_total,
                assists_total  = excluded.assists_total,
                blocks_total   = excluded.blocks_total,
                steals_total   = excluded.steals_total,
                games_played   = excluded.games_played,
                updated_at     = excluded.updated_at",
            params![player_id, season_id, Utc::now().to_rfc3339()],
        )
        .map_err(|e| StoreError::from_sqlite("season_player_totals", e))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn season() -> SeasonId {
        SeasonId::new("2024-25")
    }

    fn team_row(name: &str) -> TeamSeasonRow {
        TeamSeasonRow {
            tm_name: name.to_string(),
            stats: vec![("gp".into(), 34.0), ("pts".into(), 82.4), ("off_rtg".into(), 117.1)],
        }
    }

    fn profile(name: &str, team: &str) -> PlayerProfile {
        PlayerProfile {
            name: name.to_string(),
            role: Some("Guard".into()),
            nat: Some("ESP".into()),
            height: Some(191.0),
            age: None,
            tm_name: Some(team.to_string()),
        }
    }

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        for table in KNOWN_TABLES {
            assert_eq!(db.row_count(table).unwrap(), 0, "{table} should exist and be empty");
        }
    }

    #[test]
    fn ensure_season_is_idempotent() {
        let db = test_db();
        db.ensure_season(&season()).unwrap();
        db.ensure_season(&season()).unwrap();
        assert_eq!(db.row_count("seasons").unwrap(), 1);
    }

    #[test]
    fn team_stats_before_team_is_referential_failure() {
        let db = test_db();
        db.ensure_season(&season()).unwrap();
        let err = db
            .insert_team_stats(&team_row("Real Madrid"), &season())
            .unwrap_err();
        assert!(err.is_referential(), "expected referential failure, got {err}");
    }

    #[test]
    fn team_then_stats_succeeds() {
        let db = test_db();
        db.ensure_season(&season()).unwrap();
        assert!(db.insert_team("Real Madrid", &season()).unwrap());
        db.insert_team_stats(&team_row("Real Madrid"), &season())
            .unwrap();

        let rows = db
            .team_season_stats(&[("Real Madrid".into(), "2024-25".into())])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["gp"], Value::from(34.0));
        assert_eq!(rows[0]["off_rtg"], Value::from(117.1));
        assert_eq!(rows[0]["def_rtg"], Value::Null);
    }

    #[test]
    fn duplicate_team_name_is_ignored() {
        let db = test_db();
        db.ensure_season(&season()).unwrap();
        assert!(db.insert_team("Monaco", &season()).unwrap());
        assert!(!db.insert_team("Monaco", &season()).unwrap());
        assert_eq!(db.row_count("teams").unwrap(), 1);
    }

    #[test]
    fn player_profile_first_write_wins() {
        let db = test_db();
        db.ensure_season(&season()).unwrap();
        db.insert_team("Barcelona", &season()).unwrap();
        db.insert_team("Monaco", &season()).unwrap();

        assert!(db.insert_player(&profile("Mike James", "Monaco"), &season()).unwrap());
        let moved = PlayerProfile {
            role: Some("Forward".into()),
            ..profile("Mike James", "Barcelona")
        };
        assert!(!db.insert_player(&moved, &season()).unwrap());

        let conn = db.conn();
        let (role, team): (String, String) = conn
            .query_row(
                "SELECT role, tm_name FROM players WHERE name = 'Mike James'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(role, "Guard");
        assert_eq!(team, "Monaco");
    }

    #[test]
    fn player_unknown_attributes_stored_as_null() {
        let db = test_db();
        db.ensure_season(&season()).unwrap();
        db.insert_team("Monaco", &season()).unwrap();
        db.insert_player(&profile("Mike James", "Monaco"), &season())
            .unwrap();

        let conn = db.conn();
        let age: Option<i64> = conn
            .query_row("SELECT age FROM players WHERE name = 'Mike James'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(age, None);
    }

    #[test]
    fn stats_rows_are_appended_on_every_call() {
        let db = test_db();
        db.ensure_season(&season()).unwrap();
        db.insert_team("Olympiacos", &season()).unwrap();
        db.insert_team_stats(&team_row("Olympiacos"), &season())
            .unwrap();
        db.insert_team_stats(&team_row("Olympiacos"), &season())
            .unwrap();
        assert_eq!(db.row_count("team_stats").unwrap(), 2);
    }

    fn player_stats(db: &Database, name: &str, team: &str, role: &str, season: &SeasonId) {
        let row = PlayerSeasonRow {
            profile: PlayerProfile {
                role: Some(role.into()),
                ..profile(name, team)
            },
            stats: vec![("gp".into(), 30.0), ("pts".into(), 12.5)],
        };
        db.insert_player(&row.profile, season).unwrap();
        db.insert_player_stats(&row, season).unwrap();
    }

    #[test]
    fn similarity_candidates_skip_base_row_and_filter_role() {
        let db = test_db();
        let previous = SeasonId::new("2023-24");
        for s in [&season(), &previous] {
            db.ensure_season(s).unwrap();
        }
        db.insert_team("Monaco", &season()).unwrap();
        player_stats(&db, "Mike James", "Monaco", "Guard", &season());
        player_stats(&db, "Mike James", "Monaco", "Guard", &previous);
        player_stats(&db, "Elie Okobo", "Monaco", "Guard", &season());
        player_stats(&db, "Donta Hall", "Monaco", "Center", &season());

        let all = db
            .similarity_candidates("Mike James", "2024-25", None)
            .unwrap();
        let found: Vec<(&str, &str)> = all
            .iter()
            .map(|r| (r["name"].as_str().unwrap(), r["season_id"].as_str().unwrap()))
            .collect();
        assert_eq!(
            found,
            [
                ("Mike James", "2023-24"),
                ("Elie Okobo", "2024-25"),
                ("Donta Hall", "2024-25"),
            ]
        );
        assert_eq!(all[0]["pts"], Value::from(12.5));

        let guards = db
            .similarity_candidates("Mike James", "2024-25", Some("Guard"))
            .unwrap();
        assert_eq!(guards.len(), 2);
        assert!(guards.iter().all(|r| r["role"] == "Guard"));
    }

    #[test]
    fn unknown_stat_column_rejected() {
        let db = test_db();
        db.ensure_season(&season()).unwrap();
        db.insert_team("Olympiacos", &season()).unwrap();
        let row = TeamSeasonRow {
            tm_name: "Olympiacos".into(),
            stats: vec![("pts; DROP TABLE teams".into(), 1.0)],
        };
        let err = db.insert_team_stats(&row, &season()).unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));
    }

    #[test]
    fn non_finite_stats_stored_as_null() {
        let db = test_db();
        db.ensure_season(&season()).unwrap();
        db.insert_team("Olympiacos", &season()).unwrap();
        let row = TeamSeasonRow {
            tm_name: "Olympiacos".into(),
            stats: vec![("net_rtg".into(), f64::NAN)],
        };
        db.insert_team_stats(&row, &season()).unwrap();
        let rows = db
            .team_season_stats(&[("Olympiacos".into(), "2024-25".into())])
            .unwrap();
        assert_eq!(rows[0]["net_rtg"], Value::Null);
    }

    #[test]
    fn player_averages_exclude_low_minutes() {
        let db = test_db();
        db.ensure_season(&season()).unwrap();
        db.insert_team("Monaco", &season()).unwrap();
        for (name, min, pts) in [("A", 20.0, 10.0), ("B", 30.0, 20.0), ("C", 4.0, 90.0)] {
            let row = PlayerSeasonRow {
                profile: profile(name, "Monaco"),
                stats: vec![("min".into(), min), ("pts".into(), pts)],
            };
            db.insert_player(&row.profile, &season()).unwrap();
            db.insert_player_stats(&row, &season()).unwrap();
        }

        let avg = db.player_season_averages("2024-25").unwrap().unwrap();
        assert_eq!(avg["avg_pts"], Value::from(15.0));
        assert_eq!(avg["season_id"], Value::from("2024-25"));
        assert!(db.player_season_averages("1999-00").unwrap().is_none());
    }

    #[test]
    fn season_totals_recomputed_from_game_rows() {
        let db = test_db();
        db.insert_competition(&CompetitionRecord {
            id: "sr:competition:138".into(),
            name: "Euroleague".into(),
        })
        .unwrap();
        db.insert_event_season(
            &EventSeasonRecord {
                id: "sr:season:1".into(),
                name: "Euroleague 24/25".into(),
                year: "24/25".into(),
                start_date: None,
                end_date: None,
            },
            "sr:competition:138",
        )
        .unwrap();
        db.insert_event_team(&EventTeamRecord {
            id: "sr:competitor:1".into(),
            name: "Home".into(),
            country: None,
            country_code: None,
            abbreviation: None,
        })
        .unwrap();
        db.insert_event_player(&EventPlayerRecord {
            id: "sr:player:9".into(),
            name: Some("Nine".into()),
            team_id: "sr:competitor:1".into(),
            season_id: "sr:season:1".into(),
        })
        .unwrap();

        for (event, points) in [("sr:sport_event:1", 12.0), ("sr:sport_event:2", 20.0)] {
            db.insert_sport_event(&SportEventRecord {
                id: event.into(),
                start_time: None,
                status: Some("closed".into()),
                competition_id: Some("sr:competition:138".into()),
                season_id: Some("sr:season:1".into()),
                home_team_id: Some("sr:competitor:1".into()),
                away_team_id: None,
                home_score: None,
                away_score: None,
            })
            .unwrap();
            let counts = PlayerGameCounts {
                points: Some(points),
                ..Default::default()
            };
            db.insert_player_game_stats(event, "sr:player:9", &counts)
                .unwrap();
            db.refresh_season_player_totals("sr:player:9", "sr:season:1")
                .unwrap();
        }

        let conn = db.conn();
        let (points, games): (i64, i64) = conn
            .query_row(
                "SELECT points_total, games_played FROM season_player_totals",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(points, 32);
        assert_eq!(games, 2);
    }
}
