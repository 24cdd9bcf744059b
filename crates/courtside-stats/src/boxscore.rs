// Per-game box score assembly.
//
// Resolves a game-center reference to (season, game code), fetches both
// teams' raw rows through a `BoxScoreSource`, computes advanced metrics for
// every row against the other team's totals, drops players who did not play,
// and lays the result out in the published report column order.

use std::fmt;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::metrics::{compute_raw, AdvancedMetricSet, Metric, RowKind};
use crate::normalize::RawStatRow;

/// Player label given to each team's totals row.
pub const TOTALS_LABEL: &str = "TOTALS";

/// Minutes value marking a player who did not play.
const DID_NOT_PLAY: &str = "DNP";

// ---------------------------------------------------------------------------
// Game reference
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GameRef {
    pub season: u32,
    pub game_code: u32,
}

impl fmt::Display for GameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}/{}", self.season, self.game_code)
    }
}

fn game_reference_re() -> &'static Regex {
    static GAME_REFERENCE_RE: OnceLock<Regex> = OnceLock::new();
    GAME_REFERENCE_RE
        .get_or_init(|| Regex::new(r"/E(\d{4})/(\d{1,3})").expect("valid game reference regex"))
}

/// Extract `(season, game code)` from a game-center URL such as
/// `.../game-center/2023-24/real-madrid-panathinaikos/E2023/333/`.
pub fn parse_game_reference(reference: &str) -> Result<GameRef, BoxScoreError> {
    let malformed = || BoxScoreError::MalformedReference {
        reference: reference.to_string(),
    };
    let caps = game_reference_re().captures(reference).ok_or_else(malformed)?;
    let season = caps[1].parse().map_err(|_| malformed())?;
    let game_code = caps[2].parse().map_err(|_| malformed())?;
    Ok(GameRef { season, game_code })
}

// ---------------------------------------------------------------------------
// Errors and source seam
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum BoxScoreError {
    #[error("cannot parse season and game code from reference: {reference}")]
    MalformedReference { reference: String },

    #[error("box score for {game} unavailable: {reason}")]
    SourceUnavailable { game: GameRef, reason: String },
}

/// Fetches the raw per-team box score payload for one game.
///
/// `None` means the source gave up (retries exhausted, timeout, transport
/// error). The payload is expected to be a list of exactly two team objects.
#[async_trait]
pub trait BoxScoreSource: Send + Sync {
    async fn fetch_stats(&self, game: GameRef) -> Option<Value>;
}

/// One team's section of the raw payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTeamBoxScore {
    #[serde(rename = "Team")]
    pub team: String,
    #[serde(rename = "PlayersStats")]
    pub players: Vec<RawStatRow>,
    #[serde(rename = "totr")]
    pub totals: RawStatRow,
}

// ---------------------------------------------------------------------------
// Report layout
// ---------------------------------------------------------------------------

/// Published column order of the box score report.
pub const REPORT_COLUMNS: [&str; 48] = [
    "Team",
    "TeamCode",
    "Dorsal",
    "Player",
    "IsStarter",
    "MIN",
    "PTS",
    "2PTM",
    "2PTA",
    "2PT%",
    "3PTM",
    "3PTA",
    "3PT%",
    "FGM",
    "FGA",
    "FG%",
    "FTM",
    "FTA",
    "FT%",
    "OR",
    "DR",
    "TR",
    "AST",
    "TO",
    "ST",
    "BLK",
    "BLKA",
    "PF",
    "DF",
    "VAL",
    "+/-",
    "POSS",
    "PPP",
    "ORTG",
    "DRTG",
    "NetRTG",
    "eFG%",
    "TS%",
    "FT Ratio",
    "TO%",
    "AST%",
    "AST/TO",
    "OR%",
    "DR%",
    "TR%",
    "ST%",
    "BLK%",
    "PF per 100 Poss",
];

/// Raw field names feeding each volume column.
fn raw_field(column: &str) -> Option<&'static str> {
    Some(match column {
        "TeamCode" => "Team",
        "Dorsal" => "Dorsal",
        "MIN" => "Minutes",
        "PTS" => "Points",
        "2PTM" => "FieldGoalsMade2",
        "2PTA" => "FieldGoalsAttempted2",
        "3PTM" => "FieldGoalsMade3",
        "3PTA" => "FieldGoalsAttempted3",
        "FTM" => "FreeThrowsMade",
        "FTA" => "FreeThrowsAttempted",
        "OR" => "OffensiveRebounds",
        "DR" => "DefensiveRebounds",
        "TR" => "TotalRebounds",
        "AST" => "Assistances",
        "TO" => "Turnovers",
        "ST" => "Steals",
        "BLK" => "BlocksFavour",
        "BLKA" => "BlocksAgainst",
        "PF" => "FoulsCommited",
        "DF" => "FoulsReceived",
        "VAL" => "Valuation",
        "+/-" => "Plusminus",
        _ => return None,
    })
}

/// Starter flag as a bool. Numbers are true when non-zero and strings when
/// non-empty. A missing or null flag, as on totals rows, reads as true.
fn starter_flag(value: Option<&Value>) -> Value {
    let starter = match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(Value::String(s)) => !s.is_empty(),
        _ => true,
    };
    Value::Bool(starter)
}

/// One published report row: identity, volume stats, and metrics, aligned
/// with [`REPORT_COLUMNS`].
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub kind: RowKind,
    cells: Vec<Value>,
}

impl ReportRow {
    fn build(team: &str, raw: &RawStatRow, kind: RowKind, metrics: &AdvancedMetricSet) -> Self {
        let cells = REPORT_COLUMNS
            .iter()
            .map(|&column| {
                if let Some(metric) = Metric::from_label(column) {
                    return metrics.json_value(metric);
                }
                match column {
                    "Team" => Value::String(team.to_string()),
                    "Player" => match kind {
                        RowKind::TeamTotals => Value::String(TOTALS_LABEL.to_string()),
                        RowKind::Player => raw.get("Player").cloned().unwrap_or(Value::Null),
                    },
                    "IsStarter" => starter_flag(raw.get("IsStarter")),
                    other => raw_field(other)
                        .and_then(|field| raw.get(field).or_else(|| raw.get(other)))
                        .cloned()
                        .unwrap_or(Value::Null),
                }
            })
            .collect();
        Self { kind, cells }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        REPORT_COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|i| &self.cells[i])
    }

    pub fn cells(&self) -> &[Value] {
        &self.cells
    }
}

impl Serialize for ReportRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(REPORT_COLUMNS.len()))?;
        for (column, value) in REPORT_COLUMNS.iter().zip(&self.cells) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// The assembled box score: each team's players who played followed by its
/// totals row, team by team.
#[derive(Debug, Clone)]
pub struct BoxScoreTable {
    pub game: GameRef,
    pub rows: Vec<ReportRow>,
}

impl BoxScoreTable {
    pub fn columns(&self) -> &'static [&'static str] {
        &REPORT_COLUMNS
    }

    /// Records-oriented JSON: an array of objects in column order.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.rows)
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

fn did_not_play(row: &RawStatRow) -> bool {
    matches!(row.get("Minutes"), Some(Value::String(m)) if m.trim().eq_ignore_ascii_case(DID_NOT_PLAY))
}

/// Validate the raw payload shape: exactly two team objects with name,
/// player rows, and a totals row.
pub fn parse_teams(game: GameRef, payload: Value) -> Result<[RawTeamBoxScore; 2], BoxScoreError> {
    let unavailable = |reason: String| BoxScoreError::SourceUnavailable { game, reason };

    let items = match payload {
        Value::Array(items) => items,
        other => return Err(unavailable(format!("expected a list of teams, got {other}"))),
    };
    if items.len() != 2 {
        return Err(unavailable(format!("expected 2 teams, got {}", items.len())));
    }

    let mut teams = Vec::with_capacity(2);
    for item in items {
        let team: RawTeamBoxScore = serde_json::from_value(item)
            .map_err(|e| unavailable(format!("malformed team entry: {e}")))?;
        teams.push(team);
    }
    teams
        .try_into()
        .map_err(|_| unavailable("expected 2 teams".to_string()))
}

/// Pure assembly over two already-fetched teams.
pub fn assemble(game: GameRef, teams: [RawTeamBoxScore; 2]) -> BoxScoreTable {
    let mut rows = Vec::new();
    for (i, team) in teams.iter().enumerate() {
        let opponent = &teams[1 - i].totals;
        let name = team.team.trim().to_uppercase();

        let mut skipped = 0;
        for player in &team.players {
            if did_not_play(player) {
                skipped += 1;
                continue;
            }
            let metrics = compute_raw(player, RowKind::Player, opponent);
            rows.push(ReportRow::build(&name, player, RowKind::Player, &metrics));
        }
        let metrics = compute_raw(&team.totals, RowKind::TeamTotals, opponent);
        rows.push(ReportRow::build(
            &name,
            &team.totals,
            RowKind::TeamTotals,
            &metrics,
        ));
        debug!(%game, team = %name, skipped, "did-not-play rows dropped");
    }
    BoxScoreTable { game, rows }
}

/// Resolves game references and assembles report tables from a source.
pub struct BoxScoreAssembler<S> {
    source: S,
}

impl<S: BoxScoreSource> BoxScoreAssembler<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub async fn build(&self, reference: &str) -> Result<BoxScoreTable, BoxScoreError> {
        let game = parse_game_reference(reference)?;
        let payload = self
            .source
            .fetch_stats(game)
            .await
            .ok_or_else(|| BoxScoreError::SourceUnavailable {
                game,
                reason: "source returned no data".to_string(),
            })?;
        let teams = parse_teams(game, payload)?;
        let table = assemble(game, teams);
        info!(%game, rows = table.rows.len(), "box score assembled");
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const URL: &str = "https://www.euroleaguebasketball.net/es/euroleague/game-center/2023-24/real-madrid-panathinaikos-aktor-athens/E2023/333/";

    fn player(name: &str, minutes: &str, points: u32) -> Value {
        json!({
            "Player_ID": format!("P{name}"),
            "IsStarter": 1.0,
            "IsPlaying": 1.0,
            "Team": "MAD",
            "Dorsal": "7",
            "Player": name,
            "Minutes": minutes,
            "Points": points,
            "FieldGoalsMade2": 2, "FieldGoalsAttempted2": 4,
            "FieldGoalsMade3": 1, "FieldGoalsAttempted3": 3,
            "FreeThrowsMade": 1, "FreeThrowsAttempted": 2,
            "OffensiveRebounds": 1, "DefensiveRebounds": 2, "TotalRebounds": 3,
            "Assistances": 2, "Steals": 1, "Turnovers": 1,
            "BlocksFavour": 0, "BlocksAgainst": 0,
            "FoulsCommited": 2, "FoulsReceived": 1,
            "Valuation": 8, "Plusminus": 4,
        })
    }

    fn dnp(name: &str) -> Value {
        json!({ "Player": name, "Minutes": "DNP", "Points": 0, "IsStarter": 0.0 })
    }

    fn team(name: &str, played: usize, benched: usize) -> Value {
        let mut players: Vec<Value> = (0..played)
            .map(|i| player(&format!("{name} {i}"), "20:00", 10))
            .collect();
        players.extend((0..benched).map(|i| dnp(&format!("{name} bench {i}"))));
        json!({
            "Team": format!(" {name} "),
            "PlayersStats": players,
            "totr": {
                "Minutes": "200:00", "Points": 80,
                "FieldGoalsMade2": 20, "FieldGoalsAttempted2": 40,
                "FieldGoalsMade3": 8, "FieldGoalsAttempted3": 24,
                "FreeThrowsMade": 16, "FreeThrowsAttempted": 20,
                "OffensiveRebounds": 10, "DefensiveRebounds": 24, "TotalRebounds": 34,
                "Assistances": 18, "Steals": 6, "Turnovers": 12,
                "BlocksFavour": 3, "FoulsCommited": 20,
            },
        })
    }

    struct FakeSource(Option<Value>);

    #[async_trait]
    impl BoxScoreSource for FakeSource {
        async fn fetch_stats(&self, _game: GameRef) -> Option<Value> {
            self.0.clone()
        }
    }

    #[test]
    fn parses_game_center_url() {
        let game = parse_game_reference(URL).unwrap();
        assert_eq!(
            game,
            GameRef {
                season: 2023,
                game_code: 333
            }
        );
        assert_eq!(game.to_string(), "E2023/333");
        assert_eq!(parse_game_reference("/E2024/7").unwrap().game_code, 7);
    }

    #[test]
    fn reference_without_game_segment_is_malformed() {
        let input = "https://www.euroleaguebasketball.net/es/euroleague/";
        let err = parse_game_reference(input).unwrap_err();
        assert_eq!(
            err,
            BoxScoreError::MalformedReference {
                reference: input.to_string()
            }
        );
        assert!(err.to_string().contains(input));
        assert!(parse_game_reference("/E23/333").is_err());
    }

    #[tokio::test]
    async fn row_count_is_players_who_played_plus_totals() {
        let payload = json!([team("Real Madrid", 8, 4), team("Panathinaikos", 9, 3)]);
        let assembler = BoxScoreAssembler::new(FakeSource(Some(payload)));
        let table = assembler.build(URL).await.unwrap();

        assert_eq!(table.rows.len(), 8 + 1 + 9 + 1);
        let totals: Vec<_> = table
            .rows
            .iter()
            .filter(|r| r.kind == RowKind::TeamTotals)
            .collect();
        assert_eq!(totals.len(), 2);
        assert_eq!(table.rows[8].get("Player"), Some(&json!("TOTALS")));
        assert_eq!(table.rows[0].get("Team"), Some(&json!("REAL MADRID")));
        assert_eq!(table.rows[18].get("Team"), Some(&json!("PANATHINAIKOS")));
        assert!(table
            .rows
            .iter()
            .all(|r| r.get("MIN") != Some(&json!("DNP"))));
    }

    #[tokio::test]
    async fn defensive_ratings_only_on_totals_rows() {
        let payload = json!([team("A", 2, 0), team("B", 2, 0)]);
        let table = BoxScoreAssembler::new(FakeSource(Some(payload)))
            .build(URL)
            .await
            .unwrap();

        for row in &table.rows {
            let drtg = row.get("DRTG").unwrap();
            match row.kind {
                RowKind::Player => assert!(drtg.is_null()),
                RowKind::TeamTotals => assert!(drtg.is_f64()),
            }
            assert_eq!(row.cells().len(), REPORT_COLUMNS.len());
        }
    }

    #[tokio::test]
    async fn report_cells_are_renamed_and_typed() {
        let payload = json!([team("A", 1, 0), team("B", 1, 0)]);
        let table = BoxScoreAssembler::new(FakeSource(Some(payload)))
            .build(URL)
            .await
            .unwrap();

        let first = &table.rows[0];
        assert_eq!(first.get("TeamCode"), Some(&json!("MAD")));
        assert_eq!(first.get("PTS"), Some(&json!(10)));
        assert_eq!(first.get("2PTA"), Some(&json!(4)));
        assert_eq!(first.get("IsStarter"), Some(&json!(true)));
        assert_eq!(table.rows[1].get("IsStarter"), Some(&json!(true)));
        assert_eq!(first.get("FGA"), Some(&json!(7.0)));
        assert!(first.get("PlayerID").is_none());

        let json: Value = serde_json::from_str(&table.to_json().unwrap()).unwrap();
        let keys: Vec<&String> = json[0].as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 48);
        assert_eq!(table.columns()[..5], ["Team", "TeamCode", "Dorsal", "Player", "IsStarter"]);
        assert_eq!(table.columns()[47], "PF per 100 Poss");
    }

    #[test]
    fn starter_flag_coercion() {
        assert_eq!(starter_flag(Some(&json!(0.0))), json!(false));
        assert_eq!(starter_flag(Some(&json!(1))), json!(true));
        assert_eq!(starter_flag(Some(&json!(false))), json!(false));
        assert_eq!(starter_flag(Some(&json!(""))), json!(false));
        assert_eq!(starter_flag(Some(&Value::Null)), json!(true));
        assert_eq!(starter_flag(None), json!(true));
    }

    #[tokio::test]
    async fn wrong_team_count_is_source_unavailable() {
        let payload = json!([team("A", 5, 0)]);
        let err = BoxScoreAssembler::new(FakeSource(Some(payload)))
            .build(URL)
            .await
            .unwrap_err();
        assert!(matches!(err, BoxScoreError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn missing_totals_key_is_source_unavailable() {
        let payload = json!([
            team("A", 5, 0),
            { "Team": "B", "PlayersStats": [] },
        ]);
        let err = BoxScoreAssembler::new(FakeSource(Some(payload)))
            .build(URL)
            .await
            .unwrap_err();
        assert!(matches!(err, BoxScoreError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn empty_source_is_source_unavailable() {
        let err = BoxScoreAssembler::new(FakeSource(None))
            .build(URL)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BoxScoreError::SourceUnavailable {
                game: GameRef {
                    season: 2023,
                    game_code: 333
                },
                reason: "source returned no data".into(),
            }
        );
    }
}
