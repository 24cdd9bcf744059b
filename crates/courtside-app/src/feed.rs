// Per-game feed: competitions -> seasons -> event summaries -> event detail.
//
// `GameFeed` is the seam the ingestion run talks to; `FeedClient` is the HTTP
// implementation. Payload types decode only the fields the ingestion stores.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courtside_core::config::FeedConfig;
use courtside_core::records::{
    EventSeasonRecord, EventTeamRecord, PlayerGameCounts, SportEventRecord, TeamGameCounts,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::http::{build_client, get_json, with_backoff, RetryPolicy};

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct SeasonsPayload {
    #[serde(default)]
    seasons: Vec<EventSeasonRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct SummariesPayload {
    #[serde(default)]
    summaries: Vec<EventSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventContext {
    #[serde(default)]
    pub competition: Option<IdRef>,
    #[serde(default)]
    pub season: Option<IdRef>,
}

/// A team taking part in an event. `qualifier` is `home` or `away`.
#[derive(Debug, Clone, Deserialize)]
pub struct Competitor {
    #[serde(flatten)]
    pub team: EventTeamRecord,
    #[serde(default)]
    pub qualifier: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SportEvent {
    pub id: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub sport_event_context: EventContext,
    #[serde(default)]
    pub competitors: Vec<Competitor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventStatus {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub home_score: Option<i64>,
    #[serde(default)]
    pub away_score: Option<i64>,
}

/// One entry of a season's summary listing.
#[derive(Debug, Clone, Deserialize)]
pub struct EventSummary {
    pub sport_event: SportEvent,
    #[serde(default)]
    pub sport_event_status: EventStatus,
}

impl EventSummary {
    fn competitor_id(&self, qualifier: &str) -> Option<String> {
        self.sport_event
            .competitors
            .iter()
            .find(|c| c.qualifier.as_deref() == Some(qualifier))
            .map(|c| c.team.id.clone())
    }

    /// The event row: home/away by qualifier, unparseable start times dropped.
    pub fn to_record(&self) -> SportEventRecord {
        let event = &self.sport_event;
        SportEventRecord {
            id: event.id.clone(),
            start_time: event.start_time.as_deref().and_then(parse_start_time),
            status: self.sport_event_status.status.clone(),
            competition_id: event
                .sport_event_context
                .competition
                .as_ref()
                .map(|c| c.id.clone()),
            season_id: event.sport_event_context.season.as_ref().map(|s| s.id.clone()),
            home_team_id: self.competitor_id("home"),
            away_team_id: self.competitor_id("away"),
            home_score: self.sport_event_status.home_score,
            away_score: self.sport_event_status.away_score,
        }
    }
}

fn parse_start_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerLine {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub statistics: PlayerGameCounts,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompetitorStats {
    pub id: String,
    #[serde(default)]
    pub statistics: TeamGameCounts,
    #[serde(default)]
    pub players: Vec<PlayerLine>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatTotals {
    #[serde(default)]
    pub competitors: Vec<CompetitorStats>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventStatistics {
    #[serde(default)]
    pub totals: StatTotals,
}

/// Detailed summary of one event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventDetail {
    #[serde(default)]
    pub statistics: Option<EventStatistics>,
}

impl EventDetail {
    /// Both sides' statistics, when the feed reports exactly two.
    pub fn head_to_head(&self) -> Option<(&CompetitorStats, &CompetitorStats)> {
        match self.statistics.as_ref()?.totals.competitors.as_slice() {
            [home, away] => Some((home, away)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Feed seam
// ---------------------------------------------------------------------------

/// `None` from any method means the feed is unavailable for that request.
#[async_trait]
pub trait GameFeed: Send + Sync {
    async fn competition_seasons(&self, competition_id: &str) -> Option<Vec<EventSeasonRecord>>;

    async fn season_summaries(
        &self,
        season_id: &str,
        limit: u32,
        offset: u32,
    ) -> Option<Vec<EventSummary>>;

    async fn event_summary(&self, event_id: &str) -> Option<EventDetail>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

pub struct FeedClient {
    http: Client,
    base_url: String,
    locale: String,
    api_key: String,
    retry: RetryPolicy,
}

impl FeedClient {
    pub fn new(config: &FeedConfig, api_key: String, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            http: build_client(Duration::from_secs(config.timeout_secs))?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            locale: config.locale.clone(),
            api_key,
            retry,
        })
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.locale, endpoint)
    }

    async fn fetch<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, String)]) -> Option<T> {
        let url = self.endpoint_url(endpoint);
        let mut query = vec![("api_key", self.api_key.clone())];
        query.extend(params.iter().cloned());
        let (http, url_ref, query_ref) = (&self.http, url.as_str(), query.as_slice());

        let body = with_backoff(&self.retry, endpoint, move || get_json(http, url_ref, query_ref)).await?;
        decode(endpoint, body)
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: Value) -> Option<T> {
    match serde_json::from_value(body) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(endpoint, error = %e, "unexpected feed payload");
            None
        }
    }
}

#[async_trait]
impl GameFeed for FeedClient {
    async fn competition_seasons(&self, competition_id: &str) -> Option<Vec<EventSeasonRecord>> {
        let endpoint = format!("competitions/{competition_id}/seasons");
        self.fetch::<SeasonsPayload>(&endpoint, &[])
            .await
            .map(|p| p.seasons)
    }

    async fn season_summaries(
        &self,
        season_id: &str,
        limit: u32,
        offset: u32,
    ) -> Option<Vec<EventSummary>> {
        let endpoint = format!("seasons/{season_id}/summaries");
        let params = [("limit", limit.to_string()), ("offset", offset.to_string())];
        self.fetch::<SummariesPayload>(&endpoint, &params)
            .await
            .map(|p| p.summaries)
    }

    async fn event_summary(&self, event_id: &str) -> Option<EventDetail> {
        let endpoint = format!("sport_events/{event_id}/summary");
        self.fetch::<EventDetail>(&endpoint, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary_json() -> Value {
        json!({
            "sport_event": {
                "id": "sr:sport_event:1",
                "start_time": "2024-10-03T18:00:00+00:00",
                "sport_event_context": {
                    "competition": { "id": "sr:competition:138", "name": "Euroleague" },
                    "season": { "id": "sr:season:2024" }
                },
                "competitors": [
                    { "id": "sr:competitor:1", "name": "Real Madrid", "country": "Spain",
                      "country_code": "ESP", "abbreviation": "RMB", "qualifier": "home" },
                    { "id": "sr:competitor:2", "name": "Olympiacos", "qualifier": "away" }
                ]
            },
            "sport_event_status": { "status": "closed", "home_score": 86, "away_score": 79 }
        })
    }

    #[test]
    fn summary_maps_to_event_record() {
        let summary: EventSummary = serde_json::from_value(summary_json()).unwrap();
        let record = summary.to_record();

        assert_eq!(record.id, "sr:sport_event:1");
        assert_eq!(record.home_team_id.as_deref(), Some("sr:competitor:1"));
        assert_eq!(record.away_team_id.as_deref(), Some("sr:competitor:2"));
        assert_eq!(record.competition_id.as_deref(), Some("sr:competition:138"));
        assert_eq!(record.season_id.as_deref(), Some("sr:season:2024"));
        assert_eq!(record.home_score, Some(86));
        assert_eq!(record.status.as_deref(), Some("closed"));
        assert!(record.start_time.is_some());

        let home = &summary.sport_event.competitors[0].team;
        assert_eq!(home.abbreviation.as_deref(), Some("RMB"));
    }

    #[test]
    fn bad_start_time_is_dropped() {
        let mut raw = summary_json();
        raw["sport_event"]["start_time"] = json!("tomorrow");
        let summary: EventSummary = serde_json::from_value(raw).unwrap();
        assert!(summary.to_record().start_time.is_none());
    }

    #[test]
    fn head_to_head_requires_two_competitors() {
        let detail: EventDetail = serde_json::from_value(json!({
            "statistics": { "totals": { "competitors": [
                { "id": "a", "statistics": { "assists": 20 }, "players": [] },
                { "id": "b", "statistics": { "assists": 15 } }
            ]}}
        }))
        .unwrap();
        let (home, away) = detail.head_to_head().unwrap();
        assert_eq!(home.statistics.assists, Some(20.0));
        assert_eq!(away.id, "b");

        let lonely: EventDetail = serde_json::from_value(json!({
            "statistics": { "totals": { "competitors": [{ "id": "a" }] } }
        }))
        .unwrap();
        assert!(lonely.head_to_head().is_none());
        assert!(EventDetail::default().head_to_head().is_none());
    }

    #[test]
    fn decode_rejects_unexpected_shape() {
        assert!(decode::<EventSummary>("x", json!({ "nope": 1 })).is_none());
    }

    #[test]
    fn endpoint_urls_include_locale() {
        let client = FeedClient::new(
            &FeedConfig {
                base_url: "https://api.example.test/basketball/v2/".into(),
                locale: "en".into(),
                timeout_secs: 5,
                page_size: 200,
                request_delay_ms: 0,
                competitions: Default::default(),
            },
            "key".into(),
            RetryPolicy {
                max_attempts: 1,
                initial_backoff: Duration::from_millis(1),
            },
        )
        .unwrap();
        assert_eq!(
            client.endpoint_url("sport_events/sr:sport_event:1/summary"),
            "https://api.example.test/basketball/v2/en/sport_events/sr:sport_event:1/summary"
        );
    }
}
