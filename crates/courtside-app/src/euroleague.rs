// Euroleague live API client: the `BoxScoreSource` used by the box score
// command.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use courtside_core::config::BoxScoreConfig;
use courtside_stats::boxscore::{BoxScoreSource, GameRef};
use reqwest::Client;
use serde_json::Value;
use tracing::warn;

use crate::http::{build_client, get_json, with_backoff, RetryPolicy};

pub struct EuroleagueBoxScoreClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl EuroleagueBoxScoreClient {
    pub fn new(config: &BoxScoreConfig, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            http: build_client(Duration::from_secs(config.timeout_secs))?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    fn boxscore_url(&self) -> String {
        format!("{}/Boxscore", self.base_url)
    }
}

fn boxscore_query(game: GameRef) -> Vec<(&'static str, String)> {
    vec![
        ("gamecode", game.game_code.to_string()),
        ("seasoncode", format!("E{}", game.season)),
    ]
}

/// The per-team section of the box score response.
fn stats_section(mut body: Value) -> Option<Value> {
    body.get_mut("Stats").map(Value::take)
}

#[async_trait]
impl BoxScoreSource for EuroleagueBoxScoreClient {
    async fn fetch_stats(&self, game: GameRef) -> Option<Value> {
        let url = self.boxscore_url();
        let query = boxscore_query(game);
        let (http, url, query) = (&self.http, url.as_str(), query.as_slice());

        let body = with_backoff(&self.retry, "boxscore", move || get_json(http, url, query)).await?;
        let stats = stats_section(body);
        if stats.is_none() {
            warn!(%game, "box score response has no Stats section");
        }
        stats
    }
}
