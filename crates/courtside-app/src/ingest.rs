// Per-game ingestion: walk competitions -> seasons -> paged event summaries
// -> event detail and persist teams, events, team game stats (with derived
// metrics), players, player game stats, and season totals.
//
// An unavailable feed response skips that unit of work. A store failure
// stops the run.

use std::collections::BTreeMap;
use std::time::Duration;

use courtside_core::config::FeedConfig;
use courtside_core::db::{GameStore, StoreError};
use courtside_core::records::{CompetitionRecord, EventPlayerRecord};
use courtside_stats::team_metrics::team_game_metrics;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::feed::{CompetitorStats, EventSummary, GameFeed};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub competitions: usize,
    pub seasons: usize,
    pub events: usize,
    /// Events whose detail carried statistics for both sides.
    pub games_with_stats: usize,
    pub player_lines: usize,
    /// Feed requests that came back unavailable.
    pub unavailable: usize,
}

pub struct GameIngestion<'a, F: GameFeed, S: GameStore> {
    feed: &'a F,
    store: &'a S,
    page_size: u32,
    request_delay: Duration,
}

impl<'a, F: GameFeed, S: GameStore> GameIngestion<'a, F, S> {
    pub fn new(feed: &'a F, store: &'a S, config: &FeedConfig) -> Self {
        Self {
            feed,
            store,
            page_size: config.page_size.max(1),
            request_delay: Duration::from_millis(config.request_delay_ms),
        }
    }

    /// Ingest every competition in `competitions` (display name -> feed id).
    pub async fn run(
        &self,
        competitions: &BTreeMap<String, String>,
    ) -> Result<IngestReport, StoreError> {
        let mut report = IngestReport::default();

        for (name, competition_id) in competitions {
            self.store.insert_competition(&CompetitionRecord {
                id: competition_id.clone(),
                name: name.clone(),
            })?;
            report.competitions += 1;

            let Some(seasons) = self.feed.competition_seasons(competition_id).await else {
                warn!(competition = %name, "seasons unavailable, skipping competition");
                report.unavailable += 1;
                continue;
            };
            info!(competition = %name, seasons = seasons.len(), "ingesting competition");

            for season in &seasons {
                self.store.insert_event_season(season, competition_id)?;
                report.seasons += 1;
                self.ingest_season(&season.id, &mut report).await?;
            }
        }

        info!(
            events = report.events,
            games_with_stats = report.games_with_stats,
            player_lines = report.player_lines,
            unavailable = report.unavailable,
            "game ingestion finished"
        );
        Ok(report)
    }

    async fn ingest_season(&self, season_id: &str, report: &mut IngestReport) -> Result<(), StoreError> {
        let mut offset = 0;
        loop {
            let Some(page) = self
                .feed
                .season_summaries(season_id, self.page_size, offset)
                .await
            else {
                warn!(season = season_id, offset, "summaries unavailable, stopping season");
                report.unavailable += 1;
                return Ok(());
            };
            if page.is_empty() {
                return Ok(());
            }
            debug!(season = season_id, offset, events = page.len(), "summary page");

            for summary in &page {
                self.ingest_event(summary, season_id, report).await?;
            }
            offset += self.page_size;
        }
    }

    async fn ingest_event(
        &self,
        summary: &EventSummary,
        listing_season: &str,
        report: &mut IngestReport,
    ) -> Result<(), StoreError> {
        for competitor in &summary.sport_event.competitors {
            self.store.insert_event_team(&competitor.team)?;
        }
        let event = summary.to_record();
        self.store.insert_sport_event(&event)?;
        report.events += 1;

        tokio::time::sleep(self.request_delay).await;
        let Some(detail) = self.feed.event_summary(&event.id).await else {
            warn!(event = %event.id, "event detail unavailable, skipping");
            report.unavailable += 1;
            return Ok(());
        };
        let Some((home, away)) = detail.head_to_head() else {
            debug!(event = %event.id, "no statistics for both sides");
            return Ok(());
        };

        self.store.insert_team_game_stats(
            &event.id,
            &home.id,
            &home.statistics,
            &team_game_metrics(&home.statistics, &away.statistics),
        )?;
        self.store.insert_team_game_stats(
            &event.id,
            &away.id,
            &away.statistics,
            &team_game_metrics(&away.statistics, &home.statistics),
        )?;
        report.games_with_stats += 1;

        let season_id = event.season_id.as_deref().unwrap_or(listing_season);
        for side in [home, away] {
            report.player_lines += self.ingest_players(&event.id, side, season_id)?;
        }
        Ok(())
    }

    fn ingest_players(
        &self,
        event_id: &str,
        side: &CompetitorStats,
        season_id: &str,
    ) -> Result<usize, StoreError> {
        for player in &side.players {
            self.store.insert_event_player(&EventPlayerRecord {
                id: player.id.clone(),
                name: player.name.clone(),
                team_id: side.id.clone(),
                season_id: season_id.to_string(),
            })?;
            self.store
                .insert_player_game_stats(event_id, &player.id, &player.statistics)?;
            self.store
                .refresh_season_player_totals(&player.id, season_id)?;
        }
        Ok(side.players.len())
    }
}
