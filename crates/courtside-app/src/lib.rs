// Library root: upstream HTTP clients and the two load runs (season
// aggregates from files, per-game events from the feed).

pub mod euroleague;
pub mod feed;
pub mod http;
pub mod ingest;
pub mod pipeline;
