// Library root: the advanced statistics engine. Normalization, possession
// estimates, per-row metrics, box score assembly, season dataset batching,
// and similar-player search.

pub mod boxscore;
pub mod dataset;
pub mod metrics;
pub mod normalize;
pub mod possessions;
pub mod similarity;
pub mod team_metrics;
