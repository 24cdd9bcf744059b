// Season-aggregate load.
//
// One run moves through `Start -> SeasonsEnsured -> (TeamsInserted ->
// TeamStatsInserted) -> (PlayersInserted -> PlayerStatsInserted) -> Done`.
// Each dataset is read into an immutable `LoadBatch` first and only then
// persisted, parents before stats. The first failed insert stops that
// dataset; rows already written stay written and later datasets still run.
//
// Stats rows are appended unconditionally: running the same dataset twice
// duplicates its stats rows. Callers must load each dataset at most once.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use courtside_core::config::Config;
use courtside_core::db::{SeasonStore, StoreError};
use courtside_core::records::{DatasetKind, SeasonId};
use courtside_stats::dataset::{
    load_dataset, BatchRows, DatasetError, DatasetKey, ImpactFilter, LoadBatch,
};
use courtside_stats::normalize::NormalizeError;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// Stages and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadStage {
    Start,
    SeasonsEnsured,
    TeamsInserted,
    TeamStatsInserted,
    PlayersInserted,
    PlayerStatsInserted,
    Done,
}

impl LoadStage {
    /// Stage reached once every parent row of a `kind` dataset is written.
    pub fn parents_done(kind: DatasetKind) -> Self {
        match kind {
            DatasetKind::Teams => LoadStage::TeamsInserted,
            DatasetKind::Players => LoadStage::PlayersInserted,
        }
    }

    /// Stage reached once every stats row of a `kind` dataset is written.
    pub fn stats_done(kind: DatasetKind) -> Self {
        match kind {
            DatasetKind::Teams => LoadStage::TeamStatsInserted,
            DatasetKind::Players => LoadStage::PlayerStatsInserted,
        }
    }
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadStage::Start => "start",
            LoadStage::SeasonsEnsured => "seasons ensured",
            LoadStage::TeamsInserted => "teams inserted",
            LoadStage::TeamStatsInserted => "team stats inserted",
            LoadStage::PlayersInserted => "players inserted",
            LoadStage::PlayerStatsInserted => "player stats inserted",
            LoadStage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum LoadFailure {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A dataset that stopped part-way. `stage` is the last stage completed;
/// `row_index` is the batch row being written (or the source row that failed
/// validation).
#[derive(Debug, Error)]
#[error("dataset `{dataset}` failed after stage `{stage}`{}: {source}", row_suffix(.row_index))]
pub struct LoadError {
    pub dataset: String,
    pub stage: LoadStage,
    pub row_index: Option<usize>,
    #[source]
    pub source: LoadFailure,
}

fn row_suffix(row_index: &Option<usize>) -> String {
    row_index.map(|i| format!(" at row {i}")).unwrap_or_default()
}

impl LoadError {
    /// True when a stats or parent row pointed at a parent that was never
    /// written.
    pub fn is_referential(&self) -> bool {
        matches!(&self.source, LoadFailure::Store(e) if e.is_referential())
    }
}

// ---------------------------------------------------------------------------
// Inputs and report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSource {
    pub key: DatasetKey,
    pub path: PathBuf,
}

/// Dataset sources named in `[[season_load.datasets]]`, paths resolved
/// against the base directory.
pub fn datasets_from_config(config: &Config) -> Result<Vec<DatasetSource>, DatasetError> {
    config
        .season_load
        .datasets
        .iter()
        .map(|d| {
            Ok(DatasetSource {
                key: DatasetKey::parse(&d.key)?,
                path: config.resolve_path(&d.path),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadSummary {
    pub dataset: String,
    pub season: SeasonId,
    pub kind: DatasetKind,
    /// Stats rows written.
    pub rows: usize,
    /// Parent rows that did not exist before this dataset.
    pub new_parents: usize,
    pub filtered_out: usize,
    pub dropped_columns: Vec<String>,
}

#[derive(Debug)]
pub enum DatasetOutcome {
    Loaded(LoadSummary),
    Skipped { dataset: String, path: PathBuf },
    Failed(LoadError),
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub seasons: Vec<SeasonId>,
    pub outcomes: Vec<DatasetOutcome>,
}

impl LoadReport {
    pub fn loaded(&self) -> impl Iterator<Item = &LoadSummary> {
        self.outcomes.iter().filter_map(|o| match o {
            DatasetOutcome::Loaded(s) => Some(s),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &LoadError> {
        self.outcomes.iter().filter_map(|o| match o {
            DatasetOutcome::Failed(e) => Some(e),
            _ => None,
        })
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DatasetOutcome::Skipped { .. }))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct SeasonLoadPipeline<'a, S: SeasonStore> {
    store: &'a S,
    filter: ImpactFilter,
    seasons: Vec<SeasonId>,
}

impl<'a, S: SeasonStore> SeasonLoadPipeline<'a, S> {
    pub fn new(store: &'a S, filter: ImpactFilter) -> Self {
        Self {
            store,
            filter,
            seasons: Vec::new(),
        }
    }

    /// Seasons to ensure even when no dataset names them.
    pub fn with_seasons(mut self, seasons: impl IntoIterator<Item = SeasonId>) -> Self {
        self.seasons.extend(seasons);
        self
    }

    pub fn ensure_seasons<'s>(
        &self,
        seasons: impl IntoIterator<Item = &'s SeasonId>,
    ) -> Result<(), StoreError> {
        for season in seasons {
            self.store.ensure_season(season)?;
        }
        Ok(())
    }

    /// Write one batch: every parent row, then every stats row.
    pub fn persist_batch(&self, batch: &LoadBatch) -> Result<LoadSummary, LoadError> {
        let dataset = batch.key().to_string();
        let season = batch.season();
        let kind = batch.key().kind;

        let fail = |stage: LoadStage, row: usize, e: StoreError| LoadError {
            dataset: dataset.clone(),
            stage,
            row_index: Some(row),
            source: e.into(),
        };

        let mut new_parents = 0;
        match batch.rows() {
            BatchRows::Teams(rows) => {
                for (i, row) in rows.iter().enumerate() {
                    let created = self
                        .store
                        .insert_team(&row.tm_name, season)
                        .map_err(|e| fail(LoadStage::SeasonsEnsured, i, e))?;
                    new_parents += usize::from(created);
                }
                for (i, row) in rows.iter().enumerate() {
                    self.store
                        .insert_team_stats(row, season)
                        .map_err(|e| fail(LoadStage::parents_done(kind), i, e))?;
                }
            }
            BatchRows::Players(rows) => {
                for (i, row) in rows.iter().enumerate() {
                    let created = self
                        .store
                        .insert_player(&row.profile, season)
                        .map_err(|e| fail(LoadStage::SeasonsEnsured, i, e))?;
                    new_parents += usize::from(created);
                }
                for (i, row) in rows.iter().enumerate() {
                    self.store
                        .insert_player_stats(row, season)
                        .map_err(|e| fail(LoadStage::parents_done(kind), i, e))?;
                }
            }
        }

        debug!(dataset = %dataset, stage = %LoadStage::stats_done(kind), "batch persisted");
        Ok(LoadSummary {
            dataset,
            season: season.clone(),
            kind,
            rows: batch.len(),
            new_parents,
            filtered_out: batch.filtered_out(),
            dropped_columns: batch.dropped_columns().to_vec(),
        })
    }

    /// Load every source. Team datasets run before player datasets; missing
    /// files are skipped. Only a failure to ensure the seasons aborts the run.
    pub fn run(&self, sources: &[DatasetSource]) -> Result<LoadReport, StoreError> {
        let seasons: BTreeSet<SeasonId> = self
            .seasons
            .iter()
            .cloned()
            .chain(sources.iter().map(|s| s.key.season.clone()))
            .collect();
        self.ensure_seasons(&seasons)?;
        info!(count = seasons.len(), "seasons ensured");

        let mut ordered: Vec<&DatasetSource> = sources.iter().collect();
        ordered.sort_by_key(|s| s.key.kind);

        let mut report = LoadReport {
            seasons: seasons.into_iter().collect(),
            outcomes: Vec::with_capacity(ordered.len()),
        };

        for source in ordered {
            let outcome = self.load_one(source);
            match &outcome {
                DatasetOutcome::Loaded(s) => info!(
                    dataset = %s.dataset,
                    rows = s.rows,
                    new_parents = s.new_parents,
                    filtered_out = s.filtered_out,
                    "dataset loaded"
                ),
                DatasetOutcome::Skipped { dataset, path } => {
                    warn!(dataset = %dataset, path = %path.display(), "dataset file not found, skipping")
                }
                DatasetOutcome::Failed(e) => error!("{}", e),
            }
            report.outcomes.push(outcome);
        }

        info!(
            loaded = report.loaded().count(),
            skipped = report.skipped(),
            failed = report.failures().count(),
            "season load finished"
        );
        Ok(report)
    }

    fn load_one(&self, source: &DatasetSource) -> DatasetOutcome {
        let dataset = source.key.to_string();
        if !source.path.exists() {
            return DatasetOutcome::Skipped {
                dataset,
                path: source.path.clone(),
            };
        }

        let batch = match load_dataset(source.key.clone(), &source.path, &self.filter) {
            Ok(batch) => batch,
            Err(e) => {
                let row_index = match &e {
                    DatasetError::Normalize(NormalizeError::Validation { row, .. }) => Some(*row),
                    _ => None,
                };
                return DatasetOutcome::Failed(LoadError {
                    dataset,
                    stage: LoadStage::SeasonsEnsured,
                    row_index,
                    source: e.into(),
                });
            }
        };

        match self.persist_batch(&batch) {
            Ok(summary) => DatasetOutcome::Loaded(summary),
            Err(e) => DatasetOutcome::Failed(e),
        }
    }
}
