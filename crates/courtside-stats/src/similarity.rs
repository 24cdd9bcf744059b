// Similar-player search over season stats rows.
//
// Every numeric column the base player has a value for becomes a feature.
// Features are z-scored across the base row and all candidates, optionally
// weighted, and candidates are ranked by cosine similarity to the base row.

use std::collections::BTreeMap;

use courtside_core::db::ReportRow;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Identity and record columns that never count as features.
pub const EXCLUDED_COLUMNS: &[&str] = &[
    "id",
    "name",
    "tm_name",
    "season_id",
    "nat",
    "gp",
    "w",
    "l",
    "w_pct",
];

/// Number of matches returned when the caller does not ask for a limit.
pub const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Error, PartialEq)]
pub enum SimilarityError {
    #[error("no players to compare against")]
    NoCandidates,

    #[error("base player has no numeric stats to compare")]
    NoFeatures,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SimilarPlayer {
    pub name: String,
    pub season_id: String,
    pub team_name: Option<String>,
    /// Cosine similarity scaled to -100..=100, two decimals.
    pub similarity_score: f64,
}

/// Per-feature weights; features not listed weigh 1.0.
pub type FeatureWeights = BTreeMap<String, f64>;

/// Feature columns for `base`: numeric, present, and not excluded.
pub fn feature_columns(base: &ReportRow) -> Vec<&str> {
    base.iter()
        .filter(|(column, value)| {
            value.is_number() && !EXCLUDED_COLUMNS.contains(&column.as_str())
        })
        .map(|(column, _)| column.as_str())
        .collect()
}

/// Z-score each column in place. Missing cells take the column mean (0 after
/// scaling); a constant column scales to all zeros.
fn standardize(matrix: &mut [Vec<f64>], width: usize) {
    for j in 0..width {
        let present: Vec<f64> = matrix
            .iter()
            .map(|r| r[j])
            .filter(|v| v.is_finite())
            .collect();
        if present.is_empty() {
            matrix.iter_mut().for_each(|r| r[j] = 0.0);
            continue;
        }
        let n = present.len() as f64;
        let mean = present.iter().sum::<f64>() / n;
        let var = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let sd = if var > 0.0 { var.sqrt() } else { 1.0 };
        for row in matrix.iter_mut() {
            row[j] = if row[j].is_finite() {
                (row[j] - mean) / sd
            } else {
                0.0
            };
        }
    }
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm = norm_a * norm_b;
    if norm > 0.0 {
        dot / norm
    } else {
        0.0
    }
}

fn text(row: &ReportRow, column: &str) -> Option<String> {
    row.get(column).and_then(Value::as_str).map(str::to_string)
}

/// Rank `candidates` by similarity to `base`, best first, keeping `limit`.
pub fn rank_similar(
    base: &ReportRow,
    candidates: &[ReportRow],
    weights: &FeatureWeights,
    limit: usize,
) -> Result<Vec<SimilarPlayer>, SimilarityError> {
    if candidates.is_empty() {
        return Err(SimilarityError::NoCandidates);
    }
    let features = feature_columns(base);
    if features.is_empty() {
        return Err(SimilarityError::NoFeatures);
    }
    debug!(
        features = features.len(),
        candidates = candidates.len(),
        "ranking similar players"
    );

    let mut matrix: Vec<Vec<f64>> = std::iter::once(base)
        .chain(candidates)
        .map(|row| {
            features
                .iter()
                .map(|f| row.get(*f).and_then(Value::as_f64).unwrap_or(f64::NAN))
                .collect()
        })
        .collect();
    standardize(&mut matrix, features.len());

    for row in matrix.iter_mut() {
        for (cell, feature) in row.iter_mut().zip(&features) {
            *cell *= weights.get(*feature).copied().unwrap_or(1.0);
        }
    }

    let (base_vec, rest) = matrix.split_first().ok_or(SimilarityError::NoCandidates)?;
    let mut ranked: Vec<SimilarPlayer> = rest
        .iter()
        .zip(candidates)
        .map(|(vec, row)| SimilarPlayer {
            name: text(row, "name").unwrap_or_default(),
            season_id: text(row, "season_id").unwrap_or_default(),
            team_name: text(row, "tm_name"),
            similarity_score: (cosine(base_vec, vec) * 10_000.0).round() / 100.0,
        })
        .collect();

    ranked.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
    ranked.truncate(limit);
    Ok(ranked)
}
