// Possession estimate shared by every rating in the engine.
//
//     possessions = FGA + 0.44 * FTA - OREB + TOV

/// Weight applied to free-throw attempts.
pub const FTA_WEIGHT: f64 = 0.44;

/// Lower bound applied by [`estimate_possessions`].
pub const MIN_POSSESSIONS: f64 = 1.0;

/// Unfloored estimate. Can be zero or negative for degenerate rows.
pub fn raw_possessions(fga: f64, fta: f64, oreb: f64, tov: f64) -> f64 {
    fga + FTA_WEIGHT * fta - oreb + tov
}

/// Estimate floored at [`MIN_POSSESSIONS`], so per-possession rates never
/// divide by zero. NaN inputs also yield the floor.
pub fn estimate_possessions(fga: f64, fta: f64, oreb: f64, tov: f64) -> f64 {
    raw_possessions(fga, fta, oreb, tov).max(MIN_POSSESSIONS)
}
