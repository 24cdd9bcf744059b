// Single-game team metrics for the per-game ingestion path.
//
// Unlike the box-score calculator, possessions here are not floored, and
// undefined ratios are NaN rather than zero. AST/TO is undefined when either
// count is zero.

use courtside_core::records::{TeamGameCounts, TeamGameMetrics};

use crate::possessions::raw_possessions;

fn count(value: Option<f64>) -> f64 {
    value.unwrap_or(0.0)
}

fn share(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole
    } else {
        f64::NAN
    }
}

/// Possessions, rebound shares, assist/turnover ratio, and turnover rate for
/// `team` against `opponent`.
pub fn team_game_metrics(team: &TeamGameCounts, opponent: &TeamGameCounts) -> TeamGameMetrics {
    let fga = count(team.two_point_attempts_total) + count(team.three_point_attempts_total);
    let fta = count(team.free_throw_attempts_total);
    let oreb = count(team.offensive_rebounds);
    let dreb = count(team.defensive_rebounds);
    let tov = count(team.turnovers);
    let ast = count(team.assists);

    let possessions = if fga != 0.0 || fta != 0.0 || tov != 0.0 {
        raw_possessions(fga, fta, oreb, tov)
    } else {
        0.0
    };

    let opp_oreb = count(opponent.offensive_rebounds);
    let opp_dreb = count(opponent.defensive_rebounds);

    TeamGameMetrics {
        possessions,
        oreb_pct: share(oreb, oreb + opp_dreb),
        dreb_pct: share(dreb, dreb + opp_oreb),
        ast_to: if ast != 0.0 && tov != 0.0 {
            ast / tov
        } else {
            f64::NAN
        },
        to_pct: if possessions > 0.0 {
            100.0 * tov / possessions
        } else {
            f64::NAN
        },
    }
}
