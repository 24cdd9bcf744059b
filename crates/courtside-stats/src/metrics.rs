// Advanced metrics calculator.
//
// Derives shooting splits, per-possession ratings, and rate stats for one
// box-score row given the opposing team's totals. Pure: no I/O, no shared
// state, and the same inputs always give bit-identical outputs.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::normalize::{is_missing, parse_number, RawStatRow};
use crate::possessions::estimate_possessions;

// ---------------------------------------------------------------------------
// Metric keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    TwoPtPct,
    ThreePtPct,
    Fgm,
    Fga,
    FgPct,
    FtPct,
    Poss,
    Ppp,
    Ortg,
    Drtg,
    NetRtg,
    EfgPct,
    TsPct,
    FtRatio,
    ToPct,
    AstPct,
    AstTo,
    OrPct,
    DrPct,
    TrPct,
    StPct,
    BlkPct,
    PfPer100,
}

impl Metric {
    pub const ALL: [Metric; 23] = [
        Metric::TwoPtPct,
        Metric::ThreePtPct,
        Metric::Fgm,
        Metric::Fga,
        Metric::FgPct,
        Metric::FtPct,
        Metric::Poss,
        Metric::Ppp,
        Metric::Ortg,
        Metric::Drtg,
        Metric::NetRtg,
        Metric::EfgPct,
        Metric::TsPct,
        Metric::FtRatio,
        Metric::ToPct,
        Metric::AstPct,
        Metric::AstTo,
        Metric::OrPct,
        Metric::DrPct,
        Metric::TrPct,
        Metric::StPct,
        Metric::BlkPct,
        Metric::PfPer100,
    ];

    /// Column label used in box-score reports.
    pub fn label(self) -> &'static str {
        match self {
            Metric::TwoPtPct => "2PT%",
            Metric::ThreePtPct => "3PT%",
            Metric::Fgm => "FGM",
            Metric::Fga => "FGA",
            Metric::FgPct => "FG%",
            Metric::FtPct => "FT%",
            Metric::Poss => "POSS",
            Metric::Ppp => "PPP",
            Metric::Ortg => "ORTG",
            Metric::Drtg => "DRTG",
            Metric::NetRtg => "NetRTG",
            Metric::EfgPct => "eFG%",
            Metric::TsPct => "TS%",
            Metric::FtRatio => "FT Ratio",
            Metric::ToPct => "TO%",
            Metric::AstPct => "AST%",
            Metric::AstTo => "AST/TO",
            Metric::OrPct => "OR%",
            Metric::DrPct => "DR%",
            Metric::TrPct => "TR%",
            Metric::StPct => "ST%",
            Metric::BlkPct => "BLK%",
            Metric::PfPer100 => "PF per 100 Poss",
        }
    }

    pub fn from_label(label: &str) -> Option<Metric> {
        Metric::ALL.into_iter().find(|m| m.label() == label)
    }
}

/// Which kind of box-score row is being evaluated. Defensive ratings only
/// exist for team totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Player,
    TeamTotals,
}

// ---------------------------------------------------------------------------
// Metric set
// ---------------------------------------------------------------------------

/// The full set of advanced metrics for one row. Every key is always
/// present; NaN marks an undefined value.
#[derive(Debug, Clone, Copy)]
pub struct AdvancedMetricSet {
    values: [f64; 23],
}

impl AdvancedMetricSet {
    /// Every metric undefined.
    pub fn undefined() -> Self {
        Self {
            values: [f64::NAN; 23],
        }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        self.values[metric as usize]
    }

    fn set(&mut self, metric: Metric, value: f64) {
        self.values[metric as usize] = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL.into_iter().map(move |m| (m, self.get(m)))
    }

    /// True when every metric is NaN.
    pub fn is_undefined(&self) -> bool {
        self.values.iter().all(|v| v.is_nan())
    }

    /// JSON value for one metric; NaN becomes null.
    pub fn json_value(&self, metric: Metric) -> Value {
        serde_json::Number::from_f64(self.get(metric))
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

impl Serialize for AdvancedMetricSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Metric::ALL.len()))?;
        for (metric, _) in self.iter() {
            map.serialize_entry(metric.label(), &self.json_value(metric))?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Stat line
// ---------------------------------------------------------------------------

/// Counting stats needed by the calculator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatLine {
    pub pts: f64,
    pub fgm2: f64,
    pub fga2: f64,
    pub fgm3: f64,
    pub fga3: f64,
    pub ftm: f64,
    pub fta: f64,
    pub oreb: f64,
    pub dreb: f64,
    pub treb: f64,
    pub ast: f64,
    pub tov: f64,
    pub stl: f64,
    pub blk: f64,
    pub pf: f64,
}

/// Accepted field names per stat: raw feed name first, then report names.
/// Index order matches [`StatLine::slot`].
const FIELD_ALIASES: [&[&str]; 15] = [
    &["Points", "PTS"],
    &["FieldGoalsMade2", "2PTM"],
    &["FieldGoalsAttempted2", "2PTA"],
    &["FieldGoalsMade3", "3PTM"],
    &["FieldGoalsAttempted3", "3PTA"],
    &["FreeThrowsMade", "FTM"],
    &["FreeThrowsAttempted", "FTA"],
    &["OffensiveRebounds", "OR", "OREB"],
    &["DefensiveRebounds", "DR", "DREB"],
    &["TotalRebounds", "TR", "TREB"],
    &["Assistances", "AST"],
    &["Turnovers", "TO", "TOV"],
    &["Steals", "ST", "STL"],
    &["BlocksFavour", "BLK"],
    &["FoulsCommited", "PF"],
];

/// A present field whose value is not numeric.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionFailure {
    pub field: String,
}

impl StatLine {
    /// Extraction from a raw row. Absent fields and "no data" markers count
    /// as 0; any other value that does not parse as a number fails the whole
    /// line.
    pub fn from_row(row: &RawStatRow) -> Result<StatLine, CoercionFailure> {
        let mut line = StatLine::default();
        for (index, aliases) in FIELD_ALIASES.iter().enumerate() {
            let found = aliases
                .iter()
                .find_map(|name| row.get(*name).map(|v| (*name, v)));
            let Some((name, value)) = found else {
                continue;
            };
            if is_missing(value) {
                continue;
            }
            *line.slot(index) = parse_number(value).ok_or_else(|| CoercionFailure {
                field: name.to_string(),
            })?;
        }
        Ok(line)
    }

    fn slot(&mut self, index: usize) -> &mut f64 {
        match index {
            0 => &mut self.pts,
            1 => &mut self.fgm2,
            2 => &mut self.fga2,
            3 => &mut self.fgm3,
            4 => &mut self.fga3,
            5 => &mut self.ftm,
            6 => &mut self.fta,
            7 => &mut self.oreb,
            8 => &mut self.dreb,
            9 => &mut self.treb,
            10 => &mut self.ast,
            11 => &mut self.tov,
            12 => &mut self.stl,
            13 => &mut self.blk,
            _ => &mut self.pf,
        }
    }

    pub fn fga(&self) -> f64 {
        self.fga2 + self.fga3
    }

    pub fn fgm(&self) -> f64 {
        self.fgm2 + self.fgm3
    }

    pub fn possessions(&self) -> f64 {
        estimate_possessions(self.fga(), self.fta, self.oreb, self.tov)
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// n / d, or 0.0 when the denominator is zero.
fn ratio_or_zero(n: f64, d: f64) -> f64 {
    if d != 0.0 {
        n / d
    } else {
        0.0
    }
}

/// Compute every metric for `subject` against `opponent` totals.
pub fn compute(subject: &StatLine, kind: RowKind, opponent: &StatLine) -> AdvancedMetricSet {
    let mut out = AdvancedMetricSet::undefined();

    let fga = subject.fga();
    let fgm = subject.fgm();
    let poss = subject.possessions();

    out.set(Metric::TwoPtPct, ratio_or_zero(subject.fgm2, subject.fga2));
    out.set(Metric::ThreePtPct, ratio_or_zero(subject.fgm3, subject.fga3));
    out.set(Metric::Fgm, fgm);
    out.set(Metric::Fga, fga);
    out.set(Metric::FgPct, ratio_or_zero(fgm, fga));
    out.set(Metric::FtPct, ratio_or_zero(subject.ftm, subject.fta));

    out.set(Metric::Poss, poss);
    out.set(Metric::Ppp, subject.pts / poss);
    let ortg = 100.0 * subject.pts / poss;
    out.set(Metric::Ortg, ortg);
    let drtg = match kind {
        RowKind::TeamTotals => 100.0 * opponent.pts / opponent.possessions(),
        RowKind::Player => f64::NAN,
    };
    out.set(Metric::Drtg, drtg);
    out.set(Metric::NetRtg, ortg - drtg);

    out.set(
        Metric::EfgPct,
        ratio_or_zero(subject.fgm2 + 1.5 * subject.fgm3, fga),
    );
    out.set(
        Metric::TsPct,
        ratio_or_zero(subject.pts, 2.0 * (fga + 0.44 * subject.fta)),
    );
    out.set(Metric::FtRatio, ratio_or_zero(subject.fta, fga));
    out.set(Metric::ToPct, subject.tov / poss);
    out.set(Metric::AstPct, ratio_or_zero(subject.ast, fgm));
    let ast_to = if subject.tov != 0.0 {
        subject.ast / subject.tov
    } else {
        subject.ast
    };
    out.set(Metric::AstTo, ast_to);

    out.set(
        Metric::OrPct,
        ratio_or_zero(subject.oreb, subject.oreb + opponent.dreb),
    );
    out.set(
        Metric::DrPct,
        ratio_or_zero(subject.dreb, subject.dreb + opponent.oreb),
    );
    out.set(
        Metric::TrPct,
        ratio_or_zero(subject.treb, subject.treb + opponent.treb),
    );
    out.set(Metric::StPct, subject.stl / poss);
    out.set(Metric::BlkPct, ratio_or_zero(subject.blk, opponent.fga2));
    out.set(Metric::PfPer100, 100.0 * subject.pf / poss);

    out
}

/// Compute from raw rows. Any coercion failure in either row makes the whole
/// set undefined.
pub fn compute_raw(subject: &RawStatRow, kind: RowKind, opponent: &RawStatRow) -> AdvancedMetricSet {
    match (StatLine::from_row(subject), StatLine::from_row(opponent)) {
        (Ok(s), Ok(o)) => compute(&s, kind, &o),
        (Err(failure), _) | (_, Err(failure)) => {
            tracing::debug!(field = %failure.field, "non-numeric stat, metrics undefined");
            AdvancedMetricSet::undefined()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawStatRow {
        value.as_object().cloned().unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-2
    }

    fn subject() -> RawStatRow {
        raw(json!({
            "PTS": 20, "2PTM": 5, "2PTA": 10, "3PTM": 2, "3PTA": 5,
            "FTM": 4, "FTA": 5, "OREB": 2, "TOV": 3,
        }))
    }

    fn opponent() -> RawStatRow {
        raw(json!({
            "Points": 70, "FieldGoalsMade2": 20, "FieldGoalsAttempted2": 40,
            "FieldGoalsMade3": 6, "FieldGoalsAttempted3": 20,
            "FreeThrowsAttempted": 15, "OffensiveRebounds": 8,
            "DefensiveRebounds": 24, "TotalRebounds": 32, "Turnovers": 12,
        }))
    }

    #[test]
    fn scoring_row_ratings() {
        let m = compute_raw(&subject(), RowKind::Player, &opponent());
        // 15 FGA + 0.44 * 5 FTA - 2 OREB + 3 TOV
        assert!(close(m.get(Metric::Poss), 18.2));
        assert!(close(m.get(Metric::Ortg), 109.89));
        assert!(close(m.get(Metric::Ppp), 1.0989));
        assert_eq!(m.get(Metric::Fga), 15.0);
        assert_eq!(m.get(Metric::Fgm), 7.0);
        assert!(close(m.get(Metric::EfgPct), 8.0 / 15.0));
        assert!(close(m.get(Metric::OrPct), 2.0 / 26.0));
        assert!(close(m.get(Metric::FtRatio), 5.0 / 15.0));
        assert!(close(m.get(Metric::ToPct), 3.0 / 18.2));
    }

    #[test]
    fn empty_row_has_zero_shooting_and_floored_possessions() {
        let m = compute(&StatLine::default(), RowKind::Player, &StatLine::default());
        assert_eq!(m.get(Metric::FgPct), 0.0);
        assert_eq!(m.get(Metric::EfgPct), 0.0);
        assert_eq!(m.get(Metric::TsPct), 0.0);
        assert_eq!(m.get(Metric::Poss), 1.0);
        assert_eq!(m.get(Metric::Ortg), 0.0);
    }

    #[test]
    fn assist_ratio_without_turnovers_is_assist_count() {
        let line = StatLine {
            ast: 7.0,
            ..StatLine::default()
        };
        let m = compute(&line, RowKind::Player, &StatLine::default());
        assert_eq!(m.get(Metric::AstTo), 7.0);
    }

    #[test]
    fn defensive_ratings_only_for_team_totals() {
        let player = compute_raw(&subject(), RowKind::Player, &opponent());
        assert!(player.get(Metric::Drtg).is_nan());
        assert!(player.get(Metric::NetRtg).is_nan());

        let team = compute_raw(&subject(), RowKind::TeamTotals, &opponent());
        let opp_poss = 60.0 + 0.44 * 15.0 - 8.0 + 12.0;
        assert!(close(team.get(Metric::Drtg), 100.0 * 70.0 / opp_poss));
        assert!(close(
            team.get(Metric::NetRtg),
            team.get(Metric::Ortg) - team.get(Metric::Drtg)
        ));
    }

    #[test]
    fn non_numeric_field_makes_everything_undefined() {
        let mut bad = subject();
        bad.insert("FTA".into(), json!("abc"));
        let m = compute_raw(&bad, RowKind::TeamTotals, &opponent());
        assert!(m.is_undefined());

        let mut bad_opp = opponent();
        bad_opp.insert("Turnovers".into(), json!("DNP"));
        assert!(compute_raw(&subject(), RowKind::Player, &bad_opp).is_undefined());
    }

    #[test]
    fn missing_markers_count_as_zero() {
        let mut row = subject();
        row.insert("TOV".into(), json!(null));
        row.insert("OREB".into(), json!("-"));
        let m = compute_raw(&row, RowKind::Player, &opponent());
        assert!(!m.is_undefined());
        // 15 FGA + 0.44 * 5 FTA
        assert!(close(m.get(Metric::Poss), 17.2));
        assert_eq!(m.get(Metric::ToPct), 0.0);
    }

    #[test]
    fn every_key_is_present() {
        let m = compute_raw(&subject(), RowKind::Player, &opponent());
        let json = serde_json::to_value(m).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 23);
        for metric in Metric::ALL {
            assert!(obj.contains_key(metric.label()), "{}", metric.label());
        }
        assert_eq!(obj["DRTG"], Value::Null);
    }

    #[test]
    fn compute_is_deterministic() {
        let a = compute_raw(&subject(), RowKind::TeamTotals, &opponent());
        let b = compute_raw(&subject(), RowKind::TeamTotals, &opponent());
        for ((_, x), (_, y)) in a.iter().zip(b.iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn labels_round_trip() {
        for metric in Metric::ALL {
            assert_eq!(Metric::from_label(metric.label()), Some(metric));
        }
        assert_eq!(Metric::from_label("PTS"), None);
    }
}
