// Raw record normalization.
//
// Raw rows come from box-score JSON or from semicolon-delimited season CSVs.
// Values may be JSON numbers, numeric strings with a comma decimal separator,
// or "no data" markers. Counting stats collapse every kind of absence to 0.0;
// descriptive attributes keep absence as `None`.

use serde_json::{Map, Value};
use thiserror::Error;

/// One raw row: field name -> raw value.
pub type RawStatRow = Map<String, Value>;

/// Textual markers meaning "no data".
const MISSING_MARKERS: &[&str] = &["", "-", "none", "nan", "null", "n/a"];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How a field is cleaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFamily {
    /// Counting stat: absence or garbage becomes 0.0.
    Counting,
    /// Free-text attribute (name, role, nationality).
    DescriptiveText,
    /// Numeric attribute (height, age): parsed, but absence stays unknown.
    DescriptiveNumber,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Number(f64),
    Text(String),
    Absent,
}

/// A cleaned row, fields in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRow {
    pub identifier: String,
    pub fields: Vec<(String, FieldFamily, TypedValue)>,
}

impl TypedRow {
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.iter().find_map(|(name, _, value)| match value {
            TypedValue::Text(s) if name == field => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.fields.iter().find_map(|(name, _, value)| match value {
            TypedValue::Number(n) if name == field => Some(*n),
            _ => None,
        })
    }

    /// Counting fields with their (always present) values.
    pub fn counting(&self) -> impl Iterator<Item = (&str, f64)> {
        self.fields
            .iter()
            .filter_map(|(name, family, value)| match (family, value) {
                (FieldFamily::Counting, TypedValue::Number(n)) => Some((name.as_str(), *n)),
                _ => None,
            })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("row {row}: required field `{field}` is missing")]
    Validation { row: usize, field: String },
}

// ---------------------------------------------------------------------------
// Value coercion
// ---------------------------------------------------------------------------

/// True for JSON null and the textual "no data" markers.
pub fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let t = s.trim();
            MISSING_MARKERS.iter().any(|m| t.eq_ignore_ascii_case(m))
        }
        _ => false,
    }
}

/// Strict numeric parse. Accepts JSON numbers and numeric strings (comma or
/// dot decimal separator); everything else, including the missing markers,
/// is `None`.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            if is_missing(value) {
                return None;
            }
            s.trim()
                .replace(',', ".")
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// Lenient counting-stat coercion. Never fails: missing keys, markers, and
/// unparseable values are all 0.0.
pub fn coerce_counting(value: Option<&Value>) -> f64 {
    value.and_then(parse_number).unwrap_or(0.0)
}

/// Descriptive text: trimmed string, or `None` when absent.
pub fn coerce_text(value: Option<&Value>) -> Option<String> {
    match value {
        None => None,
        Some(v) if is_missing(v) => None,
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(other) => Some(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Row normalization
// ---------------------------------------------------------------------------

/// Clean one raw row. `classify` assigns each field its family; the field
/// named `identifier` must be present and non-empty.
///
/// `row` is the zero-based source row index, used in the error.
pub fn normalize_row<F>(
    raw: &RawStatRow,
    identifier: &str,
    row: usize,
    classify: F,
) -> Result<TypedRow, NormalizeError>
where
    F: Fn(&str) -> FieldFamily,
{
    let id = coerce_text(raw.get(identifier)).ok_or_else(|| NormalizeError::Validation {
        row,
        field: identifier.to_string(),
    })?;

    let fields = raw
        .iter()
        .map(|(name, value)| {
            let family = classify(name);
            let typed = match family {
                FieldFamily::Counting => TypedValue::Number(coerce_counting(Some(value))),
                FieldFamily::DescriptiveText => match coerce_text(Some(value)) {
                    Some(s) => TypedValue::Text(s),
                    None => TypedValue::Absent,
                },
                FieldFamily::DescriptiveNumber => match parse_number(value) {
                    Some(n) => TypedValue::Number(n),
                    None => TypedValue::Absent,
                },
            };
            (name.clone(), family, typed)
        })
        .collect();

    Ok(TypedRow {
        identifier: id,
        fields,
    })
}
