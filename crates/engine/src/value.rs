use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Declared data type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColumnDataType {
    #[default]
    Text,
    Integer,
    Decimal,
    Boolean,
    DateTime,
}

/// A dynamically-typed cell value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Infer a typed value from user or file input.
    ///
    /// Empty -> Null, `true`/`false` -> Bool, integers, finite floats,
    /// ISO dates and date-times, anything else stays Text (trimmed).
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return CellValue::Null;
        }

        if trimmed.eq_ignore_ascii_case("true") {
            return CellValue::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return CellValue::Bool(false);
        }

        if let Ok(n) = trimmed.parse::<i64>() {
            return CellValue::Int(n);
        }

        if let Ok(n) = trimmed.parse::<f64>() {
            if n.is_finite() {
                return CellValue::Float(n);
            }
        }

        if let Some(dt) = parse_datetime(trimmed) {
            return CellValue::DateTime(dt);
        }

        CellValue::Text(trimmed.to_string())
    }

    /// Coerce free input to a column's declared type.
    ///
    /// Text columns keep the input verbatim; other types go through
    /// explicit coercion so a failure is reported instead of truncated.
    pub fn parse_as(input: &str, data_type: ColumnDataType) -> GridResult<Self> {
        if input.trim().is_empty() {
            return Ok(CellValue::Null);
        }
        let text = CellValue::Text(input.to_string());
        match data_type {
            ColumnDataType::Text => Ok(text),
            ColumnDataType::Integer => text.to_i64().map(CellValue::Int),
            ColumnDataType::Decimal => text.to_f64().map(CellValue::Float),
            ColumnDataType::Boolean => text.to_bool().map(CellValue::Bool),
            ColumnDataType::DateTime => text.to_datetime().map(CellValue::DateTime),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Null or whitespace-only text
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, CellValue::Int(_) | CellValue::Float(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of this value. Text must parse in full.
    pub fn to_f64(&self) -> GridResult<f64> {
        match self {
            CellValue::Int(n) => Ok(*n as f64),
            CellValue::Float(n) => Ok(*n),
            CellValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .ok_or_else(|| self.coercion_error("number")),
            _ => Err(self.coercion_error("number")),
        }
    }

    /// Integer view of this value. Floats with a fractional part fail.
    pub fn to_i64(&self) -> GridResult<i64> {
        match self {
            CellValue::Int(n) => Ok(*n),
            CellValue::Float(n) => float_to_i64(*n).ok_or_else(|| self.coercion_error("integer")),
            CellValue::Text(s) => {
                let trimmed = s.trim();
                if let Ok(n) = trimmed.parse::<i64>() {
                    return Ok(n);
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .and_then(float_to_i64)
                    .ok_or_else(|| self.coercion_error("integer"))
            }
            _ => Err(self.coercion_error("integer")),
        }
    }

    pub fn to_bool(&self) -> GridResult<bool> {
        match self {
            CellValue::Bool(b) => Ok(*b),
            CellValue::Int(0) => Ok(false),
            CellValue::Int(1) => Ok(true),
            CellValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(self.coercion_error("boolean")),
            },
            _ => Err(self.coercion_error("boolean")),
        }
    }

    pub fn to_datetime(&self) -> GridResult<NaiveDateTime> {
        match self {
            CellValue::DateTime(dt) => Ok(*dt),
            CellValue::Text(s) => {
                parse_datetime(s.trim()).ok_or_else(|| self.coercion_error("date-time"))
            }
            _ => Err(self.coercion_error("date-time")),
        }
    }

    fn coercion_error(&self, target: &'static str) -> GridError {
        GridError::Coercion {
            value: self.display_string(),
            target,
        }
    }

    /// Plain text rendering used by search, text filters and export.
    pub fn display_string(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            CellValue::Int(n) => n.to_string(),
            CellValue::Float(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Text(s) => s.clone(),
            CellValue::DateTime(dt) => {
                if dt.time() == NaiveTime::MIN {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
        }
    }

    /// Type rank: Null(0) < numbers(1) < date-times(2) < booleans(3) < text(4)
    fn type_rank(&self) -> u8 {
        match self {
            CellValue::Null => 0,
            CellValue::Int(_) | CellValue::Float(_) => 1,
            CellValue::DateTime(_) => 2,
            CellValue::Bool(_) => 3,
            CellValue::Text(_) => 4,
        }
    }

    /// Total order used by sorting.
    ///
    /// Null sorts before everything, Int and Float compare numerically,
    /// values of different kinds order by type rank.
    pub fn compare(&self, other: &CellValue, case_sensitive: bool) -> Ordering {
        match (self, other) {
            (CellValue::Null, CellValue::Null) => Ordering::Equal,
            (CellValue::Int(a), CellValue::Int(b)) => a.cmp(b),
            (CellValue::Float(a), CellValue::Float(b)) => OrderedFloat(*a).cmp(&OrderedFloat(*b)),
            (CellValue::Int(a), CellValue::Float(b)) => compare_int_float(*a, *b),
            (CellValue::Float(a), CellValue::Int(b)) => compare_int_float(*b, *a).reverse(),
            (CellValue::DateTime(a), CellValue::DateTime(b)) => a.cmp(b),
            (CellValue::Bool(a), CellValue::Bool(b)) => a.cmp(b),
            (CellValue::Text(a), CellValue::Text(b)) => compare_text(a, b, case_sensitive),
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }

    /// Comparison across kinds for filter operators.
    ///
    /// Numbers compare against numeric text, date-times against date text,
    /// everything else falls back to text comparison. Returns None when the
    /// two sides have no meaningful order (e.g. Null).
    pub fn compare_loose(&self, other: &CellValue, case_sensitive: bool) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }

        if self.is_numeric() || other.is_numeric() {
            if let (Ok(a), Ok(b)) = (self.to_f64(), other.to_f64()) {
                return Some(OrderedFloat(a).cmp(&OrderedFloat(b)));
            }
        }

        if matches!(self, CellValue::DateTime(_)) || matches!(other, CellValue::DateTime(_)) {
            if let (Ok(a), Ok(b)) = (self.to_datetime(), other.to_datetime()) {
                return Some(a.cmp(&b));
            }
        }

        if let (CellValue::Bool(a), CellValue::Bool(b)) = (self, other) {
            return Some(a.cmp(b));
        }

        Some(compare_text(
            &self.display_string(),
            &other.display_string(),
            case_sensitive,
        ))
    }

}

/// Exact Int vs Float order, consistent with `OrderedFloat` (NaN above
/// everything). Large integers are never rounded through `f64`.
fn compare_int_float(int: i64, float: f64) -> Ordering {
    // 2^63, the first float past i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if float.is_nan() || float >= LIMIT {
        return Ordering::Less;
    }
    if float < -LIMIT {
        return Ordering::Greater;
    }
    let whole = float.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => OrderedFloat(whole).cmp(&OrderedFloat(float)),
        ord => ord,
    }
}

fn float_to_i64(n: f64) -> Option<i64> {
    if n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Some(n as i64)
    } else {
        None
    }
}

fn compare_text(a: &str, b: &str, case_sensitive: bool) -> Ordering {
    if case_sensitive {
        a.cmp(b)
    } else {
        a.to_lowercase().cmp(&b.to_lowercase())
    }
}

/// Parse the ISO-ish date and date-time shapes accepted on input.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }
    None
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_string())
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Int(n)
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        CellValue::Int(n as i64)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Float(n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(dt: NaiveDateTime) -> Self {
        CellValue::DateTime(dt)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_input_inference() {
        assert_eq!(CellValue::from_input("   "), CellValue::Null);
        assert_eq!(CellValue::from_input("42"), CellValue::Int(42));
        assert_eq!(CellValue::from_input("-3.5"), CellValue::Float(-3.5));
        assert_eq!(CellValue::from_input("TRUE"), CellValue::Bool(true));
        assert_eq!(CellValue::from_input(" hello "), CellValue::Text("hello".into()));
        assert_eq!(CellValue::from_input("inf"), CellValue::Text("inf".into()));

        let date = CellValue::from_input("2024-03-01");
        assert!(matches!(date, CellValue::DateTime(_)));
        assert_eq!(date.display_string(), "2024-03-01");
    }

    #[test]
    fn test_numeric_coercion_is_explicit() {
        assert_eq!(CellValue::Text(" 12 ".into()).to_i64().unwrap(), 12);
        assert_eq!(CellValue::Text("12.0".into()).to_i64().unwrap(), 12);
        assert_eq!(CellValue::Float(2.5).to_f64().unwrap(), 2.5);

        // No silent zero on garbage
        assert!(CellValue::Text("abc".into()).to_f64().is_err());
        assert!(CellValue::Float(2.5).to_i64().is_err());
        assert!(CellValue::Null.to_f64().is_err());
    }

    #[test]
    fn test_parse_as_declared_type() {
        assert_eq!(
            CellValue::parse_as("7", ColumnDataType::Integer).unwrap(),
            CellValue::Int(7)
        );
        assert_eq!(
            CellValue::parse_as("007", ColumnDataType::Text).unwrap(),
            CellValue::Text("007".into())
        );
        assert_eq!(CellValue::parse_as("", ColumnDataType::Integer).unwrap(), CellValue::Null);
        assert!(matches!(
            CellValue::parse_as("seven", ColumnDataType::Integer),
            Err(GridError::Coercion { target: "integer", .. })
        ));
    }

    #[test]
    fn test_compare_null_first_and_mixed_numbers() {
        assert_eq!(CellValue::Null.compare(&CellValue::Int(-100), true), Ordering::Less);
        assert_eq!(CellValue::Int(2).compare(&CellValue::Float(2.5), true), Ordering::Less);
        assert_eq!(CellValue::Float(3.0).compare(&CellValue::Int(3), true), Ordering::Equal);
        assert_eq!(CellValue::Int(1).compare(&CellValue::Text("a".into()), true), Ordering::Less);
        assert_eq!(CellValue::Int(-3).compare(&CellValue::Float(-2.5), true), Ordering::Less);
        assert_eq!(CellValue::Float(f64::NAN).compare(&CellValue::Int(i64::MAX), true), Ordering::Greater);
    }

    #[test]
    fn test_compare_large_ints_against_floats_is_transitive() {
        let two_53 = 1i64 << 53;
        let above = CellValue::Int(two_53 + 1);
        let float = CellValue::Float(two_53 as f64);
        let exact = CellValue::Int(two_53);

        assert_eq!(above.compare(&exact, true), Ordering::Greater);
        assert_eq!(above.compare(&float, true), Ordering::Greater);
        assert_eq!(float.compare(&exact, true), Ordering::Equal);
        assert_eq!(float.compare(&above, true), Ordering::Less);

        assert_eq!(CellValue::Int(i64::MAX).compare(&CellValue::Float(i64::MAX as f64), true), Ordering::Less);
        assert_eq!(CellValue::Int(i64::MIN).compare(&CellValue::Float(i64::MIN as f64), true), Ordering::Equal);
        assert_eq!(CellValue::Int(0).compare(&CellValue::Float(f64::NEG_INFINITY), true), Ordering::Greater);
    }

    #[test]
    fn test_compare_text_case_sensitivity() {
        let upper = CellValue::Text("B".into());
        let lower = CellValue::Text("a".into());
        // Byte order puts uppercase first
        assert_eq!(upper.compare(&lower, true), Ordering::Less);
        assert_eq!(upper.compare(&lower, false), Ordering::Greater);
    }

    #[test]
    fn test_compare_loose_numeric_text() {
        let cell = CellValue::Text("10".into());
        assert_eq!(cell.compare_loose(&CellValue::Int(9), true), Some(Ordering::Greater));
        assert_eq!(CellValue::Null.compare_loose(&CellValue::Int(9), true), None);
    }
}
