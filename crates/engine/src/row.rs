//! Row type: an ordered column-name -> value mapping.
//!
//! Rows are addressed by position in the [`RowStore`](crate::row_store::RowStore).
//! A position is NOT an identity: inserts, deletes and sorts move rows.
//!
//! Two implicit attributes ride inside every row:
//! - `__createdAt`: creation timestamp, the primary row-number ordering key
//! - `__rowNumber`: the human-visible 1-based sequence
//!
//! Keys starting with `__` are reserved and never treated as user data.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::CellValue;

pub const CREATED_AT_KEY: &str = "__createdAt";
pub const ROW_NUMBER_KEY: &str = "__rowNumber";
/// Alerts column used when the catalog has no ValidationAlerts column.
pub const DEFAULT_ALERTS_COLUMN: &str = "ValidationAlerts";
const RESERVED_PREFIX: &str = "__";

pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    values: IndexMap<String, CellValue>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(column, value)` pairs, keeping their order.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<CellValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Missing keys read as Null
    pub fn get(&self, column: &str) -> &CellValue {
        static NULL: CellValue = CellValue::Null;
        self.values.get(column).unwrap_or(&NULL)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Set a value, returning the previous one (Null if absent).
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<CellValue>) -> CellValue {
        self.values
            .insert(column.into(), value.into())
            .unwrap_or_default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.set(column, value);
        self
    }

    /// Remove a key, preserving the order of the others.
    pub fn remove(&mut self, column: &str) -> Option<CellValue> {
        self.values.shift_remove(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// User data entries only (reserved `__` keys skipped).
    pub fn data(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.iter().filter(|(k, _)| !is_reserved_key(k))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn created_at(&self) -> Option<NaiveDateTime> {
        match self.get(CREATED_AT_KEY) {
            CellValue::DateTime(dt) => Some(*dt),
            other => other.to_datetime().ok(),
        }
    }

    pub fn set_created_at(&mut self, at: NaiveDateTime) {
        self.set(CREATED_AT_KEY, CellValue::DateTime(at));
    }

    /// Stamp `__createdAt` unless the row already carries one.
    pub fn ensure_created_at(&mut self, now: NaiveDateTime) {
        if self.get(CREATED_AT_KEY).is_null() {
            self.set_created_at(now);
        }
    }

    pub fn row_number(&self) -> &CellValue {
        self.get(ROW_NUMBER_KEY)
    }

    pub fn set_row_number(&mut self, number: i64) {
        self.set(ROW_NUMBER_KEY, CellValue::Int(number));
    }

    /// True when every user-data value outside `ignore` is empty.
    ///
    /// `ignore` lists special columns (checkbox, alerts, row number) that
    /// don't count as data.
    pub fn is_empty_data(&self, ignore: &[&str]) -> bool {
        self.data()
            .filter(|(k, _)| !ignore.contains(k))
            .all(|(_, v)| v.is_empty())
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_reads_null() {
        let row = Row::from_pairs([("id", 1)]);
        assert_eq!(row.get("id"), &CellValue::Int(1));
        assert!(row.get("name").is_null());
    }

    #[test]
    fn test_order_preserved_on_remove() {
        let mut row = Row::from_pairs([("a", 1), ("b", 2), ("c", 3)]);
        row.remove("b");
        let keys: Vec<&str> = row.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn test_reserved_keys_are_not_data() {
        let mut row = Row::new().with("name", "");
        row.set_row_number(4);
        assert!(row.is_empty_data(&[]));

        row.set("name", "Ada");
        assert!(!row.is_empty_data(&[]));
        assert!(row.is_empty_data(&["name"]));
    }

    #[test]
    fn test_ensure_created_at_keeps_existing() {
        let first = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let later = first + chrono::Duration::seconds(5);

        let mut row = Row::new();
        row.ensure_created_at(first);
        row.ensure_created_at(later);
        assert_eq!(row.created_at(), Some(first));
    }
}
