// Import/export for grid rows: CSV/TSV files, JSON, clipboard text

pub mod clipboard;
pub mod csv;
pub mod json;

use indexmap::IndexSet;
use tablegrid_engine::row::{is_reserved_key, Row};

/// Column names in first-seen order across `rows`.
///
/// Reserved `__` keys are left out unless `include_reserved` is set.
pub fn column_order(rows: &[Row], include_reserved: bool) -> Vec<String> {
    let mut names: IndexSet<&str> = IndexSet::new();
    for row in rows {
        for (key, _) in row.iter() {
            if include_reserved || !is_reserved_key(key) {
                names.insert(key);
            }
        }
    }
    names.into_iter().map(str::to_string).collect()
}

/// Give blank and repeated header cells usable names: blanks become
/// `Column{n}` (1-based), repeats get a `_2`, `_3`... suffix.
pub fn normalize_headers<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen: IndexSet<String> = IndexSet::new();
    raw.iter()
        .enumerate()
        .map(|(i, h)| {
            let base = match h.as_ref().trim() {
                "" => format!("Column{}", i + 1),
                name => name.to_string(),
            };
            let mut name = base.clone();
            let mut n = 2;
            while seen.contains(&name) {
                name = format!("{}_{}", base, n);
                n += 1;
            }
            seen.insert(name.clone());
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_order_skips_reserved() {
        let mut a = Row::new().with("id", 1i64);
        a.set_row_number(1);
        let b = Row::new().with("name", "x").with("id", 2i64);

        let rows = vec![a, b];
        assert_eq!(column_order(&rows, false), vec!["id", "name"]);
        assert_eq!(column_order(&rows, true), vec!["id", "__rowNumber", "name"]);
    }

    #[test]
    fn test_normalize_headers() {
        let headers = normalize_headers(&["id", "", "id", " name ", "id"]);
        assert_eq!(headers, vec!["id", "Column2", "id_2", "name", "id_3"]);
    }
}
