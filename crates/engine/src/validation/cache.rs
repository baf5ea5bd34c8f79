//! Per-row validation result cache.
//!
//! Keyed by row position. Positions shift on structural edits, so the owner
//! invalidates on delete/insert (`invalidate_from`) and on wholesale
//! replacement (`clear`).

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::result::RowValidationResult;

#[derive(Debug, Default)]
pub struct ValidationCache {
    entries: RwLock<FxHashMap<usize, RowValidationResult>>,
}

impl ValidationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, row_index: usize) -> Option<RowValidationResult> {
        self.entries.read().get(&row_index).cloned()
    }

    pub fn insert(&self, row_index: usize, result: RowValidationResult) {
        self.entries.write().insert(row_index, result);
    }

    pub fn invalidate_row(&self, row_index: usize) -> bool {
        self.entries.write().remove(&row_index).is_some()
    }

    /// Drop every entry at or after `row_index` (rows there have moved).
    pub fn invalidate_from(&self, row_index: usize) {
        self.entries.write().retain(|&index, _| index < row_index);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of cached rows that are invalid.
    pub fn invalid_count(&self) -> usize {
        self.entries.read().values().filter(|r| !r.is_valid).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::result::ValidationResult;
    use crate::validation::rules::Severity;

    fn result(index: usize, valid: bool) -> RowValidationResult {
        let failures = if valid {
            vec![]
        } else {
            vec![ValidationResult::failure("r", Severity::Error, "bad")]
        };
        RowValidationResult::from_results(Some(index), failures)
    }

    #[test]
    fn test_invalidation() {
        let cache = ValidationCache::new();
        for i in 0..5 {
            cache.insert(i, result(i, i % 2 == 0));
        }
        assert_eq!(cache.invalid_count(), 2);

        assert!(cache.invalidate_row(1));
        assert!(!cache.invalidate_row(1));
        assert!(cache.get(1).is_none());

        cache.invalidate_from(3);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(2).is_some());

        cache.clear();
        assert!(cache.is_empty());
    }
}
