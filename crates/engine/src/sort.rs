//! Sort Engine - multi-column stable sort over RowStore snapshots
//!
//! Key invariants:
//! - Stable: rows equal on every descriptor keep their relative order
//! - Descriptors apply in ascending priority; the first non-equal one decides
//! - Null sorts before any non-null value in both directions
//! - Output is identical in every performance mode; only scheduling differs
//!
//! Sorting mutates the store: the new order is computed and applied inside
//! one `RowStore::reorder_rows` pass, so clearing the sort does not restore
//! the old order.

use std::cmp::Ordering;

use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tablegrid_config::{GridOptions, PerformanceMode};

use crate::cancel::CancelToken;
use crate::columns::ColumnCatalog;
use crate::error::{GridError, GridResult};
use crate::row::Row;
use crate::row_store::RowStore;
use crate::value::CellValue;

// =============================================================================
// Descriptors
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    None,
    Ascending,
    Descending,
}

impl SortDirection {
    /// None -> Ascending -> Descending -> None
    pub fn next(self) -> Self {
        match self {
            SortDirection::None => SortDirection::Ascending,
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub column: String,
    pub direction: SortDirection,
    /// Lower sorts first
    pub priority: u32,
    pub case_sensitive: bool,
}

impl SortDescriptor {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
            priority: 0,
            case_sensitive: false,
        }
    }

    pub fn ascending(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Ascending)
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Descending)
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    fn compare(&self, a: &CellValue, b: &CellValue) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => {
                let ord = a.compare(b, self.case_sensitive);
                if self.direction == SortDirection::Descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
        }
    }
}

/// What a `sort` call did.
#[derive(Debug, Clone, PartialEq)]
pub struct SortOutcome {
    pub rows_sorted: usize,
    /// Descriptors actually applied, in priority order
    pub applied: Vec<SortDescriptor>,
    pub mode: PerformanceMode,
}

// =============================================================================
// Sorting Logic
// =============================================================================

/// Composite comparator: descriptors in priority order, first non-equal wins.
fn compare_rows(a: &Row, b: &Row, descriptors: &[SortDescriptor]) -> Ordering {
    for desc in descriptors {
        let ord = desc.compare(a.get(&desc.column), b.get(&desc.column));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Precomputed per-row key for `Optimized` mode. Case-insensitive text is
/// lowercased once instead of on every comparison.
fn sort_key(row: &Row, descriptors: &[SortDescriptor]) -> Vec<CellValue> {
    descriptors
        .iter()
        .map(|desc| match row.get(&desc.column) {
            CellValue::Text(s) if !desc.case_sensitive => CellValue::Text(s.to_lowercase()),
            other => other.clone(),
        })
        .collect()
}

/// Sorted order of `rows` as old positions. Pure: `rows` is only read.
///
/// `descriptors` must already be in priority order; entries with direction
/// `None` are ignored.
pub fn sort_permutation(
    rows: &[Row],
    descriptors: &[SortDescriptor],
    mode: PerformanceMode,
    cancel: &CancelToken,
) -> GridResult<Vec<usize>> {
    let mut order: Vec<usize> = (0..rows.len()).collect();
    let active: Vec<SortDescriptor> = descriptors
        .iter()
        .filter(|d| d.direction != SortDirection::None)
        .cloned()
        .collect();
    if active.is_empty() || rows.len() < 2 {
        return Ok(order);
    }
    cancel.check()?;

    match mode {
        PerformanceMode::Parallel => {
            // par_sort_by is stable
            order.par_sort_by(|&a, &b| compare_rows(&rows[a], &rows[b], &active));
        }
        PerformanceMode::Optimized => {
            // Keys compare as case-sensitive once lowercased
            let exact: Vec<SortDescriptor> = active
                .iter()
                .map(|d| SortDescriptor {
                    case_sensitive: true,
                    ..d.clone()
                })
                .collect();
            let keys: Vec<Vec<CellValue>> = rows.iter().map(|row| sort_key(row, &active)).collect();
            cancel.check()?;
            order.sort_by(|&a, &b| {
                exact
                    .iter()
                    .zip(keys[a].iter().zip(&keys[b]))
                    .map(|(desc, (x, y))| desc.compare(x, y))
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }
        PerformanceMode::Sequential | PerformanceMode::Auto => {
            order.sort_by(|&a, &b| compare_rows(&rows[a], &rows[b], &active));
        }
    }

    cancel.check()?;
    Ok(order)
}

/// Sort a snapshot of rows. Pure: nothing outside `rows` is touched.
pub fn sort_rows(
    rows: Vec<Row>,
    descriptors: &[SortDescriptor],
    mode: PerformanceMode,
    cancel: &CancelToken,
) -> GridResult<Vec<Row>> {
    let order = sort_permutation(&rows, descriptors, mode, cancel)?;
    let mut slots: Vec<Option<Row>> = rows.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

// =============================================================================
// SortEngine
// =============================================================================

/// Owns the current sort state for one grid session.
#[derive(Debug)]
pub struct SortEngine {
    current: RwLock<Vec<SortDescriptor>>,
    mode: PerformanceMode,
    parallel_threshold: usize,
}

impl SortEngine {
    pub fn new(options: &GridOptions) -> Self {
        Self {
            current: RwLock::new(Vec::new()),
            mode: options.sort_mode,
            parallel_threshold: options.parallel_threshold,
        }
    }

    pub fn with_mode(mut self, mode: PerformanceMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sort the store by `descriptors` and remember them as the current sort.
    ///
    /// Descriptors on undeclared or non-sortable columns are skipped (an empty
    /// catalog accepts every column). When nothing is left to sort by, the
    /// sort state is cleared and the store is left alone.
    pub fn sort(
        &self,
        store: &RowStore,
        catalog: &ColumnCatalog,
        descriptors: &[SortDescriptor],
        cancel: &CancelToken,
    ) -> GridResult<SortOutcome> {
        let mut applied: Vec<SortDescriptor> = descriptors
            .iter()
            .filter(|d| d.direction != SortDirection::None)
            .filter(|d| {
                catalog.is_empty()
                    || catalog
                        .get_column(&d.column)
                        .is_some_and(|c| c.sortable)
            })
            .cloned()
            .collect();
        applied.sort_by_key(|d| d.priority);

        let row_count = store.get_row_count();
        let mode = self.mode.resolve(row_count, self.parallel_threshold);

        if applied.is_empty() {
            self.clear_sort();
            return Ok(SortOutcome {
                rows_sorted: 0,
                applied,
                mode,
            });
        }

        let rows_sorted =
            store.reorder_rows(|rows| sort_permutation(rows, &applied, mode, cancel))?;

        log::debug!(
            "sorted {} rows by {:?} ({:?})",
            rows_sorted,
            applied.iter().map(|d| d.column.as_str()).collect::<Vec<_>>(),
            mode
        );
        *self.current.write() = applied.clone();

        Ok(SortOutcome {
            rows_sorted,
            applied,
            mode,
        })
    }

    /// Cycle one column through None -> Ascending -> Descending -> None.
    /// Any other sort state is dropped. Returns the new direction.
    pub fn toggle_sort_direction(
        &self,
        store: &RowStore,
        catalog: &ColumnCatalog,
        column: &str,
        cancel: &CancelToken,
    ) -> GridResult<SortDirection> {
        if !catalog.is_empty() {
            let def = catalog
                .get_column(column)
                .ok_or_else(|| GridError::ColumnNotFound(column.to_string()))?;
            if !def.sortable {
                return Err(GridError::ColumnNotSortable(column.to_string()));
            }
        }

        let next = self.direction_of(column).next();
        if next == SortDirection::None {
            self.clear_sort();
        } else {
            self.sort(store, catalog, &[SortDescriptor::new(column, next)], cancel)?;
        }
        Ok(next)
    }

    /// Forget the sort state. Row order is not restored.
    pub fn clear_sort(&self) {
        self.current.write().clear();
    }

    pub fn current_sort(&self) -> Vec<SortDescriptor> {
        self.current.read().clone()
    }

    pub fn is_sorted(&self) -> bool {
        !self.current.read().is_empty()
    }

    pub fn direction_of(&self, column: &str) -> SortDirection {
        self.current
            .read()
            .iter()
            .find(|d| d.column == column)
            .map(|d| d.direction)
            .unwrap_or_default()
    }
}

impl Default for SortEngine {
    fn default() -> Self {
        Self::new(&GridOptions::default())
    }
}
