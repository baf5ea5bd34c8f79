//! Filter Engine - row visibility over RowStore snapshots
//!
//! Filtering is a view, never a mutation:
//! - criteria produce a visibility mask indexed by store position
//! - `RowView` carries that mask plus the cached list of visible positions
//! - clearing filters restores the unfiltered view with the store untouched
//!
//! Multiple criteria combine with AND.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::columns::ColumnCatalog;
use crate::error::{GridError, GridResult};
use crate::row::Row;
use crate::row_store::RowStore;
use crate::value::CellValue;

// =============================================================================
// RowView: visibility mask over store positions
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowView {
    /// Indexed by store position; true = visible
    visible_mask: Vec<bool>,

    /// Visible positions in store order (rebuilt whenever the mask changes)
    visible_rows: Vec<usize>,
}

impl RowView {
    /// Every row visible
    pub fn new(row_count: usize) -> Self {
        Self {
            visible_mask: vec![true; row_count],
            visible_rows: (0..row_count).collect(),
        }
    }

    pub fn from_mask(visible_mask: Vec<bool>) -> Self {
        let mut view = Self {
            visible_mask,
            visible_rows: Vec::new(),
        };
        view.rebuild_visible_cache();
        view
    }

    pub fn row_count(&self) -> usize {
        self.visible_mask.len()
    }

    pub fn visible_count(&self) -> usize {
        self.visible_rows.len()
    }

    /// O(1); out-of-range positions are not visible
    pub fn is_row_visible(&self, row: usize) -> bool {
        row < self.visible_mask.len() && self.visible_mask[row]
    }

    pub fn visible_rows(&self) -> &[usize] {
        &self.visible_rows
    }

    /// Store position of the nth visible row
    pub fn nth_visible(&self, n: usize) -> Option<usize> {
        self.visible_rows.get(n).copied()
    }

    /// Index of a store position within the visible list
    pub fn visible_index_of(&self, row: usize) -> Option<usize> {
        self.visible_rows.binary_search(&row).ok()
    }

    pub fn is_filtered(&self) -> bool {
        self.visible_count() < self.row_count()
    }

    pub fn apply_filter(&mut self, visible_mask: Vec<bool>) {
        self.visible_mask = visible_mask;
        self.rebuild_visible_cache();
    }

    pub fn clear_filter(&mut self) {
        self.visible_mask = vec![true; self.visible_mask.len()];
        self.rebuild_visible_cache();
    }

    fn rebuild_visible_cache(&mut self) {
        self.visible_rows = self
            .visible_mask
            .iter()
            .enumerate()
            .filter_map(|(row, &visible)| visible.then_some(row))
            .collect();
    }
}

// =============================================================================
// Criteria
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    IsNull,
    IsNotNull,
    IsEmpty,
    IsNotEmpty,
}

impl FilterOperator {
    /// Operators that ignore the criterion value.
    pub fn is_unary(&self) -> bool {
        matches!(
            self,
            FilterOperator::IsNull
                | FilterOperator::IsNotNull
                | FilterOperator::IsEmpty
                | FilterOperator::IsNotEmpty
        )
    }
}

/// One column predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCriterion {
    pub column: String,
    pub operator: FilterOperator,
    pub value: CellValue,
    pub case_sensitive: bool,
}

impl FilterCriterion {
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: impl Into<CellValue>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
            case_sensitive: false,
        }
    }

    /// Criterion for a unary operator (IsNull, IsEmpty, ...)
    pub fn unary(column: impl Into<String>, operator: FilterOperator) -> Self {
        Self::new(column, operator, CellValue::Null)
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.matches_value(row.get(&self.column))
    }

    /// Numbers and dates compare natively (numeric text against numbers
    /// too); text operators work on the display string. Ordering operators
    /// never match Null.
    pub fn matches_value(&self, cell: &CellValue) -> bool {
        use std::cmp::Ordering::*;
        use FilterOperator::*;

        match self.operator {
            IsNull => cell.is_null(),
            IsNotNull => !cell.is_null(),
            IsEmpty => cell.is_empty(),
            IsNotEmpty => !cell.is_empty(),
            Equals => self.equals(cell),
            NotEquals => !self.equals(cell),
            Contains => self.text_test(cell, |h, n| h.contains(n)),
            NotContains => !self.text_test(cell, |h, n| h.contains(n)),
            StartsWith => self.text_test(cell, |h, n| h.starts_with(n)),
            EndsWith => self.text_test(cell, |h, n| h.ends_with(n)),
            GreaterThan => matches!(self.order(cell), Some(Greater)),
            GreaterThanOrEqual => matches!(self.order(cell), Some(Greater | Equal)),
            LessThan => matches!(self.order(cell), Some(Less)),
            LessThanOrEqual => matches!(self.order(cell), Some(Less | Equal)),
        }
    }

    fn equals(&self, cell: &CellValue) -> bool {
        if cell.is_null() || self.value.is_null() {
            return cell.is_null() && self.value.is_null();
        }
        self.order(cell) == Some(std::cmp::Ordering::Equal)
    }

    fn order(&self, cell: &CellValue) -> Option<std::cmp::Ordering> {
        cell.compare_loose(&self.value, self.case_sensitive)
    }

    fn text_test(&self, cell: &CellValue, test: impl Fn(&str, &str) -> bool) -> bool {
        let haystack = cell.display_string();
        let needle = self.value.display_string();
        if self.case_sensitive {
            test(&haystack, &needle)
        } else {
            test(&haystack.to_lowercase(), &needle.to_lowercase())
        }
    }
}

// =============================================================================
// FilterEngine
// =============================================================================

/// Active filter criteria for one grid session.
#[derive(Debug, Default)]
pub struct FilterEngine {
    /// When set, criteria must name a declared filterable column
    catalog: Option<Arc<ColumnCatalog>>,
    filters: RwLock<Vec<FilterCriterion>>,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(catalog: Arc<ColumnCatalog>) -> Self {
        Self {
            catalog: Some(catalog),
            filters: RwLock::new(Vec::new()),
        }
    }

    fn check_column(&self, column: &str) -> GridResult<()> {
        let Some(catalog) = &self.catalog else {
            return Ok(());
        };
        if catalog.is_empty() {
            return Ok(());
        }
        match catalog.get_column(column) {
            None => Err(GridError::ColumnNotFound(column.to_string())),
            Some(def) if !def.filterable => Err(GridError::ColumnNotFilterable(column.to_string())),
            Some(_) => Ok(()),
        }
    }

    pub fn add_filter(&self, criterion: FilterCriterion) -> GridResult<()> {
        self.check_column(&criterion.column)?;
        self.filters.write().push(criterion);
        Ok(())
    }

    /// Replace every criterion. Nothing changes if any is rejected.
    pub fn set_filters(&self, criteria: Vec<FilterCriterion>) -> GridResult<()> {
        for criterion in &criteria {
            self.check_column(&criterion.column)?;
        }
        *self.filters.write() = criteria;
        Ok(())
    }

    /// Drop every criterion on `column`. Returns how many were dropped.
    pub fn remove_filter(&self, column: &str) -> usize {
        let mut filters = self.filters.write();
        let before = filters.len();
        filters.retain(|f| f.column != column);
        before - filters.len()
    }

    pub fn clear_filters(&self) {
        self.filters.write().clear();
    }

    pub fn filters(&self) -> Vec<FilterCriterion> {
        self.filters.read().clone()
    }

    pub fn is_filtered(&self) -> bool {
        !self.filters.read().is_empty()
    }

    /// Row passes every criterion (true when there are none).
    pub fn matches(&self, row: &Row) -> bool {
        self.filters.read().iter().all(|f| f.matches(row))
    }

    pub fn row_view(&self, store: &RowStore) -> RowView {
        let rows = store.get_all_rows();
        let filters = self.filters.read();
        if filters.is_empty() {
            return RowView::new(rows.len());
        }
        RowView::from_mask(
            rows.iter()
                .map(|row| filters.iter().all(|f| f.matches(row)))
                .collect(),
        )
    }

    /// Store positions of visible rows, in store order.
    pub fn visible_indices(&self, store: &RowStore) -> Vec<usize> {
        self.row_view(store).visible_rows().to_vec()
    }

    /// Snapshot of the visible rows, in store order.
    pub fn current_data(&self, store: &RowStore) -> Vec<Row> {
        let filters = self.filters.read();
        store
            .get_all_rows()
            .into_iter()
            .filter(|row| filters.iter().all(|f| f.matches(row)))
            .collect()
    }
}
