//! Column Catalog - column definitions and special roles
//!
//! Key invariants:
//! - Column names are unique and immutable once added
//! - At most one column holds each of RowNumber / Checkbox / ValidationAlerts
//! - Definitions are kept in display order; `display_order` is dense 0..N-1
//! - Live width always lies in `[min_width, max_width]`
//!
//! Every rejected mutation leaves the catalog unchanged.

use std::collections::HashSet;
use std::fmt;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};
use crate::row::DEFAULT_ALERTS_COLUMN;
use crate::value::{CellValue, ColumnDataType};

/// Reserved semantic role of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SpecialColumnRole {
    #[default]
    None,
    Normal,
    RowNumber,
    Checkbox,
    DeleteRow,
    ValidationAlerts,
}

impl SpecialColumnRole {
    /// Roles a catalog allows on one column only.
    pub fn is_unique(&self) -> bool {
        matches!(
            self,
            SpecialColumnRole::RowNumber
                | SpecialColumnRole::Checkbox
                | SpecialColumnRole::ValidationAlerts
        )
    }

    /// Regular user data column?
    pub fn is_data(&self) -> bool {
        matches!(self, SpecialColumnRole::None | SpecialColumnRole::Normal)
    }
}

impl fmt::Display for SpecialColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Unique key, immutable once the column is in a catalog.
    pub name: String,
    /// Display-only caption.
    pub header: String,
    pub data_type: ColumnDataType,
    pub width: f64,
    pub min_width: f64,
    pub max_width: f64,
    pub visible: bool,
    pub read_only: bool,
    pub sortable: bool,
    pub filterable: bool,
    pub resizable: bool,
    pub searchable: bool,
    pub display_order: usize,
    pub format: Option<String>,
    pub default_value: CellValue,
    pub role: SpecialColumnRole,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: ColumnDataType) -> Self {
        let name = name.into();
        Self {
            header: name.clone(),
            name,
            data_type,
            width: 100.0,
            min_width: 20.0,
            max_width: 2000.0,
            visible: true,
            read_only: false,
            sortable: true,
            filterable: true,
            resizable: true,
            searchable: true,
            display_order: 0,
            format: None,
            default_value: CellValue::Null,
            role: SpecialColumnRole::None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnDataType::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnDataType::Integer)
    }

    pub fn decimal(name: impl Into<String>) -> Self {
        Self::new(name, ColumnDataType::Decimal)
    }

    /// Row-number column (read-only, not searchable).
    pub fn row_number(name: impl Into<String>) -> Self {
        Self::new(name, ColumnDataType::Integer)
            .with_role(SpecialColumnRole::RowNumber)
            .read_only()
            .with_searchable(false)
    }

    pub fn checkbox(name: impl Into<String>) -> Self {
        Self::new(name, ColumnDataType::Boolean)
            .with_role(SpecialColumnRole::Checkbox)
            .with_default(CellValue::Bool(false))
            .with_searchable(false)
    }

    pub fn delete_row(name: impl Into<String>) -> Self {
        Self::new(name, ColumnDataType::Text)
            .with_role(SpecialColumnRole::DeleteRow)
            .with_sortable(false)
            .with_filterable(false)
            .with_searchable(false)
    }

    /// Alerts column; defaults to the standard alerts key.
    pub fn validation_alerts() -> Self {
        Self::new(DEFAULT_ALERTS_COLUMN, ColumnDataType::Text)
            .with_role(SpecialColumnRole::ValidationAlerts)
            .read_only()
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    pub fn with_role(mut self, role: SpecialColumnRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_width(mut self, width: f64, min: f64, max: f64) -> Self {
        self.min_width = min;
        self.max_width = max;
        self.width = width;
        self
    }

    pub fn with_default(mut self, value: CellValue) -> Self {
        self.default_value = value;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn with_sortable(mut self, sortable: bool) -> Self {
        self.sortable = sortable;
        self
    }

    pub fn with_filterable(mut self, filterable: bool) -> Self {
        self.filterable = filterable;
        self
    }

    pub fn with_searchable(mut self, searchable: bool) -> Self {
        self.searchable = searchable;
        self
    }

    pub fn with_resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    /// Can a paste or batch write land in this column?
    pub fn is_writable_data(&self) -> bool {
        self.role.is_data() && !self.read_only
    }

    pub fn clamp_width(&self, width: f64) -> f64 {
        // max_width < min_width is a misconfiguration; min wins
        width.min(self.max_width).max(self.min_width)
    }
}

/// In-flight resize drag
#[derive(Debug, Clone)]
struct ResizeState {
    column: String,
    start_width: f64,
}

#[derive(Debug, Default)]
pub struct ColumnCatalog {
    columns: RwLock<Vec<ColumnDefinition>>,
    resizing: Mutex<Option<ResizeState>>,
}

impl ColumnCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from definitions, rejecting the first conflict.
    pub fn with_columns(columns: Vec<ColumnDefinition>) -> GridResult<Self> {
        let catalog = Self::new();
        for column in columns {
            catalog.add_column(column)?;
        }
        Ok(catalog)
    }

    // -------------------------------------------------------------------------
    // Mutators
    // -------------------------------------------------------------------------

    /// Append a column at the end of the display order.
    pub fn add_column(&self, mut column: ColumnDefinition) -> GridResult<()> {
        let mut columns = self.columns.write();

        if columns.iter().any(|c| c.name == column.name) {
            return Err(GridError::DuplicateColumn(column.name));
        }
        check_role_free(&columns, &column, None)?;

        column.width = column.clamp_width(column.width);
        column.display_order = columns.len();
        columns.push(column);
        Ok(())
    }

    pub fn remove_column(&self, name: &str) -> GridResult<ColumnDefinition> {
        let mut columns = self.columns.write();
        let pos = columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| GridError::ColumnNotFound(name.to_string()))?;
        let removed = columns.remove(pos);
        renumber(&mut columns);
        drop(columns);

        let mut resizing = self.resizing.lock();
        if resizing.as_ref().is_some_and(|r| r.column == name) {
            *resizing = None;
        }
        Ok(removed)
    }

    /// Edit a column in place. The name cannot change; a role change that
    /// collides with another column is rejected.
    pub fn update_column(
        &self,
        name: &str,
        f: impl FnOnce(&mut ColumnDefinition),
    ) -> GridResult<()> {
        let mut columns = self.columns.write();
        let pos = columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| GridError::ColumnNotFound(name.to_string()))?;

        let mut updated = columns[pos].clone();
        f(&mut updated);
        updated.name = name.to_string();
        updated.display_order = pos;
        updated.width = updated.clamp_width(updated.width);
        check_role_free(&columns, &updated, Some(pos))?;

        columns[pos] = updated;
        Ok(())
    }

    /// Apply a new display order. `new_order` must be a permutation of the
    /// current names.
    pub fn reorder_columns<S: AsRef<str>>(&self, new_order: &[S]) -> GridResult<()> {
        let mut columns = self.columns.write();

        if new_order.len() != columns.len() {
            return Err(GridError::InvalidColumnOrder(format!(
                "expected {} names, got {}",
                columns.len(),
                new_order.len()
            )));
        }

        let mut seen = HashSet::new();
        let mut reordered = Vec::with_capacity(columns.len());
        for name in new_order {
            let name = name.as_ref();
            if !seen.insert(name) {
                return Err(GridError::InvalidColumnOrder(format!("'{}' listed twice", name)));
            }
            let column = columns
                .iter()
                .find(|c| c.name == name)
                .ok_or_else(|| GridError::InvalidColumnOrder(format!("unknown column '{}'", name)))?;
            reordered.push(column.clone());
        }

        renumber(&mut reordered);
        *columns = reordered;
        Ok(())
    }

    pub fn clear(&self) {
        self.columns.write().clear();
        *self.resizing.lock() = None;
    }

    // -------------------------------------------------------------------------
    // Resize
    // -------------------------------------------------------------------------

    /// Begin a resize drag on `name`. Replaces any drag in progress.
    pub fn start_resize(&self, name: &str) -> GridResult<()> {
        let column = self
            .get_column(name)
            .ok_or_else(|| GridError::ColumnNotFound(name.to_string()))?;
        if !column.resizable {
            return Ok(());
        }
        *self.resizing.lock() = Some(ResizeState {
            column: column.name,
            start_width: column.width,
        });
        Ok(())
    }

    /// Apply a live width. Returns the clamped width, or None when no
    /// matching `start_resize` is active (no-op).
    pub fn update_resize(&self, name: &str, width: f64) -> Option<f64> {
        if !self.is_resizing(name) {
            return None;
        }
        self.set_width(name, width).ok()
    }

    /// Finish the drag. Returns the final width, or None without a matching start.
    pub fn end_resize(&self, name: &str) -> Option<f64> {
        let state = {
            let mut resizing = self.resizing.lock();
            if !resizing.as_ref().is_some_and(|state| state.column == name) {
                return None;
            }
            resizing.take()
        }?;
        let width = self.get_column(name).map(|c| c.width);
        if let Some(w) = width {
            log::debug!("resized '{}' {} -> {}", name, state.start_width, w);
        }
        width
    }

    /// Abort the drag and restore the width it started from.
    pub fn cancel_resize(&self) {
        let state = self.resizing.lock().take();
        if let Some(state) = state {
            let _ = self.set_width(&state.column, state.start_width);
        }
    }

    pub fn is_resizing(&self, name: &str) -> bool {
        self.resizing
            .lock()
            .as_ref()
            .is_some_and(|state| state.column == name)
    }

    /// Set a width directly, clamped. Returns the stored width.
    pub fn set_width(&self, name: &str, width: f64) -> GridResult<f64> {
        let mut columns = self.columns.write();
        let column = columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| GridError::ColumnNotFound(name.to_string()))?;
        column.width = column.clamp_width(width);
        Ok(column.width)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn get_column(&self, name: &str) -> Option<ColumnDefinition> {
        self.columns.read().iter().find(|c| c.name == name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.read().iter().any(|c| c.name == name)
    }

    /// All columns in display order.
    pub fn get_columns(&self) -> Vec<ColumnDefinition> {
        self.columns.read().clone()
    }

    pub fn get_visible_columns(&self) -> Vec<ColumnDefinition> {
        self.columns.read().iter().filter(|c| c.visible).cloned().collect()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.read().iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.read().is_empty()
    }

    pub fn special_column(&self, role: SpecialColumnRole) -> Option<ColumnDefinition> {
        self.columns.read().iter().find(|c| c.role == role).cloned()
    }

    /// Names of columns that don't hold user data.
    pub fn special_column_names(&self) -> Vec<String> {
        self.columns
            .read()
            .iter()
            .filter(|c| !c.role.is_data())
            .map(|c| c.name.clone())
            .collect()
    }

    /// Where validation alerts are written.
    pub fn alerts_column_name(&self) -> String {
        self.special_column(SpecialColumnRole::ValidationAlerts)
            .map(|c| c.name)
            .unwrap_or_else(|| DEFAULT_ALERTS_COLUMN.to_string())
    }
}

fn check_role_free(
    columns: &[ColumnDefinition],
    candidate: &ColumnDefinition,
    skip: Option<usize>,
) -> GridResult<()> {
    if !candidate.role.is_unique() {
        return Ok(());
    }
    let holder = columns
        .iter()
        .enumerate()
        .find(|(i, c)| Some(*i) != skip && c.role == candidate.role);
    match holder {
        Some((_, existing)) => Err(GridError::DuplicateSpecialRole {
            role: candidate.role.to_string(),
            existing: existing.name.clone(),
        }),
        None => Ok(()),
    }
}

fn renumber(columns: &mut [ColumnDefinition]) {
    for (i, column) in columns.iter_mut().enumerate() {
        column.display_order = i;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ColumnCatalog {
        ColumnCatalog::with_columns(vec![
            ColumnDefinition::text("name"),
            ColumnDefinition::integer("age"),
            ColumnDefinition::text("city").hidden(),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let catalog = catalog();
        let err = catalog.add_column(ColumnDefinition::text("age")).unwrap_err();
        assert_eq!(err, GridError::DuplicateColumn("age".into()));
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_unique_special_roles() {
        let catalog = catalog();
        catalog.add_column(ColumnDefinition::row_number("#")).unwrap();
        catalog.add_column(ColumnDefinition::validation_alerts()).unwrap();

        let err = catalog
            .add_column(ColumnDefinition::row_number("No."))
            .unwrap_err();
        assert!(matches!(err, GridError::DuplicateSpecialRole { ref existing, .. } if existing == "#"));

        // DeleteRow isn't unique
        catalog.add_column(ColumnDefinition::delete_row("del1")).unwrap();
        catalog.add_column(ColumnDefinition::delete_row("del2")).unwrap();

        assert_eq!(catalog.alerts_column_name(), DEFAULT_ALERTS_COLUMN);
    }

    #[test]
    fn test_update_cannot_steal_role_or_rename() {
        let catalog = catalog();
        catalog.add_column(ColumnDefinition::checkbox("sel")).unwrap();

        let err = catalog
            .update_column("name", |c| c.role = SpecialColumnRole::Checkbox)
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(catalog.get_column("name").unwrap().role, SpecialColumnRole::None);

        catalog
            .update_column("name", |c| {
                c.name = "renamed".into();
                c.header = "Full name".into();
            })
            .unwrap();
        let column = catalog.get_column("name").unwrap();
        assert_eq!(column.header, "Full name");
        assert!(catalog.get_column("renamed").is_none());
    }

    #[test]
    fn test_visible_columns() {
        let names: Vec<String> = catalog()
            .get_visible_columns()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["name", "age"]);
    }

    #[test]
    fn test_reorder_requires_permutation() {
        let catalog = catalog();
        catalog.reorder_columns(&["city", "name", "age"]).unwrap();
        assert_eq!(catalog.column_names(), vec!["city", "name", "age"]);
        assert_eq!(catalog.get_column("age").unwrap().display_order, 2);

        assert!(catalog.reorder_columns(&["city", "name"]).is_err());
        assert!(catalog.reorder_columns(&["city", "city", "age"]).is_err());
        assert!(catalog.reorder_columns(&["city", "name", "zip"]).is_err());
        // unchanged after failures
        assert_eq!(catalog.column_names(), vec!["city", "name", "age"]);
    }

    #[test]
    fn test_resize_clamps_and_requires_start() {
        let catalog = ColumnCatalog::with_columns(vec![
            ColumnDefinition::text("name").with_width(100.0, 50.0, 300.0),
        ])
        .unwrap();

        // No start: no-ops
        assert_eq!(catalog.update_resize("name", 10.0), None);
        assert_eq!(catalog.end_resize("name"), None);
        assert_eq!(catalog.get_column("name").unwrap().width, 100.0);

        catalog.start_resize("name").unwrap();
        assert_eq!(catalog.update_resize("name", 10.0), Some(50.0));
        assert_eq!(catalog.update_resize("name", 1000.0), Some(300.0));
        assert_eq!(catalog.update_resize("name", 120.0), Some(120.0));
        assert_eq!(catalog.end_resize("name"), Some(120.0));

        // Second end is a no-op
        assert_eq!(catalog.end_resize("name"), None);
    }

    #[test]
    fn test_cancel_resize_restores_width() {
        let catalog = catalog();
        catalog.start_resize("age").unwrap();
        catalog.update_resize("age", 250.0);
        catalog.cancel_resize();
        assert_eq!(catalog.get_column("age").unwrap().width, 100.0);
        assert!(!catalog.is_resizing("age"));
    }

    #[test]
    fn test_remove_renumbers() {
        let catalog = catalog();
        catalog.remove_column("name").unwrap();
        assert_eq!(catalog.get_column("city").unwrap().display_order, 1);
        assert!(catalog.remove_column("name").unwrap_err().is_not_found());
    }
}
