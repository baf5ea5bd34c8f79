//! Grid Session - one independent grid instance
//!
//! Owns one of every engine plus the options and the notification sink.
//! Nothing is static, so several sessions in one process don't interfere.
//!
//! Each command does its store work, tells the batch coordinator what
//! changed (which forwards or defers the notification), and then runs
//! validation if the automation settings ask for it.

use std::ops::Range;
use std::sync::Arc;

use tablegrid_config::{AutoValidationEvent, GridOptions, ValidationAutomationSettings};

use crate::batch::{BatchCoordinator, CellUpdate};
use crate::cancel::CancelToken;
use crate::columns::ColumnCatalog;
use crate::error::{GridError, GridResult};
use crate::events::{GridNotifier, NullNotifier, OperationType};
use crate::filter::{FilterCriterion, FilterEngine};
use crate::row::Row;
use crate::row_numbers::RowNumberService;
use crate::row_store::RowStore;
use crate::search::{SearchEngine, SearchMatch, SearchOptions};
use crate::sort::{SortDescriptor, SortDirection, SortEngine, SortOutcome};
use crate::validation::{
    RowValidationResult, ValidationCache, ValidationContext, ValidationEngine,
    ValidationProgress, ValidationResult, ValidationStatistics,
};
use crate::value::CellValue;

/// What `paste_block` wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PasteOutcome {
    /// Existing plus appended rows touched
    pub rows_affected: usize,
    pub rows_added: usize,
    pub cells_written: usize,
}

pub struct GridSession {
    options: GridOptions,
    store: Arc<RowStore>,
    catalog: Arc<ColumnCatalog>,
    row_numbers: RowNumberService,
    validation: ValidationEngine,
    sort: SortEngine,
    filter: FilterEngine,
    search: SearchEngine,
    batch: BatchCoordinator,
}

impl GridSession {
    pub fn new(options: GridOptions, catalog: ColumnCatalog, notifier: Arc<dyn GridNotifier>) -> Self {
        let store = Arc::new(RowStore::new());
        let catalog = Arc::new(catalog);
        let cache = Arc::new(ValidationCache::new());

        Self {
            row_numbers: RowNumberService::new(store.clone()),
            validation: ValidationEngine::new(store.clone(), catalog.clone(), cache, &options),
            sort: SortEngine::new(&options),
            filter: FilterEngine::with_catalog(catalog.clone()),
            search: SearchEngine::new(options.max_search_results),
            batch: BatchCoordinator::new(notifier),
            store,
            catalog,
            options,
        }
    }

    /// Default options, no notification sink.
    pub fn with_catalog(catalog: ColumnCatalog) -> Self {
        Self::new(GridOptions::default(), catalog, Arc::new(NullNotifier))
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    pub fn store(&self) -> &RowStore {
        &self.store
    }

    pub fn catalog(&self) -> &ColumnCatalog {
        &self.catalog
    }

    pub fn row_numbers(&self) -> &RowNumberService {
        &self.row_numbers
    }

    pub fn validation(&self) -> &ValidationEngine {
        &self.validation
    }

    pub fn sort_engine(&self) -> &SortEngine {
        &self.sort
    }

    pub fn filter(&self) -> &FilterEngine {
        &self.filter
    }

    pub fn search_engine(&self) -> &SearchEngine {
        &self.search
    }

    pub fn batch(&self) -> &BatchCoordinator {
        &self.batch
    }

    pub fn set_validation_automation(&self, settings: ValidationAutomationSettings) {
        self.validation.set_automation(settings);
    }

    // -------------------------------------------------------------------------
    // Row commands
    // -------------------------------------------------------------------------

    /// Append imported rows. Returns the number added.
    pub async fn import_rows(&self, mut rows: Vec<Row>, cancel: &CancelToken) -> GridResult<usize> {
        cancel.check()?;
        self.prepare_new_rows(&mut rows);
        let start = self.store.get_row_count();
        let added = self.store.add_rows(rows);
        log::info!("imported {} rows", added);
        self.batch.notify_data_changed(added, OperationType::Import);

        self.auto_validate_range(AutoValidationEvent::Import, start..start + added, cancel)
            .await?;
        Ok(added)
    }

    pub async fn add_row(&self, row: Row, cancel: &CancelToken) -> GridResult<usize> {
        cancel.check()?;
        let mut row = row;
        self.prepare_new_rows(std::slice::from_mut(&mut row));
        let index = self.store.add_row(row);
        self.batch.notify_data_changed(1, OperationType::AddRow);

        self.auto_validate_range(AutoValidationEvent::RowAdd, index..index + 1, cancel)
            .await?;
        Ok(index)
    }

    pub async fn insert_row(&self, index: usize, row: Row, cancel: &CancelToken) -> GridResult<()> {
        cancel.check()?;
        let mut row = row;
        self.prepare_new_rows(std::slice::from_mut(&mut row));
        self.store.insert_row(index, row)?;
        self.validation.cache().invalidate_from(index);
        self.batch.notify_data_changed(1, OperationType::InsertRow);

        self.auto_validate_range(AutoValidationEvent::RowAdd, index..index + 1, cancel)
            .await
    }

    pub async fn update_row(&self, index: usize, row: Row, cancel: &CancelToken) -> GridResult<()> {
        cancel.check()?;
        self.store.update_row(index, row)?;
        self.validation.cache().invalidate_row(index);
        self.batch.notify_data_changed(1, OperationType::UpdateRow);

        self.auto_validate_range(AutoValidationEvent::CellEdit, index..index + 1, cancel)
            .await
    }

    /// Write one cell. In Automatic mode returns the cell's validation
    /// result (and refreshes the row's alerts); in Manual mode returns None.
    pub async fn update_cell(
        &self,
        index: usize,
        column: &str,
        value: CellValue,
        cancel: &CancelToken,
    ) -> GridResult<Option<ValidationResult>> {
        cancel.check()?;
        self.store.update_cell(index, column, value.clone())?;
        self.validation.cache().invalidate_row(index);
        self.batch.notify_data_changed(1, OperationType::UpdateCell);

        if !self.validation.should_auto_validate(AutoValidationEvent::CellEdit) {
            return Ok(None);
        }
        let result = self
            .validation
            .validate_cell(index, column, value, cancel)
            .await?;
        self.validation
            .validate_row(index, ValidationContext::automatic(), cancel)
            .await?;
        self.batch
            .notify_validation_changed(self.validation.error_count());
        Ok(Some(result))
    }

    pub async fn delete_row(&self, index: usize, cancel: &CancelToken) -> GridResult<Row> {
        cancel.check()?;
        let removed = self.store.remove_row(index)?;
        self.validation.cache().invalidate_from(index);
        self.batch.notify_data_changed(1, OperationType::DeleteRows);

        let count = self.store.get_row_count();
        self.auto_validate_range(AutoValidationEvent::RowDelete, index..count, cancel)
            .await?;
        Ok(removed)
    }

    /// Remove several rows. Duplicates and stale indices are ignored;
    /// returns the number removed.
    pub async fn delete_rows(&self, indices: &[usize], cancel: &CancelToken) -> GridResult<usize> {
        cancel.check()?;
        let removed = self.store.remove_rows(indices);
        if removed == 0 {
            return Ok(0);
        }
        let first = indices.iter().copied().min().unwrap_or(0);
        self.validation.cache().invalidate_from(first);
        self.batch.notify_data_changed(removed, OperationType::DeleteRows);

        let count = self.store.get_row_count();
        self.auto_validate_range(AutoValidationEvent::RowDelete, first..count, cancel)
            .await?;
        Ok(removed)
    }

    /// Paste a block of text cells starting at (`start_row`, `start_column`).
    ///
    /// Columns run across the visible writable data columns in display
    /// order; cells past the last column are dropped. Rows past the end of
    /// the store are appended. Text is converted to each column's declared
    /// type; text that doesn't convert is stored as-is for validation to
    /// flag. Runs as one batch unless a batch is already open.
    pub async fn paste_block(
        &self,
        start_row: usize,
        start_column: &str,
        block: &[Vec<String>],
        cancel: &CancelToken,
    ) -> GridResult<PasteOutcome> {
        cancel.check()?;
        let columns: Vec<_> = self
            .catalog
            .get_visible_columns()
            .into_iter()
            .filter(|c| c.is_writable_data())
            .collect();
        let first = columns
            .iter()
            .position(|c| c.name == start_column)
            .ok_or_else(|| GridError::ColumnNotFound(start_column.to_string()))?;
        let targets = &columns[first..];

        let owns_batch = !self.batch.is_batching();
        if owns_batch {
            self.batch.begin_batch_update();
        }

        // Rows written before a cancellation stay written and are reported
        let rows_before = self.store.get_row_count();
        let (outcome, written) = self.write_block(start_row, targets, block, cancel);
        self.validation.cache().invalidate_from(start_row.min(rows_before));
        self.batch
            .notify_data_changed(outcome.rows_affected, OperationType::Paste);

        let result = match written {
            Ok(()) => {
                let end = (start_row + block.len()).min(self.store.get_row_count());
                self.auto_validate_range(
                    AutoValidationEvent::Paste,
                    start_row.min(rows_before)..end,
                    cancel,
                )
                .await
            }
            Err(e) => Err(e),
        };
        if owns_batch {
            self.batch.end_batch_update();
        }
        result.map(|_| outcome)
    }

    /// Returns what was written even when it stops early.
    fn write_block(
        &self,
        start_row: usize,
        targets: &[crate::columns::ColumnDefinition],
        block: &[Vec<String>],
        cancel: &CancelToken,
    ) -> (PasteOutcome, GridResult<()>) {
        let mut outcome = PasteOutcome::default();

        let missing = (start_row + block.len()).saturating_sub(self.store.get_row_count());
        let mut fresh = vec![Row::new(); missing];
        self.prepare_new_rows(&mut fresh);
        let mut fresh = fresh.into_iter();

        for (offset, cells) in block.iter().enumerate() {
            if let Err(e) = cancel.check() {
                return (outcome, Err(e));
            }
            let index = start_row + offset;

            // Gap rows in front of the block, then the block row itself
            while self.store.get_row_count() <= index {
                let Some(row) = fresh.next() else { break };
                let at = self.store.add_row(row);
                outcome.rows_added += 1;
                if at < index {
                    outcome.rows_affected += 1;
                }
            }

            match self
                .store
                .with_row_mut(index, |row| fill_pasted_cells(row, cells, targets))
            {
                Ok(n) => {
                    outcome.cells_written += n;
                    outcome.rows_affected += 1;
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return (outcome, Err(e)),
            }
        }
        (outcome, Ok(()))
    }

    pub fn clear_all_rows(&self) -> usize {
        let removed = self.store.clear_all_rows();
        self.validation.cache().clear();
        self.search.clear();
        self.batch.notify_data_changed(removed, OperationType::Clear);
        removed
    }

    /// Snapshot of the rows that pass the active filters.
    pub fn get_current_data(&self) -> Vec<Row> {
        self.filter.current_data(&self.store)
    }

    pub fn get_all_rows(&self) -> Vec<Row> {
        self.store.get_all_rows()
    }

    pub fn get_row_count(&self) -> usize {
        self.store.get_row_count()
    }

    // -------------------------------------------------------------------------
    // Sort / filter / search
    // -------------------------------------------------------------------------

    pub fn sort_by(&self, descriptors: &[SortDescriptor], cancel: &CancelToken) -> GridResult<SortOutcome> {
        let outcome = self.sort.sort(&self.store, &self.catalog, descriptors, cancel)?;
        if outcome.rows_sorted > 0 {
            self.validation.cache().clear();
            self.batch.notify_data_changed(outcome.rows_sorted, OperationType::Sort);
        }
        Ok(outcome)
    }

    pub fn toggle_sort(&self, column: &str, cancel: &CancelToken) -> GridResult<SortDirection> {
        let direction = self
            .sort
            .toggle_sort_direction(&self.store, &self.catalog, column, cancel)?;
        if direction != SortDirection::None {
            self.validation.cache().clear();
            self.batch
                .notify_data_changed(self.store.get_row_count(), OperationType::Sort);
        }
        Ok(direction)
    }

    /// Replace the active filters. Returns the visible row count.
    pub fn apply_filters(&self, criteria: Vec<FilterCriterion>) -> GridResult<usize> {
        self.filter.set_filters(criteria)?;
        Ok(self.filter.visible_indices(&self.store).len())
    }

    pub fn clear_filters(&self) {
        self.filter.clear_filters();
    }

    pub fn search(&self, term: &str, options: SearchOptions) -> GridResult<Vec<SearchMatch>> {
        self.search.search(&self.store, &self.catalog, term, options)
    }

    // -------------------------------------------------------------------------
    // Explicit validation
    // -------------------------------------------------------------------------

    pub async fn validate_cell(
        &self,
        index: usize,
        column: &str,
        value: CellValue,
        cancel: &CancelToken,
    ) -> GridResult<ValidationResult> {
        self.validation.validate_cell(index, column, value, cancel).await
    }

    pub async fn validate_row(&self, index: usize, cancel: &CancelToken) -> GridResult<RowValidationResult> {
        let result = self
            .validation
            .validate_row(index, ValidationContext::explicit(), cancel)
            .await?;
        self.batch
            .notify_validation_changed(self.validation.error_count());
        Ok(result)
    }

    pub async fn validate_all(&self, cancel: &CancelToken) -> GridResult<ValidationStatistics> {
        let stats = self.validation.validate_all_with_statistics(cancel).await?;
        self.batch.notify_validation_changed(stats.invalid_rows);
        Ok(stats)
    }

    pub async fn are_all_non_empty_rows_valid(
        &self,
        only_filtered: bool,
        only_checked: bool,
        cancel: &CancelToken,
    ) -> GridResult<bool> {
        self.validation
            .are_all_non_empty_rows_valid(only_filtered, only_checked, Some(&self.filter), cancel)
            .await
    }

    // -------------------------------------------------------------------------
    // Batch passthroughs
    // -------------------------------------------------------------------------

    pub fn begin_batch_update(&self) {
        self.batch.begin_batch_update();
    }

    pub fn end_batch_update(&self) -> Option<crate::events::DataChangedEvent> {
        self.batch.end_batch_update()
    }

    pub fn batch_update_cells(&self, updates: Vec<CellUpdate>, cancel: &CancelToken) -> GridResult<usize> {
        for update in &updates {
            self.validation.cache().invalidate_row(update.row_index);
        }
        self.batch.batch_update_cells(&self.store, updates, cancel)
    }

    pub fn batch_update_column(&self, column: &str, value: CellValue, cancel: &CancelToken) -> GridResult<usize> {
        self.validation.cache().clear();
        self.batch
            .batch_update_column(&self.store, column, value, cancel)
    }

    pub fn batch_delete_rows(&self, indices: &[usize]) -> usize {
        if let Some(first) = indices.iter().copied().min() {
            self.validation.cache().invalidate_from(first);
        }
        self.batch.batch_delete_rows(&self.store, indices)
    }

    pub fn batch_transform<F>(&self, transform: F, cancel: &CancelToken) -> GridResult<usize>
    where
        F: Fn(usize, &mut Row) -> bool,
    {
        self.validation.cache().clear();
        self.batch.batch_transform(&self.store, transform, cancel)
    }

    // -------------------------------------------------------------------------
    // Row numbers
    // -------------------------------------------------------------------------

    pub async fn regenerate_row_numbers(&self, cancel: &CancelToken) -> GridResult<usize> {
        let count = self.row_numbers.regenerate_row_numbers(cancel).await?;
        self.batch
            .notify_data_changed(count, OperationType::RowNumbers);
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Internal
    // -------------------------------------------------------------------------

    /// Fill column defaults and hand out row numbers to rows about to be
    /// added.
    fn prepare_new_rows(&self, rows: &mut [Row]) {
        let defaults: Vec<(String, CellValue)> = self
            .catalog
            .get_columns()
            .into_iter()
            .filter(|c| c.role.is_data() && !c.default_value.is_null())
            .map(|c| (c.name, c.default_value))
            .collect();

        let mut next = self.row_numbers.get_next_row_number();
        for row in rows.iter_mut() {
            for (column, value) in &defaults {
                if !row.contains(column) {
                    row.set(column.as_str(), value.clone());
                }
            }
            if row.row_number().to_i64().is_err() {
                row.set_row_number(next);
                next += 1;
            }
        }
    }

    async fn auto_validate_range(
        &self,
        event: AutoValidationEvent,
        range: Range<usize>,
        cancel: &CancelToken,
    ) -> GridResult<()> {
        if range.is_empty() || !self.validation.should_auto_validate(event) {
            return Ok(());
        }
        let indices: Vec<usize> = range.collect();
        let total = indices.len();
        let progress = |p: ValidationProgress| {
            self.batch.notify_progress(
                "validation",
                p.percent(),
                format!("{}/{} rows", p.processed, total),
            )
        };

        self.validation
            .validate_rows_batch(&indices, ValidationContext::automatic(), Some(&progress), cancel)
            .await?;
        self.batch
            .notify_validation_changed(self.validation.error_count());
        Ok(())
    }
}

/// Write one pasted line across `targets`. Text that doesn't convert to the
/// column's type is stored as-is. Returns the number of cells written.
fn fill_pasted_cells(
    row: &mut Row,
    cells: &[String],
    targets: &[crate::columns::ColumnDefinition],
) -> usize {
    let mut written = 0;
    for (text, column) in cells.iter().zip(targets) {
        let value = CellValue::parse_as(text, column.data_type)
            .unwrap_or_else(|_| CellValue::Text(text.clone()));
        row.set(column.name.as_str(), value);
        written += 1;
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnDefinition;
    use crate::events::EventCollector;
    use crate::validation::ValidationRule;

    fn session() -> (Arc<EventCollector>, GridSession) {
        let events = Arc::new(EventCollector::new());
        let catalog = ColumnCatalog::with_columns(vec![
            ColumnDefinition::row_number("#"),
            ColumnDefinition::integer("id"),
            ColumnDefinition::text("name"),
            ColumnDefinition::text("status").with_default(CellValue::from("new")),
            ColumnDefinition::validation_alerts(),
        ])
        .unwrap();
        let session = GridSession::new(GridOptions::default(), catalog, events.clone());
        (events, session)
    }

    #[tokio::test]
    async fn test_import_numbers_rows_and_fills_defaults() {
        let (events, session) = session();
        let cancel = CancelToken::none();
        let rows = (1..=3i64).map(|i| Row::from_pairs([("id", i)])).collect();

        assert_eq!(session.import_rows(rows, &cancel).await.unwrap(), 3);
        assert!(session.row_numbers().validate_row_numbers());
        let row = session.store().get_row(2).unwrap();
        assert_eq!(row.row_number(), &CellValue::Int(3));
        assert_eq!(row.get("status"), &CellValue::from("new"));

        let data = events.data_changed_events();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].operation, OperationType::Import);
    }

    #[tokio::test]
    async fn test_update_cell_validates_in_automatic_mode_only() {
        let (_events, session) = session();
        let cancel = CancelToken::none();
        session.validation().add_rule(ValidationRule::required("name", "name")).unwrap();
        session
            .import_rows(vec![Row::new().with("id", 1).with("name", "a")], &cancel)
            .await
            .unwrap();

        let result = session
            .update_cell(0, "name", CellValue::Null, &cancel)
            .await
            .unwrap()
            .unwrap();
        assert!(!result.is_valid);
        assert!(!session.store().get_cell(0, "ValidationAlerts").unwrap().is_null());

        session.set_validation_automation(ValidationAutomationSettings::manual());
        assert!(session
            .update_cell(0, "name", CellValue::Null, &cancel)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_paste_extends_rows_and_converts_types() {
        let (events, session) = session();
        let cancel = CancelToken::none();
        session
            .import_rows(vec![Row::from_pairs([("id", 1)])], &cancel)
            .await
            .unwrap();
        events.clear();

        let block = vec![
            vec!["10".to_string(), "ten".to_string(), "x".to_string(), "dropped".to_string()],
            vec!["oops".to_string(), "eleven".to_string()],
        ];
        let outcome = session.paste_block(0, "id", &block, &cancel).await.unwrap();
        assert_eq!(outcome.rows_added, 1);
        assert_eq!(outcome.rows_affected, 2);
        assert_eq!(outcome.cells_written, 5);

        assert_eq!(session.store().get_cell(0, "id"), Some(CellValue::Int(10)));
        assert_eq!(session.store().get_cell(1, "id"), Some(CellValue::from("oops")));
        assert_eq!(session.store().get_cell(1, "name"), Some(CellValue::from("eleven")));
        assert_eq!(session.store().get_cell(0, "status"), Some(CellValue::from("x")));
        assert_eq!(session.store().get_cell(1, "status"), Some(CellValue::from("new")));
        assert_eq!(events.data_changed_events().len(), 1);
    }

    #[test]
    fn test_cancelled_paste_reports_rows_already_written() {
        let (events, session) = session();
        session.set_validation_automation(ValidationAutomationSettings::manual());
        let block: Vec<Vec<String>> = (0..20_000)
            .map(|i| vec![i.to_string(), "pasted".to_string()])
            .collect();
        let cancel = CancelToken::new();

        let result = std::thread::scope(|s| {
            let watcher = cancel.clone();
            let store = session.store();
            s.spawn(move || {
                while store.get_row_count() < 100 {
                    std::thread::yield_now();
                }
                watcher.cancel();
            });
            futures::executor::block_on(session.paste_block(0, "id", &block, &cancel))
        });

        match result {
            Err(e) => assert!(e.is_cancelled()),
            Ok(outcome) => assert_eq!(outcome.rows_affected, 20_000),
        }
        // Every appended row was written, and the single batch event counts them
        let written = session.store().get_row_count();
        assert!(written >= 100);
        assert_eq!(events.len(), 1);
        let data = events.data_changed_events();
        assert_eq!(data[0].operation, OperationType::Batch);
        assert_eq!(data[0].affected_row_count, written);
        assert_eq!(
            session.store().get_cell(written - 1, "name"),
            Some(CellValue::from("pasted"))
        );
        assert!(!session.batch().is_batching());
    }

    #[tokio::test]
    async fn test_paste_unknown_column() {
        let (_events, session) = session();
        let err = session
            .paste_block(0, "ValidationAlerts", &[vec!["x".into()]], &CancelToken::none())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!session.batch().is_batching());
    }

    #[tokio::test]
    async fn test_delete_rows_lenient() {
        let (_events, session) = session();
        let cancel = CancelToken::none();
        let rows = (0..4i64).map(|i| Row::from_pairs([("id", i)])).collect();
        session.import_rows(rows, &cancel).await.unwrap();

        assert_eq!(session.delete_rows(&[3, 3, 42], &cancel).await.unwrap(), 1);
        assert_eq!(session.get_row_count(), 3);
        assert!(session.delete_row(9, &cancel).await.unwrap_err().is_not_found());
    }

    #[test]
    fn test_sessions_are_independent() {
        let (_a_events, a) = session();
        let (_b_events, b) = session();
        a.begin_batch_update();
        assert!(a.batch().is_batching());
        assert!(!b.batch().is_batching());
    }
}
