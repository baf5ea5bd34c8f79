//! Batch Coordinator - brackets multi-step mutations behind one notification
//!
//! Two states over a single flag: normal and batched. Not nestable:
//! - `begin_batch_update` while batched is a no-op
//! - `end_batch_update` while normal is a no-op
//!
//! The coordinator is also the notification gate for the whole session.
//! Outside a batch every notification is forwarded as it happens. Inside a
//! batch, data changes are summed, the latest validation counts are kept,
//! and progress is dropped; `end_batch_update` then emits exactly one
//! `DataChanged`, carrying those validation counts if any arrived.
//!
//! Batch primitives write to the store immediately; only the notification
//! is deferred.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cancel::CancelToken;
use crate::error::GridResult;
use crate::events::{
    DataChangedEvent, GridNotifier, NullNotifier, OperationProgressEvent, OperationType,
    ValidationChangedEvent,
};
use crate::row::Row;
use crate::row_store::RowStore;
use crate::value::CellValue;

/// One cell write for `batch_update_cells`.
#[derive(Debug, Clone, PartialEq)]
pub struct CellUpdate {
    pub row_index: usize,
    pub column: String,
    pub value: CellValue,
}

impl CellUpdate {
    pub fn new(row_index: usize, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self {
            row_index,
            column: column.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    affected: usize,
    validation: Option<ValidationChangedEvent>,
}

pub struct BatchCoordinator {
    notifier: Arc<dyn GridNotifier>,
    batching: AtomicBool,
    pending: Mutex<Pending>,
}

impl Default for BatchCoordinator {
    fn default() -> Self {
        Self::new(Arc::new(NullNotifier))
    }
}

impl BatchCoordinator {
    pub fn new(notifier: Arc<dyn GridNotifier>) -> Self {
        Self {
            notifier,
            batching: AtomicBool::new(false),
            pending: Mutex::new(Pending::default()),
        }
    }

    pub fn is_batching(&self) -> bool {
        self.batching.load(Ordering::SeqCst)
    }

    pub fn begin_batch_update(&self) {
        if self.batching.swap(true, Ordering::SeqCst) {
            log::debug!("begin_batch_update ignored: already batching");
            return;
        }
        *self.pending.lock() = Pending::default();
        log::debug!("batch update started");
    }

    /// Leave batch mode and emit the accumulated notification. Returns the
    /// `DataChanged` event sent, or None when no batch was open.
    pub fn end_batch_update(&self) -> Option<DataChangedEvent> {
        if !self.batching.swap(false, Ordering::SeqCst) {
            return None;
        }
        let pending = std::mem::take(&mut *self.pending.lock());

        let event = DataChangedEvent {
            affected_row_count: pending.affected,
            operation: OperationType::Batch,
            validation: pending.validation,
        };
        log::debug!("batch update ended: {} affected", pending.affected);
        self.notifier.data_changed(event.clone());
        Some(event)
    }

    // -------------------------------------------------------------------------
    // Notification gate
    // -------------------------------------------------------------------------

    pub fn notify_data_changed(&self, affected_row_count: usize, operation: OperationType) {
        if self.is_batching() {
            self.pending.lock().affected += affected_row_count;
            return;
        }
        self.notifier.data_changed(DataChangedEvent {
            affected_row_count,
            operation,
            validation: None,
        });
    }

    pub fn notify_validation_changed(&self, error_count: usize) {
        let event = ValidationChangedEvent {
            error_count,
            has_errors: error_count > 0,
        };
        if self.is_batching() {
            self.pending.lock().validation = Some(event);
            return;
        }
        self.notifier.validation_changed(event);
    }

    /// Dropped while batching.
    pub fn notify_progress(&self, name: &str, percent: f64, message: impl Into<String>) {
        if self.is_batching() {
            return;
        }
        self.notifier.operation_progress(OperationProgressEvent {
            name: name.to_string(),
            percent: percent.clamp(0.0, 100.0),
            message: message.into(),
        });
    }

    // -------------------------------------------------------------------------
    // Batch primitives
    // -------------------------------------------------------------------------

    /// Apply cell writes in order. Returns the number applied; writes to rows
    /// that no longer exist are skipped.
    ///
    /// On cancellation, writes already applied stay applied and are still
    /// reported.
    pub fn batch_update_cells(
        &self,
        store: &RowStore,
        updates: Vec<CellUpdate>,
        cancel: &CancelToken,
    ) -> GridResult<usize> {
        let mut applied = 0;
        let mut result = Ok(());
        for update in updates {
            if let Err(e) = cancel.check() {
                result = Err(e);
                break;
            }
            if store
                .update_cell(update.row_index, &update.column, update.value)
                .is_ok()
            {
                applied += 1;
            }
        }
        self.notify_data_changed(applied, OperationType::BatchUpdateCells);
        result.map(|_| applied)
    }

    /// Set `column` to `value` on every row. Returns the number of rows
    /// written.
    pub fn batch_update_column(
        &self,
        store: &RowStore,
        column: &str,
        value: CellValue,
        cancel: &CancelToken,
    ) -> GridResult<usize> {
        let mut applied = 0;
        let mut result = Ok(());
        for index in 0..store.get_row_count() {
            if let Err(e) = cancel.check() {
                result = Err(e);
                break;
            }
            if store.update_cell(index, column, value.clone()).is_ok() {
                applied += 1;
            }
        }
        self.notify_data_changed(applied, OperationType::BatchUpdateColumn);
        result.map(|_| applied)
    }

    /// Remove rows by position. Duplicates and out-of-range indices are
    /// ignored; returns the number actually removed.
    pub fn batch_delete_rows(&self, store: &RowStore, indices: &[usize]) -> usize {
        let removed = store.remove_rows(indices);
        self.notify_data_changed(removed, OperationType::DeleteRows);
        removed
    }

    /// Run `transform` on every row; it returns whether it changed the row.
    /// Returns the number of rows changed.
    pub fn batch_transform<F>(
        &self,
        store: &RowStore,
        transform: F,
        cancel: &CancelToken,
    ) -> GridResult<usize>
    where
        F: Fn(usize, &mut Row) -> bool,
    {
        let mut changed = 0;
        let mut result = Ok(());
        for index in 0..store.get_row_count() {
            if let Err(e) = cancel.check() {
                result = Err(e);
                break;
            }
            if let Ok(true) = store.with_row_mut(index, |row| transform(index, row)) {
                changed += 1;
            }
        }
        self.notify_data_changed(changed, OperationType::BatchTransform);
        result.map(|_| changed)
    }
}
