//! Event types for grid change notifications.
//!
//! The UI layer (out of scope here) implements [`GridNotifier`] and decides
//! whether to redraw. The engine emits at most one event per logical
//! operation, and none while a batch is open (see `batch.rs`).

use parking_lot::Mutex;

/// Kind of operation that changed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Import,
    AddRow,
    InsertRow,
    UpdateRow,
    UpdateCell,
    DeleteRows,
    Paste,
    Sort,
    Clear,
    ReplaceAll,
    RowNumbers,
    /// Accumulated changes flushed by `end_batch_update`
    Batch,
    BatchUpdateCells,
    BatchUpdateColumn,
    BatchTransform,
}

/// Events emitted toward the notification sink.
#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    DataChanged(DataChangedEvent),
    ValidationChanged(ValidationChangedEvent),
    OperationProgress(OperationProgressEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataChangedEvent {
    /// Rows (or cells, for cell-level batch ops) actually affected.
    pub affected_row_count: usize,
    pub operation: OperationType,
    /// Latest validation counts reported while a batch was open. Only set on
    /// the `Batch` event; everywhere else counts arrive as `ValidationChanged`.
    pub validation: Option<ValidationChangedEvent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationChangedEvent {
    pub error_count: usize,
    pub has_errors: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationProgressEvent {
    pub name: String,
    /// 0.0 ..= 100.0
    pub percent: f64,
    pub message: String,
}

/// Receiver of grid notifications.
pub trait GridNotifier: Send + Sync {
    fn data_changed(&self, event: DataChangedEvent);

    fn validation_changed(&self, event: ValidationChangedEvent);

    fn operation_progress(&self, _event: OperationProgressEvent) {}

    /// Dispatch a [`GridEvent`] to the matching method.
    fn notify(&self, event: GridEvent) {
        match event {
            GridEvent::DataChanged(e) => self.data_changed(e),
            GridEvent::ValidationChanged(e) => self.validation_changed(e),
            GridEvent::OperationProgress(e) => self.operation_progress(e),
        }
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl GridNotifier for NullNotifier {
    fn data_changed(&self, _event: DataChangedEvent) {}

    fn validation_changed(&self, _event: ValidationChangedEvent) {}
}

/// Thread-safe event collector for testing.
#[derive(Default)]
pub struct EventCollector {
    events: Mutex<Vec<GridEvent>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: GridEvent) {
        self.events.lock().push(event);
    }

    pub fn events(&self) -> Vec<GridEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Filter to only DataChanged events.
    pub fn data_changed_events(&self) -> Vec<DataChangedEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                GridEvent::DataChanged(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    /// Filter to only ValidationChanged events.
    pub fn validation_changed_events(&self) -> Vec<ValidationChangedEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                GridEvent::ValidationChanged(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    /// Filter to only OperationProgress events.
    pub fn progress_events(&self) -> Vec<OperationProgressEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                GridEvent::OperationProgress(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }
}

impl GridNotifier for EventCollector {
    fn data_changed(&self, event: DataChangedEvent) {
        self.push(GridEvent::DataChanged(event));
    }

    fn validation_changed(&self, event: ValidationChangedEvent) {
        self.push(GridEvent::ValidationChanged(event));
    }

    fn operation_progress(&self, event: OperationProgressEvent) {
        self.push(GridEvent::OperationProgress(event));
    }
}
