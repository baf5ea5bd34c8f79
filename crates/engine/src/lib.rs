pub mod batch;
pub mod cancel;
pub mod columns;
pub mod error;
pub mod events;
pub mod filter;
pub mod row;
pub mod row_numbers;
pub mod row_store;
pub mod search;
pub mod session;
pub mod sort;
pub mod validation;
pub mod value;

pub use batch::{BatchCoordinator, CellUpdate};
pub use cancel::CancelToken;
pub use columns::{ColumnCatalog, ColumnDefinition, SpecialColumnRole};
pub use error::{GridError, GridResult};
pub use events::{
    DataChangedEvent, EventCollector, GridEvent, GridNotifier, NullNotifier,
    OperationProgressEvent, OperationType, ValidationChangedEvent,
};
pub use filter::{FilterCriterion, FilterEngine, FilterOperator, RowView};
pub use row::Row;
pub use row_numbers::RowNumberService;
pub use row_store::RowStore;
pub use search::{SearchEngine, SearchMatch, SearchOptions};
pub use session::{GridSession, PasteOutcome};
pub use sort::{SortDescriptor, SortDirection, SortEngine, SortOutcome};
pub use validation::{
    RowValidationResult, Severity, ValidationContext, ValidationEngine, ValidationResult,
    ValidationRule, ValidationStatistics,
};
pub use value::{CellValue, ColumnDataType};
