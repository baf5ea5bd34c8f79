use thiserror::Error;

/// Errors surfaced by engine operations.
///
/// Validation failures are not errors; they come back as
/// [`ValidationResult`](crate::validation::ValidationResult) values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    /// Stale or unknown row position.
    #[error("row {index} not found (row count {count})")]
    RowNotFound { index: usize, count: usize },

    /// Insert position past the end of the store.
    #[error("index {index} out of range (row count {count})")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    #[error("column '{0}' already exists")]
    DuplicateColumn(String),

    #[error("special role {role} already held by column '{existing}'")]
    DuplicateSpecialRole { role: String, existing: String },

    /// Reorder input was not a permutation of the current column names.
    #[error("invalid column order: {0}")]
    InvalidColumnOrder(String),

    #[error("column '{0}' is not filterable")]
    ColumnNotFilterable(String),

    #[error("column '{0}' is not sortable")]
    ColumnNotSortable(String),

    #[error("validation rule '{0}' already exists")]
    DuplicateRule(String),

    #[error("validation rule '{0}' not found")]
    RuleNotFound(String),

    /// Rule definition rejected before it was registered (bad regex, empty group).
    #[error("invalid rule: {0}")]
    InvalidRule(String),

    /// Cooperative cancellation. Work committed before the check stays committed.
    #[error("operation cancelled")]
    Cancelled,

    #[error("cannot convert '{value}' to {target}")]
    Coercion { value: String, target: &'static str },

    #[error("internal failure: {0}")]
    Internal(String),
}

impl GridError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GridError::RowNotFound { .. } | GridError::ColumnNotFound(_) | GridError::RuleNotFound(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            GridError::DuplicateColumn(_)
                | GridError::DuplicateSpecialRole { .. }
                | GridError::InvalidColumnOrder(_)
                | GridError::ColumnNotFilterable(_)
                | GridError::ColumnNotSortable(_)
                | GridError::DuplicateRule(_)
                | GridError::InvalidRule(_)
                | GridError::IndexOutOfRange { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GridError::Cancelled)
    }
}

pub type GridResult<T> = Result<T, GridError>;
