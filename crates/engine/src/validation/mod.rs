//! Rule-based row and cell validation.

pub mod cache;
pub mod engine;
pub mod result;
pub mod rules;

pub use cache::ValidationCache;
pub use engine::{ProgressFn, RuleError, RuleOutcome, ValidationContext, ValidationEngine};
pub use result::{
    format_alerts, RowValidationResult, RuleStatistics, ValidationProgress, ValidationResult,
    ValidationStatistics,
};
pub use rules::{
    AsyncRowCheck, CellPredicate, LogicalOperator, RowPredicate, RuleKind, Severity,
    ValidationRule, ValidationTrigger,
};
