//! Validation rule definitions.
//!
//! A rule has a unique name, target columns, a severity and an automation
//! trigger. What it checks is one of the closed [`RuleKind`] variants.
//! Closure-backed kinds return `Result<bool, String>`: `Ok(false)` is a
//! violation, `Err` means the rule itself broke.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};
use crate::row::Row;
use crate::value::CellValue;

/// Ordered: Info < Warning < Error < Critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    #[default]
    Error,
    Critical,
}

impl Severity {
    /// Failures at this level make the row invalid.
    pub fn is_blocking(&self) -> bool {
        *self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// When a rule runs automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ValidationTrigger {
    /// Explicit validation calls only
    Manual,
    #[default]
    OnCellChanged,
    OnTextChanged,
    OnCellExit,
    OnRowComplete,
    Bulk,
}

impl ValidationTrigger {
    /// Triggers that fire while a cell is being edited.
    pub fn is_real_time(&self) -> bool {
        matches!(
            self,
            ValidationTrigger::OnCellChanged
                | ValidationTrigger::OnTextChanged
                | ValidationTrigger::OnCellExit
        )
    }
}

/// How group members combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOperator {
    /// All must pass; every member is evaluated
    And,
    /// One must pass; every member is evaluated
    Or,
    /// All must pass; stops at the first failure
    AndAlso,
    /// One must pass; stops at the first success
    OrElse,
}

impl LogicalOperator {
    pub fn short_circuits(&self) -> bool {
        matches!(self, LogicalOperator::AndAlso | LogicalOperator::OrElse)
    }

    pub fn requires_all(&self) -> bool {
        matches!(self, LogicalOperator::And | LogicalOperator::AndAlso)
    }
}

/// Single-cell predicate: (value, whole row)
pub type CellPredicate = Arc<dyn Fn(&CellValue, &Row) -> Result<bool, String> + Send + Sync>;
/// Whole-row predicate
pub type RowPredicate = Arc<dyn Fn(&Row) -> Result<bool, String> + Send + Sync>;
/// Async whole-row check (e.g. a lookup against a remote service)
pub type AsyncRowCheck = Arc<dyn Fn(Row) -> BoxFuture<'static, Result<bool, String>> + Send + Sync>;

#[derive(Clone)]
pub enum RuleKind {
    /// Value must be non-empty
    Required,
    /// Numeric value within inclusive bounds
    Range { min: Option<f64>, max: Option<f64> },
    /// Text rendering must match
    Regex { pattern: Regex },
    CustomFunction { predicate: CellPredicate },
    /// Predicate over several columns of the row
    CrossColumn { predicate: RowPredicate },
    /// `rule` only runs when `condition` holds
    Conditional {
        condition: RowPredicate,
        rule: Box<ValidationRule>,
    },
    Async {
        check: AsyncRowCheck,
        /// None = engine default
        timeout: Option<Duration>,
    },
    Group {
        operator: LogicalOperator,
        rules: Vec<ValidationRule>,
    },
}

impl RuleKind {
    /// Evaluated once per target column (vs. once per row).
    pub fn is_column_scoped(&self) -> bool {
        matches!(
            self,
            RuleKind::Required
                | RuleKind::Range { .. }
                | RuleKind::Regex { .. }
                | RuleKind::CustomFunction { .. }
        )
    }

    fn label(&self) -> &'static str {
        match self {
            RuleKind::Required => "Required",
            RuleKind::Range { .. } => "Range",
            RuleKind::Regex { .. } => "Regex",
            RuleKind::CustomFunction { .. } => "CustomFunction",
            RuleKind::CrossColumn { .. } => "CrossColumn",
            RuleKind::Conditional { .. } => "Conditional",
            RuleKind::Async { .. } => "Async",
            RuleKind::Group { .. } => "Group",
        }
    }
}

impl fmt::Debug for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::Range { min, max } => f
                .debug_struct("Range")
                .field("min", min)
                .field("max", max)
                .finish(),
            RuleKind::Regex { pattern } => f
                .debug_struct("Regex")
                .field("pattern", &pattern.as_str())
                .finish(),
            RuleKind::Conditional { rule, .. } => f
                .debug_struct("Conditional")
                .field("rule", rule)
                .finish_non_exhaustive(),
            RuleKind::Async { timeout, .. } => f
                .debug_struct("Async")
                .field("timeout", timeout)
                .finish_non_exhaustive(),
            RuleKind::Group { operator, rules } => f
                .debug_struct("Group")
                .field("operator", operator)
                .field("rules", rules)
                .finish(),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationRule {
    /// Unique within an engine.
    pub name: String,
    /// Target columns. Empty = row-level rule.
    pub columns: Vec<String>,
    pub severity: Severity,
    pub trigger: ValidationTrigger,
    /// Failure text; `{column}` is replaced with the failing column.
    /// Empty = a default per kind.
    pub message: String,
    pub enabled: bool,
    pub kind: RuleKind,
}

impl ValidationRule {
    pub fn new(name: impl Into<String>, columns: Vec<String>, kind: RuleKind) -> Self {
        Self {
            name: name.into(),
            columns,
            severity: Severity::Error,
            trigger: ValidationTrigger::OnCellChanged,
            message: String::new(),
            enabled: true,
            kind,
        }
    }

    pub fn required(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(name, vec![column.into()], RuleKind::Required)
    }

    pub fn range(
        name: impl Into<String>,
        column: impl Into<String>,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Self {
        Self::new(name, vec![column.into()], RuleKind::Range { min, max })
    }

    /// Fails with `InvalidRule` when the pattern doesn't compile.
    pub fn regex(
        name: impl Into<String>,
        column: impl Into<String>,
        pattern: &str,
    ) -> GridResult<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| GridError::InvalidRule(format!("bad pattern '{}': {}", pattern, e)))?;
        Ok(Self::new(name, vec![column.into()], RuleKind::Regex { pattern }))
    }

    pub fn custom<F>(name: impl Into<String>, column: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&CellValue, &Row) -> Result<bool, String> + Send + Sync + 'static,
    {
        Self::new(
            name,
            vec![column.into()],
            RuleKind::CustomFunction {
                predicate: Arc::new(predicate),
            },
        )
    }

    pub fn cross_column<F>(name: impl Into<String>, columns: Vec<String>, predicate: F) -> Self
    where
        F: Fn(&Row) -> Result<bool, String> + Send + Sync + 'static,
    {
        Self::new(
            name,
            columns,
            RuleKind::CrossColumn {
                predicate: Arc::new(predicate),
            },
        )
    }

    /// Wrap `rule` so it only runs when `condition` holds. Targets, severity
    /// and trigger are taken from the inner rule.
    pub fn conditional<F>(name: impl Into<String>, condition: F, rule: ValidationRule) -> Self
    where
        F: Fn(&Row) -> Result<bool, String> + Send + Sync + 'static,
    {
        let columns = rule.columns.clone();
        let severity = rule.severity;
        let trigger = rule.trigger;
        Self::new(
            name,
            columns,
            RuleKind::Conditional {
                condition: Arc::new(condition),
                rule: Box::new(rule),
            },
        )
        .with_severity(severity)
        .with_trigger(trigger)
    }

    pub fn async_check<F>(name: impl Into<String>, columns: Vec<String>, check: F) -> Self
    where
        F: Fn(Row) -> BoxFuture<'static, Result<bool, String>> + Send + Sync + 'static,
    {
        Self::new(
            name,
            columns,
            RuleKind::Async {
                check: Arc::new(check),
                timeout: None,
            },
        )
    }

    /// Group of rules under one operator. Targets are the union of the
    /// members' targets.
    pub fn group(
        name: impl Into<String>,
        operator: LogicalOperator,
        rules: Vec<ValidationRule>,
    ) -> GridResult<Self> {
        let name = name.into();
        if rules.is_empty() {
            return Err(GridError::InvalidRule(format!("group '{}' has no members", name)));
        }
        let mut columns: Vec<String> = Vec::new();
        for member in &rules {
            for column in &member.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        Ok(Self::new(name, columns, RuleKind::Group { operator, rules }))
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_trigger(mut self, trigger: ValidationTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Timeout for Async rules; ignored for other kinds.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        if let RuleKind::Async { timeout, .. } = &mut self.kind {
            *timeout = Some(limit);
        }
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn targets(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Failure text for `column` (None for row-level failures).
    pub fn failure_message(&self, column: Option<&str>) -> String {
        let column = column.unwrap_or("row");
        if !self.message.is_empty() {
            return self.message.replace("{column}", column);
        }
        match &self.kind {
            RuleKind::Required => format!("{} is required", column),
            RuleKind::Range { min, max } => match (min, max) {
                (Some(lo), Some(hi)) => format!("{} must be between {} and {}", column, lo, hi),
                (Some(lo), None) => format!("{} must be at least {}", column, lo),
                (None, Some(hi)) => format!("{} must be at most {}", column, hi),
                (None, None) => format!("{} must be a number", column),
            },
            RuleKind::Regex { .. } => format!("{} has an invalid format", column),
            RuleKind::CustomFunction { .. } => format!("{} is invalid", column),
            _ => format!("{} failed {}", column, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Error < Severity::Critical);
        assert!(!Severity::Warning.is_blocking());
        assert!(Severity::Error.is_blocking());
    }

    #[test]
    fn test_real_time_triggers() {
        assert!(ValidationTrigger::OnTextChanged.is_real_time());
        assert!(!ValidationTrigger::Bulk.is_real_time());
        assert!(!ValidationTrigger::Manual.is_real_time());
    }

    #[test]
    fn test_regex_builder_rejects_bad_pattern() {
        assert!(ValidationRule::regex("email", "email", r"^\S+@\S+$").is_ok());
        let err = ValidationRule::regex("broken", "email", "([a-z").unwrap_err();
        assert!(matches!(err, GridError::InvalidRule(_)));
    }

    #[test]
    fn test_group_targets_union() {
        let group = ValidationRule::group(
            "contact",
            LogicalOperator::Or,
            vec![
                ValidationRule::required("phone", "phone"),
                ValidationRule::required("email", "email"),
                ValidationRule::required("email2", "email"),
            ],
        )
        .unwrap();
        assert_eq!(group.columns, vec!["phone", "email"]);
        assert!(ValidationRule::group("empty", LogicalOperator::And, vec![]).is_err());
    }

    #[test]
    fn test_conditional_inherits_inner_settings() {
        let inner = ValidationRule::required("zip", "zip")
            .with_severity(Severity::Warning)
            .with_trigger(ValidationTrigger::OnRowComplete);
        let rule = ValidationRule::conditional("zip-if-us", |_| Ok(true), inner);
        assert_eq!(rule.severity, Severity::Warning);
        assert_eq!(rule.trigger, ValidationTrigger::OnRowComplete);
        assert!(rule.targets("zip"));
    }

    #[test]
    fn test_failure_messages() {
        let rule = ValidationRule::range("age", "age", Some(0.0), Some(120.0));
        assert_eq!(rule.failure_message(Some("age")), "age must be between 0 and 120");

        let custom = ValidationRule::required("name", "name").with_message("{column} missing");
        assert_eq!(custom.failure_message(Some("name")), "name missing");
    }

    #[test]
    fn test_debug_does_not_require_closure_debug() {
        let rule = ValidationRule::custom("even", "n", |v, _| Ok(v.to_i64().map(|n| n % 2 == 0).unwrap_or(false)));
        let text = format!("{:?}", rule);
        assert!(text.contains("CustomFunction"));
    }
}
