//! Validation outcomes and statistics.
//!
//! Validation failures are data: a `ValidationResult` is produced for every
//! failing rule evaluation and never propagates as an error.

use std::time::Duration;

use rustc_hash::FxHashMap;
use serde::Serialize;

use super::rules::Severity;

/// Outcome of one rule against one cell or row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub severity: Severity,
    pub message: String,
    /// Rule that produced this result (None for the aggregate "all passed")
    pub rule_name: Option<String>,
    /// Failing column; None for row-level rules
    pub column: Option<String>,
    pub row_index: Option<usize>,
}

impl ValidationResult {
    /// Passing result with no rule attached.
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            severity: Severity::Info,
            message: String::new(),
            rule_name: None,
            column: None,
            row_index: None,
        }
    }

    pub fn failure(rule_name: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            severity,
            message: message.into(),
            rule_name: Some(rule_name.to_string()),
            column: None,
            row_index: None,
        }
    }

    /// Synthetic result for a rule that broke while evaluating.
    pub fn rule_error(rule_name: &str, error: &str) -> Self {
        Self::failure(
            rule_name,
            Severity::Critical,
            format!("rule {} failed: {}", rule_name, error),
        )
    }

    pub fn at_column(mut self, column: Option<&str>) -> Self {
        self.column = column.map(str::to_string);
        self
    }

    pub fn at_row(mut self, row_index: Option<usize>) -> Self {
        self.row_index = row_index;
        self
    }

    /// Failing with severity Error or above.
    pub fn is_blocking(&self) -> bool {
        !self.is_valid && self.severity.is_blocking()
    }

    /// `"{rule}: {message}"`, as written to the alerts column.
    pub fn alert_line(&self) -> String {
        match &self.rule_name {
            Some(rule) => format!("{}: {}", rule, self.message),
            None => self.message.clone(),
        }
    }
}

/// Aggregate outcome for one row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowValidationResult {
    pub row_index: Option<usize>,
    pub is_valid: bool,
    /// Failing results only, in evaluation order
    pub results: Vec<ValidationResult>,
    /// Text for the alerts column; empty when nothing failed
    pub alerts: String,
}

impl RowValidationResult {
    pub fn from_results(row_index: Option<usize>, results: Vec<ValidationResult>) -> Self {
        let failures: Vec<ValidationResult> = results.into_iter().filter(|r| !r.is_valid).collect();
        let is_valid = !failures.iter().any(ValidationResult::is_blocking);
        let alerts = format_alerts(&failures);
        Self {
            row_index,
            is_valid,
            results: failures,
            alerts,
        }
    }

    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_blocking()).count()
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.results.iter().map(|r| r.severity).max()
    }
}

/// Alert text: highest severity first (ties keep evaluation order), one
/// `"{rule}: {message}"` entry per failure, joined with `"; "`.
pub fn format_alerts(failures: &[ValidationResult]) -> String {
    let mut ordered: Vec<&ValidationResult> = failures.iter().filter(|r| !r.is_valid).collect();
    ordered.sort_by(|a, b| b.severity.cmp(&a.severity));
    ordered
        .iter()
        .map(|r| r.alert_line())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Per-rule counters collected by `validate_all_with_statistics`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleStatistics {
    pub evaluations: usize,
    pub failures: usize,
    /// Evaluations where the rule itself broke
    pub errors: usize,
    pub total_time: Duration,
}

impl RuleStatistics {
    pub fn failure_rate(&self) -> f64 {
        ratio(self.failures, self.evaluations)
    }

    pub fn error_rate(&self) -> f64 {
        ratio(self.errors, self.evaluations)
    }

    pub fn average_time(&self) -> Duration {
        if self.evaluations == 0 {
            Duration::ZERO
        } else {
            self.total_time / self.evaluations as u32
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationStatistics {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    /// Rows with no user data; not evaluated
    pub empty_rows: usize,
    pub total_failures: usize,
    pub duration: Duration,
    pub rules: FxHashMap<String, RuleStatistics>,
}

impl ValidationStatistics {
    pub fn all_valid(&self) -> bool {
        self.invalid_rows == 0
    }
}

/// Incremental progress for batch validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValidationProgress {
    pub processed: usize,
    pub total: usize,
}

impl ValidationProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f64 * 100.0 / self.total as f64
        }
    }
}
