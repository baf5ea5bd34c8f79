//! Validation engine: evaluates rules against rows and cells.
//!
//! Evaluation model:
//! - column-scoped kinds (Required, Range, Regex, CustomFunction) run once
//!   per declared target column
//! - row-scoped kinds (CrossColumn, Conditional, Async, Group) run once per row
//! - each evaluation is `Result<RuleOutcome, RuleError>`; an `Err` or a panic
//!   inside a rule becomes a Critical "rule X failed: ..." result and the
//!   remaining rules still run
//!
//! After `validate_row` the aggregated alert text is written to the row's
//! alerts column, but only when it differs from what is already there.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tablegrid_config::{
    AutoValidationEvent, GridOptions, PerformanceMode, ValidationAutomationSettings,
};

use super::cache::ValidationCache;
use super::result::{
    RowValidationResult, RuleStatistics, ValidationProgress, ValidationResult,
    ValidationStatistics,
};
use super::rules::{RuleKind, ValidationRule, ValidationTrigger};
use crate::cancel::CancelToken;
use crate::columns::{ColumnCatalog, SpecialColumnRole};
use crate::error::{GridError, GridResult};
use crate::filter::FilterEngine;
use crate::row::Row;
use crate::row_store::RowStore;
use crate::value::CellValue;

/// Result of one rule evaluation against one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    Passed,
    Failed,
}

impl RuleOutcome {
    fn from_bool(ok: bool) -> Self {
        if ok {
            RuleOutcome::Passed
        } else {
            RuleOutcome::Failed
        }
    }

    pub fn passed(&self) -> bool {
        *self == RuleOutcome::Passed
    }
}

/// A rule that could not be evaluated (closure error, panic, timeout).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RuleError(pub String);

/// Which rules run and whether alerts are written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationContext {
    /// Also run rules whose trigger is `Manual`
    pub include_manual_rules: bool,
    pub write_alerts: bool,
}

impl ValidationContext {
    /// Explicit validation request: every enabled rule, alerts written.
    pub fn explicit() -> Self {
        Self {
            include_manual_rules: true,
            write_alerts: true,
        }
    }

    /// Automation-driven validation: Manual-trigger rules are skipped.
    pub fn automatic() -> Self {
        Self {
            include_manual_rules: false,
            write_alerts: true,
        }
    }

    /// Evaluate only; the store is left alone.
    pub fn preview() -> Self {
        Self {
            include_manual_rules: true,
            write_alerts: false,
        }
    }
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self::explicit()
    }
}

/// Progress callback for batch validation.
pub type ProgressFn<'a> = &'a (dyn Fn(ValidationProgress) + Send + Sync);

pub struct ValidationEngine {
    store: Arc<RowStore>,
    catalog: Arc<ColumnCatalog>,
    cache: Arc<ValidationCache>,
    rules: RwLock<Vec<ValidationRule>>,
    automation: RwLock<ValidationAutomationSettings>,
    batch_size: usize,
    parallel_threshold: usize,
    mode: PerformanceMode,
    default_timeout: Duration,
}

impl ValidationEngine {
    pub fn new(
        store: Arc<RowStore>,
        catalog: Arc<ColumnCatalog>,
        cache: Arc<ValidationCache>,
        options: &GridOptions,
    ) -> Self {
        Self {
            store,
            catalog,
            cache,
            rules: RwLock::new(Vec::new()),
            automation: RwLock::new(options.validation.clone()),
            batch_size: options.batch_size.max(1),
            parallel_threshold: options.parallel_threshold,
            mode: options.validation_mode,
            default_timeout: Duration::from_millis(options.async_rule_timeout_ms),
        }
    }

    // -------------------------------------------------------------------------
    // Rules
    // -------------------------------------------------------------------------

    pub fn add_rule(&self, rule: ValidationRule) -> GridResult<()> {
        let mut rules = self.rules.write();
        if rules.iter().any(|r| r.name == rule.name) {
            return Err(GridError::DuplicateRule(rule.name));
        }
        log::debug!("validation rule added: {}", rule.name);
        rules.push(rule);
        drop(rules);
        self.cache.clear();
        Ok(())
    }

    pub fn remove_rule(&self, name: &str) -> GridResult<ValidationRule> {
        let mut rules = self.rules.write();
        let pos = rules
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| GridError::RuleNotFound(name.to_string()))?;
        let removed = rules.remove(pos);
        drop(rules);
        self.cache.clear();
        Ok(removed)
    }

    pub fn set_rule_enabled(&self, name: &str, enabled: bool) -> GridResult<()> {
        let mut rules = self.rules.write();
        let rule = rules
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| GridError::RuleNotFound(name.to_string()))?;
        rule.enabled = enabled;
        drop(rules);
        self.cache.clear();
        Ok(())
    }

    pub fn get_rule(&self, name: &str) -> Option<ValidationRule> {
        self.rules.read().iter().find(|r| r.name == name).cloned()
    }

    pub fn rules(&self) -> Vec<ValidationRule> {
        self.rules.read().clone()
    }

    pub fn clear_rules(&self) {
        self.rules.write().clear();
        self.cache.clear();
    }

    // -------------------------------------------------------------------------
    // Automation
    // -------------------------------------------------------------------------

    pub fn automation(&self) -> ValidationAutomationSettings {
        self.automation.read().clone()
    }

    pub fn set_automation(&self, settings: ValidationAutomationSettings) {
        log::info!("validation automation mode: {:?}", settings.mode);
        *self.automation.write() = settings;
    }

    pub fn should_auto_validate(&self, event: AutoValidationEvent) -> bool {
        self.automation.read().should_validate(event)
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    /// Validate a prospective edit of one cell.
    ///
    /// Runs the real-time-trigger rules targeting `column` against a copy of
    /// the row with `new_value` applied. Nothing is written to the store.
    /// Returns the most severe failure, or a valid result.
    pub async fn validate_cell(
        &self,
        row_index: usize,
        column: &str,
        new_value: CellValue,
        cancel: &CancelToken,
    ) -> GridResult<ValidationResult> {
        cancel.check()?;
        let mut row = self.row_at(row_index)?;
        row.set(column, new_value);

        let rules: Vec<ValidationRule> = self
            .rules
            .read()
            .iter()
            .filter(|r| r.enabled && r.trigger.is_real_time() && r.targets(column))
            .cloned()
            .collect();

        let mut worst: Option<ValidationResult> = None;
        for rule in &rules {
            cancel.check()?;
            let target = rule.kind.is_column_scoped().then_some(column);
            let result = match guarded_check(rule, &row, target, self.default_timeout).await {
                Ok(RuleOutcome::Passed) => continue,
                Ok(RuleOutcome::Failed) => ValidationResult::failure(
                    &rule.name,
                    rule.severity,
                    rule.failure_message(Some(column)),
                ),
                Err(e) => {
                    log::warn!("rule '{}' failed on row {}: {}", rule.name, row_index, e);
                    ValidationResult::rule_error(&rule.name, &e.0)
                }
            };
            if worst.as_ref().map_or(true, |w| result.severity > w.severity) {
                worst = Some(result);
            }
        }

        let result = worst.unwrap_or_else(ValidationResult::valid);
        Ok(result.at_column(Some(column)).at_row(Some(row_index)))
    }

    /// Validate the row at `row_index`, cache the result and (per `context`)
    /// write its alerts.
    pub async fn validate_row(
        &self,
        row_index: usize,
        context: ValidationContext,
        cancel: &CancelToken,
    ) -> GridResult<RowValidationResult> {
        cancel.check()?;
        let row = self.row_at(row_index)?;
        let result = self
            .evaluate_row(&row, Some(row_index), context, None)
            .await;

        self.cache.insert(row_index, result.clone());
        if context.write_alerts {
            self.write_alerts(row_index, &result.alerts)?;
        }
        Ok(result)
    }

    /// Validate a row that is not in the store (e.g. an import preview).
    pub async fn validate_row_data(
        &self,
        row: &Row,
        context: ValidationContext,
    ) -> RowValidationResult {
        self.evaluate_row(row, None, context, None).await
    }

    /// Validate many rows, `batch_size` at a time.
    ///
    /// Indices that no longer exist are skipped. `progress` is called after
    /// each chunk. In parallel mode the rows of a chunk are evaluated
    /// concurrently.
    pub async fn validate_rows_batch(
        &self,
        indices: &[usize],
        context: ValidationContext,
        progress: Option<ProgressFn<'_>>,
        cancel: &CancelToken,
    ) -> GridResult<Vec<RowValidationResult>> {
        let total = indices.len();
        let mode = self.mode.resolve(total, self.parallel_threshold);
        let mut results = Vec::with_capacity(total);
        let mut processed = 0;

        for chunk in indices.chunks(self.batch_size) {
            cancel.check()?;
            let outcomes = match mode {
                PerformanceMode::Parallel | PerformanceMode::Optimized => {
                    join_all(
                        chunk
                            .iter()
                            .map(|&index| self.validate_row(index, context, cancel)),
                    )
                    .await
                }
                _ => {
                    let mut outcomes = Vec::with_capacity(chunk.len());
                    for &index in chunk {
                        outcomes.push(self.validate_row(index, context, cancel).await);
                    }
                    outcomes
                }
            };

            for outcome in outcomes {
                match outcome {
                    Ok(result) => results.push(result),
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }

            processed += chunk.len();
            if let Some(report) = progress {
                report(ValidationProgress { processed, total });
            }
        }

        log::debug!(
            "batch validation: {} of {} rows evaluated ({:?})",
            results.len(),
            total,
            mode
        );
        Ok(results)
    }

    /// True when every qualifying non-empty row is valid. Stops at the first
    /// invalid row.
    ///
    /// With `only_filtered` a row must pass `filter`; with `only_checked` its
    /// checkbox column must be true. Both set means both must hold. Without a
    /// checkbox column `only_checked` has no effect.
    pub async fn are_all_non_empty_rows_valid(
        &self,
        only_filtered: bool,
        only_checked: bool,
        filter: Option<&FilterEngine>,
        cancel: &CancelToken,
    ) -> GridResult<bool> {
        let ignore = self.non_data_columns();
        let ignore: Vec<&str> = ignore.iter().map(String::as_str).collect();
        let checkbox = self
            .catalog
            .special_column(SpecialColumnRole::Checkbox)
            .map(|c| c.name);

        for (index, row) in self.store.get_all_rows().into_iter().enumerate() {
            cancel.check()?;
            if row.is_empty_data(&ignore) {
                continue;
            }
            if only_filtered && filter.is_some_and(|f| !f.matches(&row)) {
                continue;
            }
            if only_checked {
                if let Some(column) = &checkbox {
                    if !row.get(column).to_bool().unwrap_or(false) {
                        continue;
                    }
                }
            }

            let result = self
                .evaluate_row(&row, Some(index), ValidationContext::explicit(), None)
                .await;
            self.cache.insert(index, result.clone());
            self.write_alerts(index, &result.alerts)?;
            if !result.is_valid {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Validate every row and collect per-rule timing and failure counts.
    /// Empty rows are counted but not evaluated.
    pub async fn validate_all_with_statistics(
        &self,
        cancel: &CancelToken,
    ) -> GridResult<ValidationStatistics> {
        let started = Instant::now();
        let ignore = self.non_data_columns();
        let ignore: Vec<&str> = ignore.iter().map(String::as_str).collect();

        let mut stats = ValidationStatistics::default();
        let mut per_rule: FxHashMap<String, RuleStatistics> = FxHashMap::default();

        for (index, row) in self.store.get_all_rows().into_iter().enumerate() {
            cancel.check()?;
            stats.total_rows += 1;
            if row.is_empty_data(&ignore) {
                stats.empty_rows += 1;
                continue;
            }

            let result = self
                .evaluate_row(
                    &row,
                    Some(index),
                    ValidationContext::explicit(),
                    Some(&mut per_rule),
                )
                .await;
            stats.total_failures += result.results.len();
            if result.is_valid {
                stats.valid_rows += 1;
            } else {
                stats.invalid_rows += 1;
            }
            self.cache.insert(index, result.clone());
            self.write_alerts(index, &result.alerts)?;
        }

        stats.rules = per_rule;
        stats.duration = started.elapsed();
        log::info!(
            "validated {} rows: {} valid, {} invalid, {} empty in {:?}",
            stats.total_rows,
            stats.valid_rows,
            stats.invalid_rows,
            stats.empty_rows,
            stats.duration
        );
        Ok(stats)
    }

    /// Drop the cached result for a row and clear its alert text.
    pub fn clear_row_alerts(&self, row_index: usize) -> GridResult<()> {
        self.cache.invalidate_row(row_index);
        self.write_alerts(row_index, "")
    }

    /// Clear every row's alert text and the whole cache.
    pub fn clear_all_alerts(&self) {
        self.cache.clear();
        for index in 0..self.store.get_row_count() {
            // Rows removed mid-scan are simply skipped
            let _ = self.write_alerts(index, "");
        }
    }

    pub fn cached_result(&self, row_index: usize) -> Option<RowValidationResult> {
        self.cache.get(row_index)
    }

    pub fn cache(&self) -> &ValidationCache {
        &self.cache
    }

    /// Number of cached invalid rows.
    pub fn error_count(&self) -> usize {
        self.cache.invalid_count()
    }

    // -------------------------------------------------------------------------
    // Internal
    // -------------------------------------------------------------------------

    fn row_at(&self, row_index: usize) -> GridResult<Row> {
        self.store
            .get_row(row_index)
            .ok_or_else(|| GridError::RowNotFound {
                index: row_index,
                count: self.store.get_row_count(),
            })
    }

    /// Columns that don't count toward a row being non-empty.
    fn non_data_columns(&self) -> Vec<String> {
        let mut names = self.catalog.special_column_names();
        let alerts = self.catalog.alerts_column_name();
        if !names.contains(&alerts) {
            names.push(alerts);
        }
        names
    }

    fn applicable_rules(&self, context: ValidationContext) -> Vec<ValidationRule> {
        self.rules
            .read()
            .iter()
            .filter(|r| r.enabled)
            .filter(|r| context.include_manual_rules || r.trigger != ValidationTrigger::Manual)
            .cloned()
            .collect()
    }

    /// Target columns a column-scoped rule runs against. Undeclared columns
    /// are skipped unless the catalog is empty (schemaless use).
    fn target_columns<'r>(&self, rule: &'r ValidationRule) -> Vec<&'r str> {
        let schemaless = self.catalog.is_empty();
        rule.columns
            .iter()
            .map(String::as_str)
            .filter(|c| schemaless || self.catalog.contains(c))
            .collect()
    }

    async fn evaluate_row(
        &self,
        row: &Row,
        row_index: Option<usize>,
        context: ValidationContext,
        mut stats: Option<&mut FxHashMap<String, RuleStatistics>>,
    ) -> RowValidationResult {
        let mut failures = Vec::new();

        for rule in self.applicable_rules(context) {
            let targets: Vec<Option<&str>> = if rule.kind.is_column_scoped() {
                self.target_columns(&rule).into_iter().map(Some).collect()
            } else {
                vec![None]
            };

            for target in targets {
                let started = Instant::now();
                let outcome = guarded_check(&rule, row, target, self.default_timeout).await;

                if let Some(stats) = stats.as_deref_mut() {
                    let entry = stats.entry(rule.name.clone()).or_default();
                    entry.evaluations += 1;
                    entry.total_time += started.elapsed();
                    match &outcome {
                        Ok(RuleOutcome::Failed) => entry.failures += 1,
                        Err(_) => entry.errors += 1,
                        Ok(RuleOutcome::Passed) => {}
                    }
                }

                match outcome {
                    Ok(RuleOutcome::Passed) => {}
                    Ok(RuleOutcome::Failed) => failures.push(
                        ValidationResult::failure(
                            &rule.name,
                            rule.severity,
                            rule.failure_message(target),
                        )
                        .at_column(target)
                        .at_row(row_index),
                    ),
                    Err(e) => {
                        log::warn!(
                            "rule '{}' failed on row {:?}: {}",
                            rule.name,
                            row_index,
                            e
                        );
                        failures.push(
                            ValidationResult::rule_error(&rule.name, &e.0)
                                .at_column(target)
                                .at_row(row_index),
                        );
                    }
                }
            }
        }

        RowValidationResult::from_results(row_index, failures)
    }

    /// Write `alerts` to the row's alerts column if it changed. Empty text
    /// is stored as Null.
    fn write_alerts(&self, row_index: usize, alerts: &str) -> GridResult<()> {
        let column = self.catalog.alerts_column_name();
        let value = if alerts.is_empty() {
            CellValue::Null
        } else {
            CellValue::Text(alerts.to_string())
        };

        self.store.with_row_mut(row_index, |row| {
            if row.get(&column) != &value {
                row.set(column.as_str(), value);
            }
        })
    }
}

/// Evaluate one rule against one target, converting a panic into a
/// `RuleError`.
async fn guarded_check(
    rule: &ValidationRule,
    row: &Row,
    column: Option<&str>,
    default_timeout: Duration,
) -> Result<RuleOutcome, RuleError> {
    match AssertUnwindSafe(check(rule, row, column, default_timeout))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(panic) => Err(RuleError(panic_message(panic))),
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// Evaluate `rule` against every target it declares; fails on the first
/// failing target. Used for rules nested in groups and conditionals.
fn check_all_targets<'a>(
    rule: &'a ValidationRule,
    row: &'a Row,
    default_timeout: Duration,
) -> BoxFuture<'a, Result<RuleOutcome, RuleError>> {
    async move {
        if !rule.kind.is_column_scoped() {
            return check(rule, row, None, default_timeout).await;
        }
        for column in &rule.columns {
            if check(rule, row, Some(column), default_timeout).await? == RuleOutcome::Failed {
                return Ok(RuleOutcome::Failed);
            }
        }
        Ok(RuleOutcome::Passed)
    }
    .boxed()
}

fn check<'a>(
    rule: &'a ValidationRule,
    row: &'a Row,
    column: Option<&'a str>,
    default_timeout: Duration,
) -> BoxFuture<'a, Result<RuleOutcome, RuleError>> {
    async move {
        let null = CellValue::Null;
        let value = column.map_or(&null, |c| row.get(c));

        match &rule.kind {
            RuleKind::Required => Ok(RuleOutcome::from_bool(!value.is_empty())),

            // Empty cells pass; emptiness is Required's concern
            RuleKind::Range { min, max } => {
                if value.is_empty() {
                    return Ok(RuleOutcome::Passed);
                }
                let Ok(n) = value.to_f64() else {
                    return Ok(RuleOutcome::Failed);
                };
                let above_min = min.map_or(true, |lo| n >= lo);
                let below_max = max.map_or(true, |hi| n <= hi);
                Ok(RuleOutcome::from_bool(above_min && below_max))
            }

            RuleKind::Regex { pattern } => {
                if value.is_empty() {
                    return Ok(RuleOutcome::Passed);
                }
                Ok(RuleOutcome::from_bool(
                    pattern.is_match(&value.display_string()),
                ))
            }

            RuleKind::CustomFunction { predicate } => predicate(value, row)
                .map(RuleOutcome::from_bool)
                .map_err(RuleError),

            RuleKind::CrossColumn { predicate } => {
                predicate(row).map(RuleOutcome::from_bool).map_err(RuleError)
            }

            RuleKind::Conditional { condition, rule } => {
                if !condition(row).map_err(RuleError)? {
                    return Ok(RuleOutcome::Passed);
                }
                check_all_targets(rule, row, default_timeout).await
            }

            RuleKind::Async { check: run, timeout } => {
                let limit = timeout.unwrap_or(default_timeout);
                match tokio::time::timeout(limit, run(row.clone())).await {
                    Ok(outcome) => outcome.map(RuleOutcome::from_bool).map_err(RuleError),
                    Err(_) => Err(RuleError(format!("timed out after {} ms", limit.as_millis()))),
                }
            }

            RuleKind::Group { operator, rules } => {
                let requires_all = operator.requires_all();
                let mut any_passed = false;
                let mut all_passed = true;

                for member in rules.iter().filter(|m| m.enabled) {
                    let passed = check_all_targets(member, row, default_timeout)
                        .await?
                        .passed();
                    any_passed |= passed;
                    all_passed &= passed;

                    if operator.short_circuits() && passed != requires_all {
                        break;
                    }
                }

                Ok(RuleOutcome::from_bool(if requires_all {
                    all_passed
                } else {
                    any_passed
                }))
            }
        }
    }
    .boxed()
}
