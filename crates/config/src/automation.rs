// Validation automation and execution-strategy settings

use serde::{Deserialize, Serialize};

/// Whether validation fires on data-changing operations or only on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationMode {
    /// Validation fires on import, paste, cell edit, row add and row delete,
    /// gated by the per-operation flags.
    #[default]
    Automatic,
    /// Validation fires only on explicit calls. Sub-flags are ignored.
    Manual,
}

/// Data-changing operations that may trigger automatic validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoValidationEvent {
    Import,
    Paste,
    CellEdit,
    RowAdd,
    RowDelete,
}

impl AutoValidationEvent {
    /// Bulk events go through the batch flag, the rest through real-time.
    pub fn is_bulk(&self) -> bool {
        matches!(self, AutoValidationEvent::Import | AutoValidationEvent::Paste)
    }
}

/// Execution strategy hint for sort and batch validation.
///
/// Output never depends on the mode; only the scheduling does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceMode {
    /// Parallel above `performance.parallelThreshold` rows, sequential below.
    #[default]
    Auto,
    Sequential,
    Parallel,
    /// Precompute keys once, then sort sequentially.
    Optimized,
}

impl PerformanceMode {
    /// Resolve `Auto` against a row count. Other modes are returned as-is.
    pub fn resolve(self, row_count: usize, parallel_threshold: usize) -> PerformanceMode {
        match self {
            PerformanceMode::Auto if row_count >= parallel_threshold => PerformanceMode::Parallel,
            PerformanceMode::Auto => PerformanceMode::Sequential,
            other => other,
        }
    }
}

/// Validation automation switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationAutomationSettings {
    pub mode: AutomationMode,

    #[serde(rename = "onImport")]
    pub on_import: bool,

    #[serde(rename = "onPaste")]
    pub on_paste: bool,

    #[serde(rename = "onCellEdit")]
    pub on_cell_edit: bool,

    #[serde(rename = "onRowAdd")]
    pub on_row_add: bool,

    #[serde(rename = "onRowDelete")]
    pub on_row_delete: bool,

    /// Gate for bulk events (import, paste)
    #[serde(rename = "batchValidation")]
    pub batch_validation: bool,

    /// Gate for interactive events (cell edit, row add/delete)
    #[serde(rename = "realTimeValidation")]
    pub real_time_validation: bool,
}

impl Default for ValidationAutomationSettings {
    fn default() -> Self {
        Self {
            mode: AutomationMode::Automatic,
            on_import: true,
            on_paste: true,
            on_cell_edit: true,
            on_row_add: true,
            on_row_delete: true,
            batch_validation: true,
            real_time_validation: true,
        }
    }
}

impl ValidationAutomationSettings {
    /// Everything off except explicit calls
    pub fn manual() -> Self {
        Self {
            mode: AutomationMode::Manual,
            ..Self::default()
        }
    }

    pub fn is_manual(&self) -> bool {
        self.mode == AutomationMode::Manual
    }

    /// Should `event` trigger validation on its own?
    ///
    /// Manual mode suppresses every automatic trigger regardless of the
    /// sub-flags.
    pub fn should_validate(&self, event: AutoValidationEvent) -> bool {
        if self.is_manual() {
            return false;
        }

        let enabled = match event {
            AutoValidationEvent::Import => self.on_import,
            AutoValidationEvent::Paste => self.on_paste,
            AutoValidationEvent::CellEdit => self.on_cell_edit,
            AutoValidationEvent::RowAdd => self.on_row_add,
            AutoValidationEvent::RowDelete => self.on_row_delete,
        };

        let gate = if event.is_bulk() {
            self.batch_validation
        } else {
            self.real_time_validation
        };

        enabled && gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_suppresses_all_triggers() {
        let settings = ValidationAutomationSettings::manual();
        assert!(settings.on_cell_edit);
        assert!(!settings.should_validate(AutoValidationEvent::CellEdit));
        assert!(!settings.should_validate(AutoValidationEvent::Import));
        assert!(!settings.should_validate(AutoValidationEvent::RowDelete));
    }

    #[test]
    fn test_batch_gate_only_affects_bulk_events() {
        let settings = ValidationAutomationSettings {
            batch_validation: false,
            ..Default::default()
        };
        assert!(!settings.should_validate(AutoValidationEvent::Import));
        assert!(!settings.should_validate(AutoValidationEvent::Paste));
        assert!(settings.should_validate(AutoValidationEvent::CellEdit));
        assert!(settings.should_validate(AutoValidationEvent::RowAdd));
    }

    #[test]
    fn test_real_time_gate() {
        let settings = ValidationAutomationSettings {
            real_time_validation: false,
            ..Default::default()
        };
        assert!(settings.should_validate(AutoValidationEvent::Import));
        assert!(!settings.should_validate(AutoValidationEvent::CellEdit));
    }

    #[test]
    fn test_per_event_flag() {
        let settings = ValidationAutomationSettings {
            on_paste: false,
            ..Default::default()
        };
        assert!(!settings.should_validate(AutoValidationEvent::Paste));
        assert!(settings.should_validate(AutoValidationEvent::Import));
    }

    #[test]
    fn test_performance_mode_resolve() {
        assert_eq!(PerformanceMode::Auto.resolve(10, 1000), PerformanceMode::Sequential);
        assert_eq!(PerformanceMode::Auto.resolve(1000, 1000), PerformanceMode::Parallel);
        assert_eq!(PerformanceMode::Optimized.resolve(5000, 1000), PerformanceMode::Optimized);
        assert_eq!(PerformanceMode::Sequential.resolve(5000, 1000), PerformanceMode::Sequential);
    }
}
