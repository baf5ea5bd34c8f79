// Grid options
// Loaded from ~/.config/tablegrid/grid.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::automation::{PerformanceMode, ValidationAutomationSettings};

/// File logger options (consumed by tablegrid-logger)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    pub enabled: bool,

    /// Log file path. None = `<config dir>/tablegrid/logs/grid.log`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// One of: error, warn, info, debug, trace
    pub level: String,

    #[serde(rename = "maxFileBytes")]
    pub max_file_bytes: u64,

    /// Rotated files kept next to the active one
    #[serde(rename = "maxFiles")]
    pub max_files: usize,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            level: "info".to_string(),
            max_file_bytes: 10 * 1024 * 1024,
            max_files: 5,
        }
    }
}

impl LoggingOptions {
    pub fn effective_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            config_dir().join("logs").join("grid.log")
        })
    }
}

/// Immutable options object handed to a grid session at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    // Batching
    #[serde(rename = "batch.size")]
    pub batch_size: usize,

    // Performance
    #[serde(rename = "performance.parallelThreshold")]
    pub parallel_threshold: usize,

    #[serde(rename = "performance.sortMode")]
    pub sort_mode: PerformanceMode,

    #[serde(rename = "performance.validationMode")]
    pub validation_mode: PerformanceMode,

    // Validation
    #[serde(rename = "validation")]
    pub validation: ValidationAutomationSettings,

    /// Upper bound for a single async rule
    #[serde(rename = "validation.asyncTimeoutMs")]
    pub async_rule_timeout_ms: u64,

    // Rows
    #[serde(rename = "rows.minHeight")]
    pub min_row_height: f32,

    #[serde(rename = "rows.maxHeight")]
    pub max_row_height: f32,

    #[serde(rename = "rows.defaultHeight")]
    pub default_row_height: f32,

    // Search
    #[serde(rename = "search.maxResults")]
    pub max_search_results: usize,

    // Logging
    #[serde(rename = "logging")]
    pub logging: LoggingOptions,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            parallel_threshold: 1000,
            sort_mode: PerformanceMode::Auto,
            validation_mode: PerformanceMode::Auto,
            validation: ValidationAutomationSettings::default(),
            async_rule_timeout_ms: 5_000,
            min_row_height: 20.0,
            max_row_height: 200.0,
            default_row_height: 24.0,
            max_search_results: 10_000,
            logging: LoggingOptions::default(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tablegrid")
}

impl GridOptions {
    /// Get the options file path
    pub fn config_path() -> PathBuf {
        config_dir().join("grid.json")
    }

    /// Load options from the default path, falling back to defaults
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load options from `path`. Missing or malformed files yield defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(options) => options,
                Err(e) => {
                    log::warn!("Error parsing {}: {}; using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Error reading {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse options JSON. Lines starting with `//` are comments.
    pub fn from_json(contents: &str) -> Result<Self, String> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        let options: GridOptions = serde_json::from_str(&cleaned).map_err(|e| e.to_string())?;
        options.validate()?;
        Ok(options)
    }

    /// Save options to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;

        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Reject combinations the engine cannot honour
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch.size must be at least 1".to_string());
        }
        if self.min_row_height > self.max_row_height {
            return Err(format!(
                "rows.minHeight ({}) exceeds rows.maxHeight ({})",
                self.min_row_height, self.max_row_height
            ));
        }
        if self.default_row_height < self.min_row_height
            || self.default_row_height > self.max_row_height
        {
            return Err(format!(
                "rows.defaultHeight ({}) outside [{}, {}]",
                self.default_row_height, self.min_row_height, self.max_row_height
            ));
        }
        Ok(())
    }

    /// Clamp a measured row height into the configured bounds
    pub fn clamp_row_height(&self, height: f32) -> f32 {
        height.clamp(self.min_row_height, self.max_row_height)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn with_validation(mut self, validation: ValidationAutomationSettings) -> Self {
        self.validation = validation;
        self
    }
}
