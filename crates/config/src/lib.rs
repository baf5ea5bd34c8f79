// Configuration loading

pub mod automation;
pub mod options;

pub use automation::{AutoValidationEvent, AutomationMode, PerformanceMode, ValidationAutomationSettings};
pub use options::{GridOptions, LoggingOptions};
