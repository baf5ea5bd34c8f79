//! File sink for the `log` facade.
//!
//! Lines look like `2026-01-01T12:00:00.000Z INFO target: message`. When a
//! write would push the active file past `max_file_bytes` the files shift
//! (`grid.log -> grid.log.1 -> grid.log.2 ...`) and a fresh file is opened;
//! at most `max_files` rotated files are kept.
//!
//! Library crates only use the `log` macros. The host application calls
//! [`init`] once.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use tablegrid_config::LoggingOptions;

#[derive(Debug, Clone, PartialEq)]
pub struct LoggerConfig {
    pub path: PathBuf,
    pub level: LevelFilter,
    pub max_file_bytes: u64,
    pub max_files: usize,
}

impl LoggerConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let defaults = LoggingOptions::default();
        Self {
            path: path.into(),
            level: LevelFilter::Info,
            max_file_bytes: defaults.max_file_bytes,
            max_files: defaults.max_files,
        }
    }

    pub fn from_options(options: &LoggingOptions) -> Self {
        Self {
            path: options.effective_path(),
            level: if options.enabled {
                parse_level(&options.level)
            } else {
                LevelFilter::Off
            },
            max_file_bytes: options.max_file_bytes,
            max_files: options.max_files,
        }
    }

    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    pub fn with_rotation(mut self, max_file_bytes: u64, max_files: usize) -> Self {
        self.max_file_bytes = max_file_bytes;
        self.max_files = max_files;
        self
    }
}

/// Unknown names fall back to Info.
pub fn parse_level(name: &str) -> LevelFilter {
    match name.trim().to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

struct ActiveFile {
    file: File,
    size: u64,
}

pub struct FileLogger {
    config: LoggerConfig,
    active: Mutex<ActiveFile>,
}

impl FileLogger {
    /// Open (or create) the log file, creating parent directories.
    pub fn new(config: LoggerConfig) -> io::Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let active = open_append(&config.path)?;
        Ok(Self {
            config,
            active: Mutex::new(active),
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut active = self.active.lock();
        let len = line.len() as u64;
        if active.size > 0 && active.size + len > self.config.max_file_bytes {
            active.file.flush()?;
            self.rotate()?;
            *active = open_append(&self.config.path)?;
        }
        active.file.write_all(line.as_bytes())?;
        active.size += len;
        Ok(())
    }

    /// Shift `path.N-1 -> path.N ... path -> path.1`, dropping the oldest.
    fn rotate(&self) -> io::Result<()> {
        let path = &self.config.path;
        if self.config.max_files == 0 {
            return fs::remove_file(path);
        }
        let oldest = rotated_path(path, self.config.max_files);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for n in (1..self.config.max_files).rev() {
            let from = rotated_path(path, n);
            if from.exists() {
                fs::rename(&from, rotated_path(path, n + 1))?;
            }
        }
        fs::rename(path, rotated_path(path, 1))
    }
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.config.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{} {} {}: {}\n",
            chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            record.level(),
            record.target(),
            record.args()
        );
        // Nowhere to report a failing log sink
        let _ = self.write_line(&line);
    }

    fn flush(&self) {
        let _ = self.active.lock().file.flush();
    }
}

/// Install a [`FileLogger`] as the global logger.
///
/// Fails if the file can't be opened or a logger is already installed.
pub fn init(config: LoggerConfig) -> Result<(), String> {
    let level = config.level;
    let logger = FileLogger::new(config).map_err(|e| format!("cannot open log file: {}", e))?;
    log::set_boxed_logger(Box::new(logger)).map_err(|e| e.to_string())?;
    log::set_max_level(level);
    Ok(())
}

fn open_append(path: &Path) -> io::Result<ActiveFile> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let size = file.metadata()?.len();
    Ok(ActiveFile { file, size })
}

fn rotated_path(path: &Path, n: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", n));
    PathBuf::from(name)
}
