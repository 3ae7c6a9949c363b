//! Configuration types.

use crate::loader::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Filters that match every file name.
pub const MATCH_ALL_FILTERS: [&str; 3] = ["", "*", "*.*"];

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilewardenConfig {
    /// Audit pipeline settings.
    pub auditor: AuditorSettings,
    /// Diagnostic logging settings.
    pub logging: LoggingSettings,
}

/// Settings consumed by the audit pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditorSettings {
    /// Directories to watch, in order. Duplicates are kept.
    pub input_directories: Vec<PathBuf>,
    /// Directory receiving `audit_<DDMMYYYY>.txt` files.
    pub output_directory: PathBuf,
    /// File name glob applied to every change.
    pub filter: String,
    /// Raw changes buffered per watcher before new ones are dropped.
    pub internal_buffer_size: usize,
    /// Watch subdirectories of every input directory.
    pub include_subdirectories: bool,
    /// Optional external handle-enumeration tool.
    pub handle_executable_path: Option<PathBuf>,
    /// Kill the external tool after this many seconds.
    pub handle_timeout_secs: Option<u64>,
}

impl Default for AuditorSettings {
    fn default() -> Self {
        Self {
            input_directories: Vec::new(),
            output_directory: PathBuf::new(),
            filter: "*.*".to_string(),
            internal_buffer_size: 8192,
            include_subdirectories: true,
            handle_executable_path: None,
            handle_timeout_secs: None,
        }
    }
}

impl AuditorSettings {
    /// Timeout for the external tool, if configured.
    pub fn handle_timeout(&self) -> Option<Duration> {
        self.handle_timeout_secs.map(Duration::from_secs)
    }

    /// Whether the filter accepts every file name.
    pub fn filter_matches_all(&self) -> bool {
        MATCH_ALL_FILTERS.contains(&self.filter.trim())
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_directories.is_empty() {
            return Err(ConfigError::validation(
                "auditor.input_directories must list at least one directory",
            ));
        }

        if self
            .input_directories
            .iter()
            .any(|dir| dir.as_os_str().is_empty())
        {
            return Err(ConfigError::validation(
                "auditor.input_directories must not contain empty paths",
            ));
        }

        if self.output_directory.as_os_str().is_empty() {
            return Err(ConfigError::validation(
                "auditor.output_directory is null or empty",
            ));
        }

        if self.internal_buffer_size == 0 {
            return Err(ConfigError::validation(
                "auditor.internal_buffer_size must be greater than 0",
            ));
        }

        if !self.filter_matches_all() {
            glob::Pattern::new(self.filter.trim()).map_err(|e| {
                ConfigError::validation(format!("auditor.filter is not a valid glob: {e}"))
            })?;
        }

        if self.handle_timeout_secs == Some(0) {
            return Err(ConfigError::validation(
                "auditor.handle_timeout_secs must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Logging section of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: Option<String>,
    /// Output format (`pretty`, `compact`, `json`).
    pub format: Option<String>,
    /// Also append diagnostics to this file.
    pub file: Option<PathBuf>,
}
