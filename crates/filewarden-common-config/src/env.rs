//! Environment variable handling.

use crate::types::AuditorSettings;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Environment variable errors.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("failed to load .env file: {0}")]
    DotenvError(#[from] dotenvy::Error),
}

/// Environment variable names.
pub mod vars {
    // Host
    pub const FILEWARDEN_ENVIRONMENT: &str = "FILEWARDEN_ENVIRONMENT";
    pub const FILEWARDEN_CONFIG_DIR: &str = "FILEWARDEN_CONFIG_DIR";

    // Auditor overrides
    pub const FILEWARDEN_INPUT_DIRECTORIES: &str = "FILEWARDEN_INPUT_DIRECTORIES";
    pub const FILEWARDEN_OUTPUT_DIRECTORY: &str = "FILEWARDEN_OUTPUT_DIRECTORY";
    pub const FILEWARDEN_FILTER: &str = "FILEWARDEN_FILTER";
    pub const FILEWARDEN_BUFFER_SIZE: &str = "FILEWARDEN_BUFFER_SIZE";
    pub const FILEWARDEN_INCLUDE_SUBDIRECTORIES: &str = "FILEWARDEN_INCLUDE_SUBDIRECTORIES";
    pub const FILEWARDEN_HANDLE_EXECUTABLE: &str = "FILEWARDEN_HANDLE_EXECUTABLE";
    pub const FILEWARDEN_HANDLE_TIMEOUT_SECS: &str = "FILEWARDEN_HANDLE_TIMEOUT_SECS";
}

/// Environment name used when `FILEWARDEN_ENVIRONMENT` is unset.
#[cfg(debug_assertions)]
pub const DEFAULT_ENVIRONMENT: &str = "Development";
/// Environment name used when `FILEWARDEN_ENVIRONMENT` is unset.
#[cfg(not(debug_assertions))]
pub const DEFAULT_ENVIRONMENT: &str = "Production";

/// Environment configuration.
#[derive(Debug, Clone, Copy)]
pub struct Environment;

impl Environment {
    /// Load `.env` and `.env.local` from the working directory, if present.
    pub fn init() -> Result<Self, EnvError> {
        for file in [".env", ".env.local"] {
            match dotenvy::from_filename(file) {
                Ok(_) => {}
                Err(e) if e.not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Self)
    }

    /// Name of the hosting environment.
    pub fn name() -> String {
        Self::get(vars::FILEWARDEN_ENVIRONMENT)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
    }

    /// Get an optional string variable.
    pub fn get(var: &str) -> Option<String> {
        env::var(var).ok()
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, EnvError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(EnvError::InvalidValue {
            var: var.to_string(),
            message: "expected boolean".to_string(),
        }),
    }
}

fn parse_int<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, EnvError> {
    value.trim().parse().map_err(|_| EnvError::InvalidValue {
        var: var.to_string(),
        message: "expected integer".to_string(),
    })
}

/// Overlay `FILEWARDEN_*` variables onto `settings`.
pub fn apply_overrides(
    settings: &mut AuditorSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), EnvError> {
    if let Some(dirs) = lookup(vars::FILEWARDEN_INPUT_DIRECTORIES) {
        settings.input_directories = env::split_paths(&dirs)
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
    }

    if let Some(dir) = lookup(vars::FILEWARDEN_OUTPUT_DIRECTORY) {
        settings.output_directory = PathBuf::from(dir);
    }

    if let Some(filter) = lookup(vars::FILEWARDEN_FILTER) {
        settings.filter = filter;
    }

    if let Some(size) = lookup(vars::FILEWARDEN_BUFFER_SIZE) {
        settings.internal_buffer_size = parse_int(vars::FILEWARDEN_BUFFER_SIZE, &size)?;
    }

    if let Some(flag) = lookup(vars::FILEWARDEN_INCLUDE_SUBDIRECTORIES) {
        settings.include_subdirectories =
            parse_bool(vars::FILEWARDEN_INCLUDE_SUBDIRECTORIES, &flag)?;
    }

    if let Some(tool) = lookup(vars::FILEWARDEN_HANDLE_EXECUTABLE) {
        settings.handle_executable_path = if tool.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(tool))
        };
    }

    if let Some(secs) = lookup(vars::FILEWARDEN_HANDLE_TIMEOUT_SECS) {
        settings.handle_timeout_secs = Some(parse_int(vars::FILEWARDEN_HANDLE_TIMEOUT_SECS, &secs)?);
    }

    Ok(())
}
