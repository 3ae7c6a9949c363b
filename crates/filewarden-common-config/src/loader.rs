//! Configuration file loading and parsing.

use crate::env::{apply_overrides, EnvError};
use crate::types::FilewardenConfig;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Matches `${VAR}` and `${VAR:-default}`.
const ENV_VAR_PATTERN: &str = r"\$\{([^}:]+)(?::-([^}]*))?\}";

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML at line {}: {message}", line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ParseError { line: Option<usize>, message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("environment variable not found: {var}")]
    EnvVarNotFound { var: String },

    #[error(transparent)]
    Env(#[from] EnvError),
}

impl ConfigError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }
}

/// Configuration loader.
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Loader for `filewarden.<environment>.yaml` inside `config_dir`.
    pub fn new(config_dir: impl AsRef<Path>, environment: &str) -> Self {
        Self {
            config_path: config_dir
                .as_ref()
                .join(format!("filewarden.{environment}.yaml")),
        }
    }

    /// Loader for an explicit file.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Path the loader reads.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration, resolving variables from the process environment.
    pub fn load(&self) -> Result<FilewardenConfig, ConfigError> {
        self.load_with(|var| std::env::var(var).ok())
    }

    /// Load configuration, resolving variables through `lookup`.
    ///
    /// A missing file yields the defaults; overrides and validation still
    /// apply.
    pub fn load_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<FilewardenConfig, ConfigError> {
        let mut config = if self.config_path.exists() {
            let contents =
                std::fs::read_to_string(&self.config_path).map_err(|source| {
                    ConfigError::ReadError {
                        path: self.config_path.clone(),
                        source,
                    }
                })?;
            let expanded = expand_env_vars(&contents, &lookup)?;
            parse(&expanded)?
        } else {
            FilewardenConfig::default()
        };

        apply_overrides(&mut config.auditor, &lookup)?;
        config.auditor.validate()?;
        Ok(config)
    }
}

fn parse(yaml: &str) -> Result<FilewardenConfig, ConfigError> {
    // An empty document deserializes as unit, not as an empty mapping.
    if yaml.trim().is_empty() {
        return Ok(FilewardenConfig::default());
    }

    serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
        line: e.location().map(|l| l.line()),
        message: e.to_string(),
    })
}

/// Expand environment variables in the form `${VAR}` or `${VAR:-default}`.
pub fn expand_env_vars(
    content: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let re = Regex::new(ENV_VAR_PATTERN).map_err(|e| ConfigError::ParseError {
        line: None,
        message: e.to_string(),
    })?;

    let mut result = String::with_capacity(content.len());
    let mut last = 0;

    for cap in re.captures_iter(content) {
        let Some(full) = cap.get(0) else { continue };
        let var_name = &cap[1];

        let value = match lookup(var_name) {
            Some(v) => v,
            None => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                None => {
                    return Err(ConfigError::EnvVarNotFound {
                        var: var_name.to_string(),
                    })
                }
            },
        };

        result.push_str(&content[last..full.start()]);
        result.push_str(&value);
        last = full.end();
    }

    result.push_str(&content[last..]);
    Ok(result)
}
