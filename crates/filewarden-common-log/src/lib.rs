//! Logging infrastructure for Filewarden.
//!
//! Two concerns live here: installing the global `tracing` subscriber for
//! the service host, and the [`DiagnosticSink`] capability that the audit
//! pipeline reports through.

use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

pub mod diagnostics;

pub use diagnostics::{cause_chain, DiagnosticSink, TracingSink};

/// Environment variable names read by [`LogConfig::from_env`].
pub mod vars {
    pub const LOG_LEVEL: &str = "FILEWARDEN_LOG_LEVEL";
    pub const LOG_FORMAT: &str = "FILEWARDEN_LOG_FORMAT";
    pub const LOG_FILE: &str = "FILEWARDEN_LOG_FILE";
    pub const LOG_SOURCE: &str = "FILEWARDEN_LOG_SOURCE";
    pub const LOG_SPANS: &str = "FILEWARDEN_LOG_SPANS";
    pub const RUST_LOG: &str = "RUST_LOG";
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Log file path (if file logging enabled).
    pub file_path: Option<PathBuf>,
    /// Include source location.
    pub source_location: bool,
    /// Include span events.
    pub span_events: bool,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" | "information" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Directive string understood by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl From<LogLevel> for tracing_subscriber::filter::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format.
    #[default]
    Pretty,
    /// Compact single-line format.
    Compact,
    /// JSON structured format.
    Json,
}

impl LogFormat {
    /// Parse from string, falling back to [`LogFormat::Pretty`].
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            file_path: None,
            source_location: false,
            span_events: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        let level = lookup(vars::LOG_LEVEL).or_else(|| lookup(vars::RUST_LOG));
        if let Some(l) = level.as_deref().and_then(LogLevel::parse) {
            config.level = l;
        }

        if let Some(format) = lookup(vars::LOG_FORMAT) {
            config.format = LogFormat::parse(&format);
        }

        if let Some(file_path) = lookup(vars::LOG_FILE) {
            config.file_path = Some(PathBuf::from(file_path));
        }

        if let Some(source) = lookup(vars::LOG_SOURCE) {
            config.source_location = is_truthy(&source);
        }

        if let Some(spans) = lookup(vars::LOG_SPANS) {
            config.span_events = is_truthy(&spans);
        }

        config
    }

    /// Override the level, e.g. from CLI verbosity flags.
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn format_layer(config: &LogConfig, ansi: bool) -> fmt::Layer<Registry> {
    fmt::layer()
        .with_ansi(ansi)
        .with_target(true)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_span_events(config.span_events())
}

fn stderr_layer(config: &LogConfig) -> BoxedLayer {
    let layer = format_layer(config, true).with_writer(io::stderr);
    match config.format {
        LogFormat::Pretty => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

fn file_layer(config: &LogConfig, file: std::fs::File) -> BoxedLayer {
    let layer = format_layer(config, false).with_writer(Mutex::new(file));
    match config.format {
        LogFormat::Pretty => layer.boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Initialize logging with the given configuration.
///
/// `RUST_LOG` directives, when present and valid, take precedence over
/// `config.level`.
pub fn init(config: LogConfig) -> Result<(), LogError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let mut layers: Vec<BoxedLayer> = vec![stderr_layer(&config)];

    if let Some(file_path) = &config.file_path {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        layers.push(file_layer(&config, file));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| LogError::InitError(e.to_string()))
}

/// Logging errors.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("failed to initialize logging: {0}")]
    InitError(String),

    #[error("failed to open log file: {0}")]
    FileError(#[from] io::Error),
}

/// Convenience macros re-exported from tracing.
pub use tracing::{debug, error, info, trace, warn};
