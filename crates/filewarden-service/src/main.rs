//! Filewarden - file access auditing service
//!
//! Main entry point for the `filewarden` binary.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser};
use filewarden_common_config::{ConfigLoader, Environment, FilewardenConfig, LoggingSettings};
use filewarden_common_core::AuditError;
use filewarden_common_log::{DiagnosticSink, LogConfig, LogFormat, LogLevel, TracingSink};
use filewarden_service::AuditService;
use tracing::{error, info};

/// Watch directories and log which process touched which file.
#[derive(Debug, Parser)]
#[command(name = "filewarden", version, about)]
struct Cli {
    /// Configuration file; overrides `--config-dir` and `--environment`.
    #[arg(short, long, env = "FILEWARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding `filewarden.<environment>.yaml`.
    #[arg(long, env = "FILEWARDEN_CONFIG_DIR", default_value = ".")]
    config_dir: PathBuf,

    /// Hosting environment name.
    #[arg(short, long, env = "FILEWARDEN_ENVIRONMENT")]
    environment: Option<String>,

    /// Increase diagnostic verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// Application exit codes
#[repr(u8)]
enum Exit {
    Success = 0,
    GeneralError = 1,
    ConfigError = 2,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit as u8)
    }
}

fn main() -> ExitCode {
    if let Err(e) = Environment::init() {
        eprintln!("filewarden: {e}");
        return Exit::ConfigError.into();
    }

    let cli = Cli::parse();
    let environment = cli.environment.clone().unwrap_or_else(Environment::name);

    let loader = match &cli.config {
        Some(path) => ConfigLoader::from_file(path),
        None => ConfigLoader::new(&cli.config_dir, &environment),
    };
    let config = loader.load();

    let logging = config.as_ref().ok().map(|c| &c.logging);
    if let Err(e) = filewarden_common_log::init(log_config(&cli, logging)) {
        eprintln!("filewarden: {e}");
        return Exit::GeneralError.into();
    }

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(path = %loader.path().display(), "Invalid configuration: {e}");
            return Exit::ConfigError.into();
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create Tokio runtime: {e}");
            return Exit::GeneralError.into();
        }
    };

    match runtime.block_on(run(config, &environment)) {
        Ok(()) => Exit::Success.into(),
        Err(e) => {
            error!("{e:#}");
            exit_code(&e).into()
        }
    }
}

async fn run(config: FilewardenConfig, environment: &str) -> anyhow::Result<()> {
    let sink: Arc<dyn DiagnosticSink> = Arc::new(TracingSink::new());
    sink.info(&format!("Machine name: {}", host_name()));
    sink.info(&format!("Hosting environment: {environment}"));

    let mut service = AuditService::new(config.auditor, sink.clone());
    if let Err(e) = service.start().await {
        sink.report(&e);
        service.stop().await;
        return Err(e).context("failed to start audit service");
    }

    shutdown_signal().await?;
    service.stop().await;
    Ok(())
}

fn exit_code(error: &anyhow::Error) -> Exit {
    let is_config = error
        .downcast_ref::<AuditError>()
        .is_some_and(|e| matches!(e, AuditError::Configuration { .. }));
    if is_config {
        Exit::ConfigError
    } else {
        Exit::GeneralError
    }
}

/// Environment variables win over the file; verbosity flags win over both.
fn log_config(cli: &Cli, file: Option<&LoggingSettings>) -> LogConfig {
    use filewarden_common_log::vars;

    let mut config = LogConfig::from_env();
    if let Some(file) = file {
        let env_level = Environment::get(vars::LOG_LEVEL).or_else(|| Environment::get(vars::RUST_LOG));
        if env_level.is_none() {
            if let Some(level) = file.level.as_deref().and_then(LogLevel::parse) {
                config.level = level;
            }
        }
        if Environment::get(vars::LOG_FORMAT).is_none() {
            if let Some(format) = file.format.as_deref() {
                config.format = LogFormat::parse(format);
            }
        }
        if config.file_path.is_none() {
            config.file_path = file.file.clone();
        }
    }

    match (cli.quiet, cli.verbose) {
        (true, _) => config.with_level(LogLevel::Error),
        (false, 0) => config,
        (false, 1) => config.with_level(LogLevel::Debug),
        (false, _) => config.with_level(LogLevel::Trace),
    }
}

#[cfg(unix)]
fn host_name() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(not(unix))]
fn host_name() -> String {
    Environment::get("COMPUTERNAME").unwrap_or_else(|| "unknown".to_string())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = async { tokio::signal::ctrl_c().await.context("failed to listen for Ctrl+C") };

    #[cfg(unix)]
    let terminate = async {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .context("failed to install SIGTERM handler")?;
        term.recv().await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<anyhow::Result<()>>();

    tokio::select! {
        res = ctrl_c => res?,
        res = terminate => res?,
    }

    info!("Shutdown signal received, stopping audit service");
    Ok(())
}
