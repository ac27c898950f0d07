use crate::config::AppConfig;
use crate::error::StudyMintError;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Log file name inside the log directory
pub const LOG_FILE_NAME: &str = "studymint.log";

/// Where log events go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// stderr only
    Console,
    /// stderr plus an append-only file in the given directory
    ConsoleAndFile(PathBuf),
}

/// Initialize logging from application configuration
///
/// Stdout is never written to, so command output can be piped.
pub fn init(config: &AppConfig, target: LogTarget) -> Result<(), StudyMintError> {
    match target {
        LogTarget::Console => setup_console_logging(&config.log_level),
        LogTarget::ConsoleAndFile(dir) => setup_logging(&dir, &config.log_level),
    }
}

/// Console and file logging
///
/// # Arguments
/// * `log_dir` - Directory where the log file is stored
/// * `log_level` - Default level when `RUST_LOG` is unset
pub fn setup_logging(log_dir: &Path, log_level: &str) -> Result<(), StudyMintError> {
    let log_file_path = log_dir.join(LOG_FILE_NAME);
    let log_file = open_log_file(log_dir, &log_file_path)?;

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(env_filter(log_level));

    let file_layer = fmt::layer()
        .with_writer(log_file)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_filter(env_filter(log_level));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| StudyMintError::config(format!("Failed to initialize logging: {}", e)))?;

    tracing::info!(
        "Logging initialized: level={}, log_file={}",
        parse_log_level(log_level),
        log_file_path.display()
    );

    Ok(())
}

/// Console-only logging on stderr
pub fn setup_console_logging(log_level: &str) -> Result<(), StudyMintError> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_env_filter(env_filter(log_level))
        .try_init()
        .map_err(|e| StudyMintError::config(format!("Failed to initialize logging: {}", e)))?;

    tracing::debug!("Console logging initialized: level={}", parse_log_level(log_level));

    Ok(())
}

// RUST_LOG wins over the configured level
fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(parse_log_level(log_level).as_str().to_lowercase()))
}

fn open_log_file(log_dir: &Path, log_file_path: &Path) -> Result<File, StudyMintError> {
    std::fs::create_dir_all(log_dir).map_err(|e| {
        StudyMintError::config(format!(
            "Failed to create log directory {}: {}",
            log_dir.display(),
            e
        ))
    })?;

    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .map_err(|e| {
            StudyMintError::config(format!(
                "Failed to open log file {}: {}",
                log_file_path.display(),
                e
            ))
        })
}

/// Parse string to tracing Level, defaulting to INFO
pub fn parse_log_level(level: &str) -> Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
