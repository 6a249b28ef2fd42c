//! Tracing subscriber setup
//!
//! Console output plus a plain-text log file, both filtered by the configured
//! level (`RUST_LOG` wins when set). The file is written through a
//! non-blocking appender; the returned guard must live until exit or the
//! last lines are lost.

use std::path::Path;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::LoggingConfig;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log level {level:?}: {message}")]
    InvalidLevel { level: String, message: String },

    #[error("Log file path has no file name: {0}")]
    InvalidPath(String),

    #[error("Failed to install tracing subscriber: {0}")]
    Init(String),
}

pub fn init_logging(
    config: &LoggingConfig,
    log_file: &Path,
) -> Result<Option<WorkerGuard>, LoggingError> {
    let env_filter = build_filter(&config.level)?;

    let (file_layer, guard) = if config.file {
        let file_name = log_file
            .file_name()
            .ok_or_else(|| LoggingError::InvalidPath(log_file.display().to_string()))?;
        let directory = log_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let appender = tracing_appender::rolling::never(directory, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let console_layer = config
        .console
        .then(|| fmt::layer().with_target(false).compact());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(guard)
}

fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level.to_lowercase()).map_err(|e| LoggingError::InvalidLevel {
        level: level.to_string(),
        message: e.to_string(),
    })
}
