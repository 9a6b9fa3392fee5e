//! File logging.
//!
//! The terminal belongs to the UI, so tracing output goes to
//! `<data dir>/wavedeck/logs/wavedeck.log` instead of stdout.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

use crate::config::APP_DIR_NAME;

const LOG_FILE_NAME: &str = "wavedeck.log";
const LOG_ENV: &str = "WAVEDECK_LOG";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("No suitable data directory available for logs")]
    NoDataDir,
    #[error("Failed to prepare log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn log_directory() -> Result<PathBuf, LoggingError> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join("logs"))
        .ok_or(LoggingError::NoDataDir)
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init() -> Result<PathBuf, LoggingError> {
    let dir = log_directory()?;
    init_in(&dir)?;
    Ok(dir.join(LOG_FILE_NAME))
}

pub fn init_in(dir: &Path) -> Result<(), LoggingError> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let file_appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer().with_ansi(false).with_writer(file_writer);

    let subscriber = Registry::default().with(build_env_filter()).with(file_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = LOG_GUARD.set(guard);

    tracing::info!("logging to {}", dir.join(LOG_FILE_NAME).display());
    Ok(())
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}
