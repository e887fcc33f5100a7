//! Per-run log subscriber.
//!
//! Built from the run config and installed with
//! `tracing::subscriber::with_default` around one command, never globally.
//! `APPTOPO_LOG` (an `EnvFilter` directive) overrides `LOG_LEVEL`.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use apptopo_recon::config::{LogConfig, LogLevel};
use tracing::Subscriber;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::CliError;

pub const LOG_ENV: &str = "APPTOPO_LOG";

/// Rotate to `<file>.1` once the log passes this size at startup.
const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

pub fn filter_for(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(level.as_filter()))
}

/// `LOG_DIR/LOG_FILE` when both are set.
pub fn log_path(config: &LogConfig) -> Option<PathBuf> {
    match (&config.dir, &config.file) {
        (Some(dir), Some(file)) => Some(Path::new(dir).join(file)),
        _ => None,
    }
}

/// Subscriber writing to the configured log file (appending), or stderr.
pub fn build_subscriber(config: &LogConfig) -> Result<Box<dyn Subscriber + Send + Sync>, CliError> {
    let (writer, ansi) = match log_path(config) {
        Some(path) => (BoxMakeWriter::new(Mutex::new(open_log_file(&path)?)), false),
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter_for(config.level))
        .with(fmt::layer().with_writer(writer).with_ansi(ansi).with_target(false));

    Ok(Box::new(subscriber))
}

fn open_log_file(path: &Path) -> Result<File, CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            CliError::config(format!("cannot create log directory {}: {e}", parent.display()))
        })?;
    }

    rotate_if_large(path, MAX_LOG_BYTES)
        .map_err(|e| CliError::config(format!("cannot rotate log file {}: {e}", path.display())))?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| CliError::config(format!("cannot open log file {}: {e}", path.display())))
}

/// Move `path` to `path.1` (replacing any older backup) when it exceeds `limit`.
fn rotate_if_large(path: &Path, limit: u64) -> std::io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if size <= limit {
        return Ok(false);
    }

    let mut backup = path.as_os_str().to_owned();
    backup.push(".1");
    fs::rename(path, PathBuf::from(backup))?;
    Ok(true)
}
