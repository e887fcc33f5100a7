use thiserror::Error;

use crate::platform::PlatformError;
use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum ReconError {
    /// JSON parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (bad location, bad field map, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// A row mapping lacks a required mapped column.
    #[error("row {row}: missing column '{column}'")]
    MissingColumn { row: usize, column: String },
    /// CSV decode error.
    #[error("CSV read error: {0}")]
    Csv(String),
    /// CSV source failed in a way that is not worth retrying.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// CSV never appeared within the retry budget.
    #[error("{name} not found after {attempts} attempt(s)")]
    SourceExhausted { name: String, attempts: u32 },
    /// Run cancelled while waiting for the CSV.
    #[error("cancelled while waiting for {0}")]
    Cancelled(String),
    /// Management platform call failed.
    #[error(transparent)]
    Platform(#[from] PlatformError),
}
