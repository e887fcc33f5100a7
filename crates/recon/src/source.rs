//! CSV acquisition: the source capability plus the wait-for-upload loop.
//!
//! An upstream producer may upload the CSV after this job starts, so
//! "not found" is retried at a fixed interval. Anything else a source
//! reports is fatal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::ReconError;

/// Sleep granularity while waiting, so cancellation is seen promptly.
const CANCEL_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum SourceError {
    /// Object is not there (yet).
    #[error("{0} not found")]
    NotFound(String),
    /// Auth, network or server failure reaching the source.
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Somewhere a named CSV can be fetched from.
pub trait CsvSource {
    fn fetch_bytes(&self, filename: &str) -> Result<Vec<u8>, SourceError>;

    /// Human-readable location for log lines.
    fn describe(&self) -> String;
}

/// Fixed-interval, bounded retry on `NotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_attempts: 120,
        }
    }
}

/// Fetch `filename`, waiting for it to appear.
///
/// Returns `SourceExhausted` after `max_attempts` misses, `Cancelled` if
/// `cancel` is raised while waiting, and `Source` for unavailable sources.
pub fn acquire_csv(
    source: &dyn CsvSource,
    filename: &str,
    policy: &RetryPolicy,
    cancel: &AtomicBool,
) -> Result<Vec<u8>, ReconError> {
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        if cancel.load(Ordering::Relaxed) {
            return Err(ReconError::Cancelled(filename.to_string()));
        }

        match source.fetch_bytes(filename) {
            Ok(bytes) => {
                info!(
                    source = %source.describe(),
                    file = %filename,
                    bytes = bytes.len(),
                    attempt,
                    "fetched input CSV"
                );
                return Ok(bytes);
            }
            Err(SourceError::NotFound(what)) => {
                if attempt == attempts {
                    break;
                }
                warn!(
                    source = %source.describe(),
                    "{what} not found yet (attempt {attempt}/{attempts}), retrying in {}s",
                    policy.interval.as_secs()
                );
                if !sleep_unless_cancelled(policy.interval, cancel) {
                    return Err(ReconError::Cancelled(filename.to_string()));
                }
            }
            Err(e) => {
                error!(source = %source.describe(), file = %filename, "cannot fetch input CSV: {e}");
                return Err(e.into());
            }
        }
    }

    error!(
        source = %source.describe(),
        file = %filename,
        attempts,
        "input CSV never appeared"
    );
    Err(ReconError::SourceExhausted {
        name: filename.to_string(),
        attempts,
    })
}

/// Returns false if cancelled before `total` elapsed.
fn sleep_unless_cancelled(total: Duration, cancel: &AtomicBool) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if cancel.load(Ordering::Relaxed) {
            debug!("wait cancelled");
            return false;
        }
        let step = remaining.min(CANCEL_POLL);
        thread::sleep(step);
        remaining -= step;
    }
    !cancel.load(Ordering::Relaxed)
}
