//! CLI Exit Code Registry
//!
//! Single source of truth for `apptopo` exit codes. Schedulers and wrapper
//! scripts branch on these, so treat them as a contract.
//!
//! | Code | Meaning                                                    |
//! |------|------------------------------------------------------------|
//! | 0    | Success                                                    |
//! | 1    | General error (unspecified)                                |
//! | 2    | Usage error (bad args, unreadable config file)             |
//! | 60   | Invalid configuration (JSON, field map, credentials)       |
//! | 61   | CSV source failed, never appeared, or wait was cancelled   |
//! | 62   | Management platform call failed                            |
//! | 63   | CSV could not be ingested (bad encoding, missing column)   |

use apptopo_recon::{PlatformError, ReconError};

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, config file missing or unreadable.
pub const EXIT_USAGE: u8 = 2;

/// Config JSON malformed or invalid, or required credentials missing.
pub const EXIT_CONFIG: u8 = 60;

/// CSV source unavailable, retries exhausted, or cancelled while waiting.
pub const EXIT_SOURCE: u8 = 61;

/// Platform login, inventory read or topology write failed.
pub const EXIT_PLATFORM: u8 = 62;

/// CSV bytes could not be decoded or the field map does not fit the data.
pub const EXIT_INGEST: u8 = 63;

/// Exit code for an engine error.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_CONFIG,
        ReconError::MissingColumn { .. } | ReconError::Csv(_) => EXIT_INGEST,
        ReconError::Source(_) | ReconError::SourceExhausted { .. } | ReconError::Cancelled(_) => {
            EXIT_SOURCE
        }
        ReconError::Platform(_) => EXIT_PLATFORM,
    }
}

/// Operator hint for an engine error, if there is an obvious next step.
pub fn recon_hint(err: &ReconError) -> Option<String> {
    match err {
        ReconError::MissingColumn { .. } => {
            Some("check ENTITY_FIELD_MAP against the CSV header row".to_string())
        }
        ReconError::SourceExhausted { .. } => Some(
            "raise CSV_RETRY_ATTEMPTS or CSV_RETRY_INTERVAL_SECS if the upload runs late".to_string(),
        ),
        ReconError::Platform(PlatformError::Auth { .. }) => {
            Some("check TURBO_USERNAME and TURBO_PASSWORD".to_string())
        }
        ReconError::Platform(PlatformError::Network(_)) => {
            Some("check TURBO_ADDRESS; set TURBO_INSECURE_TLS=1 for self-signed certificates".to_string())
        }
        _ => None,
    }
}
