//! CSV source adapters, one per `CSV_LOCATION`.
//!
//! Each adapter implements [`CsvSource`] and owns its credentials, read from
//! the environment when the source is built. Missing credentials are a
//! configuration error (exit 60) raised before any fetch is attempted.
//!
//! Error contract for every adapter:
//! - object absent → `SourceError::NotFound` (retried by the engine)
//! - anything else (auth, network, server) → `SourceError::Unavailable`

use std::time::Duration;

use apptopo_recon::{CsvLocation, CsvSource, RunConfig, SourceError};
use reqwest::blocking::{Client, RequestBuilder};

use crate::CliError;

pub mod aws;
pub mod azure;
pub mod local;
#[cfg(feature = "sftp")]
pub mod sftp;

pub(crate) const USER_AGENT: &str = concat!("apptopo/", env!("CARGO_PKG_VERSION"));

/// Build the source selected by `CSV_LOCATION`, reading credentials from the
/// process environment.
pub fn from_config(config: &RunConfig) -> Result<Box<dyn CsvSource>, CliError> {
    from_lookup(config, |key| std::env::var(key).ok())
}

/// Same as [`from_config`] with an explicit env-like lookup.
pub fn from_lookup(
    config: &RunConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Box<dyn CsvSource>, CliError> {
    let dir = config.input_csv_dir.as_str();

    let source: Box<dyn CsvSource> = match config.csv_location {
        CsvLocation::Local => Box::new(local::LocalSource::new(dir)),
        CsvLocation::Azure => Box::new(
            azure::AzureBlobSource::from_lookup(&lookup, dir).map_err(CliError::config)?,
        ),
        CsvLocation::Aws => {
            Box::new(aws::S3Source::from_lookup(&lookup, dir).map_err(CliError::config)?)
        }
        CsvLocation::Ftp => ftp_source(&lookup, dir)?,
    };

    Ok(source)
}

#[cfg(feature = "sftp")]
fn ftp_source(
    lookup: &impl Fn(&str) -> Option<String>,
    dir: &str,
) -> Result<Box<dyn CsvSource>, CliError> {
    Ok(Box::new(sftp::SftpSource::from_lookup(lookup, dir).map_err(CliError::config)?))
}

#[cfg(not(feature = "sftp"))]
fn ftp_source(
    _lookup: &impl Fn(&str) -> Option<String>,
    _dir: &str,
) -> Result<Box<dyn CsvSource>, CliError> {
    Err(CliError::config("CSV_LOCATION FTP is not available in this build")
        .with_hint("rebuild with `--features sftp`"))
}

// ── Shared helpers ──────────────────────────────────────────────────

pub(crate) fn require(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<String, String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("missing CSV source credential: set {key}"))
}

/// Object key for `filename` under the configured directory/prefix.
pub(crate) fn object_key(prefix: &str, filename: &str) -> String {
    let prefix = prefix.trim().trim_matches('/');
    if prefix.is_empty() || prefix == "." {
        filename.to_string()
    } else {
        format!("{prefix}/{filename}")
    }
}

pub(crate) fn http_client() -> Result<Client, String> {
    Client::builder()
        .timeout(Duration::from_secs(60))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| format!("cannot build HTTP client: {e}"))
}

/// Send a blob GET. 404 means "not there yet"; every other failure is fatal.
pub(crate) fn fetch_blob(req: RequestBuilder, what: &str) -> Result<Vec<u8>, SourceError> {
    let response = req
        .send()
        .map_err(|e| SourceError::Unavailable(format!("{what}: {e}")))?;

    let status = response.status().as_u16();
    if status == 404 {
        return Err(SourceError::NotFound(what.to_string()));
    }
    if !response.status().is_success() {
        let body = response.text().unwrap_or_default();
        return Err(SourceError::Unavailable(format!(
            "{what}: HTTP {status}: {}",
            body.chars().take(200).collect::<String>()
        )));
    }

    response
        .bytes()
        .map(|b| b.to_vec())
        .map_err(|e| SourceError::Unavailable(format!("{what}: {e}")))
}
