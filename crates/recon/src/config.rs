use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ReconError;
use crate::matcher::MatchStrategy;
use crate::source::RetryPolicy;

pub const DEFAULT_PAGE_SIZE: usize = 500;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Validated run configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input_csv_name: String,
    /// Local directory or remote prefix the CSV lives under.
    pub input_csv_dir: String,
    pub csv_location: CsvLocation,
    pub field_map: FieldMap,
    pub match_ip: bool,
    pub app_prefix: String,
    pub page_size: usize,
    pub retry: RetryPolicy,
    pub logging: LogConfig,
    /// Top-level keys we don't use (config files are shared with other tooling).
    pub ignored_keys: Vec<String>,
}

/// On-disk JSON shape. Keys are upper-case to match existing config files.
#[derive(Debug, Deserialize)]
struct RawRunConfig {
    #[serde(rename = "INPUT_CSV_NAME", default)]
    input_csv_name: Option<String>,
    #[serde(rename = "INPUT_CSV_DIR", default)]
    input_csv_dir: Option<String>,
    #[serde(rename = "CSV_LOCATION", default)]
    csv_location: Option<String>,
    #[serde(rename = "ENTITY_FIELD_MAP", default)]
    entity_field_map: Option<serde_json::Map<String, Value>>,
    /// Older name for `ENTITY_FIELD_MAP`.
    #[serde(rename = "INPUT_CSV_FIELD_MAP", default)]
    input_csv_field_map: Option<serde_json::Map<String, Value>>,
    #[serde(rename = "MATCH_IP", default)]
    match_ip: Option<bool>,
    #[serde(rename = "APP_PREFIX", default)]
    app_prefix: Option<String>,
    #[serde(rename = "PAGE_SIZE", default)]
    page_size: Option<usize>,
    #[serde(rename = "CSV_RETRY_INTERVAL_SECS", default)]
    csv_retry_interval_secs: Option<u64>,
    #[serde(rename = "CSV_RETRY_ATTEMPTS", default)]
    csv_retry_attempts: Option<u32>,
    #[serde(rename = "LOG_LEVEL", default)]
    log_level: Option<String>,
    #[serde(rename = "LOG_DIR", default)]
    log_dir: Option<String>,
    #[serde(rename = "LOG_FILE", default)]
    log_file: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// CSV location
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CsvLocation {
    Azure,
    Aws,
    Ftp,
    Local,
}

impl FromStr for CsvLocation {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AZURE" => Ok(Self::Azure),
            "AWS" => Ok(Self::Aws),
            "FTP" => Ok(Self::Ftp),
            "LOCAL" => Ok(Self::Local),
            _ => Err(ReconError::ConfigValidation(format!(
                "CSV_LOCATION must be one of AZURE, AWS, FTP, LOCAL; got \"{s}\""
            ))),
        }
    }
}

impl fmt::Display for CsvLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Azure => write!(f, "AZURE"),
            Self::Aws => write!(f, "AWS"),
            Self::Ftp => write!(f, "FTP"),
            Self::Local => write!(f, "LOCAL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

/// CSV column names for each field the ingestor reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMap {
    pub app_name: String,
    pub entity_name: String,
    /// `None` means the CSV carries no address column.
    pub entity_ip: Option<String>,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            app_name: "app_name".into(),
            entity_name: "vm_name".into(),
            entity_ip: Some("vm_ip".into()),
        }
    }
}

impl FieldMap {
    const KEYS: [&'static str; 3] = ["app_name", "entity_name", "entity_ip"];

    /// Merge user overrides over the defaults.
    pub fn from_overrides(overrides: &serde_json::Map<String, Value>) -> Result<Self, ReconError> {
        let mut map = Self::default();

        for (key, value) in overrides {
            match key.as_str() {
                "app_name" => map.app_name = required_column(key, value)?,
                "entity_name" => map.entity_name = required_column(key, value)?,
                "entity_ip" => {
                    map.entity_ip = match value {
                        Value::Null => None,
                        Value::String(s) if s.trim().is_empty() => None,
                        Value::String(s) => Some(s.clone()),
                        other => {
                            return Err(ReconError::ConfigValidation(format!(
                                "ENTITY_FIELD_MAP.entity_ip must be a string or null, got {other}"
                            )))
                        }
                    }
                }
                _ => {
                    return Err(ReconError::ConfigValidation(format!(
                        "ENTITY_FIELD_MAP: unknown key \"{key}\" (expected one of {})",
                        Self::KEYS.join(", ")
                    )))
                }
            }
        }

        Ok(map)
    }
}

fn required_column(key: &str, value: &Value) -> Result<String, ReconError> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
        _ => Err(ReconError::ConfigValidation(format!(
            "ENTITY_FIELD_MAP.{key} must be a non-empty column name"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive for an `EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" | "critical" => Ok(Self::Error),
            _ => Err(ReconError::ConfigValidation(format!(
                "LOG_LEVEL must be one of debug, info, warn, error; got \"{s}\""
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: LogLevel,
    pub dir: Option<String>,
    pub file: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: LogLevel::Info, dir: None, file: None }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl RunConfig {
    pub fn from_json(input: &str) -> Result<Self, ReconError> {
        let raw: RawRunConfig =
            serde_json::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        let config = Self::from_raw(raw)?;
        config.validate()?;

        for key in &config.ignored_keys {
            debug!("ignoring unrecognized config key {key}");
        }

        Ok(config)
    }

    fn from_raw(raw: RawRunConfig) -> Result<Self, ReconError> {
        let input_csv_name = raw
            .input_csv_name
            .ok_or_else(|| ReconError::ConfigValidation("INPUT_CSV_NAME is required".into()))?;

        let csv_location = raw
            .csv_location
            .ok_or_else(|| ReconError::ConfigValidation("CSV_LOCATION is required".into()))?
            .parse()?;

        let field_map = match raw.entity_field_map.or(raw.input_csv_field_map) {
            Some(ref overrides) => FieldMap::from_overrides(overrides)?,
            None => FieldMap::default(),
        };

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            interval: raw
                .csv_retry_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            max_attempts: raw.csv_retry_attempts.unwrap_or(defaults.max_attempts),
        };

        let level = match raw.log_level {
            Some(ref s) => s.parse()?,
            None => LogLevel::Info,
        };

        Ok(Self {
            input_csv_name,
            input_csv_dir: raw.input_csv_dir.unwrap_or_else(|| ".".into()),
            csv_location,
            field_map,
            match_ip: raw.match_ip.unwrap_or(true),
            app_prefix: raw.app_prefix.unwrap_or_default(),
            page_size: raw.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            retry,
            logging: LogConfig {
                level,
                dir: raw.log_dir.filter(|s| !s.is_empty()),
                file: raw.log_file.filter(|s| !s.is_empty()),
            },
            ignored_keys: raw.extra.into_keys().collect(),
        })
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.input_csv_name.trim().is_empty() {
            return Err(ReconError::ConfigValidation("INPUT_CSV_NAME must not be empty".into()));
        }

        if self.match_ip && self.field_map.entity_ip.is_none() {
            return Err(ReconError::ConfigValidation(
                "MATCH_IP is true but ENTITY_FIELD_MAP maps no entity_ip column".into(),
            ));
        }

        if self.page_size == 0 {
            return Err(ReconError::ConfigValidation("PAGE_SIZE must be at least 1".into()));
        }

        if self.retry.max_attempts == 0 {
            return Err(ReconError::ConfigValidation(
                "CSV_RETRY_ATTEMPTS must be at least 1".into(),
            ));
        }

        Ok(())
    }

    pub fn match_strategy(&self) -> MatchStrategy {
        MatchStrategy::from_match_ip(self.match_ip)
    }
}
