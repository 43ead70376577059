use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Remote endpoint listing every reserved and uploaded PV id.
pub const DEFAULT_URL: &str = "https://divamodarchive.com/api/v1/ids/all_pvs";

/// Directory the slim tables are written into.
pub const DEFAULT_OUTPUT_DIR: &str = "pv_ids";

pub const MIN_PV_ID: i64 = 1;
pub const MAX_PV_ID: i64 = 4_294_967_296;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Closed range of PV ids eligible for export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PvIdRange {
    pub min: i64,
    pub max: i64,
}

impl PvIdRange {
    #[must_use]
    pub fn contains(&self, id: i64) -> bool {
        (self.min..=self.max).contains(&id)
    }
}

impl Default for PvIdRange {
    fn default() -> Self {
        Self {
            min: MIN_PV_ID,
            max: MAX_PV_ID,
        }
    }
}

/// Exporter configuration.
///
/// The source URL and the PV id range are fixed at compile time; only the
/// operational output and transport settings can be overridden from the
/// environment. Tests build a `Config` directly to point at a mock server.
#[derive(Debug, Clone)]
pub struct Config {
    // Source
    pub url: String,
    pub request_timeout: Option<Duration>,

    // Projection
    pub pv_id_range: PvIdRange,

    // Output
    pub output_dir: PathBuf,
    pub write_timestamp: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            request_timeout: None,
            pv_id_range: PvIdRange::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            write_timestamp: true,
        }
    }
}

impl Config {
    /// Load configuration: compile-time source and range, with optional
    /// environment overrides for output and transport settings.
    ///
    /// # Errors
    ///
    /// Returns an error if a set environment variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            // Output
            output_dir: PathBuf::from(env_or_default("PV_IDS_OUTPUT_DIR", DEFAULT_OUTPUT_DIR)),
            write_timestamp: parse_env_bool("PV_IDS_WRITE_TIMESTAMP", defaults.write_timestamp)?,

            // Transport
            request_timeout: parse_env_opt_u64("PV_IDS_TIMEOUT_SECS")?.map(Duration::from_secs),

            ..defaults
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "url".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.pv_id_range.min > self.pv_id_range.max {
            return Err(ConfigError::InvalidValue {
                name: "pv_id_range".to_string(),
                message: format!(
                    "min must not exceed max ({} > {})",
                    self.pv_id_range.min, self.pv_id_range.max
                ),
            });
        }
        // Overflowing ids saturate to the i64 bounds and must stay excluded.
        if self.pv_id_range.min == i64::MIN || self.pv_id_range.max == i64::MAX {
            return Err(ConfigError::InvalidValue {
                name: "pv_id_range".to_string(),
                message: "bounds must lie strictly inside the i64 range".to_string(),
            });
        }
        if self.request_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidValue {
                name: "PV_IDS_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_opt_u64(name: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map(Some).map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(None),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}
