use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Environment variable naming the settings file consumed by the binary.
pub const CONFIG_PATH_ENV: &str = "COHERON_CONFIG";
/// Default settings file path when the env var is unset.
pub const DEFAULT_CONFIG_PATH: &str = "coheron.json";

/// What `resolve` hands out when neither online nor offline data exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColdStartPolicy {
    /// Return a COLD vector carrying the schema's documented zero-vector.
    ZeroVector,
    /// Refuse the read; callers route to their rule-based fallback.
    Reject,
}

/// Recognized configuration surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Online state expiry; past `last_updated + ttl` a record is
    /// logically absent.
    #[serde(default = "defaults::ttl_seconds")]
    pub ttl_seconds: u64,
    /// Bound on reload-and-retry cycles when a CAS write conflicts.
    #[serde(default = "defaults::cas_max_retries")]
    pub cas_max_retries: u32,
    /// Capacity of the ingestor's recently-seen event-id window.
    #[serde(default = "defaults::dedup_window_size")]
    pub dedup_window_size: usize,
    #[serde(default = "defaults::cold_start_policy")]
    pub cold_start_policy: ColdStartPolicy,
    /// Bound on stream-fetch attempts before the ingest loop halts.
    #[serde(default = "defaults::fetch_max_attempts")]
    pub fetch_max_attempts: u32,
    #[serde(default = "defaults::backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    #[serde(default = "defaults::backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Partition count the entity key space is co-partitioned over.
    #[serde(default = "defaults::partitions")]
    pub partitions: u32,
}

mod defaults {
    use super::ColdStartPolicy;

    pub fn ttl_seconds() -> u64 {
        3_600
    }

    pub fn cas_max_retries() -> u32 {
        5
    }

    pub fn dedup_window_size() -> usize {
        crate::event_model::DEFAULT_DEDUP_WINDOW_SIZE
    }

    pub fn cold_start_policy() -> ColdStartPolicy {
        ColdStartPolicy::ZeroVector
    }

    pub fn fetch_max_attempts() -> u32 {
        6
    }

    pub fn backoff_initial_ms() -> u64 {
        100
    }

    pub fn backoff_cap_ms() -> u64 {
        30_000
    }

    pub fn partitions() -> u32 {
        16
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ttl_seconds: defaults::ttl_seconds(),
            cas_max_retries: defaults::cas_max_retries(),
            dedup_window_size: defaults::dedup_window_size(),
            cold_start_policy: defaults::cold_start_policy(),
            fetch_max_attempts: defaults::fetch_max_attempts(),
            backoff_initial_ms: defaults::backoff_initial_ms(),
            backoff_cap_ms: defaults::backoff_cap_ms(),
            partitions: defaults::partitions(),
        }
    }
}

impl Settings {
    /// Parses settings from a JSON value and validates them.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let settings: Settings =
            serde_json::from_value(value).map_err(|source| ConfigError::Invalid {
                detail: source.to_string(),
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Enforces the knob bounds the engine depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_seconds == 0 {
            return Err(ConfigError::OutOfRange {
                knob: "ttl_seconds",
                detail: "must be positive".into(),
            });
        }
        if self.cas_max_retries == 0 {
            return Err(ConfigError::OutOfRange {
                knob: "cas_max_retries",
                detail: "at least one retry is required".into(),
            });
        }
        if self.dedup_window_size == 0 {
            return Err(ConfigError::OutOfRange {
                knob: "dedup_window_size",
                detail: "must be positive".into(),
            });
        }
        if self.fetch_max_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                knob: "fetch_max_attempts",
                detail: "must be positive".into(),
            });
        }
        if self.backoff_cap_ms < self.backoff_initial_ms {
            return Err(ConfigError::OutOfRange {
                knob: "backoff_cap_ms",
                detail: format!(
                    "cap {} is below initial {}",
                    self.backoff_cap_ms, self.backoff_initial_ms
                ),
            });
        }
        if self.partitions == 0 {
            return Err(ConfigError::OutOfRange {
                knob: "partitions",
                detail: "must be positive".into(),
            });
        }
        Ok(())
    }

    /// TTL expressed in milliseconds, the unit all state math runs in.
    pub fn ttl_ms(&self) -> u64 {
        self.ttl_seconds.saturating_mul(1_000)
    }
}

/// Loads settings from a JSON file.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        detail: source.to_string(),
    })?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Invalid {
            detail: source.to_string(),
        })?;
    Settings::from_json_value(value)
}

/// Resolves the settings file path from the environment.
pub fn config_path_from_env() -> String {
    std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

/// Errors surfaced while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {detail}")]
    Read { path: String, detail: String },
    #[error("settings are not valid: {detail}")]
    Invalid { detail: String },
    #[error("setting '{knob}' out of range: {detail}")]
    OutOfRange { knob: &'static str, detail: String },
}
