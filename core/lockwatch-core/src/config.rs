//! Runtime configuration loaded from `~/.lockwatch/config.toml`.
//!
//! Every field is optional; a missing file yields the defaults.

use chrono::Duration;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{LockwatchError, Result};

pub const DEFAULT_FALLBACK_MIN_MS: i64 = 200;
pub const DEFAULT_FALLBACK_MAX_MS: i64 = 4_000;
pub const DEFAULT_RETENTION_DAYS: i64 = 7;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;
/// A century; anything larger overflows the retention cutoff arithmetic.
pub const MAX_RETENTION_DAYS: i64 = 36_500;

const CONFIG_DIR: &str = ".lockwatch";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LockwatchConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Bounds of the probe-less timing heuristic, in milliseconds since the last digit.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DetectionConfig {
    #[serde(default = "default_fallback_min_ms")]
    pub fallback_min_ms: i64,
    #[serde(default = "default_fallback_max_ms")]
    pub fallback_max_ms: i64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            fallback_min_ms: DEFAULT_FALLBACK_MIN_MS,
            fallback_max_ms: DEFAULT_FALLBACK_MAX_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_days")]
    pub days: i64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: DEFAULT_RETENTION_DAYS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl RetentionConfig {
    /// Retention window. Out-of-range day counts are clamped, so a config
    /// that skipped `validate` still cannot overflow.
    pub fn window(&self) -> Duration {
        Duration::days(self.days.clamp(1, MAX_RETENTION_DAYS))
    }
}

fn default_fallback_min_ms() -> i64 {
    DEFAULT_FALLBACK_MIN_MS
}

fn default_fallback_max_ms() -> i64 {
    DEFAULT_FALLBACK_MAX_MS
}

fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

impl LockwatchConfig {
    pub fn validate(&self) -> Result<()> {
        let detection = &self.detection;
        if detection.fallback_min_ms < 0 {
            return Err(LockwatchError::ConfigInvalid(
                "detection.fallback_min_ms must not be negative".to_string(),
            ));
        }
        if detection.fallback_min_ms > detection.fallback_max_ms {
            return Err(LockwatchError::ConfigInvalid(format!(
                "detection window is inverted: {}ms > {}ms",
                detection.fallback_min_ms, detection.fallback_max_ms
            )));
        }
        if self.retention.days <= 0 {
            return Err(LockwatchError::ConfigInvalid(
                "retention.days must be positive".to_string(),
            ));
        }
        if self.retention.days > MAX_RETENTION_DAYS {
            return Err(LockwatchError::ConfigInvalid(format!(
                "retention.days must be at most {}",
                MAX_RETENTION_DAYS
            )));
        }
        if self.retention.sweep_interval_secs == 0 {
            return Err(LockwatchError::ConfigInvalid(
                "retention.sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn lockwatch_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(LockwatchError::HomeDirNotFound)?;
    Ok(home.join(CONFIG_DIR))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(lockwatch_dir()?.join(CONFIG_FILE))
}

pub fn load_config(path: Option<PathBuf>) -> Result<LockwatchConfig> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(LockwatchConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|source| LockwatchError::Io {
        context: format!("Failed to read config {}", config_path.display()),
        source,
    })?;
    let config = parse_config(&config_path, &content)?;
    config.validate()?;
    Ok(config)
}

fn parse_config(path: &Path, content: &str) -> Result<LockwatchConfig> {
    toml::from_str::<LockwatchConfig>(content).map_err(|err| LockwatchError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}
