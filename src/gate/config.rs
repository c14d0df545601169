//! Gate Configuration
//!
//! Thresholds and hysteresis timing for the admission gate. Loaded from
//! YAML/JSON files or `COMMIT_GATE_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const ENV_THETA_M: &str = "COMMIT_GATE_THETA_M";
pub const ENV_EPS: &str = "COMMIT_GATE_EPS";
pub const ENV_MIN_QUEUE_LEN: &str = "COMMIT_GATE_MIN_QUEUE_LEN";
pub const ENV_MIN_OPEN_S: &str = "COMMIT_GATE_MIN_OPEN_S";
pub const ENV_COOLDOWN_S: &str = "COMMIT_GATE_COOLDOWN_S";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{field}`: {value} ({reason})")]
    Invalid {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("environment variable {var}={value:?} is not a number")]
    Env { var: &'static str, value: String },
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("malformed JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Immutable gate thresholds.
///
/// The gate opens only when all three trigger thresholds are met, stays open
/// for at least `min_open_s`, and ignores triggers for `cooldown_s` after a close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum tempo-mismatch ratio.
    pub theta_m: f64,
    /// Minimum self-gate strength.
    pub eps: f64,
    /// Minimum pending-commit count.
    pub min_queue_len: i64,
    /// Minimum dwell once opened (seconds).
    pub min_open_s: f64,
    /// Minimum time after a close before reopening (seconds).
    pub cooldown_s: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            theta_m: 0.8,
            eps: 0.6,
            min_queue_len: 1,
            min_open_s: 5.0,
            cooldown_s: 5.0,
        }
    }
}

impl GateConfig {
    /// Reject non-finite or negative thresholds and hysteresis windows.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative("theta_m", self.theta_m)?;
        check_non_negative("eps", self.eps)?;
        check_non_negative("min_open_s", self.min_open_s)?;
        check_non_negative("cooldown_s", self.cooldown_s)?;
        if self.min_queue_len < 0 {
            return Err(ConfigError::Invalid {
                field: "min_queue_len",
                value: self.min_queue_len.to_string(),
                reason: "must not be negative",
            });
        }
        Ok(())
    }

    /// Load from a `.yaml`/`.yml` or JSON file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config: Self = if is_yaml {
            serde_yaml::from_str(&raw)?
        } else {
            serde_json::from_str(&raw)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by any `COMMIT_GATE_*` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`GateConfig::from_env`] with an injectable variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, ENV_THETA_M)? {
            config.theta_m = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_EPS)? {
            config.eps = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MIN_QUEUE_LEN)? {
            config.min_queue_len = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MIN_OPEN_S)? {
            config.min_open_s = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_COOLDOWN_S)? {
            config.cooldown_s = v;
        }
        config.validate()?;
        Ok(config)
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::Invalid {
            field,
            value: value.to_string(),
            reason: "must be finite",
        });
    }
    if value < 0.0 {
        return Err(ConfigError::Invalid {
            field,
            value: value.to_string(),
            reason: "must not be negative",
        });
    }
    Ok(())
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value: raw }),
    }
}
