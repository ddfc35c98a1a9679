//! Outbox configuration.
//!
//! Loaded from environment variables (`OUTBOX_ENABLED`, `OUTBOX_WORKERS`,
//! `OUTBOX_BATCH_SIZE`, `OUTBOX_WAIT_TIME_MS`, `OUTBOX_IN_PROGRESS_TTL_MS`)
//! or deserialized from JSON. When processing is disabled the remaining
//! variables are optional.

mod toggle;

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::outbox_worker::DispatchSettings;

pub use toggle::OutboxToggle;

pub const ENV_ENABLED: &str = "OUTBOX_ENABLED";
pub const ENV_WORKERS: &str = "OUTBOX_WORKERS";
pub const ENV_BATCH_SIZE: &str = "OUTBOX_BATCH_SIZE";
pub const ENV_WAIT_TIME_MS: &str = "OUTBOX_WAIT_TIME_MS";
pub const ENV_IN_PROGRESS_TTL_MS: &str = "OUTBOX_IN_PROGRESS_TTL_MS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid outbox config: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    pub enabled: bool,
    pub workers: usize,
    pub batch_size: usize,
    /// Idle time between two cycles of one worker.
    pub wait_time_ms: u64,
    /// Age after which an `InProgress` claim is considered abandoned.
    pub in_progress_ttl_ms: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            workers: 1,
            batch_size: 100,
            wait_time_ms: 1_000,
            in_progress_ttl_ms: 30_000,
        }
    }
}

impl OutboxConfig {
    /// Read the config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the config through `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = OutboxConfig {
            enabled: parse_bool(ENV_ENABLED, &required(&lookup, ENV_ENABLED)?)?,
            ..OutboxConfig::default()
        };

        if config.enabled {
            config.workers = parse_number(ENV_WORKERS, &required(&lookup, ENV_WORKERS)?)?;
            config.batch_size =
                parse_number(ENV_BATCH_SIZE, &required(&lookup, ENV_BATCH_SIZE)?)?;
            config.wait_time_ms =
                parse_number(ENV_WAIT_TIME_MS, &required(&lookup, ENV_WAIT_TIME_MS)?)?;
            config.in_progress_ttl_ms = parse_number(
                ENV_IN_PROGRESS_TTL_MS,
                &required(&lookup, ENV_IN_PROGRESS_TTL_MS)?,
            )?;
        }

        Ok(config)
    }

    /// Parse a JSON document; absent fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_millis(self.wait_time_ms)
    }

    pub fn in_progress_ttl(&self) -> Duration {
        Duration::from_millis(self.in_progress_ttl_ms)
    }

    /// A toggle initialised from `enabled`.
    pub fn toggle(&self) -> OutboxToggle {
        OutboxToggle::new(self.enabled)
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            workers: self.workers,
            batch_size: self.batch_size,
            poll_interval: self.wait_time(),
            in_progress_ttl: self.in_progress_ttl(),
        }
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).ok_or(ConfigError::Missing(name))
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_number<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: err.to_string(),
    })
}
