//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

pub const ENV_LISTEN: &str = "QBANK_LISTEN";
pub const ENV_MAX_JOBS: &str = "QBANK_MAX_JOBS";
pub const ENV_RETENTION_SECS: &str = "QBANK_RETENTION_SECS";
pub const ENV_PURGE_INTERVAL_SECS: &str = "QBANK_PURGE_INTERVAL_SECS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub listen: SocketAddr,
    /// Tracker capacity; creation beyond it fails with resource exhausted.
    pub max_jobs: usize,
    /// How long terminal jobs are kept before purge.
    pub retention: Duration,
    /// Zero disables the purge task.
    pub purge_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8001)),
            max_jobs: 10_000,
            retention: Duration::from_secs(24 * 60 * 60),
            purge_interval: Duration::from_secs(300),
        }
    }
}

fn parse_var<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Some(v) = lookup(ENV_LISTEN) {
            cfg.listen = parse_var(ENV_LISTEN, v)?;
        }
        if let Some(v) = lookup(ENV_MAX_JOBS) {
            cfg.max_jobs = parse_var(ENV_MAX_JOBS, v)?;
        }
        if let Some(v) = lookup(ENV_RETENTION_SECS) {
            cfg.retention = Duration::from_secs(parse_var(ENV_RETENTION_SECS, v)?);
        }
        if let Some(v) = lookup(ENV_PURGE_INTERVAL_SECS) {
            cfg.purge_interval = Duration::from_secs(parse_var(ENV_PURGE_INTERVAL_SECS, v)?);
        }
        Ok(cfg)
    }
}
