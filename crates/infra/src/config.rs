//! Configuration loading and representation.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::jobs::EngineConfig;
use crate::transaction::{RetryPolicy, TransactionSupport};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Process configuration, read from `ITEMFLOW_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub transactions: TransactionSupport,
    pub retry: RetryPolicy,
    pub engine: EngineConfig,
    /// How often expired jobs are purged
    pub job_sweep_interval: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            transactions: TransactionSupport::Supported,
            retry: RetryPolicy::default(),
            engine: EngineConfig::default(),
            job_sweep_interval: Duration::from_secs(300),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key, default: Duration| {
            parse(&lookup, key, default.as_millis() as u64).map(Duration::from_millis)
        };
        let secs = |key, default: Duration| {
            parse(&lookup, key, default.as_secs()).map(Duration::from_secs)
        };

        Ok(Self {
            bind_addr: parse(&lookup, "ITEMFLOW_BIND_ADDR", defaults.bind_addr)?,
            transactions: parse(&lookup, "ITEMFLOW_TRANSACTIONS", defaults.transactions)?,
            retry: RetryPolicy::exponential(
                parse(&lookup, "ITEMFLOW_MAX_RETRIES", defaults.retry.max_retries)?,
                millis("ITEMFLOW_RETRY_BASE_DELAY_MS", defaults.retry.base_delay)?,
                millis("ITEMFLOW_RETRY_MAX_DELAY_MS", defaults.retry.max_delay)?,
            ),
            engine: EngineConfig {
                max_items_per_job: positive(
                    "ITEMFLOW_MAX_ITEMS_PER_JOB",
                    parse(
                        &lookup,
                        "ITEMFLOW_MAX_ITEMS_PER_JOB",
                        defaults.engine.max_items_per_job,
                    )?,
                )?,
                job_ttl: secs("ITEMFLOW_JOB_TTL_SECS", defaults.engine.job_ttl)?,
            },
            job_sweep_interval: Duration::from_secs(positive(
                "ITEMFLOW_JOB_SWEEP_SECS",
                parse(&lookup, "ITEMFLOW_JOB_SWEEP_SECS", defaults.job_sweep_interval.as_secs())?,
            )?),
        })
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn positive<T>(key: &'static str, value: T) -> Result<T, ConfigError>
where
    T: Default + PartialEq + std::fmt::Display,
{
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
