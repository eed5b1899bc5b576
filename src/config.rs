//! Process configuration, loaded entirely from environment variables.
//!
//! Mirrors the `Config` shape the rest of this codebase uses (a
//! `prefer::FromValue` struct populated with documented defaults), simplified
//! here since every field in spec.md §6 is environment-sourced — no
//! file-based discovery is required.

use std::env;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_DSN: &str = "crawld.sqlite3";
const DEFAULT_USER_AGENT: &str = "freshcomics/crawld";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 3;
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 3600;
const DEFAULT_WORK_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_SCHEDULE_INTERVAL_SECS: u64 = 60;
const DEFAULT_FETCH_RETRIES: u32 = 3;
const DEFAULT_FETCH_RETRY_WAIT_SECS: u64 = 2;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// Process configuration as described in spec.md §6.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, prefer::FromValue)]
pub struct Config {
    /// Store connection string (a SQLite file path, or a `postgres://` URL
    /// when built with the `postgres` feature).
    pub dsn: String,
    /// Outbound `User-Agent` header value.
    pub user_agent: String,
    /// Per-attempt HTTP timeout.
    pub fetch_timeout_secs: u64,
    /// Minimum age of the last terminal `CrawlInfo` before a SiteDef is due again.
    pub check_interval_secs: u64,
    /// Worker tick period.
    pub work_poll_interval_secs: u64,
    /// Scheduler tick period.
    pub schedule_interval_secs: u64,
    /// Retry budget per page fetch.
    pub fetch_retries: u32,
    /// Wait between fetch retries.
    pub fetch_retry_wait_secs: u64,
    /// Optional safety bound on pagination iterations per crawl run.
    pub max_iterations: Option<u32>,
}

impl Config {
    /// Load configuration from the process environment, applying the
    /// documented defaults for any variable that is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            dsn: env_or("DSN", DEFAULT_DSN),
            user_agent: env_or("UserAgent", DEFAULT_USER_AGENT),
            fetch_timeout_secs: env_parsed("FetchTimeoutSecs", DEFAULT_FETCH_TIMEOUT_SECS)?,
            check_interval_secs: env_parsed("CheckIntervalSecs", DEFAULT_CHECK_INTERVAL_SECS)?,
            work_poll_interval_secs: env_parsed(
                "WorkPollIntervalSecs",
                DEFAULT_WORK_POLL_INTERVAL_SECS,
            )?,
            schedule_interval_secs: env_parsed(
                "ScheduleIntervalSecs",
                DEFAULT_SCHEDULE_INTERVAL_SECS,
            )?,
            fetch_retries: env_parsed("FetchRetries", DEFAULT_FETCH_RETRIES)?,
            fetch_retry_wait_secs: env_parsed(
                "FetchRetryWaitSecs",
                DEFAULT_FETCH_RETRY_WAIT_SECS,
            )?,
            max_iterations: match env::var("MaxIterations") {
                Ok(v) => Some(v.parse().map_err(|_| ConfigError::InvalidValue {
                    name: "MaxIterations",
                    value: v,
                })?),
                Err(_) => None,
            },
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn work_poll_interval(&self) -> Duration {
        Duration::from_secs(self.work_poll_interval_secs)
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_secs)
    }

    pub fn fetch_retry_wait(&self) -> Duration {
        Duration::from_secs(self.fetch_retry_wait_secs)
    }
}

fn env_or(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(name) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue { name, value: v }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        env::remove_var("DSN");
        env::remove_var("FetchRetries");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.dsn, DEFAULT_DSN);
        assert_eq!(cfg.fetch_retries, DEFAULT_FETCH_RETRIES);
    }

    #[test]
    fn invalid_numeric_value_is_rejected() {
        env::set_var("FetchRetries", "not-a-number");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                name: "FetchRetries",
                ..
            }
        ));
        env::remove_var("FetchRetries");
    }
}
