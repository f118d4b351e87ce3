use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::default_database_path;

/// Upper bound for time windows (100 years), so `now - window` stays representable.
pub const MAX_WINDOW_SECS: u64 = 100 * 365 * 86_400;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_database_path_string")]
    pub database_path: String,
    #[serde(default)]
    pub artifact_root: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_stale_timeout_secs")]
    pub stale_timeout_secs: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_store_retries")]
    pub store_retries: u32,
    #[serde(default)]
    pub dedup: DedupPolicy,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// What `complete` does with a result hash seen before.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DedupPolicy {
    /// Reuse the earlier artifact and link the new job to its producer.
    #[default]
    Link,
    /// Only record the first producer of each hash.
    Record,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_database_path_string() -> String {
    default_database_path()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| ":memory:".to_string())
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_stale_timeout_secs() -> u64 {
    30 * 60
}

fn default_retention_days() -> u64 {
    30
}

fn default_scan_interval_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_store_retries() -> u32 {
    3
}

fn default_event_capacity() -> usize {
    256
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: default_database_path_string(),
            artifact_root: None,
            worker_count: default_worker_count(),
            poll_interval_ms: default_poll_interval_ms(),
            stale_timeout_secs: default_stale_timeout_secs(),
            retention_days: default_retention_days(),
            scan_interval_secs: default_scan_interval_secs(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            store_retries: default_store_retries(),
            dedup: DedupPolicy::default(),
            event_capacity: default_event_capacity(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn stale_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_timeout_secs.min(MAX_WINDOW_SECS) as i64)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days.min(MAX_WINDOW_SECS / 86_400) as i64)
    }

    /// Oldest producer a new job may link to: one scan interval short of
    /// the retention window, never negative.
    pub fn link_max_age(&self) -> chrono::Duration {
        let scan = chrono::Duration::seconds(self.scan_interval_secs.min(MAX_WINDOW_SECS) as i64);
        (self.retention() - scan).max(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.version, "1.0");
        assert!(config.worker_count > 0);
        assert_eq!(config.stale_timeout(), chrono::Duration::minutes(30));
        assert_eq!(config.retention(), chrono::Duration::days(30));
        assert_eq!(config.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.dedup, DedupPolicy::Link);
        assert_eq!(config.logging.filter, "info");
        assert_eq!(
            config.link_max_age(),
            chrono::Duration::days(30) - chrono::Duration::minutes(5)
        );
    }

    #[test]
    fn test_link_max_age_never_negative() {
        let config = Config {
            retention_days: 0,
            ..Config::default()
        };
        assert_eq!(config.link_max_age(), chrono::Duration::zero());
    }

    #[test]
    fn test_dedup_policy_serde() {
        assert_eq!(
            serde_json::from_str::<DedupPolicy>("\"record\"").unwrap(),
            DedupPolicy::Record
        );
        assert_eq!(serde_json::to_string(&DedupPolicy::Link).unwrap(), "\"link\"");
    }
}
