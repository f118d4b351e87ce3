use std::path::Path;

use crate::config::schema::{Config, MAX_WINDOW_SECS};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be greater than 0".to_string(),
        });
    }

    if config.stale_timeout_secs > MAX_WINDOW_SECS {
        return Err(ConfigError::Validation {
            message: format!(
                "stale_timeout_secs must not exceed {} seconds",
                MAX_WINDOW_SECS
            ),
        });
    }

    if config.retention_days > MAX_WINDOW_SECS / 86_400 {
        return Err(ConfigError::Validation {
            message: format!(
                "retention_days must not exceed {} days",
                MAX_WINDOW_SECS / 86_400
            ),
        });
    }

    // A job must be allowed to run at least as long as its retries take.
    let retry_window_ms = u64::from(config.max_attempts.saturating_sub(1))
        .saturating_mul(config.retry_delay_ms);
    if retry_window_ms / 1000 >= config.stale_timeout_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "stale_timeout_secs ({}) is shorter than the processor retry window ({} ms)",
                config.stale_timeout_secs, retry_window_ms
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DedupPolicy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_minimal_config() {
        let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_full_config() {
        let config_json = r#"
        {
            "version": "1.0",
            "database_path": ":memory:",
            "artifact_root": "/var/lib/docjob/results",
            "worker_count": 4,
            "poll_interval_ms": 50,
            "stale_timeout_secs": 3600,
            "retention_days": 7,
            "scan_interval_secs": 60,
            "max_attempts": 5,
            "retry_delay_ms": 100,
            "store_retries": 2,
            "dedup": "record",
            "event_capacity": 64,
            "logging": { "filter": "docjob=debug", "json": true }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.database_path, ":memory:");
        assert_eq!(config.artifact_root.as_deref(), Some("/var/lib/docjob/results"));
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.stale_timeout(), chrono::Duration::hours(1));
        assert_eq!(config.retention(), chrono::Duration::days(7));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.dedup, DedupPolicy::Record);
        assert!(config.logging.json);
    }

    #[test]
    fn test_schema_rejects_unknown_key() {
        let result = load_config_from_str(r#"{ "version": "1.0", "workers": 4 }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_schema_rejects_bad_dedup_policy() {
        let result = load_config_from_str(r#"{ "version": "1.0", "dedup": "merge" }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_schema_rejects_zero_workers() {
        let result = load_config_from_str(r#"{ "version": "1.0", "worker_count": 0 }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_unsupported_version() {
        let result = load_config_from_str(r#"{ "version": "2.0" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_stale_timeout_shorter_than_retries() {
        let result = load_config_from_str(
            r#"{ "version": "1.0", "stale_timeout_secs": 5, "max_attempts": 3, "retry_delay_ms": 5000 }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_invalid_json() {
        let result = load_config_from_str("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "version": "1.0", "worker_count": 2 }}"#).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.worker_count, 2);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/docjob.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
