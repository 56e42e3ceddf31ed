use std::path::Path;

use crate::config::schema::ProcessingConfig;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/processing-config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ProcessingConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ProcessingConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: ProcessingConfig = serde_json::from_value(json_value)?;

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
        .map(|e| format!("{} at {}", e, e.instance_path()))
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &ProcessingConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if !(0.0..=1.0).contains(&config.confidence_threshold) {
        return Err(ConfigError::Validation {
            message: format!(
                "confidence_threshold must be within [0, 1], got {}",
                config.confidence_threshold
            ),
        });
    }

    if config.queue.max_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "queue.max_attempts must be at least 1".to_string(),
        });
    }

    if config.queue.base_delay_secs > config.queue.max_delay_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "queue.base_delay_secs ({}) exceeds queue.max_delay_secs ({})",
                config.queue.base_delay_secs, config.queue.max_delay_secs
            ),
        });
    }

    if config.worker_count == Some(0) {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_config() {
        let config = load_config_from_str(
            r#"{"version": "1.0", "inbox_directory": "/var/docuflow/inbox"}"#,
        )
        .unwrap();
        assert_eq!(
            config.inbox_directory,
            std::path::PathBuf::from("/var/docuflow/inbox")
        );
        assert!((config.confidence_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.queue.max_attempts, 5);
    }

    #[test]
    fn test_load_full_config() {
        let config = load_config_from_str(
            r#"{
                "version": "1.0",
                "inbox_directory": "/inbox",
                "database_path": "/data/docuflow.db",
                "confidence_threshold": 0.9,
                "strict_validation": true,
                "max_adapter_retries": 1,
                "worker_count": 4,
                "queue": {"max_attempts": 3, "base_delay_secs": 5, "max_delay_secs": 60}
            }"#,
        )
        .unwrap();
        assert!((config.confidence_threshold - 0.9).abs() < f64::EPSILON);
        assert!(config.strict_validation);
        assert_eq!(config.worker_count, Some(4));
        assert_eq!(config.queue.max_attempts, 3);
    }

    #[test]
    fn test_missing_inbox_rejected_by_schema() {
        let result = load_config_from_str(r#"{"version": "1.0"}"#);
        assert!(matches!(
            result,
            Err(ConfigError::SchemaValidation { .. })
        ));
    }

    #[test]
    fn test_unknown_key_rejected_by_schema() {
        let result = load_config_from_str(
            r#"{"version": "1.0", "inbox_directory": "/inbox", "threshold": 0.9}"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::SchemaValidation { .. })
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let result =
            load_config_from_str(r#"{"version": "2.0", "inbox_directory": "/inbox"}"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_threshold_out_of_range_rejected_by_schema() {
        let result = load_config_from_str(
            r#"{"version": "1.0", "inbox_directory": "/inbox", "confidence_threshold": 1.5}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_inverted_delays_rejected() {
        let result = load_config_from_str(
            r#"{
                "version": "1.0",
                "inbox_directory": "/inbox",
                "queue": {"base_delay_secs": 120, "max_delay_secs": 60}
            }"#,
        );
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_invalid_json() {
        let result = load_config_from_str("not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }
}
