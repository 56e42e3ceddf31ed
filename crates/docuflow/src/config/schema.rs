//! Runtime configuration schema.
//!
//! The config is read at the start of each processing attempt; changes take
//! effect for new attempts only, never retroactively.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::RetryPolicy;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.85;
pub const DEFAULT_MAX_ADAPTER_RETRIES: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub version: String,

    /// Inbox area watched for finalized uploads.
    pub inbox_directory: PathBuf,

    /// SQLite database location; `None` uses the platform default.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Aggregate confidence required for a document to be `processed`.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Strict mode also persists low-priority rule violations as exceptions.
    #[serde(default)]
    pub strict_validation: bool,

    /// Transient-failure retries per adapter within a single attempt.
    #[serde(default = "default_max_adapter_retries")]
    pub max_adapter_retries: u32,

    /// Worker pool size; `None` derives from the CPU count.
    #[serde(default)]
    pub worker_count: Option<usize>,

    #[serde(default)]
    pub queue: QueueSettings,

    /// Endpoint for the remote LLM-assisted extractor (`llm` feature).
    #[serde(default)]
    pub llm_endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

fn default_confidence_threshold() -> f64 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_max_adapter_retries() -> u32 {
    DEFAULT_MAX_ADAPTER_RETRIES
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_secs() -> u64 {
    10
}

fn default_max_delay_secs() -> u64 {
    600
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl ProcessingConfig {
    /// Minimal config rooted at the given inbox, defaults everywhere else.
    pub fn for_inbox<P: Into<PathBuf>>(inbox: P) -> Self {
        Self {
            version: "1.0".to_string(),
            inbox_directory: inbox.into(),
            database_path: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            strict_validation: false,
            max_adapter_retries: DEFAULT_MAX_ADAPTER_RETRIES,
            worker_count: None,
            queue: QueueSettings::default(),
            llm_endpoint: None,
        }
    }

    pub fn effective_worker_count(&self) -> usize {
        self.worker_count
            .unwrap_or_else(|| num_cpus::get().clamp(1, 8))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(self.queue.base_delay_secs),
            max_delay: Duration::from_secs(self.queue.max_delay_secs),
            max_attempts: self.queue.max_attempts,
        }
    }
}

/// Returns the canonical database path: `~/.docuflow/data/docuflow.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".docuflow").join("data").join("docuflow.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_inbox_defaults() {
        let config = ProcessingConfig::for_inbox("/tmp/inbox");
        assert_eq!(config.version, "1.0");
        assert!((config.confidence_threshold - 0.85).abs() < f64::EPSILON);
        assert!(!config.strict_validation);
        assert_eq!(config.max_adapter_retries, 2);
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.queue.base_delay_secs, 10);
        assert_eq!(config.queue.max_delay_secs, 600);
    }

    #[test]
    fn test_effective_worker_count() {
        let mut config = ProcessingConfig::for_inbox("/tmp/inbox");
        assert!(config.effective_worker_count() >= 1);
        config.worker_count = Some(3);
        assert_eq!(config.effective_worker_count(), 3);
    }

    #[test]
    fn test_retry_policy_mapping() {
        let config = ProcessingConfig::for_inbox("/tmp/inbox");
        let policy = config.retry_policy();
        assert_eq!(policy.base_delay, Duration::from_secs(10));
        assert_eq!(policy.max_delay, Duration::from_secs(600));
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn test_default_database_path() {
        let path = default_database_path();
        assert!(path.is_some());
        let path = path.unwrap();
        assert!(path.ends_with("docuflow.db"));
        assert!(path.to_string_lossy().contains(".docuflow"));
    }
}
