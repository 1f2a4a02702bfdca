//! Configuration module for crashspool.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, validation and defaults. The daemon and CLI share one
//! configuration file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for crashspool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub upload: UploadConfig,
    pub inbox: InboxConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// Report store limits and location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the crash report spool.
    pub dir: PathBuf,
    /// Per-owner cap on non-terminal reports; ingestion evicts the owner's
    /// oldest report once reached.
    pub max_reports_per_owner: usize,
    /// Global cap on non-terminal reports across all owners.
    pub max_reports_total: usize,
    /// Number of distinct report groups `purge` keeps.
    pub max_groups_to_keep: usize,
    /// Reports older than this many days are deleted by `purge`
    /// regardless of the group cap.
    pub max_age_days: u64,
    /// Ingestion size limit in bytes; larger sources are rejected.
    pub max_report_bytes: u64,
}

/// Upload endpoint and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Crash collector endpoint URL.
    pub url: String,
    /// Reports are auto-selected until they accumulate this many failed
    /// attempts; beyond it only a forced upload retries them.
    pub max_tries: u32,
    /// Whether the user has consented to uploading crash data.
    pub consent: bool,
    /// Per-request timeout for the upload client, in seconds.
    pub timeout_secs: u64,
}

/// Inbox directory the daemon watches for handed-off crash artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InboxConfig {
    /// Directory watched for incoming report files.
    pub dir: PathBuf,
    /// Owner assigned to inbox files whose names carry no owner prefix.
    pub default_owner: u32,
    /// Seconds between connectivity probes.
    pub probe_interval_secs: u64,
}

/// Prometheus metrics exposure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to run the scrape server.
    pub enabled: bool,
    /// Address to bind, e.g. `127.0.0.1:9301`.
    pub endpoint: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter: trace, debug, info, warn or error.
    pub level: String,
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("crashspool")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: data_dir().join("spool"),
            max_reports_per_owner: 10,
            max_reports_total: 20,
            max_groups_to_keep: 10,
            max_age_days: 30,
            max_report_bytes: 1024 * 1024,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            url: "https://crashes.example.com/submit".to_string(),
            max_tries: 3,
            consent: false,
            timeout_secs: 30,
        }
    }
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            dir: data_dir().join("inbox"),
            default_owner: 0,
            probe_interval_secs: 60,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "127.0.0.1:9301".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"upload.max_tries"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is missing
    /// or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("crashspool")
            .join("config.yaml")
    }

    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.store.max_reports_per_owner == 0 {
            errors.push(ValidationError {
                field: "store.max_reports_per_owner".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.store.max_reports_total < self.store.max_reports_per_owner {
            errors.push(ValidationError {
                field: "store.max_reports_total".into(),
                message: "must be at least store.max_reports_per_owner".into(),
            });
        }
        if self.store.max_report_bytes == 0 {
            errors.push(ValidationError {
                field: "store.max_report_bytes".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.upload.max_tries == 0 {
            errors.push(ValidationError {
                field: "upload.max_tries".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.upload.url.is_empty() {
            errors.push(ValidationError {
                field: "upload.url".into(),
                message: "must not be empty".into(),
            });
        }
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!("must be one of {}", VALID_LOG_LEVELS.join(", ")),
            });
        }

        errors
    }
}

impl StoreConfig {
    /// Maximum report age as a `Duration`.
    #[must_use]
    pub const fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_days * 24 * 60 * 60)
    }
}
