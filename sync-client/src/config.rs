//! Engine configuration.
//!
//! Configuration can be built in code or loaded from a TOML file:
//!
//! ```toml
//! device_id = "laptop"
//! direction = "bidirectional"
//! conflict_strategy = "latest-wins"
//! batch_size = 50
//! delta_sync = true
//!
//! [filter]
//! include = ["notes/*"]
//! exclude = ["notes/scratch*"]
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

use driftsync_core::{KeyFilter, RetryPolicy};
use driftsync_types::{DeviceId, ResolutionStrategy, SyncDirection};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for [`SyncEngine`](crate::SyncEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Identity of this device (generated at engine start when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<DeviceId>,
    /// Originating user stamped on every entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Which way entries flow.
    #[serde(default)]
    pub direction: SyncDirection,
    /// How colliding writes are settled.
    #[serde(default = "default_conflict_strategy")]
    pub conflict_strategy: ResolutionStrategy,
    /// Entries per push request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Failed attempts after which an entry stops being retried.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base retry delay in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Double the delay after every failure.
    #[serde(default = "default_exponential_backoff")]
    pub exponential_backoff: bool,
    /// Ceiling on the retry delay in milliseconds.
    #[serde(default = "default_max_backoff_delay_ms")]
    pub max_backoff_delay_ms: u64,
    /// Send field-level deltas instead of whole values for updates.
    #[serde(default)]
    pub delta_sync: bool,
    /// Timeout for every remote call in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Auto-sync period in milliseconds (0 disables the timer).
    #[serde(default = "default_auto_sync_interval_ms")]
    pub auto_sync_interval_ms: u64,
    /// Start a background cycle after every tracked change.
    #[serde(default = "default_sync_on_change")]
    pub sync_on_change: bool,
    /// Which keys are tracked.
    #[serde(default)]
    pub filter: KeyFilter,
}

// Default value functions
fn default_conflict_strategy() -> ResolutionStrategy {
    ResolutionStrategy::LatestWins
}

fn default_batch_size() -> usize {
    50
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_exponential_backoff() -> bool {
    true
}

fn default_max_backoff_delay_ms() -> u64 {
    5 * 60 * 1000 // 5 minutes
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_auto_sync_interval_ms() -> u64 {
    30_000
}

fn default_sync_on_change() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            user_id: None,
            direction: SyncDirection::default(),
            conflict_strategy: default_conflict_strategy(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            exponential_backoff: default_exponential_backoff(),
            max_backoff_delay_ms: default_max_backoff_delay_ms(),
            delta_sync: false,
            timeout_ms: default_timeout_ms(),
            auto_sync_interval_ms: default_auto_sync_interval_ms(),
            sync_on_change: default_sync_on_change(),
            filter: KeyFilter::default(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be at least 1".into()));
        }
        if let Some(device_id) = &self.device_id {
            if device_id.as_str().is_empty() {
                return Err(ConfigError::Invalid("device_id must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Set the device identity.
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(DeviceId::new(device_id));
        self
    }

    /// Set the originating user.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the sync direction.
    pub fn with_direction(mut self, direction: SyncDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Set the conflict strategy.
    pub fn with_strategy(mut self, strategy: ResolutionStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    /// Set the push batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the retry limit.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = duration_millis(delay);
        self
    }

    /// Set the retry delay ceiling.
    pub fn with_max_backoff_delay(mut self, delay: Duration) -> Self {
        self.max_backoff_delay_ms = duration_millis(delay);
        self
    }

    /// Turn exponential backoff on or off.
    pub fn with_exponential_backoff(mut self, enabled: bool) -> Self {
        self.exponential_backoff = enabled;
        self
    }

    /// Turn delta sync on or off.
    pub fn with_delta_sync(mut self, enabled: bool) -> Self {
        self.delta_sync = enabled;
        self
    }

    /// Set the remote call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_millis(timeout);
        self
    }

    /// Set the auto-sync period (`Duration::ZERO` disables the timer).
    pub fn with_auto_sync_interval(mut self, interval: Duration) -> Self {
        self.auto_sync_interval_ms = duration_millis(interval);
        self
    }

    /// Turn sync-on-change on or off.
    pub fn with_sync_on_change(mut self, enabled: bool) -> Self {
        self.sync_on_change = enabled;
        self
    }

    /// Set the key filter.
    pub fn with_filter(mut self, filter: KeyFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Remote call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Auto-sync period, `None` when the timer is disabled.
    pub fn auto_sync_interval(&self) -> Option<Duration> {
        (self.auto_sync_interval_ms > 0).then(|| Duration::from_millis(self.auto_sync_interval_ms))
    }

    /// Retry rules for the push phase.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::uncapped(self.max_retries, Duration::from_millis(self.retry_delay_ms))
            .with_exponential(self.exponential_backoff)
            .with_max_delay(Duration::from_millis(self.max_backoff_delay_ms))
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A setting is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = SyncConfig::default();
        config.validate().unwrap();
        assert_eq!(config.direction, SyncDirection::Bidirectional);
        assert_eq!(config.conflict_strategy, ResolutionStrategy::LatestWins);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.auto_sync_interval(), Some(Duration::from_secs(30)));
        assert!(config.sync_on_change);
        assert!(!config.delta_sync);
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
device_id = "laptop"
direction = "push"
conflict_strategy = "merge"
batch_size = 10
delta_sync = true
auto_sync_interval_ms = 0

[filter]
include = ["notes/*"]
exclude = ["notes/tmp*"]
"#;

        let config: SyncConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.device_id, Some(DeviceId::new("laptop")));
        assert_eq!(config.direction, SyncDirection::Push);
        assert_eq!(config.conflict_strategy, ResolutionStrategy::Merge);
        assert_eq!(config.batch_size, 10);
        assert!(config.delta_sync);
        assert_eq!(config.auto_sync_interval(), None);
        assert!(config.filter.allows("notes/a"));
        assert!(!config.filter.allows("notes/tmp1"));
    }

    #[test]
    fn config_with_invalid_filter_pattern_fails_to_parse() {
        let toml = "[filter]\ninclude = [\"notes/[\"]\n";
        let err = toml::from_str::<SyncConfig>(toml).unwrap_err();
        assert!(err.to_string().contains("invalid key pattern"));
    }

    #[test]
    fn config_missing_fields_use_defaults() {
        let config: SyncConfig = toml::from_str("").unwrap();
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn config_builder_pattern() {
        let config = SyncConfig::default()
            .with_device_id("phone")
            .with_strategy(ResolutionStrategy::RemoteWins)
            .with_batch_size(2)
            .with_timeout(Duration::from_millis(1500))
            .with_sync_on_change(false);

        assert_eq!(config.device_id, Some(DeviceId::new("phone")));
        assert_eq!(config.conflict_strategy, ResolutionStrategy::RemoteWins);
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.timeout_ms, 1500);
        assert!(!config.sync_on_change);
    }

    #[test]
    fn validate_rejects_zero_batch_and_timeout() {
        let zero_batch = SyncConfig::default().with_batch_size(0);
        assert!(matches!(zero_batch.validate(), Err(ConfigError::Invalid(_))));

        let zero_timeout = SyncConfig::default().with_timeout(Duration::ZERO);
        assert!(matches!(zero_timeout.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn retry_policy_follows_settings() {
        let config = SyncConfig::default()
            .with_retry_delay(Duration::from_millis(100))
            .with_max_backoff_delay(Duration::from_millis(250));
        let policy = config.retry_policy();

        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(250));
    }

    #[test]
    fn from_file_reads_and_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch_size = 7").unwrap();
        let config = SyncConfig::from_file(file.path()).unwrap();
        assert_eq!(config.batch_size, 7);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "batch_size = 0").unwrap();
        assert!(matches!(
            SyncConfig::from_file(bad.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn from_file_reports_read_and_parse_errors() {
        let missing = SyncConfig::from_file(Path::new("/nonexistent/driftsync.toml"));
        assert!(matches!(missing, Err(ConfigError::ReadError { .. })));

        let mut garbage = tempfile::NamedTempFile::new().unwrap();
        writeln!(garbage, "batch_size = \"many\"").unwrap();
        assert!(matches!(
            SyncConfig::from_file(garbage.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }
}
