//! Configuration types for episode-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Disk cache layout
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding completed episode files (default: "./episodes")
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Directory holding partial `.part` files (default: "./episodes/.staging")
    ///
    /// Keep this on the same filesystem as `cache_dir` so that committing a
    /// finished file is a rename rather than a copy.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Check free space before writing when the total size is known (default: true)
    #[serde(default = "default_true")]
    pub check_disk_space: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            staging_dir: default_staging_dir(),
            check_disk_space: true,
        }
    }
}

/// Network transfer behaviour
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// How long `pause` waits for a resume token before declaring the item failed
    /// (default: 10 seconds)
    #[serde(default = "default_pause_timeout", with = "duration_serde")]
    pub pause_timeout: Duration,

    /// How long `cancel` waits for the transfer to wind down before aborting it
    /// (default: 5 seconds)
    #[serde(default = "default_cancel_timeout", with = "duration_serde")]
    pub cancel_timeout: Duration,

    /// TCP connect timeout for the HTTP source (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            pause_timeout: default_pause_timeout(),
            cancel_timeout: default_cancel_timeout(),
            connect_timeout: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Progress notification throttling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Minimum time between two progress events for the same item (default: 250ms)
    #[serde(default = "default_progress_interval", with = "millis_serde")]
    pub min_interval: Duration,

    /// Minimum progress change between two events, as a fraction (default: 0.01)
    #[serde(default = "default_progress_delta")]
    pub min_delta: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            min_interval: default_progress_interval(),
            min_delta: default_progress_delta(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./episode-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for [`EpisodeDownloader`](crate::EpisodeDownloader)
///
/// Every field has a default, so `Config::default()` works out of the box and
/// partial JSON/TOML documents deserialize cleanly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Cache and staging directories
    #[serde(default)]
    pub cache: CacheConfig,

    /// Network transfer settings
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Progress event throttling
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Retry policy for transient network failures within one transfer
    #[serde(default)]
    pub retry: RetryConfig,

    /// Persistence settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            transfer: TransferConfig::default(),
            progress: ProgressConfig::default(),
            retry: RetryConfig::default(),
            persistence: PersistenceConfig::default(),
            event_channel_capacity: default_event_capacity(),
        }
    }
}

impl Config {
    /// Cache directory
    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache.cache_dir
    }

    /// Staging directory
    pub fn staging_dir(&self) -> &PathBuf {
        &self.cache.staging_dir
    }

    /// Check the configuration for values that would make the orchestrator misbehave
    pub fn validate(&self) -> Result<()> {
        if self.cache.cache_dir.as_os_str().is_empty() {
            return Err(config_error("cache_dir must not be empty", "cache_dir"));
        }
        if self.cache.staging_dir.as_os_str().is_empty() {
            return Err(config_error("staging_dir must not be empty", "staging_dir"));
        }
        if self.cache.staging_dir == self.cache.cache_dir {
            return Err(config_error(
                "staging_dir must differ from cache_dir",
                "staging_dir",
            ));
        }
        if self.transfer.pause_timeout.is_zero() {
            return Err(config_error(
                "pause_timeout must be greater than zero",
                "pause_timeout",
            ));
        }
        if self.transfer.cancel_timeout.is_zero() {
            return Err(config_error(
                "cancel_timeout must be greater than zero",
                "cancel_timeout",
            ));
        }
        if !(0.0..=1.0).contains(&self.progress.min_delta) {
            return Err(config_error(
                "min_delta must be between 0.0 and 1.0",
                "min_delta",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(config_error(
                "backoff_multiplier must be at least 1.0",
                "backoff_multiplier",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(config_error(
                "event_channel_capacity must be greater than zero",
                "event_channel_capacity",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./episodes")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./episodes/.staging")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./episode-dl.db")
}

fn default_pause_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_cancel_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("episode-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_progress_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_progress_delta() -> f64 {
    0.01
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_event_capacity() -> usize {
    1000
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond-resolution Duration helper for sub-second settings
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
