use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::position::{
    DEFAULT_DEADLINE, DEFAULT_MAX_CACHED_AGE, DEFAULT_MIN_ACCURACY_M, DEFAULT_POLL_INTERVAL,
};
use crate::scheduler::{BackoffPolicy, DEFAULT_FLEX, DEFAULT_INTERVAL, DEFAULT_KEY};
use crate::store::DEFAULT_QUEUE_CAPACITY;
use crate::tracking::DEFAULT_MOVEMENT_THRESHOLD_M;
use crate::upload::DEFAULT_TIMEOUT;

pub const DEFAULT_TOKEN_ENV: &str = "FIELDTRACK_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub sink: SinkConfig,
    pub position: PositionConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub dir: PathBuf,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    pub endpoint: String,
    #[serde(default = "default_timeout", deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionConfig {
    pub provider: ProviderConfig,
    #[serde(default = "default_deadline", deserialize_with = "deserialize_duration")]
    pub deadline: Duration,
    #[serde(default = "default_min_accuracy")]
    pub min_accuracy_m: f64,
    #[serde(
        default = "default_max_cached_age",
        deserialize_with = "deserialize_duration"
    )]
    pub max_cached_age: Duration,
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub poll_interval: Duration,
}

fn default_deadline() -> Duration {
    DEFAULT_DEADLINE
}

fn default_min_accuracy() -> f64 {
    DEFAULT_MIN_ACCURACY_M
}

fn default_max_cached_age() -> Duration {
    DEFAULT_MAX_CACHED_AGE
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

/// Which location provider feeds the pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    Fixed {
        coordinates: String,
        #[serde(default = "default_fixed_accuracy")]
        accuracy_m: f64,
    },
    Replay {
        path: PathBuf,
    },
}

fn default_fixed_accuracy() -> f64 {
    10.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_threshold")]
    pub threshold_m: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold_m: default_threshold(),
        }
    }
}

fn default_threshold() -> f64 {
    DEFAULT_MOVEMENT_THRESHOLD_M
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default = "default_interval", deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    #[serde(default = "default_flex", deserialize_with = "deserialize_duration")]
    pub flex: Duration,
    #[serde(default = "default_requires_network")]
    pub requires_network: bool,
    #[serde(default)]
    pub backoff: BackoffPolicy,
    /// `host:port` checked before each run. Defaults to the sink endpoint's host.
    #[serde(default)]
    pub probe: Option<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            key: default_key(),
            interval: default_interval(),
            flex: default_flex(),
            requires_network: default_requires_network(),
            backoff: BackoffPolicy::default(),
            probe: None,
        }
    }
}

fn default_key() -> String {
    DEFAULT_KEY.to_string()
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_flex() -> Duration {
    DEFAULT_FLEX
}

fn default_requires_network() -> bool {
    true
}

/// Deserialize a humantime string such as `"15m"` or `"1h 30m"`.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.queue_capacity == 0 {
            return Err(invalid("storage.queue_capacity must be at least 1"));
        }
        if reqwest::Url::parse(&self.sink.endpoint).is_err() {
            return Err(invalid(format!(
                "sink.endpoint is not a valid URL: {}",
                self.sink.endpoint
            )));
        }
        if self.sink.timeout.is_zero() {
            return Err(invalid("sink.timeout must be positive"));
        }
        if self.sink.token_env.trim().is_empty() {
            return Err(invalid("sink.token_env must not be empty"));
        }
        if self.position.min_accuracy_m.is_nan() || self.position.min_accuracy_m <= 0.0 {
            return Err(invalid("position.min_accuracy_m must be positive"));
        }
        if self.position.deadline.is_zero() {
            return Err(invalid("position.deadline must be positive"));
        }
        if self.position.poll_interval.is_zero() {
            return Err(invalid("position.poll_interval must be positive"));
        }
        if self.dedup.threshold_m.is_nan() || self.dedup.threshold_m < 0.0 {
            return Err(invalid("dedup.threshold_m must not be negative"));
        }
        if self.schedule.key.trim().is_empty() {
            return Err(invalid("schedule.key must not be empty"));
        }
        if self.schedule.interval.is_zero() {
            return Err(invalid("schedule.interval must be positive"));
        }
        if self.schedule.flex > self.schedule.interval {
            return Err(invalid("schedule.flex must not exceed schedule.interval"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
