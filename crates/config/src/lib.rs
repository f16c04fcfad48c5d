//! Configuration management for the fan-in join worker

use fanin_types::{AggregationMode, ConsumerProfile, ProfileError, RawConsumerProfile};
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

pub mod profiles;

pub use profiles::{ProfileSource, StaticProfiles};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("No profile found for consumer: {0}")]
    ProfileNotFound(String),

    #[error("Invalid profile for consumer {consumer}: {source}")]
    InvalidProfile {
        consumer: String,
        #[source]
        source: ProfileError,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Environment variable prefix, nested keys are separated by `__`
pub const ENV_PREFIX: &str = "FANIN_";

/// Main worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Identity used to look up the consumer profile
    pub consumer_name: String,

    /// Profiles served by the static profile source
    #[serde(default)]
    pub profiles: Vec<RawConsumerProfile>,

    /// Broker client settings
    #[serde(default)]
    pub kafka: KafkaSettings,

    /// Retry and dead-letter settings
    #[serde(default)]
    pub delivery: DeliverySettings,

    /// Shared join store settings
    #[serde(default)]
    pub redis: RedisSettings,

    /// Observability settings
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Number of poll loops to run in this process
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Registered transform applied to completed joins
    #[serde(default = "default_transform")]
    pub transform: String,
}

impl WorkerConfig {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        Self::figment(config_path)
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))
    }

    /// Layered configuration sources, later layers win
    pub fn figment(config_path: Option<PathBuf>) -> Figment {
        let mut figment = Figment::new();

        if let Some(path) = config_path {
            debug!("Loading worker configuration from {}", path.display());
            figment = figment.merge(Yaml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Resolve the profile for `consumer_name` from the configured profiles
    pub fn resolve_profile(&self) -> Result<ConsumerProfile> {
        StaticProfiles::new(self.profiles.clone()).fetch(&self.consumer_name)
    }

    /// Validate configuration against the resolved profile
    pub fn validate(&self, profile: &ConsumerProfile) -> Result<()> {
        if self.workers == 0 {
            return Err(ConfigError::ValidationError(
                "workers must be at least 1".to_string(),
            ));
        }

        if self.kafka.poll_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "kafka.poll_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.kafka.max_poll_records == 0 {
            return Err(ConfigError::ValidationError(
                "kafka.max_poll_records must be greater than 0".to_string(),
            ));
        }

        match profile.mode {
            AggregationMode::Local if self.workers > 1 => {
                return Err(ConfigError::ValidationError(format!(
                    "local aggregation needs every input topic in one poll loop, got workers = {}",
                    self.workers
                )));
            }
            AggregationMode::Shared if self.redis.url.as_deref().map_or(true, str::is_empty) => {
                return Err(ConfigError::ValidationError(
                    "shared aggregation requires redis.url".to_string(),
                ));
            }
            _ => {}
        }

        if let Some(dlq) = &self.delivery.dead_letter_topic {
            if profile.topics_input.iter().any(|t| t == dlq) {
                return Err(ConfigError::ValidationError(format!(
                    "dead-letter topic {} is also an input topic",
                    dlq
                )));
            }
        }

        Ok(())
    }
}

fn default_workers() -> usize {
    1
}

fn default_transform() -> String {
    "identity".to_string()
}

/// Kafka client settings shared by consumer and producer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaSettings {
    /// Where a new consumer group starts (`earliest` / `latest`)
    pub auto_offset_reset: String,
    /// Let the client commit offsets in the background
    pub enable_auto_commit: bool,
    /// Upper bound on one poll
    pub poll_timeout_ms: u64,
    /// Maximum records handed to the controller per poll
    pub max_poll_records: usize,
    /// Producer delivery timeout
    pub message_timeout_ms: u64,
    /// Delay between connection attempts at startup
    pub connect_retry_delay_secs: u64,
    /// Client id prefix, defaults to the consumer name
    pub client_id: Option<String>,
    /// Extra librdkafka properties
    pub extra_config: HashMap<String, String>,
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self {
            auto_offset_reset: "earliest".to_string(),
            enable_auto_commit: false,
            poll_timeout_ms: 1000,
            max_poll_records: 500,
            message_timeout_ms: 10000,
            connect_retry_delay_secs: 5,
            client_id: None,
            extra_config: HashMap::new(),
        }
    }
}

/// Retry ceiling, nack backoff and dead-letter routing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// Consecutive failures of one record before it is dead-lettered
    pub retry_ceiling: u32,
    /// Sleep before seeking back to a failed record
    pub nack_backoff_ms: u64,
    /// Topic receiving records that exhausted their retries
    pub dead_letter_topic: Option<String>,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            retry_ceiling: 3,
            nack_backoff_ms: 1000,
            dead_letter_topic: None,
        }
    }
}

/// Redis settings for the shared join store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    /// Connection URL, required for shared aggregation
    pub url: Option<String>,
    /// Namespace prepended to every correlation id
    pub key_prefix: String,
    /// First reconnect delay
    pub retry_base_delay_ms: u64,
    /// Reconnect delay cap
    pub retry_max_delay_ms: u64,
    /// Attempts per store operation before it fails
    pub max_retries: u32,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: None,
            key_prefix: "fanin:join:".to_string(),
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 5000,
            max_retries: 3,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,

    /// Enable structured JSON logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}
