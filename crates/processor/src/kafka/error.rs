//! Kafka-specific error types.
//!
//! Errors raised by the consumer and producer wrappers. Each variant keeps
//! the topic/partition/offset context so failures can be logged and routed
//! without re-deriving where they came from.

use thiserror::Error;

/// Result type alias for Kafka operations.
pub type Result<T> = std::result::Result<T, KafkaError>;

/// Error type for Kafka operations.
#[derive(Error, Debug)]
pub enum KafkaError {
    /// Error establishing a connection to the brokers.
    #[error("Failed to connect to Kafka broker {broker}: {message}")]
    Connection {
        /// Error message describing the connection failure.
        message: String,
        /// Broker list that failed to connect.
        broker: String,
    },

    /// Error during message consumption.
    #[error("Failed to consume message from topic {topic}: {message}")]
    Consumption {
        message: String,
        topic: String,
        partition: Option<i32>,
        offset: Option<i64>,
    },

    /// Error during message production.
    #[error("Failed to produce message to topic {topic}: {message}")]
    Production {
        message: String,
        topic: String,
        partition: Option<i32>,
    },

    /// Error committing offsets.
    #[error("Failed to commit offset {offset} for {topic}/{partition}: {message}")]
    OffsetCommit {
        message: String,
        topic: String,
        partition: i32,
        offset: i64,
    },

    /// Error rewinding a partition.
    #[error("Failed to seek {topic}/{partition} to offset {offset}: {message}")]
    Seek {
        message: String,
        topic: String,
        partition: i32,
        offset: i64,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
        field: Option<String>,
    },

    /// Error from the underlying rdkafka library.
    #[error("Kafka client error: {message}")]
    KafkaClient { message: String },
}

impl KafkaError {
    /// Create a connection error.
    pub fn connection(message: impl Into<String>, broker: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            broker: broker.into(),
        }
    }

    /// Create a consumption error.
    pub fn consumption(
        message: impl Into<String>,
        topic: impl Into<String>,
        partition: Option<i32>,
        offset: Option<i64>,
    ) -> Self {
        Self::Consumption {
            message: message.into(),
            topic: topic.into(),
            partition,
            offset,
        }
    }

    /// Create a production error.
    pub fn production(
        message: impl Into<String>,
        topic: impl Into<String>,
        partition: Option<i32>,
    ) -> Self {
        Self::Production {
            message: message.into(),
            topic: topic.into(),
            partition,
        }
    }

    /// Create an offset commit error.
    pub fn offset_commit(
        message: impl Into<String>,
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
    ) -> Self {
        Self::OffsetCommit {
            message: message.into(),
            topic: topic.into(),
            partition,
            offset,
        }
    }

    /// Create a seek error.
    pub fn seek(
        message: impl Into<String>,
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
    ) -> Self {
        Self::Seek {
            message: message.into(),
            topic: topic.into(),
            partition,
            offset,
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>, field: Option<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
            field,
        }
    }

    /// Whether the error came from publishing a record.
    pub fn is_production(&self) -> bool {
        matches!(self, KafkaError::Production { .. })
    }
}

impl From<rdkafka::error::KafkaError> for KafkaError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        use rdkafka::error::KafkaError as RdKafkaError;

        match err {
            RdKafkaError::ClientCreation(msg) => KafkaError::connection(msg, "unknown"),
            RdKafkaError::MessageProduction(code) => KafkaError::production(
                format!("Message production failed with code: {:?}", code),
                "unknown",
                None,
            ),
            RdKafkaError::MessageConsumption(code) => KafkaError::consumption(
                format!("Message consumption failed with code: {:?}", code),
                "unknown",
                None,
                None,
            ),
            other => KafkaError::KafkaClient {
                message: other.to_string(),
            },
        }
    }
}
