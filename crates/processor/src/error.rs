//! Error types for the join processor
//!
//! Every per-record failure ends up as a [`ProcessorError`], which the
//! delivery controller classifies with [`ProcessorError::kind`] before
//! deciding between a nack and a dead-letter publish.

use fanin_types::RecordError;
use std::fmt;
use thiserror::Error;

use crate::kafka::KafkaError;

/// Main processor error type
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// Payload could not be decoded into a record with an id
    #[error("decode error: {0}")]
    Decode(#[from] RecordError),

    /// Record arrived on a topic the profile does not join
    #[error("unexpected topic {topic}, expected one of {expected:?}")]
    UnexpectedTopic { topic: String, expected: Vec<String> },

    /// Shared join store errors
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Transform errors
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),

    /// Kafka-related errors
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ProcessorError {
    /// Failure class used in logs and dead-letter headers
    pub fn kind(&self) -> FailureKind {
        match self {
            ProcessorError::Decode(_) | ProcessorError::UnexpectedTopic { .. } => {
                FailureKind::Decode
            }
            ProcessorError::State(_) => FailureKind::JoinStore,
            ProcessorError::Transform(_) => FailureKind::Transform,
            ProcessorError::Kafka(e) if e.is_production() => FailureKind::Publish,
            ProcessorError::Kafka(_) | ProcessorError::Configuration(_) => FailureKind::Transport,
        }
    }
}

/// Coarse classification of a processing failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Decode,
    JoinStore,
    Transform,
    Publish,
    Transport,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Decode => "decode",
            FailureKind::JoinStore => "join-store",
            FailureKind::Transform => "transform",
            FailureKind::Publish => "publish",
            FailureKind::Transport => "transport",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join store operation errors
#[derive(Error, Debug)]
pub enum StateError {
    /// State serialization failed
    #[error("state serialization failed for key '{key}': {reason}")]
    SerializationFailed { key: String, reason: String },

    /// State deserialization failed
    #[error("state deserialization failed for key '{key}': {reason}")]
    DeserializationFailed { key: String, reason: String },

    /// State backend storage error
    #[error("storage error in {backend_type}: {details}")]
    StorageError {
        backend_type: String,
        details: String,
    },
}

/// Errors raised by a transform
#[derive(Error, Debug)]
pub enum TransformError {
    /// The transform rejected the aggregate
    #[error("transform {transform} failed: {reason}")]
    Failed { transform: String, reason: String },

    /// No transform is registered under the name
    #[error("unknown transform: {0}")]
    Unknown(String),
}

/// Result type alias for processor operations
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Result type alias for state operations
pub type StateResult<T> = std::result::Result<T, StateError>;
