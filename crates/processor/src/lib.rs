//! Fan-in join processor
//!
//! This crate joins records that share a correlation id across several
//! Kafka topics, applies a transform to the merged aggregate and publishes
//! it, with bounded retries and dead-letter routing for records that keep
//! failing.

pub mod connect;
pub mod delivery;
pub mod error;
pub mod join;
pub mod kafka;
pub mod state;
pub mod transform;

pub use connect::connect_with_retry;

pub use delivery::{
    ControllerSettings, ControllerStats, DeadLetterOutcome, DeadLetterRouter, DeliveryController,
    DeliveryKey, Disposition, RedeliveryTracker,
};

pub use error::{
    FailureKind, ProcessorError, Result as ProcessorResult, StateError, StateResult,
    TransformError,
};

pub use join::{
    Aggregator, CompletedJoin, EvictedJoin, EvictionSweeper, FoldOutcome, JoinState,
    LocalJoinBuffer, SharedJoinStore,
};

pub use kafka::{
    InboundRecord, KafkaError, KafkaRecordSink, KafkaRecordSource, KafkaResult, RecordSink,
    RecordSource,
};

pub use state::{ListStore, MemoryListStore, RedisConfig, RedisListStore};

pub use transform::{AttachMetadataTransform, IdentityTransform, Transform};
