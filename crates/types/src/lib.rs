//! Core types for the fan-in join worker
//!
//! This crate holds the data model shared by every other crate: the JSON
//! record flowing through the broker, the correlation id that groups
//! records across topics, and the consumer profile describing one
//! deployment.

pub mod errors;
pub mod profile;
pub mod records;

pub use errors::{ProfileError, RecordError, Result};
pub use profile::{AggregationMode, ConsumerProfile, RawConsumerProfile, DEFAULT_JOIN_TIMEOUT_SECS};
pub use records::{CorrelationId, Record, CONTENT_KEY, ID_KEY};
