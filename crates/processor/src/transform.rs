//! Transforms applied to completed aggregates
//!
//! A transform turns the merged record into the record published on every
//! output topic. Built-ins are picked by name from a static table.

use fanin_types::Record;
use serde_json::Value;
use std::sync::Arc;

use crate::error::TransformError;

/// Field receiving the profile metadata in [`AttachMetadataTransform`]
pub const METADATA_KEY: &str = "metadatas";

pub trait Transform: Send + Sync {
    /// Registry name
    fn name(&self) -> &'static str;

    fn process(
        &self,
        record: Record,
        consumer_name: &str,
        metadata: Option<&str>,
    ) -> Result<Record, TransformError>;
}

/// Publishes the aggregate unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransform;

impl Transform for IdentityTransform {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn process(&self, record: Record, _consumer_name: &str, _metadata: Option<&str>) -> Result<Record, TransformError> {
        Ok(record)
    }
}

/// Copies the profile metadata into the aggregate
///
/// Metadata that parses as JSON is attached as a value, anything else as a
/// string. Nothing is added when the profile has no metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttachMetadataTransform;

impl Transform for AttachMetadataTransform {
    fn name(&self) -> &'static str {
        "attach-metadata"
    }

    fn process(&self, mut record: Record, _consumer_name: &str, metadata: Option<&str>) -> Result<Record, TransformError> {
        if let Some(raw) = metadata {
            let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            record.insert(METADATA_KEY, value);
        }
        Ok(record)
    }
}

type Constructor = fn() -> Arc<dyn Transform>;

fn identity() -> Arc<dyn Transform> {
    Arc::new(IdentityTransform)
}

fn attach_metadata() -> Arc<dyn Transform> {
    Arc::new(AttachMetadataTransform)
}

static REGISTRY: &[(&str, Constructor)] = &[
    ("identity", identity),
    ("attach-metadata", attach_metadata),
];

/// Names accepted by [`lookup`]
pub fn names() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(name, _)| *name)
}

/// Build the transform registered under `name`
pub fn lookup(name: &str) -> Result<Arc<dyn Transform>, TransformError> {
    REGISTRY
        .iter()
        .find(|(registered, _)| *registered == name)
        .map(|(_, build)| build())
        .ok_or_else(|| TransformError::Unknown(name.to_string()))
}
