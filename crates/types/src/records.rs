//! Record types flowing through the join worker
//!
//! Every message on an input topic is a UTF-8 JSON object carrying an `id`
//! field. Records that share an id are folded into one aggregate; the
//! `content` field is merged key by key instead of being replaced.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::errors::{json_kind, RecordError, Result};

/// Field holding the correlation id
pub const ID_KEY: &str = "id";

/// Nested container whose sub-keys are unioned on merge
pub const CONTENT_KEY: &str = "content";

/// Identifier shared by records that belong to the same logical event
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Create a correlation id from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A decoded JSON object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Decode a wire payload
    ///
    /// The payload must be a UTF-8 JSON object. Arrays, scalars and invalid
    /// JSON are rejected so the caller can route the raw bytes to the
    /// dead-letter topic.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| RecordError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    /// Wrap a JSON value, which must be an object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(RecordError::NotAnObject(json_kind(&other))),
        }
    }

    /// Extract the correlation id
    ///
    /// Numeric ids are accepted and rendered with their JSON text.
    pub fn correlation_id(&self) -> Result<CorrelationId> {
        match self.0.get(ID_KEY) {
            Some(Value::String(id)) => Ok(CorrelationId::new(id.as_str())),
            Some(Value::Number(n)) => Ok(CorrelationId::new(n.to_string())),
            Some(Value::Null) | None => Err(RecordError::MissingId),
            Some(other) => Err(RecordError::InvalidId(json_kind(other))),
        }
    }

    /// Get a top-level field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a top-level field, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Number of top-level fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fold a newer record into this one
    ///
    /// Top-level keys are last-write-wins. When both sides hold an object
    /// under `content`, its sub-keys are unioned with last-write-wins per
    /// sub-key; otherwise the newer `content` replaces the older one.
    pub fn merge(&mut self, newer: Record) {
        for (key, value) in newer.0 {
            if key == CONTENT_KEY {
                if let (Some(Value::Object(current)), Value::Object(incoming)) =
                    (self.0.get_mut(CONTENT_KEY), &value)
                {
                    for (sub_key, sub_value) in incoming {
                        current.insert(sub_key.clone(), sub_value.clone());
                    }
                    continue;
                }
            }
            self.0.insert(key, value);
        }
    }

    /// Encode for the wire
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    /// Borrow the underlying map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a JSON value
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
