//! Error types for records and profiles

use thiserror::Error;

/// Result type alias for record operations
pub type Result<T> = std::result::Result<T, RecordError>;

/// Errors raised while decoding or encoding a record
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Payload is not a JSON object (found {0})")]
    NotAnObject(&'static str),

    #[error("Record has no `id` field")]
    MissingId,

    #[error("Record `id` must be a string or a number, found {0}")]
    InvalidId(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while turning a raw profile into a usable one
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Field `{0}` must not be empty")]
    Empty(&'static str),

    #[error("Field `{field}` lists no usable entries: {value:?}")]
    NoEntries { field: &'static str, value: String },

    #[error("Topic {0} is both an input and an output topic")]
    Loop(String),
}

pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
