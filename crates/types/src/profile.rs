//! Consumer profile
//!
//! A profile describes one deployment of the worker: which topics it joins,
//! where the aggregate goes, and how long a partial join may wait. The
//! configuration service hands profiles out in a flat, comma-separated form
//! ([`RawConsumerProfile`]); [`ConsumerProfile`] is the parsed, validated
//! shape used at runtime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::errors::ProfileError;

/// Join timeout applied when the profile does not set one
pub const DEFAULT_JOIN_TIMEOUT_SECS: u64 = 600;

/// Where partial join state lives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// One poll loop sees every expected topic; state stays in process memory
    #[default]
    Local,
    /// Replicas share state through an external list store
    Shared,
}

/// Profile as stored by the configuration service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawConsumerProfile {
    /// Consumer identity
    pub consumer_name: String,
    /// Input topics (comma-separated)
    pub topics_input: String,
    /// Output topics (comma-separated)
    pub topics_output: String,
    /// Broker endpoints (comma-separated)
    #[serde(alias = "kafka_bootstrap_server")]
    pub bootstrap_servers: String,
    /// Join timeout in seconds
    #[serde(default, alias = "timeout")]
    pub timeout_seconds: Option<u64>,
    /// Opaque blob handed to the transform
    #[serde(default, alias = "metadatas")]
    pub metadata: Option<String>,
    /// Aggregation topology
    #[serde(default)]
    pub mode: Option<AggregationMode>,
    /// Consumer group, defaults to the consumer name
    #[serde(default)]
    pub group_id: Option<String>,
}

/// Parsed consumer profile
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerProfile {
    pub consumer_name: String,
    pub group_id: String,
    pub topics_input: Vec<String>,
    pub topics_output: Vec<String>,
    pub bootstrap_servers: Vec<String>,
    pub join_timeout: Duration,
    pub mode: AggregationMode,
    pub metadata: Option<String>,
}

impl ConsumerProfile {
    /// Set of topics that must all contribute before a join completes
    pub fn expected_topics(&self) -> BTreeSet<String> {
        self.topics_input.iter().cloned().collect()
    }

    /// Broker list in the form rdkafka expects
    pub fn bootstrap_servers_joined(&self) -> String {
        self.bootstrap_servers.join(",")
    }
}

impl TryFrom<RawConsumerProfile> for ConsumerProfile {
    type Error = ProfileError;

    fn try_from(raw: RawConsumerProfile) -> Result<Self, Self::Error> {
        let consumer_name = raw.consumer_name.trim().to_string();
        if consumer_name.is_empty() {
            return Err(ProfileError::Empty("consumer_name"));
        }

        let topics_input = split_list("topics_input", &raw.topics_input)?;
        let topics_output = split_list("topics_output", &raw.topics_output)?;
        let bootstrap_servers = split_list("bootstrap_servers", &raw.bootstrap_servers)?;

        if let Some(topic) = topics_output.iter().find(|t| topics_input.contains(t)) {
            return Err(ProfileError::Loop(topic.clone()));
        }

        // Zero is how the configuration service spells "unset".
        let timeout_secs = match raw.timeout_seconds {
            Some(secs) if secs > 0 => secs,
            _ => DEFAULT_JOIN_TIMEOUT_SECS,
        };

        let group_id = raw
            .group_id
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| consumer_name.clone());

        let metadata = raw.metadata.filter(|m| !m.is_empty());

        Ok(Self {
            consumer_name,
            group_id,
            topics_input,
            topics_output,
            bootstrap_servers,
            join_timeout: Duration::from_secs(timeout_secs),
            mode: raw.mode.unwrap_or_default(),
            metadata,
        })
    }
}

/// Split a comma-separated field, trimming entries and dropping duplicates
fn split_list(field: &'static str, value: &str) -> Result<Vec<String>, ProfileError> {
    if value.trim().is_empty() {
        return Err(ProfileError::Empty(field));
    }

    let mut entries: Vec<String> = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if !entries.iter().any(|e| e == entry) {
            entries.push(entry.to_string());
        }
    }

    if entries.is_empty() {
        return Err(ProfileError::NoEntries {
            field,
            value: value.to_string(),
        });
    }
    Ok(entries)
}
