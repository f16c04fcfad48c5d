//! Consumer profile sources
//!
//! Profiles are owned by an external configuration service and looked up by
//! consumer name once at startup.

use fanin_types::{ConsumerProfile, RawConsumerProfile};
use std::collections::HashMap;

use crate::{ConfigError, Result};

/// Lookup of consumer profiles by consumer name
pub trait ProfileSource: Send + Sync {
    /// Fetch and parse the profile for `consumer_name`
    fn fetch(&self, consumer_name: &str) -> Result<ConsumerProfile>;
}

/// Profiles held in memory, typically loaded with the worker configuration
#[derive(Debug, Clone, Default)]
pub struct StaticProfiles {
    profiles: HashMap<String, RawConsumerProfile>,
}

impl StaticProfiles {
    /// Index raw profiles by consumer name; later duplicates win
    pub fn new(profiles: impl IntoIterator<Item = RawConsumerProfile>) -> Self {
        let profiles = profiles
            .into_iter()
            .map(|p| (p.consumer_name.trim().to_string(), p))
            .collect();
        Self { profiles }
    }

    /// Number of known profiles
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether no profile is known
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl ProfileSource for StaticProfiles {
    fn fetch(&self, consumer_name: &str) -> Result<ConsumerProfile> {
        let raw = self
            .profiles
            .get(consumer_name.trim())
            .cloned()
            .ok_or_else(|| ConfigError::ProfileNotFound(consumer_name.to_string()))?;

        ConsumerProfile::try_from(raw).map_err(|source| ConfigError::InvalidProfile {
            consumer: consumer_name.to_string(),
            source,
        })
    }
}
