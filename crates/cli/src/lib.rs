//! Fan-in worker CLI
//!
//! Loads the worker configuration, resolves the consumer profile and wires
//! the broker, store and transform into delivery controllers.

pub mod commands;
pub mod logging;

use figment::providers::Serialized;
use fanin_config::{ConfigError, WorkerConfig};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transform error: {0}")]
    Transform(#[from] joiner::TransformError),

    #[error("Worker error: {0}")]
    Worker(#[from] joiner::ProcessorError),

    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Failed to install logging: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CliResult<T> = std::result::Result<T, CliError>;

/// Load the worker configuration, letting `consumer` override the file and environment
pub fn load_config(path: Option<PathBuf>, consumer: Option<&str>) -> CliResult<WorkerConfig> {
    let mut figment = WorkerConfig::figment(path);
    if let Some(consumer) = consumer {
        figment = figment.merge(Serialized::default("consumer_name", consumer));
    }

    figment
        .extract()
        .map_err(|e| ConfigError::LoadError(e.to_string()).into())
}
