//! Tracing subscriber setup

use fanin_config::ObservabilityConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{CliError, CliResult};

/// Filter directive used when `RUST_LOG` is not set
pub fn default_directive(config: &ObservabilityConfig, verbose: bool) -> String {
    if verbose {
        "debug".to_string()
    } else {
        config.log_level.clone()
    }
}

/// Install the global subscriber, human-readable or JSON
pub fn init_tracing(config: &ObservabilityConfig, verbose: bool) -> CliResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config, verbose)));

    let json = config.json_logging;
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer().with_target(false)))
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))
}
