//! Structured logging setup.
//!
//! Installs a global `tracing` subscriber. `RUST_LOG` takes precedence over
//! the configured level so a single run can be made more verbose without
//! editing the config file.

use anyhow::{bail, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize the global subscriber. Call once, before anything logs.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| anyhow::anyhow!("invalid logging.level '{}': {}", config.level, e))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
        "pretty" => registry.with(fmt::layer().pretty()).try_init(),
        "compact" => registry
            .with(fmt::layer().compact().with_target(false))
            .try_init(),
        other => bail!("Unknown logging format: '{}'", other),
    };

    result.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}
