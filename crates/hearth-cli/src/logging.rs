//! Subscriber setup.
//!
//! Log output always goes to stderr; stdout may carry the encoded event
//! stream. With `[logging] bridge = true` every log line that passes the
//! filter is also fired as a `LogRecord` event on the log bus.

use anyhow::Result;
use hearth_bus::{LogBridge, SharedDispatcher};
use hearth_core::LoggingConfig;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Filter from, in order: the command-line level, `RUST_LOG`, the config file.
pub fn env_filter(level: Option<LevelFilter>, config: &LoggingConfig) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level)),
    }
}

pub fn init(
    level: Option<LevelFilter>,
    config: &LoggingConfig,
    log_bus: SharedDispatcher,
) -> Result<()> {
    let bridge = config.bridge.then(|| LogBridge::new(log_bus));

    tracing_subscriber::registry()
        .with(env_filter(level, config))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(bridge)
        .try_init()?;

    Ok(())
}
