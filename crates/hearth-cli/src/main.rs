use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;

use hearth_bus::Dispatcher;
use hearth_cli::{
    cli::{Cli, Commands},
    commands, logging,
};
use hearth_core::HearthConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = HearthConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    // Receives bridged log records when `[logging] bridge` is on.
    let log_bus = Dispatcher::from_config("log", &config).into_shared();
    logging::init(cli.level_override(), &config.logging, log_bus.clone())?;
    debug!(policy = ?config.bus.failure_policy, "Configuration loaded");

    match cli.command {
        Commands::Watch { input, json } => commands::watch::execute(&config, &log_bus, input, json)?,
        Commands::Simulate { pipe, json } => {
            commands::simulate::execute(&config, &log_bus, pipe, json).await?
        }
        Commands::Check { snippet, file } => commands::check::execute(&config, snippet, file)?,
    }

    Ok(())
}
