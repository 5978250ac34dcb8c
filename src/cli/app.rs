use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{apply_cli_overrides, init_logging};
use crate::config::{load_config, load_local_env_overrides, LoadedConfig};

pub async fn run() -> Result<()> {
    load_local_env_overrides(Path::new(".env"));
    let cli = CliArgs::parse();

    let LoadedConfig { mut config, path } =
        load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    apply_cli_overrides(&mut config, &cli);

    let log_dir = config.debug.enabled.then_some(config.debug.artifacts_dir.as_path());
    let _log_guard = init_logging(&cli.log_level, config.debug.enabled, log_dir)?;

    info!("Starting webpilot v{}", env!("CARGO_PKG_VERSION"));
    if path.exists() {
        info!(path = %path.display(), "loaded configuration");
    } else {
        warn!(path = %path.display(), "config file not found, using defaults");
    }

    let cli_context = CliContext::new(config, path, cli.output);
    match dispatch(&cli, &cli_context).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
