use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::env::CliArgs;
use crate::config::AppConfig;

pub const LOG_FILE: &str = "webpilot.log";

/// Install the global subscriber. `RUST_LOG` wins over `level`; `--debug`
/// forces `debug` and adds a plain-text `webpilot.log` under `log_dir`.
/// Keep the returned guard alive until exit so the file is flushed.
pub fn init_logging(level: &str, debug: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},chromiumoxide=warn,hyper=warn,reqwest=warn")));

    let (file_layer, guard) = match log_dir.filter(|_| debug) {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Command-line flags override file and environment settings.
pub fn apply_cli_overrides(config: &mut AppConfig, cli: &CliArgs) {
    if cli.headless {
        config.browser.headless = true;
    }
    if cli.debug {
        config.debug.enabled = true;
    }
    if let Some(path) = &cli.memory_file {
        config.memory.path = path.clone();
    }
    if let Some(max) = cli.max_iterations {
        config.agent.max_iterations = max.max(1);
    }
}
