use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_core::{AgentLoopController, Assistant, DebugSink};
use anyhow::{Context, Result};
use cdp_adapter::ChromiumSession;
use memory_center::{MemoryStore, SharedMemoryStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::output::OutputFormat;
use crate::artifacts::ArtifactSink;
use crate::config::AppConfig;
use crate::llm::build_oracle;
use crate::operator::{ConsoleInput, ConsoleOperator};

pub struct CliContext {
    config: Arc<AppConfig>,
    config_path: PathBuf,
    output: OutputFormat,
    console: Arc<ConsoleInput>,
}

impl CliContext {
    pub fn new(config: AppConfig, config_path: PathBuf, output: OutputFormat) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            output,
            console: Arc::new(ConsoleInput::stdin()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    pub fn console(&self) -> &ConsoleInput {
        &self.console
    }

    pub fn memory_store(&self) -> SharedMemoryStore {
        Arc::new(MemoryStore::new(self.config.memory.path.clone()))
    }

    /// Wire browser, oracle, memory, console operator and (in debug mode)
    /// the artifact sink into an assistant. Ctrl-C cancels the running task.
    pub fn build_assistant(&self) -> Result<Assistant> {
        let config = self.config();
        let oracle = build_oracle(&config.oracle).context("Failed to configure the oracle")?;
        let session = Arc::new(ChromiumSession::new(config.browser.to_chromium()));

        let cancel = CancellationToken::new();
        spawn_ctrl_c_handler(cancel.clone());

        let mut builder = AgentLoopController::builder(
            config.agent.clone(),
            session,
            oracle,
            self.memory_store(),
        )
        .operator(Arc::new(ConsoleOperator::new(self.console.clone())))
        .cancel_token(cancel);

        if config.debug.enabled {
            match ArtifactSink::new(&config.debug.artifacts_dir) {
                Ok(sink) => {
                    info!(dir = %sink.dir().display(), "saving debug artifacts");
                    let sink: Arc<dyn DebugSink> = Arc::new(sink);
                    builder = builder.debug_sink(sink);
                }
                Err(err) => warn!(
                    dir = %config.debug.artifacts_dir.display(),
                    error = %err,
                    "debug artifacts disabled"
                ),
            }
        }

        info!(
            memory = %config.memory.path.display(),
            headless = config.browser.headless,
            "assistant ready"
        );
        Ok(Assistant::new(builder.build()))
    }
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling current task");
            cancel.cancel();
        }
    });
}
