//! Command surface for front ends: run a task, explore a site, inspect or
//! clear memory, shut down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use memory_center::MemoryRecord;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent_loop::{AgentLoopController, AgentLoopResult, FailureReason, RunOptions};
use crate::errors::AgentError;
use crate::exploration::{ExplorationController, ExplorationReport};

/// One browser session, one memory store, tasks run one after another.
pub struct Assistant {
    controller: Arc<AgentLoopController>,
    explorer: ExplorationController,
    /// Open the start page before the next task: true initially and after
    /// a task that succeeded.
    open_start_page: AtomicBool,
}

impl Assistant {
    pub fn new(controller: AgentLoopController) -> Self {
        let controller = Arc::new(controller);
        controller.memory().ensure_loaded();
        Self {
            explorer: ExplorationController::new(Arc::clone(&controller)),
            controller,
            open_start_page: AtomicBool::new(true),
        }
    }

    pub fn controller(&self) -> &AgentLoopController {
        &self.controller
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.controller.cancel_token()
    }

    pub async fn run_task(&self, goal: &str) -> AgentLoopResult {
        let mut options = RunOptions::task();
        if self.open_start_page.load(Ordering::SeqCst) {
            options = options.open(self.controller.config().start_url.clone());
        }
        let result = self.controller.run(goal, options).await;
        if result.failure_reason() != Some(FailureReason::InvalidTask) {
            self.open_start_page.store(result.is_success(), Ordering::SeqCst);
        }
        result
    }

    pub async fn explore(&self, url: &str) -> Result<ExplorationReport, AgentError> {
        let report = self.explorer.explore(url).await?;
        // Exploration leaves the browser on the explored site.
        self.open_start_page.store(false, Ordering::SeqCst);
        Ok(report)
    }

    /// Clear one category, or everything when `None`. Returns how many
    /// facts were removed; the result is persisted before returning.
    pub fn clear_memory(&self, category: Option<&str>) -> Result<usize, AgentError> {
        let removed = self.controller.memory().clear(category)?;
        info!(category = category.unwrap_or("all"), removed, "memory cleared");
        Ok(removed)
    }

    pub fn get_memory_snapshot(&self) -> MemoryRecord {
        self.controller.memory().snapshot()
    }

    /// Flush memory and close the browser.
    pub async fn shutdown(&self) -> Result<(), AgentError> {
        if let Err(err) = self.controller.memory().save() {
            warn!(error = %err, "memory flush on shutdown failed");
        }
        self.controller.session().close().await?;
        info!("assistant shut down");
        Ok(())
    }
}
