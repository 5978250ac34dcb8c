use async_trait::async_trait;
use memory_center::{MemoryEntry, MemoryRecord};
use webpilot_core_types::{Observation, Task};

use crate::agent_loop::{Action, AgentDecision, AgentHistoryEntry, RunMode};
use crate::errors::OracleError;

/// Everything the oracle sees for one decision.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub observation: Observation,
    pub task: Task,
    /// Snapshot of durable memory at decision time.
    pub memory: MemoryRecord,
    /// Recent executions, oldest first.
    pub history: Vec<AgentHistoryEntry>,
    /// Recovery notes accumulated since the last successful action.
    pub notes: Vec<String>,
    pub mode: RunMode,
}

impl OracleRequest {
    /// Facts worth putting in front of the model: the `recent` newest entries
    /// plus every entry about the current host, without duplicates.
    pub fn relevant_facts(&self, recent: usize) -> Vec<MemoryEntry> {
        let mut facts = self.memory.recent(recent);
        if let Some(host) = self.observation.host() {
            for entry in self.memory.facts_for_host(&host) {
                let seen = facts
                    .iter()
                    .any(|known| known.category == entry.category && known.key == entry.key);
                if !seen {
                    facts.push(entry);
                }
            }
        }
        facts
    }
}

/// External reasoning service that picks the next action.
///
/// Implementations are stochastic and untrusted: the loop validates the
/// returned action and imposes its own timeout on every call.
#[async_trait]
pub trait ReasoningOracle: Send + Sync {
    async fn decide(&self, request: &OracleRequest) -> Result<AgentDecision, OracleError>;
}

/// Deterministic oracle used for tests and offline development.
///
/// Waits briefly until three steps are in history, then finishes.
#[derive(Debug, Default, Clone)]
pub struct MockOracle;

#[async_trait]
impl ReasoningOracle for MockOracle {
    async fn decide(&self, request: &OracleRequest) -> Result<AgentDecision, OracleError> {
        let steps = request.history.len();
        if steps >= 3 {
            return Ok(AgentDecision::new(Action::Finish {
                result: format!("Mock task completed after {steps} steps"),
            })
            .with_rationale(format!(
                "After {steps} steps on {}, the task should be complete.",
                request.observation.url
            )));
        }
        Ok(AgentDecision::new(Action::Wait { duration_ms: 500 }).with_rationale(format!(
            "Step {} of task: {}",
            steps + 1,
            request.task.goal()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_loop::ActionOutcome;
    use serde_json::json;

    fn request(history: Vec<AgentHistoryEntry>) -> OracleRequest {
        OracleRequest {
            observation: Observation::new("https://docs.rs/tokio", Some("tokio".into()), ""),
            task: Task::new("read the tokio docs").unwrap(),
            memory: MemoryRecord::new(),
            history,
            notes: Vec::new(),
            mode: RunMode::Task,
        }
    }

    #[tokio::test]
    async fn mock_finishes_after_three_steps() {
        let oracle = MockOracle;
        let first = oracle.decide(&request(Vec::new())).await.unwrap();
        assert!(matches!(first.action, Action::Wait { .. }));

        let observation = Observation::new("https://docs.rs/tokio", None, "");
        let history = (1..=3)
            .map(|i| {
                AgentHistoryEntry::new(
                    i,
                    &observation,
                    Action::Wait { duration_ms: 500 },
                    ActionOutcome::completed(),
                )
            })
            .collect();
        let last = oracle.decide(&request(history)).await.unwrap();
        assert!(matches!(last.action, Action::Finish { .. }));
    }

    #[test]
    fn relevant_facts_include_host_entries_once() {
        let mut req = request(Vec::new());
        req.memory.upsert("website", "docs.rs", json!({"title": "Docs.rs"}));
        req.memory.upsert("general", "lang", json!("rust"));
        req.memory.upsert("website", "crates.io", json!({}));

        let all = req.relevant_facts(5);
        assert_eq!(all.len(), 3);
        assert_eq!(all.iter().filter(|f| f.key == "docs.rs").count(), 1);

        let none_recent = req.relevant_facts(0);
        let keys: Vec<_> = none_recent.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["docs.rs"]);
    }
}
