//! Types for the control loop: the action vocabulary, oracle decisions,
//! execution outcomes and history entries.

use std::fmt;

use action_primitives::ScrollDirection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use webpilot_core_types::Observation;

/// What an `extract` action reads from the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractKind {
    #[default]
    Text,
    Links,
}

/// One atomic browser operation chosen by the oracle.
///
/// Immutable once produced; targets stay free-form hints and are resolved
/// against the live page only at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Click {
        target: String,
    },
    /// Type into `target`, or into the first editable field when absent.
    Type {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        text: String,
    },
    Scroll {
        #[serde(default)]
        direction: ScrollDirection,
        amount: u32,
    },
    Navigate {
        url: String,
    },
    Wait {
        duration_ms: u64,
    },
    Extract {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(default)]
        kind: ExtractKind,
    },
    Finish {
        result: String,
    },
    RequestHuman {
        reason: String,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::Type { .. } => "type",
            Action::Scroll { .. } => "scroll",
            Action::Navigate { .. } => "navigate",
            Action::Wait { .. } => "wait",
            Action::Extract { .. } => "extract",
            Action::Finish { .. } => "finish",
            Action::RequestHuman { .. } => "request_human",
        }
    }

    /// Bound a `wait` to `max_ms`; other actions pass through.
    pub fn clamp_wait(self, max_ms: u64) -> Self {
        match self {
            Action::Wait { duration_ms } => Action::Wait {
                duration_ms: duration_ms.min(max_ms),
            },
            other => other,
        }
    }

    /// Whether executing this action may land on a different page.
    pub fn may_change_page(&self) -> bool {
        matches!(self, Action::Click { .. } | Action::Navigate { .. })
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Click { target } => write!(f, "click({target:?})"),
            Action::Type { target: Some(target), text } => {
                write!(f, "type({target:?}, {text:?})")
            }
            Action::Type { target: None, text } => write!(f, "type({text:?})"),
            Action::Scroll { direction, amount } => write!(f, "scroll({direction}, {amount})"),
            Action::Navigate { url } => write!(f, "navigate({url})"),
            Action::Wait { duration_ms } => write!(f, "wait({duration_ms}ms)"),
            Action::Extract { target: Some(target), kind } => {
                write!(f, "extract({kind:?}, {target:?})")
            }
            Action::Extract { target: None, kind } => write!(f, "extract({kind:?})"),
            Action::Finish { result } => write!(f, "finish({result:?})"),
            Action::RequestHuman { reason } => write!(f, "request_human({reason:?})"),
        }
    }
}

/// Memory entry proposed by the oracle or derived by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFact {
    pub category: String,
    pub key: String,
    pub value: Value,
}

impl DerivedFact {
    pub fn new(category: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Self {
            category: category.into(),
            key: key.into(),
            value,
        }
    }
}

/// Validated oracle output for one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDecision {
    pub action: Action,
    /// Free-text explanation, logged only. Never read by the loop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facts: Vec<DerivedFact>,
}

impl AgentDecision {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            rationale: None,
            facts: Vec::new(),
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn with_fact(mut self, fact: DerivedFact) -> Self {
        self.facts.push(fact);
        self
    }
}

/// Whether the loop is working on a user task or exploring a site.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Task,
    Exploration { host: String },
}

/// Result of executing one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ActionOutcome {
    Completed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extracted: Option<String>,
    },
    TargetNotFound(String),
    NavigationFailed(String),
    SessionLost(String),
    Finished(String),
    HumanRequested(String),
}

impl ActionOutcome {
    pub fn completed() -> Self {
        ActionOutcome::Completed { extracted: None }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Completed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionOutcome::Completed { .. } => "completed",
            ActionOutcome::TargetNotFound(_) => "target_not_found",
            ActionOutcome::NavigationFailed(_) => "navigation_failed",
            ActionOutcome::SessionLost(_) => "session_lost",
            ActionOutcome::Finished(_) => "finished",
            ActionOutcome::HumanRequested(_) => "human_requested",
        }
    }
}

/// What the executor hands back to the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    /// Observation taken after the action, when the executor captured one.
    pub observation: Option<Observation>,
    pub outcome: ActionOutcome,
    /// Facts to merge when the outcome is `Completed`.
    pub facts: Vec<DerivedFact>,
}

impl ExecutionReport {
    pub fn new(outcome: ActionOutcome) -> Self {
        Self {
            observation: None,
            outcome,
            facts: Vec::new(),
        }
    }

    pub fn with_facts(mut self, facts: Vec<DerivedFact>) -> Self {
        self.facts = facts;
        self
    }

    pub fn with_observation(mut self, observation: Observation) -> Self {
        self.observation = Some(observation);
        self
    }
}

/// Record of one executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHistoryEntry {
    /// Iteration the action ran in (1-indexed).
    pub iteration: u32,
    /// Page URL the action was chosen for.
    pub url: String,
    /// Fingerprint of the observation the action was chosen for.
    pub fingerprint: String,
    pub action: Action,
    pub outcome: ActionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// Set when the loop re-ran a failed action without asking the oracle.
    #[serde(default)]
    pub retry: bool,
    pub recorded_at: DateTime<Utc>,
}

impl AgentHistoryEntry {
    pub fn new(iteration: u32, observation: &Observation, action: Action, outcome: ActionOutcome) -> Self {
        Self {
            iteration,
            url: observation.url.clone(),
            fingerprint: observation.fingerprint(),
            action,
            outcome,
            rationale: None,
            retry: false,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_rationale(mut self, rationale: Option<String>) -> Self {
        self.rationale = rationale;
        self
    }

    pub fn as_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    /// One-line summary for prompts and logs.
    pub fn summary(&self) -> String {
        match &self.outcome {
            ActionOutcome::Completed { .. } => {
                format!("step {}: {} -> ok", self.iteration, self.action)
            }
            ActionOutcome::TargetNotFound(detail)
            | ActionOutcome::NavigationFailed(detail)
            | ActionOutcome::SessionLost(detail)
            | ActionOutcome::HumanRequested(detail) => format!(
                "step {}: {} -> {} ({detail})",
                self.iteration,
                self.action,
                self.outcome.label()
            ),
            ActionOutcome::Finished(_) => format!("step {}: {} -> finished", self.iteration, self.action),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_serializes_with_tag() {
        let action = Action::Type {
            target: None,
            text: "rust".into(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json, serde_json::json!({"action": "type", "text": "rust"}));
    }

    #[test]
    fn action_display_is_compact() {
        let action = Action::Scroll {
            direction: ScrollDirection::Down,
            amount: 300,
        };
        assert_eq!(action.to_string(), "scroll(down, 300)");
        assert!(Action::Navigate { url: "x".into() }.may_change_page());
        assert!(!Action::Wait { duration_ms: 1 }.may_change_page());
        assert_eq!(
            Action::Wait { duration_ms: 3_600_000 }.clamp_wait(10_000),
            Action::Wait { duration_ms: 10_000 }
        );
        let click = Action::Click { target: "Go".into() };
        assert_eq!(click.clone().clamp_wait(0), click);
    }

    #[test]
    fn history_summary_includes_failure_detail() {
        let observation = Observation::new("https://example.com", None, "");
        let entry = AgentHistoryEntry::new(
            2,
            &observation,
            Action::Click { target: "Login".into() },
            ActionOutcome::TargetNotFound("Login".into()),
        );
        assert_eq!(
            entry.summary(),
            "step 2: click(\"Login\") -> target_not_found (Login)"
        );
    }
}
