//! Agent Loop Controller - the perception-decision-action state machine.
//!
//! ```text
//! Init -> Observing -> Deciding -> Executing -> Observing ...
//!            |            |            |-> Recovering -> Observing
//!            |            |            |-> AwaitingHuman -> Observing
//!            |            |            |-> Succeeded | Failed
//!            |            |-> Recovering (oracle failure, stall)
//!            |-> AwaitingHuman (CAPTCHA gate)
//! ```
//!
//! Each run owns its loop state; nothing in it is shared with other runs.
//! Durable memory is the only state that outlives a run.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use action_primitives::{BrowserSession, Primitive, ScrollDirection};
use memory_center::SharedMemoryStore;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webpilot_core_types::{truncate_chars, Observation, Task};

use super::config::AgentLoopConfig;
use super::history::HistoryBuffer;
use super::recovery::{RecoveryPolicy, RecoveryReason, RecoveryStep};
use super::types::{
    Action, ActionOutcome, AgentDecision, AgentHistoryEntry, DerivedFact, ExecutionReport,
    RunMode,
};
use crate::captcha::{CaptchaDetector, CaptchaVerdict, SignatureCaptchaDetector};
use crate::debug::{DebugSink, NoopDebugSink};
use crate::errors::OracleError;
use crate::executor::{ActionExecutor, DefaultActionExecutor};
use crate::exploration::route_fact;
use crate::handoff::{HandoffReason, HandoffRequest, HandoffResponse, OperatorChannel, UnattendedOperator};
use crate::llm_provider::{OracleRequest, ReasoningOracle};

/// Recovery notes kept for the oracle; older ones are dropped.
const MAX_NOTES: usize = 5;
/// Characters of final page text quoted in the run summary.
const SUMMARY_EXCERPT_CHARS: usize = 200;

/// Why a run ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    SessionLost,
    IterationBudgetExhausted,
    ErrorBudgetExhausted,
    Cancelled,
    OperatorAborted,
    InvalidTask,
    SessionOpenFailed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureReason::SessionLost => "browser session lost",
            FailureReason::IterationBudgetExhausted => "iteration budget exhausted",
            FailureReason::ErrorBudgetExhausted => "error budget exhausted",
            FailureReason::Cancelled => "cancelled",
            FailureReason::OperatorAborted => "aborted by operator",
            FailureReason::InvalidTask => "invalid task",
            FailureReason::SessionOpenFailed => "could not open start page",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopFailure {
    pub reason: FailureReason,
    pub message: String,
}

impl fmt::Display for LoopFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}

/// Status of the agent loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentLoopStatus {
    Succeeded,
    Failed,
}

/// Result of an agent loop execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoopResult {
    pub status: AgentLoopStatus,
    /// Answer carried by `finish`.
    pub final_output: Option<String>,
    pub failure: Option<LoopFailure>,
    /// Entries into `Observing`.
    pub iterations: u32,
    /// Cumulative recoverable errors.
    pub errors: u32,
    pub captcha_handoffs: u32,
    pub history: Vec<AgentHistoryEntry>,
    pub elapsed_ms: u64,
    /// Human-readable run report.
    pub summary: String,
}

impl AgentLoopResult {
    /// Result for a task rejected before the loop started.
    pub fn rejected(reason: FailureReason, message: impl Into<String>) -> Self {
        let failure = LoopFailure {
            reason,
            message: message.into(),
        };
        Self {
            status: AgentLoopStatus::Failed,
            final_output: None,
            summary: format!("Task rejected: {failure}"),
            failure: Some(failure),
            iterations: 0,
            errors: 0,
            captcha_handoffs: 0,
            history: Vec::new(),
            elapsed_ms: 0,
        }
    }

    /// Check if the loop completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self.status, AgentLoopStatus::Succeeded)
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.failure.as_ref().map(|failure| failure.reason)
    }
}

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: RunMode,
    /// Page to open during `Init`. `None` keeps the current page.
    pub open_url: Option<String>,
}

impl RunOptions {
    pub fn task() -> Self {
        Self::default()
    }

    pub fn open(mut self, url: impl Into<String>) -> Self {
        self.open_url = Some(url.into());
        self
    }

    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }
}

enum LoopPhase {
    Init,
    Observing,
    Deciding(Observation),
    Executing {
        observation: Observation,
        decision: AgentDecision,
        retry: bool,
    },
    Recovering {
        reason: RecoveryReason,
        failed: Option<Action>,
        detail: String,
    },
    AwaitingHuman(HandoffReason),
    Succeeded(String),
    Failed(FailureReason, String),
}

impl LoopPhase {
    fn name(&self) -> &'static str {
        match self {
            LoopPhase::Init => "init",
            LoopPhase::Observing => "observing",
            LoopPhase::Deciding(_) => "deciding",
            LoopPhase::Executing { .. } => "executing",
            LoopPhase::Recovering { .. } => "recovering",
            LoopPhase::AwaitingHuman(_) => "awaiting_human",
            LoopPhase::Succeeded(_) => "succeeded",
            LoopPhase::Failed(..) => "failed",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, LoopPhase::Succeeded(_) | LoopPhase::Failed(..))
    }

    fn cancelled() -> Self {
        LoopPhase::Failed(FailureReason::Cancelled, "cancelled by caller".to_string())
    }
}

/// Internal state of one run.
struct LoopState {
    iteration: u32,
    errors: u32,
    failure_streak: u32,
    actions_completed: u32,
    captcha_handoffs: u32,
    history: HistoryBuffer,
    notes: Vec<String>,
    pending_retry: Option<Action>,
    gated_url: Option<String>,
    force_gate: bool,
    last_observation: Option<Observation>,
}

impl LoopState {
    fn new(history_capacity: usize) -> Self {
        Self {
            iteration: 0,
            errors: 0,
            failure_streak: 0,
            actions_completed: 0,
            captcha_handoffs: 0,
            history: HistoryBuffer::new(history_capacity),
            notes: Vec::new(),
            pending_retry: None,
            gated_url: None,
            force_gate: false,
            last_observation: None,
        }
    }

    /// The gate runs on the first observation, on every URL change and
    /// after any action that may have navigated.
    fn needs_gate(&self, url: &str) -> bool {
        self.force_gate || self.gated_url.as_deref() != Some(url)
    }

    fn push_note(&mut self, note: String) {
        if self.notes.len() == MAX_NOTES {
            self.notes.remove(0);
        }
        self.notes.push(note);
    }
}

/// Drives one task at a time through the state machine.
pub struct AgentLoopController {
    config: AgentLoopConfig,
    session: Arc<dyn BrowserSession>,
    oracle: Arc<dyn ReasoningOracle>,
    memory: SharedMemoryStore,
    executor: Arc<dyn ActionExecutor>,
    detector: Arc<dyn CaptchaDetector>,
    operator: Arc<dyn OperatorChannel>,
    debug_sink: Arc<dyn DebugSink>,
    cancel: CancellationToken,
    policy: RecoveryPolicy,
}

impl AgentLoopController {
    pub fn builder(
        config: AgentLoopConfig,
        session: Arc<dyn BrowserSession>,
        oracle: Arc<dyn ReasoningOracle>,
        memory: SharedMemoryStore,
    ) -> AgentLoopControllerBuilder {
        AgentLoopControllerBuilder {
            config,
            session,
            oracle,
            memory,
            executor: None,
            detector: None,
            operator: None,
            debug_sink: None,
            cancel: None,
        }
    }

    pub fn config(&self) -> &AgentLoopConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<dyn BrowserSession> {
        &self.session
    }

    pub fn memory(&self) -> &SharedMemoryStore {
        &self.memory
    }

    /// Token that cancels any run of this controller.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Validate `goal` and run it.
    pub async fn run(&self, goal: &str, options: RunOptions) -> AgentLoopResult {
        match Task::new(goal) {
            Ok(task) => self.run_task(&task, options).await,
            Err(err) => {
                warn!(error = %err, "rejecting task");
                AgentLoopResult::rejected(FailureReason::InvalidTask, err.to_string())
            }
        }
    }

    /// Run the state machine until `Succeeded` or `Failed`.
    pub async fn run_task(&self, task: &Task, options: RunOptions) -> AgentLoopResult {
        let started = Instant::now();
        let mut state = LoopState::new(self.config.history_len());
        let mut phase = LoopPhase::Init;
        info!(task_id = %task.id(), goal = task.goal(), mode = ?options.mode, "starting agent loop");

        loop {
            if self.cancel.is_cancelled() && !phase.is_terminal() {
                phase = LoopPhase::cancelled();
            }
            debug!(state = phase.name(), iteration = state.iteration, "loop state");
            phase = match phase {
                LoopPhase::Init => self.init(&options).await,
                LoopPhase::Observing => self.observe(&mut state).await,
                LoopPhase::Deciding(observation) => {
                    self.decide(task, &options, &mut state, observation).await
                }
                LoopPhase::Executing {
                    observation,
                    decision,
                    retry,
                } => {
                    self.execute(&options, &mut state, observation, decision, retry)
                        .await
                }
                LoopPhase::Recovering {
                    reason,
                    failed,
                    detail,
                } => self.recover(&mut state, reason, failed, detail).await,
                LoopPhase::AwaitingHuman(reason) => self.await_human(&mut state, reason).await,
                LoopPhase::Succeeded(output) => {
                    return self.finish(task, state, Ok(output), started)
                }
                LoopPhase::Failed(reason, message) => {
                    return self.finish(task, state, Err(LoopFailure { reason, message }), started)
                }
            };
        }
    }

    async fn init(&self, options: &RunOptions) -> LoopPhase {
        self.memory.ensure_loaded();
        if let Some(url) = options.open_url.as_deref() {
            info!(url, "opening start page");
            if let Err(err) = self.session.open(url).await {
                let reason = if err.is_fatal() {
                    FailureReason::SessionLost
                } else {
                    FailureReason::SessionOpenFailed
                };
                return LoopPhase::Failed(reason, err.to_string());
            }
        }
        LoopPhase::Observing
    }

    async fn observe(&self, state: &mut LoopState) -> LoopPhase {
        if state.iteration >= self.config.max_iterations {
            return LoopPhase::Failed(
                FailureReason::IterationBudgetExhausted,
                format!("reached the ceiling of {} iterations", self.config.max_iterations),
            );
        }
        let pause = self.config.iteration_pause();
        if state.iteration > 0 && !pause.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => return LoopPhase::cancelled(),
                _ = tokio::time::sleep(pause) => {}
            }
        }
        state.iteration += 1;

        let observation = match self.session.current_observation().await {
            Ok(observation) => observation,
            Err(err) if err.is_fatal() => {
                return LoopPhase::Failed(FailureReason::SessionLost, err.to_string())
            }
            Err(err) => {
                state.pending_retry = None;
                return LoopPhase::Recovering {
                    reason: RecoveryReason::NavigationFailed,
                    failed: None,
                    detail: format!("could not observe page: {err}"),
                };
            }
        };
        debug!(iteration = state.iteration, url = %observation.url, "observed page");
        self.debug_sink.on_observation(state.iteration, &observation);

        if state.needs_gate(&observation.url) {
            state.gated_url = Some(observation.url.clone());
            state.force_gate = false;
            if let CaptchaVerdict::Present(signature) = self.detector.detect(&observation) {
                state.pending_retry = None;
                state.last_observation = Some(observation);
                return LoopPhase::AwaitingHuman(HandoffReason::Captcha(signature));
            }
        }

        state.last_observation = Some(observation.clone());
        match state.pending_retry.take() {
            Some(action) => LoopPhase::Executing {
                observation,
                decision: AgentDecision::new(action),
                retry: true,
            },
            None => LoopPhase::Deciding(observation),
        }
    }

    async fn decide(
        &self,
        task: &Task,
        options: &RunOptions,
        state: &mut LoopState,
        observation: Observation,
    ) -> LoopPhase {
        let fingerprint = observation.fingerprint();
        let request = OracleRequest {
            observation,
            task: task.clone(),
            memory: self.memory.snapshot(),
            history: state.history.to_vec(),
            notes: state.notes.clone(),
            mode: options.mode.clone(),
        };

        let timeout = self.config.oracle_timeout_duration();
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return LoopPhase::cancelled(),
            response = tokio::time::timeout(timeout, self.oracle.decide(&request)) => response,
        };
        let decision = match response {
            Ok(Ok(decision)) => decision,
            Ok(Err(err)) => {
                return LoopPhase::Recovering {
                    reason: RecoveryReason::OracleFailure,
                    failed: None,
                    detail: err.to_string(),
                }
            }
            Err(_) => {
                return LoopPhase::Recovering {
                    reason: RecoveryReason::OracleFailure,
                    failed: None,
                    detail: OracleError::Timeout(self.config.oracle_timeout_ms).to_string(),
                }
            }
        };

        debug!(
            target: "webpilot::rationale",
            iteration = state.iteration,
            action = %decision.action,
            rationale = decision.rationale.as_deref().unwrap_or_default(),
            "oracle decision"
        );
        self.debug_sink.on_decision(state.iteration, &decision);

        let threshold = self.config.repetition_threshold;
        if state
            .history
            .is_repeating(&fingerprint, &decision.action, threshold)
        {
            return LoopPhase::Recovering {
                reason: RecoveryReason::Stalled,
                failed: None,
                detail: format!(
                    "{} chosen {threshold} times in a row without changing the page",
                    decision.action
                ),
            };
        }

        LoopPhase::Executing {
            observation: request.observation,
            decision,
            retry: false,
        }
    }

    async fn execute(
        &self,
        options: &RunOptions,
        state: &mut LoopState,
        observation: Observation,
        decision: AgentDecision,
        retry: bool,
    ) -> LoopPhase {
        let AgentDecision {
            action,
            rationale,
            facts,
        } = decision;
        let action = action.clamp_wait(self.config.max_wait_ms);
        info!(iteration = state.iteration, action = %action, retry, "executing action");

        let report = tokio::select! {
            _ = self.cancel.cancelled() => return LoopPhase::cancelled(),
            report = self.executor.execute(&action, self.session.as_ref()) => report,
        };
        let ExecutionReport {
            observation: after,
            outcome,
            facts: derived,
        } = report;
        self.debug_sink.on_outcome(state.iteration, &outcome);

        state.history.push(
            AgentHistoryEntry::new(state.iteration, &observation, action.clone(), outcome.clone())
                .with_rationale(rationale)
                .as_retry(retry),
        );
        if action.may_change_page() {
            state.force_gate = true;
        }
        if let Some(after) = after {
            state.last_observation = Some(after);
        }

        match outcome {
            ActionOutcome::Completed { extracted } => {
                if let Some(text) = &extracted {
                    debug!(iteration = state.iteration, chars = text.chars().count(), "extracted content");
                }
                state.actions_completed += 1;
                state.failure_streak = 0;
                state.notes.clear();
                self.persist(&options.mode, derived.into_iter().chain(facts));
                LoopPhase::Observing
            }
            ActionOutcome::Finished(result) => {
                self.persist(&options.mode, facts);
                LoopPhase::Succeeded(result)
            }
            ActionOutcome::HumanRequested(reason) => {
                LoopPhase::AwaitingHuman(HandoffReason::OracleRequest(reason))
            }
            ActionOutcome::TargetNotFound(detail) => LoopPhase::Recovering {
                reason: RecoveryReason::TargetNotFound,
                failed: Some(action),
                detail,
            },
            ActionOutcome::NavigationFailed(detail) => LoopPhase::Recovering {
                reason: RecoveryReason::NavigationFailed,
                failed: Some(action),
                detail,
            },
            ActionOutcome::SessionLost(detail) => {
                LoopPhase::Failed(FailureReason::SessionLost, detail)
            }
        }
    }

    async fn recover(
        &self,
        state: &mut LoopState,
        reason: RecoveryReason,
        failed: Option<Action>,
        detail: String,
    ) -> LoopPhase {
        state.errors += 1;
        warn!(
            iteration = state.iteration,
            reason = %reason,
            errors = state.errors,
            max_errors = self.config.max_errors,
            error = %detail,
            "recovering"
        );
        if state.errors > self.config.max_errors {
            return LoopPhase::Failed(
                FailureReason::ErrorBudgetExhausted,
                format!(
                    "{} errors exceeded the budget of {}; last was {reason}: {detail}",
                    state.errors, self.config.max_errors
                ),
            );
        }

        if reason.is_action_error() && failed.is_some() {
            state.failure_streak += 1;
        }
        match self.policy.plan(reason, state.failure_streak, failed.as_ref()) {
            RecoveryStep::Retry(action) => {
                debug!(action = %action, "retrying after fresh observation");
                state.pending_retry = Some(action);
            }
            RecoveryStep::ScrollThenRetry { action, amount } => {
                debug!(action = %action, amount, "scrolling before retry");
                let scroll = Primitive::Scroll {
                    direction: ScrollDirection::Down,
                    amount,
                };
                let outcome = match self.session.perform(&scroll).await {
                    Ok(_) => ActionOutcome::completed(),
                    Err(err) if err.is_fatal() => ActionOutcome::SessionLost(err.to_string()),
                    Err(err) => {
                        debug!(error = %err, "recovery scroll failed");
                        ActionOutcome::TargetNotFound(err.to_string())
                    }
                };
                // Every browser call lands in history, recovery steps included.
                let observation = state
                    .last_observation
                    .clone()
                    .unwrap_or_else(|| Observation::new("", None, ""));
                state.history.push(
                    AgentHistoryEntry::new(
                        state.iteration,
                        &observation,
                        Action::Scroll {
                            direction: ScrollDirection::Down,
                            amount,
                        },
                        outcome.clone(),
                    )
                    .as_retry(true),
                );
                if let ActionOutcome::SessionLost(detail) = outcome {
                    return LoopPhase::Failed(FailureReason::SessionLost, detail);
                }
                state.pending_retry = Some(action);
            }
            RecoveryStep::Replan => {
                let note = match &failed {
                    Some(action) => format!("{action} failed ({reason}): {detail}"),
                    None => format!("{reason}: {detail}"),
                };
                state.push_note(note);
            }
        }
        LoopPhase::Observing
    }

    async fn await_human(&self, state: &mut LoopState, reason: HandoffReason) -> LoopPhase {
        if matches!(reason, HandoffReason::Captcha(_)) {
            state.captcha_handoffs += 1;
        }
        let url = state
            .last_observation
            .as_ref()
            .map(|observation| observation.url.clone())
            .unwrap_or_default();
        let request = HandoffRequest {
            reason,
            url,
            iteration: state.iteration,
        };
        warn!(
            iteration = request.iteration,
            url = %request.url,
            reason = %request.reason,
            "awaiting human"
        );

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return LoopPhase::cancelled(),
            response = self.operator.request_help(&request) => response,
        };
        match response {
            HandoffResponse::Resumed => {
                info!(iteration = request.iteration, "operator resumed");
                state.gated_url = Some(request.url);
                state.force_gate = false;
                LoopPhase::Observing
            }
            HandoffResponse::Aborted => {
                LoopPhase::Failed(FailureReason::OperatorAborted, request.reason.to_string())
            }
        }
    }

    /// Merge facts and flush them in one critical section.
    fn persist(&self, mode: &RunMode, facts: impl IntoIterator<Item = DerivedFact>) {
        let facts: Vec<DerivedFact> = facts.into_iter().map(|fact| route_fact(mode, fact)).collect();
        if facts.is_empty() {
            return;
        }
        let mut tx = self.memory.transaction();
        for fact in &facts {
            tx.merge(&fact.category, &fact.key, fact.value.clone());
        }
        match tx.save() {
            Ok(()) => debug!(facts = facts.len(), "memory updated"),
            Err(err) => warn!(error = %err, "memory flush failed"),
        }
    }

    fn finish(
        &self,
        task: &Task,
        state: LoopState,
        outcome: Result<String, LoopFailure>,
        started: Instant,
    ) -> AgentLoopResult {
        self.memory.ensure_loaded();
        if let Err(err) = self.memory.save() {
            warn!(error = %err, "final memory flush failed");
        }

        let summary = summarize(task, &state, &outcome);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let (status, final_output, failure) = match outcome {
            Ok(output) => {
                info!(iterations = state.iteration, errors = state.errors, elapsed_ms, "task succeeded");
                (AgentLoopStatus::Succeeded, Some(output), None)
            }
            Err(failure) => {
                warn!(
                    iterations = state.iteration,
                    errors = state.errors,
                    reason = %failure.reason,
                    message = %failure.message,
                    "task failed"
                );
                (AgentLoopStatus::Failed, None, Some(failure))
            }
        };

        AgentLoopResult {
            status,
            final_output,
            failure,
            iterations: state.iteration,
            errors: state.errors,
            captcha_handoffs: state.captcha_handoffs,
            history: state.history.to_vec(),
            elapsed_ms,
            summary,
        }
    }
}

fn summarize(task: &Task, state: &LoopState, outcome: &Result<String, LoopFailure>) -> String {
    let mut lines = vec![
        format!("Task: {}", task.goal()),
        format!(
            "Completed {} action(s) with {} error(s) encountered.",
            state.actions_completed, state.errors
        ),
        format!("CAPTCHA handoffs: {}.", state.captcha_handoffs),
        format!("Iterations: {}.", state.iteration),
    ];
    match outcome {
        Ok(output) => lines.push(format!("Result: {output}")),
        Err(failure) => lines.push(format!("Failed: {failure}")),
    }
    if let Some(observation) = &state.last_observation {
        lines.push(format!("Final URL: {}", observation.url));
        lines.push(format!(
            "Final page title: {}",
            observation.title.as_deref().unwrap_or_default()
        ));
        if !observation.visible_text.trim().is_empty() {
            lines.push(format!(
                "Page content (excerpt): {}",
                truncate_chars(observation.visible_text.trim(), SUMMARY_EXCERPT_CHARS)
            ));
        }
    }
    lines.join("\n")
}

pub struct AgentLoopControllerBuilder {
    config: AgentLoopConfig,
    session: Arc<dyn BrowserSession>,
    oracle: Arc<dyn ReasoningOracle>,
    memory: SharedMemoryStore,
    executor: Option<Arc<dyn ActionExecutor>>,
    detector: Option<Arc<dyn CaptchaDetector>>,
    operator: Option<Arc<dyn OperatorChannel>>,
    debug_sink: Option<Arc<dyn DebugSink>>,
    cancel: Option<CancellationToken>,
}

impl AgentLoopControllerBuilder {
    pub fn executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn detector(mut self, detector: Arc<dyn CaptchaDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn operator(mut self, operator: Arc<dyn OperatorChannel>) -> Self {
        self.operator = Some(operator);
        self
    }

    pub fn debug_sink(mut self, sink: Arc<dyn DebugSink>) -> Self {
        self.debug_sink = Some(sink);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> AgentLoopController {
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(DefaultActionExecutor::from_config(&self.config)));
        AgentLoopController {
            policy: RecoveryPolicy::new(self.config.recovery_scroll_px),
            executor,
            detector: self
                .detector
                .unwrap_or_else(|| Arc::new(SignatureCaptchaDetector)),
            operator: self.operator.unwrap_or_else(|| Arc::new(UnattendedOperator)),
            debug_sink: self.debug_sink.unwrap_or_else(|| Arc::new(NoopDebugSink)),
            cancel: self.cancel.unwrap_or_else(CancellationToken::new),
            config: self.config,
            session: self.session,
            oracle: self.oracle,
            memory: self.memory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_are_bounded() {
        let mut state = LoopState::new(4);
        for i in 0..8 {
            state.push_note(format!("note {i}"));
        }
        assert_eq!(state.notes.len(), MAX_NOTES);
        assert_eq!(state.notes[0], "note 3");
    }

    #[test]
    fn gate_tracks_url_changes_and_forced_checks() {
        let mut state = LoopState::new(4);
        assert!(state.needs_gate("https://a.test/"));
        state.gated_url = Some("https://a.test/".into());
        assert!(!state.needs_gate("https://a.test/"));
        assert!(state.needs_gate("https://b.test/"));
        state.force_gate = true;
        assert!(state.needs_gate("https://a.test/"));
    }

    #[test]
    fn rejected_result_reports_reason() {
        let result = AgentLoopResult::rejected(FailureReason::InvalidTask, "task goal cannot be empty");
        assert!(!result.is_success());
        assert_eq!(result.failure_reason(), Some(FailureReason::InvalidTask));
        assert_eq!(result.iterations, 0);
    }
}
