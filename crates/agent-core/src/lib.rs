//! Agent core for webpilot.
//!
//! Runs a natural-language task through a perception-decision-action loop:
//! observe the page, ask the reasoning oracle for one action, execute it,
//! learn from the result. Also hosts exploration mode and the [`Assistant`]
//! facade front ends talk to.

pub mod agent_loop;
pub mod assistant;
pub mod captcha;
pub mod debug;
pub mod errors;
pub mod executor;
pub mod exploration;
pub mod handoff;
pub mod llm_provider;

pub use agent_loop::{
    format_system_prompt, format_user_message, parse_decision, Action, ActionOutcome,
    AgentDecision, AgentHistoryEntry, AgentLoopConfig, AgentLoopController, AgentLoopResult,
    AgentLoopStatus, DerivedFact, ExecutionReport, ExtractKind, FailureReason, LoopFailure,
    RunMode, RunOptions,
};
pub use assistant::Assistant;
pub use captcha::{CaptchaDetector, CaptchaVerdict, SignatureCaptchaDetector};
pub use debug::{DebugSink, NoopDebugSink};
pub use errors::{AgentError, DecisionError, OracleError};
pub use executor::{ActionExecutor, DefaultActionExecutor, WEBSITE_CATEGORY};
pub use exploration::{ExplorationController, ExplorationReport, EXPLORATION_CATEGORY};
pub use handoff::{HandoffReason, HandoffRequest, HandoffResponse, OperatorChannel, UnattendedOperator};
pub use llm_provider::{MockOracle, OracleRequest, ReasoningOracle};
