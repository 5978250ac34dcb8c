//! Agent Loop (perception-decision-action) execution.
//!
//! # Architecture
//!
//! ```text
//! while !terminal:
//!     observation = session.observe()   // CAPTCHA gate on page changes
//!     decision = oracle.decide()        // bounded by a timeout
//!     outcome = executor.execute()      // recoverable failures -> Recovering
//!     memory.flush()                    // after every successful iteration
//! ```
//!
//! # Key Components
//!
//! - [`AgentLoopConfig`]: iteration and error budgets, pacing, exploration limits
//! - [`Action`] / [`AgentDecision`]: validated oracle output
//! - [`parse_decision`]: untrusted oracle text to a decision
//! - [`AgentLoopController`]: the state machine

pub mod config;
pub mod controller;
pub mod history;
pub mod parse;
pub mod prompt;
pub mod recovery;
pub mod types;

pub use config::{AgentLoopConfig, DEFAULT_START_URL};
pub use controller::{
    AgentLoopController, AgentLoopControllerBuilder, AgentLoopResult, AgentLoopStatus,
    FailureReason, LoopFailure, RunOptions,
};
pub use history::HistoryBuffer;
pub use parse::{extract_json_object, parse_decision, DEFAULT_WAIT_MS};
pub use prompt::{format_system_prompt, format_user_message};
pub use recovery::{RecoveryPolicy, RecoveryReason, RecoveryStep};
pub use types::{
    Action, ActionOutcome, AgentDecision, AgentHistoryEntry, DerivedFact, ExecutionReport,
    ExtractKind, RunMode,
};
