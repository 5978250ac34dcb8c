use action_primitives::ActionError;
use memory_center::MemoryError;
use thiserror::Error;
use webpilot_core_types::CoreError;

/// Errors emitted by the agent-core crate outside the control loop itself.
///
/// Loop failures are reported through [`crate::AgentLoopResult`] rather than
/// as errors; these cover the facade and exploration entry points.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Raised when a request is malformed or missing required fields.
    #[error("invalid agent request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Task(#[from] CoreError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("browser error: {0}")]
    Browser(#[from] ActionError),
}

impl AgentError {
    /// Helper for wrapping static string errors.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

/// Why an oracle response could not be turned into a decision.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecisionError {
    #[error("oracle returned an empty response")]
    Empty,

    #[error("no JSON object found in oracle response")]
    NoJson,

    #[error("invalid decision JSON: {0}")]
    InvalidJson(String),

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("action '{action}' is missing field '{field}'")]
    MissingField { action: String, field: &'static str },

    #[error("action '{action}' has invalid field '{field}': {reason}")]
    InvalidField {
        action: String,
        field: &'static str,
        reason: String,
    },
}

impl DecisionError {
    pub(crate) fn missing(action: &str, field: &'static str) -> Self {
        Self::MissingField {
            action: action.to_string(),
            field,
        }
    }

    pub(crate) fn invalid(action: &str, field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            action: action.to_string(),
            field,
            reason: reason.into(),
        }
    }
}

/// Failure of a single oracle call. Every variant routes to `OracleFailure`
/// recovery; none of them is fatal to the loop.
#[derive(Debug, Error, Clone)]
pub enum OracleError {
    #[error("oracle timed out after {0}ms")]
    Timeout(u64),

    #[error("oracle transport error: {0}")]
    Transport(String),

    #[error("malformed oracle decision: {0}")]
    Malformed(#[from] DecisionError),

    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

impl OracleError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}
