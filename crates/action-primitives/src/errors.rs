//! Error types for browser primitives

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// No candidate anchor resolved to a visible element
    #[error("target not found: {0}")]
    TargetNotFound(String),

    /// Page failed to load or reported an error
    #[error("navigation failed: {0}")]
    NavigationFailed(String),

    /// Browser or page connection is gone
    #[error("browser session lost: {0}")]
    SessionLost(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// Only a dead session ends a run outright.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ActionError::SessionLost(_))
    }

    /// Whether retrying the same primitive could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::TargetNotFound(_)
                | ActionError::NavigationFailed(_)
                | ActionError::Timeout(_)
        )
    }

    /// Error severity level (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            ActionError::SessionLost(_) => 3,
            ActionError::Internal(_) | ActionError::NavigationFailed(_) => 2,
            ActionError::TargetNotFound(_) | ActionError::Timeout(_) => 1,
            ActionError::InvalidArgument(_) => 0,
        }
    }
}
