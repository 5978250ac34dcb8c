//! Recovery policy for the `Recovering` state.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::Action;

/// Why the loop entered `Recovering`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryReason {
    TargetNotFound,
    NavigationFailed,
    OracleFailure,
    Stalled,
}

impl RecoveryReason {
    /// Action-level failures that can be retried without the oracle.
    pub fn is_action_error(self) -> bool {
        matches!(self, RecoveryReason::TargetNotFound | RecoveryReason::NavigationFailed)
    }
}

impl fmt::Display for RecoveryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecoveryReason::TargetNotFound => "target not found",
            RecoveryReason::NavigationFailed => "navigation failed",
            RecoveryReason::OracleFailure => "oracle failure",
            RecoveryReason::Stalled => "stalled",
        };
        f.write_str(name)
    }
}

/// What the loop does before returning to `Observing`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryStep {
    /// Re-run the failed action against a fresh observation.
    Retry(Action),
    /// Scroll down by the given amount, then re-run the failed action.
    ScrollThenRetry { action: Action, amount: u32 },
    /// Drop the action and ask the oracle again with a note about the failure.
    Replan,
}

/// Escalates with the failure streak: retry, scroll and retry, replan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub scroll_amount: u32,
}

impl RecoveryPolicy {
    pub fn new(scroll_amount: u32) -> Self {
        Self { scroll_amount }
    }

    /// `streak` counts consecutive action failures including this one.
    pub fn plan(&self, reason: RecoveryReason, streak: u32, failed: Option<&Action>) -> RecoveryStep {
        let Some(action) = failed.filter(|_| reason.is_action_error()) else {
            return RecoveryStep::Replan;
        };
        match streak {
            0 | 1 => RecoveryStep::Retry(action.clone()),
            2 => RecoveryStep::ScrollThenRetry {
                action: action.clone(),
                amount: self.scroll_amount,
            },
            _ => RecoveryStep::Replan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalates_with_streak() {
        let policy = RecoveryPolicy::new(300);
        let click = Action::Click { target: "Buy".into() };
        let reason = RecoveryReason::TargetNotFound;

        assert_eq!(policy.plan(reason, 1, Some(&click)), RecoveryStep::Retry(click.clone()));
        assert_eq!(
            policy.plan(reason, 2, Some(&click)),
            RecoveryStep::ScrollThenRetry {
                action: click.clone(),
                amount: 300
            }
        );
        assert_eq!(policy.plan(reason, 3, Some(&click)), RecoveryStep::Replan);
        assert_eq!(policy.plan(reason, 7, Some(&click)), RecoveryStep::Replan);
    }

    #[test]
    fn oracle_failures_always_replan() {
        let policy = RecoveryPolicy::new(300);
        let click = Action::Click { target: "Buy".into() };
        assert_eq!(
            policy.plan(RecoveryReason::OracleFailure, 1, None),
            RecoveryStep::Replan
        );
        assert_eq!(
            policy.plan(RecoveryReason::Stalled, 1, Some(&click)),
            RecoveryStep::Replan
        );
    }
}
