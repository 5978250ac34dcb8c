//! Human handoff channel used by the `AwaitingHuman` state.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum HandoffReason {
    /// The CAPTCHA gate matched a signature.
    Captcha(String),
    /// The oracle asked for help.
    OracleRequest(String),
}

impl fmt::Display for HandoffReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandoffReason::Captcha(signature) => write!(f, "CAPTCHA detected ({signature})"),
            HandoffReason::OracleRequest(reason) => write!(f, "agent needs help: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffRequest {
    pub reason: HandoffReason,
    pub url: String,
    pub iteration: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffResponse {
    Resumed,
    Aborted,
}

/// Presents a handoff to a human and waits for the answer.
///
/// The wait is unbounded; the loop only races it against cancellation.
#[async_trait]
pub trait OperatorChannel: Send + Sync {
    async fn request_help(&self, request: &HandoffRequest) -> HandoffResponse;
}

/// Channel for runs with nobody watching: every handoff aborts.
#[derive(Debug, Default, Clone)]
pub struct UnattendedOperator;

#[async_trait]
impl OperatorChannel for UnattendedOperator {
    async fn request_help(&self, request: &HandoffRequest) -> HandoffResponse {
        warn!(
            iteration = request.iteration,
            url = %request.url,
            reason = %request.reason,
            "no operator attached, aborting handoff"
        );
        HandoffResponse::Aborted
    }
}
