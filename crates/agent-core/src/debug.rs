//! Observation-only hooks for debug artifacts.

use webpilot_core_types::Observation;

use crate::agent_loop::{ActionOutcome, AgentDecision};

/// Receives loop events for debugging. Implementations must not fail and
/// cannot influence control flow.
pub trait DebugSink: Send + Sync {
    fn on_observation(&self, iteration: u32, observation: &Observation) {
        let _ = (iteration, observation);
    }

    fn on_decision(&self, iteration: u32, decision: &AgentDecision) {
        let _ = (iteration, decision);
    }

    fn on_outcome(&self, iteration: u32, outcome: &ActionOutcome) {
        let _ = (iteration, outcome);
    }
}

#[derive(Debug, Default, Clone)]
pub struct NoopDebugSink;

impl DebugSink for NoopDebugSink {}
