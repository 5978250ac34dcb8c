use async_trait::async_trait;
use webpilot_core_types::Observation;

use crate::errors::ActionError;
use crate::types::{Primitive, PrimitiveOutcome};

/// A live browser page driven by one control loop at a time.
///
/// Implementations report a dead browser as [`ActionError::SessionLost`];
/// every other error is recoverable from the loop's point of view.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Launch if needed and load `url`.
    async fn open(&self, url: &str) -> Result<(), ActionError>;

    /// URL, title, bounded visible text and a viewport screenshot.
    async fn current_observation(&self) -> Result<Observation, ActionError>;

    async fn perform(&self, primitive: &Primitive) -> Result<PrimitiveOutcome, ActionError>;

    /// Release browser resources. Safe to call more than once.
    async fn close(&self) -> Result<(), ActionError>;
}
