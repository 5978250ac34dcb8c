//! Maps oracle actions onto browser primitives.

use std::time::Duration;

use action_primitives::{
    normalize_url, overlay_dismiss_anchors, ActionError, BrowserSession, Primitive,
    PrimitiveOutcome, Target,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::debug;
use webpilot_core_types::{page_key, truncate_chars, Observation};

use crate::agent_loop::{
    Action, ActionOutcome, AgentLoopConfig, DerivedFact, ExecutionReport, ExtractKind,
};

/// Category for facts learned about sites while working on tasks.
pub const WEBSITE_CATEGORY: &str = "website";

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Run one action. Never panics and never returns an error: every
    /// failure is folded into the report's outcome.
    async fn execute(&self, action: &Action, session: &dyn BrowserSession) -> ExecutionReport;
}

/// Executor backed by the [`Primitive`] vocabulary.
#[derive(Debug, Clone)]
pub struct DefaultActionExecutor {
    navigation_timeout: Duration,
    extract_max_chars: usize,
    excerpt_chars: usize,
    link_limit: usize,
}

impl Default for DefaultActionExecutor {
    fn default() -> Self {
        Self::from_config(&AgentLoopConfig::default())
    }
}

impl DefaultActionExecutor {
    pub fn from_config(config: &AgentLoopConfig) -> Self {
        Self {
            navigation_timeout: config.navigation_timeout(),
            extract_max_chars: config.extract_max_chars,
            excerpt_chars: config.excerpt_chars,
            link_limit: config.extract_link_limit,
        }
    }

    async fn click(&self, target: &str, session: &dyn BrowserSession) -> Result<ExecutionReport, ActionError> {
        session.perform(&Primitive::Click(parse_target(target)?)).await?;
        Ok(ExecutionReport::new(ActionOutcome::completed()))
    }

    /// Named field, then the first editable field, then whatever has focus.
    async fn type_text(
        &self,
        target: Option<&str>,
        text: &str,
        session: &dyn BrowserSession,
    ) -> Result<ExecutionReport, ActionError> {
        let mut attempts = Vec::with_capacity(3);
        if let Some(target) = target {
            attempts.push(Primitive::Fill {
                target: parse_target(target)?,
                text: text.to_string(),
            });
        }
        attempts.push(Primitive::Fill {
            target: Target::editable_fallback(),
            text: text.to_string(),
        });
        attempts.push(Primitive::TypeFocused(text.to_string()));

        let mut last_error = None;
        for primitive in &attempts {
            match session.perform(primitive).await {
                Ok(_) => return Ok(ExecutionReport::new(ActionOutcome::completed())),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!(primitive = primitive.name(), error = %err, "type attempt failed");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ActionError::TargetNotFound("editable field".into())))
    }

    async fn navigate(&self, url: &str, session: &dyn BrowserSession) -> Result<ExecutionReport, ActionError> {
        let url = normalize_url(url).map_err(|err| ActionError::NavigationFailed(err.to_string()))?;
        session
            .perform(&Primitive::Navigate {
                url: url.clone(),
                timeout: self.navigation_timeout,
            })
            .await?;

        match session
            .perform(&Primitive::DismissOverlays(overlay_dismiss_anchors()))
            .await
        {
            Ok(PrimitiveOutcome::Dismissed(true)) => debug!(url = %url, "dismissed overlay"),
            Ok(_) => {}
            Err(err) => debug!(url = %url, error = %err, "overlay dismissal skipped"),
        }

        let mut report = ExecutionReport::new(ActionOutcome::completed());
        let Some(observation) = observe_after(session).await? else {
            return Ok(report);
        };
        if let Some(host) = observation.host() {
            report.facts.push(DerivedFact::new(
                WEBSITE_CATEGORY,
                host,
                json!({
                    "url": observation.url,
                    "title": observation.title,
                    "visited_at": Utc::now().to_rfc3339(),
                }),
            ));
        }
        Ok(report.with_observation(observation))
    }

    async fn extract(
        &self,
        target: Option<&str>,
        kind: ExtractKind,
        session: &dyn BrowserSession,
    ) -> Result<ExecutionReport, ActionError> {
        let text = match kind {
            ExtractKind::Text => {
                let target = target.map(parse_target).transpose()?;
                match session
                    .perform(&Primitive::ExtractText {
                        target,
                        max_chars: self.extract_max_chars,
                    })
                    .await?
                {
                    PrimitiveOutcome::Text(text) => text,
                    other => {
                        return Err(ActionError::Internal(format!(
                            "extract_text returned {other:?}"
                        )))
                    }
                }
            }
            ExtractKind::Links => match session
                .perform(&Primitive::ExtractLinks {
                    limit: self.link_limit,
                })
                .await?
            {
                PrimitiveOutcome::Links(links) => links
                    .iter()
                    .map(|link| format!("{} - {}", link.text, link.url))
                    .collect::<Vec<_>>()
                    .join("\n"),
                other => {
                    return Err(ActionError::Internal(format!(
                        "extract_links returned {other:?}"
                    )))
                }
            },
        };

        let mut report = ExecutionReport::new(ActionOutcome::Completed {
            extracted: Some(text.clone()),
        });
        if text.trim().is_empty() {
            return Ok(report);
        }
        if let Some(observation) = observe_after(session).await? {
            if let Some(key) = page_key(&observation.url) {
                report
                    .facts
                    .push(DerivedFact::new(WEBSITE_CATEGORY, key, json!(truncate_chars(&text, self.excerpt_chars))));
            }
        }
        Ok(report)
    }
}

#[async_trait]
impl ActionExecutor for DefaultActionExecutor {
    async fn execute(&self, action: &Action, session: &dyn BrowserSession) -> ExecutionReport {
        let result = match action {
            Action::Click { target } => self.click(target, session).await,
            Action::Type { target, text } => self.type_text(target.as_deref(), text, session).await,
            Action::Scroll { direction, amount } => session
                .perform(&Primitive::Scroll {
                    direction: *direction,
                    amount: *amount,
                })
                .await
                .map(|_| ExecutionReport::new(ActionOutcome::completed())),
            Action::Navigate { url } => self.navigate(url, session).await,
            Action::Wait { duration_ms } => {
                match session
                    .perform(&Primitive::Wait(Duration::from_millis(*duration_ms)))
                    .await
                {
                    Err(err) if err.is_fatal() => Err(err),
                    _ => Ok(ExecutionReport::new(ActionOutcome::completed())),
                }
            }
            Action::Extract { target, kind } => self.extract(target.as_deref(), *kind, session).await,
            Action::Finish { result } => Ok(ExecutionReport::new(ActionOutcome::Finished(result.clone()))),
            Action::RequestHuman { reason } => {
                Ok(ExecutionReport::new(ActionOutcome::HumanRequested(reason.clone())))
            }
        };
        result.unwrap_or_else(|err| ExecutionReport::new(outcome_for_error(action, err)))
    }
}

/// Capture used only to derive facts; a non-fatal failure just skips them.
async fn observe_after(session: &dyn BrowserSession) -> Result<Option<Observation>, ActionError> {
    match session.current_observation().await {
        Ok(observation) => Ok(Some(observation)),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            debug!(error = %err, "post-action observation failed");
            Ok(None)
        }
    }
}

fn parse_target(hint: &str) -> Result<Target, ActionError> {
    let target = Target::parse(hint);
    if target.is_empty() {
        return Err(ActionError::TargetNotFound("empty target".into()));
    }
    Ok(target)
}

/// Fold a primitive error into the outcome taxonomy. Errors without a
/// direct counterpart count against the action that raised them.
fn outcome_for_error(action: &Action, err: ActionError) -> ActionOutcome {
    match err {
        ActionError::SessionLost(detail) => ActionOutcome::SessionLost(detail),
        ActionError::TargetNotFound(detail) => ActionOutcome::TargetNotFound(detail),
        ActionError::NavigationFailed(detail) => ActionOutcome::NavigationFailed(detail),
        other if matches!(action, Action::Navigate { .. }) => {
            ActionOutcome::NavigationFailed(other.to_string())
        }
        other => ActionOutcome::TargetNotFound(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Session that records primitives and fails the first `fail_fills` fills.
    #[derive(Default)]
    struct RecordingSession {
        performed: Mutex<Vec<&'static str>>,
        fail_fills: Mutex<u32>,
        url: String,
    }

    #[async_trait]
    impl BrowserSession for RecordingSession {
        async fn open(&self, _url: &str) -> Result<(), ActionError> {
            Ok(())
        }

        async fn current_observation(&self) -> Result<Observation, ActionError> {
            Ok(Observation::new(self.url.clone(), Some("Docs".into()), "body"))
        }

        async fn perform(&self, primitive: &Primitive) -> Result<PrimitiveOutcome, ActionError> {
            self.performed.lock().unwrap().push(primitive.name());
            match primitive {
                Primitive::Fill { target, .. } => {
                    let mut remaining = self.fail_fills.lock().unwrap();
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(ActionError::TargetNotFound(target.hint.clone()));
                    }
                    Ok(PrimitiveOutcome::Done)
                }
                Primitive::ExtractText { .. } => Ok(PrimitiveOutcome::Text("Tokio is a runtime".into())),
                Primitive::DismissOverlays(_) => Err(ActionError::Internal("no overlay".into())),
                Primitive::Click(_) => Err(ActionError::Timeout("click".into())),
                _ => Ok(PrimitiveOutcome::Done),
            }
        }

        async fn close(&self) -> Result<(), ActionError> {
            Ok(())
        }
    }

    fn session(url: &str) -> RecordingSession {
        RecordingSession {
            url: url.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn type_falls_back_to_editable_then_focused() {
        let session = session("https://docs.rs/");
        *session.fail_fills.lock().unwrap() = 2;
        let report = DefaultActionExecutor::default()
            .execute(
                &Action::Type {
                    target: Some("Search box".into()),
                    text: "tokio".into(),
                },
                &session,
            )
            .await;
        assert_eq!(report.outcome, ActionOutcome::completed());
        assert_eq!(
            *session.performed.lock().unwrap(),
            vec!["fill", "fill", "type_focused"]
        );
    }

    #[tokio::test]
    async fn navigate_records_website_fact_despite_overlay_error() {
        let session = session("https://docs.rs/tokio");
        let report = DefaultActionExecutor::default()
            .execute(&Action::Navigate { url: "docs.rs/tokio".into() }, &session)
            .await;
        assert!(report.outcome.is_success());
        assert_eq!(report.facts.len(), 1);
        assert_eq!(report.facts[0].category, "website");
        assert_eq!(report.facts[0].key, "docs.rs");
        assert!(report.observation.is_some());
    }

    #[tokio::test]
    async fn extract_returns_text_and_page_fact() {
        let session = session("https://docs.rs/tokio/latest/");
        let report = DefaultActionExecutor::default()
            .execute(
                &Action::Extract {
                    target: None,
                    kind: ExtractKind::Text,
                },
                &session,
            )
            .await;
        assert_eq!(
            report.outcome,
            ActionOutcome::Completed {
                extracted: Some("Tokio is a runtime".into())
            }
        );
        assert_eq!(report.facts[0].key, "docs.rs/tokio/latest");
    }

    #[tokio::test]
    async fn generic_errors_map_to_target_not_found() {
        let session = session("https://docs.rs/");
        let report = DefaultActionExecutor::default()
            .execute(&Action::Click { target: "Go".into() }, &session)
            .await;
        assert!(matches!(report.outcome, ActionOutcome::TargetNotFound(_)));

        let finish = DefaultActionExecutor::default()
            .execute(&Action::Finish { result: "42".into() }, &session)
            .await;
        assert_eq!(finish.outcome, ActionOutcome::Finished("42".into()));
    }
}
