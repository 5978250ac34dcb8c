//! Shared primitives for the webpilot agent crates.
//!
//! Identifiers, the immutable [`Task`] goal, and the per-iteration
//! [`Observation`] snapshot every other crate passes around.

use std::fmt;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Errors raised while constructing core values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("task goal cannot be empty")]
    EmptyTask,
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Natural-language goal supplied at session start. Never mutated during a run.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Task {
    id: TaskId,
    goal: String,
}

impl Task {
    /// Build a task, rejecting blank goals.
    pub fn new(goal: impl Into<String>) -> Result<Self, CoreError> {
        let goal = goal.into();
        let trimmed = goal.trim();
        if trimmed.is_empty() {
            return Err(CoreError::EmptyTask);
        }
        Ok(Self {
            id: TaskId::new(),
            goal: trimmed.to_string(),
        })
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.goal)
    }
}

/// Raw PNG capture attached to an observation.
#[derive(Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub png: Vec<u8>,
}

impl fmt::Debug for Screenshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Screenshot")
            .field("bytes", &self.png.len())
            .finish()
    }
}

/// Snapshot of page state at one loop iteration.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    /// Current page URL.
    pub url: String,
    /// Document title, when the page reports one.
    pub title: Option<String>,
    /// Visible text, already bounded by the producing session.
    pub visible_text: String,
    /// Viewport capture, if the session took one.
    #[cfg_attr(feature = "serde-full", serde(skip))]
    pub screenshot: Option<Screenshot>,
    pub captured_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(url: impl Into<String>, title: Option<String>, visible_text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title,
            visible_text: visible_text.into(),
            screenshot: None,
            captured_at: Utc::now(),
        }
    }

    pub fn with_screenshot(mut self, png: Vec<u8>) -> Self {
        self.screenshot = Some(Screenshot { png });
        self
    }

    /// Stable digest of URL, title and visible text.
    ///
    /// Screenshots and capture time are excluded so that two captures of an
    /// unchanged page compare equal.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.url.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.title.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.visible_text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Host component of the URL, lowercased, without scheme or port.
    pub fn host(&self) -> Option<String> {
        host_of(&self.url)
    }
}

/// Lowercased host of an absolute URL, if it has one.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(|host| host.to_ascii_lowercase()))
}

/// `host/path` key for per-page memory facts. The root path collapses to the host.
pub fn page_key(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let path = parsed.path().trim_end_matches('/');
    if path.is_empty() {
        Some(host)
    } else {
        Some(format!("{host}{path}"))
    }
}

/// Truncate to at most `max_chars` characters, appending an ellipsis when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
