//! Core data types for browser primitives

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ActionError;

/// Default scroll distance in pixels.
pub const DEFAULT_SCROLL_AMOUNT: u32 = 300;

/// Anchor descriptor for element targeting
///
/// Represents different strategies for locating elements:
/// - CSS selector
/// - ARIA role and accessible name
/// - Text content matching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AnchorDescriptor {
    Css { selector: String },
    Aria { role: String, name: String },
    Text { content: String, exact: bool },
}

impl AnchorDescriptor {
    pub fn css(selector: impl Into<String>) -> Self {
        AnchorDescriptor::Css {
            selector: selector.into(),
        }
    }

    pub fn text(content: impl Into<String>, exact: bool) -> Self {
        AnchorDescriptor::Text {
            content: content.into(),
            exact,
        }
    }
}

impl fmt::Display for AnchorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnchorDescriptor::Css { selector } => write!(f, "css:{selector}"),
            AnchorDescriptor::Aria { role, name } => write!(f, "aria:{role}[name='{name}']"),
            AnchorDescriptor::Text { content, exact: true } => write!(f, "text:exact:'{content}'"),
            AnchorDescriptor::Text { content, exact: false } => {
                write!(f, "text:partial:'{content}'")
            }
        }
    }
}

/// Ordered anchor candidates derived from one free-form hint.
///
/// A session tries the candidates in order and acts on the first that
/// resolves to a visible element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub hint: String,
    pub candidates: Vec<AnchorDescriptor>,
}

impl Target {
    pub fn from_candidates(hint: impl Into<String>, candidates: Vec<AnchorDescriptor>) -> Self {
        Self {
            hint: hint.into(),
            candidates,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hint)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
    Left,
    Right,
    Top,
    Bottom,
}

impl FromStr for ScrollDirection {
    type Err = ActionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(ScrollDirection::Up),
            "down" | "" => Ok(ScrollDirection::Down),
            "left" => Ok(ScrollDirection::Left),
            "right" => Ok(ScrollDirection::Right),
            "top" => Ok(ScrollDirection::Top),
            "bottom" => Ok(ScrollDirection::Bottom),
            other => Err(ActionError::InvalidArgument(format!(
                "unknown scroll direction '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
            ScrollDirection::Top => "top",
            ScrollDirection::Bottom => "bottom",
        };
        f.write_str(name)
    }
}

/// Low-level operation a [`crate::BrowserSession`] performs.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Click(Target),
    /// Replace the contents of the resolved field with `text`.
    Fill { target: Target, text: String },
    /// Type into whatever element currently has focus.
    TypeFocused(String),
    Scroll {
        direction: ScrollDirection,
        amount: u32,
    },
    Navigate { url: String, timeout: Duration },
    Wait(Duration),
    /// Read text from the target, or the whole body when `None`.
    ExtractText {
        target: Option<Target>,
        max_chars: usize,
    },
    ExtractLinks { limit: usize },
    /// Click the first visible anchor, if any.
    DismissOverlays(Vec<AnchorDescriptor>),
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Click(_) => "click",
            Primitive::Fill { .. } => "fill",
            Primitive::TypeFocused(_) => "type_focused",
            Primitive::Scroll { .. } => "scroll",
            Primitive::Navigate { .. } => "navigate",
            Primitive::Wait(_) => "wait",
            Primitive::ExtractText { .. } => "extract_text",
            Primitive::ExtractLinks { .. } => "extract_links",
            Primitive::DismissOverlays(_) => "dismiss_overlays",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub url: String,
    pub text: String,
}

/// Result payload of a successful primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveOutcome {
    Done,
    Text(String),
    Links(Vec<PageLink>),
    /// Whether an overlay was found and clicked.
    Dismissed(bool),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scroll_directions() {
        assert_eq!("UP".parse::<ScrollDirection>().unwrap(), ScrollDirection::Up);
        assert_eq!("".parse::<ScrollDirection>().unwrap(), ScrollDirection::Down);
        assert_eq!(
            " bottom ".parse::<ScrollDirection>().unwrap(),
            ScrollDirection::Bottom
        );
        assert!(matches!(
            "sideways".parse::<ScrollDirection>(),
            Err(ActionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn anchors_render_for_logs() {
        assert_eq!(AnchorDescriptor::css("#q").to_string(), "css:#q");
        assert_eq!(
            AnchorDescriptor::text("Sign in", false).to_string(),
            "text:partial:'Sign in'"
        );
    }
}
