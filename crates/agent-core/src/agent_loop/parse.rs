//! Turns raw oracle text into a validated [`AgentDecision`].
//!
//! Oracle output is untrusted: the JSON may be fenced, wrapped in prose,
//! flat or nested under `details`, and use either the lowercase action
//! names or the legacy uppercase ones (`TASK_COMPLETE`, `MANUAL_CAPTCHA`).
//! Anything outside the vocabulary is rejected with
//! [`DecisionError::UnknownAction`].

use action_primitives::{ScrollDirection, DEFAULT_SCROLL_AMOUNT};
use serde_json::{Map, Value};

use super::types::{Action, AgentDecision, DerivedFact, ExtractKind};
use crate::errors::DecisionError;

/// Wait used when the oracle asks to wait without saying how long.
pub const DEFAULT_WAIT_MS: u64 = 3_000;

const TARGET_KEYS: &[&str] = &["target", "locator", "selector", "element"];
const CLICK_KEYS: &[&str] = &["target", "locator", "selector", "element", "text"];
const RATIONALE_KEYS: &[&str] = &["rationale", "reasoning", "thinking"];

/// Parse one oracle response.
pub fn parse_decision(raw: &str) -> Result<AgentDecision, DecisionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DecisionError::Empty);
    }
    let json = extract_json_object(trimmed).ok_or(DecisionError::NoJson)?;
    let value: Value =
        serde_json::from_str(&json).map_err(|err| DecisionError::InvalidJson(err.to_string()))?;
    let Value::Object(root) = value else {
        return Err(DecisionError::InvalidJson("expected a JSON object".into()));
    };
    decision_from_object(&root)
}

fn decision_from_object(root: &Map<String, Value>) -> Result<AgentDecision, DecisionError> {
    let name = match root.get("action") {
        Some(Value::String(name)) => name.clone(),
        Some(other) => {
            return Err(DecisionError::invalid("?", "action", format!("expected string, got {other}")))
        }
        None => return Err(DecisionError::missing("?", "action")),
    };
    let fields = Fields::new(root);
    let action = build_action(&name, &fields)?;

    let rationale = RATIONALE_KEYS
        .iter()
        .find_map(|key| root.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    Ok(AgentDecision {
        action,
        rationale,
        facts: parse_facts(root),
    })
}

/// Looks up a field in `details` first, then at the top level.
struct Fields<'a> {
    details: Option<&'a Map<String, Value>>,
    root: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn new(root: &'a Map<String, Value>) -> Self {
        Self {
            details: root.get("details").and_then(Value::as_object),
            root,
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.details
            .and_then(|details| details.get(key))
            .or_else(|| self.root.get(key))
            .filter(|value| !value.is_null())
    }

    fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| match self.get(key)? {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
    }

    fn number(&self, action: &str, key: &'static str) -> Result<Option<f64>, DecisionError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Number(number)) => Ok(number.as_f64()),
            Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
            Some(Value::String(text)) => text
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| DecisionError::invalid(action, key, format!("'{text}' is not a number"))),
            Some(other) => Err(DecisionError::invalid(action, key, format!("unexpected value {other}"))),
        }
    }
}

fn build_action(raw_name: &str, fields: &Fields<'_>) -> Result<Action, DecisionError> {
    let name = raw_name.trim().to_ascii_lowercase().replace(['-', ' '], "_");
    let action = match name.as_str() {
        "click" => Action::Click {
            target: fields
                .text(CLICK_KEYS)
                .ok_or_else(|| DecisionError::missing("click", "target"))?,
        },
        "type" | "type_text" | "fill" | "input" => {
            let text = match fields.get("text").or_else(|| fields.get("value")) {
                Some(Value::String(text)) => text.clone(),
                Some(Value::Number(number)) => number.to_string(),
                _ => return Err(DecisionError::missing("type", "text")),
            };
            Action::Type {
                target: fields.text(TARGET_KEYS),
                text,
            }
        }
        "scroll" => {
            let direction = match fields.text(&["direction"]) {
                Some(raw) => raw
                    .parse::<ScrollDirection>()
                    .map_err(|err| DecisionError::invalid("scroll", "direction", err.to_string()))?,
                None => ScrollDirection::Down,
            };
            let amount = match fields.number("scroll", "amount")? {
                Some(amount) if amount < 0.0 => {
                    return Err(DecisionError::invalid("scroll", "amount", "must not be negative"))
                }
                Some(amount) => amount.round() as u32,
                None => DEFAULT_SCROLL_AMOUNT,
            };
            Action::Scroll { direction, amount }
        }
        "navigate" | "goto" | "go_to" | "open" => Action::Navigate {
            url: fields
                .text(&["url", "target"])
                .ok_or_else(|| DecisionError::missing("navigate", "url"))?,
        },
        "wait" => {
            let duration_ms = if let Some(ms) = fields.number("wait", "duration_ms")? {
                ms
            } else if let Some(ms) = fields.number("wait", "ms")? {
                ms
            } else if let Some(seconds) = fields.number("wait", "seconds")? {
                seconds * 1000.0
            } else {
                DEFAULT_WAIT_MS as f64
            };
            if duration_ms < 0.0 {
                return Err(DecisionError::invalid("wait", "duration_ms", "must not be negative"));
            }
            Action::Wait {
                duration_ms: duration_ms.round() as u64,
            }
        }
        "extract" => {
            let kind = match fields.text(&["kind", "type"]).map(|k| k.to_ascii_lowercase()) {
                None => ExtractKind::Text,
                Some(kind) => match kind.as_str() {
                    "text" => ExtractKind::Text,
                    "links" | "search_results" => ExtractKind::Links,
                    other => {
                        return Err(DecisionError::invalid(
                            "extract",
                            "kind",
                            format!("expected text or links, got '{other}'"),
                        ))
                    }
                },
            };
            Action::Extract {
                target: fields.text(TARGET_KEYS),
                kind,
            }
        }
        "finish" | "done" | "task_complete" | "complete" => Action::Finish {
            result: fields
                .text(&["result", "message", "done_text", "summary", "text"])
                .unwrap_or_default(),
        },
        "request_human" | "manual_captcha" | "human" => Action::RequestHuman {
            reason: fields
                .text(&["reason", "message"])
                .unwrap_or_else(|| "operator assistance requested".to_string()),
        },
        _ => return Err(DecisionError::UnknownAction(raw_name.to_string())),
    };
    Ok(action)
}

/// Optional `facts` array. Entries without a key are dropped; a missing
/// category files the fact under `general`.
fn parse_facts(root: &Map<String, Value>) -> Vec<DerivedFact> {
    let Some(items) = root.get("facts").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|item| {
            let key = item.get("key")?.as_str()?.trim();
            if key.is_empty() {
                return None;
            }
            let category = item
                .get("category")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|category| !category.is_empty())
                .unwrap_or("general");
            let value = item.get("value").cloned().unwrap_or(Value::Null);
            Some(DerivedFact::new(category, key, value))
        })
        .collect()
}

/// Pull the first JSON object out of free-form model output.
///
/// Handles a bare object, a fenced block and an object embedded in prose.
/// Braces inside string literals do not count towards nesting.
pub fn extract_json_object(raw: &str) -> Option<String> {
    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            if let Some(object) = balanced_object(&after_lang[..end]) {
                return Some(object);
            }
        }
    }
    balanced_object(raw)
}

fn balanced_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..=start + idx].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_fenced_block() {
        let input = "Here is my move:\n```json\n{\"action\":\"wait\"}\n```";
        let extracted = extract_json_object(input).expect("json");
        assert_eq!(extracted, "{\"action\":\"wait\"}");
    }

    #[test]
    fn extracts_from_inline_object() {
        let input = "text { \"foo\": \"}\" } more";
        let extracted = extract_json_object(input).expect("json");
        assert_eq!(extracted, "{ \"foo\": \"}\" }");
    }

    #[test]
    fn returns_none_when_missing() {
        assert!(extract_json_object("no braces").is_none());
    }

    #[test]
    fn parses_legacy_nested_click() {
        let raw = r#"{"action": "CLICK", "details": {"locator": "text=Sign in"}, "reasoning": "log in first"}"#;
        let decision = parse_decision(raw).unwrap();
        assert_eq!(
            decision.action,
            Action::Click {
                target: "text=Sign in".into()
            }
        );
        assert_eq!(decision.rationale.as_deref(), Some("log in first"));
    }

    #[test]
    fn parses_flat_finish_with_facts() {
        let raw = r#"Sure. {"action": "finish", "result": "42",
            "facts": [{"category": "task_pattern", "key": "answer", "value": "42"}, {"value": 1}]}"#;
        let decision = parse_decision(raw).unwrap();
        assert_eq!(decision.action, Action::Finish { result: "42".into() });
        assert_eq!(decision.facts.len(), 1);
        assert_eq!(decision.facts[0].category, "task_pattern");
    }

    #[test]
    fn legacy_aliases_map_onto_vocabulary() {
        let complete = parse_decision(r#"{"action":"TASK_COMPLETE","message":"done"}"#).unwrap();
        assert_eq!(complete.action, Action::Finish { result: "done".into() });

        let captcha = parse_decision(r#"{"action":"MANUAL_CAPTCHA"}"#).unwrap();
        assert!(matches!(captcha.action, Action::RequestHuman { .. }));

        let wait = parse_decision(r#"{"action":"WAIT","details":{"seconds":"2"}}"#).unwrap();
        assert_eq!(wait.action, Action::Wait { duration_ms: 2000 });

        let default_wait = parse_decision(r#"{"action":"wait"}"#).unwrap();
        assert_eq!(default_wait.action, Action::Wait { duration_ms: DEFAULT_WAIT_MS });
    }

    #[test]
    fn scroll_and_extract_defaults() {
        let scroll = parse_decision(r#"{"action":"scroll"}"#).unwrap();
        assert_eq!(
            scroll.action,
            Action::Scroll {
                direction: ScrollDirection::Down,
                amount: 300
            }
        );

        let extract =
            parse_decision(r#"{"action":"EXTRACT","details":{"type":"search_results"}}"#).unwrap();
        assert_eq!(
            extract.action,
            Action::Extract {
                target: None,
                kind: ExtractKind::Links
            }
        );
    }

    #[test]
    fn rejects_unknown_and_incomplete_actions() {
        assert_eq!(
            parse_decision(r#"{"action":"hover","target":"x"}"#).unwrap_err(),
            DecisionError::UnknownAction("hover".into())
        );
        assert_eq!(
            parse_decision(r#"{"action":"navigate"}"#).unwrap_err(),
            DecisionError::missing("navigate", "url")
        );
        assert!(matches!(
            parse_decision(r#"{"action":"scroll","direction":"diagonal"}"#),
            Err(DecisionError::InvalidField { field: "direction", .. })
        ));
        assert_eq!(parse_decision("   ").unwrap_err(), DecisionError::Empty);
        assert_eq!(parse_decision("no json here").unwrap_err(), DecisionError::NoJson);
        assert!(matches!(
            parse_decision("{not json}"),
            Err(DecisionError::InvalidJson(_))
        ));
    }
}
