//! Prompt templates for the reasoning oracle.
//!
//! The system prompt describes the action vocabulary and the JSON reply
//! format that [`super::parse::parse_decision`] accepts. The user message
//! carries the task, the current page, relevant memory, recent history and
//! any recovery notes.

use webpilot_core_types::truncate_chars;

use super::types::{ActionOutcome, RunMode};
use crate::llm_provider::OracleRequest;

/// Memory facts quoted per decision, in addition to host facts.
pub const RECENT_FACTS_IN_PROMPT: usize = 5;
const HISTORY_IN_PROMPT: usize = 10;
const PAGE_TEXT_IN_PROMPT: usize = 1_500;
const FACT_VALUE_IN_PROMPT: usize = 300;

/// Default system prompt.
pub const AGENT_LOOP_SYSTEM_PROMPT: &str = r##"You are an autonomous web assistant controlling a real browser. Each step you receive a screenshot of the current viewport, the page URL, title and visible text, facts remembered from earlier sessions, and the actions you already took. Choose exactly ONE next action.

## Available Actions

- **click**: click an element described by visible text or a CSS selector
  {"action": "click", "target": "Sign in"}
  Targets may be plain text, `text=Exact label`, `css=#selector`, or `role=button[name="Search"]`.

- **type**: type into a field; without a target the first editable field is used
  {"action": "type", "target": "textarea[name=q]", "text": "rust async runtime"}

- **scroll**: scroll the page (up, down, left, right, top, bottom), amount in pixels
  {"action": "scroll", "direction": "down", "amount": 600}

- **navigate**: open a URL directly
  {"action": "navigate", "url": "https://www.rust-lang.org"}

- **wait**: pause while the page loads
  {"action": "wait", "seconds": 2}

- **extract**: read page text (optionally from one element) or the links on the page
  {"action": "extract", "kind": "text", "target": "#main"}
  {"action": "extract", "kind": "links"}

- **finish**: the task is complete; put the answer in `result`
  {"action": "finish", "result": "The latest release is 1.80.0"}

- **request_human**: you are blocked (CAPTCHA, login, payment) and need the operator
  {"action": "request_human", "reason": "Login required"}

## Reply Format

Reply with a single JSON object and nothing else:

{
  "action": "<one of the actions above>",
  "...": "action fields as shown",
  "rationale": "why this action moves the task forward",
  "facts": [{"category": "website", "key": "example.com", "value": "search box is labelled 'Find'"}]
}

`facts` is optional. Add facts only when they would help future tasks on the same site.

## Rules
- Trust the screenshot over the text when they disagree.
- Prefer navigate for known URLs; never type a URL into a search box.
- If an action failed, look at the recovery notes and try a different approach.
- Do not repeat an action that did not change the page.
- Call finish only once the requested information is visible and verified.
"##;

/// Extra instructions for exploration runs.
pub const EXPLORATION_PROMPT_ADDITION: &str = r#"
## Exploration Mode
You are not completing a user task. Survey the site: find its main sections, search, forms and account features. Record each useful discovery as a fact, and finish with a short overview of what the site lets a user do. Do not submit forms or make purchases.
"#;

/// Formats the complete system prompt for the given run mode.
pub fn format_system_prompt(mode: &RunMode) -> String {
    let mut prompt = AGENT_LOOP_SYSTEM_PROMPT.to_string();
    if matches!(mode, RunMode::Exploration { .. }) {
        prompt.push_str(EXPLORATION_PROMPT_ADDITION);
    }
    prompt
}

/// Formats the user message containing the task and page state.
pub fn format_user_message(request: &OracleRequest) -> String {
    let mut message = String::new();

    message.push_str("## Task\n");
    message.push_str(request.task.goal());
    message.push('\n');

    let facts = request.relevant_facts(RECENT_FACTS_IN_PROMPT);
    if !facts.is_empty() {
        message.push_str("\n## Remembered Facts\n");
        for fact in &facts {
            let value = match &fact.value {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            message.push_str(&format!(
                "- [{}] {}: {}\n",
                fact.category,
                fact.key,
                truncate_chars(&value, FACT_VALUE_IN_PROMPT)
            ));
        }
    }

    if !request.history.is_empty() {
        message.push_str("\n## Previous Actions\n");
        let start = request.history.len().saturating_sub(HISTORY_IN_PROMPT);
        for entry in &request.history[start..] {
            message.push_str("- ");
            message.push_str(&entry.summary());
            message.push('\n');
            if let ActionOutcome::Completed {
                extracted: Some(text),
            } = &entry.outcome
            {
                message.push_str(&format!(
                    "  extracted: {}\n",
                    truncate_chars(text, PAGE_TEXT_IN_PROMPT / 3)
                ));
            }
        }
    }

    if !request.notes.is_empty() {
        message.push_str("\n## Recovery Notes\n");
        for note in &request.notes {
            message.push_str(&format!("- {note}\n"));
        }
    }

    let observation = &request.observation;
    message.push_str("\n## Current Page\n");
    message.push_str(&format!("URL: {}\n", observation.url));
    if let Some(title) = &observation.title {
        message.push_str(&format!("Title: {title}\n"));
    }
    message.push_str("\nVisible text:\n");
    message.push_str(&truncate_chars(observation.visible_text.trim(), PAGE_TEXT_IN_PROMPT));
    message.push('\n');

    if observation.screenshot.is_some() {
        message.push_str("\n[Screenshot attached]\n");
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_loop::{Action, AgentHistoryEntry};
    use memory_center::MemoryRecord;
    use serde_json::json;
    use webpilot_core_types::{Observation, Task};

    #[test]
    fn system_prompt_keeps_selector_examples_and_rules() {
        let prompt = format_system_prompt(&RunMode::Task);
        assert!(prompt.contains(r##"{"action": "extract", "kind": "text", "target": "#main"}"##));
        assert!(prompt.contains("## Reply Format"));
        assert!(prompt.trim_end().ends_with("visible and verified."));
    }

    #[test]
    fn exploration_prompt_adds_section() {
        assert!(!format_system_prompt(&RunMode::Task).contains("Exploration Mode"));
        let mode = RunMode::Exploration {
            host: "docs.rs".into(),
        };
        assert!(format_system_prompt(&mode).contains("Exploration Mode"));
    }

    #[test]
    fn user_message_includes_context_sections() {
        let observation = Observation::new("https://docs.rs/", Some("Docs.rs".into()), "Search crates");
        let mut memory = MemoryRecord::new();
        memory.upsert("website", "docs.rs", json!("search box at top"));
        let history = vec![AgentHistoryEntry::new(
            1,
            &observation,
            Action::Click { target: "Go".into() },
            ActionOutcome::TargetNotFound("Go".into()),
        )];
        let request = OracleRequest {
            observation,
            task: Task::new("find tokio docs").unwrap(),
            memory,
            history,
            notes: vec!["click(\"Go\") failed (target not found): Go".into()],
            mode: RunMode::Task,
        };

        let message = format_user_message(&request);
        assert!(message.starts_with("## Task\nfind tokio docs"));
        assert!(message.contains("- [website] docs.rs: search box at top"));
        assert!(message.contains("target_not_found"));
        assert!(message.contains("## Recovery Notes"));
        assert!(message.contains("URL: https://docs.rs/"));
        assert!(!message.contains("[Screenshot attached]"));
    }
}
