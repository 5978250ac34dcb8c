//! Best-effort element targeting.
//!
//! A free-form hint from the oracle ("Sign in", `#search`, `text=Next`,
//! `role=button[name="Go"]`) becomes an ordered list of anchors. Sessions
//! resolve an anchor by running [`anchor_script`] in the page; the script
//! tags the first visible match with a one-off attribute and returns a
//! selector for it.

use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::errors::ActionError;
use crate::types::{AnchorDescriptor, ScrollDirection, Target};

/// Attribute used to tag resolved elements.
pub const ANCHOR_ATTR: &str = "data-webpilot-anchor";

/// Fields tried, in order, when a type target cannot be resolved.
pub const EDITABLE_SELECTORS: &[&str] = &[
    "input",
    "textarea",
    "[contenteditable='true']",
    "[role='textbox']",
];

const OVERLAY_CSS: &[&str] = &[
    "#L2AGLb",
    "button[aria-label='Accept all']",
    "button[aria-label='Accept']",
];

const OVERLAY_TEXT: &[&str] = &[
    "Accept",
    "Accept all",
    "I agree",
    "Agree",
    "Allow",
    "Close",
    "No thanks",
    "Got it",
];

const OVERLAY_TRAILING_CSS: &[&str] = &[
    ".modal button",
    ".popup button",
    "[aria-label='Close']",
    ".cookie-banner button",
    "#consent-banner button",
    ".consent button",
];

impl Target {
    /// Build candidates from a hint.
    ///
    /// CSS-looking hints resolve as CSS first, then as exact text. `text=`
    /// hints are exact then partial text. Bare phrases try exact text,
    /// partial text, and finally CSS.
    pub fn parse(hint: &str) -> Self {
        let hint = hint.trim();
        let mut candidates = Vec::new();

        if hint.is_empty() {
            return Target::from_candidates(hint, candidates);
        }

        if let Some(selector) = hint.strip_prefix("css=") {
            candidates.push(AnchorDescriptor::css(selector.trim()));
        } else if let Some(text) = hint.strip_prefix("text=") {
            let text = strip_quotes(text.trim());
            candidates.push(AnchorDescriptor::text(text, true));
            candidates.push(AnchorDescriptor::text(text, false));
        } else if let Some(aria) = parse_role_hint(hint) {
            candidates.push(aria);
        } else if looks_like_css(hint) {
            candidates.push(AnchorDescriptor::css(hint));
            candidates.push(AnchorDescriptor::text(hint, true));
        } else {
            let text = strip_quotes(hint);
            candidates.push(AnchorDescriptor::text(text, true));
            candidates.push(AnchorDescriptor::text(text, false));
            candidates.push(AnchorDescriptor::css(hint));
        }

        Target::from_candidates(hint, candidates)
    }

    /// The first editable field on the page.
    pub fn editable_fallback() -> Self {
        Target::from_candidates(
            "editable field",
            EDITABLE_SELECTORS
                .iter()
                .map(|selector| AnchorDescriptor::css(*selector))
                .collect(),
        )
    }
}

/// Cookie banners, consent walls and modal close buttons.
pub fn overlay_dismiss_anchors() -> Vec<AnchorDescriptor> {
    let css = OVERLAY_CSS.iter().map(|s| AnchorDescriptor::css(*s));
    let text = OVERLAY_TEXT.iter().map(|s| AnchorDescriptor::text(*s, true));
    let trailing = OVERLAY_TRAILING_CSS.iter().map(|s| AnchorDescriptor::css(*s));
    css.chain(text).chain(trailing).collect()
}

pub fn looks_like_css(hint: &str) -> bool {
    let hint = hint.trim();
    if hint.is_empty() || hint.contains(char::is_whitespace) && !hint.contains(['>', '[', '.', '#']) {
        return false;
    }
    hint.starts_with(['#', '.', '['])
        || hint.contains(" > ")
        || hint.contains('[') && hint.ends_with(']')
        || hint.contains(":nth")
        || is_tag_selector(hint)
}

fn is_tag_selector(hint: &str) -> bool {
    const TAGS: &[&str] = &[
        "a", "button", "input", "textarea", "select", "form", "h1", "h2", "h3", "li", "img",
    ];
    let tag: String = hint
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    TAGS.contains(&tag.as_str()) && (tag.len() == hint.len() || hint[tag.len()..].starts_with(['.', '#', '[', ':']))
}

fn strip_quotes(text: &str) -> &str {
    let text = text.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = text.strip_prefix(quote).and_then(|t| t.strip_suffix(quote)) {
            return inner;
        }
    }
    text
}

/// `role=button[name="Search"]` or `role=link`.
fn parse_role_hint(hint: &str) -> Option<AnchorDescriptor> {
    let rest = hint.strip_prefix("role=")?;
    let (role, name) = match rest.split_once('[') {
        Some((role, attrs)) => {
            let attrs = attrs.strip_suffix(']')?;
            let name = attrs.trim().strip_prefix("name=")?;
            (role, strip_quotes(name))
        }
        None => (rest, ""),
    };
    let role = role.trim();
    if role.is_empty() {
        return None;
    }
    Some(AnchorDescriptor::Aria {
        role: role.to_string(),
        name: name.to_string(),
    })
}

/// Prefix scheme-less URLs with `https://` and validate the result.
pub fn normalize_url(raw: &str) -> Result<String, ActionError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ActionError::InvalidArgument("no URL provided".to_string()));
    }
    let has_scheme = Url::parse(raw)
        .map(|url| matches!(url.scheme(), "http" | "https" | "about" | "data" | "file"))
        .unwrap_or(false);
    let candidate = if has_scheme {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    Url::parse(&candidate)
        .map(|url| url.to_string())
        .map_err(|err| ActionError::InvalidArgument(format!("invalid URL '{raw}': {err}")))
}

/// Quote `value` as a JavaScript string literal.
pub fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// Fresh token for one resolution attempt.
pub fn anchor_token() -> String {
    format!("a-{}", Uuid::new_v4().simple())
}

/// Script that tags the first visible element matching `anchor`.
///
/// Evaluates to `{status: 'ok', selector}` or `{status: 'not-found'}`.
pub fn anchor_script(anchor: &AnchorDescriptor, token: &str) -> String {
    let finder = match anchor {
        AnchorDescriptor::Css { selector } => format!(
            "(() => {{ try {{ return Array.from(document.querySelectorAll({sel})); }} catch (e) {{ return []; }} }})()",
            sel = js_string(selector),
        ),
        AnchorDescriptor::Text { content, exact } => format!(
            r#"(() => {{
                const target = lower({text});
                const exact = {exact};
                const hits = Array.from(document.querySelectorAll('body *')).filter(el => {{
                    const value = lower(labelOf(el));
                    if (!value) return false;
                    return exact ? value === target : value.includes(target);
                }});
                return hits.filter(el => !hits.some(other => other !== el && el.contains(other)));
            }})()"#,
            text = js_string(content),
            exact = if *exact { "true" } else { "false" },
        ),
        AnchorDescriptor::Aria { role, name } => format!(
            r#"(() => {{
                const role = {role};
                const targetName = lower({name});
                const implicit = {{
                    button: 'button,input[type=button],input[type=submit]',
                    link: 'a[href]',
                    textbox: 'input:not([type]),input[type=text],input[type=email],input[type=search],textarea',
                    searchbox: 'input[type=search]',
                }};
                const selector = '[role="' + role + '"]' + (implicit[role] ? ',' + implicit[role] : '');
                return Array.from(document.querySelectorAll(selector))
                    .filter(el => !targetName || lower(labelOf(el)) === targetName);
            }})()"#,
            role = js_string(role),
            name = js_string(name),
        ),
    };

    format!(
        r#"(() => {{
            const attr = {attr};
            const token = {token};
            const lower = (input) => (input || '').trim().toLowerCase();
            const labelOf = (el) => {{
                const label = el.getAttribute('aria-label');
                if (label) return label;
                const own = (el.innerText || el.textContent || '').trim();
                if (own) return own;
                return el.value || el.getAttribute('placeholder') || el.title || '';
            }};
            const isVisible = (el) => {{
                if (!(el instanceof Element)) return false;
                const style = window.getComputedStyle(el);
                if (style.visibility === 'hidden' || style.display === 'none') return false;
                const rect = el.getBoundingClientRect();
                return rect.width > 0 || rect.height > 0 || el.getClientRects().length > 0;
            }};
            const match = {finder}.find(isVisible);
            if (!match) {{
                return {{ status: 'not-found' }};
            }}
            match.setAttribute(attr, token);
            return {{ status: 'ok', selector: '[' + attr + '="' + token + '"]' }};
        }})()"#,
        attr = js_string(ANCHOR_ATTR),
        token = js_string(token),
    )
}

/// Selector returned by an [`anchor_script`] evaluation, if it matched.
pub fn extract_selector(value: &Value) -> Option<String> {
    match value.get("status").and_then(Value::as_str)? {
        "ok" => value
            .get("selector")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

pub fn scroll_script(direction: ScrollDirection, amount: u32) -> String {
    match direction {
        ScrollDirection::Down => format!("window.scrollBy(0, {amount})"),
        ScrollDirection::Up => format!("window.scrollBy(0, -{amount})"),
        ScrollDirection::Right => format!("window.scrollBy({amount}, 0)"),
        ScrollDirection::Left => format!("window.scrollBy(-{amount}, 0)"),
        ScrollDirection::Top => "window.scrollTo(0, 0)".to_string(),
        ScrollDirection::Bottom => "window.scrollTo(0, document.body.scrollHeight)".to_string(),
    }
}

/// Script returning up to `limit` `{url, text}` pairs for anchors with
/// non-trivial text, hrefs resolved against the document.
pub fn links_script(limit: usize) -> String {
    format!(
        r#"Array.from(document.querySelectorAll('a[href]'))
            .map(a => ({{ url: a.href, text: (a.innerText || a.textContent || '').trim() }}))
            .filter(link => link.url && link.text.length > 1)
            .slice(0, {limit})"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn css_hints_try_css_first() {
        let target = Target::parse("#search-query");
        assert_eq!(
            target.candidates,
            vec![
                AnchorDescriptor::css("#search-query"),
                AnchorDescriptor::text("#search-query", true),
            ]
        );
        assert!(looks_like_css("form > input"));
        assert!(looks_like_css("input[name='q']"));
        assert!(looks_like_css("button.primary"));
        assert!(looks_like_css("ul li:nth-child(2)"));
    }

    #[test]
    fn phrases_try_text_before_css() {
        let target = Target::parse("Sign in");
        assert_eq!(
            target.candidates,
            vec![
                AnchorDescriptor::text("Sign in", true),
                AnchorDescriptor::text("Sign in", false),
                AnchorDescriptor::css("Sign in"),
            ]
        );
        assert!(!looks_like_css("Sign in"));
        assert!(!looks_like_css("about"));
    }

    #[test]
    fn explicit_prefixes_are_honoured() {
        assert_eq!(
            Target::parse("text='Next page'").candidates[0],
            AnchorDescriptor::text("Next page", true)
        );
        assert_eq!(
            Target::parse("css=div.results").candidates,
            vec![AnchorDescriptor::css("div.results")]
        );
        assert_eq!(
            Target::parse(r#"role=button[name="Google Search"]"#).candidates,
            vec![AnchorDescriptor::Aria {
                role: "button".into(),
                name: "Google Search".into(),
            }]
        );
        assert!(Target::parse("   ").is_empty());
    }

    #[test]
    fn normalizes_scheme_less_urls() {
        assert_eq!(normalize_url("example.com").unwrap(), "https://example.com/");
        assert_eq!(
            normalize_url("http://example.com/a?b=1").unwrap(),
            "http://example.com/a?b=1"
        );
        assert!(matches!(normalize_url("  "), Err(ActionError::InvalidArgument(_))));
        assert!(normalize_url("exa mple.com").is_err());
        assert_eq!(
            normalize_url("localhost:3000/app").unwrap(),
            "https://localhost:3000/app"
        );
        assert_eq!(normalize_url("about:blank").unwrap(), "about:blank");
    }

    #[test]
    fn anchor_script_escapes_content() {
        let script = anchor_script(&AnchorDescriptor::text("say \"hi\"", false), "tok");
        assert!(script.contains(r#"lower("say \"hi\"")"#));
        assert!(script.contains(r#"const token = "tok";"#));
        assert!(script.contains(ANCHOR_ATTR));
    }

    #[test]
    fn reads_selector_from_script_result() {
        let ok = json!({"status": "ok", "selector": "[data-webpilot-anchor=\"t\"]"});
        assert_eq!(
            extract_selector(&ok).as_deref(),
            Some("[data-webpilot-anchor=\"t\"]")
        );
        assert_eq!(extract_selector(&json!({"status": "not-found"})), None);
        assert_eq!(extract_selector(&json!(null)), None);
    }

    #[test]
    fn overlay_anchors_start_with_known_consent_buttons() {
        let anchors = overlay_dismiss_anchors();
        assert_eq!(anchors[0], AnchorDescriptor::css("#L2AGLb"));
        assert!(anchors.contains(&AnchorDescriptor::text("I agree", true)));
        assert_eq!(
            anchors.last(),
            Some(&AnchorDescriptor::css(".consent button"))
        );
    }

    #[test]
    fn scroll_scripts_cover_directions() {
        assert_eq!(scroll_script(ScrollDirection::Down, 300), "window.scrollBy(0, 300)");
        assert_eq!(scroll_script(ScrollDirection::Left, 50), "window.scrollBy(-50, 0)");
        assert_eq!(scroll_script(ScrollDirection::Top, 300), "window.scrollTo(0, 0)");
    }
}
