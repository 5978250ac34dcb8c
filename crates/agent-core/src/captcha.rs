//! Heuristic CAPTCHA gate.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;
use webpilot_core_types::Observation;

/// Verdict for one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaVerdict {
    /// A challenge is on screen; carries the matched signature.
    Present(String),
    Absent,
}

impl CaptchaVerdict {
    pub fn is_present(&self) -> bool {
        matches!(self, CaptchaVerdict::Present(_))
    }
}

pub trait CaptchaDetector: Send + Sync {
    fn detect(&self, observation: &Observation) -> CaptchaVerdict;
}

static TEXT_SIGNATURES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "verify you're a human",
        "verify you are a human",
        "verify you are human",
        "are you a robot",
        "i'm not a robot",
        "prove you're human",
        "human verification",
        "enter the characters",
        "unusual traffic from your computer network",
        "complete the security check",
        "checking your browser before accessing",
        "press and hold",
        "请输入验证码",
        "安全验证",
        "人机验证",
    ]
});

/// Challenge endpoints, matched against host and path only.
static URL_SIGNATURES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(google\.[a-z.]+/sorry/|/recaptcha/|hcaptcha\.com|challenges\.cloudflare\.com|/cdn-cgi/challenge-platform/|wappass\.baidu\.com|verify\.baidu\.com|/captcha(/|$))",
    )
    .expect("captcha url pattern is valid")
});

/// Titles that are nothing but a challenge interstitial.
static TITLE_SIGNATURES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(just a moment|attention required|captcha|security check)\b")
        .expect("captcha title pattern is valid")
});

/// Matches known challenge pages by URL, title and visible text.
#[derive(Debug, Default, Clone)]
pub struct SignatureCaptchaDetector;

impl CaptchaDetector for SignatureCaptchaDetector {
    fn detect(&self, observation: &Observation) -> CaptchaVerdict {
        if let Some(found) = URL_SIGNATURES.find(&host_and_path(&observation.url)) {
            return CaptchaVerdict::Present(format!("url matches '{}'", found.as_str()));
        }
        if let Some(title) = observation.title.as_deref() {
            if TITLE_SIGNATURES.is_match(title) {
                return CaptchaVerdict::Present(format!("title '{title}'"));
            }
        }
        let text = observation.visible_text.to_lowercase();
        TEXT_SIGNATURES
            .iter()
            .find(|pattern| text.contains(*pattern))
            .map(|pattern| CaptchaVerdict::Present(format!("page text contains '{pattern}'")))
            .unwrap_or(CaptchaVerdict::Absent)
    }
}

/// `host/path` without query or fragment, so search terms never match.
fn host_and_path(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => format!("{}{}", url.host_str().unwrap_or_default(), url.path()),
        Err(_) => raw.split(['?', '#']).next().unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observe(url: &str, title: Option<&str>, text: &str) -> Observation {
        Observation::new(url, title.map(str::to_string), text)
    }

    #[test]
    fn flags_google_sorry_page() {
        let verdict = SignatureCaptchaDetector.detect(&observe(
            "https://www.google.com/sorry/index?continue=x",
            None,
            "",
        ));
        assert!(verdict.is_present());
    }

    #[test]
    fn flags_challenge_text_and_titles() {
        let detector = SignatureCaptchaDetector;
        assert!(detector
            .detect(&observe("https://shop.test/", None, "Please verify you are a HUMAN to continue"))
            .is_present());
        assert!(detector
            .detect(&observe("https://shop.test/", Some("Just a moment..."), ""))
            .is_present());
    }

    #[test]
    fn ordinary_pages_pass() {
        let detector = SignatureCaptchaDetector;
        assert_eq!(
            detector.detect(&observe(
                "https://www.google.com/search?q=rust",
                Some("rust - Google Search"),
                "The Rust Programming Language"
            )),
            CaptchaVerdict::Absent
        );
        assert_eq!(
            detector.detect(&observe("https://blog.test/recaptchas-explained", None, "")),
            CaptchaVerdict::Absent
        );
    }

    #[test]
    fn captcha_in_query_or_article_path_passes() {
        let detector = SignatureCaptchaDetector;
        for url in [
            "https://www.google.com/search?q=captcha",
            "https://www.google.com/search?q=how+does+recaptcha+work#captcha",
            "https://docs.test/captcha-guide",
            "https://docs.test/guides/solving_captcha",
        ] {
            assert_eq!(
                detector.detect(&observe(url, Some("Results"), "ten blue links")),
                CaptchaVerdict::Absent,
                "{url}"
            );
        }
    }

    #[test]
    fn captcha_endpoints_are_flagged() {
        let detector = SignatureCaptchaDetector;
        for url in [
            "https://shop.test/captcha",
            "https://shop.test/captcha/?return=/cart",
            "https://www.google.com/recaptcha/api2/anchor?k=x",
            "https://challenges.cloudflare.com/turnstile/v0",
        ] {
            assert!(detector.detect(&observe(url, None, "")).is_present(), "{url}");
        }
    }
}
