use std::env;
use std::path::PathBuf;
use std::time::Duration;

use which::which;

/// Launch and interaction settings for [`crate::ChromiumSession`].
#[derive(Clone, Debug)]
pub struct ChromiumConfig {
    /// Explicit browser binary; detected when `None`.
    pub executable: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
    pub headless: bool,
    pub no_sandbox: bool,
    pub viewport: (u32, u32),
    pub launch_timeout: Duration,
    /// Per-command DevTools deadline.
    pub request_timeout: Duration,
    /// How long target resolution keeps retrying before giving up.
    pub element_timeout: Duration,
    /// Visible-text cap for observations and extraction.
    pub max_text_chars: usize,
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            executable: None,
            user_data_dir: None,
            headless: false,
            no_sandbox: env_flag("WEBPILOT_DISABLE_SANDBOX"),
            viewport: (1920, 1080),
            launch_timeout: Duration::from_secs(20),
            request_timeout: Duration::from_secs(30),
            element_timeout: Duration::from_secs(10),
            max_text_chars: 2000,
        }
    }
}

impl ChromiumConfig {
    pub(crate) fn resolve_executable(&self) -> Option<PathBuf> {
        match &self.executable {
            Some(path) if !path.as_os_str().is_empty() => Some(path.clone()),
            _ => detect_chrome_executable(),
        }
    }

    pub(crate) fn launch_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "--disable-background-networking",
            "--disable-background-timer-throttling",
            "--disable-breakpad",
            "--disable-client-side-phishing-detection",
            "--disable-component-update",
            "--disable-default-apps",
            "--disable-dev-shm-usage",
            "--disable-extensions",
            "--disable-hang-monitor",
            "--disable-popup-blocking",
            "--disable-prompt-on-repost",
            "--disable-sync",
            "--no-first-run",
            "--no-default-browser-check",
            "--password-store=basic",
            "--use-mock-keychain",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect();
        if self.headless {
            args.push("--hide-scrollbars".to_string());
            args.push("--mute-audio".to_string());
        }
        args
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

/// Locate a Chrome/Chromium binary: `WEBPILOT_CHROME`, then `PATH`, then
/// well-known install locations.
pub fn detect_chrome_executable() -> Option<PathBuf> {
    if let Ok(raw) = env::var("WEBPILOT_CHROME") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            let candidate = PathBuf::from(trimmed);
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    for name in chrome_executable_names() {
        if let Ok(path) = which(name) {
            return Some(path);
        }
    }

    os_specific_chrome_paths()
        .into_iter()
        .find(|candidate| candidate.exists())
}

fn chrome_executable_names() -> &'static [&'static str] {
    #[cfg(target_os = "windows")]
    {
        &["chrome.exe", "chromium.exe", "msedge.exe"]
    }

    #[cfg(not(target_os = "windows"))]
    {
        &[
            "google-chrome-stable",
            "google-chrome",
            "chromium",
            "chromium-browser",
        ]
    }
}

fn os_specific_chrome_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let mut paths = Vec::new();
        for key in ["PROGRAMFILES", "PROGRAMFILES(X86)", "LOCALAPPDATA"] {
            if let Ok(root) = env::var(key) {
                let root = PathBuf::from(root.trim());
                paths.push(root.join("Google/Chrome/Application/chrome.exe"));
                paths.push(root.join("Microsoft/Edge/Application/msedge.exe"));
            }
        }
        paths
    }

    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
            PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
        ]
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        vec![
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/chromium-browser"),
            PathBuf::from("/usr/bin/chromium"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_desktop_viewport() {
        let cfg = ChromiumConfig::default();
        assert_eq!(cfg.viewport, (1920, 1080));
        assert_eq!(cfg.element_timeout, Duration::from_secs(10));
        assert_eq!(cfg.max_text_chars, 2000);
    }

    #[test]
    fn explicit_executable_wins() {
        let cfg = ChromiumConfig {
            executable: Some(PathBuf::from("/opt/chrome/chrome")),
            ..ChromiumConfig::default()
        };
        assert_eq!(
            cfg.resolve_executable(),
            Some(PathBuf::from("/opt/chrome/chrome"))
        );
    }

    #[test]
    fn headless_adds_quiet_flags() {
        let headful = ChromiumConfig::default().launch_args();
        let headless = ChromiumConfig {
            headless: true,
            ..ChromiumConfig::default()
        }
        .launch_args();
        assert!(!headful.iter().any(|arg| arg == "--mute-audio"));
        assert!(headless.iter().any(|arg| arg == "--mute-audio"));
    }
}
