//! Application configuration.
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! YAML/JSON file, then `WEBPILOT__SECTION__KEY` environment variables.
//! Command-line flags are applied last by the caller.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use agent_core::AgentLoopConfig;
use cdp_adapter::ChromiumConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::AppError;

/// Env var consulted before the configured key variable.
pub const PRIMARY_KEY_ENV: &str = "WEBPILOT_API_KEY";
const ENV_PREFIX: &str = "WEBPILOT";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub browser: BrowserSettings,
    pub oracle: OracleSettings,
    pub agent: AgentLoopConfig,
    pub memory: MemorySettings,
    pub debug: DebugSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Chrome/Chromium binary; detected when unset.
    pub executable: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
    pub no_sandbox: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub launch_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub element_timeout_secs: u64,
    pub max_text_chars: usize,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        let chromium = ChromiumConfig::default();
        Self {
            headless: chromium.headless,
            executable: None,
            user_data_dir: None,
            no_sandbox: chromium.no_sandbox,
            viewport_width: chromium.viewport.0,
            viewport_height: chromium.viewport.1,
            launch_timeout_secs: chromium.launch_timeout.as_secs(),
            request_timeout_secs: chromium.request_timeout.as_secs(),
            element_timeout_secs: chromium.element_timeout.as_secs(),
            max_text_chars: chromium.max_text_chars,
        }
    }
}

impl BrowserSettings {
    pub fn to_chromium(&self) -> ChromiumConfig {
        ChromiumConfig {
            executable: self.executable.clone(),
            user_data_dir: self.user_data_dir.clone(),
            headless: self.headless,
            no_sandbox: self.no_sandbox,
            viewport: (self.viewport_width, self.viewport_height),
            launch_timeout: Duration::from_secs(self.launch_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            element_timeout: Duration::from_secs(self.element_timeout_secs),
            max_text_chars: self.max_text_chars,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    /// `openai` for any OpenAI-compatible endpoint, `mock` for offline runs.
    pub provider: String,
    pub api_base: String,
    pub model: String,
    /// Env var holding the key (or comma-separated keys) after
    /// `WEBPILOT_API_KEY`.
    pub api_key_env: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            temperature: 0.2,
            request_timeout_secs: 90,
        }
    }
}

impl OracleSettings {
    /// Keys in rotation order. `WEBPILOT_API_KEY` wins over `api_key_env`;
    /// either may hold several comma-separated keys.
    pub fn resolve_api_keys(&self) -> Result<Vec<String>, AppError> {
        for var in [PRIMARY_KEY_ENV, self.api_key_env.as_str()] {
            if var.is_empty() {
                continue;
            }
            let keys: Vec<String> = env::var(var)
                .map(|raw| raw.split(',').filter_map(sanitize_secret).collect())
                .unwrap_or_default();
            if !keys.is_empty() {
                return Ok(keys);
            }
        }
        Err(AppError::MissingApiKey(format!(
            "{PRIMARY_KEY_ENV} or {}",
            self.api_key_env
        )))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    pub path: PathBuf,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("memory.json"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    pub enabled: bool,
    /// Screenshots and `webpilot.log` land here in debug mode.
    pub artifacts_dir: PathBuf,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            artifacts_dir: PathBuf::from("screenshots"),
        }
    }
}

pub struct LoadedConfig {
    pub config: AppConfig,
    /// File that was consulted, whether or not it existed.
    pub path: PathBuf,
}

/// Resolve the config file: explicit path, then `./config/config.yaml`,
/// then `<config dir>/webpilot/config.yaml`.
pub fn default_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let local = PathBuf::from("config/config.yaml");
    if local.exists() {
        return local;
    }
    dirs::config_dir()
        .map(|dir| dir.join("webpilot").join("config.yaml"))
        .unwrap_or(local)
}

pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, AppError> {
    let path = default_config_path(explicit);
    if explicit.is_some() && !path.exists() {
        return Err(AppError::invalid(
            "config",
            format!("{} does not exist", path.display()),
        ));
    }
    let config = build_config(&path)?;
    Ok(LoadedConfig { config, path })
}

fn build_config(path: &Path) -> Result<AppConfig, AppError> {
    let settings = Config::builder()
        .add_source(Config::try_from(&AppConfig::default())?)
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    let config: AppConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

impl AppConfig {
    fn validate(&self) -> Result<(), AppError> {
        if self.agent.max_iterations == 0 {
            return Err(AppError::invalid("agent.max_iterations", "must be at least 1"));
        }
        if self.memory.path.as_os_str().is_empty() {
            return Err(AppError::invalid("memory.path", "must not be empty"));
        }
        Ok(())
    }
}

/// Load `KEY=VALUE` lines from `.env` into the process environment without
/// overriding variables that are already set.
pub fn load_local_env_overrides(path: &Path) {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return,
    };
    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            warn!(line = idx + 1, "invalid .env entry; skipping");
            continue;
        };
        let key = key.trim();
        if key.is_empty() || env::var(key).is_ok() {
            continue;
        }
        env::set_var(key, unescape_value(value.trim()));
    }
    info!(path = %path.display(), "loaded environment overrides");
}

fn unescape_value(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let inner = &value[1..value.len() - 1];
        inner
            .replace("\\\"", "\"")
            .replace("\\n", "\n")
            .replace("\\t", "\t")
    } else {
        value.trim_matches('\'').to_string()
    }
}

fn sanitize_secret(value: &str) -> Option<String> {
    let unquoted = value.trim().trim_matches(|c| c == '"' || c == '\'');
    if unquoted.is_empty() || !unquoted.chars().any(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let lowered = unquoted.to_ascii_lowercase();
    if matches!(
        lowered.as_str(),
        "your-api-key" | "your_api_key_here" | "replace-me" | "changeme" | "todo"
    ) {
        return None;
    }
    Some(unquoted.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn with_env_vars<F: FnOnce() -> T, T>(vars: &[(&str, Option<&str>)], f: F) -> T {
        let mut previous = Vec::new();
        for (key, value) in vars {
            previous.push((key.to_string(), env::var(key).ok()));
            match value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
        let result = f();
        for (key, value) in previous {
            match value {
                Some(val) => env::set_var(&key, val),
                None => env::remove_var(&key),
            }
        }
        result
    }

    #[test]
    #[serial]
    fn defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = build_config(&dir.path().join("missing.yaml")).unwrap();
        assert_eq!(config.agent.max_iterations, 30);
        assert_eq!(config.agent.max_errors, 3);
        assert_eq!(config.agent.start_url, "https://www.google.com");
        assert_eq!(config.memory.path, PathBuf::from("memory.json"));
        assert_eq!(config.browser.viewport_width, 1920);
        assert_eq!(config.oracle.api_key_env, "GEMINI_API_KEY");
    }

    #[test]
    #[serial]
    fn file_then_env_layers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "agent:\n  max_iterations: 12\n  max_errors: 4\nbrowser:\n  headless: true").unwrap();

        let config = with_env_vars(&[("WEBPILOT__AGENT__MAX_ERRORS", Some("7"))], || {
            build_config(&path).unwrap()
        });
        assert_eq!(config.agent.max_iterations, 12);
        assert_eq!(config.agent.max_errors, 7);
        assert!(config.browser.headless);
        assert_eq!(config.agent.repetition_threshold, 3);
    }

    #[test]
    #[serial]
    fn zero_iterations_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "agent:\n  max_iterations: 0\n").unwrap();
        let err = build_config(&path).unwrap_err();
        assert!(err.to_string().contains("agent.max_iterations"));
    }

    #[test]
    #[serial]
    fn api_keys_prefer_primary_and_split() {
        let settings = OracleSettings::default();
        let keys = with_env_vars(
            &[
                (PRIMARY_KEY_ENV, Some("sk-one, sk-two")),
                ("GEMINI_API_KEY", Some("gm-key")),
            ],
            || settings.resolve_api_keys().unwrap(),
        );
        assert_eq!(keys, vec!["sk-one", "sk-two"]);

        let keys = with_env_vars(
            &[(PRIMARY_KEY_ENV, None), ("GEMINI_API_KEY", Some("gm-key"))],
            || settings.resolve_api_keys().unwrap(),
        );
        assert_eq!(keys, vec!["gm-key"]);

        let err = with_env_vars(
            &[
                (PRIMARY_KEY_ENV, Some("YOUR_API_KEY_HERE")),
                ("GEMINI_API_KEY", None),
            ],
            || settings.resolve_api_keys().unwrap_err(),
        );
        assert!(matches!(err, AppError::MissingApiKey(_)));
    }

    #[test]
    fn sanitize_secret_filters_placeholders() {
        assert!(sanitize_secret("  ").is_none());
        assert!(sanitize_secret("...").is_none());
        assert!(sanitize_secret("your-api-key").is_none());
        assert_eq!(sanitize_secret(" 'sk-123' "), Some("sk-123".to_string()));
    }

    #[test]
    fn unescapes_quoted_values() {
        assert_eq!(unescape_value("\"a\\nb\""), "a\nb");
        assert_eq!(unescape_value("'plain'"), "plain");
        assert_eq!(unescape_value("bare"), "bare");
    }
}
