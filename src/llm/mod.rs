//! Reasoning oracle construction.

pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use agent_core::{MockOracle, ReasoningOracle};
use tracing::info;

use crate::config::OracleSettings;
use crate::errors::AppError;

pub use openai::{OpenAiConfig, OpenAiOracle};

/// Build the oracle named by `settings.provider`.
pub fn build_oracle(settings: &OracleSettings) -> Result<Arc<dyn ReasoningOracle>, AppError> {
    match settings.provider.trim().to_ascii_lowercase().as_str() {
        "openai" | "gemini" => {
            let api_keys = settings.resolve_api_keys()?;
            info!(
                model = %settings.model,
                api_base = %settings.api_base,
                keys = api_keys.len(),
                "using OpenAI-compatible oracle"
            );
            let oracle = OpenAiOracle::new(OpenAiConfig {
                api_keys,
                model: settings.model.clone(),
                api_base: settings.api_base.clone(),
                temperature: settings.temperature,
                timeout: Duration::from_secs(settings.request_timeout_secs),
            })?;
            Ok(Arc::new(oracle))
        }
        "mock" => {
            info!("using mock oracle");
            Ok(Arc::new(MockOracle))
        }
        other => Err(AppError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_needs_no_key() {
        let settings = OracleSettings {
            provider: "Mock".into(),
            ..OracleSettings::default()
        };
        assert!(build_oracle(&settings).is_ok());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let settings = OracleSettings {
            provider: "carrier-pigeon".into(),
            ..OracleSettings::default()
        };
        assert!(matches!(
            build_oracle(&settings),
            Err(AppError::UnknownProvider(name)) if name == "carrier-pigeon"
        ));
    }
}
