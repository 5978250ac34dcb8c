use std::time::Duration;

use agent_core::{
    format_system_prompt, format_user_message, parse_decision, AgentDecision, DecisionError,
    OracleError, OracleRequest, ReasoningOracle,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Tried in order; a 429 moves on to the next key.
    pub api_keys: Vec<String>,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub timeout: Duration,
}

/// Vision oracle over any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiOracle {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiOracle {
    pub fn new(config: OpenAiConfig) -> Result<Self, AppError> {
        if config.api_keys.is_empty() {
            return Err(AppError::MissingApiKey("an API key for the oracle".to_string()));
        }
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        )
    }

    fn build_body(&self, request: &OracleRequest) -> ChatCompletionRequest {
        let mut parts = vec![ContentPart::Text {
            text: format_user_message(request),
        }];
        if let Some(screenshot) = &request.observation.screenshot {
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/png;base64,{}", Base64.encode(&screenshot.png)),
                },
            });
        }
        ChatCompletionRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                r#type: "json_object".to_string(),
            },
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: MessageContent::Text(format_system_prompt(&request.mode)),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: MessageContent::Parts(parts),
                },
            ],
        }
    }
}

#[async_trait]
impl ReasoningOracle for OpenAiOracle {
    async fn decide(&self, request: &OracleRequest) -> Result<AgentDecision, OracleError> {
        let url = self.endpoint();
        let body = self.build_body(request);

        let mut last_error: Option<OracleError> = None;
        for (index, key) in self.config.api_keys.iter().enumerate() {
            let response = match self
                .client
                .post(&url)
                .bearer_auth(key)
                .json(&body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(err) => {
                    last_error = Some(OracleError::transport(format!("request failed: {err}")));
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<response unavailable>".to_string());
                if status == StatusCode::TOO_MANY_REQUESTS
                    && index + 1 < self.config.api_keys.len()
                {
                    let friendly = rate_limit_message(&text);
                    warn!(
                        target: "oracle",
                        message = %friendly,
                        attempt = index + 1,
                        remaining = self.config.api_keys.len() - index - 1,
                        "oracle rate limited; switching API key"
                    );
                    last_error = Some(OracleError::unavailable(friendly));
                    continue;
                }
                if status == StatusCode::TOO_MANY_REQUESTS {
                    return Err(OracleError::unavailable(rate_limit_message(&text)));
                }
                return Err(OracleError::transport(format!("oracle returned {status}: {text}")));
            }

            let response: ChatCompletionResponse = response
                .json()
                .await
                .map_err(|err| OracleError::transport(format!("response invalid: {err}")))?;
            if let Some(usage) = &response.usage {
                debug!(
                    target: "oracle",
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "oracle usage"
                );
            }
            let content = response
                .choices
                .first()
                .and_then(|choice| choice.message.content.as_ref())
                .and_then(ResponseContent::as_text)
                .ok_or(OracleError::Malformed(DecisionError::Empty))?;

            return Ok(parse_decision(&content)?);
        }

        Err(last_error.unwrap_or_else(|| OracleError::unavailable("all API keys exhausted")))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    temperature: f32,
    response_format: ResponseFormat,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResponseContent {
    Text(String),
    Parts(Vec<ResponsePart>),
}

impl ResponseContent {
    fn as_text(&self) -> Option<String> {
        let text = match self {
            ResponseContent::Text(value) => value.clone(),
            ResponseContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        };
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: Option<String>,
}

/// Error body, plain or wrapped in a one-element array by some gateways.
/// `Wrapped` must stay first: a struct also deserializes from a JSON array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Wrapped(Vec<ErrorEnvelope>),
    Plain(ErrorEnvelope),
}

fn rate_limit_message(raw: &str) -> String {
    let message = match serde_json::from_str::<ErrorBody>(raw) {
        Ok(ErrorBody::Wrapped(list)) => list.into_iter().find_map(|envelope| envelope.error.message),
        Ok(ErrorBody::Plain(envelope)) => envelope.error.message,
        Err(_) => None,
    };
    match message {
        Some(message) => format!("rate limit exceeded: {}", message.trim()),
        None => "rate limit exceeded; retry later".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{Action, RunMode};
    use memory_center::MemoryRecord;
    use webpilot_core_types::{Observation, Task};

    fn oracle() -> OpenAiOracle {
        OpenAiOracle::new(OpenAiConfig {
            api_keys: vec!["sk-test".into()],
            model: "vision-model".into(),
            api_base: "http://127.0.0.1:9/v1/".into(),
            temperature: 0.2,
            timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    fn request(screenshot: bool) -> OracleRequest {
        let mut observation = Observation::new("https://example.com/", Some("Example".into()), "Hello");
        if screenshot {
            observation = observation.with_screenshot(vec![0x89, b'P', b'N', b'G']);
        }
        OracleRequest {
            observation,
            task: Task::new("say hello").unwrap(),
            memory: MemoryRecord::new(),
            history: Vec::new(),
            notes: Vec::new(),
            mode: RunMode::Task,
        }
    }

    #[test]
    fn rejects_empty_key_list() {
        let err = OpenAiOracle::new(OpenAiConfig {
            api_keys: Vec::new(),
            model: "m".into(),
            api_base: "http://localhost".into(),
            temperature: 0.0,
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(err, Err(AppError::MissingApiKey(_))));
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(oracle().endpoint(), "http://127.0.0.1:9/v1/chat/completions");
    }

    #[test]
    fn screenshot_becomes_data_uri_part() {
        let body = serde_json::to_value(oracle().build_body(&request(true))).unwrap();
        let parts = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts[0]["type"], "text");
        assert!(parts[0]["text"].as_str().unwrap().contains("say hello"));
        assert_eq!(parts[1]["type"], "image_url");
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn text_only_without_screenshot() {
        let body = serde_json::to_value(oracle().build_body(&request(false))).unwrap();
        let parts = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn response_parts_are_joined() {
        let content: ResponseContent =
            serde_json::from_str(r#"[{"type":"text","text":"{\"action\":"},{"type":"text","text":"\"wait\"}"}]"#)
                .unwrap();
        let text = content.as_text().unwrap();
        let decision = parse_decision(&text).unwrap();
        assert!(matches!(decision.action, Action::Wait { .. }));
    }

    #[test]
    fn rate_limit_message_reads_envelope() {
        let raw = r#"{"error":{"message":"Quota exceeded "}}"#;
        assert_eq!(rate_limit_message(raw), "rate limit exceeded: Quota exceeded");
        let wrapped = r#"[{"error":{"message":"slow down"}}]"#;
        assert_eq!(rate_limit_message(wrapped), "rate limit exceeded: slow down");
        assert_eq!(rate_limit_message("nope"), "rate limit exceeded; retry later");
        assert_eq!(rate_limit_message("[]"), "rate limit exceeded; retry later");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let err = oracle().decide(&request(false)).await.unwrap_err();
        assert!(matches!(err, OracleError::Transport(_)));
    }
}
