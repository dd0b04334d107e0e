use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GatewayError;
use crate::models::{ModelId, TokenUsage};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const PLACEHOLDER_API_KEY: &str = "your_api_key_here";
const APP_TITLE: &str = "Scribe Pipeline";

/// Configuration for the OpenRouter gateway
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API key (from OPENROUTER_API_KEY env var)
    pub api_key: Option<String>,
    /// API base URL, overridable for proxies
    pub base_url: String,
    /// Sent as HTTP-Referer for provider attribution
    pub site_url: String,
}

impl GatewayConfig {
    /// Create config from environment variables.
    ///
    /// A missing key is not an error here; calls fail with `NotConfigured` instead.
    pub fn from_env() -> Self {
        let api_key = std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty() && k != PLACEHOLDER_API_KEY);

        Self {
            api_key,
            base_url: std::env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            site_url: std::env::var("SCRIBE_SITE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        }
    }

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            site_url: "http://localhost:3000".to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A single model call
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub model: ModelId,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    /// Ask for `json_object` output; ignored for models without JSON mode
    pub json_mode: bool,
}

impl ModelRequest {
    pub fn new(model: ModelId, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            model,
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature: 0.2,
            json_mode: false,
        }
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    /// Content of the first message with the given role
    pub fn message(&self, role: Role) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == role)
            .map(|m| m.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// Uniform, timeout-bounded call interface to a text-generation provider.
///
/// Implementations do not retry; fallback policy belongs to the stages.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, GatewayError>;
}

/// OpenRouter chat-completions client
pub struct OpenRouterClient {
    client: Client,
    config: GatewayConfig,
}

impl OpenRouterClient {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn send(
        &self,
        api_key: &str,
        body: &ChatRequest<'_>,
    ) -> Result<ModelResponse, GatewayError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.config.site_url)
            .header("X-Title", APP_TITLE)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::api(status, &body));
        }

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let usage = response
            .usage
            .map(|u| TokenUsage {
                input: u.prompt_tokens,
                output: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(ModelResponse { content, usage })
    }
}

#[async_trait]
impl ModelGateway for OpenRouterClient {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, GatewayError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(GatewayError::NotConfigured)?;

        let timeout = request.model.timeout();
        let body = chat_body(&request);

        debug!(
            "Calling {} (timeout {}s, json_mode={})",
            request.model,
            timeout.as_secs(),
            body.response_format.is_some()
        );

        match tokio::time::timeout(timeout, self.send(api_key, &body)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(timeout)),
        }
    }
}

/// Wire body for a request; JSON mode only for models that support it
fn chat_body(request: &ModelRequest) -> ChatRequest<'_> {
    ChatRequest {
        model: request.model.as_str(),
        messages: &request.messages,
        temperature: request.temperature,
        response_format: (request.json_mode && request.model.supports_json_mode()).then_some(
            ResponseFormat {
                format_type: "json_object",
            },
        ),
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'static str,
    messages: &'a [ChatMessage],
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_client_fails_without_network() {
        let client = OpenRouterClient::new(GatewayConfig {
            api_key: None,
            base_url: "http://127.0.0.1:9".to_string(),
            site_url: "http://localhost".to_string(),
        });

        let err = client
            .complete(ModelRequest::new(ModelId::ClaudeHaiku4, "sys", "user"))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::NotConfigured));
    }

    #[test]
    fn test_json_mode_omitted_for_unsupported_model() {
        let request = ModelRequest::new(ModelId::KimiK2, "sys", "user").json();

        let json = serde_json::to_value(chat_body(&request)).unwrap();

        assert!(json.get("response_format").is_none());
        assert_eq!(json["model"], "moonshotai/kimi-k2");
        assert_eq!(json["messages"][0]["role"], "system");
    }

    #[test]
    fn test_json_mode_sent_for_supported_model() {
        let request = ModelRequest::new(ModelId::ClaudeHaiku4, "sys", "user")
            .temperature(0.0)
            .json();

        let json = serde_json::to_value(chat_body(&request)).unwrap();

        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["messages"][1]["content"], "user");
    }

    #[test]
    fn test_json_mode_not_requested_is_omitted() {
        let request = ModelRequest::new(ModelId::ClaudeHaiku4, "sys", "user");
        let json = serde_json::to_value(chat_body(&request)).unwrap();
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn test_parse_chat_response_with_usage() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.choices[0].message.content.as_deref(), Some("hello"));
        assert_eq!(response.usage.unwrap().prompt_tokens, 12);
    }
}
