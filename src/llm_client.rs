//! LLM client
//!
//! The pipelines talk to language models through [`LanguageModel`]. The
//! shipped implementation speaks the OpenAI-compatible chat completions API
//! and requests structured output with a `json_schema` response format.

use async_trait::async_trait;
use reqwest::Client;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::marshal::ValidatedRecord;
use crate::util::key_preview;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("LLM request failed: {0}")]
    Transport(String),

    #[error("LLM API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model returned no schema-conforming output: {0}")]
    Refusal(String),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },
}

/// LLM connection settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

// Custom Debug implementation that redacts the API key
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &"[REDACTED]")
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            max_tokens: 4096,
            temperature: 0.0,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// JSON schema the model's answer must conform to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
}

impl ResponseSchema {
    pub fn of<T: ValidatedRecord + JsonSchema>() -> Self {
        Self {
            name: T::NAME.to_string(),
            schema: serde_json::json!(schemars::schema_for!(T)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionContent {
    Text(String),
    Structured(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: CompletionContent,
    pub usage: TokenUsage,
}

impl Completion {
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            CompletionContent::Text(text) => Some(text),
            CompletionContent::Structured(_) => None,
        }
    }

    pub fn structured(&self) -> Option<&Value> {
        match &self.content {
            CompletionContent::Structured(value) => Some(value),
            CompletionContent::Text(_) => None,
        }
    }
}

/// A chat model. One call is one attempt; retries are the caller's business.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        schema: Option<&ResponseSchema>,
    ) -> Result<Completion, UpstreamError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

/// OpenAI-compatible chat completions client
pub struct OpenAiClient {
    client: Client,
    config: LlmConfig,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UpstreamError::Transport(format!("failed to create HTTP client: {}", e)))?;

        info!(
            "LLM client: api_base={}, api_key={}",
            config.api_base,
            key_preview(&config.api_key)
        );
        Ok(Self { client, config })
    }

    fn response_format(schema: &ResponseSchema) -> Value {
        serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema.name,
                "schema": schema.schema,
                "strict": false
            }
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        schema: Option<&ResponseSchema>,
    ) -> Result<Completion, UpstreamError> {
        debug!(
            "Calling LLM: model={}, messages={}, schema={:?}",
            model,
            messages.len(),
            schema.map(|s| s.name.as_str())
        );

        let request = ChatRequest {
            model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: schema.map(Self::response_format),
        };

        let resp = self
            .client
            .post(format!(
                "{}/chat/completions",
                self.config.api_base.trim_end_matches('/')
            ))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    UpstreamError::Timeout {
                        stage: "llm",
                        secs: self.config.timeout_secs,
                    }
                } else {
                    UpstreamError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| UpstreamError::Transport(format!("invalid response body: {}", e)))?;

        let usage = chat.usage.unwrap_or_default();
        let message = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| UpstreamError::Refusal("response has no choices".to_string()))?;

        if let Some(refusal) = message.refusal {
            return Err(UpstreamError::Refusal(refusal));
        }
        let content = message
            .content
            .ok_or_else(|| UpstreamError::Refusal("response has no content".to_string()))?;

        debug!(
            "LLM response: {} chars, usage={}/{}",
            content.len(),
            usage.prompt_tokens,
            usage.completion_tokens
        );

        let content = match schema {
            None => CompletionContent::Text(content),
            Some(schema) => {
                let value: Value = serde_json::from_str(content.trim()).map_err(|e| {
                    UpstreamError::Refusal(format!(
                        "output for `{}` is not JSON: {}",
                        schema.name, e
                    ))
                })?;
                CompletionContent::Structured(value)
            }
        };

        Ok(Completion { content, usage })
    }
}
