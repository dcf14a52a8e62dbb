use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("response contained no choices")]
    EmptyResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
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

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Anything that turns a conversation into a single assistant reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(client: Client, api_key: String, base_url: String, model: String) -> Self {
        Self {
            client,
            api_key,
            base_url,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat_completion(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let backoff_config = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            "sending chat completion request"
        );

        // 429 and 5xx are retried, everything else fails immediately
        let operation = || async {
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .timeout(Duration::from_secs(60))
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_connect() || e.is_timeout() {
                        tracing::warn!("OpenAI connection error (retrying): {}", e);
                        backoff::Error::transient(LlmError::Request(e.to_string()))
                    } else {
                        backoff::Error::permanent(LlmError::Request(e.to_string()))
                    }
                })?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| backoff::Error::permanent(LlmError::Request(e.to_string())))?;

            if status.as_u16() == 429 || status.is_server_error() {
                tracing::warn!("OpenAI returned {} (retrying)", status);
                return Err(backoff::Error::transient(LlmError::Api {
                    status: status.as_u16(),
                    body: text,
                }));
            }

            if !status.is_success() {
                return Err(backoff::Error::permanent(LlmError::Api {
                    status: status.as_u16(),
                    body: text,
                }));
            }

            serde_json::from_str::<ChatCompletionResponse>(&text)
                .map_err(|e| backoff::Error::permanent(LlmError::Parse(e.to_string())))
        };

        let parsed = retry(backoff_config, operation).await?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        self.chat_completion(&request).await
    }
}
