//! Adapter for OpenAI-compatible `/chat/completions` endpoints
//! (Perplexity by default).

use std::time::Duration;

use nova_types::models::ContextEntry;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{ChatProvider, Completion, CompletionRequest, ProviderError};

pub const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";
pub const DEFAULT_MODEL: &str = "llama-3.1-sonar-small-128k-online";

/// Delay before retry `n` is `RETRY_BASE_DELAY * n`.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// `None` leaves the transport default in place.
    pub timeout: Option<Duration>,
    /// Extra attempts after the first one. Zero means a single attempt.
    pub max_retries: u32,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            timeout: None,
            max_retries: 0,
        }
    }
}

pub struct CompletionsProvider {
    url: String,
    api_key: String,
    model: String,
    max_retries: u32,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ContextEntry],
    temperature: f32,
    top_p: f32,
    presence_penalty: f32,
    frequency_penalty: f32,
    stream: bool,
}

impl CompletionsProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::Config("API key is empty".into()));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        Ok(Self {
            url: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key,
            model: config.model,
            max_retries: config.max_retries,
            client,
        })
    }

    async fn send_once(&self, body: &ChatCompletionBody<'_>) -> Result<Completion, ProviderError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let value: Value =
            serde_json::from_str(&text).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        parse_completion(&value)
    }
}

#[async_trait::async_trait]
impl ChatProvider for CompletionsProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.sampling.temperature,
            top_p: request.sampling.top_p,
            presence_penalty: request.sampling.presence_penalty,
            frequency_penalty: request.sampling.frequency_penalty,
            stream: false,
        };

        let mut attempt = 0;
        loop {
            debug!(url = %self.url, entries = request.messages.len(), attempt, "Calling provider");
            match self.send_once(&body).await {
                Ok(completion) => return Ok(completion),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "Provider call failed, retrying");
                    tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Pulls `choices[0].message.content` and the optional top-level
/// `citations` array out of a completion body.
fn parse_completion(body: &Value) -> Result<Completion, ProviderError> {
    let text = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| ProviderError::Malformed("missing choices[0].message.content".into()))?
        .to_string();

    let citations = body
        .get("citations")
        .and_then(|c| c.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(url) => Some(url.clone()),
                    Value::Object(obj) => obj.get("url").and_then(|u| u.as_str()).map(String::from),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Completion { text, citations })
}
