//! HTTP completion backend.
//!
//! Speaks the Anthropic Messages API or the OpenAI-compatible chat
//! completions API (DeepSeek, OpenAI, ...), selected from the endpoint URL.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tasklane_core::config::ProviderConfig;
use tracing::debug;

use super::{CompletionProvider, Prompt};
use crate::error::ProviderError;
use crate::text::truncate;

/// Body fragments a provider uses when it refuses the input itself.
const CONTENT_POLICY_MARKERS: &[&str] = &[
    "content_policy",
    "content policy",
    "content_filter",
    "safety",
    "moderation",
];

const QUOTA_MARKERS: &[&str] = &["insufficient_quota", "quota", "billing", "credit balance"];

/// Wire format of the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    Anthropic,
    OpenAI,
}

impl ApiFormat {
    pub fn detect(url: &str) -> Self {
        if url.contains("anthropic.com") {
            ApiFormat::Anthropic
        } else {
            ApiFormat::OpenAI
        }
    }
}

pub struct HttpProvider {
    client: Client,
    name: String,
    api_url: String,
    model: String,
    api_key: Option<String>,
    api_format: ApiFormat,
    timeout: Duration,
    max_tokens: u32,
}

impl HttpProvider {
    pub fn new(
        name: impl Into<String>,
        api_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        max_tokens: u32,
    ) -> Self {
        let api_url = api_url.into();
        let api_format = ApiFormat::detect(&api_url);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            name: name.into(),
            api_url,
            model: model.into(),
            api_key,
            api_format,
            timeout,
            max_tokens,
        }
    }

    /// Build a provider from configuration, resolving the API key from the
    /// inline value or the configured environment variable.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.api_url.clone(),
            config.model.clone(),
            config.resolve_api_key(),
            Duration::from_millis(config.timeout_ms),
            config.max_tokens,
        )
    }

    pub fn api_format(&self) -> ApiFormat {
        self.api_format
    }

    fn transport_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout {
                provider: self.name.clone(),
                after_ms: self.timeout.as_millis() as u64,
            }
        } else {
            ProviderError::Unavailable {
                provider: self.name.clone(),
                message: err.to_string(),
            }
        }
    }

    async fn post<T: Serialize>(
        &self,
        request: &T,
        headers: &[(&str, String)],
    ) -> Result<String, ProviderError> {
        let mut builder = self
            .client
            .post(&self.api_url)
            .header("content-type", "application/json");
        for (key, value) in headers {
            builder = builder.header(*key, value);
        }

        let response = builder
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        debug!(provider = %self.name, status = status.as_u16(), bytes = body.len(), "Provider responded");

        if !status.is_success() {
            return Err(classify_status(&self.name, status.as_u16(), &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl CompletionProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::Auth {
                provider: self.name.clone(),
                message: "no API key configured".to_string(),
            });
        };

        match self.api_format {
            ApiFormat::Anthropic => {
                let request = AnthropicRequest {
                    model: &self.model,
                    max_tokens: self.max_tokens,
                    system: &prompt.system,
                    messages: vec![Message {
                        role: "user",
                        content: &prompt.user,
                    }],
                };
                let headers = [
                    ("x-api-key", api_key.to_string()),
                    ("anthropic-version", "2023-06-01".to_string()),
                ];
                let body = self.post(&request, &headers).await?;
                parse_anthropic(&self.name, &body)
            }
            ApiFormat::OpenAI => {
                let request = OpenAIRequest {
                    model: &self.model,
                    max_tokens: self.max_tokens,
                    temperature: 0.0,
                    messages: vec![
                        Message {
                            role: "system",
                            content: &prompt.system,
                        },
                        Message {
                            role: "user",
                            content: &prompt.user,
                        },
                    ],
                };
                let headers = [("Authorization", format!("Bearer {}", api_key))];
                let body = self.post(&request, &headers).await?;
                parse_openai(&self.name, &body)
            }
        }
    }
}

/// Map a non-success HTTP status to a provider error.
pub fn classify_status(provider: &str, status: u16, body: &str) -> ProviderError {
    let lower = body.to_lowercase();
    let message = format!("HTTP {}: {}", status, truncate(body.trim(), 200));
    let provider = provider.to_string();

    match status {
        401 | 402 | 403 | 429 => ProviderError::Auth { provider, message },
        400..=499 if CONTENT_POLICY_MARKERS.iter().any(|m| lower.contains(m)) => {
            ProviderError::ContentRejected { provider, message }
        }
        400..=499 if QUOTA_MARKERS.iter().any(|m| lower.contains(m)) => {
            ProviderError::Auth { provider, message }
        }
        _ => ProviderError::Unavailable { provider, message },
    }
}

fn protocol(provider: &str, message: impl Into<String>) -> ProviderError {
    ProviderError::Protocol {
        provider: provider.to_string(),
        message: message.into(),
    }
}

/// Extract the reply text from an Anthropic Messages API body.
pub fn parse_anthropic(provider: &str, body: &str) -> Result<String, ProviderError> {
    let response: AnthropicResponse = serde_json::from_str(body)
        .map_err(|e| protocol(provider, format!("invalid JSON body: {}", e)))?;

    if response.stop_reason.as_deref() == Some("refusal") {
        return Err(ProviderError::ContentRejected {
            provider: provider.to_string(),
            message: "model refused the request".to_string(),
        });
    }

    let text = response
        .content
        .iter()
        .filter(|block| block.kind.as_deref().unwrap_or("text") == "text")
        .filter_map(|block| block.text.as_deref())
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(protocol(provider, "empty response"));
    }
    Ok(text)
}

/// Extract the reply text from an OpenAI-compatible chat completions body.
pub fn parse_openai(provider: &str, body: &str) -> Result<String, ProviderError> {
    let response: OpenAIResponse = serde_json::from_str(body)
        .map_err(|e| protocol(provider, format!("invalid JSON body: {}", e)))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| protocol(provider, "response has no choices"))?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(ProviderError::ContentRejected {
            provider: provider.to_string(),
            message: "completion stopped by content filter".to_string(),
        });
    }

    match choice.message.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(protocol(provider, "empty response")),
    }
}

// Anthropic API format
#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

// OpenAI-compatible API format
#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}
