//! Anthropic Messages API advisory backend.
//!
//! Sends one non-streaming Messages API request per advisory call and returns
//! the concatenated text blocks of the reply.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::AdvisorConfig;
use crate::domain::ports::{AdvisoryBackend, AdvisoryRequest};

/// Configuration for the Anthropic API backend.
#[derive(Debug, Clone)]
pub struct AnthropicApiConfig {
    /// API key (will be read from ANTHROPIC_API_KEY env if not set).
    pub api_key: Option<String>,
    /// API base URL.
    pub base_url: String,
    /// API version header.
    pub api_version: String,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AnthropicApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.anthropic.com".to_string(),
            api_version: "2023-06-01".to_string(),
            timeout_secs: 60,
        }
    }
}

impl From<&AdvisorConfig> for AnthropicApiConfig {
    fn from(config: &AdvisorConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_seconds,
            ..Default::default()
        }
    }
}

impl AnthropicApiConfig {
    /// Get API key from config or environment.
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
    }

    /// Create config with explicit API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Point the backend at a different server (proxies, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Advisory backend over the Anthropic Messages API.
pub struct AnthropicBackend {
    config: AnthropicApiConfig,
    client: Client,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicApiConfig) -> DomainResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                DomainError::AdvisoryUnavailable(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self { config, client })
    }

    pub fn with_defaults() -> DomainResult<Self> {
        Self::new(AnthropicApiConfig::default())
    }
}

#[async_trait]
impl AdvisoryBackend for AnthropicBackend {
    fn name(&self) -> &'static str {
        "anthropic_api"
    }

    async fn complete(&self, request: &AdvisoryRequest) -> DomainResult<String> {
        let api_key = self.config.get_api_key().ok_or_else(|| {
            DomainError::AdvisoryUnavailable("ANTHROPIC_API_KEY not set".to_string())
        })?;

        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-api-key", &api_key)
            .header("anthropic-version", &self.config.api_version)
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::AdvisoryUnavailable(format!("API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::AdvisoryUnavailable(format!(
                "API error {status}: {body}"
            )));
        }

        let result: MessagesResponse = response.json().await.map_err(|e| {
            DomainError::AdvisoryUnavailable(format!("Failed to parse response: {e}"))
        })?;

        let text = result
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if text.is_empty() {
            return Err(DomainError::AdvisoryUnavailable(
                "API returned no text content".to_string(),
            ));
        }

        Ok(text)
    }
}
