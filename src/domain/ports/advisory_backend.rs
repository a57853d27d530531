//! Advisory backend port - interface for language-model backends.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// One request to an advisory backend.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryRequest {
    /// System preamble.
    pub system: String,
    /// Prompt summarizing the run, last evaluation and recent history.
    pub prompt: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// A backend that turns a prompt into raw text.
///
/// Nothing is assumed about the returned text; callers parse and validate it.
#[async_trait]
pub trait AdvisoryBackend: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &'static str;

    async fn complete(&self, request: &AdvisoryRequest) -> DomainResult<String>;
}
