//! Scripted advisory backend for tests and offline runs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{AdvisoryBackend, AdvisoryRequest};

/// Backend that replays canned responses in order.
///
/// Once the script is exhausted every call fails with the fallback error.
/// Every request is recorded for inspection.
#[derive(Clone)]
pub struct ScriptedBackend {
    responses: Arc<Mutex<VecDeque<DomainResult<String>>>>,
    requests: Arc<Mutex<Vec<AdvisoryRequest>>>,
    fallback_error: String,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::with_responses(Vec::new())
    }

    pub fn with_responses(responses: Vec<DomainResult<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
            fallback_error: "no scripted response left".to_string(),
            delay: None,
        }
    }

    /// A backend whose every call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fallback_error: message.into(),
            ..Self::new()
        }
    }

    /// Wait this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue another response.
    pub async fn push_response(&self, response: DomainResult<String>) {
        self.responses.lock().await.push_back(response);
    }

    /// Every request received so far.
    pub async fn requests(&self) -> Vec<AdvisoryRequest> {
        self.requests.lock().await.clone()
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AdvisoryBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &AdvisoryRequest) -> DomainResult<String> {
        self.requests.lock().await.push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(DomainError::AdvisoryUnavailable(self.fallback_error.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AdvisoryRequest {
        AdvisoryRequest {
            system: String::new(),
            prompt: "p".to_string(),
            model: "m".to_string(),
            max_tokens: 1,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn test_replays_in_order_then_fails() {
        let backend = ScriptedBackend::with_responses(vec![Ok("first".into())]);
        backend.push_response(Ok("second".into())).await;

        assert_eq!(backend.complete(&request()).await.unwrap(), "first");
        assert_eq!(backend.complete(&request()).await.unwrap(), "second");
        assert!(backend.complete(&request()).await.is_err());
        assert_eq!(backend.requests().await.len(), 3);
    }

    #[tokio::test]
    async fn test_failing_backend_uses_message() {
        let backend = ScriptedBackend::failing("network unreachable");
        let err = backend.complete(&request()).await.unwrap_err();
        assert!(err.to_string().contains("network unreachable"));
    }
}
