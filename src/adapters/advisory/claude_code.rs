//! Claude Code CLI advisory backend.
//!
//! Runs `claude --print` with the system preamble and prompt and returns its
//! stdout.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{AdvisoryBackend, AdvisoryRequest};

/// Advisory backend that shells out to the Claude Code CLI.
#[derive(Debug, Clone)]
pub struct ClaudeCodeBackend {
    binary_path: String,
}

impl Default for ClaudeCodeBackend {
    fn default() -> Self {
        Self::new("claude")
    }
}

impl ClaudeCodeBackend {
    pub fn new(binary_path: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    fn build_args(request: &AdvisoryRequest) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "text".to_string(),
            "--model".to_string(),
            request.model.clone(),
        ];
        if !request.system.is_empty() {
            args.push("--append-system-prompt".to_string());
            args.push(request.system.clone());
        }
        args.push(request.prompt.clone());
        args
    }
}

#[async_trait]
impl AdvisoryBackend for ClaudeCodeBackend {
    fn name(&self) -> &'static str {
        "claude_code"
    }

    async fn complete(&self, request: &AdvisoryRequest) -> DomainResult<String> {
        let output = Command::new(&self.binary_path)
            .args(Self::build_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                DomainError::AdvisoryUnavailable(format!("Failed to execute Claude Code: {e}"))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DomainError::AdvisoryUnavailable(format!(
                "Claude Code failed: {stderr}"
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
