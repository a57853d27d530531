//! Advisory backend adapters.

pub mod anthropic_api;
pub mod claude_code;
pub mod scripted;

pub use anthropic_api::{AnthropicApiConfig, AnthropicBackend};
pub use claude_code::ClaudeCodeBackend;
pub use scripted::ScriptedBackend;
