//! Provider gateway request/response types for Mnemon.
//!
//! These types model the contract with the language-model backend: a
//! context window plus tool schemas in, text and/or exactly one tool-call
//! descriptor out.

use serde::{Deserialize, Serialize};

use crate::agent::ModelConfig;
use crate::message::{Message, ToolCall};

/// JSON-schema description of a callable tool, offered to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema for the argument object.
    pub parameters: serde_json::Value,
}

/// A request to the provider gateway: the assembled context window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Compiled system prompt (base instructions + core-memory blocks).
    pub system: String,
    /// The in-context message buffer.
    pub messages: Vec<Message>,
    /// Tool schemas offered for this call (empty for chat-only agents).
    pub tools: Vec<ToolSchema>,
    pub model: ModelConfig,
}

/// Token usage reported by the provider for one call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// A structured provider response: text and/or exactly one tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub usage: TokenUsage,
}

/// Errors from the provider gateway. All of these are fatal to the
/// in-flight step loop.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("context length exceeded: max {max}, requested {requested}")]
    ContextLengthExceeded { max: u32, requested: u32 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A tool-call request whose arguments are missing or not a JSON
    /// object. Treated as a formatting error of the backend, not a tool
    /// error.
    #[error("malformed tool call '{name}': {reason}")]
    MalformedToolCall { name: String, reason: String },
}
