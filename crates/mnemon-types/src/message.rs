//! Conversation message types for Mnemon.
//!
//! `Message` is the unit of both the in-context buffer and recall memory.
//! Messages are immutable once created except for three sanctioned in-place
//! edits performed by the command processor: content rewrite, tool-call
//! argument rewrite, and deletion via pop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Role of a message in an agent's conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "tool" => Ok(MessageRole::Tool),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A tool invocation requested by the model.
///
/// `arguments` is the serialized JSON argument object exactly as the
/// provider produced it. The command processor's `rewrite` edit parses it,
/// overwrites the `message` field, and re-serializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back on the tool-return message.
    pub id: String,
    pub name: String,
    /// JSON object, serialized.
    pub arguments: String,
}

/// Outcome status carried on a tool-return message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolReturnStatus {
    Success,
    Error,
}

impl fmt::Display for ToolReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolReturnStatus::Success => write!(f, "success"),
            ToolReturnStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for ToolReturnStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(ToolReturnStatus::Success),
            "error" => Ok(ToolReturnStatus::Error),
            other => Err(format!("invalid tool return status: '{other}'")),
        }
    }
}

/// A single message owned by an agent.
///
/// Recall memory is the append-mostly superset of all messages; the
/// in-context buffer is a suffix/subset of it. `created_at` is
/// monotonically non-decreasing within an agent (UUIDv7 ids share the same
/// ordering).
///
/// The role determines which fields are meaningful: `tool_call` only
/// appears on assistant messages, `tool_call_id` and `tool_return_status`
/// only on tool messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// UUIDv7 message id (time-sortable).
    pub id: Uuid,
    /// Owning agent.
    pub agent_id: Uuid,
    pub role: MessageRole,
    pub text: String,
    /// Tool invocation requested by this assistant message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    /// For tool-return messages: the id of the call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For tool-return messages: success or error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_return_status: Option<ToolReturnStatus>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn base(agent_id: Uuid, role: MessageRole, text: String) -> Self {
        Self {
            id: Uuid::now_v7(),
            agent_id,
            role,
            text,
            tool_call: None,
            tool_call_id: None,
            tool_return_status: None,
            created_at: Utc::now(),
        }
    }

    /// Create a user-role message.
    pub fn user(agent_id: Uuid, text: impl Into<String>) -> Self {
        Self::base(agent_id, MessageRole::User, text.into())
    }

    /// Create a system-role message.
    pub fn system(agent_id: Uuid, text: impl Into<String>) -> Self {
        Self::base(agent_id, MessageRole::System, text.into())
    }

    /// Create an assistant-role message, optionally carrying a tool call.
    pub fn assistant(
        agent_id: Uuid,
        text: impl Into<String>,
        tool_call: Option<ToolCall>,
    ) -> Self {
        let mut msg = Self::base(agent_id, MessageRole::Assistant, text.into());
        msg.tool_call = tool_call;
        msg
    }

    /// Create a tool-return message answering `tool_call_id`.
    pub fn tool_return(
        agent_id: Uuid,
        text: impl Into<String>,
        tool_call_id: impl Into<String>,
        status: ToolReturnStatus,
    ) -> Self {
        let mut msg = Self::base(agent_id, MessageRole::Tool, text.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg.tool_return_status = Some(status);
        msg
    }
}

/// Outer-layer create shape for a message.
///
/// Only user and system messages can be submitted from outside; the content
/// is packaged into a control envelope before it becomes a [`Message`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCreate {
    pub role: MessageRole,
    pub text: String,
    /// Optional display name of the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}
