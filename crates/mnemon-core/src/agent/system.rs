//! System-originated control message packaging.
//!
//! Inbound user and system content is wrapped in a small JSON envelope
//! before entering the message log, so the model can distinguish real user
//! input from automated control messages (heartbeats, memory-pressure
//! warnings) and tool results.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;

use mnemon_types::message::ToolReturnStatus;

/// Command marker that message submissions must not start with.
pub const COMMAND_PREFIX: char = '/';

/// Upper bound on tool error text fed back to the provider.
pub const ERROR_MESSAGE_CHAR_LIMIT: usize = 500;

fn timestamp(time: Option<DateTime<Utc>>) -> String {
    time.unwrap_or_else(Utc::now)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Wrap user content in the `user_message` envelope.
pub fn package_user_message(text: &str, time: Option<DateTime<Utc>>) -> String {
    json!({
        "type": "user_message",
        "message": text,
        "time": timestamp(time),
    })
    .to_string()
}

/// Wrap system content in the `system_alert` envelope.
pub fn package_system_message(text: &str) -> String {
    json!({
        "type": "system_alert",
        "message": text,
        "time": timestamp(None),
    })
    .to_string()
}

/// Automated continuation request: run another step with no new input.
pub fn get_heartbeat(reason: &str) -> String {
    json!({
        "type": "heartbeat",
        "reason": reason,
        "time": timestamp(None),
    })
    .to_string()
}

/// Warning that the context window is approaching its token limit.
pub fn get_token_limit_warning() -> String {
    json!({
        "type": "system_alert",
        "message": "Warning: the conversation history will soon reach its maximum length. \
                    Important information from the conversation should be stored in memory.",
        "time": timestamp(None),
    })
    .to_string()
}

/// Wrap a tool return value (or truncated error text) in the
/// `tool_return` envelope.
pub fn package_tool_result(value: &str, status: ToolReturnStatus) -> String {
    json!({
        "type": "tool_return",
        "status": status.to_string(),
        "message": value,
        "time": timestamp(None),
    })
    .to_string()
}

/// Truncate error text to [`ERROR_MESSAGE_CHAR_LIMIT`] characters.
pub fn truncate_error(message: &str) -> String {
    if message.chars().count() <= ERROR_MESSAGE_CHAR_LIMIT {
        message.to_string()
    } else {
        message.chars().take(ERROR_MESSAGE_CHAR_LIMIT).collect()
    }
}
