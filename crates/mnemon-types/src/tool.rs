//! Tool execution gateway contract types.
//!
//! The gateway accepts a tool name, an argument mapping, and the caller
//! identity, and returns a structured result. A [`ToolError`] is a
//! sandbox-level failure, distinct from a tool returning an error value.

use serde::{Deserialize, Serialize};

/// Result of a successful sandbox run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResult {
    /// The tool's return value, stringified.
    pub return_value: String,
    /// Captured standard-output lines.
    pub stdout: Vec<String>,
    /// Captured standard-error lines.
    pub stderr: Vec<String>,
}

impl ToolResult {
    pub fn from_value(return_value: impl Into<String>) -> Self {
        Self {
            return_value: return_value.into(),
            stdout: Vec::new(),
            stderr: Vec::new(),
        }
    }
}

/// Sandbox-level failure raised by the tool execution gateway.
///
/// Recoverable from the step loop's perspective: it is converted into an
/// error-status tool-return message and fed back to the provider.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("sandbox failure in '{tool}': {message}")]
    Sandbox { tool: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_from_value() {
        let result = ToolResult::from_value("42");
        assert_eq!(result.return_value, "42");
        assert!(result.stdout.is_empty());
    }

    #[test]
    fn test_tool_error_display() {
        let err = ToolError::Sandbox {
            tool: "web_search".to_string(),
            message: "process exited 137".to_string(),
        };
        assert!(err.to_string().contains("web_search"));
        assert!(err.to_string().contains("137"));
    }
}
