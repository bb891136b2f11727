//! ToolGateway trait definition.
//!
//! The sandboxed tool call executor. The engine hands it a tool name, the
//! serialized JSON argument object, and the caller identity; it returns a
//! structured result or raises [`ToolError`] on sandbox-level failure.
//! Sandbox isolation internals live in the implementations.

use std::future::Future;

use uuid::Uuid;

use mnemon_types::tool::{ToolError, ToolResult};

/// Trait for sandboxed tool executors.
///
/// A `ToolError` is distinct from a tool returning an error value: the
/// former is a sandbox raise and is converted by the step loop into an
/// error-status tool-return message; the latter is an ordinary successful
/// execution whose return value happens to describe a failure.
pub trait ToolGateway: Send + Sync {
    fn execute(
        &self,
        name: &str,
        arguments: &str,
        caller: Uuid,
    ) -> impl Future<Output = Result<ToolResult, ToolError>> + Send;
}
