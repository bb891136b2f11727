//! BoxToolGateway -- object-safe dynamic dispatch wrapper for ToolGateway.
//!
//! Same blanket-impl pattern as `BoxProvider`.

use std::future::Future;
use std::pin::Pin;

use uuid::Uuid;

use mnemon_types::tool::{ToolError, ToolResult};

use super::gateway::ToolGateway;

/// Object-safe version of [`ToolGateway`] with boxed futures.
pub trait ToolGatewayDyn: Send + Sync {
    fn execute_boxed<'a>(
        &'a self,
        name: &'a str,
        arguments: &'a str,
        caller: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<ToolResult, ToolError>> + Send + 'a>>;
}

impl<T: ToolGateway> ToolGatewayDyn for T {
    fn execute_boxed<'a>(
        &'a self,
        name: &'a str,
        arguments: &'a str,
        caller: Uuid,
    ) -> Pin<Box<dyn Future<Output = Result<ToolResult, ToolError>> + Send + 'a>> {
        Box::pin(self.execute(name, arguments, caller))
    }
}

/// Type-erased tool gateway.
pub struct BoxToolGateway {
    inner: Box<dyn ToolGatewayDyn + Send + Sync>,
}

impl BoxToolGateway {
    /// Wrap a concrete `ToolGateway` in a type-erased box.
    pub fn new<T: ToolGateway + 'static>(gateway: T) -> Self {
        Self {
            inner: Box::new(gateway),
        }
    }

    pub async fn execute(
        &self,
        name: &str,
        arguments: &str,
        caller: Uuid,
    ) -> Result<ToolResult, ToolError> {
        self.inner.execute_boxed(name, arguments, caller).await
    }
}
