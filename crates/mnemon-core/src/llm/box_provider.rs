//! BoxProvider -- object-safe dynamic dispatch wrapper for ProviderGateway.
//!
//! 1. Define an object-safe `ProviderGatewayDyn` trait with boxed futures
//! 2. Blanket-impl `ProviderGatewayDyn` for all `T: ProviderGateway`
//! 3. `BoxProvider` wraps `Box<dyn ProviderGatewayDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use mnemon_types::llm::{ProviderError, ProviderRequest, ProviderResponse};

use super::provider::ProviderGateway;

/// Object-safe version of [`ProviderGateway`] with boxed futures.
///
/// This trait exists solely to enable dynamic dispatch. A blanket
/// implementation is provided for all types implementing `ProviderGateway`.
pub trait ProviderGatewayDyn: Send + Sync {
    fn name(&self) -> &str;

    fn complete_boxed<'a>(
        &'a self,
        request: &'a ProviderRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderResponse, ProviderError>> + Send + 'a>>;
}

impl<T: ProviderGateway> ProviderGatewayDyn for T {
    fn name(&self) -> &str {
        ProviderGateway::name(self)
    }

    fn complete_boxed<'a>(
        &'a self,
        request: &'a ProviderRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ProviderResponse, ProviderError>> + Send + 'a>> {
        Box::pin(self.complete(request))
    }
}

/// Type-erased provider gateway for runtime backend selection.
///
/// Since `ProviderGateway` uses RPITIT it cannot be used as a trait object
/// directly; `BoxProvider` provides equivalent methods that delegate to
/// the inner `ProviderGatewayDyn` trait object.
pub struct BoxProvider {
    inner: Box<dyn ProviderGatewayDyn + Send + Sync>,
}

impl BoxProvider {
    /// Wrap a concrete `ProviderGateway` in a type-erased box.
    pub fn new<T: ProviderGateway + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn complete(
        &self,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.inner.complete_boxed(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_types::agent::ModelConfig;
    use mnemon_types::llm::TokenUsage;

    struct EchoProvider;

    impl ProviderGateway for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            request: &ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                text: Some(format!("{} messages", request.messages.len())),
                tool_call: None,
                usage: TokenUsage::default(),
            })
        }
    }

    #[tokio::test]
    async fn test_box_provider_delegates() {
        let provider = BoxProvider::new(EchoProvider);
        assert_eq!(provider.name(), "echo");

        let request = ProviderRequest {
            system: String::new(),
            messages: vec![],
            tools: vec![],
            model: ModelConfig::default(),
        };
        let response = provider.complete(&request).await.unwrap();
        assert_eq!(response.text.as_deref(), Some("0 messages"));
    }
}
