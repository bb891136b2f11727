//! ProviderGateway trait definition.
//!
//! This is the abstraction over the language-model backend. The engine
//! hands it an assembled context window plus tool schemas and gets back a
//! structured response: text and/or exactly one tool-call descriptor.
//! Provider-specific request formatting lives in the implementations
//! (`mnemon-infra`).

use std::future::Future;

use mnemon_types::llm::{ProviderError, ProviderRequest, ProviderResponse};

/// Trait for language-model backends.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition); see
/// [`super::BoxProvider`] for the object-safe wrapper. Any error from
/// `complete` is fatal to the in-flight step loop. Retry and timeout
/// policy belong to the implementation, not the engine.
pub trait ProviderGateway: Send + Sync {
    /// Human-readable backend name (e.g. "openai", "mock").
    fn name(&self) -> &str;

    /// Send the context window and receive the full response.
    fn complete(
        &self,
        request: &ProviderRequest,
    ) -> impl Future<Output = Result<ProviderResponse, ProviderError>> + Send;
}
