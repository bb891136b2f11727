//! Provider gateway abstraction.

pub mod box_provider;
pub mod provider;

pub use box_provider::BoxProvider;
pub use provider::ProviderGateway;
