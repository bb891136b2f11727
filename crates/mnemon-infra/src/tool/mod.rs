//! Tool execution gateway implementations.

pub mod local;

pub use local::LocalToolGateway;
