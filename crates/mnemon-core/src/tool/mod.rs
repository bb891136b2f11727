//! Tool execution gateway abstraction.

pub mod box_gateway;
pub mod gateway;

pub use box_gateway::BoxToolGateway;
pub use gateway::ToolGateway;
