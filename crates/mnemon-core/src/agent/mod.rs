//! The agent runtime: step/chaining loop, context assembly, the command
//! processor, and system-originated control messages.

pub mod command;
pub mod context;
pub mod runtime;
pub mod system;

pub use command::{Command, CommandEffect, CommandOutcome};
pub use runtime::{AgentRuntime, StepOptions};
