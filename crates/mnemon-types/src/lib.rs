//! Shared domain types for Mnemon.
//!
//! This crate contains the core domain types used across the Mnemon agent
//! server: AgentState, Message, memory blocks and passages, jobs, usage
//! accounting, and the provider/tool data shapes plus their error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod agent;
pub mod config;
pub mod error;
pub mod job;
pub mod llm;
pub mod memory;
pub mod message;
pub mod tool;
pub mod usage;
