//! Agent execution engine for Mnemon.
//!
//! This crate owns the step/chaining loop, the per-agent lock registry, the
//! interactive command processor, and the memory-tier store traits the
//! engine depends on. Store implementations live in `mnemon-infra` (SQLite)
//! and in [`store::memory`] (in-memory).

pub mod agent;
pub mod embed;
pub mod llm;
pub mod lock;
pub mod server;
pub mod store;
pub mod tool;
