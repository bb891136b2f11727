//! Error taxonomy for the agent execution engine.

use thiserror::Error;

use crate::job::JobError;
use crate::llm::ProviderError;
use crate::memory::MemoryError;

/// Errors from store operations (used by trait definitions in mnemon-core).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Top-level error for step and command invocations.
///
/// Recoverable tool failures never appear here: the step loop converts them
/// into error-status tool-return messages. Everything below aborts the
/// in-flight turn without persisting it (the lock is still released).
#[derive(Debug, Error)]
pub enum AgentError {
    /// Rejected input: empty message text, command-prefixed content
    /// submitted as a plain message, malformed batch. Raised before any
    /// lock is acquired.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Language-model backend failure or malformed tool-call request.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Loaded state violates a precondition (e.g. agent has no owner).
    #[error("consistency error: {0}")]
    Consistency(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A command the processor explicitly refuses (`exit`, `wipe`).
    #[error("invalid command: '{0}'")]
    InvalidCommand(String),
}
