//! Memory-tier and persistence store traits.
//!
//! The engine consumes these contracts but does not own their storage.
//! Implementations live in `mnemon-infra` (SQLite) and in [`memory`]
//! (in-memory, used by core tests and embedded callers). Uses native async
//! fn in traits (RPITIT, Rust 2024 edition).

pub mod memory;

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use mnemon_types::agent::AgentState;
use mnemon_types::error::StoreError;
use mnemon_types::job::Job;
use mnemon_types::memory::{Block, Passage};
use mnemon_types::message::Message;

/// Persistence boundary for agent state.
///
/// The runtime checks state out exclusively (under the agent's lock),
/// mutates its in-memory copy, and saves it back at well-defined
/// checkpoints.
pub trait AgentStore: Send + Sync {
    fn get_agent(
        &self,
        agent_id: Uuid,
    ) -> impl Future<Output = Result<Option<AgentState>, StoreError>> + Send;

    /// Persist state, blocks, and the in-context message-id list.
    fn save_agent(
        &self,
        state: &AgentState,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn create_agent(
        &self,
        state: &AgentState,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete_agent(
        &self,
        agent_id: Uuid,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Core memory: agent-editable labeled blocks.
pub trait BlockStore: Send + Sync {
    fn get_block(
        &self,
        agent_id: Uuid,
        label: &str,
    ) -> impl Future<Output = Result<Option<Block>, StoreError>> + Send;

    fn list_blocks(
        &self,
        agent_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Block>, StoreError>> + Send;

    /// Replace a block's value. Rejects values exceeding the block's
    /// configured character limit with [`StoreError::Conflict`].
    fn update_block(
        &self,
        block_id: Uuid,
        new_value: &str,
    ) -> impl Future<Output = Result<Block, StoreError>> + Send;
}

/// Recall memory: the full historical message log, paginated.
///
/// Pagination is timestamp-bounded (strictly-later / strictly-earlier),
/// not offset-bounded, so cursors remain stable under concurrent appends.
/// Ordering ties on `created_at` break on the time-sortable message id.
pub trait RecallStore: Send + Sync {
    fn save_messages(
        &self,
        messages: &[Message],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_message(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Message>, StoreError>> + Send;

    /// Persist one of the three sanctioned in-place edits (content
    /// rewrite, tool-call-argument rewrite).
    fn update_message(
        &self,
        message: &Message,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn list_messages(
        &self,
        agent_id: Uuid,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
        limit: u64,
        ascending: bool,
    ) -> impl Future<Output = Result<Vec<Message>, StoreError>> + Send;

    fn size(
        &self,
        agent_id: Uuid,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// Archival memory: embedding-indexed passages.
///
/// Embeddings are computed at insert time via the implementation's
/// [`crate::embed::Embedder`] collaborator and are write-once.
pub trait ArchivalStore: Send + Sync {
    /// Insert a passage owned by an agent and/or a data source.
    fn insert_passage(
        &self,
        agent_id: Option<Uuid>,
        source_id: Option<Uuid>,
        text: &str,
    ) -> impl Future<Output = Result<Passage, StoreError>> + Send;

    /// List an agent's passages in creation order, starting strictly after
    /// the cursor passage id when given.
    fn list_passages(
        &self,
        agent_id: Uuid,
        cursor: Option<Uuid>,
        limit: u64,
    ) -> impl Future<Output = Result<Vec<Passage>, StoreError>> + Send;

    /// Semantic retrieval over an agent's passages.
    fn search_passages(
        &self,
        agent_id: Uuid,
        query: &str,
        limit: u64,
    ) -> impl Future<Output = Result<Vec<Passage>, StoreError>> + Send;

    fn delete_passage(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Delete passages by owning source; scoped to one agent when given.
    /// Returns the deleted count.
    fn delete_by_source(
        &self,
        source_id: Uuid,
        agent_id: Option<Uuid>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Copy a source's unattached passages into an agent's archival
    /// memory. Returns the copied count.
    fn attach_source(
        &self,
        agent_id: Uuid,
        source_id: Uuid,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    fn size(
        &self,
        agent_id: Uuid,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// Ingestion job tracking.
pub trait JobStore: Send + Sync {
    fn create_job(
        &self,
        job: &Job,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn get_job(
        &self,
        id: Uuid,
    ) -> impl Future<Output = Result<Option<Job>, StoreError>> + Send;

    fn update_job(
        &self,
        job: &Job,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
