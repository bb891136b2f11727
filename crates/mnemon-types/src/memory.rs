//! Memory-tier types for Mnemon.
//!
//! Core memory is a small set of labeled, size-bounded text blocks that are
//! always in context and editable by the agent itself. Archival memory is a
//! collection of embedding-indexed passages retrievable by semantic query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::collections::BTreeMap;
use std::fmt;

/// Default character limit for a core-memory block value.
pub const DEFAULT_BLOCK_CHAR_LIMIT: usize = 2000;

/// Errors from core-memory block mutations.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("value for block '{label}' is {len} chars, over the {limit} char limit")]
    ValueTooLong {
        label: String,
        len: usize,
        limit: usize,
    },

    #[error("no block with label '{0}'")]
    UnknownLabel(String),
}

/// A labeled, size-bounded mutable text value (e.g. "persona", "human").
///
/// Mutated only via [`Block::set_value`], which enforces the character
/// limit invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: Uuid,
    pub label: String,
    value: String,
    pub char_limit: usize,
}

impl Block {
    /// Create a block, rejecting an initial value over the limit.
    pub fn new(
        label: impl Into<String>,
        value: impl Into<String>,
        char_limit: usize,
    ) -> Result<Self, MemoryError> {
        let label = label.into();
        let value = value.into();
        if value.chars().count() > char_limit {
            return Err(MemoryError::ValueTooLong {
                label,
                len: value.chars().count(),
                limit: char_limit,
            });
        }
        Ok(Self {
            id: Uuid::now_v7(),
            label,
            value,
            char_limit,
        })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Replace the block value, enforcing the character limit.
    pub fn set_value(&mut self, value: impl Into<String>) -> Result<(), MemoryError> {
        let value = value.into();
        if value.chars().count() > self.char_limit {
            return Err(MemoryError::ValueTooLong {
                label: self.label.clone(),
                len: value.chars().count(),
                limit: self.char_limit,
            });
        }
        self.value = value;
        Ok(())
    }
}

/// An agent's core memory: label -> block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreMemory {
    blocks: BTreeMap<String, Block>,
}

impl CoreMemory {
    pub fn new(blocks: impl IntoIterator<Item = Block>) -> Self {
        Self {
            blocks: blocks
                .into_iter()
                .map(|b| (b.label.clone(), b))
                .collect(),
        }
    }

    pub fn get(&self, label: &str) -> Option<&Block> {
        self.blocks.get(label)
    }

    pub fn get_mut(&mut self, label: &str) -> Option<&mut Block> {
        self.blocks.get_mut(label)
    }

    pub fn insert(&mut self, block: Block) {
        self.blocks.insert(block.label.clone(), block);
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Render all blocks into the system-prompt memory section.
    pub fn compile(&self) -> String {
        let mut out = String::new();
        for block in self.blocks.values() {
            out.push_str(&format!(
                "<{label} characters=\"{len}/{limit}\">\n{value}\n</{label}>\n",
                label = block.label,
                len = block.value().chars().count(),
                limit = block.char_limit,
                value = block.value(),
            ));
        }
        out
    }
}

impl fmt::Display for CoreMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.compile())
    }
}

/// An archival memory unit.
///
/// The embedding is write-once: it is computed when the passage is inserted
/// and never updated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub id: Uuid,
    /// Owning agent; `None` for passages held by a data source awaiting
    /// attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Uuid>,
    /// Data source this passage was ingested from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<Uuid>,
    pub text: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl Passage {
    pub fn new(
        agent_id: Option<Uuid>,
        source_id: Option<Uuid>,
        text: String,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            agent_id,
            source_id,
            text,
            embedding,
            created_at: Utc::now(),
        }
    }
}

/// Size of an agent's archival memory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ArchivalSummary {
    pub size: u64,
}

/// Size of an agent's recall memory (total message log).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecallSummary {
    pub size: u64,
}
