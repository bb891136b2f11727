//! Agent state types for Mnemon.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::memory::CoreMemory;

/// The closed set of agent variants.
///
/// Selected once at load time by the type tag stored in [`AgentState`];
/// every variant shares the same step/chaining contract and differs only in
/// the capabilities below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Full step loop with the complete tool set.
    Standard,
    /// Memory-editing tools only; used for background memory maintenance.
    OfflineMemory,
    /// Never chains: a single provider call per step invocation.
    SingleTurn,
    /// No tools offered to the provider at all.
    ChatOnly,
}

impl AgentKind {
    /// Whether tool schemas are offered to the provider for this variant.
    pub fn offers_tools(self) -> bool {
        !matches!(self, AgentKind::ChatOnly)
    }

    /// Whether the variant caps every step invocation at one loop iteration
    /// regardless of the caller's chaining flag.
    pub fn forces_single_step(self) -> bool {
        matches!(self, AgentKind::SingleTurn)
    }

    /// Tool-name filter applied before offering schemas to the provider.
    pub fn allows_tool(self, name: &str) -> bool {
        match self {
            AgentKind::Standard | AgentKind::SingleTurn => true,
            AgentKind::ChatOnly => false,
            AgentKind::OfflineMemory => {
                name.starts_with("core_memory_") || name.starts_with("archival_memory_")
            }
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::Standard => write!(f, "standard"),
            AgentKind::OfflineMemory => write!(f, "offline_memory"),
            AgentKind::SingleTurn => write!(f, "single_turn"),
            AgentKind::ChatOnly => write!(f, "chat_only"),
        }
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(AgentKind::Standard),
            "offline_memory" => Ok(AgentKind::OfflineMemory),
            "single_turn" => Ok(AgentKind::SingleTurn),
            "chat_only" => Ok(AgentKind::ChatOnly),
            other => Err(format!("invalid agent kind: '{other}'")),
        }
    }
}

/// Model configuration for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    pub context_window: u32,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            context_window: 128_000,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Persisted state of an agent.
///
/// Owned by the persistence boundary; the runtime holds an exclusively
/// checked-out copy while the agent's lock is held.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub id: Uuid,
    pub name: String,
    pub kind: AgentKind,
    /// Core memory: label -> block.
    pub memory: CoreMemory,
    /// Ordered ids of the in-context message buffer (a suffix/subset of
    /// recall memory).
    pub message_ids: Vec<Uuid>,
    /// Names of the tools this agent may call.
    pub tool_names: Vec<String>,
    pub model: ModelConfig,
    pub tags: Vec<String>,
    /// Owning user. A loaded agent without an owner is a fatal
    /// precondition failure.
    pub owner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl AgentState {
    pub fn new(name: impl Into<String>, kind: AgentKind, owner_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            kind,
            memory: CoreMemory::default(),
            message_ids: Vec::new(),
            tool_names: Vec::new(),
            model: ModelConfig::default(),
            tags: Vec::new(),
            owner_id: Some(owner_id),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_kind_roundtrip() {
        for kind in [
            AgentKind::Standard,
            AgentKind::OfflineMemory,
            AgentKind::SingleTurn,
            AgentKind::ChatOnly,
        ] {
            let s = kind.to_string();
            let parsed: AgentKind = s.parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_agent_kind_serde() {
        let json = serde_json::to_string(&AgentKind::OfflineMemory).unwrap();
        assert_eq!(json, "\"offline_memory\"");
    }

    #[test]
    fn test_capabilities_per_kind() {
        assert!(AgentKind::Standard.offers_tools());
        assert!(!AgentKind::ChatOnly.offers_tools());
        assert!(AgentKind::SingleTurn.forces_single_step());
        assert!(!AgentKind::Standard.forces_single_step());

        assert!(AgentKind::OfflineMemory.allows_tool("core_memory_append"));
        assert!(!AgentKind::OfflineMemory.allows_tool("send_message"));
        assert!(AgentKind::Standard.allows_tool("send_message"));
    }

    #[test]
    fn test_new_agent_has_owner() {
        let owner = Uuid::now_v7();
        let state = AgentState::new("sam", AgentKind::Standard, owner);
        assert_eq!(state.owner_id, Some(owner));
        assert!(state.message_ids.is_empty());
    }
}
