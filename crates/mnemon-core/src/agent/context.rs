//! Context-window assembly.
//!
//! The system prompt the provider sees is the agent's base instructions
//! followed by a rendered view of its core-memory blocks. It is recompiled
//! whenever a block changes so the next provider call always reflects the
//! current memory state.

use mnemon_types::agent::AgentState;
use mnemon_types::llm::{ProviderRequest, ToolSchema};
use mnemon_types::memory::CoreMemory;
use mnemon_types::message::Message;

/// Base instructions prepended to every compiled system prompt.
pub const BASE_SYSTEM_PROMPT: &str = "\
You are a persistent agent with a self-editing memory.

Your visible context window is finite. Durable facts live in your core \
memory blocks, shown below; older conversation turns are moved to recall \
storage and long-form knowledge to archival storage, both reachable \
through tools. Edit your memory blocks when you learn something worth \
keeping. To continue working across multiple steps, set \
request_heartbeat to true on a tool call.";

/// Compile the full system prompt: base instructions plus the rendered
/// core-memory section.
pub fn compile_system_prompt(memory: &CoreMemory) -> String {
    if memory.is_empty() {
        return BASE_SYSTEM_PROMPT.to_string();
    }
    format!(
        "{BASE_SYSTEM_PROMPT}\n\n<memory_blocks>\n{}\n</memory_blocks>",
        memory.compile()
    )
}

/// Assemble the provider request for one model call.
///
/// Tool schemas are filtered to what the agent's kind permits; chat-only
/// agents get none at all.
pub fn build_request(
    state: &AgentState,
    system_prompt: &str,
    buffer: &[Message],
    schemas: &[ToolSchema],
) -> ProviderRequest {
    let tools = if state.kind.offers_tools() {
        schemas
            .iter()
            .filter(|schema| {
                state.tool_names.iter().any(|name| name == &schema.name)
                    && state.kind.allows_tool(&schema.name)
            })
            .cloned()
            .collect()
    } else {
        Vec::new()
    };

    ProviderRequest {
        system: system_prompt.to_string(),
        messages: buffer.to_vec(),
        tools,
        model: state.model.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_types::agent::AgentKind;
    use mnemon_types::memory::{Block, DEFAULT_BLOCK_CHAR_LIMIT};
    use uuid::Uuid;

    fn schema(name: &str) -> ToolSchema {
        ToolSchema {
            name: name.to_string(),
            description: String::new(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    #[test]
    fn test_compile_includes_blocks() {
        let memory = CoreMemory::new([
            Block::new("persona", "I am a helpful agent.", DEFAULT_BLOCK_CHAR_LIMIT).unwrap(),
        ]);
        let prompt = compile_system_prompt(&memory);
        assert!(prompt.starts_with(BASE_SYSTEM_PROMPT));
        assert!(prompt.contains("<memory_blocks>"));
        assert!(prompt.contains("I am a helpful agent."));
    }

    #[test]
    fn test_compile_empty_memory_is_base_only() {
        let prompt = compile_system_prompt(&CoreMemory::new([]));
        assert_eq!(prompt, BASE_SYSTEM_PROMPT);
    }

    #[test]
    fn test_build_request_filters_tools_by_kind() {
        let mut state = AgentState::new("a", AgentKind::OfflineMemory, Uuid::now_v7());
        state.tool_names = vec![
            "core_memory_append".to_string(),
            "send_message".to_string(),
        ];
        let schemas = vec![schema("core_memory_append"), schema("send_message")];

        let request = build_request(&state, "sys", &[], &schemas);
        let names: Vec<_> = request.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["core_memory_append"]);
    }

    #[test]
    fn test_build_request_chat_only_offers_no_tools() {
        let mut state = AgentState::new("a", AgentKind::ChatOnly, Uuid::now_v7());
        state.tool_names = vec!["send_message".to_string()];
        let schemas = vec![schema("send_message")];

        let request = build_request(&state, "sys", &[], &schemas);
        assert!(request.tools.is_empty());
    }
}
