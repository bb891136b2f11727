//! LocalToolGateway -- in-process executor for the builtin memory tools.
//!
//! Runs the builtin tools directly against the stores, no sandbox process.
//! Argument objects are deserialized per tool; extra keys (notably
//! `request_heartbeat`, which belongs to the step loop) are ignored.

use serde::Deserialize;
use uuid::Uuid;

use mnemon_core::store::{ArchivalStore, BlockStore, RecallStore};
use mnemon_core::tool::gateway::ToolGateway;
use mnemon_types::error::StoreError;
use mnemon_types::llm::ToolSchema;
use mnemon_types::tool::{ToolError, ToolResult};

/// Results per page for the search tools.
const SEARCH_PAGE_SIZE: u64 = 5;

/// Upper bound on messages scanned by conversation_search.
const CONVERSATION_SCAN_LIMIT: u64 = 1000;

/// Executes the builtin tools against the backing stores.
pub struct LocalToolGateway<S> {
    stores: std::sync::Arc<S>,
}

impl<S> LocalToolGateway<S>
where
    S: BlockStore + ArchivalStore + RecallStore + Send + Sync + 'static,
{
    pub fn new(stores: std::sync::Arc<S>) -> Self {
        Self { stores }
    }

    async fn core_memory_append(
        &self,
        caller: Uuid,
        args: CoreMemoryAppendArgs,
    ) -> Result<ToolResult, ToolError> {
        let block = self
            .stores
            .get_block(caller, &args.label)
            .await
            .map_err(|e| sandbox("core_memory_append", e))?
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: "core_memory_append".to_string(),
                reason: format!("no core memory block labeled '{}'", args.label),
            })?;
        let new_value = if block.value().is_empty() {
            args.content
        } else {
            format!("{}\n{}", block.value(), args.content)
        };
        self.stores
            .update_block(block.id, &new_value)
            .await
            .map_err(|e| sandbox("core_memory_append", e))?;
        Ok(ToolResult::from_value("appended"))
    }

    async fn core_memory_replace(
        &self,
        caller: Uuid,
        args: CoreMemoryReplaceArgs,
    ) -> Result<ToolResult, ToolError> {
        let block = self
            .stores
            .get_block(caller, &args.label)
            .await
            .map_err(|e| sandbox("core_memory_replace", e))?
            .ok_or_else(|| ToolError::InvalidArguments {
                tool: "core_memory_replace".to_string(),
                reason: format!("no core memory block labeled '{}'", args.label),
            })?;
        if !block.value().contains(&args.old_content) {
            return Err(ToolError::Sandbox {
                tool: "core_memory_replace".to_string(),
                message: format!(
                    "old content not found in block '{}'",
                    args.label
                ),
            });
        }
        let new_value = block.value().replace(&args.old_content, &args.new_content);
        self.stores
            .update_block(block.id, &new_value)
            .await
            .map_err(|e| sandbox("core_memory_replace", e))?;
        Ok(ToolResult::from_value("replaced"))
    }

    async fn archival_memory_insert(
        &self,
        caller: Uuid,
        args: ContentArgs,
    ) -> Result<ToolResult, ToolError> {
        self.stores
            .insert_passage(Some(caller), None, &args.content)
            .await
            .map_err(|e| sandbox("archival_memory_insert", e))?;
        Ok(ToolResult::from_value("stored in archival memory"))
    }

    async fn archival_memory_search(
        &self,
        caller: Uuid,
        args: SearchArgs,
    ) -> Result<ToolResult, ToolError> {
        let page = args.page.unwrap_or(0);
        let hits = self
            .stores
            .search_passages(caller, &args.query, (page + 1) * SEARCH_PAGE_SIZE)
            .await
            .map_err(|e| sandbox("archival_memory_search", e))?;
        let page_hits: Vec<String> = hits
            .into_iter()
            .skip((page * SEARCH_PAGE_SIZE) as usize)
            .map(|p| format!("[{}] {}", p.created_at.format("%Y-%m-%d %H:%M"), p.text))
            .collect();
        let rendered = if page_hits.is_empty() {
            "no results".to_string()
        } else {
            page_hits.join("\n")
        };
        Ok(ToolResult::from_value(rendered))
    }

    async fn conversation_search(
        &self,
        caller: Uuid,
        args: SearchArgs,
    ) -> Result<ToolResult, ToolError> {
        let messages = self
            .stores
            .list_messages(caller, None, None, CONVERSATION_SCAN_LIMIT, true)
            .await
            .map_err(|e| sandbox("conversation_search", e))?;
        let page = args.page.unwrap_or(0);
        let matches: Vec<String> = messages
            .into_iter()
            .filter(|m| m.text.contains(&args.query))
            .skip((page * SEARCH_PAGE_SIZE) as usize)
            .take(SEARCH_PAGE_SIZE as usize)
            .map(|m| format!("[{}] {}: {}", m.created_at.format("%Y-%m-%d %H:%M"), m.role, m.text))
            .collect();
        let rendered = if matches.is_empty() {
            "no results".to_string()
        } else {
            matches.join("\n")
        };
        Ok(ToolResult::from_value(rendered))
    }
}

fn sandbox(tool: &str, err: StoreError) -> ToolError {
    ToolError::Sandbox {
        tool: tool.to_string(),
        message: err.to_string(),
    }
}

fn parse_args<'a, T: Deserialize<'a>>(tool: &str, arguments: &'a str) -> Result<T, ToolError> {
    serde_json::from_str(arguments).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Deserialize)]
struct MessageArgs {
    message: String,
}

#[derive(Deserialize)]
struct ContentArgs {
    content: String,
}

#[derive(Deserialize)]
struct CoreMemoryAppendArgs {
    label: String,
    content: String,
}

#[derive(Deserialize)]
struct CoreMemoryReplaceArgs {
    label: String,
    old_content: String,
    new_content: String,
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    page: Option<u64>,
}

impl<S> ToolGateway for LocalToolGateway<S>
where
    S: BlockStore + ArchivalStore + RecallStore + Send + Sync + 'static,
{
    async fn execute(
        &self,
        name: &str,
        arguments: &str,
        caller: Uuid,
    ) -> Result<ToolResult, ToolError> {
        tracing::debug!(tool = %name, agent.id = %caller, "executing builtin tool");
        match name {
            "send_message" => {
                // Delivery to the end user happens at the outer layer; the
                // tool only validates and acknowledges.
                let args: MessageArgs = parse_args(name, arguments)?;
                let _ = args.message;
                Ok(ToolResult::from_value("message delivered"))
            }
            "core_memory_append" => {
                let args = parse_args(name, arguments)?;
                self.core_memory_append(caller, args).await
            }
            "core_memory_replace" => {
                let args = parse_args(name, arguments)?;
                self.core_memory_replace(caller, args).await
            }
            "archival_memory_insert" => {
                let args = parse_args(name, arguments)?;
                self.archival_memory_insert(caller, args).await
            }
            "archival_memory_search" => {
                let args = parse_args(name, arguments)?;
                self.archival_memory_search(caller, args).await
            }
            "conversation_search" => {
                let args = parse_args(name, arguments)?;
                self.conversation_search(caller, args).await
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

/// Schemas for the builtin tools, offered to the provider.
///
/// Every schema carries the `request_heartbeat` flag the step loop reads
/// to decide whether to chain another iteration.
pub fn builtin_schemas() -> Vec<ToolSchema> {
    fn schema(
        name: &str,
        description: &str,
        mut properties: serde_json::Value,
        required: &[&str],
    ) -> ToolSchema {
        let props = properties
            .as_object_mut()
            .map(std::mem::take)
            .unwrap_or_default();
        let mut all = props;
        all.insert(
            "request_heartbeat".to_string(),
            serde_json::json!({
                "type": "boolean",
                "description": "Request another step after this tool returns."
            }),
        );
        ToolSchema {
            name: name.to_string(),
            description: description.to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": all,
                "required": required,
            }),
        }
    }

    vec![
        schema(
            "send_message",
            "Send a visible message to the user.",
            serde_json::json!({
                "message": {"type": "string", "description": "Message text."}
            }),
            &["message"],
        ),
        schema(
            "core_memory_append",
            "Append content to a core memory block.",
            serde_json::json!({
                "label": {"type": "string", "description": "Block label."},
                "content": {"type": "string", "description": "Content to append."}
            }),
            &["label", "content"],
        ),
        schema(
            "core_memory_replace",
            "Replace content in a core memory block. The old content must match exactly.",
            serde_json::json!({
                "label": {"type": "string", "description": "Block label."},
                "old_content": {"type": "string", "description": "Exact text to replace."},
                "new_content": {"type": "string", "description": "Replacement text."}
            }),
            &["label", "old_content", "new_content"],
        ),
        schema(
            "archival_memory_insert",
            "Store a note in archival memory for later semantic retrieval.",
            serde_json::json!({
                "content": {"type": "string", "description": "Note text."}
            }),
            &["content"],
        ),
        schema(
            "archival_memory_search",
            "Semantic search over archival memory.",
            serde_json::json!({
                "query": {"type": "string", "description": "Search query."},
                "page": {"type": "integer", "description": "Zero-based result page."}
            }),
            &["query"],
        ),
        schema(
            "conversation_search",
            "Text search over the full conversation history.",
            serde_json::json!({
                "query": {"type": "string", "description": "Search query."},
                "page": {"type": "integer", "description": "Zero-based result page."}
            }),
            &["query"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mnemon_core::embed::{BoxEmbedder, HashingEmbedder};
    use mnemon_core::store::memory::InMemoryStore;
    use mnemon_core::store::AgentStore;
    use mnemon_types::agent::{AgentKind, AgentState};
    use mnemon_types::memory::Block;
    use mnemon_types::message::Message;

    async fn gateway_with_agent() -> (LocalToolGateway<InMemoryStore>, Arc<InMemoryStore>, Uuid) {
        let stores = Arc::new(InMemoryStore::new(BoxEmbedder::new(
            HashingEmbedder::new(64),
        )));
        let mut state = AgentState::new("tools", AgentKind::Standard, Uuid::now_v7());
        state
            .memory
            .insert(Block::new("human", "Name: ?", 100).unwrap());
        stores.create_agent(&state).await.unwrap();
        let agent_id = state.id;
        (LocalToolGateway::new(Arc::clone(&stores)), stores, agent_id)
    }

    #[tokio::test]
    async fn test_core_memory_append_and_replace() {
        let (gateway, stores, agent_id) = gateway_with_agent().await;

        gateway
            .execute(
                "core_memory_append",
                r#"{"label":"human","content":"Likes Rust.","request_heartbeat":true}"#,
                agent_id,
            )
            .await
            .unwrap();
        let block = stores.get_block(agent_id, "human").await.unwrap().unwrap();
        assert_eq!(block.value(), "Name: ?\nLikes Rust.");

        gateway
            .execute(
                "core_memory_replace",
                r#"{"label":"human","old_content":"Name: ?","new_content":"Name: Ada"}"#,
                agent_id,
            )
            .await
            .unwrap();
        let block = stores.get_block(agent_id, "human").await.unwrap().unwrap();
        assert_eq!(block.value(), "Name: Ada\nLikes Rust.");
    }

    #[tokio::test]
    async fn test_replace_missing_content_raises() {
        let (gateway, _stores, agent_id) = gateway_with_agent().await;
        let err = gateway
            .execute(
                "core_memory_replace",
                r#"{"label":"human","old_content":"absent","new_content":"x"}"#,
                agent_id,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Sandbox { .. }));
    }

    #[tokio::test]
    async fn test_append_over_limit_raises() {
        let (gateway, _stores, agent_id) = gateway_with_agent().await;
        let long = "x".repeat(200);
        let err = gateway
            .execute(
                "core_memory_append",
                &format!(r#"{{"label":"human","content":"{long}"}}"#),
                agent_id,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Sandbox { .. }));
    }

    #[tokio::test]
    async fn test_archival_insert_then_search() {
        let (gateway, _stores, agent_id) = gateway_with_agent().await;
        gateway
            .execute(
                "archival_memory_insert",
                r#"{"content":"prefers strongly typed languages"}"#,
                agent_id,
            )
            .await
            .unwrap();

        let result = gateway
            .execute(
                "archival_memory_search",
                r#"{"query":"typed languages"}"#,
                agent_id,
            )
            .await
            .unwrap();
        assert!(result.return_value.contains("strongly typed"));
    }

    #[tokio::test]
    async fn test_conversation_search_filters_text() {
        let (gateway, stores, agent_id) = gateway_with_agent().await;
        use mnemon_core::store::RecallStore;
        stores
            .save_messages(&[
                Message::user(agent_id, "talk about rust"),
                Message::user(agent_id, "talk about go"),
            ])
            .await
            .unwrap();

        let result = gateway
            .execute("conversation_search", r#"{"query":"rust"}"#, agent_id)
            .await
            .unwrap();
        assert!(result.return_value.contains("rust"));
        assert!(!result.return_value.contains("go"));
    }

    #[tokio::test]
    async fn test_unknown_tool_and_bad_args() {
        let (gateway, _stores, agent_id) = gateway_with_agent().await;
        assert!(matches!(
            gateway.execute("frobnicate", "{}", agent_id).await.unwrap_err(),
            ToolError::UnknownTool(_)
        ));
        assert!(matches!(
            gateway
                .execute("send_message", r#"{"wrong":"shape"}"#, agent_id)
                .await
                .unwrap_err(),
            ToolError::InvalidArguments { .. }
        ));
    }

    #[test]
    fn test_builtin_schemas_carry_heartbeat_flag() {
        let schemas = builtin_schemas();
        assert_eq!(schemas.len(), 6);
        for schema in &schemas {
            assert!(
                schema.parameters["properties"]["request_heartbeat"].is_object(),
                "{} missing request_heartbeat",
                schema.name
            );
        }
    }
}
