//! The step/chaining loop and in-context buffer surgery.
//!
//! An [`AgentRuntime`] is an exclusively checked-out copy of one agent's
//! state plus its in-context message buffer. It exists only while the
//! agent's lock is held; the outer layer loads it, drives [`AgentRuntime::step`]
//! or a command against it, persists it on success, and drops it.

use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use mnemon_types::agent::AgentState;
use mnemon_types::error::AgentError;
use mnemon_types::llm::{ProviderError, ToolSchema};
use mnemon_types::memory::CoreMemory;
use mnemon_types::message::{Message, MessageRole, ToolReturnStatus};
use mnemon_types::usage::UsageStatistics;

use crate::agent::context::{build_request, compile_system_prompt};
use crate::agent::system::{package_tool_result, truncate_error};
use crate::llm::BoxProvider;
use crate::store::BlockStore;
use crate::tool::BoxToolGateway;

/// Argument key a tool call sets to request another loop iteration.
pub const HEARTBEAT_ARGUMENT: &str = "request_heartbeat";

/// Caller-supplied knobs for one step invocation.
#[derive(Debug, Clone, Copy)]
pub struct StepOptions {
    /// Whether heartbeat requests may trigger further loop iterations.
    pub chaining: bool,
    /// Hard ceiling on loop iterations. `None` means unbounded.
    pub max_chaining_steps: Option<u64>,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            chaining: true,
            max_chaining_steps: None,
        }
    }
}

/// A loaded agent: state, in-context buffer, and the compiled system
/// prompt. Valid only while the agent's lock is held.
#[derive(Debug)]
pub struct AgentRuntime {
    pub state: AgentState,
    buffer: Vec<Message>,
    system_prompt: String,
    /// Buffer prefix length already present in recall storage. Everything
    /// past this index is new this checkout and must be persisted on a
    /// successful exit.
    persisted_len: usize,
}

impl AgentRuntime {
    /// Assemble a runtime from loaded state and its resolved buffer.
    ///
    /// Rejects state without an owning user as a fatal precondition
    /// failure.
    pub fn load(state: AgentState, buffer: Vec<Message>) -> Result<Self, AgentError> {
        if state.owner_id.is_none() {
            return Err(AgentError::Consistency(format!(
                "agent {} has no owning user",
                state.id
            )));
        }
        let system_prompt = compile_system_prompt(&state.memory);
        let persisted_len = buffer.len();
        Ok(Self {
            state,
            buffer,
            system_prompt,
            persisted_len,
        })
    }

    pub fn agent_id(&self) -> Uuid {
        self.state.id
    }

    pub fn buffer(&self) -> &[Message] {
        &self.buffer
    }

    /// Messages appended (not edited) since load; the slice the outer
    /// layer appends to recall storage on persist.
    pub fn new_messages(&self) -> &[Message] {
        &self.buffer[self.persisted_len.min(self.buffer.len())..]
    }

    /// Record that the current buffer has been fully persisted.
    pub fn mark_persisted(&mut self) {
        self.persisted_len = self.buffer.len();
        self.state.message_ids = self.buffer.iter().map(|m| m.id).collect();
    }

    /// Replace core memory with freshly loaded blocks and recompile the
    /// system prompt.
    pub fn refresh_memory(&mut self, memory: CoreMemory) {
        self.state.memory = memory;
        self.system_prompt = compile_system_prompt(&self.state.memory);
    }

    /// Run the step/chaining loop with `input` as the new turn's messages.
    ///
    /// Provider failures and malformed tool-call requests abort the loop;
    /// sandbox failures are converted into error-status tool returns and
    /// fed back to the next provider call. Nothing is persisted here; the
    /// caller persists on a normal return and discards this runtime on an
    /// error.
    pub async fn step<B: BlockStore>(
        &mut self,
        blocks: &B,
        provider: &BoxProvider,
        tools: &BoxToolGateway,
        schemas: &[ToolSchema],
        input: Vec<Message>,
        opts: StepOptions,
    ) -> Result<UsageStatistics, AgentError> {
        if input.is_empty() {
            return Err(AgentError::Validation(
                "step requires a non-empty message batch".to_string(),
            ));
        }

        let chaining = opts.chaining && !self.state.kind.forces_single_step();
        let mut usage = UsageStatistics::default();
        self.buffer.extend(input);

        loop {
            let request = build_request(&self.state, &self.system_prompt, &self.buffer, schemas);
            let span = tracing::info_span!(
                "gen_ai.completion",
                gen_ai.request.model = %self.state.model.model,
                agent.id = %self.state.id,
                step = usage.step_count + 1,
            );
            let response = provider.complete(&request).instrument(span).await?;
            usage.add_tokens(response.usage.prompt_tokens, response.usage.completion_tokens);

            let assistant = Message::assistant(
                self.state.id,
                response.text.clone().unwrap_or_default(),
                response.tool_call.clone(),
            );
            self.buffer.push(assistant);

            let mut heartbeat = false;
            if let Some(call) = response.tool_call {
                let args: Value = serde_json::from_str(&call.arguments).map_err(|e| {
                    ProviderError::MalformedToolCall {
                        name: call.name.clone(),
                        reason: format!("arguments are not valid JSON: {e}"),
                    }
                })?;
                let Some(args_map) = args.as_object() else {
                    return Err(ProviderError::MalformedToolCall {
                        name: call.name.clone(),
                        reason: "arguments are not a JSON object".to_string(),
                    }
                    .into());
                };
                heartbeat = args_map
                    .get(HEARTBEAT_ARGUMENT)
                    .and_then(Value::as_bool)
                    .unwrap_or(false);

                match tools.execute(&call.name, &call.arguments, self.state.id).await {
                    Ok(result) => {
                        tracing::debug!(tool = %call.name, "tool call succeeded");
                        self.buffer.push(Message::tool_return(
                            self.state.id,
                            package_tool_result(&result.return_value, ToolReturnStatus::Success),
                            call.id.clone(),
                            ToolReturnStatus::Success,
                        ));
                        // Memory-editing tools mutate blocks through the
                        // gateway; pick the edits up before the next call.
                        let refreshed = blocks.list_blocks(self.state.id).await?;
                        self.refresh_memory(CoreMemory::new(refreshed));
                    }
                    Err(err) => {
                        tracing::warn!(tool = %call.name, error = %err, "tool call raised");
                        let text = truncate_error(&err.to_string());
                        self.buffer.push(Message::tool_return(
                            self.state.id,
                            package_tool_result(&text, ToolReturnStatus::Error),
                            call.id.clone(),
                            ToolReturnStatus::Error,
                        ));
                        // A raise still warrants a follow-up call so the
                        // model can react to the failure.
                        heartbeat = true;
                    }
                }
            }

            usage.step_count += 1;

            let under_cap = opts
                .max_chaining_steps
                .is_none_or(|cap| usage.step_count < cap);
            if !(chaining && heartbeat && under_cap) {
                break;
            }

            self.buffer.push(Message::user(
                self.state.id,
                crate::agent::system::get_heartbeat("prior tool call requested continuation"),
            ));
        }

        Ok(usage)
    }

    /// `pop [n]`: remove up to `n` messages from the tail, never shrinking
    /// the buffer below two messages. Returns the removed count.
    pub fn pop_messages(&mut self, n: usize) -> usize {
        let len = self.buffer.len();
        if len <= 2 {
            return 0;
        }
        let removed = n.min(len - 2);
        self.buffer.truncate(len - removed);
        self.clamp_persisted();
        removed
    }

    /// `retry`: pop from the tail until a user-role message has been
    /// popped (inclusive), or the buffer empties. Returns the removed
    /// count.
    pub fn retry_pop(&mut self) -> usize {
        let mut removed = 0;
        while let Some(message) = self.buffer.pop() {
            removed += 1;
            if message.role == MessageRole::User {
                break;
            }
        }
        self.clamp_persisted();
        removed
    }

    /// `rethink <text>`: replace the text of the assistant message nearest
    /// the tail (index 0 excluded). Returns the edited message id, or
    /// `None` when no target exists.
    pub fn rethink(&mut self, text: &str) -> Option<Uuid> {
        for message in self.buffer.iter_mut().skip(1).rev() {
            if message.role == MessageRole::Assistant {
                message.text = text.to_string();
                return Some(message.id);
            }
        }
        None
    }

    /// `rewrite <text>`: overwrite the `message` argument of the assistant
    /// message nearest the tail (index 0 excluded). The scan stops at the
    /// nearest assistant even when it carries no tool call; that case is
    /// a no-op rather than a fallthrough to an older assistant. Returns
    /// the edited message id, or `None` when no target exists.
    pub fn rewrite(&mut self, text: &str) -> Result<Option<Uuid>, AgentError> {
        for message in self.buffer.iter_mut().skip(1).rev() {
            if message.role != MessageRole::Assistant {
                continue;
            }
            let Some(call) = message.tool_call.as_mut() else {
                return Ok(None);
            };
            let mut args: Value = serde_json::from_str(&call.arguments)
                .map_err(|e| AgentError::Consistency(format!("stored tool-call arguments are not valid JSON: {e}")))?;
            let Some(map) = args.as_object_mut() else {
                return Err(AgentError::Consistency(
                    "stored tool-call arguments are not a JSON object".to_string(),
                ));
            };
            map.insert("message".to_string(), Value::String(text.to_string()));
            call.arguments = args.to_string();
            return Ok(Some(message.id));
        }
        Ok(None)
    }

    /// Look up a buffered message by id.
    pub fn get_buffered(&self, id: Uuid) -> Option<&Message> {
        self.buffer.iter().find(|m| m.id == id)
    }

    /// Edits and pops can reach into the already-persisted prefix; keep
    /// the new-message watermark inside the buffer.
    fn clamp_persisted(&mut self) {
        self.persisted_len = self.persisted_len.min(self.buffer.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use mnemon_types::agent::AgentKind;
    use mnemon_types::error::StoreError;
    use mnemon_types::llm::{ProviderRequest, ProviderResponse, TokenUsage};
    use mnemon_types::memory::Block;
    use mnemon_types::message::ToolCall;
    use mnemon_types::tool::{ToolError, ToolResult};

    use crate::llm::provider::ProviderGateway;
    use crate::tool::gateway::ToolGateway;

    struct NoBlocks;

    impl BlockStore for NoBlocks {
        async fn get_block(&self, _: Uuid, _: &str) -> Result<Option<Block>, StoreError> {
            Ok(None)
        }
        async fn list_blocks(&self, _: Uuid) -> Result<Vec<Block>, StoreError> {
            Ok(Vec::new())
        }
        async fn update_block(&self, _: Uuid, _: &str) -> Result<Block, StoreError> {
            Err(StoreError::NotFound)
        }
    }

    /// Replays a scripted list of responses, then text-only answers.
    struct ScriptedProvider {
        responses: Mutex<Vec<ProviderResponse>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ProviderResponse>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    impl ProviderGateway for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: &ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(text_response("done"))
            } else {
                Ok(responses.remove(0))
            }
        }
    }

    struct OkTool;

    impl ToolGateway for OkTool {
        async fn execute(
            &self,
            _name: &str,
            _arguments: &str,
            _caller: Uuid,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::from_value("ok"))
        }
    }

    struct RaisingTool {
        message: String,
    }

    impl ToolGateway for RaisingTool {
        async fn execute(
            &self,
            name: &str,
            _arguments: &str,
            _caller: Uuid,
        ) -> Result<ToolResult, ToolError> {
            Err(ToolError::Sandbox {
                tool: name.to_string(),
                message: self.message.clone(),
            })
        }
    }

    fn text_response(text: &str) -> ProviderResponse {
        ProviderResponse {
            text: Some(text.to_string()),
            tool_call: None,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            },
        }
    }

    fn tool_response(arguments: &str) -> ProviderResponse {
        ProviderResponse {
            text: None,
            tool_call: Some(ToolCall {
                id: Uuid::now_v7().to_string(),
                name: "archival_memory_insert".to_string(),
                arguments: arguments.to_string(),
            }),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            },
        }
    }

    fn runtime(kind: AgentKind) -> AgentRuntime {
        let state = AgentState::new("test-agent", kind, Uuid::now_v7());
        AgentRuntime::load(state, Vec::new()).unwrap()
    }

    fn user_input(agent_id: Uuid) -> Vec<Message> {
        vec![Message::user(agent_id, "hello")]
    }

    #[tokio::test]
    async fn test_no_tool_call_yields_single_step() {
        let mut rt = runtime(AgentKind::Standard);
        let provider = BoxProvider::new(ScriptedProvider::new(vec![]));
        let tools = BoxToolGateway::new(OkTool);
        let input = user_input(rt.agent_id());

        let usage = rt
            .step(&NoBlocks, &provider, &tools, &[], input, StepOptions::default())
            .await
            .unwrap();

        assert_eq!(usage.step_count, 1);
        assert_eq!(usage.total_tokens, 15);
        // user input + assistant reply
        assert_eq!(rt.buffer().len(), 2);
        assert_eq!(rt.new_messages().len(), 2);
    }

    #[tokio::test]
    async fn test_chaining_stops_at_cap() {
        let mut rt = runtime(AgentKind::Standard);
        // Always requests a heartbeat; would loop forever without the cap.
        let always: Vec<ProviderResponse> = (0..16)
            .map(|_| tool_response(r#"{"text":"x","request_heartbeat":true}"#))
            .collect();
        let provider = BoxProvider::new(ScriptedProvider::new(always));
        let tools = BoxToolGateway::new(OkTool);
        let input = user_input(rt.agent_id());

        let usage = rt
            .step(
                &NoBlocks,
                &provider,
                &tools,
                &[],
                input,
                StepOptions {
                    chaining: true,
                    max_chaining_steps: Some(3),
                },
            )
            .await
            .unwrap();

        assert_eq!(usage.step_count, 3);
    }

    #[tokio::test]
    async fn test_no_chaining_short_circuits() {
        let mut rt = runtime(AgentKind::Standard);
        let provider = BoxProvider::new(ScriptedProvider::new(vec![tool_response(
            r#"{"text":"x","request_heartbeat":true}"#,
        )]));
        let tools = BoxToolGateway::new(OkTool);
        let input = user_input(rt.agent_id());

        let usage = rt
            .step(
                &NoBlocks,
                &provider,
                &tools,
                &[],
                input,
                StepOptions {
                    chaining: false,
                    max_chaining_steps: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(usage.step_count, 1);
    }

    #[tokio::test]
    async fn test_single_turn_kind_ignores_heartbeats() {
        let mut rt = runtime(AgentKind::SingleTurn);
        let provider = BoxProvider::new(ScriptedProvider::new(vec![tool_response(
            r#"{"request_heartbeat":true}"#,
        )]));
        let tools = BoxToolGateway::new(OkTool);
        let input = user_input(rt.agent_id());

        let usage = rt
            .step(&NoBlocks, &provider, &tools, &[], input, StepOptions::default())
            .await
            .unwrap();

        assert_eq!(usage.step_count, 1);
    }

    #[tokio::test]
    async fn test_tool_raise_is_recoverable_and_truncated() {
        let mut rt = runtime(AgentKind::Standard);
        let provider = BoxProvider::new(ScriptedProvider::new(vec![tool_response(
            r#"{"request_heartbeat":false}"#,
        )]));
        let tools = BoxToolGateway::new(RaisingTool {
            message: "y".repeat(4000),
        });
        let input = user_input(rt.agent_id());

        let usage = rt
            .step(
                &NoBlocks,
                &provider,
                &tools,
                &[],
                input,
                StepOptions {
                    chaining: true,
                    max_chaining_steps: Some(2),
                },
            )
            .await
            .unwrap();

        // The raise forces a follow-up call; the scripted provider then
        // answers with plain text.
        assert_eq!(usage.step_count, 2);
        let tool_msg = rt
            .buffer()
            .iter()
            .find(|m| m.role == MessageRole::Tool)
            .unwrap();
        assert_eq!(tool_msg.tool_return_status, Some(ToolReturnStatus::Error));
        let envelope: Value = serde_json::from_str(&tool_msg.text).unwrap();
        let text = envelope["message"].as_str().unwrap();
        assert!(text.chars().count() <= crate::agent::system::ERROR_MESSAGE_CHAR_LIMIT);
    }

    #[tokio::test]
    async fn test_non_object_arguments_are_fatal() {
        let mut rt = runtime(AgentKind::Standard);
        let provider =
            BoxProvider::new(ScriptedProvider::new(vec![tool_response(r#"[1,2,3]"#)]));
        let tools = BoxToolGateway::new(OkTool);
        let input = user_input(rt.agent_id());

        let err = rt
            .step(&NoBlocks, &provider, &tools, &[], input, StepOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AgentError::Provider(ProviderError::MalformedToolCall { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let mut rt = runtime(AgentKind::Standard);
        let provider = BoxProvider::new(ScriptedProvider::new(vec![]));
        let tools = BoxToolGateway::new(OkTool);

        let err = rt
            .step(&NoBlocks, &provider, &tools, &[], vec![], StepOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
    }

    fn seeded_runtime(roles: &[(MessageRole, &str)]) -> AgentRuntime {
        let state = AgentState::new("test-agent", AgentKind::Standard, Uuid::now_v7());
        let id = state.id;
        let buffer = roles
            .iter()
            .map(|(role, text)| match role {
                MessageRole::System => Message::system(id, *text),
                MessageRole::User => Message::user(id, *text),
                MessageRole::Assistant => Message::assistant(id, *text, None),
                MessageRole::Tool => Message::tool_return(
                    id,
                    *text,
                    "call-0",
                    ToolReturnStatus::Success,
                ),
            })
            .collect();
        AgentRuntime::load(state, buffer).unwrap()
    }

    #[test]
    fn test_pop_preserves_floor_of_two() {
        let mut rt = seeded_runtime(&[
            (MessageRole::System, "s"),
            (MessageRole::User, "u"),
            (MessageRole::Assistant, "a"),
            (MessageRole::Tool, "t"),
            (MessageRole::Assistant, "b"),
        ]);
        assert_eq!(rt.pop_messages(10), 3);
        assert_eq!(rt.buffer().len(), 2);

        let mut rt = seeded_runtime(&[(MessageRole::System, "s"), (MessageRole::User, "u")]);
        assert_eq!(rt.pop_messages(1), 0);
        assert_eq!(rt.buffer().len(), 2);
    }

    #[test]
    fn test_retry_pops_through_last_user() {
        let mut rt = seeded_runtime(&[
            (MessageRole::System, "s"),
            (MessageRole::User, "u"),
            (MessageRole::Assistant, "a"),
            (MessageRole::Tool, "t"),
            (MessageRole::Assistant, "b"),
        ]);
        assert_eq!(rt.retry_pop(), 4);
        assert_eq!(rt.buffer().len(), 1);
        assert_eq!(rt.buffer()[0].role, MessageRole::System);
    }

    #[test]
    fn test_rethink_targets_nearest_assistant() {
        let mut rt = seeded_runtime(&[
            (MessageRole::System, "s"),
            (MessageRole::User, "u"),
            (MessageRole::Assistant, "A"),
            (MessageRole::Tool, "t"),
            (MessageRole::Assistant, "B"),
        ]);
        let edited = rt.rethink("C").unwrap();
        assert_eq!(edited, rt.buffer()[4].id);
        assert_eq!(rt.buffer()[4].text, "C");
        assert_eq!(rt.buffer()[2].text, "A");
    }

    #[test]
    fn test_rethink_excludes_index_zero() {
        let mut rt = seeded_runtime(&[
            (MessageRole::Assistant, "first"),
            (MessageRole::User, "u"),
        ]);
        assert!(rt.rethink("C").is_none());
        assert_eq!(rt.buffer()[0].text, "first");
    }

    #[test]
    fn test_rewrite_overwrites_message_argument() {
        let state = AgentState::new("test-agent", AgentKind::Standard, Uuid::now_v7());
        let id = state.id;
        let call = ToolCall {
            id: "call-1".to_string(),
            name: "send_message".to_string(),
            arguments: r#"{"message":"old","request_heartbeat":false}"#.to_string(),
        };
        let buffer = vec![
            Message::system(id, "s"),
            Message::user(id, "u"),
            Message::assistant(id, "", Some(call)),
        ];
        let mut rt = AgentRuntime::load(state, buffer).unwrap();

        assert!(rt.rewrite("new words").unwrap().is_some());
        let args: Value =
            serde_json::from_str(&rt.buffer()[2].tool_call.as_ref().unwrap().arguments).unwrap();
        assert_eq!(args["message"], "new words");
        assert_eq!(args["request_heartbeat"], false);
    }

    #[test]
    fn test_rewrite_without_tool_call_is_noop() {
        let mut rt = seeded_runtime(&[
            (MessageRole::System, "s"),
            (MessageRole::User, "u"),
            (MessageRole::Assistant, "plain"),
        ]);
        assert!(rt.rewrite("x").unwrap().is_none());
    }

    #[test]
    fn test_rewrite_stops_at_nearest_assistant() {
        // An older tool-calling assistant must not be edited when the
        // nearest assistant has no tool call.
        let state = AgentState::new("test-agent", AgentKind::Standard, Uuid::now_v7());
        let id = state.id;
        let call = ToolCall {
            id: "call-1".to_string(),
            name: "send_message".to_string(),
            arguments: r#"{"message":"old"}"#.to_string(),
        };
        let buffer = vec![
            Message::system(id, "s"),
            Message::user(id, "u"),
            Message::assistant(id, "", Some(call)),
            Message::tool_return(id, "ok", "call-1", ToolReturnStatus::Success),
            Message::assistant(id, "plain", None),
        ];
        let mut rt = AgentRuntime::load(state, buffer).unwrap();

        assert!(rt.rewrite("x").unwrap().is_none());
        let args: Value =
            serde_json::from_str(&rt.buffer()[2].tool_call.as_ref().unwrap().arguments).unwrap();
        assert_eq!(args["message"], "old");
    }

    #[test]
    fn test_load_requires_owner() {
        let mut state = AgentState::new("orphan", AgentKind::Standard, Uuid::now_v7());
        state.owner_id = None;
        let err = AgentRuntime::load(state, Vec::new()).unwrap_err();
        assert!(matches!(err, AgentError::Consistency(_)));
    }
}
