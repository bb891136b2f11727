//! OpenTelemetry GenAI Semantic Convention attribute constants.
//!
//! These follow the OTel GenAI Semantic Conventions specification so agent
//! and provider spans use consistent attribute names. All constants are
//! string slices usable in `tracing::span!` field names.
//!
//! Span naming convention: `"{operation} {model}"` (e.g., `"chat gpt-4o"`).

// --- Required attributes ---

/// The name of the operation being performed (e.g., "chat", "invoke_agent").
pub const GEN_AI_OPERATION_NAME: &str = "gen_ai.operation.name";

/// The name of the GenAI provider (e.g., "openai").
pub const GEN_AI_PROVIDER_NAME: &str = "gen_ai.provider.name";

// --- Recommended attributes ---

/// The model ID requested (e.g., "gpt-4o").
pub const GEN_AI_REQUEST_MODEL: &str = "gen_ai.request.model";

/// The sampling temperature for the request.
pub const GEN_AI_REQUEST_TEMPERATURE: &str = "gen_ai.request.temperature";

/// The maximum number of output tokens requested.
pub const GEN_AI_REQUEST_MAX_TOKENS: &str = "gen_ai.request.max_tokens";

/// The number of input tokens consumed.
pub const GEN_AI_USAGE_INPUT_TOKENS: &str = "gen_ai.usage.input_tokens";

/// The number of output tokens generated.
pub const GEN_AI_USAGE_OUTPUT_TOKENS: &str = "gen_ai.usage.output_tokens";

/// The tool name requested by the model, when the response is a tool call.
pub const GEN_AI_TOOL_NAME: &str = "gen_ai.tool.name";

// --- Agent-specific attributes ---

/// The unique identifier of the agent.
pub const GEN_AI_AGENT_ID: &str = "gen_ai.agent.id";

/// The display name of the agent.
pub const GEN_AI_AGENT_NAME: &str = "gen_ai.agent.name";

// --- Operation name values ---

/// Standard chat completion operation.
pub const OP_CHAT: &str = "chat";

/// One full step-loop invocation for an agent.
pub const OP_INVOKE_AGENT: &str = "invoke_agent";

/// A sandboxed tool execution.
pub const OP_EXECUTE_TOOL: &str = "execute_tool";
