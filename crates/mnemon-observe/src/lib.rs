//! Observability for Mnemon: tracing subscriber setup and the GenAI
//! semantic-convention attribute names used on agent and provider spans.

pub mod genai_attrs;
pub mod tracing_setup;
