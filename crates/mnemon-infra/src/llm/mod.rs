//! Provider gateway implementations.

pub mod openai;

pub use openai::OpenAiProvider;
