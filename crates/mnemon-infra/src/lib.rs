//! Infrastructure implementations for Mnemon.
//!
//! Durable SQLite-backed stores, the OpenAI-compatible provider gateway,
//! the local tool gateway with the builtin memory tools, and the global
//! configuration loader. Everything here implements contracts defined in
//! `mnemon-core`.

pub mod config;
pub mod llm;
pub mod sqlite;
pub mod tool;
