//! The interactive command processor.
//!
//! Commands operate on an already-loaded [`AgentRuntime`] outside the step
//! loop. Parsing and the buffer-local commands live here; commands that
//! need stores or gateways (`save`, `attach`, `memory`, and the two
//! re-entrant ones) are dispatched by the server facade.

use std::fmt::Write as _;

use uuid::Uuid;

use mnemon_types::error::AgentError;
use mnemon_types::usage::UsageStatistics;

use crate::agent::runtime::AgentRuntime;
use crate::agent::system::COMMAND_PREFIX;

/// Default tail size for `pop` when no count is given.
const DEFAULT_POP_COUNT: usize = 3;

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Persist current state without mutating it.
    Save,
    /// Copy a data source's passages into the agent's archival memory.
    Attach { source_id: Uuid },
    /// Render the buffer tail (`None`/0 means the whole buffer).
    Dump { count: Option<usize> },
    /// Render the whole buffer without formatting.
    DumpRaw,
    /// Summarize memory and archival state.
    Memory,
    /// Remove up to `count` messages from the buffer tail.
    Pop { count: usize },
    /// Pop back through the most recent user message.
    Retry,
    /// Replace the nearest assistant message's text.
    Rethink { text: String },
    /// Overwrite the `message` argument of the nearest tool call.
    Rewrite { text: String },
    /// Re-enter the step loop with a synthesized heartbeat.
    Heartbeat,
    /// Re-enter the step loop with a token-limit warning.
    MemoryWarning,
    /// Anything unrecognized; dispatched as a logged no-op.
    Unknown { name: String },
}

/// What a command produced: usage statistics (re-entrant commands and
/// no-ops) or an informational string (read-only commands).
#[derive(Debug)]
pub enum CommandOutcome {
    Usage(UsageStatistics),
    Info(String),
}

/// What a buffer-local command changed, so the outer layer knows what to
/// persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandEffect {
    /// Read-only; nothing to persist.
    None,
    /// The buffer tail was removed; the in-context id list changed.
    Truncated,
    /// One message was edited in place.
    Edited(Uuid),
}

impl Command {
    /// Parse a raw command string, stripping an optional leading command
    /// marker. `exit` and `wipe` belong to an outer layer and are
    /// rejected here.
    pub fn parse(raw: &str) -> Result<Self, AgentError> {
        let raw = raw.trim();
        let raw = raw.strip_prefix(COMMAND_PREFIX).unwrap_or(raw);
        let (name, rest) = match raw.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (raw, ""),
        };

        match name {
            "save" => Ok(Command::Save),
            "attach" => {
                let source_id = rest.parse::<Uuid>().map_err(|_| {
                    AgentError::Validation(format!(
                        "attach requires a source id, got '{rest}'"
                    ))
                })?;
                Ok(Command::Attach { source_id })
            }
            "dump" => {
                let count = if rest.is_empty() {
                    None
                } else {
                    Some(rest.parse::<usize>().map_err(|_| {
                        AgentError::Validation(format!("dump count must be a number, got '{rest}'"))
                    })?)
                };
                Ok(Command::Dump { count })
            }
            "dumpraw" => Ok(Command::DumpRaw),
            "memory" => Ok(Command::Memory),
            "pop" => {
                let count = if rest.is_empty() {
                    DEFAULT_POP_COUNT
                } else {
                    rest.parse::<usize>().map_err(|_| {
                        AgentError::Validation(format!("pop count must be a number, got '{rest}'"))
                    })?
                };
                Ok(Command::Pop { count })
            }
            "retry" => Ok(Command::Retry),
            "rethink" => {
                if rest.is_empty() {
                    return Err(AgentError::Validation(
                        "rethink requires replacement text".to_string(),
                    ));
                }
                Ok(Command::Rethink {
                    text: rest.to_string(),
                })
            }
            "rewrite" => {
                if rest.is_empty() {
                    return Err(AgentError::Validation(
                        "rewrite requires replacement text".to_string(),
                    ));
                }
                Ok(Command::Rewrite {
                    text: rest.to_string(),
                })
            }
            "heartbeat" => Ok(Command::Heartbeat),
            "memorywarning" => Ok(Command::MemoryWarning),
            "exit" | "wipe" => Err(AgentError::InvalidCommand(name.to_string())),
            other => Ok(Command::Unknown {
                name: other.to_string(),
            }),
        }
    }
}

/// Dispatch the commands that only touch the loaded buffer. Returns
/// `None` for commands the server facade must handle.
pub fn apply_local(
    runtime: &mut AgentRuntime,
    command: &Command,
) -> Result<Option<(CommandOutcome, CommandEffect)>, AgentError> {
    let outcome = match command {
        Command::Dump { count } => {
            let buffer = runtime.buffer();
            let start = match count {
                None | Some(0) => 0,
                Some(n) => buffer.len().saturating_sub(*n),
            };
            let mut out = String::new();
            for message in &buffer[start..] {
                let _ = writeln!(out, "[{}] {}", message.role, message.text);
            }
            Some((CommandOutcome::Info(out), CommandEffect::None))
        }
        Command::DumpRaw => {
            let rendered = serde_json::to_string_pretty(runtime.buffer())
                .map_err(|e| AgentError::Consistency(format!("buffer not serializable: {e}")))?;
            Some((CommandOutcome::Info(rendered), CommandEffect::None))
        }
        Command::Pop { count } => {
            let removed = runtime.pop_messages(*count);
            let effect = if removed > 0 {
                CommandEffect::Truncated
            } else {
                CommandEffect::None
            };
            Some((
                CommandOutcome::Info(format!("popped {removed} messages")),
                effect,
            ))
        }
        Command::Retry => {
            let removed = runtime.retry_pop();
            let effect = if removed > 0 {
                CommandEffect::Truncated
            } else {
                CommandEffect::None
            };
            Some((
                CommandOutcome::Info(format!(
                    "popped {removed} messages back through the last user message"
                )),
                effect,
            ))
        }
        Command::Rethink { text } => match runtime.rethink(text) {
            Some(id) => Some((
                CommandOutcome::Info("rewrote last assistant message".to_string()),
                CommandEffect::Edited(id),
            )),
            None => Some((
                CommandOutcome::Info("no assistant message to rethink".to_string()),
                CommandEffect::None,
            )),
        },
        Command::Rewrite { text } => match runtime.rewrite(text)? {
            Some(id) => Some((
                CommandOutcome::Info("rewrote last tool-call message argument".to_string()),
                CommandEffect::Edited(id),
            )),
            None => Some((
                CommandOutcome::Info(
                    "no tool-calling assistant message to rewrite".to_string(),
                ),
                CommandEffect::None,
            )),
        },
        Command::Unknown { name } => {
            tracing::warn!(command = %name, "unknown command, ignoring");
            Some((
                CommandOutcome::Usage(UsageStatistics::default()),
                CommandEffect::None,
            ))
        }
        Command::Save
        | Command::Attach { .. }
        | Command::Memory
        | Command::Heartbeat
        | Command::MemoryWarning => None,
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_types::agent::{AgentKind, AgentState};
    use mnemon_types::message::Message;

    fn loaded(messages: usize) -> AgentRuntime {
        let state = AgentState::new("cmd", AgentKind::Standard, Uuid::now_v7());
        let id = state.id;
        let buffer = (0..messages).map(|i| Message::user(id, format!("m{i}"))).collect();
        AgentRuntime::load(state, buffer).unwrap()
    }

    #[test]
    fn test_parse_strips_marker() {
        assert_eq!(Command::parse("/retry").unwrap(), Command::Retry);
        assert_eq!(Command::parse("retry").unwrap(), Command::Retry);
    }

    #[test]
    fn test_parse_pop_default_and_explicit() {
        assert_eq!(Command::parse("pop").unwrap(), Command::Pop { count: 3 });
        assert_eq!(Command::parse("pop 7").unwrap(), Command::Pop { count: 7 });
        assert!(Command::parse("pop x").is_err());
    }

    #[test]
    fn test_parse_rethink_keeps_whole_text() {
        let cmd = Command::parse("/rethink I was wrong about that").unwrap();
        assert_eq!(
            cmd,
            Command::Rethink {
                text: "I was wrong about that".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_exit_and_wipe() {
        assert!(matches!(
            Command::parse("/exit").unwrap_err(),
            AgentError::InvalidCommand(_)
        ));
        assert!(matches!(
            Command::parse("wipe").unwrap_err(),
            AgentError::InvalidCommand(_)
        ));
    }

    #[test]
    fn test_parse_attach_requires_uuid() {
        assert!(Command::parse("attach not-a-uuid").is_err());
        let id = Uuid::now_v7();
        assert_eq!(
            Command::parse(&format!("attach {id}")).unwrap(),
            Command::Attach { source_id: id }
        );
    }

    #[test]
    fn test_unknown_command_is_zero_usage_noop() {
        let mut rt = loaded(3);
        let (outcome, effect) = apply_local(
            &mut rt,
            &Command::Unknown {
                name: "frobnicate".to_string(),
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(effect, CommandEffect::None);
        match outcome {
            CommandOutcome::Usage(usage) => {
                assert_eq!(usage.step_count, 0);
                assert_eq!(usage.total_tokens, 0);
            }
            CommandOutcome::Info(_) => panic!("expected usage outcome"),
        }
        assert_eq!(rt.buffer().len(), 3);
    }

    #[test]
    fn test_dump_tail_window() {
        let mut rt = loaded(5);
        let Some((CommandOutcome::Info(out), CommandEffect::None)) =
            apply_local(&mut rt, &Command::Dump { count: Some(2) }).unwrap()
        else {
            panic!("expected read-only info outcome");
        };
        assert!(out.contains("m3"));
        assert!(out.contains("m4"));
        assert!(!out.contains("m2"));
    }

    #[test]
    fn test_pop_reports_truncation_effect() {
        let mut rt = loaded(5);
        let Some((_, effect)) = apply_local(&mut rt, &Command::Pop { count: 2 }).unwrap() else {
            panic!("expected local outcome");
        };
        assert_eq!(effect, CommandEffect::Truncated);
        assert_eq!(rt.buffer().len(), 3);
    }

    #[test]
    fn test_server_side_commands_defer() {
        let mut rt = loaded(2);
        assert!(apply_local(&mut rt, &Command::Save).unwrap().is_none());
        assert!(apply_local(&mut rt, &Command::Memory).unwrap().is_none());
        assert!(apply_local(&mut rt, &Command::Heartbeat).unwrap().is_none());
    }
}
