//! Server facade: validation, locking, load/step/persist orchestration.
//!
//! [`AgentServer`] is the entry point the outer request layer consumes.
//! Every mutating call for an agent runs its whole load -> mutate ->
//! persist span under that agent's lock from the [`LockRegistry`];
//! validation happens first, before any lock is taken.

use std::sync::Arc;

use uuid::Uuid;

use mnemon_types::agent::AgentState;
use mnemon_types::error::AgentError;
use mnemon_types::job::{Job, JobStatus};
use mnemon_types::llm::ToolSchema;
use mnemon_types::memory::{Block, Passage};
use mnemon_types::message::{Message, MessageCreate, MessageRole};
use mnemon_types::usage::UsageStatistics;

use crate::agent::command::{apply_local, Command, CommandEffect, CommandOutcome};
use crate::agent::runtime::{AgentRuntime, StepOptions};
use crate::agent::system::{
    get_heartbeat, get_token_limit_warning, package_system_message, package_user_message,
    COMMAND_PREFIX,
};
use crate::llm::BoxProvider;
use crate::lock::LockRegistry;
use crate::store::{AgentStore, ArchivalStore, BlockStore, JobStore, RecallStore};
use crate::tool::BoxToolGateway;

/// One combined bound for the store backend: the facade needs all five
/// persistence contracts from the same backend.
pub trait Stores:
    AgentStore + BlockStore + RecallStore + ArchivalStore + JobStore + 'static
{
}

impl<T> Stores for T where
    T: AgentStore + BlockStore + RecallStore + ArchivalStore + JobStore + 'static
{
}

/// The engine's outward surface.
pub struct AgentServer<S: Stores> {
    stores: Arc<S>,
    provider: BoxProvider,
    tools: BoxToolGateway,
    schemas: Vec<ToolSchema>,
    locks: LockRegistry,
    chaining: bool,
    /// Server-wide default ceiling on chaining; `None` honors unbounded
    /// chaining for callers that want it.
    max_chaining_steps: Option<u64>,
}

impl<S: Stores> AgentServer<S> {
    pub fn new(
        stores: Arc<S>,
        provider: BoxProvider,
        tools: BoxToolGateway,
        schemas: Vec<ToolSchema>,
    ) -> Self {
        Self {
            stores,
            provider,
            tools,
            schemas,
            locks: LockRegistry::new(),
            chaining: true,
            max_chaining_steps: None,
        }
    }

    /// Override the chaining defaults applied to every step invocation.
    pub fn with_chaining(mut self, chaining: bool, max_chaining_steps: Option<u64>) -> Self {
        self.chaining = chaining;
        self.max_chaining_steps = max_chaining_steps;
        self
    }

    pub fn stores(&self) -> &Arc<S> {
        &self.stores
    }

    // ---- agent lifecycle ----

    pub async fn create_agent(&self, state: &AgentState) -> Result<(), AgentError> {
        if state.owner_id.is_none() {
            return Err(AgentError::Validation(
                "agent must have an owning user".to_string(),
            ));
        }
        self.stores.create_agent(state).await?;
        tracing::info!(agent.id = %state.id, agent.name = %state.name, "created agent");
        Ok(())
    }

    pub async fn get_agent(&self, agent_id: Uuid) -> Result<AgentState, AgentError> {
        self.stores
            .get_agent(agent_id)
            .await?
            .ok_or(AgentError::NotFound {
                kind: "agent",
                id: agent_id.to_string(),
            })
    }

    pub async fn delete_agent(&self, agent_id: Uuid) -> Result<(), AgentError> {
        self.ensure_agent(agent_id).await?;
        let lock = self.locks.get_lock(agent_id);
        let _guard = lock.lock().await;
        self.stores.delete_agent(agent_id).await?;
        self.locks.clear(agent_id);
        Ok(())
    }

    /// NotFound fast path run before any lock allocation: unknown agent
    /// ids must never leave an entry in the lock registry.
    async fn ensure_agent(&self, agent_id: Uuid) -> Result<(), AgentError> {
        self.get_agent(agent_id).await.map(|_| ())
    }

    // ---- message submission ----

    /// Submit one user message. Packaged into the user envelope, then run
    /// through the step loop.
    pub async fn user_message(
        &self,
        actor: Uuid,
        agent_id: Uuid,
        text: &str,
    ) -> Result<UsageStatistics, AgentError> {
        let text = Self::validate_text(text)?;
        let packaged = package_user_message(text, None);
        self.step_agent(actor, agent_id, vec![Message::user(agent_id, packaged)])
            .await
    }

    /// Submit one system message (automated alerts, not user speech).
    pub async fn system_message(
        &self,
        actor: Uuid,
        agent_id: Uuid,
        text: &str,
    ) -> Result<UsageStatistics, AgentError> {
        let text = Self::validate_text(text)?;
        let packaged = package_system_message(text);
        self.step_agent(actor, agent_id, vec![Message::system(agent_id, packaged)])
            .await
    }

    /// Submit an ordered batch of user/system messages as one turn.
    pub async fn send_messages(
        &self,
        actor: Uuid,
        agent_id: Uuid,
        batch: Vec<MessageCreate>,
    ) -> Result<UsageStatistics, AgentError> {
        if batch.is_empty() {
            return Err(AgentError::Validation(
                "message batch must not be empty".to_string(),
            ));
        }
        let mut input = Vec::with_capacity(batch.len());
        for create in &batch {
            let text = Self::validate_text(&create.text)?;
            let message = match create.role {
                MessageRole::User => {
                    Message::user(agent_id, package_user_message(text, None))
                }
                MessageRole::System => {
                    Message::system(agent_id, package_system_message(text))
                }
                other => {
                    return Err(AgentError::Validation(format!(
                        "only user and system messages can be submitted, got role '{other}'"
                    )));
                }
            };
            input.push(message);
        }
        self.step_agent(actor, agent_id, input).await
    }

    /// Validation applied before any lock is taken: no empty content, no
    /// command-prefixed content smuggled in as a plain message.
    fn validate_text(text: &str) -> Result<&str, AgentError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(AgentError::Validation(
                "message text must not be empty".to_string(),
            ));
        }
        if trimmed.starts_with(COMMAND_PREFIX) {
            return Err(AgentError::Validation(format!(
                "message text must not start with '{COMMAND_PREFIX}'; use a command invocation"
            )));
        }
        Ok(trimmed)
    }

    /// The load -> step -> persist span, executed under the agent's lock.
    pub async fn step_agent(
        &self,
        actor: Uuid,
        agent_id: Uuid,
        input: Vec<Message>,
    ) -> Result<UsageStatistics, AgentError> {
        if input.is_empty() {
            return Err(AgentError::Validation(
                "step requires a non-empty message batch".to_string(),
            ));
        }
        self.ensure_agent(agent_id).await?;

        let lock = self.locks.get_lock(agent_id);
        let _guard = lock.lock().await;
        tracing::debug!(agent.id = %agent_id, actor.id = %actor, "acquired agent lock");

        let mut runtime = self.load_runtime(agent_id).await?;
        let options = StepOptions {
            chaining: self.chaining,
            max_chaining_steps: self.max_chaining_steps,
        };
        let usage = runtime
            .step(
                self.stores.as_ref(),
                &self.provider,
                &self.tools,
                &self.schemas,
                input,
                options,
            )
            .await?;

        self.persist(&mut runtime).await?;
        tracing::info!(
            agent.id = %agent_id,
            steps = usage.step_count,
            tokens = usage.total_tokens,
            "step completed"
        );
        Ok(usage)
    }

    async fn load_runtime(&self, agent_id: Uuid) -> Result<AgentRuntime, AgentError> {
        let state = self.get_agent(agent_id).await?;
        let mut buffer = Vec::with_capacity(state.message_ids.len());
        for id in &state.message_ids {
            let message =
                self.stores.get_message(*id).await?.ok_or_else(|| {
                    AgentError::Consistency(format!(
                        "in-context message {id} missing from recall storage"
                    ))
                })?;
            buffer.push(message);
        }
        AgentRuntime::load(state, buffer)
    }

    /// Persist a successfully stepped runtime: new messages go to recall,
    /// then state (buffer ids, memory) is saved.
    async fn persist(&self, runtime: &mut AgentRuntime) -> Result<(), AgentError> {
        self.stores.save_messages(runtime.new_messages()).await?;
        runtime.mark_persisted();
        self.stores.save_agent(&runtime.state).await?;
        Ok(())
    }

    // ---- commands ----

    /// Parse and dispatch one command string.
    ///
    /// The two re-entrant commands synthesize a control message and go
    /// through the normal step path; everything else runs under the lock
    /// without touching the provider.
    pub async fn run_command(
        &self,
        actor: Uuid,
        agent_id: Uuid,
        raw: &str,
    ) -> Result<CommandOutcome, AgentError> {
        let command = Command::parse(raw)?;
        tracing::debug!(agent.id = %agent_id, command = ?command, "dispatching command");

        // Re-entrant commands must not hold the (non-reentrant) lock here;
        // step_agent takes it itself.
        match &command {
            Command::Heartbeat => {
                let input = Message::user(agent_id, get_heartbeat("manual heartbeat command"));
                let usage = self.step_agent(actor, agent_id, vec![input]).await?;
                return Ok(CommandOutcome::Usage(usage));
            }
            Command::MemoryWarning => {
                let input = Message::system(agent_id, get_token_limit_warning());
                let usage = self.step_agent(actor, agent_id, vec![input]).await?;
                return Ok(CommandOutcome::Usage(usage));
            }
            _ => {}
        }

        self.ensure_agent(agent_id).await?;
        let lock = self.locks.get_lock(agent_id);
        let _guard = lock.lock().await;
        let mut runtime = self.load_runtime(agent_id).await?;

        if let Some((outcome, effect)) = apply_local(&mut runtime, &command)? {
            self.persist_effect(&mut runtime, &effect).await?;
            return Ok(outcome);
        }

        match command {
            Command::Save => {
                self.persist(&mut runtime).await?;
                Ok(CommandOutcome::Info("agent state saved".to_string()))
            }
            Command::Attach { source_id } => {
                let count = self.stores.attach_source(agent_id, source_id).await?;
                Ok(CommandOutcome::Info(format!(
                    "attached {count} passages from source {source_id}"
                )))
            }
            Command::Memory => {
                let recall = RecallStore::size(self.stores.as_ref(), agent_id).await?;
                let archival = ArchivalStore::size(self.stores.as_ref(), agent_id).await?;
                let mut summary = String::new();
                summary.push_str("core memory:\n");
                summary.push_str(&runtime.state.memory.compile());
                summary.push_str(&format!(
                    "recall memory: {recall} messages\narchival memory: {archival} passages\n"
                ));
                Ok(CommandOutcome::Info(summary))
            }
            // Handled above or by apply_local.
            other => Err(AgentError::Consistency(format!(
                "command fell through dispatch: {other:?}"
            ))),
        }
    }

    /// Persist a buffer-command side effect.
    async fn persist_effect(
        &self,
        runtime: &mut AgentRuntime,
        effect: &CommandEffect,
    ) -> Result<(), AgentError> {
        match effect {
            CommandEffect::None => {}
            CommandEffect::Truncated => {
                // Popped messages stay in recall; only the in-context
                // id list shrinks.
                runtime.mark_persisted();
                self.stores.save_agent(&runtime.state).await?;
            }
            CommandEffect::Edited(id) => {
                let edited = runtime.get_buffered(*id).ok_or_else(|| {
                    AgentError::Consistency(format!("edited message {id} left the buffer"))
                })?;
                self.stores.update_message(edited).await?;
            }
        }
        Ok(())
    }

    // ---- message surgery ----

    /// Run one buffer-local command under the agent's lock and persist
    /// its effect.
    async fn apply_buffer_command(
        &self,
        agent_id: Uuid,
        command: Command,
    ) -> Result<CommandEffect, AgentError> {
        self.ensure_agent(agent_id).await?;
        let lock = self.locks.get_lock(agent_id);
        let _guard = lock.lock().await;
        let mut runtime = self.load_runtime(agent_id).await?;
        let (_, effect) = apply_local(&mut runtime, &command)?.ok_or_else(|| {
            AgentError::Consistency(format!("not a buffer-local command: {command:?}"))
        })?;
        self.persist_effect(&mut runtime, &effect).await?;
        Ok(effect)
    }

    /// Replace the text of the assistant message nearest the buffer tail.
    /// Returns the edited message id, `None` when no target exists.
    pub async fn rethink_agent_message(
        &self,
        agent_id: Uuid,
        text: &str,
    ) -> Result<Option<Uuid>, AgentError> {
        let command = Command::Rethink {
            text: text.to_string(),
        };
        match self.apply_buffer_command(agent_id, command).await? {
            CommandEffect::Edited(id) => Ok(Some(id)),
            _ => Ok(None),
        }
    }

    /// Overwrite the `message` tool-call argument of the assistant
    /// message nearest the buffer tail.
    pub async fn rewrite_agent_message(
        &self,
        agent_id: Uuid,
        text: &str,
    ) -> Result<Option<Uuid>, AgentError> {
        let command = Command::Rewrite {
            text: text.to_string(),
        };
        match self.apply_buffer_command(agent_id, command).await? {
            CommandEffect::Edited(id) => Ok(Some(id)),
            _ => Ok(None),
        }
    }

    /// Pop the buffer back through the most recent user message. Returns
    /// whether anything was removed.
    pub async fn retry_agent_message(&self, agent_id: Uuid) -> Result<bool, AgentError> {
        match self.apply_buffer_command(agent_id, Command::Retry).await? {
            CommandEffect::Truncated => Ok(true),
            _ => Ok(false),
        }
    }

    // ---- recall memory ----

    /// Cursor pagination over recall memory. `after`/`before` are message
    /// ids resolved to timestamps (strictly-later / strictly-earlier);
    /// `reverse` flips the final output order without changing which
    /// records are selected.
    pub async fn get_recall_cursor(
        &self,
        agent_id: Uuid,
        after: Option<Uuid>,
        before: Option<Uuid>,
        limit: u64,
        reverse: bool,
    ) -> Result<Vec<Message>, AgentError> {
        let start_date = match after {
            Some(id) => Some(self.resolve_message_time(id).await?),
            None => None,
        };
        let end_date = match before {
            Some(id) => Some(self.resolve_message_time(id).await?),
            None => None,
        };
        let mut page = self
            .stores
            .list_messages(agent_id, start_date, end_date, limit, true)
            .await?;
        if reverse {
            page.reverse();
        }
        Ok(page)
    }

    /// Edit the text of one of the agent's stored messages by id.
    ///
    /// Runs under the agent's lock so no step loop is mid-flight with a
    /// stale copy; the in-context buffer is re-resolved from recall on
    /// the next checkout, so the edit is visible there too.
    pub async fn update_agent_message(
        &self,
        agent_id: Uuid,
        message_id: Uuid,
        new_text: &str,
    ) -> Result<Message, AgentError> {
        self.ensure_agent(agent_id).await?;
        let lock = self.locks.get_lock(agent_id);
        let _guard = lock.lock().await;
        let mut message = self
            .stores
            .get_message(message_id)
            .await?
            .filter(|m| m.agent_id == agent_id)
            .ok_or(AgentError::NotFound {
                kind: "message",
                id: message_id.to_string(),
            })?;
        message.text = new_text.to_string();
        self.stores.update_message(&message).await?;
        Ok(message)
    }

    async fn resolve_message_time(
        &self,
        id: Uuid,
    ) -> Result<chrono::DateTime<chrono::Utc>, AgentError> {
        let message = self
            .stores
            .get_message(id)
            .await?
            .ok_or(AgentError::NotFound {
                kind: "message",
                id: id.to_string(),
            })?;
        Ok(message.created_at)
    }

    // ---- core memory ----

    pub async fn get_core_memory_block(
        &self,
        agent_id: Uuid,
        label: &str,
    ) -> Result<Block, AgentError> {
        self.stores
            .get_block(agent_id, label)
            .await?
            .ok_or(AgentError::NotFound {
                kind: "block",
                id: label.to_string(),
            })
    }

    /// Replace a core-memory block's value under the agent's lock.
    pub async fn update_core_memory(
        &self,
        agent_id: Uuid,
        label: &str,
        new_value: &str,
    ) -> Result<Block, AgentError> {
        self.ensure_agent(agent_id).await?;
        let lock = self.locks.get_lock(agent_id);
        let _guard = lock.lock().await;
        let block = self
            .stores
            .get_block(agent_id, label)
            .await?
            .ok_or(AgentError::NotFound {
                kind: "block",
                id: label.to_string(),
            })?;
        Ok(self.stores.update_block(block.id, new_value).await?)
    }

    // ---- archival memory ----

    pub async fn insert_archival_memory(
        &self,
        agent_id: Uuid,
        text: &str,
    ) -> Result<Passage, AgentError> {
        // Reject unknown agents before writing the passage.
        self.get_agent(agent_id).await?;
        Ok(self
            .stores
            .insert_passage(Some(agent_id), None, text)
            .await?)
    }

    pub async fn search_archival_memory(
        &self,
        agent_id: Uuid,
        query: &str,
        limit: u64,
    ) -> Result<Vec<Passage>, AgentError> {
        Ok(self.stores.search_passages(agent_id, query, limit).await?)
    }

    pub async fn get_archival_cursor(
        &self,
        agent_id: Uuid,
        cursor: Option<Uuid>,
        limit: u64,
    ) -> Result<Vec<Passage>, AgentError> {
        Ok(self.stores.list_passages(agent_id, cursor, limit).await?)
    }

    pub async fn delete_archival_memory(&self, id: Uuid) -> Result<(), AgentError> {
        Ok(self.stores.delete_passage(id).await?)
    }

    // ---- sources and jobs ----

    /// Attach a data source's passages to an agent, tracked as a job.
    ///
    /// The job moves created -> running -> completed with the copied-passage
    /// count in its metadata, or -> failed with the error message.
    pub async fn attach_source_job(
        &self,
        agent_id: Uuid,
        source_id: Uuid,
    ) -> Result<Job, AgentError> {
        self.ensure_agent(agent_id).await?;
        let mut job = Job::new();
        self.stores.create_job(&job).await?;
        job.transition(JobStatus::Running, serde_json::Map::new())?;
        self.stores.update_job(&job).await?;

        let lock = self.locks.get_lock(agent_id);
        let attach_result = {
            let _guard = lock.lock().await;
            self.stores.attach_source(agent_id, source_id).await
        };

        match attach_result {
            Ok(count) => {
                let mut metadata = serde_json::Map::new();
                metadata.insert("passages_attached".to_string(), count.into());
                metadata.insert("source_id".to_string(), source_id.to_string().into());
                job.transition(JobStatus::Completed, metadata)?;
            }
            Err(err) => {
                tracing::warn!(agent.id = %agent_id, source.id = %source_id, error = %err, "attach failed");
                let mut metadata = serde_json::Map::new();
                metadata.insert("error".to_string(), err.to_string().into());
                job.transition(JobStatus::Failed, metadata)?;
            }
        }
        self.stores.update_job(&job).await?;
        Ok(job)
    }

    /// Ingest texts into a data source as source-held passages, tracked
    /// as a job.
    ///
    /// The passages are unowned (no agent id) until an attach copies them;
    /// no agent lock is involved. The job moves created -> running ->
    /// completed with the created-passage count in its metadata, or ->
    /// failed with the error message and the partial count.
    pub async fn load_into_source(
        &self,
        source_id: Uuid,
        texts: &[String],
    ) -> Result<Job, AgentError> {
        let mut job = Job::new();
        self.stores.create_job(&job).await?;
        job.transition(JobStatus::Running, serde_json::Map::new())?;
        self.stores.update_job(&job).await?;

        let mut created: u64 = 0;
        let mut failure = None;
        for text in texts {
            match self.stores.insert_passage(None, Some(source_id), text).await {
                Ok(_) => created += 1,
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let mut metadata = serde_json::Map::new();
        metadata.insert("passages_created".to_string(), created.into());
        metadata.insert("source_id".to_string(), source_id.to_string().into());
        match failure {
            None => {
                job.transition(JobStatus::Completed, metadata)?;
            }
            Some(err) => {
                tracing::warn!(source.id = %source_id, error = %err, "source ingestion failed");
                metadata.insert("error".to_string(), err.to_string().into());
                job.transition(JobStatus::Failed, metadata)?;
            }
        }
        self.stores.update_job(&job).await?;
        Ok(job)
    }

    /// Detach a source: delete its copied passages from the agent.
    pub async fn detach_source(
        &self,
        agent_id: Uuid,
        source_id: Uuid,
    ) -> Result<u64, AgentError> {
        self.ensure_agent(agent_id).await?;
        let lock = self.locks.get_lock(agent_id);
        let _guard = lock.lock().await;
        Ok(self
            .stores
            .delete_by_source(source_id, Some(agent_id))
            .await?)
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Job, AgentError> {
        self.stores.get_job(id).await?.ok_or(AgentError::NotFound {
            kind: "job",
            id: id.to_string(),
        })
    }

    /// Number of locks currently tracked; exposed for observability and
    /// tests.
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }
}
