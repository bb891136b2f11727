//! SQLite agent-state and core-memory block persistence.
//!
//! Agent rows carry the scalar state plus JSON columns for the model
//! config and id lists; blocks live in their own table so the block store
//! can update a single value without rewriting the agent.

use sqlx::Row;
use uuid::Uuid;

use mnemon_core::store::{AgentStore, BlockStore};
use mnemon_types::agent::{AgentKind, AgentState, ModelConfig};
use mnemon_types::error::StoreError;
use mnemon_types::memory::{Block, CoreMemory};

use super::{format_datetime, parse_datetime, parse_uuid, query_err, SqliteStore};

struct AgentRow {
    id: String,
    name: String,
    kind: String,
    model: String,
    message_ids: String,
    tool_names: String,
    tags: String,
    owner_id: Option<String>,
    created_at: String,
}

impl AgentRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            kind: row.try_get("kind")?,
            model: row.try_get("model")?,
            message_ids: row.try_get("message_ids")?,
            tool_names: row.try_get("tool_names")?,
            tags: row.try_get("tags")?,
            owner_id: row.try_get("owner_id")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_state(self, memory: CoreMemory) -> Result<AgentState, StoreError> {
        let kind: AgentKind = self
            .kind
            .parse()
            .map_err(|e: String| StoreError::Query(e))?;
        let model: ModelConfig = serde_json::from_str(&self.model)
            .map_err(|e| StoreError::Query(format!("invalid model config JSON: {e}")))?;
        let message_ids: Vec<Uuid> = serde_json::from_str(&self.message_ids)
            .map_err(|e| StoreError::Query(format!("invalid message_ids JSON: {e}")))?;
        let tool_names: Vec<String> = serde_json::from_str(&self.tool_names)
            .map_err(|e| StoreError::Query(format!("invalid tool_names JSON: {e}")))?;
        let tags: Vec<String> = serde_json::from_str(&self.tags)
            .map_err(|e| StoreError::Query(format!("invalid tags JSON: {e}")))?;

        Ok(AgentState {
            id: parse_uuid(&self.id)?,
            name: self.name,
            kind,
            memory,
            message_ids,
            tool_names,
            model,
            tags,
            owner_id: self.owner_id.as_deref().map(parse_uuid).transpose()?,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn block_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Block, StoreError> {
    let id: String = row.try_get("id").map_err(query_err)?;
    let label: String = row.try_get("label").map_err(query_err)?;
    let value: String = row.try_get("value").map_err(query_err)?;
    let char_limit: i64 = row.try_get("char_limit").map_err(query_err)?;

    let mut block = Block::new(label, value, char_limit as usize)
        .map_err(|e| StoreError::Query(format!("stored block violates its limit: {e}")))?;
    block.id = parse_uuid(&id)?;
    Ok(block)
}

impl SqliteStore {
    async fn load_memory(&self, agent_id: Uuid) -> Result<CoreMemory, StoreError> {
        let rows = sqlx::query("SELECT id, label, value, char_limit FROM blocks WHERE agent_id = ? ORDER BY label")
            .bind(agent_id.to_string())
            .fetch_all(self.reader())
            .await
            .map_err(query_err)?;
        let mut blocks = Vec::with_capacity(rows.len());
        for row in &rows {
            blocks.push(block_from_row(row)?);
        }
        Ok(CoreMemory::new(blocks))
    }

    async fn write_state(&self, state: &AgentState, create: bool) -> Result<(), StoreError> {
        let mut tx = self.writer().begin().await.map_err(query_err)?;

        let model = serde_json::to_string(&state.model)
            .map_err(|e| StoreError::Query(format!("serialize model config: {e}")))?;
        let message_ids = serde_json::to_string(&state.message_ids)
            .map_err(|e| StoreError::Query(format!("serialize message_ids: {e}")))?;
        let tool_names = serde_json::to_string(&state.tool_names)
            .map_err(|e| StoreError::Query(format!("serialize tool_names: {e}")))?;
        let tags = serde_json::to_string(&state.tags)
            .map_err(|e| StoreError::Query(format!("serialize tags: {e}")))?;

        let sql = if create {
            r#"INSERT INTO agents
               (id, name, kind, model, message_ids, tool_names, tags, owner_id, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        } else {
            r#"REPLACE INTO agents
               (id, name, kind, model, message_ids, tool_names, tags, owner_id, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        };
        sqlx::query(sql)
            .bind(state.id.to_string())
            .bind(&state.name)
            .bind(state.kind.to_string())
            .bind(&model)
            .bind(&message_ids)
            .bind(&tool_names)
            .bind(&tags)
            .bind(state.owner_id.map(|id| id.to_string()))
            .bind(format_datetime(&state.created_at))
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StoreError::Conflict(format!("agent {} already exists", state.id))
                }
                other => query_err(other),
            })?;

        // Blocks are replaced wholesale; single-value updates go through
        // the block store instead.
        sqlx::query("DELETE FROM blocks WHERE agent_id = ?")
            .bind(state.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        for block in state.memory.blocks() {
            sqlx::query(
                "INSERT INTO blocks (id, agent_id, label, value, char_limit) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(block.id.to_string())
            .bind(state.id.to_string())
            .bind(&block.label)
            .bind(block.value())
            .bind(block.char_limit as i64)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        }

        tx.commit().await.map_err(query_err)
    }
}

impl AgentStore for SqliteStore {
    async fn get_agent(&self, agent_id: Uuid) -> Result<Option<AgentState>, StoreError> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?")
            .bind(agent_id.to_string())
            .fetch_optional(self.reader())
            .await
            .map_err(query_err)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let agent_row = AgentRow::from_row(&row).map_err(query_err)?;
        let memory = self.load_memory(agent_id).await?;
        Ok(Some(agent_row.into_state(memory)?))
    }

    async fn save_agent(&self, state: &AgentState) -> Result<(), StoreError> {
        let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM agents WHERE id = ?")
            .bind(state.id.to_string())
            .fetch_optional(self.reader())
            .await
            .map_err(query_err)?;
        if exists.is_none() {
            return Err(StoreError::NotFound);
        }
        self.write_state(state, false).await
    }

    async fn create_agent(&self, state: &AgentState) -> Result<(), StoreError> {
        self.write_state(state, true).await
    }

    async fn delete_agent(&self, agent_id: Uuid) -> Result<(), StoreError> {
        let id = agent_id.to_string();
        let result = sqlx::query("DELETE FROM agents WHERE id = ?")
            .bind(&id)
            .execute(self.writer())
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        sqlx::query("DELETE FROM messages WHERE agent_id = ?")
            .bind(&id)
            .execute(self.writer())
            .await
            .map_err(query_err)?;
        sqlx::query("DELETE FROM passages WHERE agent_id = ?")
            .bind(&id)
            .execute(self.writer())
            .await
            .map_err(query_err)?;
        Ok(())
    }
}

impl BlockStore for SqliteStore {
    async fn get_block(&self, agent_id: Uuid, label: &str) -> Result<Option<Block>, StoreError> {
        let row = sqlx::query(
            "SELECT id, label, value, char_limit FROM blocks WHERE agent_id = ? AND label = ?",
        )
        .bind(agent_id.to_string())
        .bind(label)
        .fetch_optional(self.reader())
        .await
        .map_err(query_err)?;
        row.as_ref().map(block_from_row).transpose()
    }

    async fn list_blocks(&self, agent_id: Uuid) -> Result<Vec<Block>, StoreError> {
        Ok(self.load_memory(agent_id).await?.blocks().cloned().collect())
    }

    async fn update_block(&self, block_id: Uuid, new_value: &str) -> Result<Block, StoreError> {
        let row = sqlx::query("SELECT id, label, value, char_limit FROM blocks WHERE id = ?")
            .bind(block_id.to_string())
            .fetch_optional(self.writer())
            .await
            .map_err(query_err)?
            .ok_or(StoreError::NotFound)?;
        let mut block = block_from_row(&row)?;
        block
            .set_value(new_value)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;

        sqlx::query("UPDATE blocks SET value = ? WHERE id = ?")
            .bind(block.value())
            .bind(block_id.to_string())
            .execute(self.writer())
            .await
            .map_err(query_err)?;
        Ok(block)
    }
}
