//! SQLite recall-memory repository.
//!
//! The full historical message log. Pagination is timestamp-bounded with
//! strict comparisons, ties breaking on the time-sortable message id, so
//! cursors stay stable under concurrent appends.

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use mnemon_core::store::RecallStore;
use mnemon_types::error::StoreError;
use mnemon_types::message::{Message, MessageRole, ToolCall, ToolReturnStatus};

use super::{format_datetime, parse_datetime, parse_uuid, query_err, SqliteStore};

struct MessageRow {
    id: String,
    agent_id: String,
    role: String,
    text: String,
    tool_call: Option<String>,
    tool_call_id: Option<String>,
    tool_return_status: Option<String>,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            agent_id: row.try_get("agent_id")?,
            role: row.try_get("role")?,
            text: row.try_get("text")?,
            tool_call: row.try_get("tool_call")?,
            tool_call_id: row.try_get("tool_call_id")?,
            tool_return_status: row.try_get("tool_return_status")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<Message, StoreError> {
        let role: MessageRole = self
            .role
            .parse()
            .map_err(|e: String| StoreError::Query(e))?;
        let tool_call: Option<ToolCall> = self
            .tool_call
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| StoreError::Query(format!("invalid tool_call JSON: {e}")))?;
        let tool_return_status: Option<ToolReturnStatus> = self
            .tool_return_status
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(|e: String| StoreError::Query(e))?;

        Ok(Message {
            id: parse_uuid(&self.id)?,
            agent_id: parse_uuid(&self.agent_id)?,
            role,
            text: self.text,
            tool_call,
            tool_call_id: self.tool_call_id,
            tool_return_status,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn tool_call_json(message: &Message) -> Result<Option<String>, StoreError> {
    message
        .tool_call
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::Query(format!("serialize tool_call: {e}")))
}

impl RecallStore for SqliteStore {
    async fn save_messages(&self, messages: &[Message]) -> Result<(), StoreError> {
        let mut tx = self.writer().begin().await.map_err(query_err)?;
        for message in messages {
            sqlx::query(
                r#"INSERT INTO messages
                   (id, agent_id, role, text, tool_call, tool_call_id, tool_return_status, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(message.id.to_string())
            .bind(message.agent_id.to_string())
            .bind(message.role.to_string())
            .bind(&message.text)
            .bind(tool_call_json(message)?)
            .bind(&message.tool_call_id)
            .bind(message.tool_return_status.map(|s| s.to_string()))
            .bind(format_datetime(&message.created_at))
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        }
        tx.commit().await.map_err(query_err)
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.reader())
            .await
            .map_err(query_err)?;
        row.map(|r| MessageRow::from_row(&r).map_err(query_err)?.into_message())
            .transpose()
    }

    async fn update_message(&self, message: &Message) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE messages SET text = ?, tool_call = ? WHERE id = ?")
            .bind(&message.text)
            .bind(tool_call_json(message)?)
            .bind(message.id.to_string())
            .execute(self.writer())
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_messages(
        &self,
        agent_id: Uuid,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
        limit: u64,
        ascending: bool,
    ) -> Result<Vec<Message>, StoreError> {
        // ?2/?3 are NULL when unbounded; strict comparisons keep the
        // cursor exclusive on both sides.
        let order = if ascending {
            "created_at ASC, id ASC"
        } else {
            "created_at DESC, id DESC"
        };
        let sql = format!(
            r#"SELECT * FROM messages
               WHERE agent_id = ?1
                 AND (?2 IS NULL OR created_at > ?2)
                 AND (?3 IS NULL OR created_at < ?3)
               ORDER BY {order}
               LIMIT ?4"#,
        );
        let rows = sqlx::query(&sql)
            .bind(agent_id.to_string())
            .bind(start_date.as_ref().map(format_datetime))
            .bind(end_date.as_ref().map(format_datetime))
            .bind(limit as i64)
            .fetch_all(self.reader())
            .await
            .map_err(query_err)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            messages.push(MessageRow::from_row(row).map_err(query_err)?.into_message()?);
        }
        Ok(messages)
    }

    async fn size(&self, agent_id: Uuid) -> Result<u64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM messages WHERE agent_id = ?")
                .bind(agent_id.to_string())
                .fetch_one(self.reader())
                .await
                .map_err(query_err)?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_support::temp_store;

    #[tokio::test]
    async fn test_pagination_roundtrip() {
        let (store, _dir) = temp_store().await;
        let agent_id = Uuid::now_v7();
        let batch: Vec<Message> = (0..5)
            .map(|i| Message::user(agent_id, format!("m{i}")))
            .collect();
        store.save_messages(&batch).await.unwrap();

        let ascending = store
            .list_messages(agent_id, None, None, 100, true)
            .await
            .unwrap();
        let texts: Vec<_> = ascending.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m0", "m1", "m2", "m3", "m4"]);

        let descending = store
            .list_messages(agent_id, None, None, 100, false)
            .await
            .unwrap();
        let texts: Vec<_> = descending.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m4", "m3", "m2", "m1", "m0"]);

        // strictly-later bound
        let later = store
            .list_messages(agent_id, Some(batch[2].created_at), None, 100, true)
            .await
            .unwrap();
        assert!(later.iter().all(|m| m.created_at > batch[2].created_at));
        assert!(later.len() <= 2);
    }

    #[tokio::test]
    async fn test_tool_call_roundtrip() {
        let (store, _dir) = temp_store().await;
        let agent_id = Uuid::now_v7();
        let call = ToolCall {
            id: "call-9".to_string(),
            name: "send_message".to_string(),
            arguments: r#"{"message":"hi"}"#.to_string(),
        };
        let message = Message::assistant(agent_id, "", Some(call));
        store.save_messages(std::slice::from_ref(&message)).await.unwrap();

        let loaded = store.get_message(message.id).await.unwrap().unwrap();
        let loaded_call = loaded.tool_call.unwrap();
        assert_eq!(loaded_call.name, "send_message");
        assert_eq!(loaded_call.arguments, r#"{"message":"hi"}"#);
    }

    #[tokio::test]
    async fn test_update_message_rewrites_text() {
        let (store, _dir) = temp_store().await;
        let agent_id = Uuid::now_v7();
        let mut message = Message::assistant(agent_id, "before", None);
        store.save_messages(std::slice::from_ref(&message)).await.unwrap();

        message.text = "after".to_string();
        store.update_message(&message).await.unwrap();

        let loaded = store.get_message(message.id).await.unwrap().unwrap();
        assert_eq!(loaded.text, "after");

        let ghost = Message::user(agent_id, "never saved");
        assert!(matches!(
            store.update_message(&ghost).await.unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[tokio::test]
    async fn test_size_counts_per_agent() {
        let (store, _dir) = temp_store().await;
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        store
            .save_messages(&[Message::user(a, "1"), Message::user(a, "2"), Message::user(b, "3")])
            .await
            .unwrap();
        assert_eq!(RecallStore::size(&store, a).await.unwrap(), 2);
        assert_eq!(RecallStore::size(&store, b).await.unwrap(), 1);
    }
}
