//! SQLite archival-memory repository.
//!
//! Passages are embedded at insert time (write-once) and ranked in memory
//! by cosine similarity at query time. Retrieval loads the candidate rows
//! for one agent and scores them; fine for the archival sizes a single
//! agent accumulates.

use sqlx::Row;
use uuid::Uuid;

use mnemon_core::embed::cosine_similarity;
use mnemon_core::store::ArchivalStore;
use mnemon_types::error::StoreError;
use mnemon_types::memory::Passage;

use super::{format_datetime, parse_datetime, parse_uuid, query_err, SqliteStore};

struct PassageRow {
    id: String,
    agent_id: Option<String>,
    source_id: Option<String>,
    text: String,
    embedding: String,
    created_at: String,
}

impl PassageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            agent_id: row.try_get("agent_id")?,
            source_id: row.try_get("source_id")?,
            text: row.try_get("text")?,
            embedding: row.try_get("embedding")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_passage(self) -> Result<Passage, StoreError> {
        let embedding: Vec<f32> = serde_json::from_str(&self.embedding)
            .map_err(|e| StoreError::Query(format!("invalid embedding JSON: {e}")))?;
        Ok(Passage {
            id: parse_uuid(&self.id)?,
            agent_id: self.agent_id.as_deref().map(parse_uuid).transpose()?,
            source_id: self.source_id.as_deref().map(parse_uuid).transpose()?,
            text: self.text,
            embedding,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

impl SqliteStore {
    async fn write_passage(&self, passage: &Passage) -> Result<(), StoreError> {
        let embedding = serde_json::to_string(&passage.embedding)
            .map_err(|e| StoreError::Query(format!("serialize embedding: {e}")))?;
        sqlx::query(
            r#"INSERT INTO passages (id, agent_id, source_id, text, embedding, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(passage.id.to_string())
        .bind(passage.agent_id.map(|id| id.to_string()))
        .bind(passage.source_id.map(|id| id.to_string()))
        .bind(&passage.text)
        .bind(&embedding)
        .bind(format_datetime(&passage.created_at))
        .execute(self.writer())
        .await
        .map_err(query_err)?;
        Ok(())
    }

    async fn agent_passages(&self, agent_id: Uuid) -> Result<Vec<Passage>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM passages WHERE agent_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(agent_id.to_string())
        .fetch_all(self.reader())
        .await
        .map_err(query_err)?;
        let mut passages = Vec::with_capacity(rows.len());
        for row in &rows {
            passages.push(PassageRow::from_row(row).map_err(query_err)?.into_passage()?);
        }
        Ok(passages)
    }
}

impl ArchivalStore for SqliteStore {
    async fn insert_passage(
        &self,
        agent_id: Option<Uuid>,
        source_id: Option<Uuid>,
        text: &str,
    ) -> Result<Passage, StoreError> {
        let texts = [text.to_string()];
        let embedding = self
            .embedder()
            .embed(&texts)
            .await?
            .pop()
            .ok_or_else(|| StoreError::Query("embedder returned no vector".to_string()))?;
        let passage = Passage::new(agent_id, source_id, text.to_string(), embedding);
        self.write_passage(&passage).await?;
        Ok(passage)
    }

    async fn list_passages(
        &self,
        agent_id: Uuid,
        cursor: Option<Uuid>,
        limit: u64,
    ) -> Result<Vec<Passage>, StoreError> {
        let mut passages = self.agent_passages(agent_id).await?;
        if let Some(cursor) = cursor {
            if let Some(pos) = passages.iter().position(|p| p.id == cursor) {
                passages.drain(..=pos);
            }
        }
        passages.truncate(limit as usize);
        Ok(passages)
    }

    async fn search_passages(
        &self,
        agent_id: Uuid,
        query: &str,
        limit: u64,
    ) -> Result<Vec<Passage>, StoreError> {
        let queries = [query.to_string()];
        let query_vec = self
            .embedder()
            .embed(&queries)
            .await?
            .pop()
            .ok_or_else(|| StoreError::Query("embedder returned no vector".to_string()))?;
        let mut scored: Vec<(f32, Passage)> = self
            .agent_passages(agent_id)
            .await?
            .into_iter()
            .map(|p| (cosine_similarity(&query_vec, &p.embedding), p))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(limit as usize)
            .map(|(_, p)| p)
            .collect())
    }

    async fn delete_passage(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM passages WHERE id = ?")
            .bind(id.to_string())
            .execute(self.writer())
            .await
            .map_err(query_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_by_source(
        &self,
        source_id: Uuid,
        agent_id: Option<Uuid>,
    ) -> Result<u64, StoreError> {
        let result = match agent_id {
            Some(agent_id) => {
                sqlx::query("DELETE FROM passages WHERE source_id = ? AND agent_id = ?")
                    .bind(source_id.to_string())
                    .bind(agent_id.to_string())
                    .execute(self.writer())
                    .await
            }
            None => {
                sqlx::query("DELETE FROM passages WHERE source_id = ?")
                    .bind(source_id.to_string())
                    .execute(self.writer())
                    .await
            }
        }
        .map_err(query_err)?;
        Ok(result.rows_affected())
    }

    async fn attach_source(&self, agent_id: Uuid, source_id: Uuid) -> Result<u64, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM passages WHERE source_id = ? AND agent_id IS NULL ORDER BY created_at ASC, id ASC",
        )
        .bind(source_id.to_string())
        .fetch_all(self.reader())
        .await
        .map_err(query_err)?;

        let mut count = 0u64;
        for row in &rows {
            let source_passage = PassageRow::from_row(row).map_err(query_err)?.into_passage()?;
            // Embeddings are write-once; the copy keeps the vector.
            let copy = Passage::new(
                Some(agent_id),
                Some(source_id),
                source_passage.text,
                source_passage.embedding,
            );
            self.write_passage(&copy).await?;
            count += 1;
        }
        Ok(count)
    }

    async fn size(&self, agent_id: Uuid) -> Result<u64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM passages WHERE agent_id = ?")
                .bind(agent_id.to_string())
                .fetch_one(self.reader())
                .await
                .map_err(query_err)?;
        Ok(count as u64)
    }
}
