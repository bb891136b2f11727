//! In-memory store implementing all five persistence traits.
//!
//! Used by core tests and by embedded callers that do not need durability.
//! The SQLite implementation in `mnemon-infra` is the durable counterpart.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use mnemon_types::agent::AgentState;
use mnemon_types::error::StoreError;
use mnemon_types::job::Job;
use mnemon_types::memory::{Block, Passage};
use mnemon_types::message::Message;

use crate::embed::{BoxEmbedder, cosine_similarity};
use crate::store::{AgentStore, ArchivalStore, BlockStore, JobStore, RecallStore};

/// Non-durable store over tokio `RwLock`-guarded maps.
pub struct InMemoryStore {
    agents: RwLock<HashMap<Uuid, AgentState>>,
    messages: RwLock<Vec<Message>>,
    passages: RwLock<Vec<Passage>>,
    jobs: RwLock<HashMap<Uuid, Job>>,
    embedder: BoxEmbedder,
}

impl InMemoryStore {
    pub fn new(embedder: BoxEmbedder) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            messages: RwLock::new(Vec::new()),
            passages: RwLock::new(Vec::new()),
            jobs: RwLock::new(HashMap::new()),
            embedder,
        }
    }

    /// Insert a passage held by a data source, not yet attached to any
    /// agent. Ingestion writes through this.
    pub async fn insert_source_passage(
        &self,
        source_id: Uuid,
        text: &str,
    ) -> Result<Passage, StoreError> {
        self.insert_passage(None, Some(source_id), text).await
    }
}

impl AgentStore for InMemoryStore {
    async fn get_agent(&self, agent_id: Uuid) -> Result<Option<AgentState>, StoreError> {
        Ok(self.agents.read().await.get(&agent_id).cloned())
    }

    async fn save_agent(&self, state: &AgentState) -> Result<(), StoreError> {
        let mut agents = self.agents.write().await;
        if !agents.contains_key(&state.id) {
            return Err(StoreError::NotFound);
        }
        agents.insert(state.id, state.clone());
        Ok(())
    }

    async fn create_agent(&self, state: &AgentState) -> Result<(), StoreError> {
        let mut agents = self.agents.write().await;
        if agents.contains_key(&state.id) {
            return Err(StoreError::Conflict(format!(
                "agent {} already exists",
                state.id
            )));
        }
        agents.insert(state.id, state.clone());
        Ok(())
    }

    async fn delete_agent(&self, agent_id: Uuid) -> Result<(), StoreError> {
        let mut agents = self.agents.write().await;
        if agents.remove(&agent_id).is_none() {
            return Err(StoreError::NotFound);
        }
        drop(agents);
        self.messages.write().await.retain(|m| m.agent_id != agent_id);
        self.passages
            .write()
            .await
            .retain(|p| p.agent_id != Some(agent_id));
        Ok(())
    }
}

impl BlockStore for InMemoryStore {
    async fn get_block(&self, agent_id: Uuid, label: &str) -> Result<Option<Block>, StoreError> {
        let agents = self.agents.read().await;
        let agent = agents.get(&agent_id).ok_or(StoreError::NotFound)?;
        Ok(agent.memory.get(label).cloned())
    }

    async fn list_blocks(&self, agent_id: Uuid) -> Result<Vec<Block>, StoreError> {
        let agents = self.agents.read().await;
        let agent = agents.get(&agent_id).ok_or(StoreError::NotFound)?;
        Ok(agent.memory.blocks().cloned().collect())
    }

    async fn update_block(&self, block_id: Uuid, new_value: &str) -> Result<Block, StoreError> {
        let mut agents = self.agents.write().await;
        for agent in agents.values_mut() {
            let label = agent
                .memory
                .blocks()
                .find(|b| b.id == block_id)
                .map(|b| b.label.clone());
            if let Some(label) = label {
                let block = agent
                    .memory
                    .get_mut(&label)
                    .ok_or(StoreError::NotFound)?;
                block
                    .set_value(new_value)
                    .map_err(|e| StoreError::Conflict(e.to_string()))?;
                return Ok(block.clone());
            }
        }
        Err(StoreError::NotFound)
    }
}

impl RecallStore for InMemoryStore {
    async fn save_messages(&self, messages: &[Message]) -> Result<(), StoreError> {
        self.messages.write().await.extend_from_slice(messages);
        Ok(())
    }

    async fn get_message(&self, id: Uuid) -> Result<Option<Message>, StoreError> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn update_message(&self, message: &Message) -> Result<(), StoreError> {
        let mut messages = self.messages.write().await;
        let slot = messages
            .iter_mut()
            .find(|m| m.id == message.id)
            .ok_or(StoreError::NotFound)?;
        *slot = message.clone();
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
        let messages = self.messages.read().await;
        let mut selected: Vec<Message> = messages
            .iter()
            .filter(|m| m.agent_id == agent_id)
            .filter(|m| start_date.is_none_or(|start| m.created_at > start))
            .filter(|m| end_date.is_none_or(|end| m.created_at < end))
            .cloned()
            .collect();
        // Ties on created_at break on the time-sortable id.
        selected.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        if !ascending {
            selected.reverse();
        }
        selected.truncate(limit as usize);
        Ok(selected)
    }

    async fn size(&self, agent_id: Uuid) -> Result<u64, StoreError> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| m.agent_id == agent_id)
            .count() as u64)
    }
}

impl ArchivalStore for InMemoryStore {
    async fn insert_passage(
        &self,
        agent_id: Option<Uuid>,
        source_id: Option<Uuid>,
        text: &str,
    ) -> Result<Passage, StoreError> {
        let texts = [text.to_string()];
        let embedding = self
            .embedder
            .embed(&texts)
            .await?
            .pop()
            .ok_or_else(|| StoreError::Query("embedder returned no vector".to_string()))?;
        let passage = Passage::new(agent_id, source_id, text.to_string(), embedding);
        self.passages.write().await.push(passage.clone());
        Ok(passage)
    }

    async fn list_passages(
        &self,
        agent_id: Uuid,
        cursor: Option<Uuid>,
        limit: u64,
    ) -> Result<Vec<Passage>, StoreError> {
        let passages = self.passages.read().await;
        let mut selected: Vec<Passage> = passages
            .iter()
            .filter(|p| p.agent_id == Some(agent_id))
            .cloned()
            .collect();
        selected.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        if let Some(cursor) = cursor {
            if let Some(pos) = selected.iter().position(|p| p.id == cursor) {
                selected.drain(..=pos);
            }
        }
        selected.truncate(limit as usize);
        Ok(selected)
    }

    async fn search_passages(
        &self,
        agent_id: Uuid,
        query: &str,
        limit: u64,
    ) -> Result<Vec<Passage>, StoreError> {
        let queries = [query.to_string()];
        let query_vec = self
            .embedder
            .embed(&queries)
            .await?
            .pop()
            .ok_or_else(|| StoreError::Query("embedder returned no vector".to_string()))?;
        let passages = self.passages.read().await;
        let mut scored: Vec<(f32, Passage)> = passages
            .iter()
            .filter(|p| p.agent_id == Some(agent_id))
            .map(|p| (cosine_similarity(&query_vec, &p.embedding), p.clone()))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(limit as usize)
            .map(|(_, p)| p)
            .collect())
    }

    async fn delete_passage(&self, id: Uuid) -> Result<(), StoreError> {
        let mut passages = self.passages.write().await;
        let before = passages.len();
        passages.retain(|p| p.id != id);
        if passages.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_by_source(
        &self,
        source_id: Uuid,
        agent_id: Option<Uuid>,
    ) -> Result<u64, StoreError> {
        let mut passages = self.passages.write().await;
        let before = passages.len();
        passages.retain(|p| {
            p.source_id != Some(source_id)
                || (agent_id.is_some() && p.agent_id != agent_id)
        });
        Ok((before - passages.len()) as u64)
    }

    async fn attach_source(&self, agent_id: Uuid, source_id: Uuid) -> Result<u64, StoreError> {
        let mut passages = self.passages.write().await;
        let copies: Vec<Passage> = passages
            .iter()
            .filter(|p| p.source_id == Some(source_id) && p.agent_id.is_none())
            .map(|p| {
                // Embeddings are write-once; the copy keeps the vector.
                Passage::new(
                    Some(agent_id),
                    Some(source_id),
                    p.text.clone(),
                    p.embedding.clone(),
                )
            })
            .collect();
        let count = copies.len() as u64;
        passages.extend(copies);
        Ok(count)
    }

    async fn size(&self, agent_id: Uuid) -> Result<u64, StoreError> {
        Ok(self
            .passages
            .read()
            .await
            .iter()
            .filter(|p| p.agent_id == Some(agent_id))
            .count() as u64)
    }
}

impl JobStore for InMemoryStore {
    async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&job.id) {
            return Err(StoreError::NotFound);
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemon_types::agent::AgentKind;

    use crate::embed::HashingEmbedder;

    fn store() -> InMemoryStore {
        InMemoryStore::new(BoxEmbedder::new(HashingEmbedder::new(64)))
    }

    #[tokio::test]
    async fn test_agent_crud() {
        let store = store();
        let state = AgentState::new("a", AgentKind::Standard, Uuid::now_v7());
        store.create_agent(&state).await.unwrap();
        assert!(store.create_agent(&state).await.is_err());

        let loaded = store.get_agent(state.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "a");

        store.delete_agent(state.id).await.unwrap();
        assert!(store.get_agent(state.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_messages_ordering_and_bounds() {
        let store = store();
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

        // after message 2: strictly later timestamps only
        let after = batch[2].created_at;
        let later = store
            .list_messages(agent_id, Some(after), None, 100, true)
            .await
            .unwrap();
        assert!(later.iter().all(|m| m.created_at > after));
    }

    #[tokio::test]
    async fn test_block_update_enforces_limit() {
        let store = store();
        let mut state = AgentState::new("a", AgentKind::Standard, Uuid::now_v7());
        let block = Block::new("persona", "short", 10).unwrap();
        let block_id = block.id;
        state.memory.insert(block);
        store.create_agent(&state).await.unwrap();

        let updated = store.update_block(block_id, "new").await.unwrap();
        assert_eq!(updated.value(), "new");

        let err = store
            .update_block(block_id, "far too long for the limit")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_attach_copies_unattached_source_passages() {
        let store = store();
        let agent_id = Uuid::now_v7();
        let source_id = Uuid::now_v7();
        store
            .insert_source_passage(source_id, "first fact")
            .await
            .unwrap();
        store
            .insert_source_passage(source_id, "second fact")
            .await
            .unwrap();

        let copied = store.attach_source(agent_id, source_id).await.unwrap();
        assert_eq!(copied, 2);
        assert_eq!(ArchivalStore::size(&store, agent_id).await.unwrap(), 2);

        // source copies stay; agent copies are scoped deletions
        let deleted = store
            .delete_by_source(source_id, Some(agent_id))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(ArchivalStore::size(&store, agent_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_ranks_lexical_overlap_first() {
        let store = store();
        let agent_id = Uuid::now_v7();
        store
            .insert_passage(Some(agent_id), None, "rust borrow checker notes")
            .await
            .unwrap();
        store
            .insert_passage(Some(agent_id), None, "grocery list milk eggs")
            .await
            .unwrap();

        let hits = store
            .search_passages(agent_id, "borrow checker", 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("borrow"));
    }

    #[tokio::test]
    async fn test_list_passages_cursor_is_exclusive() {
        let store = store();
        let agent_id = Uuid::now_v7();
        let mut ids = Vec::new();
        for i in 0..4 {
            let p = store
                .insert_passage(Some(agent_id), None, &format!("p{i}"))
                .await
                .unwrap();
            ids.push(p.id);
        }
        let page = store
            .list_passages(agent_id, Some(ids[1]), 10)
            .await
            .unwrap();
        let texts: Vec<_> = page.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["p2", "p3"]);
    }
}
