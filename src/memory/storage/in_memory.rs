use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use super::{oldest_first, rank, MemoryStore, SearchRequest, StorageError};
use super::super::{Memory, MemoryLevel, CONSOLIDATED_TAG};

/// Process-local store (default backend, also used by tests)
#[derive(Default)]
pub struct InMemoryMemoryStore {
    memories: RwLock<HashMap<String, Memory>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.memories.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.memories.read().await.is_empty()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn put(&self, memory: &Memory) -> Result<(), StorageError> {
        self.memories.write().await.insert(memory.id.clone(), memory.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Memory>, StorageError> {
        Ok(self.memories.read().await.get(id).cloned())
    }

    async fn search(&self, request: &SearchRequest, limit: usize) -> Result<Vec<(Memory, f32)>, StorageError> {
        let memories = self.memories.read().await;
        let scored = memories
            .values()
            .filter(|memory| request.in_scope(memory))
            .map(|memory| (memory.clone(), request.score(memory)))
            .collect();
        Ok(rank(scored, limit))
    }

    async fn list_by_level(&self, level: MemoryLevel, owner_agent_id: Option<&str>) -> Result<Vec<Memory>, StorageError> {
        let memories = self.memories.read().await;
        let mut found: Vec<Memory> = memories
            .values()
            .filter(|memory| memory.level == level)
            .filter(|memory| owner_agent_id.map_or(true, |owner| memory.metadata.owner_agent_id == owner))
            .cloned()
            .collect();
        oldest_first(&mut found);
        Ok(found)
    }

    async fn list_by_owner(&self, owner_agent_id: &str) -> Result<Vec<Memory>, StorageError> {
        let memories = self.memories.read().await;
        let mut found: Vec<Memory> = memories
            .values()
            .filter(|memory| memory.metadata.owner_agent_id == owner_agent_id)
            .cloned()
            .collect();
        oldest_first(&mut found);
        Ok(found)
    }

    async fn record_access(&self, id: &str, at: DateTime<Utc>) -> Result<Option<Memory>, StorageError> {
        let mut memories = self.memories.write().await;
        Ok(memories.get_mut(id).map(|memory| {
            memory.access_count += 1;
            if at > memory.last_accessed {
                memory.last_accessed = at;
            }
            memory.clone()
        }))
    }

    async fn set_embeddings(&self, id: &str, embeddings: &[f32]) -> Result<(), StorageError> {
        let mut memories = self.memories.write().await;
        let memory = memories
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        memory.embeddings = Some(embeddings.to_vec());
        Ok(())
    }

    async fn commit_consolidation(&self, consolidated: &Memory, source_ids: &[String]) -> Result<(), StorageError> {
        let mut memories = self.memories.write().await;
        // validate before mutating so a missing source leaves nothing half-written
        if let Some(missing) = source_ids.iter().find(|id| !memories.contains_key(id.as_str())) {
            return Err(StorageError::NotFound(missing.clone()));
        }
        memories.insert(consolidated.id.clone(), consolidated.clone());
        for id in source_ids {
            if let Some(source) = memories.get_mut(id) {
                source.metadata.tags.insert(CONSOLIDATED_TAG.to_string());
            }
        }
        Ok(())
    }
}
