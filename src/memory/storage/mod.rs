mod in_memory;
mod sqlite;

pub use in_memory::InMemoryMemoryStore;
pub use sqlite::SqliteMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use super::config::StorageConfig;
use super::{Memory, MemoryLevel};

/// Storage backend error types
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Connection failed: {0}")]
    ConnectionError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::DatabaseError(err.to_string())
    }
}

/// Similarity search input. `embedding` is the caller's embedding of `text`, when available.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub project_id: String,
    pub owner_agent_id: Option<String>,
}

impl SearchRequest {
    pub fn in_scope(&self, memory: &Memory) -> bool {
        memory.metadata.project_id == self.project_id
            && self
                .owner_agent_id
                .as_ref()
                .map_or(true, |owner| &memory.metadata.owner_agent_id == owner)
    }

    /// Cosine similarity when both sides carry embeddings, word overlap otherwise.
    pub fn score(&self, memory: &Memory) -> f32 {
        match (&self.embedding, &memory.embeddings) {
            (Some(query), Some(stored)) if query.len() == stored.len() && !query.is_empty() => {
                cosine_similarity(query, stored)
            }
            _ => lexical_similarity(&self.text, &memory.content),
        }
    }
}

/// Durable keyed storage of memories.
///
/// `list_*` results are ordered oldest first (`created_at`, then `id`).
/// `search` results are ordered by descending similarity.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert or replace a memory.
    async fn put(&self, memory: &Memory) -> Result<(), StorageError>;
    async fn get(&self, id: &str) -> Result<Option<Memory>, StorageError>;
    async fn search(&self, request: &SearchRequest, limit: usize) -> Result<Vec<(Memory, f32)>, StorageError>;
    async fn list_by_level(&self, level: MemoryLevel, owner_agent_id: Option<&str>) -> Result<Vec<Memory>, StorageError>;
    async fn list_by_owner(&self, owner_agent_id: &str) -> Result<Vec<Memory>, StorageError>;
    /// Bump `access_count` and `last_accessed`; returns the updated record.
    async fn record_access(&self, id: &str, at: DateTime<Utc>) -> Result<Option<Memory>, StorageError>;
    async fn set_embeddings(&self, id: &str, embeddings: &[f32]) -> Result<(), StorageError>;
    /// Persist `consolidated` and tag every source as consolidated, all or nothing.
    async fn commit_consolidation(&self, consolidated: &Memory, source_ids: &[String]) -> Result<(), StorageError>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Jaccard overlap of lowercase word sets
pub fn lexical_similarity(a: &str, b: &str) -> f32 {
    fn words(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect()
    }

    let left = words(a);
    let right = words(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count();
    let union = left.union(&right).count();
    shared as f32 / union as f32
}

pub(crate) fn rank(mut scored: Vec<(Memory, f32)>, limit: usize) -> Vec<(Memory, f32)> {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.0.created_at.cmp(&a.0.created_at))
    });
    scored.truncate(limit);
    scored
}

pub(crate) fn oldest_first(memories: &mut [Memory]) {
    memories.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

/// Factory function for creating storage backends
pub async fn create_memory_store(config: &StorageConfig) -> Result<Box<dyn MemoryStore>, StorageError> {
    match config.backend_type.as_str() {
        "memory" => Ok(Box::new(InMemoryMemoryStore::new())),
        "sqlite" => {
            let store = SqliteMemoryStore::new(&config.url).await?;
            Ok(Box::new(store))
        }
        _ => Err(StorageError::ConfigError(format!("Unknown storage backend type: {}", config.backend_type))),
    }
}
