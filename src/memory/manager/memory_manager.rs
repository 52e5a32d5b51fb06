use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};
use super::super::config::MemoryConfig;
use super::super::consolidation::{
    CapacityEnforcer, ConsolidationCycle, ConsolidationEngine, ConsolidationScheduler, CycleReport, OwnerLocks,
    SchedulerState,
};
use super::super::embedding::{create_embedding_provider, EmbeddingProviderTrait};
use super::super::error::{MemoryError, MemoryResult};
use super::super::storage::{create_memory_store, MemoryStore, SearchRequest};
use super::super::summarization::{create_summarization_provider, SummarizationProviderTrait};
use super::super::{
    Importance, Memory, MemoryLevel, MemoryMetadata, MemoryQuery, MemorySearchResult, MemoryStats, CONSOLIDATED_TAG,
};

/// Entry point of the memory engine: add, query, stats and shutdown.
///
/// Owns the consolidation scheduler, which starts when the manager is built.
pub struct MemoryManager {
    config: Arc<MemoryConfig>,
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn EmbeddingProviderTrait>,
    enforcer: Arc<CapacityEnforcer>,
    cycle: Arc<ConsolidationCycle>,
    owner_locks: Arc<OwnerLocks>,
    scheduler: ConsolidationScheduler,
}

impl MemoryManager {
    /// Validate `config`, wire the engine and start the scheduler.
    pub async fn new(
        config: MemoryConfig,
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn EmbeddingProviderTrait>,
        summarizer: Arc<dyn SummarizationProviderTrait>,
    ) -> MemoryResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let engine = Arc::new(ConsolidationEngine::new(store.clone(), embedder.clone(), summarizer));
        let enforcer = Arc::new(CapacityEnforcer::new(config.clone(), store.clone(), engine.clone()));
        let owner_locks = Arc::new(OwnerLocks::new());
        let cycle = Arc::new(ConsolidationCycle::new(
            config.clone(),
            store.clone(),
            embedder.clone(),
            engine,
            enforcer.clone(),
            owner_locks.clone(),
        ));
        let scheduler = ConsolidationScheduler::start(cycle.clone(), config.consolidation_interval());

        Ok(Self {
            config,
            store,
            embedder,
            enforcer,
            cycle,
            owner_locks,
            scheduler,
        })
    }

    /// Build store and ports from the provider selections in `config`.
    pub async fn from_config(config: MemoryConfig) -> MemoryResult<Self> {
        config.validate()?;

        let store = create_memory_store(&config.storage_config()).await?;
        let embedder = create_embedding_provider(&config.embedding_config())
            .map_err(|e| MemoryError::Validation(format!("embedding provider: {}", e)))?;
        let summarizer = create_summarization_provider(&config.summarization_config())
            .map_err(|e| MemoryError::Validation(format!("summarization provider: {}", e)))?;

        Self::new(config, Arc::from(store), Arc::from(embedder), Arc::from(summarizer)).await
    }

    /// Add a WorkingMemory entry with `Low` importance.
    pub async fn add_memory(&self, content: impl Into<String>, metadata: MemoryMetadata) -> MemoryResult<Memory> {
        self.add_memory_with(content, metadata, MemoryLevel::WorkingMemory, Importance::Low).await
    }

    /// Store a new memory, then enforce the tier capacity for its owner.
    ///
    /// An embedding failure is not an error: the memory is stored without one
    /// and picked up by the next cycle's repair pass.
    pub async fn add_memory_with(
        &self,
        content: impl Into<String>,
        metadata: MemoryMetadata,
        level: MemoryLevel,
        importance: Importance,
    ) -> MemoryResult<Memory> {
        validate_metadata(&metadata)?;
        let mut memory = Memory::new(content.into(), metadata, level, importance);

        // embedding runs outside any lock
        match self.embedder.embed_text(&memory.content).await {
            Ok(embedding) => memory.embeddings = Some(embedding),
            Err(e) => warn!(memory_id = %memory.id, error = %e, "stored memory without embedding"),
        }

        let owner = memory.metadata.owner_agent_id.clone();
        let lock = self.owner_locks.lock_for(&owner);
        let _owner_guard = lock.lock().await;

        self.store.put(&memory).await?;
        let evicted = self.enforcer.enforce(level, &owner).await?;
        debug!(memory_id = %memory.id, owner = %owner, %level, evicted = evicted.len(), "memory added");

        Ok(memory)
    }

    /// Similarity search scoped to the query's project (and owner), then filtered.
    ///
    /// Results keep the store's ranking. Every returned memory counts as accessed.
    pub async fn query_memories(&self, query: &MemoryQuery) -> MemoryResult<Vec<MemorySearchResult>> {
        let limit = query.limit.unwrap_or(self.config.limits.max_retrieval_results);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let embedding = match self.embedder.embed_text(&query.content).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                debug!(error = %e, "query embedding failed, falling back to lexical ranking");
                None
            }
        };

        let request = SearchRequest {
            text: query.content.clone(),
            embedding,
            project_id: query.metadata.project_id.clone(),
            owner_agent_id: query.metadata.owner_agent_id.clone(),
        };
        let hits = self.store.search(&request, limit).await?;

        let now = Utc::now();
        let mut results = Vec::new();
        for (memory, similarity) in hits {
            if !query.matches(&memory, similarity) {
                continue;
            }
            if let Some(accessed) = self.store.record_access(&memory.id, now).await? {
                results.push(MemorySearchResult {
                    memory: accessed,
                    similarity,
                });
            }
        }
        Ok(results)
    }

    /// Never fails for an owner without memories.
    pub async fn get_stats(&self, owner_agent_id: &str) -> MemoryResult<MemoryStats> {
        let memories = self.store.list_by_owner(owner_agent_id).await?;
        Ok(MemoryStats::from_memories(&memories, Utc::now()))
    }

    /// Lookup by id; does not count as an access.
    pub async fn get_memory(&self, id: &str) -> MemoryResult<Option<Memory>> {
        Ok(self.store.get(id).await?)
    }

    /// Resolve `related_memories` of `id` through the store, skipping ids that no longer exist.
    pub async fn get_related(&self, id: &str) -> MemoryResult<Vec<Memory>> {
        let memory = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;

        let mut related = Vec::with_capacity(memory.metadata.related_memories.len());
        for related_id in &memory.metadata.related_memories {
            if let Some(found) = self.store.get(related_id).await? {
                related.push(found);
            }
        }
        Ok(related)
    }

    /// Retry embeddings for an owner's memories stored without one. Returns how many were repaired.
    pub async fn retry_missing_embeddings(&self, owner_agent_id: &str) -> MemoryResult<usize> {
        let missing: Vec<Memory> = self
            .store
            .list_by_owner(owner_agent_id)
            .await?
            .into_iter()
            .filter(|m| m.embeddings.is_none() && !m.content.is_empty())
            .collect();

        let mut repaired = 0;
        for memory in missing {
            let embedding = self.embedder.embed_text(&memory.content).await?;
            self.store.set_embeddings(&memory.id, &embedding).await?;
            repaired += 1;
        }
        Ok(repaired)
    }

    /// Run one consolidation cycle now. Waits for a scheduled cycle in progress.
    pub async fn run_consolidation_cycle(&self) -> CycleReport {
        self.cycle.run().await
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Stop the background scheduler. Idempotent.
    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }
}

fn validate_metadata(metadata: &MemoryMetadata) -> MemoryResult<()> {
    if metadata.owner_agent_id.trim().is_empty() {
        return Err(MemoryError::Validation("ownerAgentId must not be empty".to_string()));
    }
    if metadata.project_id.trim().is_empty() {
        return Err(MemoryError::Validation("projectId must not be empty".to_string()));
    }
    if metadata.tags.contains(CONSOLIDATED_TAG) {
        return Err(MemoryError::Validation(format!("tag '{}' is reserved", CONSOLIDATED_TAG)));
    }
    Ok(())
}
