use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use super::super::config::ConsolidationRule;
use super::super::embedding::EmbeddingProviderTrait;
use super::super::error::{MemoryError, MemoryResult};
use super::super::storage::MemoryStore;
use super::super::summarization::{instructions, SummarizationProviderTrait};
use super::super::{ConsolidationResult, Memory, MemoryMetadata, CONSOLIDATED_TAG};

/// Source label carried by every consolidated memory
pub const CONSOLIDATION_SOURCE: &str = "consolidation";

/// Folds a group of related memories into one memory at the rule's target tier
pub struct ConsolidationEngine {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn EmbeddingProviderTrait>,
    summarizer: Arc<dyn SummarizationProviderTrait>,
}

impl ConsolidationEngine {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn EmbeddingProviderTrait>,
        summarizer: Arc<dyn SummarizationProviderTrait>,
    ) -> Self {
        Self {
            store,
            embedder,
            summarizer,
        }
    }

    /// Summarize `group`, persist the new memory and tag the sources, as one unit.
    ///
    /// A failed summarization pass is skipped. If every requested pass fails the
    /// group is left untouched and a transient error is returned.
    pub async fn apply(&self, rule: &ConsolidationRule, group: &[Memory]) -> MemoryResult<ConsolidationResult> {
        let founder = group
            .first()
            .ok_or_else(|| MemoryError::Validation("cannot consolidate an empty group".to_string()))?;
        if let Some(stray) = group.iter().find(|m| m.level != rule.source_level) {
            return Err(MemoryError::Validation(format!(
                "memory {} is at {}, rule consumes {}",
                stray.id, stray.level, rule.source_level
            )));
        }

        let summary = self.transform(rule, group).await?;
        let new_memory = self.build_memory(rule, founder, group, summary.clone()).await;
        let source_ids: Vec<String> = group.iter().map(|m| m.id.clone()).collect();

        self.store.commit_consolidation(&new_memory, &source_ids).await?;

        info!(
            owner = %founder.metadata.owner_agent_id,
            from = %rule.source_level,
            to = %rule.target_level,
            group_size = group.len(),
            memory_id = %new_memory.id,
            "consolidated memory group"
        );

        Ok(ConsolidationResult {
            source_memories: source_ids,
            level: rule.target_level,
            new_memory,
            summary,
        })
    }

    async fn transform(&self, rule: &ConsolidationRule, group: &[Memory]) -> MemoryResult<String> {
        let joined = group
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let passes = [
            (rule.transformations.summarize, instructions::SUMMARIZE, None),
            (rule.transformations.extract_patterns, instructions::EXTRACT_PATTERNS, Some("Patterns identified:")),
            (rule.transformations.generalize_knowledge, instructions::GENERALIZE, Some("Generalized knowledge:")),
        ];

        let mut sections = Vec::new();
        let mut requested = 0;
        let mut last_error = None;
        for (enabled, instruction, heading) in passes {
            if !enabled {
                continue;
            }
            requested += 1;
            match self.summarizer.run(instruction, &joined).await {
                Ok(text) => sections.push(match heading {
                    Some(heading) => format!("{}\n{}", heading, text),
                    None => text,
                }),
                Err(e) => {
                    warn!(error = %e, heading = heading.unwrap_or("summary"), "summarization pass skipped");
                    last_error = Some(e);
                }
            }
        }

        if requested > 0 && sections.is_empty() {
            if let Some(e) = last_error {
                return Err(e.into());
            }
        }
        if requested == 0 {
            debug!(from = %rule.source_level, to = %rule.target_level, "rule has no transformations, content left empty");
        }

        Ok(sections.join("\n\n"))
    }

    async fn build_memory(
        &self,
        rule: &ConsolidationRule,
        founder: &Memory,
        group: &[Memory],
        content: String,
    ) -> Memory {
        let importance = group.iter().map(|m| m.importance).max().unwrap_or(founder.importance);

        let mut tags: BTreeSet<String> = group
            .iter()
            .flat_map(|m| m.metadata.tags.iter().cloned())
            .collect();
        tags.remove(CONSOLIDATED_TAG);

        let shared_task = founder
            .metadata
            .task_id
            .clone()
            .filter(|task| group.iter().all(|m| m.metadata.task_id.as_ref() == Some(task)));

        let metadata = MemoryMetadata {
            source: CONSOLIDATION_SOURCE.to_string(),
            memory_type: founder.metadata.memory_type.clone(),
            tags,
            related_memories: group.iter().map(|m| m.id.clone()).collect(),
            owner_agent_id: founder.metadata.owner_agent_id.clone(),
            task_id: shared_task,
            project_id: founder.metadata.project_id.clone(),
        };

        let mut memory = Memory::new(content, metadata, rule.target_level, importance);
        if !memory.content.is_empty() {
            match self.embedder.embed_text(&memory.content).await {
                Ok(embedding) => memory.embeddings = Some(embedding),
                Err(e) => warn!(error = %e, memory_id = %memory.id, "stored consolidated memory without embedding"),
            }
        }
        memory
    }
}
