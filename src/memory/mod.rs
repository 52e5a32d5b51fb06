// Hierarchical memory engine: storage, grouping and tier consolidation
pub mod config;
pub mod error;
pub mod embedding;
pub mod summarization;
pub mod storage;
pub mod grouping;
pub mod consolidation;
pub mod manager;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Duration, Utc};

/// Tag appended to every memory that has been folded into a higher-tier memory.
pub const CONSOLIDATED_TAG: &str = "consolidated";

/// Tier a memory currently lives in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemoryLevel {
    WorkingMemory,
    ShortTerm,
    LongTerm,
    Episodic,
    Semantic,
}

impl MemoryLevel {
    pub const ALL: [MemoryLevel; 5] = [
        MemoryLevel::WorkingMemory,
        MemoryLevel::ShortTerm,
        MemoryLevel::LongTerm,
        MemoryLevel::Episodic,
        MemoryLevel::Semantic,
    ];

    /// Position in the hierarchy. LongTerm, Episodic and Semantic share the top rank.
    pub fn rank(&self) -> u8 {
        match self {
            MemoryLevel::WorkingMemory => 0,
            MemoryLevel::ShortTerm => 1,
            MemoryLevel::LongTerm | MemoryLevel::Episodic | MemoryLevel::Semantic => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryLevel::WorkingMemory => "WorkingMemory",
            MemoryLevel::ShortTerm => "ShortTerm",
            MemoryLevel::LongTerm => "LongTerm",
            MemoryLevel::Episodic => "Episodic",
            MemoryLevel::Semantic => "Semantic",
        }
    }
}

impl fmt::Display for MemoryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MemoryLevel::ALL
            .iter()
            .copied()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| format!("unknown memory level: {}", s))
    }
}

/// Ordinal importance of a memory
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Importance {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Importance {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Importance::Low),
            2 => Some(Importance::Medium),
            3 => Some(Importance::High),
            4 => Some(Importance::Critical),
            _ => None,
        }
    }
}

impl Default for Importance {
    fn default() -> Self {
        Importance::Low
    }
}

/// Typed metadata carried by every memory
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct MemoryMetadata {
    pub source: String,
    #[serde(rename = "type")]
    pub memory_type: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub related_memories: BTreeSet<String>,
    pub owner_agent_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    pub project_id: String,
}

impl MemoryMetadata {
    pub fn new(
        source: impl Into<String>,
        memory_type: impl Into<String>,
        owner_agent_id: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            memory_type: memory_type.into(),
            owner_agent_id: owner_agent_id.into(),
            project_id: project_id.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_related<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.related_memories.extend(ids.into_iter().map(Into::into));
        self
    }
}

/// A single retained observation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub level: MemoryLevel,
    pub importance: Importance,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    pub embeddings: Option<Vec<f32>>,
    pub metadata: MemoryMetadata,
}

impl Memory {
    /// Fresh memory with a new id and `access_count == 1`.
    pub fn new(content: String, metadata: MemoryMetadata, level: MemoryLevel, importance: Importance) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content,
            level,
            importance,
            created_at: now,
            last_accessed: now,
            access_count: 1,
            embeddings: None,
            metadata,
        }
    }

    pub fn is_consolidated(&self) -> bool {
        self.metadata.tags.contains(CONSOLIDATED_TAG)
    }

    /// Active memories still count towards their tier and can be consolidated.
    pub fn is_active(&self) -> bool {
        !self.is_consolidated()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.created_at)
    }
}

/// Caller-side scope of a query
#[derive(Debug, Clone, Default)]
pub struct QueryScope {
    pub project_id: String,
    pub owner_agent_id: Option<String>,
}

/// Memory retrieval query. Every `None` filter imposes no constraint.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    pub content: String,
    pub metadata: QueryScope,
    pub level: Option<MemoryLevel>,
    pub memory_type: Option<String>,
    pub importance: Option<Importance>,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub tags: Option<BTreeSet<String>>,
    pub min_similarity: Option<f32>,
    pub limit: Option<usize>,
}

impl MemoryQuery {
    pub fn new(content: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: QueryScope {
                project_id: project_id.into(),
                owner_agent_id: None,
            },
            ..Default::default()
        }
    }

    pub fn for_owner(mut self, owner_agent_id: impl Into<String>) -> Self {
        self.metadata.owner_agent_id = Some(owner_agent_id.into());
        self
    }

    pub fn with_level(mut self, level: MemoryLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_type(mut self, memory_type: impl Into<String>) -> Self {
        self.memory_type = Some(memory_type.into());
        self
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn with_time_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.time_range = Some((start, end));
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_min_similarity(mut self, threshold: f32) -> Self {
        self.min_similarity = Some(threshold);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Client-side filters applied after the similarity search.
    pub fn matches(&self, memory: &Memory, similarity: f32) -> bool {
        if let Some(level) = self.level {
            if memory.level != level {
                return false;
            }
        }
        if let Some(ref memory_type) = self.memory_type {
            if &memory.metadata.memory_type != memory_type {
                return false;
            }
        }
        if let Some(importance) = self.importance {
            if memory.importance < importance {
                return false;
            }
        }
        if let Some((start, end)) = self.time_range {
            if memory.created_at < start || memory.created_at > end {
                return false;
            }
        }
        if let Some(ref tags) = self.tags {
            if !tags.iter().all(|tag| memory.metadata.tags.contains(tag)) {
                return false;
            }
        }
        if let Some(threshold) = self.min_similarity {
            if similarity < threshold {
                return false;
            }
        }
        true
    }
}

/// One ranked hit returned by `query_memories`
#[derive(Debug, Clone)]
pub struct MemorySearchResult {
    pub memory: Memory,
    pub similarity: f32,
}

/// Per-owner aggregate statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_memories: usize,
    pub by_level: HashMap<MemoryLevel, usize>,
    pub by_type: HashMap<String, usize>,
    pub by_importance: HashMap<Importance, usize>,
    pub average_access_count: f64,
    /// Share of memories created in the last 24h that already sit at LongTerm
    pub consolidation_rate: f64,
    /// Share of all memories retrieved at least once after creation
    pub retention_rate: f64,
}

/// Outcome of consolidating one group
#[derive(Debug, Clone)]
pub struct ConsolidationResult {
    pub source_memories: Vec<String>,
    pub new_memory: Memory,
    pub level: MemoryLevel,
    pub summary: String,
}

// Re-export key types for easy access
pub use config::{
    ConfigError, ConsolidationRule, EmbeddingProvider, MemoryConfig, MemoryLimits, RuleConditions,
    StorageBackend, SummarizationProvider, TierTtl, Transformations,
};
pub use error::{MemoryError, MemoryResult};
pub use embedding::{EmbeddingError, EmbeddingProviderTrait};
pub use summarization::{SummarizationError, SummarizationProviderTrait};
pub use storage::{MemoryStore, SearchRequest, StorageError};
pub use grouping::SimilarityGrouper;
pub use consolidation::{
    CapacityEnforcer, ConsolidationCycle, ConsolidationEngine, ConsolidationScheduler, CycleReport,
    SchedulerState,
};
pub use manager::MemoryManager;
