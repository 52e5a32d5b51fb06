use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use super::{Importance, MemoryLevel};

/// Upper bound for any configured age or TTL (100 years)
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 3600;

fn checked_seconds(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
}

/// Configuration problems detected before the engine starts
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid capacity: {0}")]
    InvalidCapacity(String),
    #[error("Invalid similarity threshold {0}: must be within 0..=1")]
    InvalidThreshold(f32),
    #[error("Consolidation interval must be greater than zero")]
    InvalidInterval,
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),
    #[error("Unknown memory level: {0}")]
    UnknownLevel(String),
    #[error("Rule {source_level} -> {target_level} does not move to a higher tier")]
    NonMonotonicRule {
        source_level: MemoryLevel,
        target_level: MemoryLevel,
    },
    #[error("Rule {0} -> {1} has no transformation enabled")]
    EmptyTransformations(MemoryLevel, MemoryLevel),
    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Engine configuration. Immutable once the manager is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// Embedding provider - simple enum selection
    pub embedding: EmbeddingProvider,
    /// Text generation provider used for summaries
    pub summarization: SummarizationProvider,
    /// Storage backend - simple enum selection
    pub storage: StorageBackend,
    /// Capacities and thresholds
    pub limits: MemoryLimits,
    /// Per-tier time-to-live
    pub ttl: TierTtl,
    pub consolidation_interval_secs: u64,
    /// Applied in declared order on every cycle
    pub consolidation_rules: Vec<ConsolidationRule>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingProvider::OpenAI,
            summarization: SummarizationProvider::OpenAI,
            storage: StorageBackend::InMemory,
            limits: MemoryLimits::default(),
            ttl: TierTtl::default(),
            consolidation_interval_secs: 3600,
            consolidation_rules: ConsolidationRule::defaults(),
        }
    }
}

/// Simple embedding provider selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EmbeddingProvider {
    /// OpenAI embeddings (uses OPENAI_API_KEY env var)
    OpenAI,
    /// OpenAI compatible (uses OPENAI_API_KEY and OPENAI_BASE_URL env vars)
    OpenAICompatible,
    /// Ollama local embeddings (uses OLLAMA_URL and OLLAMA_MODEL env vars, defaults: http://localhost:11434, all-minilm)
    Ollama,
    /// In-process feature hashing, no network
    Local,
    /// Custom endpoint (uses CUSTOM_EMBEDDING_URL and optional CUSTOM_EMBEDDING_* env vars)
    Custom,
}

/// Summarization provider selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SummarizationProvider {
    /// OpenAI chat completions (uses OPENAI_API_KEY, SUMMARY_MODEL)
    OpenAI,
    /// OpenAI compatible chat endpoint (uses OPENAI_BASE_URL)
    OpenAICompatible,
    /// In-process extractive summaries, no network
    Extractive,
}

/// Storage backend selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StorageBackend {
    /// Process-local map (default, works out of box)
    InMemory,
    /// SQLite file (uses SQLITE_PATH env var)
    Sqlite,
}

/// Memory limits and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryLimits {
    pub max_working_memories: usize,
    pub max_short_term_memories: usize,
    pub max_retrieval_results: usize,
    pub similarity_threshold: f32,
    /// Groups below this importance are never promoted to LongTerm
    pub min_long_term_importance: Importance,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            max_working_memories: 50,
            max_short_term_memories: 500,
            max_retrieval_results: 10,
            similarity_threshold: 0.7,
            min_long_term_importance: Importance::Medium,
        }
    }
}

impl MemoryLimits {
    /// Active-memory capacity for a tier; top tiers are unbounded.
    pub fn capacity_for(&self, level: MemoryLevel) -> Option<usize> {
        match level {
            MemoryLevel::WorkingMemory => Some(self.max_working_memories),
            MemoryLevel::ShortTerm => Some(self.max_short_term_memories),
            _ => None,
        }
    }
}

/// Per-tier time-to-live in seconds. `None` disables expiry for that tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TierTtl {
    pub working_memory_secs: Option<u64>,
    pub short_term_secs: Option<u64>,
    pub long_term_secs: Option<u64>,
}

impl Default for TierTtl {
    fn default() -> Self {
        Self {
            working_memory_secs: Some(24 * 3600),
            short_term_secs: Some(7 * 24 * 3600),
            long_term_secs: None,
        }
    }
}

impl TierTtl {
    pub fn ttl_for(&self, level: MemoryLevel) -> Option<chrono::Duration> {
        let secs = match level {
            MemoryLevel::WorkingMemory => self.working_memory_secs,
            MemoryLevel::ShortTerm => self.short_term_secs,
            MemoryLevel::LongTerm | MemoryLevel::Episodic | MemoryLevel::Semantic => self.long_term_secs,
        };
        // out-of-range values mean no expiry
        secs.and_then(checked_seconds)
    }
}

/// Thresholds a memory must meet to be considered by a rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleConditions {
    pub min_importance: Importance,
    pub min_access_count: u64,
    pub min_age_secs: u64,
    #[serde(default)]
    pub required_tags: Option<BTreeSet<String>>,
    #[serde(default)]
    pub required_types: Option<Vec<String>>,
}

impl Default for RuleConditions {
    fn default() -> Self {
        Self {
            min_importance: Importance::Low,
            min_access_count: 1,
            min_age_secs: 0,
            required_tags: None,
            required_types: None,
        }
    }
}

impl RuleConditions {
    /// Saturates for values `validate` would reject, so such a rule never matches.
    pub fn min_age(&self) -> chrono::Duration {
        checked_seconds(self.min_age_secs).unwrap_or(chrono::Duration::MAX)
    }
}

/// Which summarization passes a rule performs
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Transformations {
    pub summarize: bool,
    pub combine_related: bool,
    pub extract_patterns: bool,
    pub generalize_knowledge: bool,
}

impl Transformations {
    /// True when at least one pass produces content.
    pub fn produces_content(&self) -> bool {
        self.summarize || self.extract_patterns || self.generalize_knowledge
    }
}

/// Moves eligible memories from `source_level` into one memory at `target_level`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConsolidationRule {
    pub source_level: MemoryLevel,
    pub target_level: MemoryLevel,
    #[serde(default)]
    pub conditions: RuleConditions,
    pub transformations: Transformations,
}

impl ConsolidationRule {
    pub fn new(source_level: MemoryLevel, target_level: MemoryLevel) -> Self {
        Self {
            source_level,
            target_level,
            conditions: RuleConditions::default(),
            transformations: Transformations {
                summarize: true,
                combine_related: true,
                ..Default::default()
            },
        }
    }

    pub fn with_conditions(mut self, conditions: RuleConditions) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_transformations(mut self, transformations: Transformations) -> Self {
        self.transformations = transformations;
        self
    }

    /// Rules shipped with `MemoryConfig::default()`
    pub fn defaults() -> Vec<Self> {
        vec![
            ConsolidationRule::new(MemoryLevel::WorkingMemory, MemoryLevel::ShortTerm).with_conditions(
                RuleConditions {
                    min_age_secs: 5 * 60,
                    ..Default::default()
                },
            ),
            // facts go to Semantic before the generic LongTerm rule sees them
            ConsolidationRule::new(MemoryLevel::ShortTerm, MemoryLevel::Semantic)
                .with_conditions(RuleConditions {
                    min_importance: Importance::Medium,
                    min_access_count: 2,
                    min_age_secs: 24 * 3600,
                    required_tags: None,
                    required_types: Some(vec!["fact".to_string()]),
                })
                .with_transformations(Transformations {
                    generalize_knowledge: true,
                    combine_related: true,
                    ..Default::default()
                }),
            ConsolidationRule::new(MemoryLevel::ShortTerm, MemoryLevel::LongTerm)
                .with_conditions(RuleConditions {
                    min_importance: Importance::Medium,
                    min_access_count: 3,
                    min_age_secs: 24 * 3600,
                    ..Default::default()
                })
                .with_transformations(Transformations {
                    summarize: true,
                    combine_related: true,
                    extract_patterns: true,
                    generalize_knowledge: false,
                }),
        ]
    }
}

impl MemoryConfig {
    /// Create config from environment variables - works out of the box
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let mut config = Self::default();

        // Auto-detect embedding provider based on env vars
        if std::env::var("OLLAMA_URL").is_ok() || std::env::var("OLLAMA_MODEL").is_ok() {
            config.embedding = EmbeddingProvider::Ollama;
        } else if std::env::var("CUSTOM_EMBEDDING_URL").is_ok() {
            config.embedding = EmbeddingProvider::Custom;
        } else if std::env::var("OPENAI_BASE_URL").is_ok() {
            config.embedding = EmbeddingProvider::OpenAICompatible;
        } else if std::env::var("OPENAI_API_KEY").is_err() {
            config.embedding = EmbeddingProvider::Local;
        }

        if std::env::var("OPENAI_BASE_URL").is_ok() {
            config.summarization = SummarizationProvider::OpenAICompatible;
        } else if std::env::var("OPENAI_API_KEY").is_err() {
            config.summarization = SummarizationProvider::Extractive;
        }

        if std::env::var("SQLITE_PATH").is_ok() {
            config.storage = StorageBackend::Sqlite;
        }

        if let Some(secs) = std::env::var("CONSOLIDATION_INTERVAL_SECS").ok().and_then(|v| v.parse().ok()) {
            config.consolidation_interval_secs = secs;
        }

        config
    }

    /// Parse a TOML document; missing sections fall back to defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| classify_parse_error(e.to_string()))
    }

    /// Layered load: optional file, then `MERCO_MEMORY__SECTION__KEY` environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("MERCO_MEMORY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        let loaded: MemoryConfig = settings
            .try_deserialize()
            .map_err(|e| classify_parse_error(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_working_memories == 0 {
            return Err(ConfigError::InvalidCapacity(
                "max_working_memories must be greater than zero".to_string(),
            ));
        }
        if self.limits.max_short_term_memories == 0 {
            return Err(ConfigError::InvalidCapacity(
                "max_short_term_memories must be greater than zero".to_string(),
            ));
        }
        let threshold = self.limits.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) || threshold.is_nan() {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        if self.consolidation_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        check_duration("consolidation_interval_secs", self.consolidation_interval_secs)?;
        let ttls = [
            ("ttl.working_memory_secs", self.ttl.working_memory_secs),
            ("ttl.short_term_secs", self.ttl.short_term_secs),
            ("ttl.long_term_secs", self.ttl.long_term_secs),
        ];
        for (name, secs) in ttls {
            if let Some(secs) = secs {
                check_duration(name, secs)?;
            }
        }
        for rule in &self.consolidation_rules {
            if rule.target_level.rank() <= rule.source_level.rank() {
                return Err(ConfigError::NonMonotonicRule {
                    source_level: rule.source_level,
                    target_level: rule.target_level,
                });
            }
            if !rule.transformations.produces_content() {
                return Err(ConfigError::EmptyTransformations(rule.source_level, rule.target_level));
            }
            check_duration("conditions.min_age_secs", rule.conditions.min_age_secs)?;
        }
        Ok(())
    }

    pub fn consolidation_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.consolidation_interval_secs)
    }

    /// Rules draining `level`, in declared order.
    pub fn rules_for_source(&self, level: MemoryLevel) -> impl Iterator<Item = &ConsolidationRule> {
        self.consolidation_rules.iter().filter(move |rule| rule.source_level == level)
    }

    /// Get embedding configuration details
    pub fn embedding_config(&self) -> EmbeddingConfig {
        match &self.embedding {
            EmbeddingProvider::OpenAI => EmbeddingConfig {
                provider_type: "openai".to_string(),
                api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: "text-embedding-3-small".to_string(),
                dimension: 1536,
                headers: HashMap::new(),
            },
            EmbeddingProvider::OpenAICompatible => EmbeddingConfig {
                provider_type: "openai".to_string(),
                api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
                base_url: std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                model: std::env::var("OPENAI_EMBEDDING_MODEL").unwrap_or_else(|_| "text-embedding-3-small".to_string()),
                dimension: env_dimension(1536),
                headers: HashMap::new(),
            },
            EmbeddingProvider::Ollama => EmbeddingConfig {
                provider_type: "ollama".to_string(),
                api_key: String::new(),
                base_url: std::env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string()),
                model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "all-minilm".to_string()),
                dimension: env_dimension(384),
                headers: HashMap::new(),
            },
            EmbeddingProvider::Local => EmbeddingConfig {
                provider_type: "local".to_string(),
                api_key: String::new(),
                base_url: String::new(),
                model: "feature-hashing".to_string(),
                dimension: env_dimension(256),
                headers: HashMap::new(),
            },
            EmbeddingProvider::Custom => {
                let mut headers = HashMap::new();
                // Load any CUSTOM_EMBEDDING_HEADER_* env vars
                for (key, value) in std::env::vars() {
                    if let Some(name) = key.strip_prefix("CUSTOM_EMBEDDING_HEADER_") {
                        headers.insert(name.replace('_', "-").to_lowercase(), value);
                    }
                }

                EmbeddingConfig {
                    provider_type: "custom".to_string(),
                    api_key: std::env::var("CUSTOM_EMBEDDING_API_KEY").unwrap_or_default(),
                    base_url: std::env::var("CUSTOM_EMBEDDING_URL").unwrap_or_default(),
                    model: std::env::var("CUSTOM_EMBEDDING_MODEL").unwrap_or_else(|_| "default".to_string()),
                    dimension: env_dimension(1536),
                    headers,
                }
            }
        }
    }

    /// Get summarization configuration details
    pub fn summarization_config(&self) -> SummarizationConfig {
        match &self.summarization {
            SummarizationProvider::OpenAI => SummarizationConfig {
                provider_type: "openai".to_string(),
                api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: std::env::var("SUMMARY_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                max_tokens: 512,
            },
            SummarizationProvider::OpenAICompatible => SummarizationConfig {
                provider_type: "openai".to_string(),
                api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
                base_url: std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                model: std::env::var("SUMMARY_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                max_tokens: 512,
            },
            SummarizationProvider::Extractive => SummarizationConfig {
                provider_type: "extractive".to_string(),
                api_key: String::new(),
                base_url: String::new(),
                model: String::new(),
                max_tokens: 0,
            },
        }
    }

    /// Get storage configuration details
    pub fn storage_config(&self) -> StorageConfig {
        match &self.storage {
            StorageBackend::InMemory => StorageConfig {
                backend_type: "memory".to_string(),
                url: String::new(),
            },
            StorageBackend::Sqlite => StorageConfig {
                backend_type: "sqlite".to_string(),
                url: std::env::var("SQLITE_PATH").unwrap_or_else(|_| "./memory.db".to_string()),
            },
        }
    }
}

fn check_duration(name: &str, secs: u64) -> Result<(), ConfigError> {
    if secs > MAX_DURATION_SECS {
        return Err(ConfigError::InvalidDuration(format!(
            "{} = {} exceeds {} seconds",
            name, secs, MAX_DURATION_SECS
        )));
    }
    Ok(())
}

fn env_dimension(default: usize) -> usize {
    std::env::var("EMBEDDING_DIMENSION")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn classify_parse_error(message: String) -> ConfigError {
    let names_level = MemoryLevel::ALL.iter().any(|level| message.contains(level.as_str()));
    if message.contains("unknown variant") && names_level {
        ConfigError::UnknownLevel(message)
    } else {
        ConfigError::Parse(message)
    }
}

/// Internal embedding configuration
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider_type: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub dimension: usize,
    pub headers: HashMap<String, String>,
}

/// Internal summarization configuration
#[derive(Debug, Clone)]
pub struct SummarizationConfig {
    pub provider_type: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
}

/// Internal storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend_type: String,
    pub url: String,
}
