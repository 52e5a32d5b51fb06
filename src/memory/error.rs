use super::config::ConfigError;
use super::embedding::EmbeddingError;
use super::storage::StorageError;
use super::summarization::SummarizationError;

/// Errors surfaced by the public memory API
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Persistence failure, propagated to the caller of the triggering operation
    #[error("Storage error: {0}")]
    Store(#[from] StorageError),
    /// Rejected at construction
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Embedding or summarization service unavailable; retry later
    #[error("Transient port error: {0}")]
    TransientPort(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Memory not found: {0}")]
    NotFound(String),
}

impl MemoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, MemoryError::TransientPort(_))
    }
}

impl From<EmbeddingError> for MemoryError {
    fn from(err: EmbeddingError) -> Self {
        MemoryError::TransientPort(format!("embedding: {}", err))
    }
}

impl From<SummarizationError> for MemoryError {
    fn from(err: SummarizationError) -> Self {
        MemoryError::TransientPort(format!("summarization: {}", err))
    }
}

pub type MemoryResult<T> = Result<T, MemoryError>;
