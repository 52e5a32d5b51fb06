mod openai;
mod ollama;
mod hashing;
mod custom;

pub use openai::OpenAIEmbeddingProvider;
pub use ollama::OllamaEmbeddingProvider;
pub use hashing::HashingEmbeddingProvider;
pub use custom::CustomEmbeddingProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use super::config::EmbeddingConfig;

/// Request timeout applied to every HTTP embedding call
pub(crate) const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestFormat {
    OpenAICompatible,
    Custom {
        text_field: String,
        response_field: String,
    },
}

/// Turns text into a fixed-length vector
#[async_trait]
pub trait EmbeddingProviderTrait: Send + Sync {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let results = self.embed_texts(&[text.to_string()]).await?;
        results.into_iter().next().ok_or(EmbeddingError::EmptyResponse)
    }
    fn dimension(&self) -> usize;
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("API error: {message}")]
    ApiError { message: String },
    #[error("Empty response from embedding provider")]
    EmptyResponse,
    #[error("Embedding service unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl EmbeddingError {
    /// Everything except a configuration mistake may succeed on retry.
    pub fn is_transient(&self) -> bool {
        !matches!(self, EmbeddingError::ConfigError(_))
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client, EmbeddingError> {
    reqwest::Client::builder()
        .timeout(EMBEDDING_TIMEOUT)
        .build()
        .map_err(|e| EmbeddingError::ConfigError(e.to_string()))
}

/// Factory function to create embedding providers
pub fn create_embedding_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProviderTrait>, EmbeddingError> {
    if config.dimension == 0 {
        return Err(EmbeddingError::ConfigError("embedding dimension must be greater than zero".to_string()));
    }
    match config.provider_type.as_str() {
        "openai" => {
            if config.api_key.is_empty() {
                return Err(EmbeddingError::ConfigError("OPENAI_API_KEY is not set".to_string()));
            }
            Ok(Box::new(OpenAIEmbeddingProvider::new(
                config.api_key.clone(),
                config.model.clone(),
                Some(config.base_url.clone()),
                config.dimension,
            )?))
        }
        "ollama" => Ok(Box::new(OllamaEmbeddingProvider::new(
            config.base_url.clone(),
            config.model.clone(),
            config.dimension,
        )?)),
        "local" => Ok(Box::new(HashingEmbeddingProvider::new(config.dimension))),
        "custom" => {
            if config.base_url.is_empty() {
                return Err(EmbeddingError::ConfigError("CUSTOM_EMBEDDING_URL is not set".to_string()));
            }
            Ok(Box::new(CustomEmbeddingProvider::new(
                config.base_url.clone(),
                config.api_key.clone(),
                config.headers.clone(),
                RequestFormat::OpenAICompatible,
                config.dimension,
            )?))
        }
        _ => Err(EmbeddingError::ConfigError(format!(
            "Unknown embedding provider type: {}",
            config.provider_type
        ))),
    }
}
