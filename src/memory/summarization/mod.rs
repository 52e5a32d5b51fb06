mod openai;
mod extractive;

pub use openai::OpenAISummarizationProvider;
pub use extractive::ExtractiveSummarizer;

use async_trait::async_trait;
use std::time::Duration;
use super::config::SummarizationConfig;

pub(crate) const SUMMARIZATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Instructions sent with each consolidation pass
pub mod instructions {
    pub const SUMMARIZE: &str =
        "Summarize the following related memories into one concise paragraph. Keep concrete facts, names and decisions.";
    pub const EXTRACT_PATTERNS: &str =
        "List the recurring patterns, preferences or behaviours visible across the following memories, one per line.";
    pub const GENERALIZE: &str =
        "State the general, reusable knowledge that follows from the following memories, independent of the specific episodes.";
}

/// Turns a batch of text into a shorter text following an instruction
#[async_trait]
pub trait SummarizationProviderTrait: Send + Sync {
    async fn run(&self, instruction: &str, content: &str) -> Result<String, SummarizationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SummarizationError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("API error: {message}")]
    ApiError { message: String },
    #[error("Empty response from summarization provider")]
    EmptyResponse,
    #[error("Summarization service unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl SummarizationError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, SummarizationError::ConfigError(_))
    }
}

/// Factory function to create summarization providers
pub fn create_summarization_provider(
    config: &SummarizationConfig,
) -> Result<Box<dyn SummarizationProviderTrait>, SummarizationError> {
    match config.provider_type.as_str() {
        "openai" => {
            if config.api_key.is_empty() {
                return Err(SummarizationError::ConfigError("OPENAI_API_KEY is not set".to_string()));
            }
            Ok(Box::new(OpenAISummarizationProvider::new(
                config.api_key.clone(),
                config.model.clone(),
                config.base_url.clone(),
                config.max_tokens,
            )?))
        }
        "extractive" => Ok(Box::new(ExtractiveSummarizer::default())),
        _ => Err(SummarizationError::ConfigError(format!(
            "Unknown summarization provider type: {}",
            config.provider_type
        ))),
    }
}
