use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use super::{http_client, EmbeddingError, EmbeddingProviderTrait};

/// OpenAI (or OpenAI-compatible) `/embeddings` endpoint
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    dimension: usize,
}

impl OpenAIEmbeddingProvider {
    pub fn new(api_key: String, model: String, base_url: Option<String>, dimension: usize) -> Result<Self, EmbeddingError> {
        let base_url = base_url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Ok(Self {
            client: http_client()?,
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProviderTrait for OpenAIEmbeddingProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        #[derive(Serialize)]
        struct EmbeddingRequest<'a> {
            input: &'a [String],
            model: &'a str,
        }

        #[derive(Deserialize)]
        struct EmbeddingResponse {
            data: Vec<EmbeddingData>,
        }

        #[derive(Deserialize)]
        struct EmbeddingData {
            index: usize,
            embedding: Vec<f32>,
        }

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self.client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest { input: texts, model: &self.model })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiError { message: format!("{}: {}", status, error_text) });
        }

        let mut embedding_response: EmbeddingResponse = response.json().await?;
        // the API does not promise input order
        embedding_response.data.sort_by_key(|d| d.index);
        if embedding_response.data.len() != texts.len() {
            return Err(EmbeddingError::EmptyResponse);
        }
        Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
