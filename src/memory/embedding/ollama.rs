use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use super::{http_client, EmbeddingError, EmbeddingProviderTrait};

/// Ollama `/api/embeddings`, one request per text
pub struct OllamaEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbeddingProvider {
    pub fn new(base_url: String, model: String, dimension: usize) -> Result<Self, EmbeddingError> {
        Ok(Self {
            client: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProviderTrait for OllamaEmbeddingProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        #[derive(Serialize)]
        struct OllamaEmbeddingRequest<'a> {
            model: &'a str,
            prompt: &'a str,
        }

        #[derive(Deserialize)]
        struct OllamaEmbeddingResponse {
            embedding: Vec<f32>,
        }

        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            let response = self.client
                .post(format!("{}/api/embeddings", self.base_url))
                .json(&OllamaEmbeddingRequest { model: &self.model, prompt: text })
                .send()
                .await?;

            if !response.status().is_success() {
                let error_text = response.text().await.unwrap_or_default();
                return Err(EmbeddingError::ApiError { message: error_text });
            }

            let embedding_response: OllamaEmbeddingResponse = response.json().await?;
            if embedding_response.embedding.is_empty() {
                return Err(EmbeddingError::EmptyResponse);
            }
            embeddings.push(embedding_response.embedding);
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
