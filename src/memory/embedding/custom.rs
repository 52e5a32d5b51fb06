use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use super::{http_client, EmbeddingError, EmbeddingProviderTrait, RequestFormat};

/// Custom embedding provider for any URL-based service
/// OpenAI compatible API is supported by default
pub struct CustomEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
    headers: HashMap<String, String>,
    request_format: RequestFormat,
    dimension: usize,
}

impl CustomEmbeddingProvider {
    pub fn new(
        url: String,
        api_key: String,
        headers: HashMap<String, String>,
        request_format: RequestFormat,
        dimension: usize,
    ) -> Result<Self, EmbeddingError> {
        Ok(Self {
            client: http_client()?,
            url,
            api_key,
            headers,
            request_format,
            dimension,
        })
    }

    fn request(&self) -> reqwest::RequestBuilder {
        let mut req = self.client.post(&self.url);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        req
    }

    async fn send_json(&self, body: &impl Serialize) -> Result<reqwest::Response, EmbeddingError> {
        let response = self.request().json(body).send().await?;
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiError { message: error_text });
        }
        Ok(response)
    }
}

#[async_trait]
impl EmbeddingProviderTrait for CustomEmbeddingProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        match &self.request_format {
            RequestFormat::OpenAICompatible => {
                #[derive(Serialize)]
                struct Request<'a> {
                    input: &'a [String],
                    model: &'a str,
                }

                #[derive(Deserialize)]
                struct Response {
                    data: Vec<EmbeddingData>,
                }

                #[derive(Deserialize)]
                struct EmbeddingData {
                    embedding: Vec<f32>,
                }

                let response = self.send_json(&Request { input: texts, model: "default" }).await?;
                let embedding_response: Response = response.json().await?;
                Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
            }
            RequestFormat::Custom { text_field, response_field } => {
                let mut embeddings = Vec::with_capacity(texts.len());
                for text in texts {
                    let mut request_body = serde_json::Map::new();
                    request_body.insert(text_field.clone(), serde_json::Value::String(text.clone()));

                    let response = self.send_json(&request_body).await?;
                    let response_json: serde_json::Value = response.json().await?;
                    let values = response_json
                        .get(response_field)
                        .and_then(|v| v.as_array())
                        .ok_or(EmbeddingError::EmptyResponse)?;
                    let embedding = values
                        .iter()
                        .map(|v| v.as_f64().map(|f| f as f32).ok_or(EmbeddingError::EmptyResponse))
                        .collect::<Result<Vec<f32>, _>>()?;
                    embeddings.push(embedding);
                }
                Ok(embeddings)
            }
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
