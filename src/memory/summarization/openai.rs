use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use super::{SummarizationError, SummarizationProviderTrait, SUMMARIZATION_TIMEOUT};

/// Chat-completions backed summarizer (OpenAI or compatible endpoint)
pub struct OpenAISummarizationProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
}

impl OpenAISummarizationProvider {
    pub fn new(api_key: String, model: String, base_url: String, max_tokens: u32) -> Result<Self, SummarizationError> {
        let client = reqwest::Client::builder()
            .timeout(SUMMARIZATION_TIMEOUT)
            .build()
            .map_err(|e| SummarizationError::ConfigError(e.to_string()))?;
        let base_url = if base_url.is_empty() {
            "https://api.openai.com/v1".to_string()
        } else {
            base_url.trim_end_matches('/').to_string()
        };
        Ok(Self {
            client,
            api_key,
            model,
            base_url,
            max_tokens,
        })
    }
}

#[async_trait]
impl SummarizationProviderTrait for OpenAISummarizationProvider {
    async fn run(&self, instruction: &str, content: &str) -> Result<String, SummarizationError> {
        #[derive(Serialize)]
        struct ChatMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
            max_tokens: u32,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ResponseMessage,
        }

        #[derive(Deserialize)]
        struct ResponseMessage {
            content: Option<String>,
        }

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: instruction },
                ChatMessage { role: "user", content },
            ],
            max_tokens: self.max_tokens,
            temperature: 0.0,
        };

        let response = self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(SummarizationError::ApiError { message: format!("{}: {}", status, error_text) });
        }

        let chat_response: ChatResponse = response.json().await?;
        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(SummarizationError::EmptyResponse)
    }
}
