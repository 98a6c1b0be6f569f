//! HTTP LLM provider speaking a completions-style JSON API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{InferOptions, LlmProvider, ProviderError};

/// LLM client for an OpenAI-compatible completions endpoint
pub struct HttpLlmProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

impl HttpLlmProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    fn name(&self) -> &str {
        "llm"
    }

    async fn infer(&self, prompt: &str, options: &InferOptions) -> Result<String, ProviderError> {
        let request = CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::from_http)?;

        if response.status().is_server_error() {
            return Err(ProviderError::Unavailable(format!(
                "completions endpoint returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(ProviderError::Rejected(format!(
                "completions endpoint returned {}",
                response.status()
            )));
        }

        let body: CompletionResponse = response.json().await.map_err(ProviderError::from_http)?;

        body.choices
            .into_iter()
            .next()
            .map(|c| c.text.trim().to_string())
            .ok_or_else(|| ProviderError::Protocol("completion had no choices".into()))
    }
}
