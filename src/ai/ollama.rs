//! Ollama local LLM integration.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{AIError, TextGenerator};
use crate::core::{retry_async, OllamaConfig, RetryConfig};

/// Ollama API provider for local LLM.
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    retry: RetryConfig,
}

impl OllamaProvider {
    /// Create a provider from config.
    ///
    /// `OLLAMA_HOST` and `OLLAMA_MODEL` override the configured values.
    pub fn from_config(config: &OllamaConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: std::env::var("OLLAMA_HOST").unwrap_or_else(|_| config.base_url.clone()),
            model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| config.model.clone()),
            retry: RetryConfig::api(),
        }
    }

    /// Create with a specific base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Create with a specific model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Use a different retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        if let Some(timeout) = retry.attempt_timeout {
            self.client = Client::builder().timeout(timeout).build().unwrap_or_default();
        }
        self.retry = retry;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    /// Make a request to the Ollama API.
    async fn request(&self, prompt: &str, temperature: f32, max_tokens: u32) -> anyhow::Result<String> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions { temperature, num_predict: max_tokens },
        };

        let response = self.client.post(self.endpoint("/api/generate")).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AIError::ApiError(format!("Ollama ({status}): {body}")).into());
        }

        let response: OllamaResponse = response.json().await?;
        if response.response.trim().is_empty() {
            return Err(AIError::NoResponse.into());
        }
        Ok(response.response)
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::from_config(&OllamaConfig::default())
    }
}

#[async_trait]
impl TextGenerator for OllamaProvider {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> anyhow::Result<String> {
        retry_async(&self.retry, || self.request(prompt, temperature, max_tokens))
            .await
            .into_result()
    }

    fn name(&self) -> &str {
        "ollama"
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.endpoint("/api/tags"))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .is_ok_and(|r| r.status().is_success())
    }
}

/// Ollama API request structure.
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama API response structure.
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}
