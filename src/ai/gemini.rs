//! Google Gemini integration.
//!
//! Calls the `generateContent` REST endpoint directly.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{AIError, TextGenerator};
use crate::core::{retry_async, RetryConfig};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini API provider.
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryConfig,
}

impl GeminiProvider {
    /// Create a new Gemini provider.
    ///
    /// Reads API key from GEMINI_API_KEY environment variable.
    pub fn new() -> anyhow::Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("GEMINI_API_KEY not set"))?;

        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: BASE_URL.to_string(),
            model: "gemini-2.0-flash-lite".to_string(),
            retry: RetryConfig::api(),
        })
    }

    /// Create with a specific model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point at a different API root (proxies, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Use a different retry policy; its attempt timeout bounds each request.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        if let Some(timeout) = retry.attempt_timeout {
            self.client = Client::builder().timeout(timeout).build().unwrap_or_default();
        }
        self.retry = retry;
        self
    }

    /// Remove the API key from any text that may end up in logs.
    fn redact(&self, message: &str) -> String {
        message.replace(&self.api_key, "[REDACTED]")
    }

    /// Make a single request to the Gemini API.
    async fn request(&self, prompt: &str, temperature: f32, max_tokens: u32) -> anyhow::Result<String> {
        let request = GeminiRequest {
            contents: vec![Content { parts: vec![Part { text: prompt.to_string() }] }],
            generation_config: GenerationConfig {
                temperature,
                top_k: 1,
                top_p: 1.0,
                max_output_tokens: max_tokens,
            },
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AIError::ApiError(self.redact(&e.to_string())))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AIError::ApiError("Gemini rate limit exceeded".to_string()).into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AIError::ApiError(self.redact(&format!("Gemini ({status}): {body}"))).into());
        }

        let response: GeminiResponse = response.json().await?;
        response.first_text().ok_or_else(|| AIError::NoResponse.into())
    }
}

#[async_trait]
impl TextGenerator for GeminiProvider {
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
        "gemini"
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GeminiResponse {
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()
            .map(|p| p.text)
            .filter(|text| !text.is_empty())
    }
}
