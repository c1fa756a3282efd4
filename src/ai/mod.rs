//! Text-generation backends.
//!
//! The workflow steps only see the [`TextGenerator`] trait. Concrete providers
//! (Gemini, Claude, Ollama) live behind the `ai` feature and are chained by
//! [`AIManager`], which falls through to the next provider when one fails.

#[cfg(feature = "ai")]
mod claude;
#[cfg(feature = "ai")]
mod gemini;
#[cfg(feature = "ai")]
mod ollama;

#[cfg(feature = "ai")]
pub use claude::ClaudeProvider;
#[cfg(feature = "ai")]
pub use gemini::GeminiProvider;
#[cfg(feature = "ai")]
pub use ollama::OllamaProvider;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{AiConfig, CircuitBreaker};

/// A backend that turns a prompt into text.
///
/// Implementations own their retry policy; callers treat any error as "no
/// usable text" and never retry on their own.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for `prompt`.
    async fn generate(&self, prompt: &str, temperature: f32, max_tokens: u32)
        -> anyhow::Result<String>;

    /// Get the provider name.
    fn name(&self) -> &str;

    /// Check if the provider is available.
    async fn is_available(&self) -> bool;
}

/// AI error types.
#[derive(Debug, thiserror::Error)]
pub enum AIError {
    #[error("Provider not available: {0}")]
    ProviderNotAvailable(String),

    #[error("Unknown AI provider '{0}' (expected auto, gemini, claude, ollama or none)")]
    UnknownProvider(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("No response from AI")]
    NoResponse,
}

struct ManagedProvider {
    provider: Box<dyn TextGenerator>,
    breaker: Mutex<CircuitBreaker>,
}

/// Ordered provider chain with per-provider circuit breakers.
///
/// Breakers track backend health, not run progress, so they are shared by
/// every run that uses this manager: once a provider trips, all runs skip it
/// until the reset timeout passes. An empty chain is valid: every call fails
/// and the workflow steps fall back to their template output.
pub struct AIManager {
    providers: Vec<ManagedProvider>,
}

impl std::fmt::Debug for AIManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AIManager").field("providers", &self.provider_names()).finish()
    }
}

impl AIManager {
    /// Create a manager over the given providers, tried in order.
    pub fn new(providers: Vec<Box<dyn TextGenerator>>) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|provider| ManagedProvider {
                    provider,
                    breaker: Mutex::new(CircuitBreaker::default()),
                })
                .collect(),
        }
    }

    /// A manager with no providers (offline mode).
    pub fn offline() -> Self {
        Self::new(Vec::new())
    }

    /// Build the provider chain described by `config`.
    ///
    /// `auto` picks every provider whose credentials are present, in the order
    /// Gemini, Claude, Ollama (if reachable). An explicitly named provider
    /// must be constructible or an error is returned.
    pub async fn from_config(config: &AiConfig) -> anyhow::Result<Self> {
        let provider = config.provider.trim().to_lowercase();

        match provider.as_str() {
            "none" | "offline" => Ok(Self::offline()),
            "auto" => Ok(Self::new(auto_providers(config).await)),
            #[cfg(feature = "ai")]
            "gemini" | "claude" | "ollama" => Ok(Self::new(vec![named_provider(&provider, config)?])),
            #[cfg(not(feature = "ai"))]
            "gemini" | "claude" | "ollama" => Err(AIError::ProviderNotAvailable(format!(
                "{provider} (built without the `ai` feature)"
            ))
            .into()),
            _ => Err(AIError::UnknownProvider(config.provider.clone()).into()),
        }
    }

    /// Check if any AI provider is configured.
    pub fn is_available(&self) -> bool {
        !self.providers.is_empty()
    }

    /// Get the first provider name.
    pub fn active_provider(&self) -> Option<&str> {
        self.providers.first().map(|p| p.provider.name())
    }

    /// Names of all providers, in fallback order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.provider.name()).collect()
    }
}

#[async_trait]
impl TextGenerator for AIManager {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> anyhow::Result<String> {
        for managed in &self.providers {
            let name = managed.provider.name();
            let allowed = managed.breaker.lock().allow_request();
            if !allowed {
                tracing::debug!(provider = name, "Circuit open, skipping provider");
                continue;
            }

            match managed.provider.generate(prompt, temperature, max_tokens).await {
                Ok(text) => {
                    managed.breaker.lock().record_success();
                    return Ok(text);
                }
                Err(e) => {
                    managed.breaker.lock().record_failure();
                    tracing::warn!(provider = name, error = %e, "Provider failed, trying next");
                }
            }
        }

        Err(AIError::ProviderNotAvailable("No AI provider produced a response".to_string()).into())
    }

    fn name(&self) -> &str {
        self.active_provider().unwrap_or("none")
    }

    async fn is_available(&self) -> bool {
        for managed in &self.providers {
            if managed.provider.is_available().await {
                return true;
            }
        }
        false
    }
}

#[cfg(feature = "ai")]
fn named_provider(name: &str, config: &AiConfig) -> anyhow::Result<Box<dyn TextGenerator>> {
    let retry = config.retry.to_retry_config();

    let provider: Box<dyn TextGenerator> = match name {
        "gemini" => {
            let mut gemini = GeminiProvider::new()?.with_retry(retry);
            if let Some(model) = &config.model {
                gemini = gemini.with_model(model.clone());
            }
            Box::new(gemini)
        }
        "claude" => {
            let mut claude = ClaudeProvider::new()?.with_retry(retry);
            if let Some(model) = &config.model {
                claude = claude.with_model(model.clone());
            }
            Box::new(claude)
        }
        _ => {
            let mut ollama = OllamaProvider::from_config(&config.ollama).with_retry(retry);
            if let Some(model) = &config.model {
                ollama = ollama.with_model(model.clone());
            }
            Box::new(ollama)
        }
    };

    Ok(provider)
}

#[cfg(feature = "ai")]
async fn auto_providers(config: &AiConfig) -> Vec<Box<dyn TextGenerator>> {
    let mut providers = Vec::new();

    for name in ["gemini", "claude", "ollama"] {
        match named_provider(name, config) {
            Ok(provider) if provider.is_available().await => providers.push(provider),
            Ok(_) => tracing::debug!(provider = name, "Provider unreachable"),
            Err(e) => tracing::debug!(provider = name, error = %e, "Provider not configured"),
        }
    }

    providers
}

#[cfg(not(feature = "ai"))]
async fn auto_providers(_config: &AiConfig) -> Vec<Box<dyn TextGenerator>> {
    Vec::new()
}
