//! The built-in README pipeline steps.

mod analyze;
mod draft;

use std::time::Duration;

pub use analyze::AnalyzeStep;
pub use draft::{fallback_readme, DraftStep};

use crate::ai::TextGenerator;
use crate::core::Config;

/// Sampling parameters and the time budget for one generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self { temperature: 0.7, max_tokens: 1024, timeout: Duration::from_secs(90) }
    }
}

impl GenerationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            temperature: config.ai.temperature,
            max_tokens: config.ai.max_tokens,
            timeout: config.workflow.step_timeout(),
        }
    }
}

/// Call the generator under the step timeout; the error is the fallback reason.
async fn generate_text(
    generator: &dyn TextGenerator,
    prompt: &str,
    settings: GenerationSettings,
) -> Result<String, String> {
    let call = generator.generate(prompt, settings.temperature, settings.max_tokens);
    match tokio::time::timeout(settings.timeout, call).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("generation timed out after {}s", settings.timeout.as_secs())),
    }
}

/// Remove a surrounding Markdown code fence (```` ```lang ```` ... ```` ``` ````).
fn strip_code_fence(text: &str) -> &str {
    let mut text = text.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // drop the language tag on the opening line, if any
        let tag_end = rest.find(|c: char| c.is_whitespace()).unwrap_or(rest.len());
        let tag = &rest[..tag_end];
        text = if tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            rest[tag_end..].trim_start()
        } else {
            rest.trim_start()
        };
    }

    text.strip_suffix("```").unwrap_or(text).trim()
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}
