//! Configuration management for Repowhisper.
//!
//! Handles loading and saving configuration from TOML files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::RetryConfig;

/// Per-project config file, looked up in the working directory.
const LOCAL_CONFIG_FILE: &str = ".repowhisper.toml";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workflow engine settings
    pub workflow: WorkflowConfig,

    /// AI settings
    pub ai: AiConfig,

    /// Repository analysis settings
    pub analysis: AnalysisConfig,
}

/// Workflow engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Maximum number of step invocations per run before the run is aborted
    pub max_iterations: u32,

    /// Upper bound for a single text-generation call inside a step
    pub step_timeout_secs: u64,

    /// Directory for run checkpoints (in-memory only when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_dir: Option<PathBuf>,

    /// Resume from an existing checkpoint when one is found
    pub resume: bool,
}

/// AI integration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// AI provider (auto, gemini, claude, ollama, none)
    pub provider: String,

    /// Model override for the selected provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature passed to every generation call
    pub temperature: f32,

    /// Maximum tokens requested per generation call
    pub max_tokens: u32,

    /// Ollama-specific settings
    pub ollama: OllamaConfig,

    /// Backend retry settings
    pub retry: AiRetryConfig,
}

/// Ollama configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Ollama server URL
    pub base_url: String,

    /// Model to use
    pub model: String,
}

/// Retry settings for provider requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiRetryConfig {
    /// Retries after the first attempt
    pub max_attempts: u32,

    /// Delay before the first retry, doubled on each further retry
    pub initial_delay_ms: u64,

    /// Timeout for a single HTTP attempt
    pub attempt_timeout_secs: u64,
}

/// Repository analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Directory names skipped while walking the repository
    pub ignore_dirs: Vec<String>,

    /// Number of source files sampled for the prompts
    pub max_sample_files: usize,

    /// Characters kept from each sampled file
    pub max_sample_chars: usize,

    /// Number of file paths listed in prompts
    pub max_prompt_files: usize,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.repowhisper.toml` in current directory
    /// 2. `~/.config/repowhisper/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        match Self::effective_path() {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// The file [`Config::load`] reads: the local config when present,
    /// otherwise the global one (which may not exist yet).
    pub fn effective_path() -> Option<PathBuf> {
        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Some(local_config);
        }
        Self::global_config_path()
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("repowhisper"))
    }

    /// Path of the global config file.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("config.toml"))
    }
}

impl WorkflowConfig {
    /// Step timeout as a [`Duration`].
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

impl AiRetryConfig {
    /// Build the backoff policy used by providers.
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            attempt_timeout: Some(Duration::from_secs(self.attempt_timeout_secs)),
            ..RetryConfig::api()
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self { max_iterations: 50, step_timeout_secs: 90, checkpoint_dir: None, resume: false }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "auto".to_string(),
            model: None,
            temperature: 0.7,
            max_tokens: 1024,
            ollama: OllamaConfig::default(),
            retry: AiRetryConfig::default(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self { base_url: "http://localhost:11434".to_string(), model: "llama3.2".to_string() }
    }
}

impl Default for AiRetryConfig {
    fn default() -> Self {
        Self { max_attempts: 1, initial_delay_ms: 1000, attempt_timeout_secs: 30 }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: vec![
                ".git".to_string(),
                "__pycache__".to_string(),
                "node_modules".to_string(),
                ".env".to_string(),
                "venv".to_string(),
            ],
            max_sample_files: 5,
            max_sample_chars: 1000,
            max_prompt_files: 400,
        }
    }
}
