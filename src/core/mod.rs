//! Core types shared across the crate: configuration and backend resilience.

mod config;
mod retry;

pub use config::{AiConfig, AiRetryConfig, AnalysisConfig, Config, OllamaConfig, WorkflowConfig};
pub use retry::{retry_async, CircuitBreaker, CircuitState, RetryConfig, RetryResult};
