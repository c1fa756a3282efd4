//! High-level README generation.
//!
//! Wraps the orchestrator with repository acquisition and release so callers
//! only deal with a locator and a report.

use std::sync::Arc;

use serde::Serialize;

use crate::ai::TextGenerator;
use crate::core::Config;
use crate::repo::{RepoError, RepoMaterializer};
use crate::workflow::{
    AnalyzeStep, CheckpointStore, DecisionEntry, DraftStep, FileCheckpointStore, GenerationSettings,
    MemoryCheckpointStore, Orchestrator, RunId, RunOptions, RunState, WorkflowError,
};

/// Errors from [`ReadmeService::generate`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Repository task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Options for a single generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Explicit run id; derived from the locator when unset
    pub run_id: Option<RunId>,

    /// Ceiling override for this run
    pub max_iterations: Option<u32>,

    /// Continue from a stored checkpoint
    pub resume: bool,
}

/// Result of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub readme: String,
    pub log: Vec<String>,
    pub decisions: Vec<DecisionEntry>,
    pub run_id: RunId,
    pub iterations: u32,
}

impl From<RunState> for RunReport {
    fn from(state: RunState) -> Self {
        Self {
            readme: state.document.clone().unwrap_or_default(),
            run_id: state.run_id().clone(),
            iterations: state.iterations,
            log: state.log,
            decisions: state.decisions,
        }
    }
}

/// Build the standard orchestrator from configuration.
pub fn build_orchestrator(
    config: &Config,
    generator: Arc<dyn TextGenerator>,
) -> Result<Orchestrator, WorkflowError> {
    let settings = GenerationSettings::from_config(config);
    let checkpoints: Arc<dyn CheckpointStore> = match &config.workflow.checkpoint_dir {
        Some(dir) => Arc::new(FileCheckpointStore::new(dir)),
        None => Arc::new(MemoryCheckpointStore::new()),
    };

    Orchestrator::builder()
        .step(
            AnalyzeStep::new(generator.clone())
                .with_settings(settings)
                .with_analysis_config(config.analysis.clone()),
        )
        .step(DraftStep::new(generator).with_settings(settings))
        .checkpoints(checkpoints)
        .max_iterations(config.workflow.max_iterations)
        .build()
}

/// Acquires a repository, runs the workflow over it and releases it again.
pub struct ReadmeService {
    orchestrator: Arc<Orchestrator>,
    materializer: Arc<dyn RepoMaterializer>,
}

impl ReadmeService {
    pub fn new(orchestrator: Arc<Orchestrator>, materializer: Arc<dyn RepoMaterializer>) -> Self {
        Self { orchestrator, materializer }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Cancel an in-flight run.
    pub fn cancel(&self, run_id: &RunId) -> bool {
        self.orchestrator.cancel(run_id)
    }

    /// Generate a README for `locator`.
    ///
    /// The repository is released whether or not the run succeeds; a failed
    /// release is logged and does not change the outcome.
    pub async fn generate(
        &self,
        locator: &str,
        options: GenerateOptions,
    ) -> Result<RunReport, ServiceError> {
        let materializer = self.materializer.clone();
        let owned_locator = locator.to_string();
        let repo = tokio::task::spawn_blocking(move || materializer.acquire(&owned_locator)).await??;
        tracing::debug!(locator, path = %repo.path.display(), owned = repo.owned, "Repository ready");

        let run_id = options.run_id.unwrap_or_else(|| RunId::from_locator(locator));
        let initial = RunState::new(locator, &repo.path).with_run_id(run_id);
        let run_options = RunOptions { max_iterations: options.max_iterations, resume: options.resume };

        let result = self.orchestrator.run_with(initial, run_options).await;

        let materializer = self.materializer.clone();
        match tokio::task::spawn_blocking(move || materializer.release(&repo)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(locator, error = %e, "Failed to release repository"),
            Err(e) => tracing::warn!(locator, error = %e, "Release task failed"),
        }

        Ok(RunReport::from(result?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AIManager;
    use crate::repo::LocalMaterializer;

    fn offline_service(config: &Config) -> ReadmeService {
        let orchestrator = build_orchestrator(config, Arc::new(AIManager::offline())).unwrap();
        ReadmeService::new(Arc::new(orchestrator), Arc::new(LocalMaterializer))
    }

    #[tokio::test]
    async fn test_offline_generation_produces_fallback_readme() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), r#"{"dependencies": {"express": "^4"}}"#).unwrap();
        std::fs::write(dir.path().join("index.js"), "console.log('hi')").unwrap();

        let service = offline_service(&Config::default());
        let locator = dir.path().to_string_lossy().to_string();
        let report = service.generate(&locator, GenerateOptions::default()).await.unwrap();

        assert_eq!(report.iterations, 2);
        assert_eq!(report.decisions.len(), 2);
        assert!(report.readme.contains("npm install"));
        assert_eq!(report.run_id, RunId::from_locator(&locator));
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_materialization_error_propagates() {
        let service = offline_service(&Config::default());
        let err = service.generate("/definitely/not/here", GenerateOptions::default()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Repo(RepoError::NotADirectory(_))));
    }

    #[test]
    fn test_report_serialization_keys() {
        let mut state = RunState::new("widget", "/tmp/widget");
        state.document = Some("# widget".to_string());
        let json = serde_json::to_value(RunReport::from(state)).unwrap();

        for key in ["readme", "log", "decisions", "run_id", "iterations"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
