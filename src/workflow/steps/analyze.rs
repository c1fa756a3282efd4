use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::{generate_text, strip_code_fence, to_pretty_json, GenerationSettings};
use crate::ai::TextGenerator;
use crate::core::AnalysisConfig;
use crate::repo::{self, Dependencies, RepoStructure, SampleOptions};
use crate::workflow::state::{RepoAnalysis, RunState, StepName};
use crate::workflow::step::{Step, StepOutcome};

/// Extracts the repository facts and asks the model for a structured analysis.
pub struct AnalyzeStep {
    generator: Arc<dyn TextGenerator>,
    settings: GenerationSettings,
    analysis: AnalysisConfig,
}

impl AnalyzeStep {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator, settings: GenerationSettings::default(), analysis: AnalysisConfig::default() }
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_analysis_config(mut self, analysis: AnalysisConfig) -> Self {
        self.analysis = analysis;
        self
    }

    fn sample_options(&self) -> SampleOptions {
        SampleOptions {
            max_files: self.analysis.max_sample_files,
            max_chars: self.analysis.max_sample_chars,
        }
    }
}

#[async_trait]
impl Step for AnalyzeStep {
    fn name(&self) -> StepName {
        StepName::Analyze
    }

    async fn run(&self, state: &mut RunState) {
        state.begin_step(StepName::Analyze);

        let root = state.input().repo_path.clone();
        let ignore = self.analysis.ignore_dirs.clone();
        let options = self.sample_options();
        let facts = match tokio::task::spawn_blocking(move || Facts::extract(&root, &ignore, options)).await {
            Ok(facts) => facts,
            Err(e) => {
                tracing::warn!(run_id = %state.run_id(), error = %e, "Repository extraction task failed");
                Facts::default()
            }
        };
        tracing::debug!(
            run_id = %state.run_id(),
            files = facts.structure.files.len(),
            manifests = facts.dependencies.len(),
            samples = facts.samples.len(),
            "Extracted repository facts"
        );

        let prompt = analysis_prompt(
            &state.input().locator,
            &facts.structure.truncated(self.analysis.max_prompt_files),
            &facts.dependencies,
            &facts.samples,
        );

        let outcome = match generate_text(self.generator.as_ref(), &prompt, self.settings).await {
            Ok(reply) => parse_analysis(&reply),
            Err(reason) => StepOutcome::Fallback { value: unavailable_analysis(&facts, &reason), reason },
        };

        if let Some(reason) = outcome.reason() {
            tracing::warn!(run_id = %state.run_id(), step = "analyze", %reason, "Using fallback analysis");
        }

        let description =
            outcome.describe(format!("Analyzed repository with {} sample files", facts.samples.len()));

        state.structure = Some(facts.structure);
        state.dependencies = Some(facts.dependencies);
        state.sample_files = Some(facts.samples);
        state.analysis = Some(outcome.into_value());
        state.record_decision(StepName::Analyze, description);
    }
}

/// Everything read from the working tree, gathered in one blocking pass.
#[derive(Debug, Default)]
struct Facts {
    structure: RepoStructure,
    dependencies: Dependencies,
    samples: BTreeMap<String, String>,
    extensions: BTreeMap<String, usize>,
}

impl Facts {
    fn extract(root: &Path, ignore: &[String], options: SampleOptions) -> Self {
        Self {
            structure: repo::build_structure(root, ignore),
            dependencies: repo::find_dependencies(root),
            samples: repo::sample_files(root, ignore, options),
            extensions: repo::file_extensions(root, ignore),
        }
    }
}

fn analysis_prompt(
    locator: &str,
    structure: &RepoStructure,
    dependencies: &Dependencies,
    samples: &BTreeMap<String, String>,
) -> String {
    format!(
        r"Analyze the following repository.

Repository: {locator}

Repository structure:
{structure}

Dependencies found:
{dependencies}

Sample code files:
{samples}

Describe the project type and main languages, the key frameworks and
libraries, the main components, the entry points and important files, and
what the project is for.

Respond with a single JSON object with these keys:
- project_type: kind of project (web app, library, CLI, ...)
- languages: list of programming languages
- frameworks: list of frameworks and libraries
- components: list of main components
- entry_points: list of key entry points
- purpose: one-sentence description of the project
- features: list of key features",
        structure = to_pretty_json(structure),
        dependencies = to_pretty_json(dependencies),
        samples = to_pretty_json(samples),
    )
}

/// Parse the model reply; a reply that is not a JSON object is kept raw.
fn parse_analysis(reply: &str) -> StepOutcome<RepoAnalysis> {
    match serde_json::from_str::<RepoAnalysis>(strip_code_fence(reply)) {
        Ok(analysis) => StepOutcome::Generated(analysis),
        Err(e) => StepOutcome::Fallback {
            value: RepoAnalysis {
                project_type: "Unknown".to_string(),
                languages: vec!["Multiple".to_string()],
                frameworks: vec!["Various".to_string()],
                components: vec!["Main application".to_string()],
                entry_points: vec!["Main files".to_string()],
                purpose: "Code repository analysis".to_string(),
                features: vec!["Core functionality".to_string()],
                raw_analysis: Some(reply.to_string()),
                error: None,
            },
            reason: format!("reply was not valid JSON: {e}"),
        },
    }
}

/// Analysis built from the extracted facts alone.
fn unavailable_analysis(facts: &Facts, reason: &str) -> RepoAnalysis {
    RepoAnalysis {
        project_type: "Unknown".to_string(),
        languages: repo::dominant_extensions(&facts.extensions).into_iter().take(3).collect(),
        frameworks: facts.dependencies.keys().cloned().collect(),
        components: vec!["Main application".to_string()],
        entry_points: vec!["Source files".to_string()],
        purpose: "Code repository".to_string(),
        features: vec!["Core functionality".to_string()],
        raw_analysis: None,
        error: Some(reason.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use futures::FutureExt;

    use super::*;
    use crate::ai::AIManager;

    #[test]
    fn test_parse_fenced_json() {
        let outcome = parse_analysis(
            "```json\n{\"project_type\": \"library\", \"languages\": [\"Rust\"], \"purpose\": \"Parsing\"}\n```",
        );

        match outcome {
            StepOutcome::Generated(analysis) => {
                assert_eq!(analysis.project_type, "library");
                assert_eq!(analysis.languages, vec!["Rust"]);
            }
            StepOutcome::Fallback { reason, .. } => panic!("unexpected fallback: {reason}"),
        }
    }

    #[test]
    fn test_prose_reply_is_kept_raw() {
        let outcome = parse_analysis("This looks like a web app.");
        assert!(outcome.is_fallback());

        let analysis = outcome.into_value();
        assert_eq!(analysis.project_type, "Unknown");
        assert_eq!(analysis.languages, vec!["Multiple"]);
        assert_eq!(analysis.raw_analysis.as_deref(), Some("This looks like a web app."));
    }

    #[tokio::test]
    async fn test_offline_run_fills_all_slots() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.py"), "print('hi')").unwrap();
        fs::write(dir.path().join("util.py"), "x = 1").unwrap();
        fs::write(dir.path().join("requirements.txt"), "flask\n").unwrap();

        let step = AnalyzeStep::new(Arc::new(AIManager::offline()));
        let mut state = RunState::new("demo", dir.path());
        step.run(&mut state).await;

        assert_eq!(state.current_step, Some(StepName::Analyze));
        assert!(state.structure.is_some());
        assert_eq!(state.sample_files.as_ref().map(BTreeMap::len), Some(2));

        let analysis = state.analysis.as_ref().unwrap();
        assert_eq!(analysis.languages, vec![".py", ".txt"]);
        assert_eq!(analysis.frameworks, vec!["requirements.txt"]);
        assert!(analysis.error.is_some());

        assert_eq!(state.decisions.len(), 1);
        assert!(state.decisions[0].description.starts_with("Analyzed repository with 2 sample files (fallback:"));
    }

    #[tokio::test]
    async fn test_extraction_yields_to_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..400 {
            let sub = dir.path().join(format!("pkg_{}", i % 20));
            fs::create_dir_all(&sub).unwrap();
            fs::write(sub.join(format!("mod_{i}.py")), "x = 1\n").unwrap();
        }

        let step = AnalyzeStep::new(Arc::new(AIManager::offline()));

        // the walk runs on the blocking pool, so the first poll cannot finish the step
        let mut first = RunState::new("big", dir.path());
        assert!(step.run(&mut first).now_or_never().is_none());
        assert!(first.structure.is_none());

        let mut state = RunState::new("big", dir.path());
        step.run(&mut state).await;
        assert_eq!(state.structure.as_ref().map(|s| s.files.len()), Some(400));
        assert_eq!(state.analysis.as_ref().unwrap().languages, vec![".py"]);
    }

    #[tokio::test]
    async fn test_missing_tree_still_fills_slots() {
        let step = AnalyzeStep::new(Arc::new(AIManager::offline()));
        let mut state = RunState::new("gone", "/definitely/not/a/checkout");
        step.run(&mut state).await;

        assert_eq!(state.structure, Some(RepoStructure::default()));
        assert_eq!(state.dependencies, Some(Dependencies::new()));
        assert!(state.analysis.as_ref().unwrap().languages.is_empty());
    }
}
