use std::sync::Arc;

use async_trait::async_trait;

use super::{generate_text, strip_code_fence, to_pretty_json, GenerationSettings};
use crate::ai::TextGenerator;
use crate::repo::Dependencies;
use crate::workflow::state::{RepoAnalysis, RunState, StepName};
use crate::workflow::step::{Step, StepOutcome};

/// Install commands by manifest, first match wins.
const INSTALL_COMMANDS: [(&str, &str); 4] = [
    ("package.json", "npm install"),
    ("requirements.txt", "pip install -r requirements.txt"),
    ("Cargo.toml", "cargo build"),
    ("go.mod", "go mod tidy && go build"),
];

/// Writes the README from the analysis.
pub struct DraftStep {
    generator: Arc<dyn TextGenerator>,
    settings: GenerationSettings,
}

impl DraftStep {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator, settings: GenerationSettings::default() }
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[async_trait]
impl Step for DraftStep {
    fn name(&self) -> StepName {
        StepName::Draft
    }

    async fn run(&self, state: &mut RunState) {
        state.begin_step(StepName::Draft);

        let project = state.project_name();
        let prompt = draft_prompt(state);

        let outcome = match generate_text(self.generator.as_ref(), &prompt, self.settings).await {
            Ok(reply) => match clean_document(&reply, &project) {
                Some(document) => StepOutcome::Generated(document),
                None => StepOutcome::Fallback {
                    value: fallback_readme(&project, state.analysis.as_ref(), state.dependencies.as_ref()),
                    reason: "model returned an empty document".to_string(),
                },
            },
            Err(reason) => StepOutcome::Fallback {
                value: fallback_readme(&project, state.analysis.as_ref(), state.dependencies.as_ref()),
                reason,
            },
        };

        if let Some(reason) = outcome.reason() {
            tracing::warn!(run_id = %state.run_id(), step = "draft", %reason, "Using fallback README");
        }

        let description = match &outcome {
            StepOutcome::Generated(doc) | StepOutcome::Fallback { value: doc, .. } => {
                format!("Generated README with {} characters", doc.chars().count())
            }
        };
        let description = outcome.describe(description);

        state.document = Some(outcome.into_value());
        state.record_decision(StepName::Draft, description);
    }
}

fn draft_prompt(state: &RunState) -> String {
    format!(
        r"Write a README.md for the following project.

Repository: {locator}

Repository analysis:
{analysis}

Dependencies:
{dependencies}

Repository structure:
{structure}

Sample code files:
{samples}

The README should contain:
1. The project title, taken from the repository name
2. A short description based on the analysis
3. A list of features
4. Installation instructions matching the detected dependencies
5. Usage examples based on the entry points
6. The tech stack
7. An overview of the project structure
8. Contributing guidelines
9. A license section

Use clear headers, lists and fenced code blocks for commands, in a
professional tone. Return only the Markdown content; do not wrap it in a
code block.",
        locator = state.input().locator,
        analysis = to_pretty_json(&state.analysis),
        dependencies = to_pretty_json(&state.dependencies),
        structure = to_pretty_json(&state.structure),
        samples = to_pretty_json(&state.sample_files),
    )
}

/// Trim the reply, drop a wrapping code fence and make sure it opens with a
/// heading. `None` when nothing is left.
fn clean_document(reply: &str, project: &str) -> Option<String> {
    let body = strip_code_fence(reply);
    if body.is_empty() {
        return None;
    }

    if body.starts_with('#') {
        Some(body.to_string())
    } else {
        Some(format!("# {project}\n\n{body}"))
    }
}

/// Fixed README used when the model cannot produce one.
pub fn fallback_readme(
    project: &str,
    analysis: Option<&RepoAnalysis>,
    dependencies: Option<&Dependencies>,
) -> String {
    let unknown = vec!["Unknown".to_string()];
    let languages = analysis.map(|a| &a.languages).filter(|l| !l.is_empty()).unwrap_or(&unknown);
    let project_type = analysis
        .map(|a| a.project_type.as_str())
        .filter(|t| !t.is_empty())
        .unwrap_or("Application");

    let manifest_count = dependencies.map_or(0, Dependencies::len);
    let install = INSTALL_COMMANDS
        .iter()
        .find(|(manifest, _)| dependencies.is_some_and(|d| d.contains_key(*manifest)))
        .map_or("# See project files for installation instructions", |&(_, cmd)| cmd);

    let top = |n: usize| languages.iter().take(n).cloned().collect::<Vec<_>>().join(", ");

    format!(
        r"# {project}

## Description

{project_type} written in {short_languages}.

## Installation

```bash
{install}
```

## Usage

Please refer to the source code for usage instructions.

## Tech Stack

- **Languages**: {all_languages}
- **Dependencies**: {manifest_count} dependency files found

## Contributing

Contributions are welcome! Please feel free to submit a Pull Request.

## License

Please check the project files for license information.
",
        short_languages = top(3),
        all_languages = top(5),
    )
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::ai::AIManager;
    use crate::repo::Manifest;

    struct Reply(&'static str);

    #[async_trait]
    impl TextGenerator for Reply {
        async fn generate(&self, _: &str, _: f32, _: u32) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }

        fn name(&self) -> &str {
            "reply"
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_clean_document() {
        assert_eq!(clean_document("```markdown\n# Widget\nText\n```", "widget").as_deref(), Some("# Widget\nText"));
        assert_eq!(clean_document("Just prose.", "widget").as_deref(), Some("# widget\n\nJust prose."));
        assert_eq!(clean_document("```\n\n```", "widget"), None);
        assert_eq!(clean_document("   ", "widget"), None);
    }

    #[test]
    fn test_fallback_readme_defaults() {
        let readme = fallback_readme("widget", None, None);
        assert!(readme.starts_with("# widget\n"));
        assert!(readme.contains("Application written in Unknown."));
        assert!(readme.contains("# See project files for installation instructions"));
        assert!(readme.contains("0 dependency files found"));
    }

    #[test]
    fn test_fallback_readme_uses_analysis_and_manifests() {
        let analysis = RepoAnalysis {
            project_type: "Unknown".to_string(),
            languages: vec![".rs", ".toml", ".md", ".sh", ".yml", ".json"].into_iter().map(String::from).collect(),
            ..RepoAnalysis::default()
        };
        let mut deps = Dependencies::new();
        deps.insert("go.mod".to_string(), Manifest::List(vec!["x".to_string()]));
        deps.insert("Cargo.toml".to_string(), Manifest::List(vec!["serde".to_string()]));

        let readme = fallback_readme("tool", Some(&analysis), Some(&deps));
        assert!(readme.contains("Unknown written in .rs, .toml, .md."));
        assert!(readme.contains("```bash\ncargo build\n```"));
        assert!(readme.contains("- **Languages**: .rs, .toml, .md, .sh, .yml\n"));
        assert!(readme.contains("2 dependency files found"));
    }

    #[tokio::test]
    async fn test_prose_reply_gets_heading() {
        let step = DraftStep::new(Arc::new(Reply("A tool that does things.")));
        let mut state = RunState::new("https://github.com/acme/widget.git", "/tmp/widget");
        step.run(&mut state).await;

        assert_eq!(state.document.as_deref(), Some("# widget\n\nA tool that does things."));
        assert_eq!(state.decisions[0].description, "Generated README with 34 characters");
    }

    #[tokio::test]
    async fn test_offline_draft_falls_back() {
        let step = DraftStep::new(Arc::new(AIManager::offline()));
        let mut state = RunState::new("widget", "/tmp/widget");
        step.run(&mut state).await;

        let document = state.document.as_deref().unwrap();
        assert!(document.starts_with("# widget"));
        assert_eq!(state.current_step, Some(StepName::Draft));
        assert!(state.decisions[0].description.contains("(fallback:"));
    }
}
