//! Run state threaded through every step.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::repo::{self, Dependencies, RepoStructure};

static RUN_ID_UNSAFE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("run id pattern is valid"));

/// Identifier of a run; also the checkpoint and dedup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Use `id` verbatim.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an id from a repository locator, keeping it filesystem-safe.
    pub fn from_locator(locator: &str) -> Self {
        Self(RUN_ID_UNSAFE.replace_all(locator.trim(), "_").into_owned())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-provided input of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInput {
    /// Repository locator as given by the caller (URL or path)
    pub locator: String,

    /// Local working tree the steps read from
    pub repo_path: PathBuf,
}

/// The steps a run is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepName {
    Analyze,
    Draft,
}

impl StepName {
    /// Every step, in pipeline order.
    pub const ALL: [Self; 2] = [Self::Analyze, Self::Draft];

    /// Canonical name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Draft => "draft",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A name that does not resolve to any [`StepName`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown step name: {0:?}")]
pub struct UnknownStep(pub String);

impl FromStr for StepName {
    type Err = UnknownStep;

    /// Accepts canonical names and the older agent spellings
    /// (`RepoAnalyzerAgent`, `readme_writer`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        let core = normalized.strip_suffix("agent").unwrap_or(&normalized);
        let core = core
            .strip_prefix("repo")
            .or_else(|| core.strip_prefix("readme"))
            .unwrap_or(core);

        match core {
            "analyze" | "analyzer" | "analysis" => Ok(Self::Analyze),
            "draft" | "drafter" | "writer" | "write" => Ok(Self::Draft),
            _ => Err(UnknownStep(s.to_string())),
        }
    }
}

/// Who recorded a decision.
///
/// Steps always record [`Actor::Step`]; `Unrecognized` only appears for
/// entries restored from elsewhere whose name does not parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Actor {
    Step(StepName),
    Unrecognized(String),
}

impl Actor {
    /// The step, if this actor is one.
    pub fn step(&self) -> Option<StepName> {
        match self {
            Self::Step(step) => Some(*step),
            Self::Unrecognized(_) => None,
        }
    }
}

impl From<String> for Actor {
    fn from(name: String) -> Self {
        name.parse().map_or(Self::Unrecognized(name), Self::Step)
    }
}

impl From<Actor> for String {
    fn from(actor: Actor) -> Self {
        match actor {
            Actor::Step(step) => step.as_str().to_string(),
            Actor::Unrecognized(name) => name,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step(step) => step.fmt(f),
            Self::Unrecognized(name) => f.write_str(name),
        }
    }
}

/// One entry of the append-only decision log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionEntry {
    pub actor: Actor,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

impl DecisionEntry {
    /// A decision by `step`, stamped now.
    pub fn by_step(step: StepName, description: impl Into<String>) -> Self {
        Self { actor: Actor::Step(step), description: description.into(), recorded_at: Utc::now() }
    }
}

/// Outcome of validating the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Continue,
    Redo,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Continue => "continue",
            Self::Redo => "redo",
        })
    }
}

/// The validator's latest judgement; replaced on every validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub decision: Verdict,
    pub step: Option<StepName>,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

impl ValidationRecord {
    /// A clean pass for `step`.
    pub fn passed(step: Option<StepName>) -> Self {
        Self { decision: Verdict::Continue, step, issues: Vec::new(), suggestions: Vec::new() }
    }

    /// Whether the step must be rerun.
    pub fn is_redo(&self) -> bool {
        self.decision == Verdict::Redo
    }
}

/// An output slot the validator can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredField {
    Structure,
    Dependencies,
    SampleFiles,
    Analysis,
    Document,
}

impl RequiredField {
    /// Field name as shown in validation issues.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Dependencies => "dependencies",
            Self::SampleFiles => "sample_files",
            Self::Analysis => "analysis",
            Self::Document => "document",
        }
    }

    /// Whether the slot holds a value in `state`.
    ///
    /// Written containers count even when empty; the document must hold
    /// non-whitespace text.
    pub fn is_filled(self, state: &RunState) -> bool {
        match self {
            Self::Structure => state.structure.is_some(),
            Self::Dependencies => state.dependencies.is_some(),
            Self::SampleFiles => state.sample_files.is_some(),
            Self::Analysis => state.analysis.is_some(),
            Self::Document => state.document.as_deref().is_some_and(|d| !d.trim().is_empty()),
        }
    }
}

impl fmt::Display for RequiredField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured description of a repository produced by the analyze step.
///
/// Deserialization is lenient: list fields accept a single string or mixed
/// JSON values, and unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoAnalysis {
    #[serde(deserialize_with = "lenient_string")]
    pub project_type: String,
    #[serde(deserialize_with = "lenient_list")]
    pub languages: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub frameworks: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub components: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub entry_points: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub purpose: String,
    #[serde(deserialize_with = "lenient_list")]
    pub features: Vec<String>,

    /// Unparsed model reply, kept when it was not valid JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_analysis: Option<String>,

    /// Why the model could not be used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn value_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => String::new(),
        other => value_to_string(other),
    })
}

fn lenient_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::Array(items) => items.into_iter().map(value_to_string).collect(),
        other => vec![value_to_string(other)],
    })
}

/// Everything known about a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    run_id: RunId,
    input: RunInput,

    pub structure: Option<RepoStructure>,
    pub dependencies: Option<Dependencies>,
    pub sample_files: Option<BTreeMap<String, String>>,
    pub analysis: Option<RepoAnalysis>,
    pub document: Option<String>,

    /// Append-only decision log
    pub decisions: Vec<DecisionEntry>,

    /// Human-readable run log
    pub log: Vec<String>,

    pub validation: Option<ValidationRecord>,
    pub current_step: Option<StepName>,

    /// Step invocations so far
    pub iterations: u32,
}

impl RunState {
    /// Fresh state; the run id is derived from the locator.
    pub fn new(locator: impl Into<String>, repo_path: impl Into<PathBuf>) -> Self {
        let locator = locator.into();
        Self {
            run_id: RunId::from_locator(&locator),
            input: RunInput { locator, repo_path: repo_path.into() },
            structure: None,
            dependencies: None,
            sample_files: None,
            analysis: None,
            document: None,
            decisions: Vec::new(),
            log: Vec::new(),
            validation: None,
            current_step: None,
            iterations: 0,
        }
    }

    /// Replace the derived run id.
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn input(&self) -> &RunInput {
        &self.input
    }

    /// Point a restored state at the working tree acquired for this attempt.
    pub(crate) fn rebind_repo_path(&mut self, repo_path: PathBuf) {
        self.input.repo_path = repo_path;
    }

    /// Project name derived from the locator.
    pub fn project_name(&self) -> String {
        repo::project_name(&self.input.locator)
    }

    /// Mark `step` as the one executing.
    pub fn begin_step(&mut self, step: StepName) {
        self.current_step = Some(step);
    }

    /// Append a decision by `step` and mirror it into the run log.
    pub fn record_decision(&mut self, step: StepName, description: impl Into<String>) {
        let entry = DecisionEntry::by_step(step, description);
        self.log.push(format!("{}: {}", entry.actor, entry.description));
        self.decisions.push(entry);
    }

    /// Clear the slots owned by `step` before it is rerun.
    pub fn reset_outputs(&mut self, step: StepName) {
        match step {
            StepName::Analyze => {
                self.structure = None;
                self.dependencies = None;
                self.sample_files = None;
                self.analysis = None;
            }
            StepName::Draft => self.document = None,
        }
    }

    /// Most recent step found in the decision log.
    pub fn last_step(&self) -> Option<StepName> {
        self.decisions.iter().rev().find_map(|d| d.actor.step())
    }
}
