//! README workflow engine.
//!
//! A run moves a [`RunState`] through two steps, `analyze` then `draft`.
//! After every step the [`Validator`] checks the step's outputs and [`route`]
//! picks the next action:
//!
//! ```text
//! analyze --continue--> draft --continue--> done
//!    ^ |                 ^ |
//!    +-+ redo            +-+ redo
//! ```
//!
//! The [`Orchestrator`] bounds the number of step invocations, checkpoints
//! the state after every cycle and supports cancellation and resume by run id.

mod checkpoint;
mod error;
mod orchestrator;
mod router;
mod state;
mod step;
mod steps;
mod validator;

pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore,
};
pub use error::WorkflowError;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, RunOptions, DEFAULT_MAX_ITERATIONS};
pub use router::{route, NextAction};
pub use state::{
    Actor, DecisionEntry, RepoAnalysis, RequiredField, RunId, RunInput, RunState, StepName,
    UnknownStep, ValidationRecord, Verdict,
};
pub use step::{Step, StepOutcome, StepRegistry};
pub use steps::{fallback_readme, AnalyzeStep, DraftStep, GenerationSettings};
pub use validator::Validator;
