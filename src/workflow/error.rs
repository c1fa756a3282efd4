//! Workflow error types.

use super::checkpoint::CheckpointError;
use super::state::{RunId, RunState, StepName};

/// Ways a run can end without a document.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Run {run_id} aborted after {iterations} step invocations (limit {ceiling})")]
    Aborted { run_id: RunId, iterations: u32, ceiling: u32, state: Box<RunState> },

    #[error("Run {run_id} was cancelled")]
    Cancelled { run_id: RunId, state: Box<RunState> },

    #[error("Run {0} is already in progress")]
    AlreadyRunning(RunId),

    #[error("No step registered for '{0}'")]
    MissingStep(StepName),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl WorkflowError {
    /// State at the point the run stopped, when the error carries one.
    pub fn state(&self) -> Option<&RunState> {
        match self {
            Self::Aborted { state, .. } | Self::Cancelled { state, .. } => Some(state),
            _ => None,
        }
    }

    pub fn into_state(self) -> Option<RunState> {
        match self {
            Self::Aborted { state, .. } | Self::Cancelled { state, .. } => Some(*state),
            _ => None,
        }
    }
}
