//! Drives a run through its steps.
//!
//! Each cycle invokes the routed step, validates its output, routes, and
//! stores a checkpoint. A run ends when the router terminates it, when the
//! iteration ceiling is reached, or when it is cancelled.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
use super::error::WorkflowError;
use super::router::{route, NextAction};
use super::state::{RunId, RunState, StepName};
use super::step::{Step, StepRegistry};
use super::validator::Validator;

/// Default iteration ceiling.
pub const DEFAULT_MAX_ITERATIONS: u32 = 50;

/// Per-run overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Step invocation ceiling for this run
    pub max_iterations: Option<u32>,

    /// Continue from a stored checkpoint when there is one
    pub resume: bool,
}

type ActiveRuns = Mutex<HashMap<RunId, watch::Sender<bool>>>;

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    registry: StepRegistry,
    validator: Validator,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    max_iterations: u32,
}

impl OrchestratorBuilder {
    /// Register a step under its own name.
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.registry.register(Arc::new(step));
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Where checkpoints go; in memory when unset.
    pub fn checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Fails if any step has no implementation.
    pub fn build(self) -> Result<Orchestrator, WorkflowError> {
        if let Some(&missing) = self.registry.missing().first() {
            return Err(WorkflowError::MissingStep(missing));
        }

        Ok(Orchestrator {
            registry: self.registry,
            validator: self.validator,
            checkpoints: self.checkpoints.unwrap_or_else(|| Arc::new(MemoryCheckpointStore::new())),
            max_iterations: self.max_iterations,
            active: Mutex::new(HashMap::new()),
        })
    }
}

/// Runs the analyze/draft cycle for any number of concurrent runs.
pub struct Orchestrator {
    registry: StepRegistry,
    validator: Validator,
    checkpoints: Arc<dyn CheckpointStore>,
    max_iterations: u32,
    active: ActiveRuns,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("max_iterations", &self.max_iterations)
            .field("active", &self.active.lock().len())
            .finish()
    }
}

/// Removes a run from the in-flight registry when dropped.
struct ActiveRun<'a> {
    active: &'a ActiveRuns,
    run_id: RunId,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.active.lock().remove(&self.run_id);
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder {
            registry: StepRegistry::new(),
            validator: Validator::default(),
            checkpoints: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    /// Whether a run with this id is in flight.
    pub fn is_running(&self, run_id: &RunId) -> bool {
        self.active.lock().contains_key(run_id)
    }

    /// Ask an in-flight run to stop. Returns `false` if no such run exists.
    pub fn cancel(&self, run_id: &RunId) -> bool {
        match self.active.lock().get(run_id) {
            Some(flag) => {
                flag.send_replace(true);
                tracing::info!(%run_id, "Cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Run with the default options.
    pub async fn run_workflow(&self, initial: RunState) -> Result<RunState, WorkflowError> {
        self.run_with(initial, RunOptions::default()).await
    }

    /// Run until the router terminates, the ceiling is hit, or the run is cancelled.
    pub async fn run_with(
        &self,
        initial: RunState,
        options: RunOptions,
    ) -> Result<RunState, WorkflowError> {
        let run_id = initial.run_id().clone();
        let ceiling = options.max_iterations.unwrap_or(self.max_iterations);
        let (_guard, mut cancel) = self.register(&run_id)?;

        let stored = if options.resume { self.checkpoints.load(&run_id)? } else { None };
        let (mut state, mut next) = match stored {
            Some(checkpoint) if checkpoint.state.input().locator == initial.input().locator => {
                tracing::info!(
                    %run_id,
                    iteration = checkpoint.state.iterations,
                    next = %checkpoint.next,
                    "Resuming from checkpoint"
                );
                let mut state = checkpoint.state;
                state.rebind_repo_path(initial.input().repo_path.clone());
                (state, checkpoint.next)
            }
            Some(checkpoint) => {
                tracing::warn!(
                    %run_id,
                    stored = %checkpoint.state.input().locator,
                    requested = %initial.input().locator,
                    "Checkpoint belongs to another locator, starting fresh"
                );
                (initial, NextAction::RunStep(StepName::Analyze))
            }
            None => (initial, NextAction::RunStep(StepName::Analyze)),
        };

        loop {
            let step_name = match next {
                NextAction::Terminate => {
                    self.discard_checkpoint(&run_id);
                    tracing::info!(%run_id, iterations = state.iterations, "Run finished");
                    return Ok(state);
                }
                NextAction::RunStep(step_name) => step_name,
            };

            if state.iterations >= ceiling {
                self.discard_checkpoint(&run_id);
                tracing::warn!(%run_id, iterations = state.iterations, ceiling, "Iteration ceiling reached");
                return Err(WorkflowError::Aborted {
                    iterations: state.iterations,
                    ceiling,
                    run_id,
                    state: Box::new(state),
                });
            }

            let redoing = state
                .validation
                .as_ref()
                .is_some_and(|v| v.is_redo() && v.step == Some(step_name));
            if redoing {
                state.reset_outputs(step_name);
            }

            let step = self.registry.get(step_name).ok_or(WorkflowError::MissingStep(step_name))?;
            tracing::debug!(%run_id, step = %step_name, iteration = state.iterations + 1, redoing, "Running step");

            let cancelled = tokio::select! {
                biased;
                () = cancelled(&mut cancel) => true,
                () = step.run(&mut state) => false,
            };
            if cancelled {
                tracing::info!(%run_id, step = %step_name, "Run cancelled");
                return Err(WorkflowError::Cancelled { run_id, state: Box::new(state) });
            }

            state.iterations += 1;
            let verdict = self.validator.apply(&mut state);
            state.log.push(format!("validator: Validated {step_name}: {verdict}"));

            next = route(&state.decisions, state.validation.as_ref());
            state.current_step = None;
            tracing::debug!(%run_id, step = %step_name, %verdict, %next, "Routed");

            if let Err(e) = self.checkpoints.save(&Checkpoint::new(state.clone(), next)) {
                tracing::warn!(%run_id, error = %e, "Failed to save checkpoint");
            }
        }
    }

    fn register(&self, run_id: &RunId) -> Result<(ActiveRun<'_>, watch::Receiver<bool>), WorkflowError> {
        let mut active = self.active.lock();
        if active.contains_key(run_id) {
            return Err(WorkflowError::AlreadyRunning(run_id.clone()));
        }

        let (tx, rx) = watch::channel(false);
        active.insert(run_id.clone(), tx);
        Ok((ActiveRun { active: &self.active, run_id: run_id.clone() }, rx))
    }

    fn discard_checkpoint(&self, run_id: &RunId) {
        if let Err(e) = self.checkpoints.remove(run_id) {
            tracing::warn!(%run_id, error = %e, "Failed to remove checkpoint");
        }
    }
}

/// Resolves once the cancel flag is set.
async fn cancelled(flag: &mut watch::Receiver<bool>) {
    loop {
        let set = *flag.borrow_and_update();
        if set {
            return;
        }
        if flag.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
