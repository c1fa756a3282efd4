//! Step abstraction and registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::state::{RunState, StepName};

/// A unit of work in a run.
///
/// A step marks itself current with [`RunState::begin_step`], fills only the
/// slots it owns and records exactly one decision. It never fails: degraded
/// output is still output.
#[async_trait]
pub trait Step: Send + Sync {
    /// Which step this is.
    fn name(&self) -> StepName;

    /// Execute against the run state.
    async fn run(&self, state: &mut RunState);
}

/// Result of a step's external call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome<T> {
    Generated(T),
    Fallback { value: T, reason: String },
}

impl<T> StepOutcome<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    /// Fallback reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Generated(_) => None,
            Self::Fallback { reason, .. } => Some(reason),
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Generated(value) | Self::Fallback { value, .. } => value,
        }
    }

    /// Append `(fallback: reason)` to a decision description when degraded.
    pub fn describe(&self, description: String) -> String {
        match self.reason() {
            Some(reason) => format!("{description} (fallback: {reason})"),
            None => description,
        }
    }
}

/// Steps keyed by name.
#[derive(Clone, Default)]
pub struct StepRegistry {
    steps: HashMap<StepName, Arc<dyn Step>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step under its own name, replacing any previous one.
    pub fn register(&mut self, step: Arc<dyn Step>) {
        self.steps.insert(step.name(), step);
    }

    pub fn get(&self, name: StepName) -> Option<Arc<dyn Step>> {
        self.steps.get(&name).cloned()
    }

    /// Step names with nothing registered.
    pub fn missing(&self) -> Vec<StepName> {
        StepName::ALL.into_iter().filter(|name| !self.steps.contains_key(name)).collect()
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.steps.keys().collect();
        names.sort();
        f.debug_struct("StepRegistry").field("steps", &names).finish()
    }
}
