//! Output checks run after every step.

use std::collections::HashMap;

use super::state::{RequiredField, RunState, StepName, ValidationRecord, Verdict};

/// Checks that the current step filled its required slots.
#[derive(Debug, Clone)]
pub struct Validator {
    rules: HashMap<StepName, Vec<RequiredField>>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::empty()
            .require(
                StepName::Analyze,
                [RequiredField::Structure, RequiredField::Dependencies, RequiredField::Analysis],
            )
            .require(StepName::Draft, [RequiredField::Document])
    }
}

impl Validator {
    /// A validator with no rules; every step passes.
    pub fn empty() -> Self {
        Self { rules: HashMap::new() }
    }

    /// Set the fields `step` must fill, replacing earlier rules for it.
    pub fn require(mut self, step: StepName, fields: impl IntoIterator<Item = RequiredField>) -> Self {
        self.rules.insert(step, fields.into_iter().collect());
        self
    }

    /// Judge the current step without touching the state.
    pub fn validate(&self, state: &RunState) -> ValidationRecord {
        let Some(step) = state.current_step else {
            return ValidationRecord::passed(None);
        };

        let missing: Vec<RequiredField> = self
            .rules
            .get(&step)
            .map(|fields| fields.iter().copied().filter(|f| !f.is_filled(state)).collect())
            .unwrap_or_default();

        if missing.is_empty() {
            return ValidationRecord::passed(Some(step));
        }

        let names: Vec<&str> = missing.iter().map(|f| f.as_str()).collect();
        ValidationRecord {
            decision: Verdict::Redo,
            step: Some(step),
            issues: missing.iter().map(|f| format!("missing required output: {f}")).collect(),
            suggestions: vec![format!("rerun {step} so that it produces: {}", names.join(", "))],
        }
    }

    /// Validate and store the record on the state.
    pub fn apply(&self, state: &mut RunState) -> Verdict {
        let record = self.validate(state);
        let verdict = record.decision;
        state.validation = Some(record);
        verdict
    }
}
