//! Transition function between steps.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::state::{DecisionEntry, StepName, ValidationRecord, Verdict};

/// What the orchestrator does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "action", content = "step", rename_all = "snake_case")]
pub enum NextAction {
    RunStep(StepName),
    Terminate,
}

impl fmt::Display for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunStep(step) => write!(f, "run {step}"),
            Self::Terminate => f.write_str("terminate"),
        }
    }
}

/// Pick the next action from the decision log and the latest validation.
///
/// The last step is the most recent entry with a recognized actor. A missing
/// validation counts as `continue`. A redo reruns the step that was judged.
pub fn route(decisions: &[DecisionEntry], validation: Option<&ValidationRecord>) -> NextAction {
    let last_step = decisions.iter().rev().find_map(|d| d.actor.step());
    let verdict = validation.map_or(Verdict::Continue, |v| v.decision);

    match (verdict, last_step) {
        (Verdict::Continue, None | Some(StepName::Analyze)) => NextAction::RunStep(StepName::Draft),
        (Verdict::Continue, Some(StepName::Draft)) => NextAction::Terminate,
        (Verdict::Redo, Some(step)) => NextAction::RunStep(step),
        (Verdict::Redo, None) => {
            tracing::warn!("Redo requested with no recognized step in the decision log, restarting analysis");
            NextAction::RunStep(StepName::Analyze)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::workflow::state::Actor;

    fn by(step: StepName) -> DecisionEntry {
        DecisionEntry::by_step(step, "done")
    }

    fn foreign(name: &str) -> DecisionEntry {
        DecisionEntry {
            actor: Actor::Unrecognized(name.to_string()),
            description: "validated".to_string(),
            recorded_at: Utc::now(),
        }
    }

    fn verdict(decision: Verdict) -> ValidationRecord {
        ValidationRecord { decision, step: None, issues: Vec::new(), suggestions: Vec::new() }
    }

    #[test]
    fn test_empty_log_continue_drafts() {
        assert_eq!(route(&[], Some(&verdict(Verdict::Continue))), NextAction::RunStep(StepName::Draft));
        assert_eq!(route(&[], None), NextAction::RunStep(StepName::Draft));
    }

    #[test]
    fn test_continue_transitions() {
        let analyzed = [by(StepName::Analyze)];
        let drafted = [by(StepName::Analyze), by(StepName::Draft)];

        assert_eq!(route(&analyzed, Some(&verdict(Verdict::Continue))), NextAction::RunStep(StepName::Draft));
        assert_eq!(route(&drafted, Some(&verdict(Verdict::Continue))), NextAction::Terminate);
    }

    #[test]
    fn test_redo_reruns_last_step() {
        let drafted = [by(StepName::Analyze), by(StepName::Draft)];
        assert_eq!(route(&drafted, Some(&verdict(Verdict::Redo))), NextAction::RunStep(StepName::Draft));

        let analyzed = [by(StepName::Analyze)];
        assert_eq!(route(&analyzed, Some(&verdict(Verdict::Redo))), NextAction::RunStep(StepName::Analyze));
    }

    #[test]
    fn test_unrecognized_actors_are_skipped() {
        let log = [by(StepName::Draft), foreign("SupervisorAgent")];
        assert_eq!(route(&log, Some(&verdict(Verdict::Continue))), NextAction::Terminate);

        let only_foreign = [foreign("SupervisorAgent")];
        assert_eq!(route(&only_foreign, Some(&verdict(Verdict::Redo))), NextAction::RunStep(StepName::Analyze));
    }

    #[test]
    fn test_route_is_total() {
        let logs: [Vec<DecisionEntry>; 4] = [
            vec![],
            vec![by(StepName::Analyze)],
            vec![by(StepName::Draft)],
            vec![foreign("x")],
        ];
        let validations = [None, Some(verdict(Verdict::Continue)), Some(verdict(Verdict::Redo))];

        for log in &logs {
            for validation in &validations {
                let first = route(log, validation.as_ref());
                assert_eq!(first, route(log, validation.as_ref()));
            }
        }
    }

    #[test]
    fn test_next_action_serialization() {
        let json = serde_json::to_string(&NextAction::RunStep(StepName::Draft)).unwrap();
        assert_eq!(json, r#"{"action":"run_step","step":"draft"}"#);
        let back: NextAction = serde_json::from_str(r#"{"action":"terminate"}"#).unwrap();
        assert_eq!(back, NextAction::Terminate);
    }
}
