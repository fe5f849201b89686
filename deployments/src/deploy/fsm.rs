//! Finite State Machine for deployment progress

use github_models::{CheckConclusion, DeploymentStatusState};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::deploy::plan::{DeploymentPlan, Recorded};

/// Deployment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    /// Deployment resource exists, no status posted yet
    Created,

    /// Waiting for the first stage
    Queued,

    /// At least one stage started or finished
    InProgress,

    /// Every stage completed
    Success,

    /// A stage failed
    Failure,

    /// A stage errored
    Error,

    /// Superseded by a later deployment
    Inactive,
}

impl DeploymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentState::Success
                | DeploymentState::Failure
                | DeploymentState::Error
                | DeploymentState::Inactive
        )
    }

    /// State implied by the newest deployment status
    pub fn from_latest_status(latest: Option<DeploymentStatusState>) -> Self {
        match latest {
            None => DeploymentState::Created,
            Some(DeploymentStatusState::Queued) | Some(DeploymentStatusState::Pending) => {
                DeploymentState::Queued
            }
            Some(DeploymentStatusState::InProgress) => DeploymentState::InProgress,
            Some(DeploymentStatusState::Success) => DeploymentState::Success,
            Some(DeploymentStatusState::Failure) => DeploymentState::Failure,
            Some(DeploymentStatusState::Error) => DeploymentState::Error,
            Some(DeploymentStatusState::Inactive) => DeploymentState::Inactive,
        }
    }
}

/// Deployment event
#[derive(Debug, Clone, PartialEq)]
pub enum DeploymentEvent {
    /// Deployment resource was created
    Queue,

    /// A stage started running
    StageStarted { stage: String },

    /// A stage finished successfully
    StageCompleted {
        stage: String,
        artifact: Option<serde_json::Value>,
    },

    /// A stage failed
    StageFailed {
        stage: String,
        reason: Option<String>,
    },

    /// A stage could not run
    StageErrored {
        stage: String,
        reason: Option<String>,
    },
}

impl DeploymentEvent {
    fn stage(&self) -> Option<&str> {
        match self {
            DeploymentEvent::Queue => None,
            DeploymentEvent::StageStarted { stage }
            | DeploymentEvent::StageCompleted { stage, .. }
            | DeploymentEvent::StageFailed { stage, .. }
            | DeploymentEvent::StageErrored { stage, .. } => Some(stage),
        }
    }
}

/// Check run update requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum CheckRunUpdate {
    Queued,
    InProgress,
    Completed {
        conclusion: CheckConclusion,
        summary: String,
    },
}

/// Remote effect of a transition, applied in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Persist the plan's progress
    SavePlan,

    /// Post a deployment status
    PostStatus(DeploymentStatusState),

    /// Update the bound check run
    UpdateCheckRun(CheckRunUpdate),
}

/// Rejected event
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsmError {
    #[error("stage '{0}' is not part of this deployment")]
    UnknownStage(String),
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentState,
    plan: DeploymentPlan,
}

impl DeploymentFsm {
    /// Create a new FSM for a freshly created deployment
    pub fn new(plan: DeploymentPlan) -> Self {
        Self::resume(DeploymentState::Created, plan)
    }

    /// Continue from a state loaded from GitHub
    pub fn resume(state: DeploymentState, plan: DeploymentPlan) -> Self {
        Self { state, plan }
    }

    /// Get current state
    pub fn state(&self) -> DeploymentState {
        self.state
    }

    pub fn plan(&self) -> &DeploymentPlan {
        &self.plan
    }

    pub fn into_plan(self) -> DeploymentPlan {
        self.plan
    }

    /// Process an event and return the effects of the transition
    ///
    /// Events are idempotent: replaying one that was already applied yields no effects.
    /// Terminal states accept nothing, so a terminal status is always the last effect of a
    /// transition and is only posted once the check run has been completed.
    pub fn process(&mut self, event: DeploymentEvent) -> Result<Vec<Effect>, FsmError> {
        if self.state.is_terminal() {
            info!(state = ?self.state, event = ?event, "Deployment already finished, ignoring event");
            return Ok(Vec::new());
        }

        if let Some(stage) = event.stage() {
            if !self.plan.has_stage(stage) {
                return Err(FsmError::UnknownStage(stage.to_string()));
            }
        }

        let mut effects = Vec::new();

        match event {
            DeploymentEvent::Queue => {
                if self.state == DeploymentState::Created {
                    self.state = DeploymentState::Queued;
                    effects.push(Effect::PostStatus(DeploymentStatusState::Queued));
                    effects.push(Effect::UpdateCheckRun(CheckRunUpdate::Queued));
                }
            }

            DeploymentEvent::StageStarted { .. } => {
                self.start(&mut effects);
                self.finish_if_complete(&mut effects);
            }

            DeploymentEvent::StageCompleted { stage, artifact } => {
                self.start(&mut effects);
                if self.plan.record_completion(&stage, artifact) == Some(Recorded::Added) {
                    effects.push(Effect::SavePlan);
                }
                self.finish_if_complete(&mut effects);
            }

            DeploymentEvent::StageFailed { stage, reason } => {
                self.fail(DeploymentState::Failure, &stage, reason, &mut effects);
            }

            DeploymentEvent::StageErrored { stage, reason } => {
                self.fail(DeploymentState::Error, &stage, reason, &mut effects);
            }
        }

        Ok(effects)
    }

    fn start(&mut self, effects: &mut Vec<Effect>) {
        if matches!(self.state, DeploymentState::Created | DeploymentState::Queued) {
            self.state = DeploymentState::InProgress;
            effects.push(Effect::PostStatus(DeploymentStatusState::InProgress));
            effects.push(Effect::UpdateCheckRun(CheckRunUpdate::InProgress));
        }
    }

    // Also covers a redelivered final stage after a crash before success was posted
    fn finish_if_complete(&mut self, effects: &mut Vec<Effect>) {
        if self.state == DeploymentState::InProgress && self.plan.is_complete() {
            self.state = DeploymentState::Success;
            effects.push(Effect::UpdateCheckRun(CheckRunUpdate::Completed {
                conclusion: CheckConclusion::Success,
                summary: format!(
                    "All {} stage(s) completed: {}",
                    self.plan.stages.len(),
                    self.plan.stages.join(", ")
                ),
            }));
            effects.push(Effect::PostStatus(DeploymentStatusState::Success));
        }
    }

    fn fail(
        &mut self,
        terminal: DeploymentState,
        stage: &str,
        reason: Option<String>,
        effects: &mut Vec<Effect>,
    ) {
        let status = match terminal {
            DeploymentState::Error => DeploymentStatusState::Error,
            _ => DeploymentStatusState::Failure,
        };
        let verb = if status == DeploymentStatusState::Error {
            "errored"
        } else {
            "failed"
        };

        let mut summary = format!("Stage '{}' {}", stage, verb);
        if let Some(reason) = reason {
            summary.push_str(": ");
            summary.push_str(&reason);
        }
        let skipped: Vec<&str> = self
            .plan
            .remaining()
            .into_iter()
            .filter(|s| *s != stage)
            .collect();
        if !skipped.is_empty() {
            summary.push_str(&format!(". Not run: {}", skipped.join(", ")));
        }

        self.state = terminal;
        effects.push(Effect::UpdateCheckRun(CheckRunUpdate::Completed {
            conclusion: CheckConclusion::Failure,
            summary,
        }));
        effects.push(Effect::PostStatus(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan(stages: &[&str]) -> DeploymentPlan {
        DeploymentPlan {
            check_run_id: Some(1),
            stages: stages.iter().map(|s| s.to_string()).collect(),
            completed_stages: vec![],
            artifacts: Default::default(),
        }
    }

    fn completed(stage: &str) -> DeploymentEvent {
        DeploymentEvent::StageCompleted {
            stage: stage.to_string(),
            artifact: None,
        }
    }

    #[test]
    fn test_fsm_transitions() {
        let mut fsm = DeploymentFsm::new(plan(&["deploy"]));
        assert_eq!(fsm.state(), DeploymentState::Created);

        let effects = fsm.process(DeploymentEvent::Queue).unwrap();
        assert_eq!(fsm.state(), DeploymentState::Queued);
        assert_eq!(
            effects,
            vec![
                Effect::PostStatus(DeploymentStatusState::Queued),
                Effect::UpdateCheckRun(CheckRunUpdate::Queued),
            ]
        );

        fsm.process(DeploymentEvent::StageStarted {
            stage: "deploy".into(),
        })
        .unwrap();
        assert_eq!(fsm.state(), DeploymentState::InProgress);

        let effects = fsm.process(completed("deploy")).unwrap();
        assert_eq!(fsm.state(), DeploymentState::Success);
        assert_eq!(effects[0], Effect::SavePlan);
        assert!(matches!(
            effects[1],
            Effect::UpdateCheckRun(CheckRunUpdate::Completed { .. })
        ));
        assert_eq!(effects[2], Effect::PostStatus(DeploymentStatusState::Success));
    }

    #[test]
    fn test_queue_is_idempotent() {
        let mut fsm = DeploymentFsm::new(plan(&["deploy"]));
        fsm.process(DeploymentEvent::Queue).unwrap();
        assert!(fsm.process(DeploymentEvent::Queue).unwrap().is_empty());
    }

    #[test]
    fn test_completion_before_start_moves_to_in_progress() {
        let mut fsm = DeploymentFsm::resume(DeploymentState::Queued, plan(&["build", "test"]));
        let effects = fsm.process(completed("test")).unwrap();

        assert_eq!(fsm.state(), DeploymentState::InProgress);
        assert_eq!(
            effects,
            vec![
                Effect::PostStatus(DeploymentStatusState::InProgress),
                Effect::UpdateCheckRun(CheckRunUpdate::InProgress),
                Effect::SavePlan,
            ]
        );
    }

    #[test]
    fn test_duplicate_completion_has_no_effects() {
        let mut fsm = DeploymentFsm::resume(DeploymentState::InProgress, plan(&["build", "test"]));
        fsm.process(completed("build")).unwrap();
        assert!(fsm.process(completed("build")).unwrap().is_empty());
        assert_eq!(fsm.plan().completed_stages, vec!["build"]);
    }

    #[test]
    fn test_success_exactly_once() {
        let mut fsm = DeploymentFsm::resume(DeploymentState::InProgress, plan(&["a", "b"]));
        let mut successes = 0;
        for event in [completed("b"), completed("a"), completed("a"), completed("b")] {
            successes += fsm
                .process(event)
                .unwrap()
                .iter()
                .filter(|e| **e == Effect::PostStatus(DeploymentStatusState::Success))
                .count();
        }
        assert_eq!(successes, 1);
    }

    #[test]
    fn test_failure_short_circuits() {
        let mut fsm = DeploymentFsm::resume(DeploymentState::InProgress, plan(&["a", "b", "c"]));
        let effects = fsm
            .process(DeploymentEvent::StageFailed {
                stage: "a".into(),
                reason: Some("exit 1".into()),
            })
            .unwrap();

        assert_eq!(fsm.state(), DeploymentState::Failure);
        assert_eq!(effects[1], Effect::PostStatus(DeploymentStatusState::Failure));
        match &effects[0] {
            Effect::UpdateCheckRun(CheckRunUpdate::Completed { conclusion, summary }) => {
                assert_eq!(*conclusion, CheckConclusion::Failure);
                assert_eq!(summary, "Stage 'a' failed: exit 1. Not run: b, c");
            }
            other => panic!("unexpected effect {other:?}"),
        }

        // Later successes never flip the outcome
        for stage in ["b", "c", "a"] {
            assert!(fsm.process(completed(stage)).unwrap().is_empty());
        }
        assert_eq!(fsm.state(), DeploymentState::Failure);
    }

    #[test]
    fn test_error_is_terminal() {
        let mut fsm = DeploymentFsm::resume(DeploymentState::Queued, plan(&["a"]));
        let effects = fsm
            .process(DeploymentEvent::StageErrored {
                stage: "a".into(),
                reason: None,
            })
            .unwrap();
        assert_eq!(effects[1], Effect::PostStatus(DeploymentStatusState::Error));
        assert_eq!(fsm.state(), DeploymentState::Error);
        assert!(fsm.process(DeploymentEvent::Queue).unwrap().is_empty());
    }

    #[test]
    fn test_recovers_when_success_was_never_posted() {
        let mut stored = plan(&["a"]);
        stored.record_completion("a", Some(json!({"image": "web:1"})));
        let mut fsm = DeploymentFsm::resume(DeploymentState::InProgress, stored);

        let effects = fsm.process(completed("a")).unwrap();
        assert_eq!(effects.len(), 2);
        assert_eq!(effects[1], Effect::PostStatus(DeploymentStatusState::Success));
        assert_eq!(fsm.state(), DeploymentState::Success);
    }

    #[test]
    fn test_terminal_status_is_the_last_effect() {
        let failing = DeploymentEvent::StageFailed {
            stage: "a".into(),
            reason: None,
        };
        for event in [completed("a"), failing] {
            let mut fsm = DeploymentFsm::resume(DeploymentState::InProgress, plan(&["a"]));
            let effects = fsm.process(event).unwrap();
            let last = effects.len() - 1;

            assert!(effects[..last]
                .iter()
                .any(|e| matches!(e, Effect::UpdateCheckRun(CheckRunUpdate::Completed { .. }))));
            assert!(matches!(effects[last], Effect::PostStatus(_)));
        }
    }

    #[test]
    fn test_fsm_invalid_stage() {
        let mut fsm = DeploymentFsm::resume(DeploymentState::InProgress, plan(&["a"]));
        let result = fsm.process(completed("z"));
        assert_eq!(result, Err(FsmError::UnknownStage("z".into())));
        assert_eq!(fsm.state(), DeploymentState::InProgress);
    }

    #[test]
    fn test_state_from_latest_status() {
        assert_eq!(DeploymentState::from_latest_status(None), DeploymentState::Created);
        assert_eq!(
            DeploymentState::from_latest_status(Some(DeploymentStatusState::InProgress)),
            DeploymentState::InProgress
        );
        assert!(DeploymentState::from_latest_status(Some(DeploymentStatusState::Inactive))
            .is_terminal());
    }
}
