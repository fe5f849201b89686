//! Deployment orchestration
//!
//! Two entry points drive every deployment. A push resolves the definitions at the head
//! commit and creates, per matched definition, a check suite, a check run, the deployment
//! ref and the Deployment itself. Stage events load an existing deployment, feed the event
//! through [`DeploymentFsm`] and apply the resulting effects to GitHub.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use github_models::{CheckRunPatch, CheckStatus, PushEvent};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::definition::DeploymentDefinition;
use crate::config::resolver::ConfigResolver;
use crate::deploy::checks::{completed, CheckSuiteManager};
use crate::deploy::fsm::{CheckRunUpdate, DeploymentEvent, DeploymentFsm, DeploymentState, Effect};
use crate::deploy::manager::DeploymentManager;
use crate::deploy::plan::{DeploymentPlan, DeploymentPlanner};
use crate::deploy::store::{progress_output, GitHubPlanRepository, PlanRepository};
use crate::errors::DeployError;
use crate::github::GitHubApi;

/// Event name definitions are matched against on push
pub const PUSH_EVENT: &str = "push";

/// Reported outcome of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Started,
    Completed,
    Failed,
    Error,
}

impl FromStr for StageStatus {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(StageStatus::Started),
            "completed" => Ok(StageStatus::Completed),
            "failed" => Ok(StageStatus::Failed),
            "error" => Ok(StageStatus::Error),
            other => Err(DeployError::Validation(format!(
                "unknown stage status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageStatus::Started => "started",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
            StageStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Progress report for one stage of a deployment
#[derive(Debug, Clone, PartialEq)]
pub struct StageEvent {
    pub deployment_id: u64,
    pub stage: String,
    pub status: StageStatus,
    pub artifact: Option<serde_json::Value>,
    pub reason: Option<String>,
}

impl StageEvent {
    fn to_fsm_event(&self) -> DeploymentEvent {
        let stage = self.stage.clone();
        match self.status {
            StageStatus::Started => DeploymentEvent::StageStarted { stage },
            StageStatus::Completed => DeploymentEvent::StageCompleted {
                stage,
                artifact: self.artifact.clone(),
            },
            StageStatus::Failed => DeploymentEvent::StageFailed {
                stage,
                reason: self.reason.clone(),
            },
            StageStatus::Error => DeploymentEvent::StageErrored {
                stage,
                reason: self.reason.clone(),
            },
        }
    }
}

/// What a push did for one definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentOutcome {
    /// A new deployment was created and queued
    Created {
        definition: String,
        deployment_id: u64,
        check_run_id: u64,
    },

    /// The commit already had a deployment for this definition
    AlreadyDeployed {
        definition: String,
        deployment_id: u64,
    },
}

// Per-event collaborators sharing one authenticated client
struct Session {
    checks: CheckSuiteManager,
    deployments: DeploymentManager,
    plans: GitHubPlanRepository,
}

impl Session {
    fn new(api: Arc<dyn GitHubApi>, app_id: u64) -> Self {
        Self {
            checks: CheckSuiteManager::new(api.clone(), app_id),
            deployments: DeploymentManager::new(api.clone()),
            plans: GitHubPlanRepository::new(api),
        }
    }
}

/// Drives deployments from webhook events
pub struct Orchestrator {
    app_id: u64,
    resolver: ConfigResolver,
    planner: DeploymentPlanner,
}

impl Orchestrator {
    pub fn new(app_id: u64, resolver: ConfigResolver) -> Self {
        Self {
            app_id,
            resolver,
            planner: DeploymentPlanner,
        }
    }

    /// Create deployments for every definition triggered by `push`
    pub async fn on_push(
        &self,
        api: Arc<dyn GitHubApi>,
        push: &PushEvent,
    ) -> Result<Vec<DeploymentOutcome>, DeployError> {
        let sha = push.head_sha();
        let resolution = self.resolver.resolve(api.as_ref(), sha, PUSH_EVENT).await?;

        if resolution.definitions.is_empty() {
            info!(repo = %api.repo(), sha, "No deployment definitions matched");
            return Ok(Vec::new());
        }
        if !resolution.is_wired() {
            warn!(
                repo = %api.repo(),
                "No workflow runs on '{}' events, skipping {} deployment(s)",
                crate::config::resolver::DEPLOYMENT_TRIGGER,
                resolution.definitions.len()
            );
            return Ok(Vec::new());
        }

        let session = Session::new(api, self.app_id);
        let mut outcomes = Vec::with_capacity(resolution.definitions.len());
        for definition in &resolution.definitions {
            outcomes.push(self.deploy(&session, definition, sha).await?);
        }
        Ok(outcomes)
    }

    async fn deploy(
        &self,
        session: &Session,
        definition: &DeploymentDefinition,
        sha: &str,
    ) -> Result<DeploymentOutcome, DeployError> {
        if let Some(existing) = session.deployments.find_existing(definition, sha).await? {
            info!(
                definition = %definition.id,
                deployment = existing.id,
                sha,
                "Commit already deployed, skipping"
            );
            return Ok(DeploymentOutcome::AlreadyDeployed {
                definition: definition.id.clone(),
                deployment_id: existing.id,
            });
        }

        let mut plan = self.planner.plan(definition, sha);
        session.checks.ensure_suite(sha).await?;
        let run = session.checks.create_run(definition, sha).await?;
        plan.check_run_id = Some(run.id);

        // From here on the check run must not be left queued
        let result = async {
            session.deployments.create_ref(definition, sha).await?;
            let deployment = session.deployments.create_deployment(definition, &plan).await?;

            let mut fsm = DeploymentFsm::new(plan.clone());
            let effects = fsm
                .process(DeploymentEvent::Queue)
                .map_err(|e| DeployError::Internal(e.to_string()))?;
            apply_effects(session, deployment.id, &fsm, effects).await?;
            Ok::<u64, DeployError>(deployment.id)
        }
        .await;

        match result {
            Ok(deployment_id) => Ok(DeploymentOutcome::Created {
                definition: definition.id.clone(),
                deployment_id,
                check_run_id: run.id,
            }),
            Err(e) => {
                let summary = format!("Deployment '{}' could not be created: {}", definition.id, e);
                fail_check_run(session, &plan, summary).await;
                Err(e)
            }
        }
    }

    /// Advance an existing deployment with a stage report
    pub async fn on_stage_event(
        &self,
        api: Arc<dyn GitHubApi>,
        event: &StageEvent,
    ) -> Result<DeploymentState, DeployError> {
        let session = Session::new(api, self.app_id);
        let stored = session.plans.load(event.deployment_id).await?;

        let mut fsm = DeploymentFsm::resume(stored.state, stored.plan);
        let effects = fsm
            .process(event.to_fsm_event())
            .map_err(|e| DeployError::Validation(e.to_string()))?;

        info!(
            deployment = event.deployment_id,
            stage = %event.stage,
            status = %event.status,
            state = ?fsm.state(),
            effects = effects.len(),
            "Applied stage event"
        );

        if let Err(e) = apply_effects(&session, stored.id, &fsm, effects).await {
            let summary = format!("Deployment {} could not be updated: {}", stored.id, e);
            fail_check_run(&session, fsm.plan(), summary).await;
            return Err(e);
        }
        Ok(fsm.state())
    }
}

// Best effort; keeps the progress snapshot so a redelivered event can still resume
async fn fail_check_run(session: &Session, plan: &DeploymentPlan, summary: String) {
    let Some(check_run_id) = plan.check_run_id else {
        return;
    };
    match progress_output(plan, summary) {
        Ok(output) => session.checks.fail_run(check_run_id, output).await,
        Err(e) => warn!(check_run = check_run_id, "Unable to encode plan progress: {}", e),
    }
}

async fn apply_effects(
    session: &Session,
    deployment_id: u64,
    fsm: &DeploymentFsm,
    effects: Vec<Effect>,
) -> Result<(), DeployError> {
    let plan = fsm.plan();

    for effect in effects {
        match effect {
            Effect::SavePlan => session.plans.save(deployment_id, plan).await?,

            Effect::PostStatus(state) => {
                session
                    .deployments
                    .post_status(deployment_id, state, None)
                    .await?
            }

            Effect::UpdateCheckRun(update) => {
                let Some(check_run_id) = plan.check_run_id else {
                    warn!(deployment = deployment_id, "Deployment has no check run to update");
                    continue;
                };

                let patch = match update {
                    CheckRunUpdate::Queued => status_patch(CheckStatus::Queued),
                    CheckRunUpdate::InProgress => status_patch(CheckStatus::InProgress),
                    CheckRunUpdate::Completed {
                        conclusion,
                        summary,
                    } => completed(conclusion, progress_output(plan, summary)?),
                };
                session.checks.patch(check_run_id, &patch).await?;
            }
        }
    }

    Ok(())
}

fn status_patch(status: CheckStatus) -> CheckRunPatch {
    CheckRunPatch {
        status: Some(status),
        ..Default::default()
    }
}
