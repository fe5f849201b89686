//! Plan persistence on GitHub
//!
//! A Deployment's payload is fixed once created, so it only holds the immutable half of
//! the plan (`check_run_id`, `stages`). Progress is written as JSON into the bound check
//! run's `output.text`, and the state is whatever the newest Deployment status says.

use std::sync::Arc;

use async_trait::async_trait;
use github_models::{CheckRunOutput, CheckRunPatch};
use serde_json::Value;
use tracing::{debug, warn};

use crate::deploy::checks::CHECK_RUN_TITLE;
use crate::deploy::fsm::DeploymentState;
use crate::deploy::plan::{DeploymentPlan, PlanProgress};
use crate::errors::DeployError;
use crate::github::GitHubApi;

/// A deployment as stored on GitHub
#[derive(Debug, Clone)]
pub struct StoredDeployment {
    pub id: u64,
    pub plan: DeploymentPlan,
    pub state: DeploymentState,
}

/// Load and save plans by deployment id
#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn load(&self, deployment_id: u64) -> Result<StoredDeployment, DeployError>;

    async fn save(&self, deployment_id: u64, plan: &DeploymentPlan) -> Result<(), DeployError>;
}

pub struct GitHubPlanRepository {
    api: Arc<dyn GitHubApi>,
}

impl GitHubPlanRepository {
    pub fn new(api: Arc<dyn GitHubApi>) -> Self {
        Self { api }
    }

    async fn load_progress(&self, check_run_id: u64) -> Result<Option<PlanProgress>, DeployError> {
        let run = self.api.get_check_run(check_run_id).await?;
        let Some(text) = run.output.and_then(|output| output.text) else {
            return Ok(None);
        };

        match serde_json::from_str::<PlanProgress>(&text) {
            Ok(progress) => Ok(Some(progress)),
            Err(e) => {
                warn!(check_run = check_run_id, "Ignoring unreadable plan progress: {}", e);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl PlanRepository for GitHubPlanRepository {
    async fn load(&self, deployment_id: u64) -> Result<StoredDeployment, DeployError> {
        let deployment = self.api.get_deployment(deployment_id).await?;
        let mut plan = plan_from_payload(deployment_id, deployment.payload)?;

        if let Some(check_run_id) = plan.check_run_id {
            if let Some(progress) = self.load_progress(check_run_id).await? {
                plan.apply_progress(progress);
            }
        }

        let statuses = self.api.list_deployment_statuses(deployment_id).await?;
        let state = DeploymentState::from_latest_status(statuses.first().map(|s| s.state));

        debug!(
            deployment = deployment_id,
            ?state,
            completed = ?plan.completed_stages,
            "Loaded deployment plan"
        );

        Ok(StoredDeployment {
            id: deployment.id,
            plan,
            state,
        })
    }

    async fn save(&self, deployment_id: u64, plan: &DeploymentPlan) -> Result<(), DeployError> {
        let check_run_id = plan.check_run_id.ok_or_else(|| {
            DeployError::Internal(format!(
                "deployment {} has no check run to store progress on",
                deployment_id
            ))
        })?;

        let patch = CheckRunPatch {
            output: Some(progress_output(plan, progress_summary(plan))?),
            ..Default::default()
        };

        self.api
            .patch_check_run(check_run_id, &patch)
            .await
            .map_err(|e| DeployError::resource("plan progress", e))
    }
}

/// Check run output carrying `summary` and the plan's progress snapshot
pub fn progress_output(plan: &DeploymentPlan, summary: String) -> Result<CheckRunOutput, DeployError> {
    Ok(CheckRunOutput {
        title: CHECK_RUN_TITLE.to_string(),
        summary,
        text: Some(serde_json::to_string(&plan.progress())?),
    })
}

fn progress_summary(plan: &DeploymentPlan) -> String {
    format!(
        "{} of {} stage(s) completed: {}",
        plan.completed_stages.len(),
        plan.stages.len(),
        plan.stages
            .iter()
            .map(|stage| {
                let mark = if plan.is_completed(stage) { "x" } else { " " };
                format!("[{}] {}", mark, stage)
            })
            .collect::<Vec<_>>()
            .join(", ")
    )
}

fn plan_from_payload(deployment_id: u64, payload: Value) -> Result<DeploymentPlan, DeployError> {
    // Some API responses carry the payload as an encoded string
    let payload = match payload {
        Value::String(encoded) => serde_json::from_str(&encoded).map_err(|e| {
            DeployError::Validation(format!("deployment {} payload: {}", deployment_id, e))
        })?,
        other => other,
    };

    serde_json::from_value(payload).map_err(|e| {
        DeployError::Validation(format!(
            "deployment {} was not planned by this app: {}",
            deployment_id, e
        ))
    })
}
