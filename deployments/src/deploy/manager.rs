//! Deployment refs, resources and statuses

use std::sync::Arc;

use github_models::{Deployment, DeploymentStatusState, NewDeployment, NewDeploymentStatus};
use tracing::{debug, info};

use crate::config::definition::DeploymentDefinition;
use crate::deploy::plan::DeploymentPlan;
use crate::errors::DeployError;
use crate::github::GitHubApi;

/// Task name sent with every deployment
pub const DEPLOYMENT_TASK: &str = "deploy";

/// Creates and advances GitHub Deployments
pub struct DeploymentManager {
    api: Arc<dyn GitHubApi>,
}

impl DeploymentManager {
    pub fn new(api: Arc<dyn GitHubApi>) -> Self {
        Self { api }
    }

    /// Deployment already created for `definition` at `sha`, if any
    pub async fn find_existing(
        &self,
        definition: &DeploymentDefinition,
        sha: &str,
    ) -> Result<Option<Deployment>, DeployError> {
        let deployments = self.api.list_deployments(sha, &definition.id).await?;
        Ok(deployments.into_iter().next())
    }

    /// Point `refs/heads/deployments/{id}` at `sha`
    ///
    /// An existing ref is moved rather than reported.
    pub async fn create_ref(
        &self,
        definition: &DeploymentDefinition,
        sha: &str,
    ) -> Result<(), DeployError> {
        let git_ref = format!("refs/heads/{}", definition.branch());

        match self.api.create_ref(&git_ref, sha).await {
            Ok(()) => {
                info!(git_ref, sha, "Created deployment ref");
                Ok(())
            }
            Err(DeployError::Unprocessable(message)) => {
                debug!(git_ref, "Ref exists ({}), moving it to {}", message, sha);
                self.api
                    .update_ref(&git_ref, sha)
                    .await
                    .map_err(|e| DeployError::resource("deployment ref", e))
            }
            Err(e) => Err(DeployError::resource("deployment ref", e)),
        }
    }

    /// Create the Deployment carrying `plan` as its payload
    pub async fn create_deployment(
        &self,
        definition: &DeploymentDefinition,
        plan: &DeploymentPlan,
    ) -> Result<Deployment, DeployError> {
        let request = NewDeployment {
            git_ref: definition.branch(),
            environment: definition.id.clone(),
            task: DEPLOYMENT_TASK.to_string(),
            description: definition.description.clone(),
            auto_merge: false,
            required_contexts: Vec::new(),
            payload: serde_json::to_value(plan)?,
        };

        let deployment = self
            .api
            .create_deployment(&request)
            .await
            .map_err(|e| DeployError::resource("deployment", e))?;

        info!(
            deployment = deployment.id,
            environment = %definition.id,
            "Created deployment"
        );
        Ok(deployment)
    }

    /// Post `state` unless it is already the newest status
    pub async fn post_status(
        &self,
        deployment_id: u64,
        state: DeploymentStatusState,
        description: Option<String>,
    ) -> Result<(), DeployError> {
        let statuses = self.api.list_deployment_statuses(deployment_id).await?;
        if statuses.first().map(|status| status.state) == Some(state) {
            debug!(deployment = deployment_id, ?state, "Status already posted");
            return Ok(());
        }

        self.api
            .create_deployment_status(deployment_id, &NewDeploymentStatus { state, description })
            .await
            .map_err(|e| DeployError::resource("deployment status", e))?;

        info!(deployment = deployment_id, ?state, "Posted deployment status");
        Ok(())
    }
}
