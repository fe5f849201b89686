//! Check suites and check runs bound to deployments

use std::sync::Arc;

use github_models::{
    CheckConclusion, CheckRun, CheckRunOutput, CheckRunPatch, CheckStatus, CheckSuite, NewCheckRun,
};
use tracing::{debug, info, warn};

use crate::config::definition::DeploymentDefinition;
use crate::errors::DeployError;
use crate::github::GitHubApi;

/// Title shown on every check run the app creates
pub const CHECK_RUN_TITLE: &str = "Deployment";

/// Reuse-or-create management of the app's check suite and runs on a commit
pub struct CheckSuiteManager {
    api: Arc<dyn GitHubApi>,
    app_id: u64,
}

impl CheckSuiteManager {
    pub fn new(api: Arc<dyn GitHubApi>, app_id: u64) -> Self {
        Self { api, app_id }
    }

    /// Suite of this app on `sha`, created when none exists yet
    pub async fn ensure_suite(&self, sha: &str) -> Result<(), DeployError> {
        if let Some(suite) = self.find_suite(sha).await? {
            debug!(suite = suite.id, sha, "Reusing check suite");
            return Ok(());
        }

        match self.api.create_check_suite(sha).await {
            Ok(()) => {
                info!(sha, "Created check suite");
                Ok(())
            }
            // Another delivery created it in the meantime
            Err(DeployError::Unprocessable(message)) => {
                debug!("Check suite creation rejected ({}), listing again", message);
                match self.find_suite(sha).await? {
                    Some(suite) => {
                        debug!(suite = suite.id, sha, "Reusing check suite");
                        Ok(())
                    }
                    None => Err(DeployError::ResourceCreation(format!(
                        "check suite for {}: {}",
                        sha, message
                    ))),
                }
            }
            Err(e) => Err(DeployError::resource("check suite", e)),
        }
    }

    async fn find_suite(&self, sha: &str) -> Result<Option<CheckSuite>, DeployError> {
        let suites = self.api.list_check_suites(sha, self.app_id).await?;
        Ok(suites.into_iter().next())
    }

    /// Queued check run for `definition` on `sha`
    pub async fn create_run(
        &self,
        definition: &DeploymentDefinition,
        sha: &str,
    ) -> Result<CheckRun, DeployError> {
        let run = NewCheckRun {
            name: definition.name.clone(),
            head_sha: sha.to_string(),
            external_id: definition.id.clone(),
            status: CheckStatus::Queued,
            output: Some(CheckRunOutput {
                title: CHECK_RUN_TITLE.to_string(),
                summary: format!("Deployment '{}' is being prepared", definition.id),
                text: None,
            }),
        };

        let run = self
            .api
            .create_check_run(&run)
            .await
            .map_err(|e| DeployError::resource("check run", e))?;

        info!(check_run = run.id, definition = %definition.id, sha, "Created check run");
        Ok(run)
    }

    /// Apply `patch` to a check run
    ///
    /// PATCH replaces the given fields, so reapplying the same patch leaves the run as is.
    pub async fn patch(&self, check_run_id: u64, patch: &CheckRunPatch) -> Result<(), DeployError> {
        self.api
            .patch_check_run(check_run_id, patch)
            .await
            .map_err(|e| DeployError::resource("check run update", e))
    }

    /// Complete a check run with a failure conclusion
    ///
    /// Used when the event cannot continue; a failure to patch is only logged so the
    /// original error is the one reported.
    pub async fn fail_run(&self, check_run_id: u64, output: CheckRunOutput) {
        let patch = completed(CheckConclusion::Failure, output);
        if let Err(e) = self.api.patch_check_run(check_run_id, &patch).await {
            warn!(check_run = check_run_id, "Unable to mark check run as failed: {}", e);
        }
    }
}

/// Patch completing a run with `conclusion`
pub fn completed(conclusion: CheckConclusion, output: CheckRunOutput) -> CheckRunPatch {
    CheckRunPatch {
        status: Some(CheckStatus::Completed),
        conclusion: Some(conclusion),
        output: Some(output),
    }
}
