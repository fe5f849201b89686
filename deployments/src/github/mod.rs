//! Remote resource API
//!
//! Everything the engine does to GitHub goes through [`GitHubApi`], scoped to one
//! repository and one installation token. The HTTP implementation lives in
//! [`crate::http::github`]; tests substitute an in-memory fake.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use github_models::{
    CheckRun, CheckRunPatch, CheckSuite, ContentEntry, ContentFile, Deployment, DeploymentStatus,
    NewCheckRun, NewDeployment, NewDeploymentStatus,
};

use crate::errors::DeployError;

/// Repository coordinates
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repo {
    pub owner: String,
    pub name: String,
}

impl Repo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Authenticated, repository-scoped GitHub operations
#[async_trait]
pub trait GitHubApi: Send + Sync {
    /// Repository this client is scoped to
    fn repo(&self) -> &Repo;

    /// List a directory at `git_ref`; a missing directory is `NotFound`
    async fn list_contents(&self, path: &str, git_ref: &str)
        -> Result<Vec<ContentEntry>, DeployError>;

    /// Fetch a single file at `git_ref`
    async fn get_content(&self, path: &str, git_ref: &str) -> Result<ContentFile, DeployError>;

    /// Check suites on a commit created by `app_id`
    async fn list_check_suites(&self, sha: &str, app_id: u64)
        -> Result<Vec<CheckSuite>, DeployError>;

    /// Create the app's check suite on a commit; the response body is not needed
    async fn create_check_suite(&self, sha: &str) -> Result<(), DeployError>;

    async fn create_check_run(&self, run: &NewCheckRun) -> Result<CheckRun, DeployError>;

    async fn get_check_run(&self, check_run_id: u64) -> Result<CheckRun, DeployError>;

    async fn patch_check_run(&self, check_run_id: u64, patch: &CheckRunPatch)
        -> Result<(), DeployError>;

    /// Create a fully qualified ref; an existing ref is `Unprocessable`
    async fn create_ref(&self, git_ref: &str, sha: &str) -> Result<(), DeployError>;

    /// Force-move an existing fully qualified ref
    async fn update_ref(&self, git_ref: &str, sha: &str) -> Result<(), DeployError>;

    async fn list_deployments(&self, sha: &str, environment: &str)
        -> Result<Vec<Deployment>, DeployError>;

    async fn get_deployment(&self, deployment_id: u64) -> Result<Deployment, DeployError>;

    async fn create_deployment(&self, deployment: &NewDeployment)
        -> Result<Deployment, DeployError>;

    /// Statuses of a deployment, newest first
    async fn list_deployment_statuses(&self, deployment_id: u64)
        -> Result<Vec<DeploymentStatus>, DeployError>;

    async fn create_deployment_status(
        &self,
        deployment_id: u64,
        status: &NewDeploymentStatus,
    ) -> Result<(), DeployError>;
}

/// Hands out authenticated clients per installation
#[async_trait]
pub trait ApiProvider: Send + Sync {
    /// Client for `repo`, authenticated as `installation_id` or as the repository's
    /// installation when the event did not carry one
    async fn for_installation(
        &self,
        installation_id: Option<u64>,
        repo: &Repo,
    ) -> Result<Arc<dyn GitHubApi>, DeployError>;
}
