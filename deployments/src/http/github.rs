//! Repository-scoped GitHub client

use std::sync::Arc;

use async_trait::async_trait;
use github_models::{
    CheckRun, CheckRunPatch, CheckSuite, CheckSuiteList, ContentEntry, ContentFile, Deployment,
    DeploymentStatus, NewCheckRun, NewCheckSuite, NewDeployment, NewDeploymentStatus, NewRef,
    RefUpdate,
};
use secrecy::{ExposeSecret, SecretString};
use serde::de::IgnoredAny;

use crate::authn::token_mngr::{TokenManager, TokenManagerExt};
use crate::errors::DeployError;
use crate::github::{ApiProvider, GitHubApi, Repo};
use crate::http::client::HttpClient;

/// [`GitHubApi`] over REST, authenticated with an installation token
pub struct GitHubClient {
    http: Arc<HttpClient>,
    repo: Repo,
    token: SecretString,
}

impl GitHubClient {
    pub fn new(http: Arc<HttpClient>, repo: Repo, token: SecretString) -> Self {
        Self { http, repo, token }
    }

    fn path(&self, rest: &str) -> String {
        format!("/repos/{}/{}/{}", self.repo.owner, self.repo.name, rest)
    }

    fn token(&self) -> &str {
        self.token.expose_secret()
    }
}

#[async_trait]
impl GitHubApi for GitHubClient {
    fn repo(&self) -> &Repo {
        &self.repo
    }

    async fn list_contents(
        &self,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<ContentEntry>, DeployError> {
        let path = self.path(&format!("contents/{}", path));
        self.http.get(&path, &[("ref", git_ref)], self.token()).await
    }

    async fn get_content(&self, path: &str, git_ref: &str) -> Result<ContentFile, DeployError> {
        let path = self.path(&format!("contents/{}", path));
        self.http.get(&path, &[("ref", git_ref)], self.token()).await
    }

    async fn list_check_suites(
        &self,
        sha: &str,
        app_id: u64,
    ) -> Result<Vec<CheckSuite>, DeployError> {
        let path = self.path(&format!("commits/{}/check-suites", sha));
        let app_id = app_id.to_string();
        let list: CheckSuiteList = self
            .http
            .get(&path, &[("app_id", app_id.as_str())], self.token())
            .await?;
        Ok(list.check_suites)
    }

    async fn create_check_suite(&self, sha: &str) -> Result<(), DeployError> {
        let body = NewCheckSuite {
            head_sha: sha.to_string(),
        };
        let _: IgnoredAny = self.http.post(&self.path("check-suites"), self.token(), &body).await?;
        Ok(())
    }

    async fn create_check_run(&self, run: &NewCheckRun) -> Result<CheckRun, DeployError> {
        self.http.post(&self.path("check-runs"), self.token(), run).await
    }

    async fn get_check_run(&self, check_run_id: u64) -> Result<CheckRun, DeployError> {
        let path = self.path(&format!("check-runs/{}", check_run_id));
        self.http.get(&path, &[], self.token()).await
    }

    async fn patch_check_run(
        &self,
        check_run_id: u64,
        patch: &CheckRunPatch,
    ) -> Result<(), DeployError> {
        let path = self.path(&format!("check-runs/{}", check_run_id));
        let _: IgnoredAny = self.http.patch(&path, self.token(), patch).await?;
        Ok(())
    }

    async fn create_ref(&self, git_ref: &str, sha: &str) -> Result<(), DeployError> {
        let body = NewRef {
            git_ref: git_ref.to_string(),
            sha: sha.to_string(),
        };
        let _: IgnoredAny = self.http.post(&self.path("git/refs"), self.token(), &body).await?;
        Ok(())
    }

    async fn update_ref(&self, git_ref: &str, sha: &str) -> Result<(), DeployError> {
        // The update endpoint takes the ref without its "refs/" prefix
        let short = git_ref.strip_prefix("refs/").unwrap_or(git_ref);
        let path = self.path(&format!("git/refs/{}", short));
        let body = RefUpdate {
            sha: sha.to_string(),
            force: true,
        };
        let _: IgnoredAny = self.http.patch(&path, self.token(), &body).await?;
        Ok(())
    }

    async fn list_deployments(
        &self,
        sha: &str,
        environment: &str,
    ) -> Result<Vec<Deployment>, DeployError> {
        self.http
            .get(
                &self.path("deployments"),
                &[("sha", sha), ("environment", environment)],
                self.token(),
            )
            .await
    }

    async fn get_deployment(&self, deployment_id: u64) -> Result<Deployment, DeployError> {
        let path = self.path(&format!("deployments/{}", deployment_id));
        self.http.get(&path, &[], self.token()).await
    }

    async fn create_deployment(
        &self,
        deployment: &NewDeployment,
    ) -> Result<Deployment, DeployError> {
        self.http
            .post(&self.path("deployments"), self.token(), deployment)
            .await
    }

    async fn list_deployment_statuses(
        &self,
        deployment_id: u64,
    ) -> Result<Vec<DeploymentStatus>, DeployError> {
        let path = self.path(&format!("deployments/{}/statuses", deployment_id));
        self.http.get(&path, &[], self.token()).await
    }

    async fn create_deployment_status(
        &self,
        deployment_id: u64,
        status: &NewDeploymentStatus,
    ) -> Result<(), DeployError> {
        let path = self.path(&format!("deployments/{}/statuses", deployment_id));
        let _: IgnoredAny = self.http.post(&path, self.token(), status).await?;
        Ok(())
    }
}

/// [`ApiProvider`] backed by the installation token cache
pub struct GitHubProvider {
    http: Arc<HttpClient>,
    token_mngr: Arc<TokenManager>,
}

impl GitHubProvider {
    pub fn new(http: Arc<HttpClient>, token_mngr: Arc<TokenManager>) -> Self {
        Self { http, token_mngr }
    }
}

#[async_trait]
impl ApiProvider for GitHubProvider {
    async fn for_installation(
        &self,
        installation_id: Option<u64>,
        repo: &Repo,
    ) -> Result<Arc<dyn GitHubApi>, DeployError> {
        let installation_id = match installation_id {
            Some(id) => id,
            None => self.token_mngr.installation_id(repo).await?,
        };

        let token = self.token_mngr.get_token(installation_id).await?;
        Ok(Arc::new(GitHubClient::new(
            self.http.clone(),
            repo.clone(),
            token.token,
        )))
    }
}
