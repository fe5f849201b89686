//! GitHub App API client

use async_trait::async_trait;
use github_models::{AccessTokenResponse, InstallationResponse};
use secrecy::SecretString;
use serde_json::json;

use crate::authn::token_mngr::{InstallationToken, TokenExchange};
use crate::errors::DeployError;
use crate::github::Repo;
use crate::http::client::HttpClient;

impl HttpClient {
    /// Create an installation access token
    pub async fn create_installation_token(
        &self,
        installation_id: u64,
        app_jwt: &str,
    ) -> Result<AccessTokenResponse, DeployError> {
        let path = format!("/app/installations/{}/access_tokens", installation_id);
        self.post(&path, app_jwt, &json!({})).await
    }

    /// Get the App installation of a repository
    pub async fn get_repo_installation(
        &self,
        repo: &Repo,
        app_jwt: &str,
    ) -> Result<InstallationResponse, DeployError> {
        let path = format!("/repos/{}/{}/installation", repo.owner, repo.name);
        self.get(&path, &[], app_jwt).await
    }
}

#[async_trait]
impl TokenExchange for HttpClient {
    async fn exchange(
        &self,
        app_jwt: &str,
        installation_id: u64,
    ) -> Result<InstallationToken, DeployError> {
        let response = self.create_installation_token(installation_id, app_jwt).await?;
        Ok(InstallationToken {
            token: SecretString::from(response.token),
            expires_at: response.expires_at,
        })
    }

    async fn installation_for_repo(&self, app_jwt: &str, repo: &Repo) -> Result<u64, DeployError> {
        Ok(self.get_repo_installation(repo, app_jwt).await?.id)
    }
}
