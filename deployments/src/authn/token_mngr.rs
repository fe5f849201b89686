//! Installation token manager

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::authn::app_jwt::AppJwtSigner;
use crate::errors::DeployError;
use crate::github::Repo;

/// An installation access token and its expiry
#[derive(Debug, Clone)]
pub struct InstallationToken {
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl InstallationToken {
    /// Check if the token expires within the given margin
    pub fn expires_within(&self, margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::MAX);
        match Utc::now().checked_add_signed(margin) {
            Some(deadline) => self.expires_at <= deadline,
            None => true,
        }
    }
}

/// Remote side of the App authentication flow
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchange an App assertion for an installation access token
    async fn exchange(&self, app_jwt: &str, installation_id: u64)
        -> Result<InstallationToken, DeployError>;

    /// Find the installation of the App on a repository
    async fn installation_for_repo(&self, app_jwt: &str, repo: &Repo) -> Result<u64, DeployError>;
}

/// Token manager trait for testability
#[async_trait]
pub trait TokenManagerExt: Send + Sync {
    /// Get a valid token for an installation
    async fn get_token(&self, installation_id: u64) -> Result<InstallationToken, DeployError>;

    /// Resolve the installation id for a repository
    async fn installation_id(&self, repo: &Repo) -> Result<u64, DeployError>;
}

/// Token manager implementation
///
/// Tokens are cached per installation. A refresh holds that installation's lock, so
/// concurrent callers for the same id wait for one exchange instead of issuing their own.
pub struct TokenManager {
    signer: AppJwtSigner,
    exchange: Arc<dyn TokenExchange>,
    safety_margin: Duration,
    cached_tokens: RwLock<HashMap<u64, InstallationToken>>,
    refresh_locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl TokenManager {
    /// Create a new token manager
    pub fn new(signer: AppJwtSigner, exchange: Arc<dyn TokenExchange>, safety_margin: Duration) -> Self {
        Self {
            signer,
            exchange,
            safety_margin,
            cached_tokens: RwLock::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn cached(&self, installation_id: u64) -> Option<InstallationToken> {
        let cached = self.cached_tokens.read().await;
        cached
            .get(&installation_id)
            .filter(|token| !token.expires_within(self.safety_margin))
            .cloned()
    }

    async fn refresh_lock(&self, installation_id: u64) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks.entry(installation_id).or_default().clone()
    }

    async fn refresh(&self, installation_id: u64) -> Result<InstallationToken, DeployError> {
        info!(installation_id, "Exchanging App assertion for installation token");

        let app_jwt = self.signer.sign()?;
        let token = self
            .exchange
            .exchange(&app_jwt, installation_id)
            .await
            .map_err(|e| match e {
                DeployError::Authentication(_) => e,
                other => DeployError::Authentication(format!(
                    "Token exchange for installation {} failed: {}",
                    installation_id, other
                )),
            })?;

        let mut cached = self.cached_tokens.write().await;
        cached.insert(installation_id, token.clone());

        debug!(installation_id, expires_at = %token.expires_at, "Installation token cached");
        Ok(token)
    }
}

#[async_trait]
impl TokenManagerExt for TokenManager {
    async fn get_token(&self, installation_id: u64) -> Result<InstallationToken, DeployError> {
        if let Some(token) = self.cached(installation_id).await {
            return Ok(token);
        }

        let lock = self.refresh_lock(installation_id).await;
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(token) = self.cached(installation_id).await {
            return Ok(token);
        }

        self.refresh(installation_id).await
    }

    async fn installation_id(&self, repo: &Repo) -> Result<u64, DeployError> {
        let app_jwt = self.signer.sign()?;
        self.exchange
            .installation_for_repo(&app_jwt, repo)
            .await
            .map_err(|e| DeployError::Authentication(format!("No installation for {}: {}", repo, e)))
    }
}
