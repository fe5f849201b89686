//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::authn::app_jwt::AppJwtSigner;
use crate::authn::signature::SignatureVerifier;
use crate::authn::token_mngr::TokenManager;
use crate::config::resolver::ConfigResolver;
use crate::deploy::orchestrator::Orchestrator;
use crate::errors::DeployError;
use crate::http::client::HttpClient;
use crate::http::github::GitHubProvider;
use crate::webhooks::Webhooks;

/// Main application state
pub struct AppState {
    /// Webhook intake
    pub webhooks: Arc<Webhooks>,
}

impl AppState {
    /// Initialize application state
    pub fn init(options: &AppOptions) -> Result<Self, DeployError> {
        info!("Initializing application state...");

        let http_client = Arc::new(HttpClient::new(
            &options.api.base_url,
            options.api.timeout,
            options.api.retry.clone(),
        )?);

        let signer = AppJwtSigner::new(options.app_id, &options.private_key)?;
        let token_mngr = Arc::new(TokenManager::new(
            signer,
            http_client.clone(),
            options.token_safety_margin,
        ));

        let provider = Arc::new(GitHubProvider::new(http_client, token_mngr));
        let orchestrator = Orchestrator::new(options.app_id, ConfigResolver::default());
        let webhooks = Arc::new(Webhooks::new(
            SignatureVerifier::new(options.webhook_secret.clone()),
            provider,
            orchestrator,
            options.stage_events.clone(),
        ));

        Ok(Self { webhooks })
    }
}
