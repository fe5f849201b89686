//! Webhook intake
//!
//! Every delivery is authenticated before anything else happens. Authenticated
//! deliveries are routed by event name: pushes start deployments, stage reports advance
//! them, everything else is acknowledged and dropped.

pub mod stage;

use std::sync::Arc;

use github_models::{EventEnvelope, PushEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, Instrument};

use crate::authn::signature::SignatureVerifier;
use crate::deploy::orchestrator::Orchestrator;
use crate::errors::DeployError;
use crate::github::{ApiProvider, Repo};
use crate::webhooks::stage::StageEventSchema;

/// Branch namespace the app writes deployment refs into
pub const DEPLOYMENT_REFS_PREFIX: &str = "refs/heads/deployments/";

/// An inbound delivery as received by the transport
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub delivery_id: String,
    pub name: String,
    pub signature: String,
    pub payload: Vec<u8>,
}

/// Reply for a handled delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub message: String,
}

impl WebhookResponse {
    pub fn executed() -> Self {
        Self {
            message: "Executed".to_string(),
        }
    }
}

/// Authenticates and dispatches deliveries
pub struct Webhooks {
    verifier: SignatureVerifier,
    provider: Arc<dyn ApiProvider>,
    orchestrator: Orchestrator,
    stage_schema: StageEventSchema,
}

impl Webhooks {
    pub fn new(
        verifier: SignatureVerifier,
        provider: Arc<dyn ApiProvider>,
        orchestrator: Orchestrator,
        stage_schema: StageEventSchema,
    ) -> Self {
        Self {
            verifier,
            provider,
            orchestrator,
            stage_schema,
        }
    }

    /// Handle one delivery
    pub async fn receive(&self, event: WebhookEvent) -> Result<WebhookResponse, DeployError> {
        let span = info_span!(
            "webhook",
            delivery_id = %event.delivery_id,
            event = %event.name
        );
        self.dispatch(event).instrument(span).await
    }

    async fn dispatch(&self, event: WebhookEvent) -> Result<WebhookResponse, DeployError> {
        self.verifier.verify(&event.payload, &event.signature)?;

        match event.name.as_str() {
            "ping" => info!("Ping received"),
            "push" => self.on_push(&event.payload).await?,
            name if name == self.stage_schema.event_name => {
                self.on_stage_event(&event.payload).await?
            }
            name => debug!("Ignoring '{}' event", name),
        }

        Ok(WebhookResponse::executed())
    }

    async fn on_push(&self, payload: &[u8]) -> Result<(), DeployError> {
        let push: PushEvent = serde_json::from_slice(payload)
            .map_err(|e| DeployError::Validation(format!("push payload: {}", e)))?;

        if push.deleted {
            info!(git_ref = %push.git_ref, "Ignoring branch deletion");
            return Ok(());
        }
        if push.git_ref.starts_with(DEPLOYMENT_REFS_PREFIX) {
            debug!(git_ref = %push.git_ref, "Ignoring push to a deployment ref");
            return Ok(());
        }

        let repo = Repo::new(&push.repository.owner.login, &push.repository.name);
        let api = self
            .provider
            .for_installation(push.installation.as_ref().map(|i| i.id), &repo)
            .await?;

        let outcomes = self.orchestrator.on_push(api, &push).await?;
        info!(repo = %repo, sha = push.head_sha(), deployments = outcomes.len(), "Push handled");
        Ok(())
    }

    async fn on_stage_event(&self, payload: &[u8]) -> Result<(), DeployError> {
        let value: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| DeployError::Validation(format!("stage payload: {}", e)))?;
        let envelope: EventEnvelope = serde_json::from_value(value.clone())
            .map_err(|e| DeployError::Validation(format!("stage payload: {}", e)))?;
        let repository = envelope.repository.ok_or_else(|| {
            DeployError::Validation("stage event has no repository".to_string())
        })?;

        let stage_event = self.stage_schema.extract(&value)?;

        let repo = Repo::new(&repository.owner.login, &repository.name);
        let api = self
            .provider
            .for_installation(envelope.installation.map(|i| i.id), &repo)
            .await?;

        let state = self.orchestrator.on_stage_event(api, &stage_event).await?;
        info!(
            repo = %repo,
            deployment = stage_event.deployment_id,
            ?state,
            "Stage event handled"
        );
        Ok(())
    }
}
