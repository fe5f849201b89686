//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::server::state::ServerState;
use crate::utils::{generate_uuid, version_info};
use crate::webhooks::{WebhookEvent, WebhookResponse};

pub const DELIVERY_HEADER: &str = "x-github-delivery";
pub const EVENT_HEADER: &str = "x-github-event";
pub const SIGNATURE_256_HEADER: &str = "x-hub-signature-256";
pub const SIGNATURE_HEADER: &str = "x-hub-signature";

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub git_hash: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "deployments".to_string(),
        version: version.version,
        git_hash: version.git_hash,
    })
}

/// Webhook handler
pub async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookResponse>) {
    let event = WebhookEvent {
        delivery_id: header(&headers, DELIVERY_HEADER).unwrap_or_else(generate_uuid),
        name: header(&headers, EVENT_HEADER).unwrap_or_default(),
        signature: header(&headers, SIGNATURE_256_HEADER)
            .or_else(|| header(&headers, SIGNATURE_HEADER))
            .unwrap_or_default(),
        payload: body.to_vec(),
    };

    match state.webhooks.receive(event).await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => {
            error!("Webhook failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookResponse {
                    message: e.to_string(),
                }),
            )
        }
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
