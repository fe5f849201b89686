//! Decoding stage reports out of webhook payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::deploy::orchestrator::{StageEvent, StageStatus};
use crate::errors::DeployError;

/// Where stage reports arrive and where their fields live
///
/// Field locations are JSON pointers into the webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageEventSchema {
    pub event_name: String,
    pub deployment_id: String,
    pub stage: String,
    pub status: String,
    pub artifact: String,
    pub reason: String,
}

impl Default for StageEventSchema {
    fn default() -> Self {
        Self {
            event_name: "repository_dispatch".to_string(),
            deployment_id: "/client_payload/deployment_id".to_string(),
            stage: "/client_payload/stage".to_string(),
            status: "/client_payload/status".to_string(),
            artifact: "/client_payload/artifact".to_string(),
            reason: "/client_payload/reason".to_string(),
        }
    }
}

impl StageEventSchema {
    /// Read a stage report from `payload`
    pub fn extract(&self, payload: &Value) -> Result<StageEvent, DeployError> {
        let deployment_id = required(payload, &self.deployment_id)?;
        let deployment_id = deployment_id
            .as_u64()
            .or_else(|| deployment_id.as_str().and_then(|s| s.parse().ok()))
            .ok_or_else(|| invalid(&self.deployment_id, "a deployment id"))?;

        let stage = required(payload, &self.stage)?
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid(&self.stage, "a stage name"))?
            .to_string();

        let status: StageStatus = required(payload, &self.status)?
            .as_str()
            .ok_or_else(|| invalid(&self.status, "a stage status"))?
            .parse()?;

        let artifact = payload
            .pointer(&self.artifact)
            .filter(|value| !value.is_null())
            .cloned();
        let reason = payload
            .pointer(&self.reason)
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(StageEvent {
            deployment_id,
            stage,
            status,
            artifact,
            reason,
        })
    }
}

fn required<'a>(payload: &'a Value, pointer: &str) -> Result<&'a Value, DeployError> {
    payload
        .pointer(pointer)
        .filter(|value| !value.is_null())
        .ok_or_else(|| DeployError::Validation(format!("stage event is missing '{}'", pointer)))
}

fn invalid(pointer: &str, expected: &str) -> DeployError {
    DeployError::Validation(format!("'{}' is not {}", pointer, expected))
}
