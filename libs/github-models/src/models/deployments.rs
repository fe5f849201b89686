//! Git ref, deployment and deployment status models

use serde::{Deserialize, Serialize};

/// Git ref creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRef {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sha: String,
}

/// Git ref update request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefUpdate {
    pub sha: String,
    pub force: bool,
}

/// Deployment creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDeployment {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub environment: String,
    pub task: String,
    pub description: Option<String>,
    pub auto_merge: bool,
    pub required_contexts: Vec<String>,
    pub payload: serde_json::Value,
}

/// Deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: u64,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Deployment status state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatusState {
    Queued,
    InProgress,
    Pending,
    Success,
    Failure,
    Error,
    Inactive,
}

/// Deployment status creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDeploymentStatus {
    pub state: DeploymentStatusState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Deployment status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub id: u64,
    pub state: DeploymentStatusState,
    #[serde(default)]
    pub description: Option<String>,
}
