//! Webhook payload models

use serde::{Deserialize, Serialize};

/// Installation reference carried by App webhooks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationRef {
    pub id: u64,
}

/// Repository owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Owner {
    pub login: String,
}

/// Repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub owner: Owner,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Head commit of a push
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Push webhook payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub after: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub head_commit: Option<Commit>,
    pub repository: Repository,
    #[serde(default)]
    pub installation: Option<InstallationRef>,
}

impl PushEvent {
    /// Commit the push moved the ref to
    pub fn head_sha(&self) -> &str {
        self.head_commit
            .as_ref()
            .map(|commit| commit.id.as_str())
            .unwrap_or(&self.after)
    }
}

/// Minimal envelope shared by every App webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(default)]
    pub repository: Option<Repository>,
    #[serde(default)]
    pub installation: Option<InstallationRef>,
}
