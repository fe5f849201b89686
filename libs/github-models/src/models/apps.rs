//! GitHub App installation models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Installation access token response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Repository installation lookup response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationResponse {
    pub id: u64,
    #[serde(default)]
    pub app_id: Option<u64>,
}
