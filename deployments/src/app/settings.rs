//! Settings loading
//!
//! Settings come from an optional JSON file, then environment variables override
//! individual fields.

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::app::options::{ApiOptions, AppOptions, ServerOptions};
use crate::errors::DeployError;
use crate::http::client::RetryOptions;
use crate::logs::{LogLevel, LogOptions};
use crate::webhooks::stage::StageEventSchema;

pub const ENV_APP_ID: &str = "DEPLOYMENTS_APP_ID";
pub const ENV_PRIVATE_KEY: &str = "DEPLOYMENTS_PRIVATE_KEY";
pub const ENV_WEBHOOK_SECRET: &str = "DEPLOYMENTS_WEBHOOK_SECRET";
pub const ENV_API_URL: &str = "DEPLOYMENTS_API_URL";
pub const ENV_LOG_LEVEL: &str = "DEPLOYMENTS_LOG_LEVEL";
pub const ENV_HOST: &str = "DEPLOYMENTS_HOST";
pub const ENV_PORT: &str = "DEPLOYMENTS_PORT";

/// App settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log level
    pub log_level: LogLevel,

    /// Emit JSON logs
    pub json_logs: bool,

    /// GitHub App id
    pub app_id: Option<u64>,

    /// PEM encoded App private key
    #[serde(deserialize_with = "deserialize_secret")]
    pub private_key: Option<SecretString>,

    /// Shared webhook secret
    #[serde(deserialize_with = "deserialize_secret")]
    pub webhook_secret: Option<SecretString>,

    /// GitHub API configuration
    pub api: ApiSettings,

    /// Server configuration
    pub server: ServerSettings,

    /// Refresh installation tokens this long before they expire
    pub token_safety_margin_secs: u64,

    /// Stage report location
    pub stage_events: StageEventSchema,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            app_id: None,
            private_key: None,
            webhook_secret: None,
            api: ApiSettings::default(),
            server: ServerSettings::default(),
            token_safety_margin_secs: 300,
            stage_events: StageEventSchema::default(),
        }
    }
}

/// GitHub API settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_read_attempts: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        let options = ApiOptions::default();
        Self {
            base_url: options.base_url,
            timeout_secs: options.timeout.as_secs(),
            max_read_attempts: options.retry.max_attempts,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let options = ServerOptions::default();
        Self {
            host: options.host,
            port: options.port,
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.map(SecretString::from))
}

impl Settings {
    /// Load settings from `path` (if any) and the process environment
    pub async fn load(path: Option<&Path>) -> Result<Self, DeployError> {
        let settings = match path {
            Some(path) => {
                let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                    DeployError::Config(format!("Unable to read {}: {}", path.display(), e))
                })?;
                Self::from_json(&content)?
            }
            None => Self::default(),
        };

        settings.with_env(|name| std::env::var(name).ok())
    }

    pub fn from_json(content: &str) -> Result<Self, DeployError> {
        serde_json::from_str(content)
            .map_err(|e| DeployError::Config(format!("Invalid settings file: {}", e)))
    }

    /// Override fields with the variables `lookup` returns
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, DeployError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_APP_ID) {
            self.app_id = Some(parse_var(ENV_APP_ID, &value)?);
        }
        if let Some(value) = lookup(ENV_PRIVATE_KEY) {
            // Keys passed through single-line env files keep their newlines escaped
            self.private_key = Some(SecretString::from(value.replace("\\n", "\n")));
        }
        if let Some(value) = lookup(ENV_WEBHOOK_SECRET) {
            self.webhook_secret = Some(SecretString::from(value));
        }
        if let Some(value) = lookup(ENV_API_URL) {
            self.api.base_url = value;
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.log_level = value.parse().map_err(DeployError::Config)?;
        }
        if let Some(value) = lookup(ENV_HOST) {
            self.server.host = value;
        }
        if let Some(value) = lookup(ENV_PORT) {
            self.server.port = parse_var(ENV_PORT, &value)?;
        }
        Ok(self)
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            log_level: self.log_level,
            json_format: self.json_logs,
        }
    }

    /// Validate and convert into [`AppOptions`]
    pub fn into_options(self) -> Result<AppOptions, DeployError> {
        let app_id = self.app_id.ok_or_else(|| missing(ENV_APP_ID))?;
        let private_key = self.private_key.ok_or_else(|| missing(ENV_PRIVATE_KEY))?;
        let webhook_secret = self.webhook_secret.ok_or_else(|| missing(ENV_WEBHOOK_SECRET))?;

        if self.api.max_read_attempts == 0 {
            return Err(DeployError::Config(
                "api.max_read_attempts must be at least 1".to_string(),
            ));
        }

        let mut options = AppOptions::new(app_id, private_key, webhook_secret);
        options.api = ApiOptions {
            base_url: self.api.base_url,
            timeout: Duration::from_secs(self.api.timeout_secs),
            retry: RetryOptions {
                max_attempts: self.api.max_read_attempts,
                ..Default::default()
            },
        };
        options.token_safety_margin = Duration::from_secs(self.token_safety_margin_secs);
        options.server = ServerOptions {
            host: self.server.host,
            port: self.server.port,
        };
        options.stage_events = self.stage_events;
        Ok(options)
    }
}

fn missing(name: &str) -> DeployError {
    DeployError::Config(format!("Expected environment variable '{}'", name))
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, DeployError> {
    value
        .trim()
        .parse()
        .map_err(|_| DeployError::Config(format!("Invalid value for {}: '{}'", name, value)))
}
