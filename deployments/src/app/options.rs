//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::http::client::RetryOptions;
use crate::webhooks::stage::StageEventSchema;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// GitHub App id
    pub app_id: u64,

    /// PEM encoded App private key
    pub private_key: SecretString,

    /// Shared webhook secret
    pub webhook_secret: SecretString,

    /// GitHub API client configuration
    pub api: ApiOptions,

    /// Tokens expiring within this margin are refreshed before use
    pub token_safety_margin: Duration,

    /// Server configuration
    pub server: ServerOptions,

    /// Where stage reports arrive
    pub stage_events: StageEventSchema,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl AppOptions {
    pub fn new(app_id: u64, private_key: SecretString, webhook_secret: SecretString) -> Self {
        Self {
            app_id,
            private_key,
            webhook_secret,
            api: ApiOptions::default(),
            token_safety_margin: Duration::from_secs(300), // 5 minutes
            server: ServerOptions::default(),
            stage_events: StageEventSchema::default(),
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// GitHub API client options
#[derive(Debug, Clone)]
pub struct ApiOptions {
    /// REST API base URL
    pub base_url: String,

    /// Per request timeout
    pub timeout: Duration,

    /// Retry policy for reads
    pub retry: RetryOptions,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryOptions::default(),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}
