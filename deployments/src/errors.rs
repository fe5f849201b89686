//! Error types for the deployments app

use thiserror::Error;

/// Main error type for the deployments app
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Duplicate deployment definition '{id}' in {}", .paths.join(", "))]
    DuplicateDefinition { id: String, paths: Vec<String> },

    #[error("Resource creation error: {0}")]
    ResourceCreation(String),

    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// Wrap a remote failure that happened while creating or updating `what`
    pub fn resource(what: &str, err: DeployError) -> Self {
        match err {
            DeployError::ResourceCreation(_) => err,
            other => DeployError::ResourceCreation(format!("{what}: {other}")),
        }
    }

    /// Whether the failure is worth retrying on an idempotent call
    pub fn is_transient(&self) -> bool {
        match self {
            DeployError::TransientNetwork(_) => true,
            DeployError::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}

impl From<anyhow::Error> for DeployError {
    fn from(err: anyhow::Error) -> Self {
        DeployError::Internal(err.to_string())
    }
}
