//! Repository-committed pipeline documents
//!
//! Two kinds of documents are read from a repository: workflow files, of which only
//! the trigger matters, and deployment definitions. Both are validated when parsed so
//! later stages only ever see well-formed values.

use std::collections::{BTreeMap, HashSet};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use github_models::ContentFile;
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Stage list used when a definition does not declare one
pub const DEFAULT_STAGE: &str = "deploy";

/// The `on` field of a document
///
/// Accepts the same three spellings GitHub workflows do: a single event name, a list of
/// names, or a map keyed by event name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Trigger {
    Event(String),
    Events(Vec<String>),
    Filtered(BTreeMap<String, serde_yaml::Value>),
}

impl Trigger {
    /// Whether the trigger fires for `event`
    pub fn matches(&self, event: &str) -> bool {
        match self {
            Trigger::Event(name) => name == event,
            Trigger::Events(names) => names.iter().any(|name| name == event),
            Trigger::Filtered(map) => map.contains_key(event),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Trigger::Event(name) => name.trim().is_empty(),
            Trigger::Events(names) => names.is_empty(),
            Trigger::Filtered(map) => map.is_empty(),
        }
    }
}

/// A workflow file; only its trigger is read
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(skip)]
    pub path: String,

    pub on: Trigger,
}

impl WorkflowDefinition {
    pub fn parse(path: &str, source: &str) -> Result<Self, DeployError> {
        let mut workflow: WorkflowDefinition = serde_yaml::from_str(source)
            .map_err(|e| DeployError::Config(format!("{}: {}", path, e)))?;

        if workflow.on.is_empty() {
            return Err(DeployError::Config(format!("{}: empty 'on' trigger", path)));
        }

        workflow.path = path.to_string();
        Ok(workflow)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefinition {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    on: Trigger,
    #[serde(default)]
    stages: Option<Vec<String>>,
}

/// A deployment definition
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentDefinition {
    pub path: String,
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub trigger: Trigger,
    pub stages: Vec<String>,
}

impl DeploymentDefinition {
    /// Parse and validate a definition document
    pub fn parse(path: &str, source: &str) -> Result<Self, DeployError> {
        let invalid = |reason: String| DeployError::Config(format!("{}: {}", path, reason));

        let raw: RawDefinition = serde_yaml::from_str(source).map_err(|e| invalid(e.to_string()))?;

        validate_id(&raw.id).map_err(invalid)?;
        if raw.name.trim().is_empty() {
            return Err(invalid("'name' must not be empty".to_string()));
        }
        if raw.on.is_empty() {
            return Err(invalid("empty 'on' trigger".to_string()));
        }

        let stages = raw
            .stages
            .unwrap_or_else(|| vec![DEFAULT_STAGE.to_string()]);
        if stages.is_empty() {
            return Err(invalid("'stages' must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for stage in &stages {
            if stage.trim().is_empty() {
                return Err(invalid("stage names must not be empty".to_string()));
            }
            if !seen.insert(stage.as_str()) {
                return Err(invalid(format!("stage '{}' is declared twice", stage)));
            }
        }

        Ok(Self {
            path: path.to_string(),
            id: raw.id,
            name: raw.name,
            description: raw.description,
            trigger: raw.on,
            stages,
        })
    }

    /// Branch name the deployment ref is created under
    pub fn branch(&self) -> String {
        format!("deployments/{}", self.id)
    }
}

// Ids end up in `refs/heads/deployments/{id}` and as environment names
fn validate_id(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("'id' must not be empty".to_string());
    }
    if id.starts_with('.') || id.ends_with(".lock") || id.contains("..") {
        return Err(format!("'id' {:?} is not a valid ref name", id));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(format!(
            "'id' {:?} may only contain letters, digits, '-', '_' and '.'",
            id
        ));
    }
    Ok(())
}

/// Decode the stored content of a file
pub fn decode_content(file: &ContentFile) -> Result<String, DeployError> {
    let invalid = |reason: &str| DeployError::Config(format!("{}: {}", file.path, reason));

    match file.encoding.as_deref() {
        Some("base64") => {}
        Some(other) => return Err(invalid(&format!("unsupported encoding '{}'", other))),
        None => return Err(invalid("missing content encoding")),
    }

    let encoded = file.content.as_deref().ok_or_else(|| invalid("missing content"))?;
    // GitHub wraps base64 content at 60 columns
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| invalid(&format!("invalid base64: {}", e)))?;

    String::from_utf8(bytes).map_err(|_| invalid("content is not UTF-8"))
}
