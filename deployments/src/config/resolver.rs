//! Deployment configuration resolution

use std::collections::BTreeMap;

use futures::future::join_all;
use github_models::{ContentEntry, ContentKind};
use tracing::{debug, info, warn};

use crate::config::definition::{decode_content, DeploymentDefinition, WorkflowDefinition};
use crate::errors::DeployError;
use crate::github::GitHubApi;

/// Location of workflow files
pub const WORKFLOWS_DIR: &str = ".github/workflows";

/// Location of deployment definitions
pub const DEPLOYMENTS_DIR: &str = ".github/deployments";

/// Trigger a workflow must declare for deployments to be wired up
pub const DEPLOYMENT_TRIGGER: &str = "deployment";

/// Definitions resolved for one event
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Workflow files triggered by deployments
    pub workflows: Vec<WorkflowDefinition>,

    /// Definitions triggered by the current event
    pub definitions: Vec<DeploymentDefinition>,
}

impl Resolution {
    /// Whether a workflow exists that runs deployments
    pub fn is_wired(&self) -> bool {
        !self.workflows.is_empty()
    }
}

/// Reads and matches pipeline documents at a commit
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    workflows_dir: String,
    deployments_dir: String,
}

impl Default for ConfigResolver {
    fn default() -> Self {
        Self {
            workflows_dir: WORKFLOWS_DIR.to_string(),
            deployments_dir: DEPLOYMENTS_DIR.to_string(),
        }
    }
}

impl ConfigResolver {
    pub fn new(workflows_dir: impl Into<String>, deployments_dir: impl Into<String>) -> Self {
        Self {
            workflows_dir: workflows_dir.into(),
            deployments_dir: deployments_dir.into(),
        }
    }

    /// Resolve the workflows and deployment definitions for `event` at `git_ref`
    pub async fn resolve(
        &self,
        api: &dyn GitHubApi,
        git_ref: &str,
        event: &str,
    ) -> Result<Resolution, DeployError> {
        let (workflows, definitions) = futures::try_join!(
            self.resolve_workflows(api, git_ref),
            self.resolve_definitions(api, git_ref, event),
        )?;

        info!(
            repo = %api.repo(),
            git_ref,
            workflows = workflows.len(),
            definitions = definitions.len(),
            "Resolved deployment configuration"
        );

        Ok(Resolution {
            workflows,
            definitions,
        })
    }

    async fn resolve_workflows(
        &self,
        api: &dyn GitHubApi,
        git_ref: &str,
    ) -> Result<Vec<WorkflowDefinition>, DeployError> {
        let sources = fetch_documents(api, &self.workflows_dir, git_ref).await?;

        Ok(sources
            .into_iter()
            .filter_map(|(path, source)| match WorkflowDefinition::parse(&path, &source) {
                Ok(workflow) => Some(workflow),
                Err(e) => {
                    warn!("Skipping workflow: {}", e);
                    None
                }
            })
            .filter(|workflow| workflow.on.matches(DEPLOYMENT_TRIGGER))
            .collect())
    }

    async fn resolve_definitions(
        &self,
        api: &dyn GitHubApi,
        git_ref: &str,
        event: &str,
    ) -> Result<Vec<DeploymentDefinition>, DeployError> {
        let sources = fetch_documents(api, &self.deployments_dir, git_ref).await?;

        let definitions: Vec<DeploymentDefinition> = sources
            .into_iter()
            .filter_map(|(path, source)| match DeploymentDefinition::parse(&path, &source) {
                Ok(definition) => Some(definition),
                Err(e) => {
                    warn!("Skipping deployment definition: {}", e);
                    None
                }
            })
            .collect();

        ensure_unique_ids(&definitions)?;

        Ok(definitions
            .into_iter()
            .filter(|definition| definition.trigger.matches(event))
            .collect())
    }
}

fn ensure_unique_ids(definitions: &[DeploymentDefinition]) -> Result<(), DeployError> {
    let mut by_id: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for definition in definitions {
        by_id
            .entry(definition.id.as_str())
            .or_default()
            .push(definition.path.clone());
    }

    match by_id.into_iter().find(|(_, paths)| paths.len() > 1) {
        Some((id, paths)) => Err(DeployError::DuplicateDefinition {
            id: id.to_string(),
            paths,
        }),
        None => Ok(()),
    }
}

/// Fetch and decode every YAML file of a directory
///
/// A missing directory yields no documents. Undecodable files are skipped; transport
/// failures are returned.
async fn fetch_documents(
    api: &dyn GitHubApi,
    dir: &str,
    git_ref: &str,
) -> Result<Vec<(String, String)>, DeployError> {
    let entries = match api.list_contents(dir, git_ref).await {
        Ok(entries) => entries,
        Err(DeployError::NotFound(_)) => {
            debug!("{} does not exist at {}", dir, git_ref);
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let files: Vec<ContentEntry> = entries.into_iter().filter(is_yaml_file).collect();
    let fetched = join_all(files.iter().map(|entry| api.get_content(&entry.path, git_ref))).await;

    let mut documents = Vec::with_capacity(fetched.len());
    for (entry, result) in files.iter().zip(fetched) {
        let file = match result {
            Ok(file) => file,
            Err(DeployError::NotFound(_)) => {
                warn!("{} disappeared while resolving {}", entry.path, git_ref);
                continue;
            }
            Err(e) => return Err(e),
        };
        match decode_content(&file) {
            Ok(source) => documents.push((entry.path.clone(), source)),
            Err(e) => warn!("Skipping undecodable file: {}", e),
        }
    }

    // Stable order regardless of listing order
    documents.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(documents)
}

fn is_yaml_file(entry: &ContentEntry) -> bool {
    entry.kind == ContentKind::File
        && (entry.name.ends_with(".yml") || entry.name.ends_with(".yaml"))
}
