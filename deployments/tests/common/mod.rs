#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use github_models::{
    CheckRun, CheckRunPatch, CheckStatus, CheckSuite, ContentEntry, ContentFile, ContentKind, Deployment,
    DeploymentStatus, DeploymentStatusState, NewCheckRun, NewDeployment, NewDeploymentStatus,
};
use secrecy::SecretString;
use serde_json::{json, Value};

use deployments::authn::signature::{SignatureAlgorithm, SignatureVerifier};
use deployments::config::resolver::ConfigResolver;
use deployments::deploy::orchestrator::Orchestrator;
use deployments::errors::DeployError;
use deployments::github::{ApiProvider, GitHubApi, Repo};
use deployments::webhooks::stage::StageEventSchema;
use deployments::webhooks::{WebhookEvent, Webhooks};

pub const APP_ID: u64 = 1234;
pub const SECRET: &str = "secret";
pub const COMMIT: &str = "da4b9237bacccdf19c0760cab7aec4a8359010b0";

pub const DEPLOY_WORKFLOW: &str = "name: Deploy\non: deployment\njobs:\n  deploy:\n    runs-on: ubuntu-latest\n    steps:\n      - run: echo deploying\n";
pub const VALID_DEFINITION: &str =
    "id: valid\nname: valid\ndescription: The valid deployment configuration\non: push\n";

#[derive(Default)]
struct State {
    next_id: u64,
    files: BTreeMap<String, String>,
    suites: Vec<(u64, CheckSuite)>,
    runs: BTreeMap<u64, CheckRun>,
    refs: BTreeMap<String, String>,
    deployments: Vec<Deployment>,
    statuses: BTreeMap<u64, Vec<DeploymentStatus>>,
    calls: Vec<String>,
    failing: Vec<&'static str>,
    failing_completion: bool,
    hidden_suite_listings: usize,
}

impl State {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn call(&mut self, method: &'static str) -> Result<(), DeployError> {
        self.calls.push(method.to_string());
        if self.failing.contains(&method) {
            return Err(failure(method));
        }
        Ok(())
    }
}

fn failure(method: &str) -> DeployError {
    DeployError::Api {
        status: 500,
        message: format!("{method} failed"),
    }
}

/// In-memory repository implementing the GitHub contract
pub struct FakeGitHub {
    repo: Repo,
    state: Mutex<State>,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self {
            repo: Repo::new("ploys", "deployments"),
            state: Mutex::new(State::default()),
        }
    }

    /// Repository with the deploy workflow and the valid definition committed
    pub fn with_fixtures() -> Self {
        let fake = Self::new();
        fake.add_file(".github/workflows/deploy.yml", DEPLOY_WORKFLOW);
        fake.add_file(".github/deployments/valid.yml", VALID_DEFINITION);
        fake
    }

    pub fn add_file(&self, path: &str, content: &str) {
        let mut state = self.state.lock().unwrap();
        state.files.insert(path.to_string(), content.to_string());
    }

    pub fn fail(&self, method: &'static str) {
        self.state.lock().unwrap().failing.push(method);
    }

    /// Reject check run patches that complete the run
    pub fn fail_completion(&self) {
        self.state.lock().unwrap().failing_completion = true;
    }

    /// Stop failing calls
    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.failing.clear();
        state.failing_completion = false;
    }

    /// Answer the next suite listing with nothing, as if another delivery raced us
    pub fn miss_next_suite_listing(&self) {
        self.state.lock().unwrap().hidden_suite_listings += 1;
    }

    /// Mutating calls in order
    pub fn writes(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| call.starts_with("create") || call.starts_with("patch") || call.starts_with("update"))
            .cloned()
            .collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn check_suites(&self) -> Vec<CheckSuite> {
        let state = self.state.lock().unwrap();
        state.suites.iter().map(|(_, suite)| suite.clone()).collect()
    }

    pub fn add_foreign_suite(&self, sha: &str, app_id: u64) {
        let mut state = self.state.lock().unwrap();
        let id = state.id();
        state.suites.push((
            app_id,
            CheckSuite {
                id,
                head_sha: sha.to_string(),
                status: None,
            },
        ));
    }

    pub fn check_runs(&self) -> Vec<CheckRun> {
        self.state.lock().unwrap().runs.values().cloned().collect()
    }

    pub fn check_run(&self, id: u64) -> CheckRun {
        self.state.lock().unwrap().runs[&id].clone()
    }

    pub fn refs(&self) -> BTreeMap<String, String> {
        self.state.lock().unwrap().refs.clone()
    }

    pub fn deployments(&self) -> Vec<Deployment> {
        self.state.lock().unwrap().deployments.clone()
    }

    /// Statuses of a deployment, oldest first
    pub fn statuses(&self, deployment_id: u64) -> Vec<DeploymentStatusState> {
        let state = self.state.lock().unwrap();
        state
            .statuses
            .get(&deployment_id)
            .map(|statuses| statuses.iter().map(|s| s.state).collect())
            .unwrap_or_default()
    }
}

fn entry(path: &str) -> ContentEntry {
    let name = path.rsplit('/').next().unwrap_or(path).to_string();
    ContentEntry {
        kind: ContentKind::File,
        name,
        path: path.to_string(),
    }
}

#[async_trait]
impl GitHubApi for FakeGitHub {
    fn repo(&self) -> &Repo {
        &self.repo
    }

    async fn list_contents(
        &self,
        path: &str,
        _git_ref: &str,
    ) -> Result<Vec<ContentEntry>, DeployError> {
        let mut state = self.state.lock().unwrap();
        state.call("list_contents")?;
        let prefix = format!("{}/", path);
        let entries: Vec<ContentEntry> = state
            .files
            .keys()
            .filter(|file| file.starts_with(&prefix) && !file[prefix.len()..].contains('/'))
            .map(|file| entry(file))
            .collect();
        if entries.is_empty() {
            return Err(DeployError::NotFound(path.to_string()));
        }
        Ok(entries)
    }

    async fn get_content(&self, path: &str, _git_ref: &str) -> Result<ContentFile, DeployError> {
        let mut state = self.state.lock().unwrap();
        state.call("get_content")?;
        let content = state
            .files
            .get(path)
            .ok_or_else(|| DeployError::NotFound(path.to_string()))?;
        let entry = entry(path);
        Ok(ContentFile {
            kind: entry.kind,
            name: entry.name,
            path: entry.path,
            encoding: Some("base64".to_string()),
            content: Some(STANDARD.encode(content)),
        })
    }

    async fn list_check_suites(
        &self,
        sha: &str,
        app_id: u64,
    ) -> Result<Vec<CheckSuite>, DeployError> {
        let mut state = self.state.lock().unwrap();
        state.call("list_check_suites")?;
        if state.hidden_suite_listings > 0 {
            state.hidden_suite_listings -= 1;
            return Ok(Vec::new());
        }
        Ok(state
            .suites
            .iter()
            .filter(|(owner, suite)| *owner == app_id && suite.head_sha == sha)
            .map(|(_, suite)| suite.clone())
            .collect())
    }

    async fn create_check_suite(&self, sha: &str) -> Result<(), DeployError> {
        let mut state = self.state.lock().unwrap();
        state.call("create_check_suite")?;
        if state
            .suites
            .iter()
            .any(|(owner, suite)| *owner == APP_ID && suite.head_sha == sha)
        {
            return Err(DeployError::Unprocessable("Check suite already exists".into()));
        }
        let id = state.id();
        let suite = CheckSuite {
            id,
            head_sha: sha.to_string(),
            status: None,
        };
        state.suites.push((APP_ID, suite));
        Ok(())
    }

    async fn create_check_run(&self, run: &NewCheckRun) -> Result<CheckRun, DeployError> {
        let mut state = self.state.lock().unwrap();
        state.call("create_check_run")?;
        let id = state.id();
        let run = CheckRun {
            id,
            name: Some(run.name.clone()),
            head_sha: Some(run.head_sha.clone()),
            external_id: Some(run.external_id.clone()),
            status: Some(run.status),
            conclusion: None,
            output: run.output.clone(),
        };
        state.runs.insert(id, run.clone());
        Ok(run)
    }

    async fn get_check_run(&self, check_run_id: u64) -> Result<CheckRun, DeployError> {
        let mut state = self.state.lock().unwrap();
        state.call("get_check_run")?;
        state
            .runs
            .get(&check_run_id)
            .cloned()
            .ok_or_else(|| DeployError::NotFound(format!("check run {check_run_id}")))
    }

    async fn patch_check_run(
        &self,
        check_run_id: u64,
        patch: &CheckRunPatch,
    ) -> Result<(), DeployError> {
        let mut state = self.state.lock().unwrap();
        state.call("patch_check_run")?;
        if state.failing_completion && patch.status == Some(CheckStatus::Completed) {
            return Err(failure("patch_check_run"));
        }
        let run = state
            .runs
            .get_mut(&check_run_id)
            .ok_or_else(|| DeployError::NotFound(format!("check run {check_run_id}")))?;
        if patch.status.is_some() {
            run.status = patch.status;
        }
        if patch.conclusion.is_some() {
            run.conclusion = patch.conclusion;
        }
        if patch.output.is_some() {
            run.output = patch.output.clone();
        }
        Ok(())
    }

    async fn create_ref(&self, git_ref: &str, sha: &str) -> Result<(), DeployError> {
        let mut state = self.state.lock().unwrap();
        state.call("create_ref")?;
        if state.refs.contains_key(git_ref) {
            return Err(DeployError::Unprocessable("Reference already exists".into()));
        }
        state.refs.insert(git_ref.to_string(), sha.to_string());
        Ok(())
    }

    async fn update_ref(&self, git_ref: &str, sha: &str) -> Result<(), DeployError> {
        let mut state = self.state.lock().unwrap();
        state.call("update_ref")?;
        match state.refs.get_mut(git_ref) {
            Some(target) => {
                *target = sha.to_string();
                Ok(())
            }
            None => Err(DeployError::NotFound(git_ref.to_string())),
        }
    }

    async fn list_deployments(
        &self,
        sha: &str,
        environment: &str,
    ) -> Result<Vec<Deployment>, DeployError> {
        let mut state = self.state.lock().unwrap();
        state.call("list_deployments")?;
        Ok(state
            .deployments
            .iter()
            .rev()
            .filter(|d| d.sha.as_deref() == Some(sha) && d.environment.as_deref() == Some(environment))
            .cloned()
            .collect())
    }

    async fn get_deployment(&self, deployment_id: u64) -> Result<Deployment, DeployError> {
        let mut state = self.state.lock().unwrap();
        state.call("get_deployment")?;
        state
            .deployments
            .iter()
            .find(|d| d.id == deployment_id)
            .cloned()
            .ok_or_else(|| DeployError::NotFound(format!("deployment {deployment_id}")))
    }

    async fn create_deployment(
        &self,
        deployment: &NewDeployment,
    ) -> Result<Deployment, DeployError> {
        let mut state = self.state.lock().unwrap();
        state.call("create_deployment")?;
        let sha = state
            .refs
            .get(&format!("refs/heads/{}", deployment.git_ref))
            .cloned()
            .ok_or_else(|| DeployError::Unprocessable(format!("No ref {}", deployment.git_ref)))?;
        let id = state.id();
        let created = Deployment {
            id,
            sha: Some(sha),
            git_ref: Some(deployment.git_ref.clone()),
            environment: Some(deployment.environment.clone()),
            payload: deployment.payload.clone(),
        };
        state.deployments.push(created.clone());
        Ok(created)
    }

    async fn list_deployment_statuses(
        &self,
        deployment_id: u64,
    ) -> Result<Vec<DeploymentStatus>, DeployError> {
        let mut state = self.state.lock().unwrap();
        state.call("list_deployment_statuses")?;
        let mut statuses = state.statuses.get(&deployment_id).cloned().unwrap_or_default();
        statuses.reverse();
        Ok(statuses)
    }

    async fn create_deployment_status(
        &self,
        deployment_id: u64,
        status: &NewDeploymentStatus,
    ) -> Result<(), DeployError> {
        let mut state = self.state.lock().unwrap();
        state.call("create_deployment_status")?;
        let id = state.id();
        state
            .statuses
            .entry(deployment_id)
            .or_default()
            .push(DeploymentStatus {
                id,
                state: status.state,
                description: status.description.clone(),
            });
        Ok(())
    }
}

/// Provider handing out the same fake for every installation
pub struct FakeProvider {
    pub api: Arc<FakeGitHub>,
    pub calls: AtomicUsize,
}

impl FakeProvider {
    pub fn new(api: Arc<FakeGitHub>) -> Self {
        Self {
            api,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApiProvider for FakeProvider {
    async fn for_installation(
        &self,
        _installation_id: Option<u64>,
        _repo: &Repo,
    ) -> Result<Arc<dyn GitHubApi>, DeployError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.api.clone())
    }
}

pub fn orchestrator() -> Orchestrator {
    Orchestrator::new(APP_ID, ConfigResolver::default())
}

pub fn webhooks(provider: Arc<FakeProvider>) -> Webhooks {
    Webhooks::new(
        SignatureVerifier::new(SecretString::from(SECRET)),
        provider,
        orchestrator(),
        StageEventSchema::default(),
    )
}

pub fn push_payload(git_ref: &str, sha: &str) -> Value {
    json!({
        "ref": git_ref,
        "before": "0000000000000000000000000000000000000000",
        "after": sha,
        "deleted": false,
        "head_commit": {"id": sha, "message": "Update deployment configuration"},
        "repository": {
            "name": "deployments",
            "full_name": "ploys/deployments",
            "owner": {"login": "ploys"},
        },
        "installation": {"id": 1},
    })
}

pub fn stage_payload(deployment_id: u64, stage: &str, status: &str) -> Value {
    json!({
        "action": "stage",
        "client_payload": {
            "deployment_id": deployment_id,
            "stage": stage,
            "status": status,
        },
        "repository": {"name": "deployments", "owner": {"login": "ploys"}},
        "installation": {"id": 1},
    })
}

/// Delivery signed with the shared secret
pub fn signed(name: &str, payload: &Value) -> WebhookEvent {
    let payload = serde_json::to_vec(payload).unwrap();
    let signature = SignatureVerifier::new(SecretString::from(SECRET))
        .sign(SignatureAlgorithm::Sha256, &payload)
        .unwrap();
    WebhookEvent {
        delivery_id: "72d3162e-cc78-11e3-81ab-4c9367dc0958".to_string(),
        name: name.to_string(),
        signature,
        payload,
    }
}
