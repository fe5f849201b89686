//! Deployment plans

use serde::{Deserialize, Serialize};

use crate::config::definition::DeploymentDefinition;

/// Stage-progress of one deployment
///
/// `stages` is fixed when the plan is created. `completed_stages` only ever holds names
/// from `stages` and is kept in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_run_id: Option<u64>,

    pub stages: Vec<String>,

    #[serde(default)]
    pub completed_stages: Vec<String>,

    #[serde(default)]
    pub artifacts: serde_json::Map<String, serde_json::Value>,
}

/// Mutable part of a plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanProgress {
    #[serde(default)]
    pub completed_stages: Vec<String>,

    #[serde(default)]
    pub artifacts: serde_json::Map<String, serde_json::Value>,
}

/// Result of recording a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// Newly recorded
    Added,
    /// Was already recorded, nothing changed
    Unchanged,
}

impl DeploymentPlan {
    pub fn has_stage(&self, stage: &str) -> bool {
        self.stages.iter().any(|s| s == stage)
    }

    pub fn is_completed(&self, stage: &str) -> bool {
        self.completed_stages.iter().any(|s| s == stage)
    }

    /// Whether every declared stage has completed
    pub fn is_complete(&self) -> bool {
        self.stages.iter().all(|stage| self.is_completed(stage))
    }

    /// Record a completed stage and its artifact
    ///
    /// Returns `None` when `stage` is not part of the plan.
    pub fn record_completion(
        &mut self,
        stage: &str,
        artifact: Option<serde_json::Value>,
    ) -> Option<Recorded> {
        if !self.has_stage(stage) {
            return None;
        }
        if self.is_completed(stage) {
            return Some(Recorded::Unchanged);
        }

        self.completed_stages.push(stage.to_string());
        let stages = &self.stages;
        self.completed_stages
            .sort_by_key(|s| stages.iter().position(|declared| declared == s));

        if let Some(artifact) = artifact {
            self.artifacts.insert(stage.to_string(), artifact);
        }

        Some(Recorded::Added)
    }

    pub fn progress(&self) -> PlanProgress {
        PlanProgress {
            completed_stages: self.completed_stages.clone(),
            artifacts: self.artifacts.clone(),
        }
    }

    /// Overlay stored progress, dropping anything outside the declared stages
    pub fn apply_progress(&mut self, progress: PlanProgress) {
        for stage in progress.completed_stages {
            let artifact = progress.artifacts.get(&stage).cloned();
            self.record_completion(&stage, artifact);
        }
    }

    /// Stages still to run, in declared order
    pub fn remaining(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|stage| !self.is_completed(stage))
            .map(String::as_str)
            .collect()
    }
}

/// Builds plans from definitions
#[derive(Debug, Clone, Copy, Default)]
pub struct DeploymentPlanner;

impl DeploymentPlanner {
    /// Fresh plan for `definition` at `head_sha`
    pub fn plan(&self, definition: &DeploymentDefinition, head_sha: &str) -> DeploymentPlan {
        tracing::debug!(
            definition = %definition.id,
            head_sha,
            stages = ?definition.stages,
            "Planning deployment"
        );

        DeploymentPlan {
            check_run_id: None,
            stages: definition.stages.clone(),
            completed_stages: Vec::new(),
            artifacts: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan(stages: &[&str]) -> DeploymentPlan {
        let definition = DeploymentDefinition::parse(
            "web.yml",
            &format!("id: web\nname: Web\non: push\nstages: [{}]\n", stages.join(", ")),
        )
        .unwrap();
        DeploymentPlanner.plan(&definition, "abc")
    }

    #[test]
    fn test_plan_payload_shape() {
        let mut plan = plan(&["deploy"]);
        plan.check_run_id = Some(1);

        assert_eq!(
            serde_json::to_value(&plan).unwrap(),
            json!({
                "check_run_id": 1,
                "stages": ["deploy"],
                "completed_stages": [],
                "artifacts": {},
            })
        );
    }

    #[test]
    fn test_out_of_order_completion_keeps_declared_order() {
        let mut plan = plan(&["build", "test", "release"]);

        assert_eq!(
            plan.record_completion("release", Some(json!({"url": "x"}))),
            Some(Recorded::Added)
        );
        assert_eq!(plan.record_completion("build", None), Some(Recorded::Added));
        assert_eq!(plan.completed_stages, vec!["build", "release"]);
        assert_eq!(plan.remaining(), vec!["test"]);
        assert!(!plan.is_complete());

        plan.record_completion("test", None);
        assert!(plan.is_complete());
        assert_eq!(plan.artifacts.get("release"), Some(&json!({"url": "x"})));
    }

    #[test]
    fn test_repeated_completion_is_unchanged() {
        let mut plan = plan(&["build"]);
        plan.record_completion("build", Some(json!(1)));

        assert_eq!(
            plan.record_completion("build", Some(json!(2))),
            Some(Recorded::Unchanged)
        );
        assert_eq!(plan.completed_stages, vec!["build"]);
        assert_eq!(plan.artifacts.get("build"), Some(&json!(1)));
    }

    #[test]
    fn test_unknown_stage_is_rejected() {
        let mut plan = plan(&["build"]);
        assert_eq!(plan.record_completion("deploy", None), None);
        assert!(plan.completed_stages.is_empty());
    }

    #[test]
    fn test_apply_progress_drops_foreign_stages() {
        let mut plan = plan(&["build", "test"]);
        let mut artifacts = serde_json::Map::new();
        artifacts.insert("test".into(), json!("report"));
        plan.apply_progress(PlanProgress {
            completed_stages: vec!["test".into(), "ghost".into()],
            artifacts,
        });

        assert_eq!(plan.completed_stages, vec!["test"]);
        assert_eq!(plan.artifacts.get("test"), Some(&json!("report")));
    }
}
