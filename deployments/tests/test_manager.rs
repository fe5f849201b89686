mod common;

use std::sync::Arc;

use github_models::DeploymentStatusState;

use common::FakeGitHub;
use deployments::deploy::manager::DeploymentManager;

#[tokio::test]
async fn test_status_is_posted_once_while_newest() {
    let fake = Arc::new(FakeGitHub::new());
    let manager = DeploymentManager::new(fake.clone());

    manager
        .post_status(7, DeploymentStatusState::Queued, None)
        .await
        .unwrap();
    manager
        .post_status(7, DeploymentStatusState::Queued, None)
        .await
        .unwrap();
    assert_eq!(fake.statuses(7), vec![DeploymentStatusState::Queued]);
    assert_eq!(fake.writes(), vec!["create_deployment_status"]);

    manager
        .post_status(7, DeploymentStatusState::InProgress, None)
        .await
        .unwrap();
    manager
        .post_status(7, DeploymentStatusState::InProgress, None)
        .await
        .unwrap();
    assert_eq!(
        fake.statuses(7),
        vec![DeploymentStatusState::Queued, DeploymentStatusState::InProgress]
    );
}
