//! Content deployment through the facade.

mod common;

use liveops_content::domain::aggregates::{ContentStatus, RolloutPlan};
use liveops_content::domain::commands::{DeployContent, RollbackContent, SubmitContent};
use liveops_content::domain::validation::ValidationRule;
use liveops_core::error::DomainError;
use serde_json::json;
use uuid::Uuid;

fn submission(content_type: &str, rules: Vec<ValidationRule>) -> SubmitContent {
    SubmitContent {
        correlation_id: Uuid::new_v4(),
        content_type: content_type.into(),
        payload_ref: format!("cdn://{content_type}/v1.zip"),
        manifest: json!({"levels": 12, "theme": "spring"}),
        checksum: None,
        rules,
        dependencies: Vec::new(),
        rollout_plan: RolloutPlan::Full,
    }
}

fn deploy(version_id: Uuid) -> DeployContent {
    DeployContent {
        correlation_id: Uuid::new_v4(),
        version_id,
    }
}

#[tokio::test]
async fn test_failed_first_rule_fails_version_and_deploy_is_rejected() {
    // Arrange
    let mut h = common::harness();
    let mut rx = h.engine.subscribe();
    let version_id = h
        .engine
        .submit_content(&submission(
            "level_pack",
            vec![
                ValidationRule::RequiredKeys {
                    keys: vec!["boss".into()],
                },
                ValidationRule::NonEmptyManifest,
            ],
        ))
        .unwrap();

    // Act
    let report = h.engine.tick().await;
    let result = h.engine.deploy_content(&deploy(version_id));

    // Assert
    let version = h.engine.content_version(version_id).unwrap();
    assert_eq!(version.status, ContentStatus::Failed);
    assert_eq!(version.validation_results.len(), 1);
    assert_eq!(report.content.unwrap().failed, 1);
    match result {
        Err(DomainError::ValidationFailure { rule, .. }) => assert_eq!(rule, "required_keys"),
        other => panic!("expected ValidationFailure, got {other:?}"),
    }
    assert_eq!(rx.try_recv().unwrap().event_type(), "content.submitted");
    assert_eq!(rx.try_recv().unwrap().event_type(), "content.validation_failed");
}

#[tokio::test]
async fn test_blocked_dependent_deploys_once_dependency_is_live() {
    // Arrange
    let mut h = common::harness();
    let base = h.engine.submit_content(&submission("textures", Vec::new())).unwrap();
    let mut dependent_cmd = submission("level_pack", Vec::new());
    dependent_cmd.dependencies = vec![base];
    let dependent = h.engine.submit_content(&dependent_cmd).unwrap();
    let blocked = h.engine.deploy_content(&deploy(dependent));

    // Act
    h.engine.deploy_content(&deploy(base)).unwrap();
    let report = h.engine.tick().await;

    // Assert
    assert!(matches!(blocked, Err(DomainError::DependencyUnmet { .. })));
    assert_eq!(report.content.unwrap().deployed, 1);
    assert_eq!(
        h.engine.content_version(dependent).unwrap().status,
        ContentStatus::Production
    );
    assert_eq!(h.engine.metric("content.production"), Some(2.0));
}

#[tokio::test]
async fn test_rolled_back_version_cannot_be_redeployed() {
    // Arrange
    let mut h = common::harness();
    let version_id = h.engine.submit_content(&submission("store_layout", Vec::new())).unwrap();
    h.engine.deploy_content(&deploy(version_id)).unwrap();

    // Act
    h.engine
        .rollback_content(&RollbackContent {
            correlation_id: Uuid::new_v4(),
            version_id,
            reason: "broken prices".into(),
        })
        .unwrap();
    let redeploy = h.engine.deploy_content(&deploy(version_id));

    // Assert
    assert_eq!(
        h.engine.content_version(version_id).unwrap().status,
        ContentStatus::RolledBack
    );
    assert!(matches!(redeploy, Err(DomainError::InvalidState(_))));
    assert_eq!(h.engine.resolve_content("store_layout", "player-1"), None);
}

#[tokio::test]
async fn test_staged_rollout_advances_on_interval_to_production() {
    // Arrange
    let mut h = common::harness();
    let mut cmd = submission("level_pack", vec![ValidationRule::NonEmptyManifest]);
    cmd.rollout_plan = RolloutPlan::Staged {
        steps: vec![10, 50, 100],
        step_interval_secs: 60,
    };
    let version_id = h.engine.submit_content(&cmd).unwrap();
    let status = h.engine.deploy_content(&deploy(version_id)).unwrap();

    // Act
    h.engine.tick().await;
    let before_interval = h.engine.content_version(version_id).unwrap().rollout_percentage;
    h.clock.advance(chrono::Duration::seconds(60));
    h.engine.tick().await;
    let second_step = h.engine.content_version(version_id).unwrap().rollout_percentage;
    h.clock.advance(chrono::Duration::seconds(60));
    h.engine.tick().await;

    // Assert
    assert_eq!(status, ContentStatus::Staging);
    assert_eq!(before_interval, 10);
    assert_eq!(second_step, 50);
    let version = h.engine.content_version(version_id).unwrap();
    assert_eq!(version.status, ContentStatus::Production);
    assert_eq!(version.rollout_percentage, 100);
    assert_eq!(h.engine.resolve_content("level_pack", "player-1"), Some(version_id));
}
