//! A/B test resolution through the facade.

mod common;

use chrono::Duration;
use liveops_experiments::domain::aggregates::{InconclusivePolicy, TestResult, TestStatus};
use liveops_experiments::domain::commands::{CancelTest, CreateTest, RecordOutcome, VariantSpec};
use liveops_test_support::fixed_now;
use uuid::Uuid;

use common::Harness;

fn onboarding_test() -> CreateTest {
    CreateTest {
        correlation_id: Uuid::new_v4(),
        name: "onboarding flow".into(),
        variants: vec![VariantSpec::new("Control", 0.5), VariantSpec::new("Variant", 0.5)],
        target_metric: "day1_retention".into(),
        confidence: 0.95,
        min_sample_size: 100,
        min_samples_per_variant: 30,
        starts_at: fixed_now(),
        ends_at: fixed_now() + Duration::days(7),
        inconclusive_policy: InconclusivePolicy::Close,
    }
}

fn record(h: &mut Harness, test_id: Uuid, variant: &str, conversions: u64, samples: u64) {
    for i in 0..samples {
        h.engine
            .record_outcome(&RecordOutcome {
                correlation_id: Uuid::new_v4(),
                test_id,
                variant: variant.into(),
                converted: i < conversions,
            })
            .unwrap();
    }
}

async fn running_test(h: &mut Harness) -> Uuid {
    let test_id = h.engine.create_test(&onboarding_test()).unwrap();
    h.engine.tick().await;
    test_id
}

#[tokio::test]
async fn test_significant_difference_resolves_winner_early() {
    // Arrange
    let mut h = common::harness();
    let test_id = running_test(&mut h).await;
    record(&mut h, test_id, "Control", 40, 60);
    record(&mut h, test_id, "Variant", 10, 60);

    // Act
    let report = h.engine.tick().await;

    // Assert
    assert_eq!(report.experiments.unwrap().resolved, 1);
    assert_eq!(
        h.engine.test_result(test_id).unwrap(),
        TestResult::Winner("Control".into())
    );
    assert_eq!(h.engine.assign_variant(test_id, "player-9").unwrap(), "Control");
    assert!(
        h.analytics
            .event_names()
            .contains(&"experiments.winner_resolved".to_owned())
    );
}

#[tokio::test]
async fn test_insignificant_difference_waits_for_window_end() {
    // Arrange
    let mut h = common::harness();
    let test_id = running_test(&mut h).await;
    record(&mut h, test_id, "Control", 30, 60);
    record(&mut h, test_id, "Variant", 31, 60);

    // Act
    h.engine.tick().await;
    let mid_window = h.engine.test_result(test_id).unwrap();
    h.clock.advance(Duration::days(7));
    h.engine.tick().await;

    // Assert
    assert_eq!(mid_window, TestResult::NotDecided);
    assert_eq!(
        h.engine.test_result(test_id).unwrap(),
        TestResult::Winner("Variant".into())
    );
}

#[tokio::test]
async fn test_too_few_samples_at_window_end_is_inconclusive() {
    // Arrange
    let mut h = common::harness();
    let test_id = running_test(&mut h).await;
    record(&mut h, test_id, "Control", 9, 10);
    record(&mut h, test_id, "Variant", 1, 10);

    // Act
    h.clock.advance(Duration::days(7));
    h.engine.tick().await;

    // Assert
    let test = h.engine.ab_test(test_id).unwrap();
    assert_eq!(test.status, TestStatus::Completed);
    assert_eq!(h.engine.test_result(test_id).unwrap(), TestResult::Inconclusive);
    assert!(h.engine.assign_variant(test_id, "player-9").is_err());
}

#[tokio::test]
async fn test_inconclusive_test_extends_under_extend_policy() {
    // Arrange
    let mut h = common::harness();
    let mut cmd = onboarding_test();
    cmd.inconclusive_policy = InconclusivePolicy::Extend {
        by_secs: 86_400,
        max_extensions: 1,
    };
    let test_id = h.engine.create_test(&cmd).unwrap();
    h.engine.tick().await;

    // Act
    h.clock.advance(Duration::days(7));
    h.engine.tick().await;
    let extended = h.engine.ab_test(test_id).unwrap();
    h.clock.advance(Duration::days(1));
    h.engine.tick().await;

    // Assert
    assert_eq!(extended.status, TestStatus::Running);
    assert_eq!(extended.ends_at, fixed_now() + Duration::days(8));
    assert_eq!(h.engine.test_result(test_id).unwrap(), TestResult::Inconclusive);
}

#[tokio::test]
async fn test_cancelled_test_reports_inconclusive() {
    // Arrange
    let mut h = common::harness();
    let test_id = running_test(&mut h).await;

    // Act
    h.engine
        .cancel_test(&CancelTest {
            correlation_id: Uuid::new_v4(),
            test_id,
            reason: "tracking bug".into(),
        })
        .unwrap();
    let late_outcome = h.engine.record_outcome(&RecordOutcome {
        correlation_id: Uuid::new_v4(),
        test_id,
        variant: "Control".into(),
        converted: true,
    });

    // Assert
    assert!(late_outcome.is_err());
    assert_eq!(h.engine.test_result(test_id).unwrap(), TestResult::Inconclusive);
}
