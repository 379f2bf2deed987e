//! The A/B Test Engine.
//!
//! Assignment is a pure function of `(test id, subject id)`, so the engine
//! keeps no per-subject table. The tick starts tests at their start time and
//! checks the exit condition of every running test.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use liveops_core::aggregate::AggregateRoot;
use liveops_core::error::DomainError;
use liveops_core::event::{EventMetadata, Outbox};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::aggregates::{AbTest, Conclusion, TestResult, TestStatus};
use crate::domain::commands::{CancelTest, CreateTest, RecordOutcome};
use crate::domain::events::{
    ExperimentEvent, ExperimentEventKind, TestCancelled, TestConcluded, TestCreated,
    TestExtended,
};

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExperimentTickSummary {
    /// Tests that started.
    pub started: usize,
    /// Tests completed with a winner.
    pub resolved: usize,
    /// Tests completed without a winner.
    pub inconclusive: usize,
    /// Inconclusive tests extended.
    pub extended: usize,
}

/// Allocates traffic, tracks outcomes and resolves winners.
#[derive(Debug, Default)]
pub struct ExperimentEngine {
    tests: BTreeMap<Uuid, AbTest>,
    outbox: Outbox<ExperimentEvent>,
}

fn emit(
    outbox: &mut Outbox<ExperimentEvent>,
    test: &mut AbTest,
    kind: ExperimentEventKind,
    correlation_id: Uuid,
    now: DateTime<Utc>,
) {
    let sequence = test.next_version();
    outbox.push(ExperimentEvent {
        metadata: EventMetadata::new(kind.event_type(), test.id, sequence, correlation_id, now),
        kind,
    });
}

impl ExperimentEngine {
    /// Creates an engine with no tests.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a test in `NotStarted`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` if the definition is
    /// malformed; nothing is stored in that case.
    pub fn create(&mut self, command: &CreateTest, now: DateTime<Utc>) -> Result<Uuid, DomainError> {
        let mut test = AbTest::create(Uuid::new_v4(), command)?;
        let id = test.id;
        let created = ExperimentEventKind::TestCreated(TestCreated {
            name: test.name.clone(),
            variants: test.variants.iter().map(|v| v.name.clone()).collect(),
        });
        emit(&mut self.outbox, &mut test, created, command.correlation_id, now);
        info!(test_id = %id, name = %test.name, "a/b test created");
        self.tests.insert(id, test);
        Ok(id)
    }

    /// The variant a subject sees. Running tests hash the subject; a
    /// completed test with a winner assigns everyone the winner.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown test and
    /// `DomainError::InvalidState` for a test that is not started, was
    /// cancelled, or completed without a winner.
    pub fn assign(&self, test_id: Uuid, subject_id: &str) -> Result<String, DomainError> {
        let test = self.tests.get(&test_id).ok_or(DomainError::NotFound(test_id))?;
        match (test.status, &test.winner) {
            (TestStatus::Running, _) => Ok(test.bucket(subject_id).name.clone()),
            (TestStatus::Completed, Some(winner)) => Ok(winner.clone()),
            (status, _) => Err(DomainError::InvalidState(format!(
                "test {test_id} is {} and has no variant to assign",
                status.as_str()
            ))),
        }
    }

    /// Records one outcome.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown test,
    /// `DomainError::InvalidState` unless it is running, and
    /// `DomainError::InvariantViolation` for an unknown variant.
    pub fn record_outcome(&mut self, command: &RecordOutcome) -> Result<(), DomainError> {
        let test = self
            .tests
            .get_mut(&command.test_id)
            .ok_or(DomainError::NotFound(command.test_id))?;
        test.record_outcome(&command.variant, command.converted)
    }

    /// Cancels a test that has not completed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown test and
    /// `DomainError::InvalidState` if it is already terminal.
    pub fn cancel(&mut self, command: &CancelTest, now: DateTime<Utc>) -> Result<(), DomainError> {
        let test = self
            .tests
            .get_mut(&command.test_id)
            .ok_or(DomainError::NotFound(command.test_id))?;
        if matches!(test.status, TestStatus::Completed | TestStatus::Cancelled) {
            return Err(DomainError::InvalidState(format!(
                "test {} is already {}",
                test.id,
                test.status.as_str()
            )));
        }
        test.status = TestStatus::Cancelled;
        test.finished_at = Some(now);
        emit(
            &mut self.outbox,
            test,
            ExperimentEventKind::TestCancelled(TestCancelled {
                reason: command.reason.clone(),
            }),
            command.correlation_id,
            now,
        );
        info!(test_id = %test.id, reason = %command.reason, "a/b test cancelled");
        Ok(())
    }

    /// Runs one reconciliation pass: starts due tests and checks the exit
    /// condition of running ones.
    pub fn tick(&mut self, now: DateTime<Utc>, correlation_id: Uuid) -> ExperimentTickSummary {
        let mut summary = ExperimentTickSummary::default();
        for test in self.tests.values_mut() {
            if test.status == TestStatus::NotStarted && now >= test.starts_at {
                test.status = TestStatus::Running;
                test.started_at = Some(now);
                emit(
                    &mut self.outbox,
                    test,
                    ExperimentEventKind::TestStarted,
                    correlation_id,
                    now,
                );
                info!(test_id = %test.id, "a/b test started");
                summary.started += 1;
            }

            let Some(reason) = test.check_exit(now) else {
                continue;
            };
            let kind = match test.conclude(reason, now) {
                Conclusion::Winner(winner) => {
                    info!(test_id = %test.id, winner = %winner, ?reason, "a/b test resolved");
                    summary.resolved += 1;
                    ExperimentEventKind::WinnerResolved(TestConcluded {
                        winner: Some(winner),
                        reason,
                        evaluation: test.last_evaluation.clone(),
                    })
                }
                Conclusion::Inconclusive => {
                    warn!(test_id = %test.id, ?reason, "a/b test inconclusive");
                    summary.inconclusive += 1;
                    ExperimentEventKind::TestInconclusive(TestConcluded {
                        winner: None,
                        reason,
                        evaluation: test.last_evaluation.clone(),
                    })
                }
                Conclusion::Extended { ends_at } => {
                    info!(test_id = %test.id, %ends_at, "inconclusive a/b test extended");
                    summary.extended += 1;
                    ExperimentEventKind::TestExtended(TestExtended {
                        ends_at,
                        extensions: test.extensions,
                    })
                }
            };
            emit(&mut self.outbox, test, kind, correlation_id, now);
        }
        debug!(?summary, "experiment pass finished");
        summary
    }

    /// The resolved outcome of a test.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown test.
    pub fn get_result(&self, test_id: Uuid) -> Result<TestResult, DomainError> {
        self.tests
            .get(&test_id)
            .map(AbTest::result)
            .ok_or(DomainError::NotFound(test_id))
    }

    /// A copy of one test.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown test.
    pub fn get(&self, test_id: Uuid) -> Result<AbTest, DomainError> {
        self.tests
            .get(&test_id)
            .cloned()
            .ok_or(DomainError::NotFound(test_id))
    }

    /// Borrows one test for read-only inspection.
    #[must_use]
    pub fn peek(&self, test_id: Uuid) -> Option<&AbTest> {
        self.tests.get(&test_id)
    }

    /// Number of tests with the given status.
    #[must_use]
    pub fn count_with_status(&self, status: TestStatus) -> usize {
        self.tests.values().filter(|t| t.status == status).count()
    }

    /// Removes and returns buffered lifecycle events, oldest first.
    pub fn drain_events(&mut self) -> Vec<ExperimentEvent> {
        self.outbox.drain()
    }

    /// Serializes every test.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if serialization fails.
    pub fn snapshot(&self) -> Result<serde_json::Value, DomainError> {
        let tests: Vec<&AbTest> = self.tests.values().collect();
        serde_json::to_value(tests)
            .map_err(|e| DomainError::Infrastructure(format!("a/b test snapshot failed: {e}")))
    }

    /// Replaces the store with a snapshot taken by [`Self::snapshot`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the blob cannot be decoded.
    pub fn restore(&mut self, blob: serde_json::Value) -> Result<(), DomainError> {
        let tests: Vec<AbTest> = serde_json::from_value(blob)
            .map_err(|e| DomainError::Infrastructure(format!("a/b test restore failed: {e}")))?;
        self.tests = tests.into_iter().map(|t| (t.id, t)).collect();
        info!(tests = self.tests.len(), "a/b tests restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use liveops_test_support::fixed_now;

    use super::*;
    use crate::domain::aggregates::InconclusivePolicy;
    use crate::domain::commands::VariantSpec;

    fn create_command() -> CreateTest {
        CreateTest {
            correlation_id: Uuid::new_v4(),
            name: "checkout_button".into(),
            variants: vec![
                VariantSpec::new("Control", 0.5),
                VariantSpec::new("Variant", 0.5)
                    .with_parameter("color", serde_json::json!("green")),
            ],
            target_metric: "purchase".into(),
            confidence: 0.95,
            min_sample_size: 100,
            min_samples_per_variant: 30,
            starts_at: fixed_now(),
            ends_at: fixed_now() + Duration::days(14),
            inconclusive_policy: InconclusivePolicy::Close,
        }
    }

    fn started(engine: &mut ExperimentEngine) -> Uuid {
        let id = engine.create(&create_command(), fixed_now()).unwrap();
        engine.tick(fixed_now(), Uuid::new_v4());
        id
    }

    fn feed(engine: &mut ExperimentEngine, id: Uuid, variant: &str, conversions: u64, samples: u64) {
        for i in 0..samples {
            engine
                .record_outcome(&RecordOutcome {
                    correlation_id: Uuid::new_v4(),
                    test_id: id,
                    variant: variant.into(),
                    converted: i < conversions,
                })
                .unwrap();
        }
    }

    #[test]
    fn test_assignment_is_deterministic_regardless_of_other_subjects() {
        // Arrange
        let mut engine = ExperimentEngine::new();
        let id = started(&mut engine);

        // Act
        let first = engine.assign(id, "player-7").unwrap();
        for i in 0..500 {
            engine.assign(id, &format!("other-{i}")).unwrap();
        }
        let second = engine.assign(id, "player-7").unwrap();

        // Assert
        assert_eq!(first, second);
    }

    #[test]
    fn test_assign_before_start_returns_error() {
        let mut engine = ExperimentEngine::new();
        let id = engine.create(&create_command(), fixed_now()).unwrap();

        assert!(matches!(
            engine.assign(id, "player-7"),
            Err(DomainError::InvalidState(_))
        ));
        assert_eq!(engine.get_result(id).unwrap(), TestResult::NotDecided);
    }

    #[test]
    fn test_significant_lead_resolves_control_as_winner() {
        // Arrange
        let mut engine = ExperimentEngine::new();
        let id = started(&mut engine);
        feed(&mut engine, id, "Control", 40, 60);
        feed(&mut engine, id, "Variant", 10, 60);

        // Act
        let summary = engine.tick(fixed_now() + Duration::hours(1), Uuid::new_v4());

        // Assert
        assert_eq!(summary.resolved, 1);
        assert_eq!(
            engine.get_result(id).unwrap(),
            TestResult::Winner("Control".into())
        );
        assert_eq!(engine.assign(id, "anyone").unwrap(), "Control");
        let events = engine.drain_events();
        assert_eq!(
            events.last().unwrap().metadata.event_type,
            "experiments.winner_resolved"
        );
    }

    #[test]
    fn test_insignificant_lead_keeps_running_until_window_end() {
        // Arrange
        let mut engine = ExperimentEngine::new();
        let id = started(&mut engine);
        feed(&mut engine, id, "Control", 11, 60);
        feed(&mut engine, id, "Variant", 10, 60);

        // Act
        let midway = engine.tick(fixed_now() + Duration::days(1), Uuid::new_v4());
        let status_midway = engine.get(id).unwrap().status;
        engine.tick(fixed_now() + Duration::days(14), Uuid::new_v4());

        // Assert
        assert_eq!(midway.resolved, 0);
        assert_eq!(status_midway, TestStatus::Running);
        assert_eq!(
            engine.get_result(id).unwrap(),
            TestResult::Winner("Control".into())
        );
    }

    #[test]
    fn test_lead_below_floor_does_not_spend_extensions_between_passes() {
        // Arrange
        let mut engine = ExperimentEngine::new();
        let mut cmd = create_command();
        cmd.min_samples_per_variant = 60;
        cmd.inconclusive_policy = InconclusivePolicy::Extend {
            by_secs: 86_400,
            max_extensions: 3,
        };
        let id = engine.create(&cmd, fixed_now()).unwrap();
        engine.tick(fixed_now(), Uuid::new_v4());
        feed(&mut engine, id, "Control", 40, 50);
        feed(&mut engine, id, "Variant", 5, 50);

        // Act
        let summaries: Vec<ExperimentTickSummary> = (0..5)
            .map(|minute| engine.tick(fixed_now() + Duration::minutes(minute), Uuid::new_v4()))
            .collect();

        // Assert
        assert!(summaries.iter().all(|s| s.extended == 0 && s.inconclusive == 0));
        let test = engine.get(id).unwrap();
        assert_eq!(test.status, TestStatus::Running);
        assert_eq!(test.extensions, 0);
        assert_eq!(test.ends_at, fixed_now() + Duration::days(14));
        assert_eq!(engine.get_result(id).unwrap(), TestResult::NotDecided);
    }

    #[test]
    fn test_window_end_without_floor_is_inconclusive() {
        // Arrange
        let mut engine = ExperimentEngine::new();
        let id = started(&mut engine);
        feed(&mut engine, id, "Control", 5, 10);

        // Act
        let summary = engine.tick(fixed_now() + Duration::days(14), Uuid::new_v4());

        // Assert
        assert_eq!(summary.inconclusive, 1);
        assert_eq!(engine.get_result(id).unwrap(), TestResult::Inconclusive);
        assert!(matches!(
            engine.assign(id, "player-7"),
            Err(DomainError::InvalidState(_))
        ));
        assert!(
            engine
                .drain_events()
                .iter()
                .any(|e| e.metadata.event_type == "experiments.test_inconclusive")
        );
    }

    #[test]
    fn test_outcome_for_unknown_variant_returns_error() {
        let mut engine = ExperimentEngine::new();
        let id = started(&mut engine);

        let result = engine.record_outcome(&RecordOutcome {
            correlation_id: Uuid::new_v4(),
            test_id: id,
            variant: "Treatment".into(),
            converted: true,
        });

        assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn test_snapshot_restore_keeps_counts() {
        let mut engine = ExperimentEngine::new();
        let id = started(&mut engine);
        feed(&mut engine, id, "Control", 3, 7);

        let mut restored = ExperimentEngine::new();
        restored.restore(engine.snapshot().unwrap()).unwrap();

        let test = restored.get(id).unwrap();
        assert_eq!(test.variants[0].samples, 7);
        assert_eq!(test.variants[0].conversions, 3);
        assert_eq!(test.status, TestStatus::Running);
    }
}
