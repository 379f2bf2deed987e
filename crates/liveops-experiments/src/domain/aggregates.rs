//! Entity roots for the A/B Testing context.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use liveops_core::aggregate::AggregateRoot;
use liveops_core::bucketing::unit_interval;
use liveops_core::error::DomainError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::CreateTest;
use super::statistics::{Proportion, ZTest, two_proportion_z_test};

/// Allowed deviation of the weight sum from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Lifecycle status of an A/B test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Waiting for its start time.
    NotStarted,
    /// Assigning subjects and collecting outcomes.
    Running,
    /// Exit condition met (terminal).
    Completed,
    /// Stopped by an operator (terminal).
    Cancelled,
}

impl TestStatus {
    /// Lower-case name, as exposed to rule conditions.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// What happens when a test ends without any variant meeting the sample
/// floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum InconclusivePolicy {
    /// Complete with no winner.
    #[default]
    Close,
    /// Push the end time out, at most `max_extensions` times, then close.
    Extend {
        /// Seconds added per extension.
        by_secs: u64,
        /// Extensions allowed.
        max_extensions: u32,
    },
}

/// One treatment arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Name unique within the test.
    pub name: String,
    /// Share of traffic, in `(0, 1]`.
    pub weight: f64,
    /// Parameters the client applies for this arm.
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Outcomes recorded.
    pub samples: u64,
    /// Outcomes that converted.
    pub conversions: u64,
}

impl Variant {
    /// Recorded outcomes as a proportion.
    #[must_use]
    pub fn proportion(&self) -> Proportion {
        Proportion {
            conversions: self.conversions,
            samples: self.samples,
        }
    }
}

/// Why a running test stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Enough samples and the leader's lead is significant.
    Significant,
    /// The end time passed.
    WindowElapsed,
}

/// The resolved outcome of a test. `Inconclusive` is distinct from
/// `NotDecided`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "variant", rename_all = "snake_case")]
pub enum TestResult {
    /// Still running, or not started.
    NotDecided,
    /// Completed with a winner.
    Winner(String),
    /// Completed without a winner.
    Inconclusive,
}

/// Leader versus runner-up at the last evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Highest conversion rate.
    pub leader: String,
    /// Second-highest conversion rate.
    pub runner_up: String,
    /// The z-test between them.
    pub test: ZTest,
}

/// What concluding a test did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conclusion {
    /// Completed with a winner.
    Winner(String),
    /// Completed without a winner.
    Inconclusive,
    /// Inconclusive, end time pushed out.
    Extended {
        /// The new end time.
        ends_at: DateTime<Utc>,
    },
}

/// The entity root for an A/B test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTest {
    /// Entity identifier.
    pub id: Uuid,
    /// Current version (lifecycle events emitted).
    pub version: i64,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: TestStatus,
    /// Arms in declaration order.
    pub variants: Vec<Variant>,
    /// Metric the conversions stand for.
    pub target_metric: String,
    /// Required confidence, in `(0, 1)`.
    pub confidence: f64,
    /// Total samples needed before an early exit.
    pub min_sample_size: u64,
    /// Samples a variant needs to be eligible as winner.
    pub min_samples_per_variant: u64,
    /// Start time.
    pub starts_at: DateTime<Utc>,
    /// End time; extended under `InconclusivePolicy::Extend`.
    pub ends_at: DateTime<Utc>,
    /// Inconclusive handling.
    pub inconclusive_policy: InconclusivePolicy,
    /// Extensions taken so far.
    pub extensions: u32,
    /// Winning variant, set only once `Completed`.
    pub winner: Option<String>,
    /// Why the test stopped.
    pub exit_reason: Option<ExitReason>,
    /// Most recent significance check.
    pub last_evaluation: Option<Evaluation>,
    /// When the test started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the test reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl AbTest {
    /// Validates a `CreateTest` command and builds the test.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` if fewer than two variants
    /// are given, names repeat, a weight is not positive, weights do not sum
    /// to 1.0 within [`WEIGHT_TOLERANCE`], the confidence is outside
    /// `(0, 1)`, the sample size is zero, or the window is empty.
    pub fn create(id: Uuid, command: &CreateTest) -> Result<Self, DomainError> {
        let invalid = |msg: String| -> Result<Self, DomainError> {
            Err(DomainError::InvariantViolation(msg))
        };
        if command.name.trim().is_empty() || command.target_metric.trim().is_empty() {
            return invalid("test name and target metric are required".into());
        }
        if command.variants.len() < 2 {
            return invalid(format!(
                "test {} needs at least two variants, got {}",
                command.name,
                command.variants.len()
            ));
        }
        let names: BTreeSet<&str> = command.variants.iter().map(|v| v.name.as_str()).collect();
        if names.len() != command.variants.len() || names.iter().any(|n| n.trim().is_empty()) {
            return invalid("variant names must be unique and non-empty".into());
        }
        if let Some(bad) = command
            .variants
            .iter()
            .find(|v| !v.weight.is_finite() || v.weight <= 0.0)
        {
            return invalid(format!(
                "variant {} has non-positive weight {}",
                bad.name, bad.weight
            ));
        }
        let total: f64 = command.variants.iter().map(|v| v.weight).sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return invalid(format!("variant weights sum to {total}, expected 1.0"));
        }
        if !(command.confidence > 0.0 && command.confidence < 1.0) {
            return invalid(format!(
                "confidence must be in (0, 1), got {}",
                command.confidence
            ));
        }
        if command.min_sample_size == 0 {
            return invalid("minimum sample size must be positive".into());
        }
        if command.ends_at <= command.starts_at {
            return invalid(format!(
                "test {} ends at {} which is not after its start {}",
                command.name, command.ends_at, command.starts_at
            ));
        }
        if let InconclusivePolicy::Extend { by_secs: 0, .. } = command.inconclusive_policy {
            return invalid("extension length must be positive".into());
        }

        Ok(Self {
            id,
            version: 0,
            name: command.name.clone(),
            status: TestStatus::NotStarted,
            variants: command
                .variants
                .iter()
                .map(|v| Variant {
                    name: v.name.clone(),
                    weight: v.weight,
                    parameters: v.parameters.clone(),
                    samples: 0,
                    conversions: 0,
                })
                .collect(),
            target_metric: command.target_metric.clone(),
            confidence: command.confidence,
            min_sample_size: command.min_sample_size,
            min_samples_per_variant: command.min_samples_per_variant.max(1),
            starts_at: command.starts_at,
            ends_at: command.ends_at,
            inconclusive_policy: command.inconclusive_policy,
            extensions: 0,
            winner: None,
            exit_reason: None,
            last_evaluation: None,
            started_at: None,
            finished_at: None,
        })
    }

    /// Maps a subject to a variant by hashing `(test id, subject)` into
    /// `[0, 1)` and walking the cumulative weights.
    #[must_use]
    pub fn bucket(&self, subject_id: &str) -> &Variant {
        let point = unit_interval(&self.id.to_string(), subject_id);
        let mut cumulative = 0.0;
        for variant in &self.variants {
            cumulative += variant.weight;
            if point < cumulative {
                return variant;
            }
        }
        // Rounding can leave the sum a hair under 1.0.
        &self.variants[self.variants.len() - 1]
    }

    /// Total outcomes recorded.
    #[must_use]
    pub fn total_samples(&self) -> u64 {
        self.variants.iter().map(|v| v.samples).sum()
    }

    /// Records one outcome.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` unless the test is running and
    /// `DomainError::InvariantViolation` for an unknown variant.
    pub fn record_outcome(&mut self, variant: &str, converted: bool) -> Result<(), DomainError> {
        if self.status != TestStatus::Running {
            return Err(DomainError::InvalidState(format!(
                "test {} is {} and not collecting outcomes",
                self.id,
                self.status.as_str()
            )));
        }
        let arm = self
            .variants
            .iter_mut()
            .find(|v| v.name == variant)
            .ok_or_else(|| {
                DomainError::InvariantViolation(format!(
                    "test {} has no variant `{variant}`",
                    self.id
                ))
            })?;
        arm.samples += 1;
        if converted {
            arm.conversions += 1;
        }
        Ok(())
    }

    /// Compares the two variants with the highest conversion rates among
    /// those meeting the per-variant sample floor. `None` while fewer than
    /// two variants meet it.
    #[must_use]
    pub fn evaluate_leaders(&self) -> Option<Evaluation> {
        let mut ranked: Vec<(&Variant, f64)> = self
            .variants
            .iter()
            .filter(|v| v.samples >= self.min_samples_per_variant)
            .filter_map(|v| v.proportion().rate().map(|r| (v, r)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let [(leader, _), (runner_up, _), ..] = ranked.as_slice() else {
            return None;
        };
        let test = two_proportion_z_test(leader.proportion(), runner_up.proportion())?;
        Some(Evaluation {
            leader: leader.name.clone(),
            runner_up: runner_up.name.clone(),
            test,
        })
    }

    /// Checks the exit condition of a running test.
    pub fn check_exit(&mut self, now: DateTime<Utc>) -> Option<ExitReason> {
        if self.status != TestStatus::Running {
            return None;
        }
        self.last_evaluation = self.evaluate_leaders();
        if now >= self.ends_at {
            return Some(ExitReason::WindowElapsed);
        }
        let significant = self
            .last_evaluation
            .as_ref()
            .is_some_and(|e| e.test.is_significant(self.confidence));
        (self.total_samples() >= self.min_sample_size
            && significant
            && self.pick_winner().is_some())
        .then_some(ExitReason::Significant)
    }

    /// The variant with the highest conversion rate among those meeting the
    /// per-variant sample floor. Ties go to the earlier-declared variant.
    #[must_use]
    pub fn pick_winner(&self) -> Option<&Variant> {
        let mut best: Option<(&Variant, f64)> = None;
        for variant in &self.variants {
            if variant.samples < self.min_samples_per_variant {
                continue;
            }
            let Some(rate) = variant.proportion().rate() else {
                continue;
            };
            if best.is_none_or(|(_, top)| rate > top) {
                best = Some((variant, rate));
            }
        }
        best.map(|(v, _)| v)
    }

    /// Concludes a test whose exit condition held.
    pub fn conclude(&mut self, reason: ExitReason, now: DateTime<Utc>) -> Conclusion {
        if let Some(winner) = self.pick_winner().map(|v| v.name.clone()) {
            self.finish(reason, now);
            self.winner = Some(winner.clone());
            return Conclusion::Winner(winner);
        }
        if let InconclusivePolicy::Extend {
            by_secs,
            max_extensions,
        } = self.inconclusive_policy
            && reason == ExitReason::WindowElapsed
            && self.extensions < max_extensions
        {
            self.extensions += 1;
            let base = self.ends_at.max(now);
            self.ends_at = i64::try_from(by_secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .and_then(|by| base.checked_add_signed(by))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            return Conclusion::Extended {
                ends_at: self.ends_at,
            };
        }
        self.finish(reason, now);
        Conclusion::Inconclusive
    }

    fn finish(&mut self, reason: ExitReason, now: DateTime<Utc>) {
        self.status = TestStatus::Completed;
        self.exit_reason = Some(reason);
        self.finished_at = Some(now);
    }

    /// The resolved outcome.
    #[must_use]
    pub fn result(&self) -> TestResult {
        match (&self.status, &self.winner) {
            (TestStatus::Completed, Some(winner)) => TestResult::Winner(winner.clone()),
            (TestStatus::Completed | TestStatus::Cancelled, None) => TestResult::Inconclusive,
            _ => TestResult::NotDecided,
        }
    }
}

impl AggregateRoot for AbTest {
    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn next_version(&mut self) -> i64 {
        self.version += 1;
        self.version
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use liveops_test_support::fixed_now;

    use super::*;
    use crate::domain::commands::VariantSpec;

    fn command(weights: &[f64]) -> CreateTest {
        CreateTest {
            correlation_id: Uuid::new_v4(),
            name: "store_layout".into(),
            variants: weights
                .iter()
                .enumerate()
                .map(|(i, w)| VariantSpec::new(format!("arm{i}"), *w))
                .collect(),
            target_metric: "purchase".into(),
            confidence: 0.95,
            min_sample_size: 100,
            min_samples_per_variant: 30,
            starts_at: fixed_now(),
            ends_at: fixed_now() + Duration::days(7),
            inconclusive_policy: InconclusivePolicy::Close,
        }
    }

    fn running(weights: &[f64]) -> AbTest {
        let mut test = AbTest::create(Uuid::new_v4(), &command(weights)).unwrap();
        test.status = TestStatus::Running;
        test
    }

    fn feed(test: &mut AbTest, variant: &str, conversions: u64, samples: u64) {
        for i in 0..samples {
            test.record_outcome(variant, i < conversions).unwrap();
        }
    }

    #[test]
    fn test_weights_summing_to_point_nine_are_rejected() {
        let result = AbTest::create(Uuid::new_v4(), &command(&[0.5, 0.4]));

        match result.unwrap_err() {
            DomainError::InvariantViolation(msg) => assert!(msg.contains("sum to")),
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn test_weights_within_tolerance_are_accepted() {
        assert!(AbTest::create(Uuid::new_v4(), &command(&[0.3, 0.3, 0.4 + 1e-9])).is_ok());
        assert!(AbTest::create(Uuid::new_v4(), &command(&[1.0])).is_err());
        assert!(AbTest::create(Uuid::new_v4(), &command(&[1.0, 0.0])).is_err());
    }

    #[test]
    fn test_confidence_must_be_open_unit_interval() {
        let mut cmd = command(&[0.5, 0.5]);
        cmd.confidence = 1.0;

        assert!(AbTest::create(Uuid::new_v4(), &cmd).is_err());
    }

    #[test]
    fn test_bucket_follows_weights() {
        // Arrange
        let test = running(&[0.2, 0.8]);

        // Act
        let first = (0..5_000)
            .filter(|i| test.bucket(&format!("s{i}")).name == "arm0")
            .count();

        // Assert
        assert!((850..=1_150).contains(&first), "arm0 got {first}");
    }

    #[test]
    fn test_check_exit_requires_sample_size_and_significance() {
        // Arrange
        let mut test = running(&[0.5, 0.5]);
        feed(&mut test, "arm0", 30, 45);
        feed(&mut test, "arm1", 5, 45);

        // Act
        let before_floor = test.check_exit(fixed_now());
        feed(&mut test, "arm0", 0, 10);
        let after_floor = test.check_exit(fixed_now());

        // Assert
        assert_eq!(before_floor, None);
        assert_eq!(after_floor, Some(ExitReason::Significant));
        let evaluation = test.last_evaluation.unwrap();
        assert_eq!(evaluation.leader, "arm0");
        assert_eq!(evaluation.runner_up, "arm1");
    }

    #[test]
    fn test_window_end_exits_without_significance() {
        let mut test = running(&[0.5, 0.5]);

        assert_eq!(
            test.check_exit(fixed_now() + Duration::days(7)),
            Some(ExitReason::WindowElapsed)
        );
        assert!(test.last_evaluation.is_none());
    }

    #[test]
    fn test_no_variant_meeting_floor_is_inconclusive() {
        // Arrange
        let mut test = running(&[0.5, 0.5]);
        feed(&mut test, "arm0", 10, 20);
        feed(&mut test, "arm1", 1, 20);

        // Act
        let conclusion = test.conclude(ExitReason::WindowElapsed, fixed_now());

        // Assert
        assert_eq!(conclusion, Conclusion::Inconclusive);
        assert_eq!(test.status, TestStatus::Completed);
        assert_eq!(test.result(), TestResult::Inconclusive);
    }

    #[test]
    fn test_extend_policy_pushes_end_then_closes() {
        // Arrange
        let mut cmd = command(&[0.5, 0.5]);
        cmd.inconclusive_policy = InconclusivePolicy::Extend {
            by_secs: 86_400,
            max_extensions: 1,
        };
        let mut test = AbTest::create(Uuid::new_v4(), &cmd).unwrap();
        test.status = TestStatus::Running;
        let end = test.ends_at;

        // Act
        let first = test.conclude(ExitReason::WindowElapsed, end);
        let second = test.conclude(ExitReason::WindowElapsed, end + Duration::days(1));

        // Assert
        assert_eq!(
            first,
            Conclusion::Extended {
                ends_at: end + Duration::days(1)
            }
        );
        assert_eq!(second, Conclusion::Inconclusive);
        assert_eq!(test.extensions, 1);
    }

    #[test]
    fn test_leader_under_sample_floor_does_not_trigger_early_exit() {
        // Arrange
        let mut cmd = command(&[0.5, 0.5]);
        cmd.min_samples_per_variant = 50;
        let mut test = AbTest::create(Uuid::new_v4(), &cmd).unwrap();
        test.status = TestStatus::Running;
        feed(&mut test, "arm0", 10, 10);
        feed(&mut test, "arm1", 5, 95);

        // Act
        let exit = test.check_exit(fixed_now() + Duration::hours(1));

        // Assert
        assert_eq!(exit, None);
        assert!(test.last_evaluation.is_none());
        assert_eq!(test.result(), TestResult::NotDecided);
    }

    #[test]
    fn test_significant_exit_names_the_leader() {
        // Arrange
        let mut cmd = command(&[0.5, 0.5]);
        cmd.min_samples_per_variant = 50;
        let mut test = AbTest::create(Uuid::new_v4(), &cmd).unwrap();
        test.status = TestStatus::Running;
        feed(&mut test, "arm0", 40, 50);
        feed(&mut test, "arm1", 5, 95);

        // Act
        let exit = test.check_exit(fixed_now() + Duration::hours(1));
        let conclusion = exit.map(|reason| test.conclude(reason, fixed_now() + Duration::hours(1)));

        // Assert
        assert_eq!(exit, Some(ExitReason::Significant));
        assert_eq!(conclusion, Some(Conclusion::Winner("arm0".into())));
    }

    #[test]
    fn test_winner_ties_go_to_first_declared() {
        let mut test = running(&[0.5, 0.5]);
        feed(&mut test, "arm0", 15, 30);
        feed(&mut test, "arm1", 15, 30);

        assert_eq!(test.pick_winner().unwrap().name, "arm0");
        assert_eq!(test.result(), TestResult::NotDecided);
    }
}
