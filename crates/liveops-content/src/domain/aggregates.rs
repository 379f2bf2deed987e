//! Entity roots for the Content Deployment context.

use chrono::{DateTime, Utc};
use liveops_core::aggregate::AggregateRoot;
use liveops_core::error::DomainError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::ValidationRule;

/// Deployment status of a content version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    /// Submitted, validation not yet run.
    Pending,
    /// Every validation rule passed.
    Validated,
    /// Partially rolled out.
    Staging,
    /// Fully deployed.
    Production,
    /// A validation rule failed. Terminal.
    Failed,
    /// Pulled from staging or production. Terminal.
    RolledBack,
    /// Replaced by a newer production version of the same content type.
    Deprecated,
}

impl ContentStatus {
    /// Lower-case name, as exposed to rule conditions.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validated => "validated",
            Self::Staging => "staging",
            Self::Production => "production",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
            Self::Deprecated => "deprecated",
        }
    }

    /// Whether players can see the version at all.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Staging | Self::Production)
    }
}

/// How a validated version reaches production.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "plan", rename_all = "snake_case")]
pub enum RolloutPlan {
    /// Straight to 100%.
    #[default]
    Full,
    /// Through increasing exposure percentages, one step per interval. The
    /// last step must be 100.
    Staged {
        /// Exposure percentages, strictly increasing.
        steps: Vec<u8>,
        /// Seconds between steps.
        step_interval_secs: u64,
    },
}

impl RolloutPlan {
    /// Rejects plans that can never reach production.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for an empty, non-increasing
    /// or out-of-range step list, a last step other than 100, or a zero
    /// interval.
    pub fn validate(&self) -> Result<(), DomainError> {
        let Self::Staged {
            steps,
            step_interval_secs,
        } = self
        else {
            return Ok(());
        };
        if steps.last() != Some(&100) {
            return Err(DomainError::InvariantViolation(
                "staged rollout must end at 100%".into(),
            ));
        }
        if steps.iter().any(|s| *s == 0 || *s > 100) || steps.windows(2).any(|w| w[0] >= w[1]) {
            return Err(DomainError::InvariantViolation(format!(
                "staged rollout steps must be strictly increasing within 1..=100, got {steps:?}"
            )));
        }
        if *step_interval_secs == 0 {
            return Err(DomainError::InvariantViolation(
                "staged rollout interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    /// Rule name.
    pub rule: String,
    /// Whether it passed.
    pub passed: bool,
    /// Failure description.
    pub reason: Option<String>,
    /// When it was evaluated.
    pub evaluated_at: DateTime<Utc>,
}

/// A versioned piece of deployable content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentVersion {
    /// Entity identifier.
    pub id: Uuid,
    /// Current version (lifecycle events emitted).
    pub version: i64,
    /// Content type, e.g. `level_pack` or `store_layout`.
    pub content_type: String,
    /// Where the payload lives, e.g. `cdn://packs/spring-2026.zip`.
    pub payload_ref: String,
    /// Structured description of the payload.
    pub manifest: serde_json::Value,
    /// Declared SHA-256 of the manifest.
    pub checksum: String,
    /// Deployment status.
    pub status: ContentStatus,
    /// Share of players exposed, 0-100.
    pub rollout_percentage: u8,
    /// How the version reaches production.
    pub rollout_plan: RolloutPlan,
    /// Index of the current step of a staged plan.
    pub rollout_step: usize,
    /// When the next staged step is due.
    pub next_step_at: Option<DateTime<Utc>>,
    /// Rules evaluated in order.
    pub rules: Vec<ValidationRule>,
    /// Results recorded up to and including the first failure.
    pub validation_results: Vec<RuleResult>,
    /// Versions that must be in production first.
    pub dependencies: Vec<Uuid>,
    /// A deploy was requested and is waiting on dependencies.
    pub deploy_requested: bool,
    /// Dependency currently blocking deployment.
    pub blocked_on: Option<Uuid>,
    /// Production version this one replaced.
    pub superseded: Option<Uuid>,
    /// When the version was submitted.
    pub submitted_at: DateTime<Utc>,
    /// When the version reached production.
    pub deployed_at: Option<DateTime<Utc>>,
    /// When the version was rolled back.
    pub rolled_back_at: Option<DateTime<Utc>>,
}

impl ContentVersion {
    /// The first failing rule result, if validation failed.
    #[must_use]
    pub fn failed_rule(&self) -> Option<&RuleResult> {
        self.validation_results.iter().find(|r| !r.passed)
    }

    /// Whether every recorded rule passed and every rule was evaluated.
    #[must_use]
    pub fn validation_passed(&self) -> bool {
        self.validation_results.len() == self.rules.len()
            && self.validation_results.iter().all(|r| r.passed)
    }

    /// The `ValidationFailure` error for a failed version.
    #[must_use]
    pub fn validation_error(&self) -> DomainError {
        let (rule, reason) = self.failed_rule().map_or_else(
            || ("unknown".to_owned(), "validation failed".to_owned()),
            |r| {
                (
                    r.rule.clone(),
                    r.reason.clone().unwrap_or_else(|| "failed".to_owned()),
                )
            },
        );
        DomainError::ValidationFailure {
            version_id: self.id,
            rule,
            reason,
        }
    }

    /// Moves to full exposure.
    pub fn promote(&mut self, now: DateTime<Utc>) {
        self.status = ContentStatus::Production;
        self.rollout_percentage = 100;
        self.next_step_at = None;
        self.deploy_requested = false;
        self.blocked_on = None;
        self.deployed_at = Some(now);
    }

    /// Starts a staged rollout at its first step. Returns `false` when the
    /// plan is `Full` and the caller should promote instead.
    pub fn begin_staging(&mut self, now: DateTime<Utc>) -> bool {
        let RolloutPlan::Staged {
            steps,
            step_interval_secs,
        } = &self.rollout_plan
        else {
            return false;
        };
        let Some(first) = steps.first().copied() else {
            return false;
        };
        if first >= 100 {
            return false;
        }
        self.status = ContentStatus::Staging;
        self.rollout_step = 0;
        self.rollout_percentage = first;
        self.next_step_at = Some(next_step_due(now, *step_interval_secs));
        self.deploy_requested = false;
        self.blocked_on = None;
        true
    }

    /// Advances a staged rollout one step if due. Returns the new percentage.
    pub fn advance_step(&mut self, now: DateTime<Utc>) -> Option<u8> {
        if self.status != ContentStatus::Staging || self.next_step_at.is_none_or(|at| now < at) {
            return None;
        }
        let RolloutPlan::Staged {
            steps,
            step_interval_secs,
        } = &self.rollout_plan
        else {
            return None;
        };
        let next = self.rollout_step + 1;
        let percentage = steps.get(next).copied()?;
        self.rollout_step = next;
        self.rollout_percentage = percentage;
        self.next_step_at = Some(next_step_due(now, *step_interval_secs));
        Some(percentage)
    }

    /// Pulls the version.
    pub fn roll_back(&mut self, now: DateTime<Utc>) {
        self.status = ContentStatus::RolledBack;
        self.rollout_percentage = 0;
        self.next_step_at = None;
        self.deploy_requested = false;
        self.rolled_back_at = Some(now);
    }

    /// Marks the version as replaced.
    pub fn deprecate(&mut self) {
        self.status = ContentStatus::Deprecated;
        self.rollout_percentage = 0;
    }
}

fn next_step_due(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|step| now.checked_add_signed(step))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl AggregateRoot for ContentVersion {
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
    use liveops_test_support::fixed_now;

    use super::*;

    fn version(plan: RolloutPlan) -> ContentVersion {
        ContentVersion {
            id: Uuid::new_v4(),
            version: 0,
            content_type: "level_pack".into(),
            payload_ref: "cdn://packs/a.zip".into(),
            manifest: serde_json::json!({"levels": 10}),
            checksum: String::new(),
            status: ContentStatus::Validated,
            rollout_percentage: 0,
            rollout_plan: plan,
            rollout_step: 0,
            next_step_at: None,
            rules: Vec::new(),
            validation_results: Vec::new(),
            dependencies: Vec::new(),
            deploy_requested: true,
            blocked_on: None,
            superseded: None,
            submitted_at: fixed_now(),
            deployed_at: None,
            rolled_back_at: None,
        }
    }

    #[test]
    fn test_plan_must_end_at_full_exposure() {
        let plan = RolloutPlan::Staged {
            steps: vec![10, 50],
            step_interval_secs: 60,
        };

        assert!(matches!(
            plan.validate(),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_plan_rejects_non_increasing_steps() {
        let plan = RolloutPlan::Staged {
            steps: vec![50, 10, 100],
            step_interval_secs: 60,
        };

        assert!(plan.validate().is_err());
        assert!(RolloutPlan::Full.validate().is_ok());
    }

    #[test]
    fn test_staged_rollout_advances_on_interval() {
        // Arrange
        let mut content = version(RolloutPlan::Staged {
            steps: vec![10, 50, 100],
            step_interval_secs: 60,
        });

        // Act
        assert!(content.begin_staging(fixed_now()));
        let early = content.advance_step(fixed_now() + chrono::Duration::seconds(59));
        let second = content.advance_step(fixed_now() + chrono::Duration::seconds(60));
        let third = content.advance_step(fixed_now() + chrono::Duration::seconds(120));

        // Assert
        assert_eq!(early, None);
        assert_eq!(second, Some(50));
        assert_eq!(third, Some(100));
        assert_eq!(content.status, ContentStatus::Staging);
        assert!(!content.deploy_requested);
    }

    #[test]
    fn test_full_plan_does_not_stage() {
        let mut content = version(RolloutPlan::Full);

        assert!(!content.begin_staging(fixed_now()));

        content.promote(fixed_now());
        assert_eq!(content.status, ContentStatus::Production);
        assert_eq!(content.rollout_percentage, 100);
    }
}
