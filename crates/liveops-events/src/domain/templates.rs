//! Reusable event templates.
//!
//! Operators keep recurring events (the Monday daily, the monthly tournament)
//! as YAML templates and instantiate them for a concrete start time.

use chrono::{DateTime, Duration, Utc};
use liveops_core::error::DomainError;
use liveops_core::ports::RewardSpec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregates::{CompletionPolicy, EventType, Objective};
use super::commands::ScheduleEvent;

/// A live event without a concrete window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTemplate {
    /// Display name given to instances.
    pub name: String,
    /// Event category.
    pub event_type: EventType,
    /// Window length in minutes.
    pub duration_minutes: u32,
    /// Objectives, in order.
    pub objectives: Vec<Objective>,
    /// Rewards for finishers.
    #[serde(default)]
    pub rewards: Vec<RewardSpec>,
    /// Segment restricting participation.
    #[serde(default)]
    pub target_segment: Option<String>,
    /// Completion policy.
    #[serde(default)]
    pub completion_policy: CompletionPolicy,
}

impl EventTemplate {
    /// Parses a template from YAML.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` if the document is not a
    /// valid template or its duration is zero.
    pub fn from_yaml(document: &str) -> Result<Self, DomainError> {
        let template: Self = serde_yaml::from_str(document)
            .map_err(|e| DomainError::InvariantViolation(format!("invalid event template: {e}")))?;
        if template.duration_minutes == 0 {
            return Err(DomainError::InvariantViolation(format!(
                "event template {} has a zero duration",
                template.name
            )));
        }
        Ok(template)
    }

    /// Builds the command that schedules one instance starting at `starts_at`.
    #[must_use]
    pub fn instantiate(&self, correlation_id: Uuid, starts_at: DateTime<Utc>) -> ScheduleEvent {
        ScheduleEvent {
            correlation_id,
            name: self.name.clone(),
            event_type: self.event_type.clone(),
            starts_at,
            ends_at: starts_at + Duration::minutes(i64::from(self.duration_minutes)),
            objectives: self.objectives.clone(),
            rewards: self.rewards.clone(),
            target_segment: self.target_segment.clone(),
            completion_policy: self.completion_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use liveops_core::ports::RewardKind;
    use liveops_test_support::fixed_now;

    use super::*;

    const DAILY: &str = r"
name: Daily Grind
event_type: daily
duration_minutes: 1440
objectives:
  - id: levels
    description: Clear five levels
    requirements:
      levels_completed: 5
rewards:
  - reward_id: coins
    kind: currency
    currency: coins
    amount: 250
completion_policy: end_of_window
";

    #[test]
    fn test_from_yaml_parses_template() {
        // Act
        let template = EventTemplate::from_yaml(DAILY).unwrap();

        // Assert
        assert_eq!(template.event_type, EventType::Daily);
        assert_eq!(template.objectives[0].requirements["levels_completed"], 5);
        assert_eq!(
            template.rewards[0].kind,
            RewardKind::Currency {
                currency: "coins".into(),
                amount: 250
            }
        );
        assert_eq!(template.completion_policy, CompletionPolicy::EndOfWindow);
        assert!(template.target_segment.is_none());
    }

    #[test]
    fn test_from_yaml_rejects_zero_duration() {
        let document = DAILY.replace("1440", "0");

        assert!(matches!(
            EventTemplate::from_yaml(&document),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_instantiate_sets_window() {
        // Arrange
        let template = EventTemplate::from_yaml(DAILY).unwrap();
        let correlation_id = Uuid::new_v4();

        // Act
        let command = template.instantiate(correlation_id, fixed_now());

        // Assert
        assert_eq!(command.correlation_id, correlation_id);
        assert_eq!(command.starts_at, fixed_now());
        assert_eq!(command.ends_at, fixed_now() + Duration::days(1));
        assert_eq!(command.name, "Daily Grind");
    }
}
