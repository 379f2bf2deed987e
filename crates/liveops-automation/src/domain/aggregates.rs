//! Entity roots for the Automation Rule context.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use liveops_core::aggregate::AggregateRoot;
use liveops_core::comparison::{Comparison, FieldValue};
use liveops_core::error::DomainError;
use liveops_core::trigger::{Severity, TriggerMode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::RegisterRule;

/// Failures kept per rule; older entries are dropped first.
pub const FAILURE_LOG_CAPACITY: usize = 16;

/// Kinds of entity a condition can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A promotional event.
    LiveEvent,
    /// A content version.
    ContentVersion,
    /// An A/B test.
    AbTest,
    /// A notification campaign.
    Campaign,
}

impl EntityKind {
    /// Lower-case name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LiveEvent => "live_event",
            Self::ContentVersion => "content_version",
            Self::AbTest => "ab_test",
            Self::Campaign => "campaign",
        }
    }
}

/// Where a condition reads its observed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ConditionSource {
    /// A metric in the metric store.
    Metric {
        /// Metric name.
        name: String,
    },
    /// A named field of an entity owned by another component.
    Entity {
        /// Entity kind.
        kind: EntityKind,
        /// Entity identifier.
        id: Uuid,
        /// Field name, e.g. `status`.
        field: String,
    },
    /// Whether an alert is currently active, observed as `1` or `0`.
    AlertActive {
        /// The alert.
        alert_id: Uuid,
    },
}

/// One clause of a rule. A missing observed value never holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Observed value source.
    #[serde(flatten)]
    pub source: ConditionSource,
    /// How the observed value compares to the threshold.
    pub operator: Comparison,
    /// Right-hand side of the comparison.
    pub threshold: FieldValue,
}

impl Condition {
    /// A metric comparison, e.g. `error_rate > 0.05`.
    #[must_use]
    pub fn metric(name: impl Into<String>, operator: Comparison, threshold: f64) -> Self {
        Self {
            source: ConditionSource::Metric { name: name.into() },
            operator,
            threshold: FieldValue::Number(threshold),
        }
    }

    /// An entity field comparison, e.g. `content_version.status == "production"`.
    #[must_use]
    pub fn entity(
        kind: EntityKind,
        id: Uuid,
        field: impl Into<String>,
        operator: Comparison,
        threshold: impl Into<FieldValue>,
    ) -> Self {
        Self {
            source: ConditionSource::Entity {
                kind,
                id,
                field: field.into(),
            },
            operator,
            threshold: threshold.into(),
        }
    }

    /// Holds while the alert is active.
    #[must_use]
    pub fn alert_active(alert_id: Uuid) -> Self {
        Self {
            source: ConditionSource::AlertActive { alert_id },
            operator: Comparison::Equals,
            threshold: FieldValue::Number(1.0),
        }
    }

    /// Rejects conditions that could never be evaluated.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for an empty metric or field
    /// name, an unusable operator, or an ordering operator against text.
    pub fn validate(&self) -> Result<(), DomainError> {
        self.operator.validate()?;
        match &self.source {
            ConditionSource::Metric { name } if name.trim().is_empty() => {
                return Err(DomainError::InvariantViolation(
                    "metric condition needs a metric name".into(),
                ));
            }
            ConditionSource::Entity { field, .. } if field.trim().is_empty() => {
                return Err(DomainError::InvariantViolation(
                    "entity condition needs a field name".into(),
                ));
            }
            ConditionSource::Metric { .. } | ConditionSource::AlertActive { .. }
                if !matches!(self.threshold, FieldValue::Number(_)) =>
            {
                return Err(DomainError::InvariantViolation(
                    "metric and alert conditions compare against numbers".into(),
                ));
            }
            _ => {}
        }
        if self.operator.is_numeric_only() && matches!(self.threshold, FieldValue::Text(_)) {
            return Err(DomainError::InvariantViolation(format!(
                "operator {:?} cannot compare text",
                self.operator
            )));
        }
        Ok(())
    }

    /// Whether the condition holds for an observed value.
    #[must_use]
    pub fn holds(&self, observed: Option<&FieldValue>) -> bool {
        observed.is_some_and(|value| self.operator.holds_for(value, &self.threshold))
    }
}

/// The closed set of things a rule can do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Request deployment of a content version.
    DeployContent {
        /// The version.
        version_id: Uuid,
    },
    /// Roll back a live content version.
    RollbackContent {
        /// The version.
        version_id: Uuid,
        /// Recorded on the rollback.
        #[serde(default)]
        reason: String,
    },
    /// Send a campaign on this pass regardless of its schedule.
    SendNotification {
        /// The campaign.
        campaign_id: Uuid,
    },
    /// Raise a manual alert.
    RaiseAlert {
        /// Alert severity.
        #[serde(default)]
        severity: Severity,
        /// Operator-facing message.
        message: String,
    },
    /// Write a metric. Writes are applied after every rule of the pass has
    /// been evaluated.
    SetMetric {
        /// Metric name.
        name: String,
        /// New value.
        value: f64,
    },
}

impl Action {
    /// Lower-case name of the action kind.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::DeployContent { .. } => "deploy_content",
            Self::RollbackContent { .. } => "rollback_content",
            Self::SendNotification { .. } => "send_notification",
            Self::RaiseAlert { .. } => "raise_alert",
            Self::SetMetric { .. } => "set_metric",
        }
    }

    /// Rejects actions with unusable parameters.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for an empty alert message,
    /// an empty metric name or a non-finite metric value.
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            Self::RaiseAlert { message, .. } if message.trim().is_empty() => Err(
                DomainError::InvariantViolation("raise_alert needs a message".into()),
            ),
            Self::SetMetric { name, value } if name.trim().is_empty() || !value.is_finite() => {
                Err(DomainError::InvariantViolation(format!(
                    "set_metric needs a name and a finite value, got `{name}` = {value}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// What kind of signal a rule reacts to. Each kind admits only conditions
/// reading from its source; `Composite` admits any mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Metric store readings.
    MetricThreshold,
    /// Entity fields.
    EntityState,
    /// Active alerts.
    AlertRaised,
    /// Any combination.
    Composite,
}

impl TriggerKind {
    /// Whether a condition reading from `source` fits this trigger.
    #[must_use]
    pub fn accepts(self, source: &ConditionSource) -> bool {
        matches!(
            (self, source),
            (Self::Composite, _)
                | (Self::MetricThreshold, ConditionSource::Metric { .. })
                | (Self::EntityState, ConditionSource::Entity { .. })
                | (Self::AlertRaised, ConditionSource::AlertActive { .. })
        )
    }
}

/// A failed action, kept for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFailure {
    /// When it failed.
    pub at: DateTime<Utc>,
    /// Position of the action in the rule.
    pub action_index: usize,
    /// Action kind.
    pub action: String,
    /// Error message.
    pub error: String,
}

/// The entity root for an automation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRule {
    /// Entity identifier.
    pub id: Uuid,
    /// Current version (lifecycle events emitted).
    pub version: i64,
    /// Display name.
    pub name: String,
    /// Signal the rule reacts to.
    pub trigger: TriggerKind,
    /// Level or edge firing.
    pub mode: TriggerMode,
    /// Conditions, all of which must hold.
    pub conditions: Vec<Condition>,
    /// Actions, run in order.
    pub actions: Vec<Action>,
    /// Disabled rules are not evaluated.
    pub enabled: bool,
    /// When the rule last fired.
    pub last_triggered: Option<DateTime<Utc>>,
    /// Times the rule fired.
    pub trigger_count: u64,
    /// Whether the conditions held at the last evaluation.
    pub condition_held: bool,
    /// The pass in which the rule last fired.
    pub last_fired_pass: Option<Uuid>,
    /// Most recent action failures, oldest first.
    pub failures: VecDeque<RuleFailure>,
    /// Action failures over the rule's lifetime.
    pub failure_count: u64,
    /// When the rule was registered.
    pub registered_at: DateTime<Utc>,
}

impl AutomationRule {
    /// Validates a `RegisterRule` command and builds the rule.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` if the rule has no name, no
    /// conditions or no actions, a condition or action is malformed, or a
    /// condition does not fit the trigger kind.
    pub fn register(
        id: Uuid,
        command: &RegisterRule,
        default_mode: TriggerMode,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if command.name.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "rule name must not be empty".into(),
            ));
        }
        if command.conditions.is_empty() || command.actions.is_empty() {
            return Err(DomainError::InvariantViolation(format!(
                "rule {} needs at least one condition and one action",
                command.name
            )));
        }
        for condition in &command.conditions {
            condition.validate()?;
            if !command.trigger.accepts(&condition.source) {
                return Err(DomainError::InvariantViolation(format!(
                    "rule {} is {:?} but has a condition on {:?}",
                    command.name, command.trigger, condition.source
                )));
            }
        }
        for action in &command.actions {
            action.validate()?;
        }

        Ok(Self {
            id,
            version: 0,
            name: command.name.clone(),
            trigger: command.trigger,
            mode: command.mode.unwrap_or(default_mode),
            conditions: command.conditions.clone(),
            actions: command.actions.clone(),
            enabled: true,
            last_triggered: None,
            trigger_count: 0,
            condition_held: false,
            last_fired_pass: None,
            failures: VecDeque::new(),
            failure_count: 0,
            registered_at: now,
        })
    }

    /// Records that the rule fired in `pass_id`.
    pub fn mark_fired(&mut self, pass_id: Uuid, now: DateTime<Utc>) {
        self.last_triggered = Some(now);
        self.trigger_count += 1;
        self.last_fired_pass = Some(pass_id);
    }

    /// Appends to the bounded failure log.
    pub fn record_failure(&mut self, failure: RuleFailure) {
        if self.failures.len() == FAILURE_LOG_CAPACITY {
            self.failures.pop_front();
        }
        self.failures.push_back(failure);
        self.failure_count += 1;
    }
}

impl AggregateRoot for AutomationRule {
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

    fn command(trigger: TriggerKind, conditions: Vec<Condition>) -> RegisterRule {
        RegisterRule {
            correlation_id: Uuid::new_v4(),
            name: "rollback on errors".into(),
            trigger,
            mode: None,
            conditions,
            actions: vec![Action::RollbackContent {
                version_id: Uuid::new_v4(),
                reason: "error spike".into(),
            }],
        }
    }

    #[test]
    fn test_register_takes_default_mode_when_unset() {
        let cmd = command(
            TriggerKind::MetricThreshold,
            vec![Condition::metric("error_rate", Comparison::GreaterThan, 0.05)],
        );

        let rule = AutomationRule::register(Uuid::new_v4(), &cmd, TriggerMode::Edge, fixed_now())
            .unwrap();

        assert_eq!(rule.mode, TriggerMode::Edge);
        assert!(rule.enabled);
        assert_eq!(rule.trigger_count, 0);
    }

    #[test]
    fn test_register_rejects_condition_outside_trigger_kind() {
        let cmd = command(
            TriggerKind::MetricThreshold,
            vec![Condition::alert_active(Uuid::new_v4())],
        );

        let result =
            AutomationRule::register(Uuid::new_v4(), &cmd, TriggerMode::Level, fixed_now());

        assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn test_register_rejects_ordering_against_text() {
        let cmd = command(
            TriggerKind::EntityState,
            vec![Condition::entity(
                EntityKind::ContentVersion,
                Uuid::new_v4(),
                "status",
                Comparison::GreaterThan,
                "production",
            )],
        );

        let result =
            AutomationRule::register(Uuid::new_v4(), &cmd, TriggerMode::Level, fixed_now());

        assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn test_register_rejects_empty_rule() {
        let cmd = command(TriggerKind::Composite, Vec::new());

        assert!(
            AutomationRule::register(Uuid::new_v4(), &cmd, TriggerMode::Level, fixed_now())
                .is_err()
        );
    }

    #[test]
    fn test_condition_with_missing_value_does_not_hold() {
        let condition = Condition::metric("error_rate", Comparison::LessThan, 0.05);

        assert!(!condition.holds(None));
        assert!(condition.holds(Some(&FieldValue::Number(0.01))));
    }

    #[test]
    fn test_failure_log_is_bounded() {
        // Arrange
        let cmd = command(
            TriggerKind::MetricThreshold,
            vec![Condition::metric("error_rate", Comparison::GreaterThan, 0.05)],
        );
        let mut rule =
            AutomationRule::register(Uuid::new_v4(), &cmd, TriggerMode::Level, fixed_now())
                .unwrap();

        // Act
        for i in 0..(FAILURE_LOG_CAPACITY + 4) {
            rule.record_failure(RuleFailure {
                at: fixed_now(),
                action_index: i,
                action: "rollback_content".into(),
                error: "gone".into(),
            });
        }

        // Assert
        assert_eq!(rule.failures.len(), FAILURE_LOG_CAPACITY);
        assert_eq!(rule.failures.front().unwrap().action_index, 4);
        assert_eq!(rule.failure_count, 20);
    }

    #[test]
    fn test_action_deserializes_from_tagged_shape() {
        let action: Action = serde_json::from_value(serde_json::json!({
            "action": "set_metric",
            "name": "promo_boost",
            "value": 1.5
        }))
        .unwrap();

        assert_eq!(
            action,
            Action::SetMetric {
                name: "promo_boost".into(),
                value: 1.5
            }
        );
        assert_eq!(action.kind_name(), "set_metric");
    }
}
