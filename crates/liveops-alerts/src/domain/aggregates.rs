//! Entity roots for the Alert context.

use chrono::{DateTime, Utc};
use liveops_core::aggregate::AggregateRoot;
use liveops_core::comparison::Comparison;
use liveops_core::error::DomainError;
use liveops_core::trigger::{Severity, TriggerMode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::RegisterAlert;

/// An alert that triggered on a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredAlert {
    /// The threshold alert, absent for manual alerts.
    pub alert_id: Option<Uuid>,
    /// Alert name, or the raiser for manual alerts.
    pub name: String,
    /// Alert severity.
    pub severity: Severity,
    /// Operator-facing message.
    pub message: String,
    /// Observed metric value.
    pub value: Option<f64>,
    /// When it triggered.
    pub triggered_at: DateTime<Utc>,
}

/// The entity root for a threshold alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Entity identifier.
    pub id: Uuid,
    /// Current version (lifecycle events emitted).
    pub version: i64,
    /// Display name.
    pub name: String,
    /// Watched metric.
    pub metric: String,
    /// How the metric compares to the threshold.
    pub operator: Comparison,
    /// Threshold value.
    pub threshold: f64,
    /// Alert severity.
    pub severity: Severity,
    /// Disabled alerts are not evaluated.
    pub enabled: bool,
    /// Level or edge firing.
    pub mode: TriggerMode,
    /// Whether the condition held at the last evaluation.
    pub active: bool,
    /// Metric value at the last evaluation.
    pub last_value: Option<f64>,
    /// When the alert last triggered.
    pub last_triggered: Option<DateTime<Utc>>,
    /// Times the alert triggered.
    pub trigger_count: u64,
    /// When the alert was registered.
    pub registered_at: DateTime<Utc>,
}

impl Alert {
    /// Validates a `RegisterAlert` command and builds the alert.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for an empty name or metric,
    /// a non-finite threshold or an unusable operator.
    pub fn register(
        id: Uuid,
        command: &RegisterAlert,
        default_mode: TriggerMode,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if command.name.trim().is_empty() || command.metric.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "alert name and metric are required".into(),
            ));
        }
        if !command.threshold.is_finite() {
            return Err(DomainError::InvariantViolation(format!(
                "alert {} has non-finite threshold",
                command.name
            )));
        }
        command.operator.validate()?;

        Ok(Self {
            id,
            version: 0,
            name: command.name.clone(),
            metric: command.metric.clone(),
            operator: command.operator,
            threshold: command.threshold,
            severity: command.severity,
            enabled: true,
            mode: command.mode.unwrap_or(default_mode),
            active: false,
            last_value: None,
            last_triggered: None,
            trigger_count: 0,
            registered_at: now,
        })
    }

    /// Whether the condition holds for a reading. A missing metric never
    /// holds.
    #[must_use]
    pub fn holds(&self, value: Option<f64>) -> bool {
        value.is_some_and(|v| self.operator.holds(v, self.threshold))
    }

    /// Operator-facing description of a trigger.
    #[must_use]
    pub fn describe(&self, value: f64) -> String {
        format!(
            "{} = {value} ({:?} {})",
            self.metric, self.operator, self.threshold
        )
    }
}

impl AggregateRoot for Alert {
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

    fn command(operator: Comparison, threshold: f64) -> RegisterAlert {
        RegisterAlert {
            correlation_id: Uuid::new_v4(),
            name: "crash rate".into(),
            metric: "crash_rate".into(),
            operator,
            threshold,
            severity: Severity::Critical,
            mode: None,
        }
    }

    #[test]
    fn test_missing_metric_never_holds() {
        let alert = Alert::register(
            Uuid::new_v4(),
            &command(Comparison::LessThan, 1.0),
            TriggerMode::Level,
            fixed_now(),
        )
        .unwrap();

        assert!(!alert.holds(None));
        assert!(alert.holds(Some(0.5)));
    }

    #[test]
    fn test_approx_equal_alert_uses_tolerance() {
        let alert = Alert::register(
            Uuid::new_v4(),
            &command(Comparison::ApproxEqual { tolerance: 0.5 }, 10.0),
            TriggerMode::Level,
            fixed_now(),
        )
        .unwrap();

        assert!(alert.holds(Some(10.4)));
        assert!(!alert.holds(Some(10.6)));
    }

    #[test]
    fn test_register_rejects_nan_threshold() {
        let result = Alert::register(
            Uuid::new_v4(),
            &command(Comparison::GreaterThan, f64::NAN),
            TriggerMode::Level,
            fixed_now(),
        );

        assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
    }
}
