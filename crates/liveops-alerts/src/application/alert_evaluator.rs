//! The Alert Evaluator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use liveops_core::aggregate::AggregateRoot;
use liveops_core::error::DomainError;
use liveops_core::event::{EventMetadata, Outbox};
use liveops_core::metrics::MetricStore;
use liveops_core::trigger::TriggerMode;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::aggregates::{Alert, TriggeredAlert};
use crate::domain::commands::{RaiseAlert, RegisterAlert, SetAlertEnabled};
use crate::domain::events::{
    AlertEvent, AlertEventKind, AlertRegistered, AlertTriggered, ManualAlertRaised,
};

/// Compares metrics to thresholds and collects manual alerts.
#[derive(Debug, Default)]
pub struct AlertEvaluator {
    alerts: BTreeMap<Uuid, Alert>,
    manual: Vec<TriggeredAlert>,
    manual_total: u64,
    outbox: Outbox<AlertEvent>,
    default_mode: TriggerMode,
}

fn emit(
    outbox: &mut Outbox<AlertEvent>,
    alert: &mut Alert,
    kind: AlertEventKind,
    correlation_id: Uuid,
    now: DateTime<Utc>,
) {
    let sequence = alert.next_version();
    outbox.push(AlertEvent {
        metadata: EventMetadata::new(kind.event_type(), alert.id, sequence, correlation_id, now),
        kind,
    });
}

impl AlertEvaluator {
    /// Creates an evaluator whose alerts default to `default_mode`.
    #[must_use]
    pub fn new(default_mode: TriggerMode) -> Self {
        Self {
            default_mode,
            ..Self::default()
        }
    }

    /// Registers a threshold alert, enabled.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` if the alert is malformed.
    pub fn register(
        &mut self,
        command: &RegisterAlert,
        now: DateTime<Utc>,
    ) -> Result<Uuid, DomainError> {
        let mut alert = Alert::register(Uuid::new_v4(), command, self.default_mode, now)?;
        let id = alert.id;
        let registered = AlertEventKind::AlertRegistered(AlertRegistered {
            name: alert.name.clone(),
            metric: alert.metric.clone(),
            threshold: alert.threshold,
            mode: alert.mode,
        });
        emit(&mut self.outbox, &mut alert, registered, command.correlation_id, now);
        info!(alert_id = %id, name = %alert.name, metric = %alert.metric, "alert registered");
        self.alerts.insert(id, alert);
        Ok(id)
    }

    /// Enables or disables an alert. A disabled alert is never active.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown alert.
    pub fn set_enabled(
        &mut self,
        command: &SetAlertEnabled,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let alert = self
            .alerts
            .get_mut(&command.alert_id)
            .ok_or(DomainError::NotFound(command.alert_id))?;
        if alert.enabled == command.enabled {
            return Ok(());
        }
        alert.enabled = command.enabled;
        alert.active = false;
        let kind = if command.enabled {
            AlertEventKind::AlertEnabled
        } else {
            AlertEventKind::AlertDisabled
        };
        emit(&mut self.outbox, alert, kind, command.correlation_id, now);
        info!(alert_id = %alert.id, enabled = command.enabled, "alert toggled");
        Ok(())
    }

    /// Raises an alert by hand. It is reported by the next [`Self::tick`].
    /// Returns the identifier of the raised alert.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for an empty message.
    pub fn raise_manual(
        &mut self,
        command: &RaiseAlert,
        now: DateTime<Utc>,
    ) -> Result<Uuid, DomainError> {
        if command.message.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "manual alert needs a message".into(),
            ));
        }
        let id = Uuid::new_v4();
        let kind = AlertEventKind::ManualAlertRaised(ManualAlertRaised {
            raised_by: command.raised_by.clone(),
            severity: command.severity,
            message: command.message.clone(),
        });
        self.outbox.push(AlertEvent {
            metadata: EventMetadata::new(kind.event_type(), id, 1, command.correlation_id, now),
            kind,
        });
        warn!(raised_by = %command.raised_by, severity = command.severity.as_str(), message = %command.message, "manual alert raised");
        self.manual.push(TriggeredAlert {
            alert_id: None,
            name: command.raised_by.clone(),
            severity: command.severity,
            message: command.message.clone(),
            value: None,
            triggered_at: now,
        });
        self.manual_total += 1;
        Ok(id)
    }

    /// Evaluates every enabled alert and returns the alerts that triggered
    /// on this pass: manual alerts raised since the last pass first, then
    /// threshold alerts in identifier order.
    pub fn tick(
        &mut self,
        now: DateTime<Utc>,
        correlation_id: Uuid,
        metrics: &MetricStore,
    ) -> Vec<TriggeredAlert> {
        let mut triggered = std::mem::take(&mut self.manual);
        for alert in self.alerts.values_mut().filter(|a| a.enabled) {
            let value = metrics.get(&alert.metric);
            let holds = alert.holds(value);
            let fires = alert.mode.fires(alert.active, holds);
            if alert.active && !holds {
                emit(&mut self.outbox, alert, AlertEventKind::AlertCleared, correlation_id, now);
                info!(alert_id = %alert.id, "alert cleared");
            }
            alert.active = holds;
            alert.last_value = value;
            let (true, Some(value)) = (fires, value) else {
                continue;
            };
            alert.last_triggered = Some(now);
            alert.trigger_count += 1;
            let kind = AlertEventKind::AlertTriggered(AlertTriggered {
                value,
                severity: alert.severity,
                trigger_count: alert.trigger_count,
            });
            emit(&mut self.outbox, alert, kind, correlation_id, now);
            warn!(alert_id = %alert.id, name = %alert.name, value, severity = alert.severity.as_str(), "alert triggered");
            triggered.push(TriggeredAlert {
                alert_id: Some(alert.id),
                name: alert.name.clone(),
                severity: alert.severity,
                message: alert.describe(value),
                value: Some(value),
                triggered_at: now,
            });
        }
        debug!(triggered = triggered.len(), "alert pass finished");
        triggered
    }

    /// Whether an alert is active, or `None` for an unknown alert.
    #[must_use]
    pub fn is_active(&self, alert_id: Uuid) -> Option<bool> {
        self.alerts.get(&alert_id).map(|a| a.enabled && a.active)
    }

    /// Number of active alerts.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.alerts.values().filter(|a| a.enabled && a.active).count()
    }

    /// Threshold triggers plus manual alerts over the evaluator's lifetime.
    #[must_use]
    pub fn triggered_total(&self) -> u64 {
        self.alerts.values().map(|a| a.trigger_count).sum::<u64>() + self.manual_total
    }

    /// A copy of one alert.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown alert.
    pub fn get(&self, alert_id: Uuid) -> Result<Alert, DomainError> {
        self.alerts
            .get(&alert_id)
            .cloned()
            .ok_or(DomainError::NotFound(alert_id))
    }

    /// Removes and returns buffered lifecycle events, oldest first.
    pub fn drain_events(&mut self) -> Vec<AlertEvent> {
        self.outbox.drain()
    }

    /// Serializes every threshold alert.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if serialization fails.
    pub fn snapshot(&self) -> Result<serde_json::Value, DomainError> {
        let alerts: Vec<&Alert> = self.alerts.values().collect();
        serde_json::to_value(alerts)
            .map_err(|e| DomainError::Infrastructure(format!("alert snapshot failed: {e}")))
    }

    /// Replaces the store with a snapshot taken by [`Self::snapshot`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the blob cannot be decoded.
    pub fn restore(&mut self, blob: serde_json::Value) -> Result<(), DomainError> {
        let alerts: Vec<Alert> = serde_json::from_value(blob)
            .map_err(|e| DomainError::Infrastructure(format!("alert restore failed: {e}")))?;
        self.alerts = alerts.into_iter().map(|a| (a.id, a)).collect();
        info!(alerts = self.alerts.len(), "alerts restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use liveops_core::comparison::Comparison;
    use liveops_core::trigger::Severity;
    use liveops_test_support::fixed_now;

    use super::*;

    fn register(evaluator: &mut AlertEvaluator, mode: Option<TriggerMode>) -> Uuid {
        evaluator
            .register(
                &RegisterAlert {
                    correlation_id: Uuid::new_v4(),
                    name: "error rate high".into(),
                    metric: "error_rate".into(),
                    operator: Comparison::GreaterThan,
                    threshold: 0.05,
                    severity: Severity::Critical,
                    mode,
                },
                fixed_now(),
            )
            .unwrap()
    }

    #[test]
    fn test_level_alert_refires_every_pass() {
        // Arrange
        let mut evaluator = AlertEvaluator::default();
        let id = register(&mut evaluator, None);
        let mut metrics = MetricStore::new();
        metrics.set("error_rate", 0.10, fixed_now());

        // Act
        let first = evaluator.tick(fixed_now(), Uuid::new_v4(), &metrics);
        let second = evaluator.tick(fixed_now(), Uuid::new_v4(), &metrics);

        // Assert
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].alert_id, Some(id));
        assert_eq!(first[0].value, Some(0.10));
        assert_eq!(evaluator.get(id).unwrap().trigger_count, 2);
        assert_eq!(evaluator.is_active(id), Some(true));
    }

    #[test]
    fn test_edge_alert_fires_on_rising_transition_only() {
        // Arrange
        let mut evaluator = AlertEvaluator::default();
        let id = register(&mut evaluator, Some(TriggerMode::Edge));
        let mut metrics = MetricStore::new();

        // Act
        metrics.set("error_rate", 0.10, fixed_now());
        let raised = evaluator.tick(fixed_now(), Uuid::new_v4(), &metrics).len();
        let held = evaluator.tick(fixed_now(), Uuid::new_v4(), &metrics).len();
        metrics.set("error_rate", 0.01, fixed_now());
        let cleared = evaluator.tick(fixed_now(), Uuid::new_v4(), &metrics).len();
        let active_after_clear = evaluator.is_active(id);
        metrics.set("error_rate", 0.20, fixed_now());
        let reraised = evaluator.tick(fixed_now(), Uuid::new_v4(), &metrics).len();

        // Assert
        assert_eq!((raised, held, cleared, reraised), (1, 0, 0, 1));
        assert_eq!(active_after_clear, Some(false));
        assert!(
            evaluator
                .drain_events()
                .iter()
                .any(|e| e.metadata.event_type == "alerts.alert_cleared")
        );
    }

    #[test]
    fn test_missing_metric_does_not_trigger() {
        let mut evaluator = AlertEvaluator::default();
        let id = register(&mut evaluator, None);

        let triggered = evaluator.tick(fixed_now(), Uuid::new_v4(), &MetricStore::new());

        assert!(triggered.is_empty());
        assert_eq!(evaluator.is_active(id), Some(false));
    }

    #[test]
    fn test_manual_alert_is_reported_once_on_next_pass() {
        // Arrange
        let mut evaluator = AlertEvaluator::default();
        evaluator
            .raise_manual(
                &RaiseAlert {
                    correlation_id: Uuid::new_v4(),
                    raised_by: "rollback rule".into(),
                    severity: Severity::Warning,
                    message: "content rolled back".into(),
                },
                fixed_now(),
            )
            .unwrap();

        // Act
        let first = evaluator.tick(fixed_now(), Uuid::new_v4(), &MetricStore::new());
        let second = evaluator.tick(fixed_now(), Uuid::new_v4(), &MetricStore::new());

        // Assert
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].alert_id, None);
        assert_eq!(first[0].message, "content rolled back");
        assert!(second.is_empty());
        assert_eq!(evaluator.triggered_total(), 1);
    }

    #[test]
    fn test_disabled_alert_is_inactive_and_silent() {
        let mut evaluator = AlertEvaluator::default();
        let id = register(&mut evaluator, None);
        let mut metrics = MetricStore::new();
        metrics.set("error_rate", 0.10, fixed_now());
        evaluator.tick(fixed_now(), Uuid::new_v4(), &metrics);

        evaluator
            .set_enabled(
                &SetAlertEnabled {
                    correlation_id: Uuid::new_v4(),
                    alert_id: id,
                    enabled: false,
                },
                fixed_now(),
            )
            .unwrap();
        let triggered = evaluator.tick(fixed_now(), Uuid::new_v4(), &metrics);

        assert!(triggered.is_empty());
        assert_eq!(evaluator.is_active(id), Some(false));
        assert_eq!(evaluator.active_count(), 0);
    }
}
