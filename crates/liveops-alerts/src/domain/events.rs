//! Lifecycle events for the Alert context.

use liveops_core::event::{DomainEvent, EventMetadata};
use liveops_core::trigger::{Severity, TriggerMode};
use serde::{Deserialize, Serialize};

/// Event type for `AlertRegistered`.
pub const ALERT_REGISTERED_EVENT_TYPE: &str = "alerts.alert_registered";
/// Event type for `AlertEnabled`.
pub const ALERT_ENABLED_EVENT_TYPE: &str = "alerts.alert_enabled";
/// Event type for `AlertDisabled`.
pub const ALERT_DISABLED_EVENT_TYPE: &str = "alerts.alert_disabled";
/// Event type for `AlertTriggered`.
pub const ALERT_TRIGGERED_EVENT_TYPE: &str = "alerts.alert_triggered";
/// Event type for `AlertCleared`.
pub const ALERT_CLEARED_EVENT_TYPE: &str = "alerts.alert_cleared";
/// Event type for `ManualAlertRaised`.
pub const MANUAL_ALERT_RAISED_EVENT_TYPE: &str = "alerts.manual_alert_raised";

/// Emitted when an alert is registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRegistered {
    /// Display name.
    pub name: String,
    /// Watched metric.
    pub metric: String,
    /// Threshold value.
    pub threshold: f64,
    /// Firing mode.
    pub mode: TriggerMode,
}

/// Emitted when an alert triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTriggered {
    /// Observed value.
    pub value: f64,
    /// Alert severity.
    pub severity: Severity,
    /// Times the alert has triggered, this one included.
    pub trigger_count: u64,
}

/// Emitted when a manual alert is raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualAlertRaised {
    /// Who raised it.
    pub raised_by: String,
    /// Alert severity.
    pub severity: Severity,
    /// Operator-facing message.
    pub message: String,
}

/// Event payload variants for the Alert context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlertEventKind {
    /// An alert was registered.
    AlertRegistered(AlertRegistered),
    /// An alert was enabled.
    AlertEnabled,
    /// An alert was disabled.
    AlertDisabled,
    /// An alert's condition held and it fired.
    AlertTriggered(AlertTriggered),
    /// An active alert's condition stopped holding.
    AlertCleared,
    /// An alert was raised by hand.
    ManualAlertRaised(ManualAlertRaised),
}

impl AlertEventKind {
    /// The routing name of this variant.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AlertRegistered(_) => ALERT_REGISTERED_EVENT_TYPE,
            Self::AlertEnabled => ALERT_ENABLED_EVENT_TYPE,
            Self::AlertDisabled => ALERT_DISABLED_EVENT_TYPE,
            Self::AlertTriggered(_) => ALERT_TRIGGERED_EVENT_TYPE,
            Self::AlertCleared => ALERT_CLEARED_EVENT_TYPE,
            Self::ManualAlertRaised(_) => MANUAL_ALERT_RAISED_EVENT_TYPE,
        }
    }
}

/// Lifecycle event envelope for the Alert context.
#[derive(Debug, Clone)]
pub struct AlertEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: AlertEventKind,
}

impl DomainEvent for AlertEvent {
    fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(&self.kind).unwrap_or_default()
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
