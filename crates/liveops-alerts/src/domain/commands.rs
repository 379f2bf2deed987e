//! Commands for the Alert context.

use liveops_core::command::Command;
use liveops_core::comparison::Comparison;
use liveops_core::trigger::{Severity, TriggerMode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Command to register a threshold alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAlert {
    /// The correlation ID for tracing.
    #[serde(default = "Uuid::new_v4")]
    pub correlation_id: Uuid,
    /// Display name.
    pub name: String,
    /// Watched metric.
    pub metric: String,
    /// How the metric compares to the threshold.
    pub operator: Comparison,
    /// Threshold value.
    pub threshold: f64,
    /// Alert severity.
    #[serde(default)]
    pub severity: Severity,
    /// Firing mode; the evaluator default when absent.
    #[serde(default)]
    pub mode: Option<TriggerMode>,
}

impl Command for RegisterAlert {
    fn command_type(&self) -> &'static str {
        "alerts.register_alert"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to enable or disable an alert.
#[derive(Debug, Clone)]
pub struct SetAlertEnabled {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The alert.
    pub alert_id: Uuid,
    /// New flag.
    pub enabled: bool,
}

impl Command for SetAlertEnabled {
    fn command_type(&self) -> &'static str {
        "alerts.set_alert_enabled"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to raise an alert by hand.
#[derive(Debug, Clone)]
pub struct RaiseAlert {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Who raised it, e.g. an automation rule name.
    pub raised_by: String,
    /// Alert severity.
    pub severity: Severity,
    /// Operator-facing message.
    pub message: String,
}

impl Command for RaiseAlert {
    fn command_type(&self) -> &'static str {
        "alerts.raise_alert"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
