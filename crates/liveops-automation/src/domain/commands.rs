//! Commands for the Automation Rule context.

use liveops_core::command::Command;
use liveops_core::trigger::TriggerMode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregates::{Action, Condition, TriggerKind};

/// Command to register an automation rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRule {
    /// The correlation ID for tracing.
    #[serde(default = "Uuid::new_v4")]
    pub correlation_id: Uuid,
    /// Display name.
    pub name: String,
    /// Signal the rule reacts to.
    pub trigger: TriggerKind,
    /// Firing mode; the engine default when absent.
    #[serde(default)]
    pub mode: Option<TriggerMode>,
    /// Conditions, all of which must hold.
    pub conditions: Vec<Condition>,
    /// Actions, run in order.
    pub actions: Vec<Action>,
}

impl Command for RegisterRule {
    fn command_type(&self) -> &'static str {
        "automation.register_rule"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to enable or disable a rule.
#[derive(Debug, Clone)]
pub struct SetRuleEnabled {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The rule.
    pub rule_id: Uuid,
    /// New flag.
    pub enabled: bool,
}

impl Command for SetRuleEnabled {
    fn command_type(&self) -> &'static str {
        "automation.set_rule_enabled"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
