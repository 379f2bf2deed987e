//! Lifecycle events for the Automation Rule context.

use liveops_core::event::{DomainEvent, EventMetadata};
use liveops_core::trigger::TriggerMode;
use serde::{Deserialize, Serialize};

use super::aggregates::TriggerKind;

/// Event type for `RuleRegistered`.
pub const RULE_REGISTERED_EVENT_TYPE: &str = "automation.rule_registered";
/// Event type for `RuleEnabled`.
pub const RULE_ENABLED_EVENT_TYPE: &str = "automation.rule_enabled";
/// Event type for `RuleDisabled`.
pub const RULE_DISABLED_EVENT_TYPE: &str = "automation.rule_disabled";
/// Event type for `RuleFired`.
pub const RULE_FIRED_EVENT_TYPE: &str = "automation.rule_fired";
/// Event type for `ActionFailed`.
pub const ACTION_FAILED_EVENT_TYPE: &str = "automation.action_failed";

/// Emitted when a rule is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRegistered {
    /// Display name.
    pub name: String,
    /// Signal the rule reacts to.
    pub trigger: TriggerKind,
    /// Firing mode.
    pub mode: TriggerMode,
}

/// Emitted when a rule fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFired {
    /// Times the rule has fired, this one included.
    pub trigger_count: u64,
    /// Actions about to run.
    pub actions: usize,
}

/// Emitted when one action of a fired rule fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFailed {
    /// Position of the action in the rule.
    pub action_index: usize,
    /// Action kind.
    pub action: String,
    /// Error message.
    pub error: String,
}

/// Event payload variants for the Automation Rule context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutomationEventKind {
    /// A rule was registered.
    RuleRegistered(RuleRegistered),
    /// A rule was enabled.
    RuleEnabled,
    /// A rule was disabled.
    RuleDisabled,
    /// A rule fired.
    RuleFired(RuleFired),
    /// An action failed.
    ActionFailed(ActionFailed),
}

impl AutomationEventKind {
    /// The routing name of this variant.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RuleRegistered(_) => RULE_REGISTERED_EVENT_TYPE,
            Self::RuleEnabled => RULE_ENABLED_EVENT_TYPE,
            Self::RuleDisabled => RULE_DISABLED_EVENT_TYPE,
            Self::RuleFired(_) => RULE_FIRED_EVENT_TYPE,
            Self::ActionFailed(_) => ACTION_FAILED_EVENT_TYPE,
        }
    }
}

/// Lifecycle event envelope for the Automation Rule context.
#[derive(Debug, Clone)]
pub struct AutomationEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: AutomationEventKind,
}

impl DomainEvent for AutomationEvent {
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
