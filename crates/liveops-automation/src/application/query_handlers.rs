//! Query views for the Automation Rule context.

use chrono::{DateTime, Utc};
use liveops_core::trigger::TriggerMode;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{AutomationRule, RuleFailure, TriggerKind};

/// Read-only summary of an automation rule.
#[derive(Debug, Clone, Serialize)]
pub struct AutomationRuleView {
    /// The rule identifier.
    pub rule_id: Uuid,
    /// Display name.
    pub name: String,
    /// Signal the rule reacts to.
    pub trigger: TriggerKind,
    /// Firing mode.
    pub mode: TriggerMode,
    /// Whether the rule is evaluated.
    pub enabled: bool,
    /// Times the rule fired.
    pub trigger_count: u64,
    /// When the rule last fired.
    pub last_triggered: Option<DateTime<Utc>>,
    /// Action failures over the rule's lifetime.
    pub failure_count: u64,
    /// The most recent failure, if any.
    pub last_failure: Option<RuleFailure>,
}

impl From<&AutomationRule> for AutomationRuleView {
    fn from(rule: &AutomationRule) -> Self {
        Self {
            rule_id: rule.id,
            name: rule.name.clone(),
            trigger: rule.trigger,
            mode: rule.mode,
            enabled: rule.enabled,
            trigger_count: rule.trigger_count,
            last_triggered: rule.last_triggered,
            failure_count: rule.failure_count,
            last_failure: rule.failures.back().cloned(),
        }
    }
}
