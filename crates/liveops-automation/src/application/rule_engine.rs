//! The Automation Rule Engine.
//!
//! A pass has two phases. [`RuleEngine::evaluate`] reads the metric store and
//! entity state and decides which rules fire; [`RuleEngine::execute`] runs
//! their actions through the dispatcher. Splitting them lets the caller hand
//! out read access for evaluation and write access for dispatch separately.
//! [`RuleEngine::tick`] runs both.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use liveops_core::aggregate::AggregateRoot;
use liveops_core::comparison::FieldValue;
use liveops_core::error::DomainError;
use liveops_core::event::{EventMetadata, Outbox};
use liveops_core::metrics::MetricStore;
use liveops_core::trigger::TriggerMode;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ports::{ActionDispatcher, DispatchContext, EntityQuery};
use crate::domain::aggregates::{Action, AutomationRule, Condition, ConditionSource, RuleFailure};
use crate::domain::commands::{RegisterRule, SetRuleEnabled};
use crate::domain::events::{
    ActionFailed, AutomationEvent, AutomationEventKind, RuleFired, RuleRegistered,
};

/// A rule that fired and the actions it owes.
#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    /// The rule.
    pub rule_id: Uuid,
    /// Actions in declared order.
    pub actions: Vec<Action>,
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutomationTickSummary {
    /// Rules that fired.
    pub fired: usize,
    /// Actions that succeeded.
    pub actions_succeeded: usize,
    /// Actions that failed.
    pub actions_failed: usize,
    /// Metric writes applied.
    pub metrics_set: usize,
}

/// Evaluates rules and dispatches their actions.
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: BTreeMap<Uuid, AutomationRule>,
    outbox: Outbox<AutomationEvent>,
    default_mode: TriggerMode,
}

fn emit(
    outbox: &mut Outbox<AutomationEvent>,
    rule: &mut AutomationRule,
    kind: AutomationEventKind,
    correlation_id: Uuid,
    now: DateTime<Utc>,
) {
    let sequence = rule.next_version();
    outbox.push(AutomationEvent {
        metadata: EventMetadata::new(kind.event_type(), rule.id, sequence, correlation_id, now),
        kind,
    });
}

fn observe(
    condition: &Condition,
    metrics: &MetricStore,
    entities: &dyn EntityQuery,
) -> Option<FieldValue> {
    match &condition.source {
        ConditionSource::Metric { name } => metrics.get(name).map(FieldValue::Number),
        ConditionSource::Entity { kind, id, field } => entities.field(*kind, *id, field),
        ConditionSource::AlertActive { alert_id } => entities
            .alert_active(*alert_id)
            .map(|active| FieldValue::Number(if active { 1.0 } else { 0.0 })),
    }
}

impl RuleEngine {
    /// Creates an engine whose rules default to `default_mode`.
    #[must_use]
    pub fn new(default_mode: TriggerMode) -> Self {
        Self {
            default_mode,
            ..Self::default()
        }
    }

    /// Registers a rule, enabled.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` if the rule is malformed.
    pub fn register(
        &mut self,
        command: &RegisterRule,
        now: DateTime<Utc>,
    ) -> Result<Uuid, DomainError> {
        let mut rule = AutomationRule::register(Uuid::new_v4(), command, self.default_mode, now)?;
        let id = rule.id;
        let registered = AutomationEventKind::RuleRegistered(RuleRegistered {
            name: rule.name.clone(),
            trigger: rule.trigger,
            mode: rule.mode,
        });
        emit(&mut self.outbox, &mut rule, registered, command.correlation_id, now);
        info!(rule_id = %id, name = %rule.name, mode = ?rule.mode, "automation rule registered");
        self.rules.insert(id, rule);
        Ok(id)
    }

    /// Enables or disables a rule. Disabling forgets whether the conditions
    /// held, so an edge rule fires again if they hold once it is re-enabled.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown rule.
    pub fn set_enabled(
        &mut self,
        command: &SetRuleEnabled,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let rule = self
            .rules
            .get_mut(&command.rule_id)
            .ok_or(DomainError::NotFound(command.rule_id))?;
        if rule.enabled == command.enabled {
            return Ok(());
        }
        rule.enabled = command.enabled;
        rule.condition_held = false;
        let kind = if command.enabled {
            AutomationEventKind::RuleEnabled
        } else {
            AutomationEventKind::RuleDisabled
        };
        emit(&mut self.outbox, rule, kind, command.correlation_id, now);
        info!(rule_id = %rule.id, enabled = command.enabled, "automation rule toggled");
        Ok(())
    }

    /// Decides which enabled rules fire in pass `pass_id`. A rule that
    /// already fired in this pass is skipped, so calling this twice with the
    /// same pass never fires a rule twice.
    pub fn evaluate(
        &mut self,
        pass_id: Uuid,
        now: DateTime<Utc>,
        metrics: &MetricStore,
        entities: &dyn EntityQuery,
    ) -> Vec<Firing> {
        let mut firings = Vec::new();
        for rule in self.rules.values_mut() {
            if !rule.enabled || rule.last_fired_pass == Some(pass_id) {
                continue;
            }
            let holds = rule
                .conditions
                .iter()
                .all(|c| c.holds(observe(c, metrics, entities).as_ref()));
            let fires = rule.mode.fires(rule.condition_held, holds);
            rule.condition_held = holds;
            if !fires {
                continue;
            }
            rule.mark_fired(pass_id, now);
            let fired = AutomationEventKind::RuleFired(RuleFired {
                trigger_count: rule.trigger_count,
                actions: rule.actions.len(),
            });
            emit(&mut self.outbox, rule, fired, pass_id, now);
            info!(rule_id = %rule.id, name = %rule.name, trigger_count = rule.trigger_count, "automation rule fired");
            firings.push(Firing {
                rule_id: rule.id,
                actions: rule.actions.clone(),
            });
        }
        firings
    }

    /// Runs the actions of fired rules in order. A failing action is
    /// recorded against its rule and does not stop the actions after it.
    /// Metric writes are buffered and applied once every action has run.
    pub fn execute(
        &mut self,
        firings: Vec<Firing>,
        pass_id: Uuid,
        now: DateTime<Utc>,
        metrics: &mut MetricStore,
        dispatcher: &mut dyn ActionDispatcher,
    ) -> AutomationTickSummary {
        let mut summary = AutomationTickSummary {
            fired: firings.len(),
            ..AutomationTickSummary::default()
        };
        let mut metric_writes = Vec::new();
        for firing in firings {
            let ctx = DispatchContext {
                rule_id: firing.rule_id,
                correlation_id: pass_id,
                now,
            };
            for (index, action) in firing.actions.iter().enumerate() {
                let result = match action {
                    Action::DeployContent { version_id } => {
                        dispatcher.deploy_content(*version_id, &ctx)
                    }
                    Action::RollbackContent { version_id, reason } => {
                        dispatcher.rollback_content(*version_id, reason, &ctx)
                    }
                    Action::SendNotification { campaign_id } => {
                        dispatcher.send_notification(*campaign_id, &ctx)
                    }
                    Action::RaiseAlert { severity, message } => {
                        dispatcher.raise_alert(*severity, message, &ctx)
                    }
                    Action::SetMetric { name, value } => {
                        metric_writes.push((name.clone(), *value));
                        Ok(())
                    }
                };
                match result {
                    Ok(()) => summary.actions_succeeded += 1,
                    Err(e) => {
                        summary.actions_failed += 1;
                        self.record_failure(firing.rule_id, index, action, &e, pass_id, now);
                    }
                }
            }
        }
        summary.metrics_set = metric_writes.len();
        for (name, value) in metric_writes {
            metrics.set(name, value, now);
        }
        debug!(?summary, "automation pass finished");
        summary
    }

    /// Evaluates and executes in one call.
    pub fn tick(
        &mut self,
        pass_id: Uuid,
        now: DateTime<Utc>,
        metrics: &mut MetricStore,
        entities: &dyn EntityQuery,
        dispatcher: &mut dyn ActionDispatcher,
    ) -> AutomationTickSummary {
        let firings = self.evaluate(pass_id, now, metrics, entities);
        self.execute(firings, pass_id, now, metrics, dispatcher)
    }

    fn record_failure(
        &mut self,
        rule_id: Uuid,
        action_index: usize,
        action: &Action,
        error: &DomainError,
        pass_id: Uuid,
        now: DateTime<Utc>,
    ) {
        let Some(rule) = self.rules.get_mut(&rule_id) else {
            return;
        };
        let error = error.to_string();
        warn!(rule_id = %rule_id, action = action.kind_name(), action_index, error = %error, "automation action failed");
        rule.record_failure(RuleFailure {
            at: now,
            action_index,
            action: action.kind_name().to_owned(),
            error: error.clone(),
        });
        emit(
            &mut self.outbox,
            rule,
            AutomationEventKind::ActionFailed(ActionFailed {
                action_index,
                action: action.kind_name().to_owned(),
                error,
            }),
            pass_id,
            now,
        );
    }

    /// A copy of one rule.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown rule.
    pub fn get(&self, rule_id: Uuid) -> Result<AutomationRule, DomainError> {
        self.rules
            .get(&rule_id)
            .cloned()
            .ok_or(DomainError::NotFound(rule_id))
    }

    /// Borrows one rule for read-only inspection.
    #[must_use]
    pub fn peek(&self, rule_id: Uuid) -> Option<&AutomationRule> {
        self.rules.get(&rule_id)
    }

    /// Number of enabled rules.
    #[must_use]
    pub fn count_enabled(&self) -> usize {
        self.rules.values().filter(|r| r.enabled).count()
    }

    /// Total action failures across all rules.
    #[must_use]
    pub fn failure_total(&self) -> u64 {
        self.rules.values().map(|r| r.failure_count).sum()
    }

    /// Removes and returns buffered lifecycle events, oldest first.
    pub fn drain_events(&mut self) -> Vec<AutomationEvent> {
        self.outbox.drain()
    }

    /// Serializes every rule.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if serialization fails.
    pub fn snapshot(&self) -> Result<serde_json::Value, DomainError> {
        let rules: Vec<&AutomationRule> = self.rules.values().collect();
        serde_json::to_value(rules)
            .map_err(|e| DomainError::Infrastructure(format!("rule snapshot failed: {e}")))
    }

    /// Replaces the store with a snapshot taken by [`Self::snapshot`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the blob cannot be decoded.
    pub fn restore(&mut self, blob: serde_json::Value) -> Result<(), DomainError> {
        let rules: Vec<AutomationRule> = serde_json::from_value(blob)
            .map_err(|e| DomainError::Infrastructure(format!("rule restore failed: {e}")))?;
        self.rules = rules.into_iter().map(|r| (r.id, r)).collect();
        info!(rules = self.rules.len(), "automation rules restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};

    use liveops_core::comparison::Comparison;
    use liveops_core::trigger::Severity;
    use liveops_test_support::fixed_now;

    use super::*;
    use crate::domain::aggregates::{EntityKind, TriggerKind};

    #[derive(Default)]
    struct MapEntities {
        fields: HashMap<(Uuid, String), FieldValue>,
        alerts: HashMap<Uuid, bool>,
    }

    impl EntityQuery for MapEntities {
        fn field(&self, _kind: EntityKind, id: Uuid, field: &str) -> Option<FieldValue> {
            self.fields.get(&(id, field.to_owned())).cloned()
        }

        fn alert_active(&self, alert_id: Uuid) -> Option<bool> {
            self.alerts.get(&alert_id).copied()
        }
    }

    #[derive(Default)]
    struct RecordingDispatcher {
        calls: Vec<String>,
        rejected_versions: BTreeSet<Uuid>,
    }

    impl ActionDispatcher for RecordingDispatcher {
        fn deploy_content(
            &mut self,
            version_id: Uuid,
            _ctx: &DispatchContext,
        ) -> Result<(), DomainError> {
            self.calls.push(format!("deploy:{version_id}"));
            Ok(())
        }

        fn rollback_content(
            &mut self,
            version_id: Uuid,
            _reason: &str,
            _ctx: &DispatchContext,
        ) -> Result<(), DomainError> {
            self.calls.push(format!("rollback:{version_id}"));
            if self.rejected_versions.contains(&version_id) {
                return Err(DomainError::InvalidState("not live".into()));
            }
            Ok(())
        }

        fn send_notification(
            &mut self,
            campaign_id: Uuid,
            _ctx: &DispatchContext,
        ) -> Result<(), DomainError> {
            self.calls.push(format!("notify:{campaign_id}"));
            Ok(())
        }

        fn raise_alert(
            &mut self,
            severity: Severity,
            message: &str,
            _ctx: &DispatchContext,
        ) -> Result<(), DomainError> {
            self.calls.push(format!("alert:{}:{message}", severity.as_str()));
            Ok(())
        }
    }

    fn rollback_rule(version_id: Uuid, mode: Option<TriggerMode>) -> RegisterRule {
        RegisterRule {
            correlation_id: Uuid::new_v4(),
            name: "rollback on error spike".into(),
            trigger: TriggerKind::MetricThreshold,
            mode,
            conditions: vec![Condition::metric("error_rate", Comparison::GreaterThan, 0.05)],
            actions: vec![Action::RollbackContent {
                version_id,
                reason: "error spike".into(),
            }],
        }
    }

    #[test]
    fn test_rule_fires_when_all_conditions_hold() {
        // Arrange
        let mut engine = RuleEngine::default();
        let version_id = Uuid::new_v4();
        let rule_id = engine
            .register(&rollback_rule(version_id, None), fixed_now())
            .unwrap();
        let mut metrics = MetricStore::new();
        metrics.set("error_rate", 0.10, fixed_now());
        let mut dispatcher = RecordingDispatcher::default();

        // Act
        let summary = engine.tick(
            Uuid::new_v4(),
            fixed_now(),
            &mut metrics,
            &MapEntities::default(),
            &mut dispatcher,
        );

        // Assert
        assert_eq!(summary.fired, 1);
        assert_eq!(dispatcher.calls, vec![format!("rollback:{version_id}")]);
        let rule = engine.get(rule_id).unwrap();
        assert_eq!(rule.trigger_count, 1);
        assert_eq!(rule.last_triggered, Some(fixed_now()));
    }

    #[test]
    fn test_rule_fires_once_per_pass() {
        // Arrange
        let mut engine = RuleEngine::default();
        let rule_id = engine
            .register(&rollback_rule(Uuid::new_v4(), None), fixed_now())
            .unwrap();
        let mut metrics = MetricStore::new();
        metrics.set("error_rate", 0.10, fixed_now());
        let mut dispatcher = RecordingDispatcher::default();
        let entities = MapEntities::default();
        let pass = Uuid::new_v4();

        // Act
        engine.tick(pass, fixed_now(), &mut metrics, &entities, &mut dispatcher);
        let second = engine.tick(pass, fixed_now(), &mut metrics, &entities, &mut dispatcher);

        // Assert
        assert_eq!(second.fired, 0);
        assert_eq!(engine.get(rule_id).unwrap().trigger_count, 1);
    }

    #[test]
    fn test_level_rule_refires_on_next_pass() {
        let mut engine = RuleEngine::default();
        let rule_id = engine
            .register(&rollback_rule(Uuid::new_v4(), None), fixed_now())
            .unwrap();
        let mut metrics = MetricStore::new();
        metrics.set("error_rate", 0.10, fixed_now());
        let mut dispatcher = RecordingDispatcher::default();
        let entities = MapEntities::default();

        engine.tick(Uuid::new_v4(), fixed_now(), &mut metrics, &entities, &mut dispatcher);
        engine.tick(Uuid::new_v4(), fixed_now(), &mut metrics, &entities, &mut dispatcher);

        assert_eq!(engine.get(rule_id).unwrap().trigger_count, 2);
    }

    #[test]
    fn test_edge_rule_waits_for_clear_and_reraise() {
        // Arrange
        let mut engine = RuleEngine::default();
        let rule_id = engine
            .register(
                &rollback_rule(Uuid::new_v4(), Some(TriggerMode::Edge)),
                fixed_now(),
            )
            .unwrap();
        let mut metrics = MetricStore::new();
        let mut dispatcher = RecordingDispatcher::default();
        let entities = MapEntities::default();
        let mut pass = |engine: &mut RuleEngine, metrics: &mut MetricStore| {
            engine.tick(Uuid::new_v4(), fixed_now(), metrics, &entities, &mut dispatcher);
            engine.get(rule_id).unwrap().trigger_count
        };

        // Act
        metrics.set("error_rate", 0.10, fixed_now());
        let raised = pass(&mut engine, &mut metrics);
        let still_raised = pass(&mut engine, &mut metrics);
        metrics.set("error_rate", 0.01, fixed_now());
        let cleared = pass(&mut engine, &mut metrics);
        metrics.set("error_rate", 0.10, fixed_now());
        let reraised = pass(&mut engine, &mut metrics);

        // Assert
        assert_eq!((raised, still_raised, cleared, reraised), (1, 1, 1, 2));
    }

    #[test]
    fn test_failing_action_does_not_stop_later_actions() {
        // Arrange
        let mut engine = RuleEngine::default();
        let gone = Uuid::new_v4();
        let campaign = Uuid::new_v4();
        let command = RegisterRule {
            actions: vec![
                Action::RollbackContent {
                    version_id: gone,
                    reason: String::new(),
                },
                Action::SendNotification {
                    campaign_id: campaign,
                },
                Action::RaiseAlert {
                    severity: Severity::Critical,
                    message: "rollback attempted".into(),
                },
            ],
            ..rollback_rule(gone, None)
        };
        let rule_id = engine.register(&command, fixed_now()).unwrap();
        let mut metrics = MetricStore::new();
        metrics.set("error_rate", 0.10, fixed_now());
        let mut dispatcher = RecordingDispatcher {
            rejected_versions: BTreeSet::from([gone]),
            ..RecordingDispatcher::default()
        };

        // Act
        let summary = engine.tick(
            Uuid::new_v4(),
            fixed_now(),
            &mut metrics,
            &MapEntities::default(),
            &mut dispatcher,
        );

        // Assert
        assert_eq!(summary.actions_failed, 1);
        assert_eq!(summary.actions_succeeded, 2);
        assert_eq!(dispatcher.calls.len(), 3);
        let rule = engine.get(rule_id).unwrap();
        assert_eq!(rule.failures.len(), 1);
        assert_eq!(rule.failures[0].action, "rollback_content");
        assert!(
            engine
                .drain_events()
                .iter()
                .any(|e| e.metadata.event_type == "automation.action_failed")
        );
    }

    #[test]
    fn test_metric_writes_apply_after_all_rules_evaluated() {
        // Arrange
        let mut engine = RuleEngine::default();
        let setter = RegisterRule {
            correlation_id: Uuid::new_v4(),
            name: "flag boost".into(),
            trigger: TriggerKind::MetricThreshold,
            mode: None,
            conditions: vec![Condition::metric("sessions", Comparison::GreaterOrEqual, 100.0)],
            actions: vec![Action::SetMetric {
                name: "boost".into(),
                value: 1.0,
            }],
        };
        let reader = RegisterRule {
            name: "react to boost".into(),
            conditions: vec![Condition::metric("boost", Comparison::Equals, 1.0)],
            actions: vec![Action::RaiseAlert {
                severity: Severity::Info,
                message: "boost on".into(),
            }],
            ..setter.clone()
        };
        engine.register(&setter, fixed_now()).unwrap();
        engine.register(&reader, fixed_now()).unwrap();
        let mut metrics = MetricStore::new();
        metrics.set("sessions", 150.0, fixed_now());
        let mut dispatcher = RecordingDispatcher::default();
        let entities = MapEntities::default();

        // Act
        let first = engine.tick(Uuid::new_v4(), fixed_now(), &mut metrics, &entities, &mut dispatcher);
        let second = engine.tick(Uuid::new_v4(), fixed_now(), &mut metrics, &entities, &mut dispatcher);

        // Assert
        assert_eq!(first.fired, 1);
        assert_eq!(first.metrics_set, 1);
        assert_eq!(metrics.get("boost"), Some(1.0));
        assert_eq!(second.fired, 2);
    }

    #[test]
    fn test_entity_and_alert_conditions_read_through_query() {
        // Arrange
        let mut engine = RuleEngine::default();
        let version_id = Uuid::new_v4();
        let alert_id = Uuid::new_v4();
        let command = RegisterRule {
            correlation_id: Uuid::new_v4(),
            name: "pull content under alert".into(),
            trigger: TriggerKind::Composite,
            mode: None,
            conditions: vec![
                Condition::entity(
                    EntityKind::ContentVersion,
                    version_id,
                    "status",
                    Comparison::Equals,
                    "production",
                ),
                Condition::alert_active(alert_id),
            ],
            actions: vec![Action::RollbackContent {
                version_id,
                reason: "alert".into(),
            }],
        };
        engine.register(&command, fixed_now()).unwrap();
        let mut entities = MapEntities::default();
        entities
            .fields
            .insert((version_id, "status".into()), FieldValue::from("production"));
        let mut metrics = MetricStore::new();
        let mut dispatcher = RecordingDispatcher::default();

        // Act
        let inactive =
            engine.tick(Uuid::new_v4(), fixed_now(), &mut metrics, &entities, &mut dispatcher);
        entities.alerts.insert(alert_id, true);
        let active =
            engine.tick(Uuid::new_v4(), fixed_now(), &mut metrics, &entities, &mut dispatcher);

        // Assert
        assert_eq!(inactive.fired, 0);
        assert_eq!(active.fired, 1);
    }

    #[test]
    fn test_disabled_rule_is_not_evaluated() {
        let mut engine = RuleEngine::default();
        let rule_id = engine
            .register(&rollback_rule(Uuid::new_v4(), None), fixed_now())
            .unwrap();
        engine
            .set_enabled(
                &SetRuleEnabled {
                    correlation_id: Uuid::new_v4(),
                    rule_id,
                    enabled: false,
                },
                fixed_now(),
            )
            .unwrap();
        let mut metrics = MetricStore::new();
        metrics.set("error_rate", 0.10, fixed_now());

        let summary = engine.tick(
            Uuid::new_v4(),
            fixed_now(),
            &mut metrics,
            &MapEntities::default(),
            &mut RecordingDispatcher::default(),
        );

        assert_eq!(summary.fired, 0);
        assert_eq!(engine.count_enabled(), 0);
    }

    #[test]
    fn test_snapshot_restore_keeps_trigger_count() {
        let mut engine = RuleEngine::new(TriggerMode::Edge);
        let rule_id = engine
            .register(&rollback_rule(Uuid::new_v4(), None), fixed_now())
            .unwrap();
        let mut metrics = MetricStore::new();
        metrics.set("error_rate", 0.10, fixed_now());
        engine.tick(
            Uuid::new_v4(),
            fixed_now(),
            &mut metrics,
            &MapEntities::default(),
            &mut RecordingDispatcher::default(),
        );

        let mut restored = RuleEngine::new(TriggerMode::Edge);
        restored.restore(engine.snapshot().unwrap()).unwrap();

        let rule = restored.get(rule_id).unwrap();
        assert_eq!(rule.trigger_count, 1);
        assert!(rule.condition_held);
        assert_eq!(rule.mode, TriggerMode::Edge);
    }
}
