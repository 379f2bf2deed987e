//! Orchestration facade, the single entry point hosts call.
//!
//! [`LiveOpsEngine`] owns every component and the metric store. A
//! reconciliation pass runs the components in a fixed order (content, events,
//! experiments, automation, notifications, alerts) so later subsystems see
//! the current pass's earlier mutations. Each subsystem is gated on its own
//! due time. Lifecycle events from every outbox are forwarded, in that same
//! order, to the analytics sink and to host subscribers.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use liveops_alerts::application::alert_evaluator::AlertEvaluator;
use liveops_alerts::domain::aggregates::{Alert, TriggeredAlert};
use liveops_alerts::domain::commands::{RaiseAlert, RegisterAlert, SetAlertEnabled};
use liveops_automation::application::rule_engine::{AutomationTickSummary, RuleEngine};
use liveops_automation::domain::aggregates::AutomationRule;
use liveops_automation::domain::commands::{RegisterRule, SetRuleEnabled};
use liveops_content::application::deployment_pipeline::{ContentTickSummary, DeploymentPipeline};
use liveops_content::domain::aggregates::{ContentStatus, ContentVersion};
use liveops_content::domain::commands::{
    DeployContent, RollbackContent, SubmitContent, ValidateContent,
};
use liveops_content::domain::validation::ContentValidator;
use liveops_core::clock::Clock;
use liveops_core::error::DomainError;
use liveops_core::event::{DomainEvent, EventMetadata};
use liveops_core::metrics::MetricStore;
use liveops_core::ports::{AnalyticsSink, DeliveryChannel, RewardGrantService, SegmentResolver};
use liveops_core::rng::DeterministicRng;
use liveops_core::snapshot::{SnapshotStore, stores};
use liveops_events::application::lifecycle_manager::{EventTickSummary, LifecycleManager};
use liveops_events::domain::aggregates::{EventStatus, LiveEvent, ProgressOutcome};
use liveops_events::domain::commands::{CancelEvent, JoinEvent, RecordProgress, ScheduleEvent};
use liveops_events::domain::templates::EventTemplate;
use liveops_experiments::application::test_engine::{ExperimentEngine, ExperimentTickSummary};
use liveops_experiments::domain::aggregates::{AbTest, TestResult, TestStatus};
use liveops_experiments::domain::commands::{CancelTest, CreateTest, RecordOutcome};
use liveops_notifications::application::campaign_scheduler::{
    CampaignScheduler, NotificationTickSummary,
};
use liveops_notifications::domain::aggregates::Campaign;
use liveops_notifications::domain::commands::{RegisterCampaign, SetCampaignEnabled};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{EngineConfig, Subsystem};
use crate::error::EngineError;
use crate::wiring::{EngineDispatcher, EngineQuery};

/// External services the engine calls out to.
#[derive(Clone)]
pub struct Collaborators {
    /// Economy ledger for event rewards.
    pub rewards: Arc<dyn RewardGrantService>,
    /// Notification delivery channel.
    pub delivery: Arc<dyn DeliveryChannel>,
    /// Segment resolver for targeting.
    pub segments: Arc<dyn SegmentResolver>,
    /// Fire-and-forget analytics sink.
    pub analytics: Arc<dyn AnalyticsSink>,
    /// The only source of "now".
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// A lifecycle event as delivered to subscribers and the analytics sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineEvent {
    /// Routing and ordering metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub payload: serde_json::Value,
}

impl EngineEvent {
    fn from_domain(event: &dyn DomainEvent) -> Self {
        Self {
            metadata: event.metadata().clone(),
            payload: event.to_payload(),
        }
    }

    /// The event type, e.g. `content.rolled_back`.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.metadata.event_type
    }
}

/// What one reconciliation pass did. A subsystem that was not due is `None`.
#[derive(Debug, Clone)]
pub struct PassReport {
    /// Correlation id stamped on every event the pass emitted.
    pub correlation_id: Uuid,
    /// The pass's "now".
    pub at: DateTime<Utc>,
    /// Content pipeline summary.
    pub content: Option<ContentTickSummary>,
    /// Event lifecycle summary.
    pub events: Option<EventTickSummary>,
    /// A/B test summary.
    pub experiments: Option<ExperimentTickSummary>,
    /// Automation summary.
    pub automation: Option<AutomationTickSummary>,
    /// Notification summary.
    pub notifications: Option<NotificationTickSummary>,
    /// Alerts triggered on this pass.
    pub alerts: Option<Vec<TriggeredAlert>>,
    /// Lifecycle events forwarded at the end of the pass.
    pub published: usize,
}

impl PassReport {
    fn new(correlation_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            correlation_id,
            at,
            content: None,
            events: None,
            experiments: None,
            automation: None,
            notifications: None,
            alerts: None,
            published: 0,
        }
    }

    /// Whether `subsystem` was reconciled on this pass.
    #[must_use]
    pub fn ran(&self, subsystem: Subsystem) -> bool {
        match subsystem {
            Subsystem::Content => self.content.is_some(),
            Subsystem::Events => self.events.is_some(),
            Subsystem::Experiments => self.experiments.is_some(),
            Subsystem::Automation => self.automation.is_some(),
            Subsystem::Notifications => self.notifications.is_some(),
            Subsystem::Alerts => self.alerts.is_some(),
        }
    }

    /// Alerts triggered on this pass, empty when the evaluator did not run.
    #[must_use]
    pub fn triggered_alerts(&self) -> &[TriggeredAlert] {
        self.alerts.as_deref().unwrap_or_default()
    }
}

fn collect<E: DomainEvent>(events: Vec<E>, out: &mut Vec<EngineEvent>) {
    out.extend(events.iter().map(|e| EngineEvent::from_domain(e)));
}

fn infrastructure(store: &str, e: &serde_json::Error) -> DomainError {
    DomainError::Infrastructure(format!("{store} snapshot: {e}"))
}

/// The live-operations engine.
pub struct LiveOpsEngine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    rng: Box<dyn DeterministicRng>,
    analytics: Arc<dyn AnalyticsSink>,
    metrics: MetricStore,
    content: DeploymentPipeline,
    events: LifecycleManager,
    experiments: ExperimentEngine,
    automation: RuleEngine,
    notifications: CampaignScheduler,
    alerts: AlertEvaluator,
    subscribers: Vec<mpsc::Sender<EngineEvent>>,
    next_due: BTreeMap<Subsystem, DateTime<Utc>>,
    passes: u64,
}

impl std::fmt::Debug for LiveOpsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveOpsEngine")
            .field("passes", &self.passes)
            .field("metrics", &self.metrics.len())
            .field("subscribers", &self.subscribers.len())
            .field("content", &self.content)
            .field("events", &self.events)
            .field("experiments", &self.experiments)
            .field("automation", &self.automation)
            .field("notifications", &self.notifications)
            .field("alerts", &self.alerts)
            .finish_non_exhaustive()
    }
}

impl LiveOpsEngine {
    /// Builds an engine with empty stores.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        collaborators: Collaborators,
        rng: Box<dyn DeterministicRng>,
    ) -> Self {
        let events = LifecycleManager::new(
            collaborators.rewards,
            Arc::clone(&collaborators.segments),
            config.lifecycle_settings(),
        );
        let notifications = CampaignScheduler::new(
            collaborators.delivery,
            collaborators.segments,
            config.notification_settings(),
        );
        Self {
            clock: collaborators.clock,
            rng,
            analytics: collaborators.analytics,
            metrics: MetricStore::new(),
            content: DeploymentPipeline::new(),
            events,
            experiments: ExperimentEngine::new(),
            automation: RuleEngine::new(config.default_trigger_mode),
            notifications,
            alerts: AlertEvaluator::new(config.default_trigger_mode),
            subscribers: Vec::new(),
            next_due: BTreeMap::new(),
            passes: 0,
            config,
        }
    }

    /// The configuration the engine was built with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Completed reconciliation passes.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Opens a bounded channel that receives every lifecycle event from now
    /// on. Events are dropped for a subscriber whose buffer is full.
    pub fn subscribe(&mut self) -> mpsc::Receiver<EngineEvent> {
        let (tx, rx) = mpsc::channel(self.config.subscriber_capacity);
        self.subscribers.push(tx);
        rx
    }

    // ---- reconciliation ---------------------------------------------------

    fn take_due(&mut self, subsystem: Subsystem, now: DateTime<Utc>) -> bool {
        if self.next_due.get(&subsystem).is_some_and(|due| now < *due) {
            return false;
        }
        let interval = chrono::Duration::from_std(self.config.intervals.get(subsystem))
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.next_due.insert(subsystem, now + interval);
        true
    }

    /// Runs one reconciliation pass at the clock's current time.
    ///
    /// Business failures never surface here; components record them on the
    /// owning entity and emit a lifecycle event.
    #[instrument(skip(self), fields(pass = self.passes + 1))]
    pub async fn tick(&mut self) -> PassReport {
        let now = self.clock.now();
        let pass_id = Uuid::new_v4();
        let mut report = PassReport::new(pass_id, now);

        if self.take_due(Subsystem::Content, now) {
            report.content = Some(self.content.tick(now, pass_id));
        }
        if self.take_due(Subsystem::Events, now) {
            report.events = Some(self.events.tick(now, pass_id, self.rng.as_mut()).await);
        }
        if self.take_due(Subsystem::Experiments, now) {
            report.experiments = Some(self.experiments.tick(now, pass_id));
        }
        if self.take_due(Subsystem::Automation, now) {
            let query = EngineQuery {
                events: &self.events,
                content: &self.content,
                experiments: &self.experiments,
                notifications: &self.notifications,
                alerts: &self.alerts,
            };
            let firings = self.automation.evaluate(pass_id, now, &self.metrics, &query);
            let mut dispatcher = EngineDispatcher {
                content: &mut self.content,
                notifications: &mut self.notifications,
                alerts: &mut self.alerts,
            };
            report.automation = Some(self.automation.execute(
                firings,
                pass_id,
                now,
                &mut self.metrics,
                &mut dispatcher,
            ));
        }
        if self.take_due(Subsystem::Notifications, now) {
            report.notifications =
                Some(self.notifications.tick(now, pass_id, self.rng.as_mut()).await);
        }
        if self.take_due(Subsystem::Alerts, now) {
            report.alerts = Some(self.alerts.tick(now, pass_id, &self.metrics));
        }

        self.passes += 1;
        self.publish_gauges(now);
        report.published = self.publish();
        debug!(
            pass_id = %pass_id,
            published = report.published,
            alerts = report.triggered_alerts().len(),
            "reconciliation pass finished"
        );
        report
    }

    /// Engine-level gauges, written after every pass. Rules and alerts read
    /// them on the following pass.
    #[allow(clippy::cast_precision_loss)]
    fn publish_gauges(&mut self, now: DateTime<Utc>) {
        let gauges = [
            ("engine.passes_total", self.passes as f64),
            ("events.scheduled", self.events.count_with_status(EventStatus::Scheduled) as f64),
            ("events.active", self.events.count_with_status(EventStatus::Active) as f64),
            ("content.pending", self.content.count_with_status(ContentStatus::Pending) as f64),
            ("content.staging", self.content.count_with_status(ContentStatus::Staging) as f64),
            (
                "content.production",
                self.content.count_with_status(ContentStatus::Production) as f64,
            ),
            ("content.failed", self.content.count_with_status(ContentStatus::Failed) as f64),
            (
                "experiments.running",
                self.experiments.count_with_status(TestStatus::Running) as f64,
            ),
            (
                "experiments.completed",
                self.experiments.count_with_status(TestStatus::Completed) as f64,
            ),
            ("automation.rules_enabled", self.automation.count_enabled() as f64),
            (
                "automation.action_failures_total",
                self.automation.failure_total() as f64,
            ),
            (
                "notifications.campaigns_enabled",
                self.notifications.count_enabled() as f64,
            ),
            ("notifications.sent_total", self.notifications.sent_total() as f64),
            ("alerts.active", self.alerts.active_count() as f64),
            ("alerts.triggered_total", self.alerts.triggered_total() as f64),
        ];
        for (name, value) in gauges {
            self.metrics.set(name, value, now);
        }
    }

    /// Drains every outbox in pass order and fans the events out. Returns the
    /// number of events forwarded.
    fn publish(&mut self) -> usize {
        let mut batch = Vec::new();
        collect(self.content.drain_events(), &mut batch);
        collect(self.events.drain_events(), &mut batch);
        collect(self.experiments.drain_events(), &mut batch);
        collect(self.automation.drain_events(), &mut batch);
        collect(self.notifications.drain_events(), &mut batch);
        collect(self.alerts.drain_events(), &mut batch);
        if batch.is_empty() {
            return 0;
        }

        self.subscribers.retain(|tx| !tx.is_closed());
        for event in &batch {
            let attributes = serde_json::to_value(event).unwrap_or_default();
            self.analytics.record(event.event_type(), &attributes);
            for tx in &self.subscribers {
                if let Err(mpsc::error::TrySendError::Full(dropped)) = tx.try_send(event.clone()) {
                    warn!(
                        event_type = %dropped.event_type(),
                        "subscriber buffer full, lifecycle event dropped"
                    );
                }
            }
        }
        batch.len()
    }

    // ---- live events ------------------------------------------------------

    /// Schedules a live event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for a malformed command.
    #[instrument(skip(self, command), fields(correlation_id = %command.correlation_id))]
    pub fn schedule_event(&mut self, command: &ScheduleEvent) -> Result<Uuid, DomainError> {
        let id = self.events.schedule(command, self.clock.now())?;
        self.publish();
        Ok(id)
    }

    /// Schedules a live event from a template.
    ///
    /// # Errors
    ///
    /// As [`Self::schedule_event`].
    pub fn schedule_from_template(
        &mut self,
        template: &EventTemplate,
        starts_at: DateTime<Utc>,
    ) -> Result<Uuid, DomainError> {
        self.schedule_event(&template.instantiate(Uuid::new_v4(), starts_at))
    }

    /// Enrols a player, checking the event's target segment.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound`, `DomainError::InvalidState` or
    /// `DomainError::InvariantViolation` from the lifecycle manager.
    #[instrument(skip(self, command), fields(event_id = %command.event_id))]
    pub fn join_event(&mut self, command: &JoinEvent) -> Result<bool, DomainError> {
        let joined = self.events.join(command, self.clock.now())?;
        self.publish();
        Ok(joined)
    }

    /// Records objective progress for a player.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound`, `DomainError::InvalidState` or
    /// `DomainError::InvariantViolation` from the lifecycle manager.
    #[instrument(skip(self, command), fields(event_id = %command.event_id, player_id = %command.player_id))]
    pub fn record_progress(
        &mut self,
        command: &RecordProgress,
    ) -> Result<ProgressOutcome, DomainError> {
        let outcome = self.events.record_progress(command, self.clock.now())?;
        self.publish();
        Ok(outcome)
    }

    /// Cancels a scheduled or active event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` or `DomainError::InvalidState`.
    #[instrument(skip(self, command), fields(event_id = %command.event_id))]
    pub fn cancel_event(&mut self, command: &CancelEvent) -> Result<(), DomainError> {
        self.events.cancel(command, self.clock.now())?;
        self.publish();
        Ok(())
    }

    /// Copies of every active event.
    #[must_use]
    pub fn active_events(&self) -> Vec<LiveEvent> {
        self.events.get_active()
    }

    /// A copy of one live event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown event.
    pub fn live_event(&self, event_id: Uuid) -> Result<LiveEvent, DomainError> {
        self.events.get(event_id)
    }

    // ---- content ----------------------------------------------------------

    /// Registers a host validator for `Custom` rules.
    pub fn register_validator(
        &mut self,
        name: impl Into<String>,
        validator: Arc<dyn ContentValidator>,
    ) {
        self.content.register_validator(name, validator);
    }

    /// Submits a content version.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for a malformed command.
    #[instrument(skip(self, command), fields(correlation_id = %command.correlation_id))]
    pub fn submit_content(&mut self, command: &SubmitContent) -> Result<Uuid, DomainError> {
        let id = self.content.submit(command, self.clock.now())?;
        self.publish();
        Ok(id)
    }

    /// Validates a pending version now instead of on the next pass.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ValidationFailure` if a rule fails.
    #[instrument(skip(self, command), fields(version_id = %command.version_id))]
    pub fn validate_content(
        &mut self,
        command: &ValidateContent,
    ) -> Result<ContentStatus, DomainError> {
        let result = self.content.validate(command, self.clock.now());
        self.publish();
        result
    }

    /// Deploys a version, validating it first if still pending.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ValidationFailure` for a failed version and
    /// `DomainError::DependencyUnmet` while a dependency is not in production.
    #[instrument(skip(self, command), fields(version_id = %command.version_id))]
    pub fn deploy_content(&mut self, command: &DeployContent) -> Result<ContentStatus, DomainError> {
        let result = self.content.deploy(command, self.clock.now());
        self.publish();
        result
    }

    /// Rolls back a deployed or staging version.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` or `DomainError::InvalidState`.
    #[instrument(skip(self, command), fields(version_id = %command.version_id))]
    pub fn rollback_content(&mut self, command: &RollbackContent) -> Result<(), DomainError> {
        self.content.rollback(command, self.clock.now())?;
        self.publish();
        Ok(())
    }

    /// A copy of one content version.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown version.
    pub fn content_version(&self, version_id: Uuid) -> Result<ContentVersion, DomainError> {
        self.content.get(version_id)
    }

    /// The version of `content_type` a player sees, if any.
    #[must_use]
    pub fn resolve_content(&self, content_type: &str, player_id: &str) -> Option<Uuid> {
        self.content.resolve_for_player(content_type, player_id)
    }

    // ---- experiments ------------------------------------------------------

    /// Creates an A/B test.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for malformed variants.
    #[instrument(skip(self, command), fields(correlation_id = %command.correlation_id))]
    pub fn create_test(&mut self, command: &CreateTest) -> Result<Uuid, DomainError> {
        let id = self.experiments.create(command, self.clock.now())?;
        self.publish();
        Ok(id)
    }

    /// The variant `subject_id` sees in a test.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` or `DomainError::InvalidState`.
    pub fn assign_variant(&self, test_id: Uuid, subject_id: &str) -> Result<String, DomainError> {
        self.experiments.assign(test_id, subject_id)
    }

    /// Records one outcome for a running test.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound`, `DomainError::InvalidState` or
    /// `DomainError::InvariantViolation` for an unknown variant.
    pub fn record_outcome(&mut self, command: &RecordOutcome) -> Result<(), DomainError> {
        self.experiments.record_outcome(command)
    }

    /// Cancels a test.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` or `DomainError::InvalidState`.
    #[instrument(skip(self, command), fields(test_id = %command.test_id))]
    pub fn cancel_test(&mut self, command: &CancelTest) -> Result<(), DomainError> {
        self.experiments.cancel(command, self.clock.now())?;
        self.publish();
        Ok(())
    }

    /// The decision for a test.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown test.
    pub fn test_result(&self, test_id: Uuid) -> Result<TestResult, DomainError> {
        self.experiments.get_result(test_id)
    }

    /// A copy of one test.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown test.
    pub fn ab_test(&self, test_id: Uuid) -> Result<AbTest, DomainError> {
        self.experiments.get(test_id)
    }

    // ---- automation -------------------------------------------------------

    /// Registers an automation rule.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for a malformed rule.
    #[instrument(skip(self, command), fields(correlation_id = %command.correlation_id))]
    pub fn register_rule(&mut self, command: &RegisterRule) -> Result<Uuid, DomainError> {
        let id = self.automation.register(command, self.clock.now())?;
        self.publish();
        Ok(id)
    }

    /// Enables or disables a rule.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown rule.
    pub fn set_rule_enabled(&mut self, command: &SetRuleEnabled) -> Result<(), DomainError> {
        self.automation.set_enabled(command, self.clock.now())?;
        self.publish();
        Ok(())
    }

    /// A copy of one rule.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown rule.
    pub fn rule(&self, rule_id: Uuid) -> Result<AutomationRule, DomainError> {
        self.automation.get(rule_id)
    }

    // ---- notifications ----------------------------------------------------

    /// Registers a notification campaign.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for a malformed campaign or
    /// unknown segment.
    #[instrument(skip(self, command), fields(correlation_id = %command.correlation_id))]
    pub fn register_campaign(&mut self, command: &RegisterCampaign) -> Result<Uuid, DomainError> {
        let id = self.notifications.register(command, self.clock.now())?;
        self.publish();
        Ok(id)
    }

    /// Enables or disables a campaign.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown campaign.
    pub fn set_campaign_enabled(&mut self, command: &SetCampaignEnabled) -> Result<(), DomainError> {
        self.notifications.set_enabled(command, self.clock.now())?;
        self.publish();
        Ok(())
    }

    /// A copy of one campaign.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown campaign.
    pub fn campaign(&self, campaign_id: Uuid) -> Result<Campaign, DomainError> {
        self.notifications.get(campaign_id)
    }

    // ---- alerts -----------------------------------------------------------

    /// Registers a threshold alert.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for a malformed alert.
    #[instrument(skip(self, command), fields(correlation_id = %command.correlation_id))]
    pub fn register_alert(&mut self, command: &RegisterAlert) -> Result<Uuid, DomainError> {
        let id = self.alerts.register(command, self.clock.now())?;
        self.publish();
        Ok(id)
    }

    /// Enables or disables an alert.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown alert.
    pub fn set_alert_enabled(&mut self, command: &SetAlertEnabled) -> Result<(), DomainError> {
        self.alerts.set_enabled(command, self.clock.now())?;
        self.publish();
        Ok(())
    }

    /// Raises an alert by hand. It is reported on the next pass.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for an empty message.
    pub fn raise_alert(&mut self, command: &RaiseAlert) -> Result<Uuid, DomainError> {
        let id = self.alerts.raise_manual(command, self.clock.now())?;
        self.publish();
        Ok(id)
    }

    /// A copy of one alert.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown alert.
    pub fn alert(&self, alert_id: Uuid) -> Result<Alert, DomainError> {
        self.alerts.get(alert_id)
    }

    // ---- metrics ----------------------------------------------------------

    /// Sets a metric.
    pub fn set_metric(&mut self, name: impl Into<String>, value: f64) {
        let now = self.clock.now();
        self.metrics.set(name, value, now);
    }

    /// Adds `delta` to a metric and returns the new value.
    pub fn increment_metric(&mut self, name: &str, delta: f64) -> f64 {
        let now = self.clock.now();
        self.metrics.increment(name, delta, now)
    }

    /// The current value of a metric.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name)
    }

    /// A copy of every metric value.
    #[must_use]
    pub fn metrics_snapshot(&self) -> BTreeMap<String, f64> {
        self.metrics.snapshot()
    }

    // ---- persistence ------------------------------------------------------

    /// Saves every entity store and the metric store.
    ///
    /// # Errors
    ///
    /// Returns the first snapshot or store failure.
    #[instrument(skip(self, store))]
    pub async fn save(&self, store: &dyn SnapshotStore) -> Result<(), EngineError> {
        let metrics = serde_json::to_value(&self.metrics)
            .map_err(|e| infrastructure(stores::METRICS, &e))?;
        let blobs = [
            (stores::LIVE_EVENTS, self.events.snapshot()?),
            (stores::CONTENT_VERSIONS, self.content.snapshot()?),
            (stores::AB_TESTS, self.experiments.snapshot()?),
            (stores::AUTOMATION_RULES, self.automation.snapshot()?),
            (stores::NOTIFICATION_CAMPAIGNS, self.notifications.snapshot()?),
            (stores::ALERTS, self.alerts.snapshot()?),
            (stores::METRICS, metrics),
        ];
        for (name, blob) in blobs {
            store.save(name, blob).await?;
        }
        info!(passes = self.passes, "engine state saved");
        Ok(())
    }

    /// Restores every store that has a saved blob. Returns how many were
    /// restored.
    ///
    /// # Errors
    ///
    /// Returns the first load or restore failure. Stores restored before the
    /// failure keep their restored contents.
    #[instrument(skip(self, store))]
    pub async fn load(&mut self, store: &dyn SnapshotStore) -> Result<usize, EngineError> {
        let mut restored = 0;
        for name in stores::ALL {
            let Some(blob) = store.load(name).await? else {
                continue;
            };
            match name {
                stores::LIVE_EVENTS => self.events.restore(blob)?,
                stores::CONTENT_VERSIONS => self.content.restore(blob)?,
                stores::AB_TESTS => self.experiments.restore(blob)?,
                stores::AUTOMATION_RULES => self.automation.restore(blob)?,
                stores::NOTIFICATION_CAMPAIGNS => self.notifications.restore(blob)?,
                stores::ALERTS => self.alerts.restore(blob)?,
                stores::METRICS => {
                    self.metrics =
                        serde_json::from_value(blob).map_err(|e| infrastructure(name, &e))?;
                }
                _ => continue,
            }
            restored += 1;
        }
        info!(restored, "engine state loaded");
        Ok(restored)
    }
}
