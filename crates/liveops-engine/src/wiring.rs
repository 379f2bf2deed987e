//! Automation ports implemented over the components the facade owns.

use liveops_alerts::application::alert_evaluator::AlertEvaluator;
use liveops_alerts::domain::commands::RaiseAlert;
use liveops_automation::application::ports::{ActionDispatcher, DispatchContext, EntityQuery};
use liveops_automation::domain::aggregates::EntityKind;
use liveops_content::application::deployment_pipeline::DeploymentPipeline;
use liveops_content::domain::commands::{DeployContent, RollbackContent};
use liveops_core::comparison::FieldValue;
use liveops_core::error::DomainError;
use liveops_core::trigger::Severity;
use liveops_events::application::lifecycle_manager::LifecycleManager;
use liveops_experiments::application::test_engine::ExperimentEngine;
use liveops_notifications::application::campaign_scheduler::CampaignScheduler;
use uuid::Uuid;

/// Read-only view of entity state for rule conditions.
pub(crate) struct EngineQuery<'a> {
    pub events: &'a LifecycleManager,
    pub content: &'a DeploymentPipeline,
    pub experiments: &'a ExperimentEngine,
    pub notifications: &'a CampaignScheduler,
    pub alerts: &'a AlertEvaluator,
}

impl EntityQuery for EngineQuery<'_> {
    fn field(&self, kind: EntityKind, id: Uuid, field: &str) -> Option<FieldValue> {
        match kind {
            EntityKind::LiveEvent => self.events.peek(id).and_then(|e| {
                liveops_events::application::query_handlers::field_value(e, field)
            }),
            EntityKind::ContentVersion => self.content.peek(id).and_then(|v| {
                liveops_content::application::query_handlers::field_value(v, field)
            }),
            EntityKind::AbTest => self.experiments.peek(id).and_then(|t| {
                liveops_experiments::application::query_handlers::field_value(t, field)
            }),
            EntityKind::Campaign => self.notifications.peek(id).and_then(|c| {
                liveops_notifications::application::query_handlers::field_value(c, field)
            }),
        }
    }

    fn alert_active(&self, alert_id: Uuid) -> Option<bool> {
        self.alerts.is_active(alert_id)
    }
}

/// Routes rule actions to the owning components.
pub(crate) struct EngineDispatcher<'a> {
    pub content: &'a mut DeploymentPipeline,
    pub notifications: &'a mut CampaignScheduler,
    pub alerts: &'a mut AlertEvaluator,
}

impl ActionDispatcher for EngineDispatcher<'_> {
    fn deploy_content(&mut self, version_id: Uuid, ctx: &DispatchContext) -> Result<(), DomainError> {
        let command = DeployContent {
            correlation_id: ctx.correlation_id,
            version_id,
        };
        self.content.deploy(&command, ctx.now).map(|_| ())
    }

    fn rollback_content(
        &mut self,
        version_id: Uuid,
        reason: &str,
        ctx: &DispatchContext,
    ) -> Result<(), DomainError> {
        let reason = if reason.trim().is_empty() {
            format!("automation rule {}", ctx.rule_id)
        } else {
            reason.to_owned()
        };
        let command = RollbackContent {
            correlation_id: ctx.correlation_id,
            version_id,
            reason,
        };
        self.content.rollback(&command, ctx.now)
    }

    fn send_notification(
        &mut self,
        campaign_id: Uuid,
        ctx: &DispatchContext,
    ) -> Result<(), DomainError> {
        self.notifications
            .force(campaign_id, ctx.correlation_id, ctx.now)
    }

    fn raise_alert(
        &mut self,
        severity: Severity,
        message: &str,
        ctx: &DispatchContext,
    ) -> Result<(), DomainError> {
        let command = RaiseAlert {
            correlation_id: ctx.correlation_id,
            raised_by: format!("rule:{}", ctx.rule_id),
            severity,
            message: message.to_owned(),
        };
        self.alerts.raise_manual(&command, ctx.now).map(|_| ())
    }
}
