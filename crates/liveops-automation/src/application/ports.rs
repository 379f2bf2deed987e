//! What the rule engine needs from the rest of the engine.
//!
//! Conditions read through [`EntityQuery`]; actions go out through
//! [`ActionDispatcher`]. The orchestration facade implements both over the
//! components it owns.

use chrono::{DateTime, Utc};
use liveops_core::comparison::FieldValue;
use liveops_core::error::DomainError;
use liveops_core::trigger::Severity;
use uuid::Uuid;

use crate::domain::aggregates::EntityKind;

/// Read-only lookups of entity state by field name.
pub trait EntityQuery {
    /// The value of `field` on the entity, or `None` if the entity or field
    /// is unknown.
    fn field(&self, kind: EntityKind, id: Uuid, field: &str) -> Option<FieldValue>;

    /// Whether an alert is active, or `None` for an unknown alert.
    fn alert_active(&self, alert_id: Uuid) -> Option<bool>;
}

/// Where an action is being dispatched from.
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext {
    /// The rule that fired.
    pub rule_id: Uuid,
    /// Correlation ID of the pass.
    pub correlation_id: Uuid,
    /// Time of the pass.
    pub now: DateTime<Utc>,
}

/// Routes actions to the component that owns the target entity.
pub trait ActionDispatcher {
    /// Requests deployment of a content version.
    ///
    /// # Errors
    ///
    /// Whatever the deployment pipeline rejects the request with.
    fn deploy_content(
        &mut self,
        version_id: Uuid,
        ctx: &DispatchContext,
    ) -> Result<(), DomainError>;

    /// Rolls back a content version.
    ///
    /// # Errors
    ///
    /// Whatever the deployment pipeline rejects the rollback with.
    fn rollback_content(
        &mut self,
        version_id: Uuid,
        reason: &str,
        ctx: &DispatchContext,
    ) -> Result<(), DomainError>;

    /// Forces a campaign due on this pass.
    ///
    /// # Errors
    ///
    /// Whatever the campaign scheduler rejects the request with.
    fn send_notification(
        &mut self,
        campaign_id: Uuid,
        ctx: &DispatchContext,
    ) -> Result<(), DomainError>;

    /// Raises a manual alert.
    ///
    /// # Errors
    ///
    /// Whatever the alert evaluator rejects the alert with.
    fn raise_alert(
        &mut self,
        severity: Severity,
        message: &str,
        ctx: &DispatchContext,
    ) -> Result<(), DomainError>;
}
