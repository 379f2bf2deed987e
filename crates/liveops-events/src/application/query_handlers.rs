//! Query views for the Event Lifecycle context.
//!
//! Read-only projections of [`LiveEvent`], used by hosts and by automation
//! rule conditions that address event state by field name.

use chrono::{DateTime, Utc};
use liveops_core::comparison::FieldValue;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{EventMetrics, LiveEvent};

/// Read-only summary of a live event.
#[derive(Debug, Clone, Serialize)]
pub struct LiveEventView {
    /// The event identifier.
    pub event_id: Uuid,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: &'static str,
    /// Start of the window.
    pub starts_at: DateTime<Utc>,
    /// Exclusive end of the window.
    pub ends_at: DateTime<Utc>,
    /// Per-event counters.
    pub metrics: EventMetrics,
    /// Grants still awaiting settlement.
    pub pending_grants: usize,
}

impl From<&LiveEvent> for LiveEventView {
    fn from(event: &LiveEvent) -> Self {
        Self {
            event_id: event.id,
            name: event.name.clone(),
            status: event.status.as_str(),
            starts_at: event.starts_at,
            ends_at: event.ends_at,
            metrics: event.metrics,
            pending_grants: event.settlement.pending.len(),
        }
    }
}

/// Resolves a named field of an event for rule conditions.
///
/// Known fields: `status`, `participants`, `finishers`, `progress_updates`,
/// `rewards_granted`, `grant_failures`, `grants_abandoned`, `pending_grants`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn field_value(event: &LiveEvent, field: &str) -> Option<FieldValue> {
    let metrics = &event.metrics;
    let number = match field {
        "status" => return Some(FieldValue::from(event.status.as_str())),
        "participants" => metrics.participants,
        "finishers" => metrics.finishers,
        "progress_updates" => metrics.progress_updates,
        "rewards_granted" => metrics.rewards_granted,
        "grant_failures" => metrics.grant_failures,
        "grants_abandoned" => metrics.grants_abandoned,
        "pending_grants" => event.settlement.pending.len() as u64,
        _ => return None,
    };
    Some(FieldValue::Number(number as f64))
}
