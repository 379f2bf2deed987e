//! Lifecycle event abstractions.
//!
//! Every state transition a component performs, failures included, is
//! recorded as a lifecycle event. Components buffer them in an [`Outbox`];
//! the orchestration facade drains the outboxes after each pass and fans the
//! events out to the analytics sink and host subscribers in order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to every lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Type name for routing (e.g. `content.rolled_back`).
    pub event_type: String,
    /// Entity this event belongs to.
    pub aggregate_id: Uuid,
    /// Monotonically increasing version within the entity.
    pub sequence_number: i64,
    /// Correlation ID of the command or reconciliation pass that caused it.
    pub correlation_id: Uuid,
    /// Timestamp of the transition.
    pub occurred_at: DateTime<Utc>,
}

impl EventMetadata {
    /// Builds metadata for a new event.
    #[must_use]
    pub fn new(
        event_type: &str,
        aggregate_id: Uuid,
        sequence_number: i64,
        correlation_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.to_owned(),
            aggregate_id,
            sequence_number,
            correlation_id,
            occurred_at,
        }
    }
}

/// Trait that all lifecycle events implement.
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Serializes the event payload to JSON.
    fn to_payload(&self) -> serde_json::Value;

    /// Returns the metadata for this event.
    fn metadata(&self) -> &EventMetadata;
}

/// Ordered buffer of lifecycle events not yet handed to the facade.
#[derive(Debug)]
pub struct Outbox<E> {
    pending: Vec<E>,
}

impl<E> Outbox<E> {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Appends an event.
    pub fn push(&mut self, event: E) {
        self.pending.push(event);
    }

    /// Returns the buffered events without removing them.
    #[must_use]
    pub fn pending(&self) -> &[E] {
        &self.pending
    }

    /// Removes and returns every buffered event, oldest first.
    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.pending)
    }
}

impl<E> Default for Outbox<E> {
    fn default() -> Self {
        Self::new()
    }
}
