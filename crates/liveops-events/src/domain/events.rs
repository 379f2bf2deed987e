//! Lifecycle events for the Event Lifecycle context.

use chrono::{DateTime, Utc};
use liveops_core::event::{DomainEvent, EventMetadata};
use serde::{Deserialize, Serialize};

use super::aggregates::CompletionReason;

/// Event type for `EventScheduled`.
pub const EVENT_SCHEDULED_EVENT_TYPE: &str = "events.scheduled";
/// Event type for `EventActivated`.
pub const EVENT_ACTIVATED_EVENT_TYPE: &str = "events.activated";
/// Event type for `PlayerJoined`.
pub const PLAYER_JOINED_EVENT_TYPE: &str = "events.player_joined";
/// Event type for `ObjectiveCompleted`.
pub const OBJECTIVE_COMPLETED_EVENT_TYPE: &str = "events.objective_completed";
/// Event type for `PlayerFinished`.
pub const PLAYER_FINISHED_EVENT_TYPE: &str = "events.player_finished";
/// Event type for `RewardGranted`.
pub const REWARD_GRANTED_EVENT_TYPE: &str = "events.reward_granted";
/// Event type for `RewardGrantFailed`.
pub const REWARD_GRANT_FAILED_EVENT_TYPE: &str = "events.reward_grant_failed";
/// Event type for `RewardGrantAbandoned`.
pub const REWARD_GRANT_ABANDONED_EVENT_TYPE: &str = "events.reward_grant_abandoned";
/// Event type for `EventCompleted`.
pub const EVENT_COMPLETED_EVENT_TYPE: &str = "events.completed";
/// Event type for `EventCancelled`.
pub const EVENT_CANCELLED_EVENT_TYPE: &str = "events.cancelled";
/// Event type for `EventArchived`.
pub const EVENT_ARCHIVED_EVENT_TYPE: &str = "events.archived";

/// Emitted when an event is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventScheduled {
    /// Display name.
    pub name: String,
    /// Start of the window.
    pub starts_at: DateTime<Utc>,
    /// Exclusive end of the window.
    pub ends_at: DateTime<Utc>,
}

/// Emitted for a player-scoped transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerTransition {
    /// The player.
    pub player_id: String,
}

/// Emitted when a player completes one objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveCompleted {
    /// The player.
    pub player_id: String,
    /// The objective completed.
    pub objective_id: String,
}

/// Emitted for reward settlement outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSettlement {
    /// The player.
    pub player_id: String,
    /// The reward.
    pub reward_id: String,
    /// Attempts made so far, the current one included.
    pub attempts: u32,
    /// Failure description, for failed or abandoned grants.
    pub error: Option<String>,
}

/// Emitted when an event completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCompleted {
    /// Why the event completed.
    pub reason: CompletionReason,
}

/// Emitted when an event is cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCancelled {
    /// Operator-facing reason.
    pub reason: String,
}

/// Event payload variants for the Event Lifecycle context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiveEventEventKind {
    /// The event was scheduled.
    EventScheduled(EventScheduled),
    /// The event window opened.
    EventActivated,
    /// A player joined.
    PlayerJoined(PlayerTransition),
    /// A player completed an objective.
    ObjectiveCompleted(ObjectiveCompleted),
    /// A player completed every objective.
    PlayerFinished(PlayerTransition),
    /// A reward grant succeeded.
    RewardGranted(RewardSettlement),
    /// A reward grant failed and will be retried.
    RewardGrantFailed(RewardSettlement),
    /// A reward grant exhausted its retries.
    RewardGrantAbandoned(RewardSettlement),
    /// The event completed.
    EventCompleted(EventCompleted),
    /// The event was cancelled.
    EventCancelled(EventCancelled),
    /// The event was evicted after its retention window.
    EventArchived,
}

/// Lifecycle event envelope for the Event Lifecycle context.
#[derive(Debug, Clone)]
pub struct LiveEventEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: LiveEventEventKind,
}

impl LiveEventEventKind {
    /// The routing name of this variant.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::EventScheduled(_) => EVENT_SCHEDULED_EVENT_TYPE,
            Self::EventActivated => EVENT_ACTIVATED_EVENT_TYPE,
            Self::PlayerJoined(_) => PLAYER_JOINED_EVENT_TYPE,
            Self::ObjectiveCompleted(_) => OBJECTIVE_COMPLETED_EVENT_TYPE,
            Self::PlayerFinished(_) => PLAYER_FINISHED_EVENT_TYPE,
            Self::RewardGranted(_) => REWARD_GRANTED_EVENT_TYPE,
            Self::RewardGrantFailed(_) => REWARD_GRANT_FAILED_EVENT_TYPE,
            Self::RewardGrantAbandoned(_) => REWARD_GRANT_ABANDONED_EVENT_TYPE,
            Self::EventCompleted(_) => EVENT_COMPLETED_EVENT_TYPE,
            Self::EventCancelled(_) => EVENT_CANCELLED_EVENT_TYPE,
            Self::EventArchived => EVENT_ARCHIVED_EVENT_TYPE,
        }
    }
}

impl DomainEvent for LiveEventEvent {
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
