//! Commands for the Event Lifecycle context.

use chrono::{DateTime, Utc};
use liveops_core::command::Command;
use liveops_core::ports::{PlayerProfile, RewardSpec};
use uuid::Uuid;

use super::aggregates::{CompletionPolicy, EventType, Objective};

/// Command to schedule a new live event.
#[derive(Debug, Clone)]
pub struct ScheduleEvent {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Display name.
    pub name: String,
    /// Event category.
    pub event_type: EventType,
    /// Inclusive start of the event window.
    pub starts_at: DateTime<Utc>,
    /// Exclusive end of the event window.
    pub ends_at: DateTime<Utc>,
    /// Objectives, in display order.
    pub objectives: Vec<Objective>,
    /// Rewards granted to every player who finishes all objectives.
    pub rewards: Vec<RewardSpec>,
    /// Optional segment restricting who may take part.
    pub target_segment: Option<String>,
    /// When the event as a whole completes.
    pub completion_policy: CompletionPolicy,
}

impl Command for ScheduleEvent {
    fn command_type(&self) -> &'static str {
        "events.schedule_event"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to enrol a player in an event.
#[derive(Debug, Clone)]
pub struct JoinEvent {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The event identifier.
    pub event_id: Uuid,
    /// The joining player's profile, checked against the target segment.
    pub profile: PlayerProfile,
}

impl Command for JoinEvent {
    fn command_type(&self) -> &'static str {
        "events.join_event"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to record player progress on an objective counter.
#[derive(Debug, Clone)]
pub struct RecordProgress {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The event identifier.
    pub event_id: Uuid,
    /// The player making progress.
    pub player_id: String,
    /// The counter advanced (e.g. `levels_completed`). Every objective that
    /// tracks this counter moves.
    pub objective_key: String,
    /// Amount to add.
    pub delta: u64,
}

impl Command for RecordProgress {
    fn command_type(&self) -> &'static str {
        "events.record_progress"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to cancel a scheduled or active event.
#[derive(Debug, Clone)]
pub struct CancelEvent {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The event identifier.
    pub event_id: Uuid,
    /// Operator-facing reason.
    pub reason: String,
}

impl Command for CancelEvent {
    fn command_type(&self) -> &'static str {
        "events.cancel_event"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
