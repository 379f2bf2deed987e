//! Lifecycle events for the Notification Campaign context.

use liveops_core::event::{DomainEvent, EventMetadata};
use serde::{Deserialize, Serialize};

use super::aggregates::Schedule;

/// Event type for `CampaignRegistered`.
pub const CAMPAIGN_REGISTERED_EVENT_TYPE: &str = "notifications.campaign_registered";
/// Event type for `CampaignEnabled`.
pub const CAMPAIGN_ENABLED_EVENT_TYPE: &str = "notifications.campaign_enabled";
/// Event type for `CampaignDisabled`.
pub const CAMPAIGN_DISABLED_EVENT_TYPE: &str = "notifications.campaign_disabled";
/// Event type for `CampaignForced`.
pub const CAMPAIGN_FORCED_EVENT_TYPE: &str = "notifications.campaign_forced";
/// Event type for `Delivered`.
pub const DELIVERED_EVENT_TYPE: &str = "notifications.delivered";
/// Event type for `DeliveryFailed`.
pub const DELIVERY_FAILED_EVENT_TYPE: &str = "notifications.delivery_failed";
/// Event type for `DeliveryAbandoned`.
pub const DELIVERY_ABANDONED_EVENT_TYPE: &str = "notifications.delivery_abandoned";
/// Event type for `RenderFailed`.
pub const RENDER_FAILED_EVENT_TYPE: &str = "notifications.render_failed";

/// Emitted when a campaign is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRegistered {
    /// Display name.
    pub name: String,
    /// When the campaign fires.
    pub schedule: Schedule,
    /// Target segment.
    pub target_segment: String,
}

/// Emitted when a send succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivered {
    /// Successful sends so far.
    pub sent_count: u64,
    /// Whether the send was forced.
    pub forced: bool,
}

/// Emitted when a send fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    /// Attempts made for this send.
    pub attempts: u32,
    /// The error.
    pub error: String,
}

/// Emitted when a campaign's message no longer renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderFailed {
    /// The template error.
    pub error: String,
}

/// Event payload variants for the Notification Campaign context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationEventKind {
    /// A campaign was registered.
    CampaignRegistered(CampaignRegistered),
    /// A campaign was enabled.
    CampaignEnabled,
    /// A campaign was disabled.
    CampaignDisabled,
    /// A campaign was forced due.
    CampaignForced,
    /// A send succeeded.
    Delivered(Delivered),
    /// A send failed and will be retried.
    DeliveryFailed(DeliveryAttempt),
    /// A send failed and was dropped.
    DeliveryAbandoned(DeliveryAttempt),
    /// The message did not render; the campaign was disabled.
    RenderFailed(RenderFailed),
}

impl NotificationEventKind {
    /// The routing name of this variant.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CampaignRegistered(_) => CAMPAIGN_REGISTERED_EVENT_TYPE,
            Self::CampaignEnabled => CAMPAIGN_ENABLED_EVENT_TYPE,
            Self::CampaignDisabled => CAMPAIGN_DISABLED_EVENT_TYPE,
            Self::CampaignForced => CAMPAIGN_FORCED_EVENT_TYPE,
            Self::Delivered(_) => DELIVERED_EVENT_TYPE,
            Self::DeliveryFailed(_) => DELIVERY_FAILED_EVENT_TYPE,
            Self::DeliveryAbandoned(_) => DELIVERY_ABANDONED_EVENT_TYPE,
            Self::RenderFailed(_) => RENDER_FAILED_EVENT_TYPE,
        }
    }
}

/// Lifecycle event envelope for the Notification Campaign context.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: NotificationEventKind,
}

impl DomainEvent for NotificationEvent {
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
