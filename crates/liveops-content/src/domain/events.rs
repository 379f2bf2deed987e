//! Lifecycle events for the Content Deployment context.

use liveops_core::event::{DomainEvent, EventMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type for `ContentSubmitted`.
pub const CONTENT_SUBMITTED_EVENT_TYPE: &str = "content.submitted";
/// Event type for `ContentValidated`.
pub const CONTENT_VALIDATED_EVENT_TYPE: &str = "content.validated";
/// Event type for `ValidationFailed`.
pub const VALIDATION_FAILED_EVENT_TYPE: &str = "content.validation_failed";
/// Event type for `DeploymentBlocked`.
pub const DEPLOYMENT_BLOCKED_EVENT_TYPE: &str = "content.deployment_blocked";
/// Event type for `RolloutStarted`.
pub const ROLLOUT_STARTED_EVENT_TYPE: &str = "content.rollout_started";
/// Event type for `RolloutAdvanced`.
pub const ROLLOUT_ADVANCED_EVENT_TYPE: &str = "content.rollout_advanced";
/// Event type for `ContentDeployed`.
pub const CONTENT_DEPLOYED_EVENT_TYPE: &str = "content.deployed";
/// Event type for `ContentDeprecated`.
pub const CONTENT_DEPRECATED_EVENT_TYPE: &str = "content.deprecated";
/// Event type for `ContentRolledBack`.
pub const CONTENT_ROLLED_BACK_EVENT_TYPE: &str = "content.rolled_back";
/// Event type for `ContentRestored`.
pub const CONTENT_RESTORED_EVENT_TYPE: &str = "content.restored";

/// Emitted when a version is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSubmitted {
    /// Content type.
    pub content_type: String,
    /// Declared checksum.
    pub checksum: String,
}

/// Emitted when a validation rule fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailed {
    /// The failing rule.
    pub rule: String,
    /// Why it failed.
    pub reason: String,
}

/// Emitted when a dependency blocks deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentBlocked {
    /// The blocking dependency.
    pub dependency_id: Uuid,
}

/// Emitted when exposure changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutChanged {
    /// New exposure percentage.
    pub rollout_percentage: u8,
}

/// Emitted when a version reaches production.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDeployed {
    /// The production version this one replaced.
    pub superseded: Option<Uuid>,
}

/// Emitted when a version is replaced by a newer one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDeprecated {
    /// The replacing version.
    pub replaced_by: Uuid,
}

/// Emitted when a version is rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRolledBack {
    /// Operator-facing reason.
    pub reason: String,
}

/// Emitted when a deprecated version returns to production.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRestored {
    /// The rolled-back version it replaces.
    pub replacing: Uuid,
}

/// Event payload variants for the Content Deployment context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentEventKind {
    /// A version was submitted.
    ContentSubmitted(ContentSubmitted),
    /// Every rule passed.
    ContentValidated,
    /// A rule failed.
    ValidationFailed(ValidationFailed),
    /// A dependency blocks deployment.
    DeploymentBlocked(DeploymentBlocked),
    /// A staged rollout started.
    RolloutStarted(RolloutChanged),
    /// A staged rollout moved to its next step.
    RolloutAdvanced(RolloutChanged),
    /// The version reached production.
    ContentDeployed(ContentDeployed),
    /// The version was replaced.
    ContentDeprecated(ContentDeprecated),
    /// The version was rolled back.
    ContentRolledBack(ContentRolledBack),
    /// A deprecated version returned to production.
    ContentRestored(ContentRestored),
}

impl ContentEventKind {
    /// The routing name of this variant.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ContentSubmitted(_) => CONTENT_SUBMITTED_EVENT_TYPE,
            Self::ContentValidated => CONTENT_VALIDATED_EVENT_TYPE,
            Self::ValidationFailed(_) => VALIDATION_FAILED_EVENT_TYPE,
            Self::DeploymentBlocked(_) => DEPLOYMENT_BLOCKED_EVENT_TYPE,
            Self::RolloutStarted(_) => ROLLOUT_STARTED_EVENT_TYPE,
            Self::RolloutAdvanced(_) => ROLLOUT_ADVANCED_EVENT_TYPE,
            Self::ContentDeployed(_) => CONTENT_DEPLOYED_EVENT_TYPE,
            Self::ContentDeprecated(_) => CONTENT_DEPRECATED_EVENT_TYPE,
            Self::ContentRolledBack(_) => CONTENT_ROLLED_BACK_EVENT_TYPE,
            Self::ContentRestored(_) => CONTENT_RESTORED_EVENT_TYPE,
        }
    }
}

/// Lifecycle event envelope for the Content Deployment context.
#[derive(Debug, Clone)]
pub struct ContentEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: ContentEventKind,
}

impl DomainEvent for ContentEvent {
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
