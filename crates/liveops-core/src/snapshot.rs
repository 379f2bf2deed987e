//! Snapshot persistence abstraction.

use async_trait::async_trait;

use crate::error::DomainError;

/// Entity-store names used as snapshot keys.
pub mod stores {
    /// Live events.
    pub const LIVE_EVENTS: &str = "live_events";
    /// Content versions.
    pub const CONTENT_VERSIONS: &str = "content_versions";
    /// A/B tests.
    pub const AB_TESTS: &str = "ab_tests";
    /// Automation rules.
    pub const AUTOMATION_RULES: &str = "automation_rules";
    /// Notification campaigns.
    pub const NOTIFICATION_CAMPAIGNS: &str = "notification_campaigns";
    /// Alerts.
    pub const ALERTS: &str = "alerts";
    /// The metric store.
    pub const METRICS: &str = "metrics";

    /// Every store, in load order.
    pub const ALL: [&str; 7] = [
        LIVE_EVENTS,
        CONTENT_VERSIONS,
        AB_TESTS,
        AUTOMATION_RULES,
        NOTIFICATION_CAMPAIGNS,
        ALERTS,
        METRICS,
    ];
}

/// Loads and saves opaque per-store snapshot blobs at process start/stop.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Loads the blob saved for `store`, if any.
    async fn load(&self, store: &str) -> Result<Option<serde_json::Value>, DomainError>;

    /// Saves the blob for `store`, replacing any previous one.
    async fn save(&self, store: &str, blob: serde_json::Value) -> Result<(), DomainError>;
}
