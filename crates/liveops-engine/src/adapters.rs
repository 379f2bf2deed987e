//! Default collaborator adapters for hosts without real integrations.
//!
//! The logging adapters report through `tracing` and always succeed. The
//! file store keeps one pretty-printed JSON document per entity store.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use liveops_core::error::DomainError;
use liveops_core::external::ExternalCallError;
use liveops_core::ports::{
    AnalyticsSink, DeliveryChannel, GrantKey, PlayerProfile, RenderedMessage, RewardGrantService,
    RewardSpec, SegmentPredicate, SegmentResolver,
};
use liveops_core::snapshot::SnapshotStore;
use tracing::{debug, info};
use uuid::Uuid;

/// Analytics sink that logs each lifecycle event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnalyticsSink;

impl AnalyticsSink for TracingAnalyticsSink {
    fn record(&self, event_name: &str, attributes: &serde_json::Value) {
        info!(target: "liveops::analytics", event = event_name, %attributes, "analytics event");
    }
}

/// Reward service that logs grants instead of calling an economy ledger.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingRewardService;

#[async_trait]
impl RewardGrantService for LoggingRewardService {
    async fn grant(&self, key: &GrantKey, reward: &RewardSpec) -> Result<(), ExternalCallError> {
        info!(grant_key = %key, reward = ?reward.kind, "reward granted");
        Ok(())
    }
}

/// Delivery channel that logs messages instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDeliveryChannel;

#[async_trait]
impl DeliveryChannel for LoggingDeliveryChannel {
    async fn deliver(
        &self,
        campaign_id: Uuid,
        target_segment: &str,
        message: &RenderedMessage,
    ) -> Result<(), ExternalCallError> {
        info!(
            campaign_id = %campaign_id,
            target_segment,
            title = %message.title,
            "notification delivered"
        );
        Ok(())
    }
}

/// Segment id every resolver built by [`AttributeSegmentResolver::new`]
/// knows, matching every player.
pub const ALL_PLAYERS: &str = "all";

/// Resolves segments to "attribute is one of" predicates.
#[derive(Debug, Clone)]
pub struct AttributeSegmentResolver {
    segments: BTreeMap<String, (String, Vec<String>)>,
}

impl Default for AttributeSegmentResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeSegmentResolver {
    /// A resolver that knows only [`ALL_PLAYERS`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            segments: BTreeMap::new(),
        }
    }

    /// Adds a segment of players whose `attribute` is any of `values`.
    #[must_use]
    pub fn with_segment<I, S>(
        mut self,
        segment_id: impl Into<String>,
        attribute: impl Into<String>,
        values: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.segments.insert(
            segment_id.into(),
            (attribute.into(), values.into_iter().map(Into::into).collect()),
        );
        self
    }
}

impl SegmentResolver for AttributeSegmentResolver {
    fn resolve(&self, segment_id: &str) -> Option<SegmentPredicate> {
        if segment_id == ALL_PLAYERS {
            return Some(Arc::new(|_: &PlayerProfile| true));
        }
        let (attribute, values) = self.segments.get(segment_id)?.clone();
        Some(Arc::new(move |profile: &PlayerProfile| {
            profile
                .attributes
                .get(&attribute)
                .is_some_and(|v| values.contains(v))
        }))
    }
}

/// Snapshot store backed by one JSON file per entity store.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Stores snapshots under `dir`, which is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, store: &str) -> PathBuf {
        self.dir.join(format!("{store}.json"))
    }
}

fn io_error(store: &str, e: &std::io::Error) -> DomainError {
    DomainError::Infrastructure(format!("{store} snapshot file: {e}"))
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self, store: &str) -> Result<Option<serde_json::Value>, DomainError> {
        let bytes = match tokio::fs::read(self.path(store)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(store, &e)),
        };
        let blob = serde_json::from_slice(&bytes).map_err(|e| {
            DomainError::Infrastructure(format!("{store} snapshot file is not JSON: {e}"))
        })?;
        debug!(store, bytes = bytes.len(), "snapshot loaded");
        Ok(Some(blob))
    }

    async fn save(&self, store: &str, blob: serde_json::Value) -> Result<(), DomainError> {
        let bytes = serde_json::to_vec_pretty(&blob)
            .map_err(|e| DomainError::Infrastructure(format!("{store} snapshot: {e}")))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(store, &e))?;
        // Atomic replace: readers see the old file or the new one.
        let target = self.path(store);
        let staging = target.with_extension("json.tmp");
        tokio::fs::write(&staging, &bytes)
            .await
            .map_err(|e| io_error(store, &e))?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| io_error(store, &e))?;
        debug!(store, bytes = bytes.len(), "snapshot saved");
        Ok(())
    }
}
