//! Ports to external collaborators.
//!
//! The engine consumes these as black-box services: the economy ledger that
//! grants rewards, the channel that delivers notifications, the analytics
//! sink and the segment resolver. Implementations live in the host.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::external::ExternalCallError;

/// The reward a player receives, as a closed set of kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardKind {
    /// Soft or hard currency.
    Currency {
        /// Currency code (e.g. `gems`).
        currency: String,
        /// Amount granted.
        amount: u64,
    },
    /// An inventory item.
    Item {
        /// Item catalogue identifier.
        item_id: String,
        /// Quantity granted.
        quantity: u32,
    },
    /// Experience points.
    Experience {
        /// Points granted.
        points: u64,
    },
    /// A cosmetic unlock.
    Cosmetic {
        /// Cosmetic catalogue identifier.
        cosmetic_id: String,
    },
}

/// A reward attached to a live event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSpec {
    /// Identifier unique within the event.
    pub reward_id: String,
    /// What is granted.
    #[serde(flatten)]
    pub kind: RewardKind,
}

impl RewardSpec {
    /// Rejects rewards that would grant nothing.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for an empty identifier or a
    /// zero amount.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.reward_id.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "reward id must not be empty".into(),
            ));
        }
        let empty = match &self.kind {
            RewardKind::Currency { currency, amount } => currency.trim().is_empty() || *amount == 0,
            RewardKind::Item { item_id, quantity } => item_id.trim().is_empty() || *quantity == 0,
            RewardKind::Experience { points } => *points == 0,
            RewardKind::Cosmetic { cosmetic_id } => cosmetic_id.trim().is_empty(),
        };
        if empty {
            return Err(DomainError::InvariantViolation(format!(
                "reward {} grants nothing",
                self.reward_id
            )));
        }
        Ok(())
    }
}

/// Idempotency key for a reward grant: `(event, player, reward)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantKey {
    /// The live event.
    pub event_id: Uuid,
    /// The player being rewarded.
    pub player_id: String,
    /// The reward within the event.
    pub reward_id: String,
}

impl fmt::Display for GrantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.event_id, self.player_id, self.reward_id)
    }
}

/// Economy ledger that actually grants rewards.
#[async_trait]
pub trait RewardGrantService: Send + Sync {
    /// Grants `reward` to the player. Must be idempotent on `key`.
    async fn grant(&self, key: &GrantKey, reward: &RewardSpec) -> Result<(), ExternalCallError>;
}

/// A notification ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    /// Message title.
    pub title: String,
    /// Message body with template variables substituted.
    pub body: String,
}

/// Push/email/in-game delivery transport.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Delivers a campaign message to a target segment.
    async fn deliver(
        &self,
        campaign_id: Uuid,
        target_segment: &str,
        message: &RenderedMessage,
    ) -> Result<(), ExternalCallError>;
}

/// Fire-and-forget telemetry sink. Implementations must not block.
pub trait AnalyticsSink: Send + Sync {
    /// Records a named event with attributes.
    fn record(&self, event_name: &str, attributes: &serde_json::Value);
}

/// Analytics sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalyticsSink;

impl AnalyticsSink for NoopAnalyticsSink {
    fn record(&self, _event_name: &str, _attributes: &serde_json::Value) {}
}

/// The slice of a player profile targeting predicates look at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Player identifier.
    pub player_id: String,
    /// Free-form attributes (country, platform, spend tier, ...).
    pub attributes: BTreeMap<String, String>,
}

impl PlayerProfile {
    /// Creates a profile with no attributes.
    #[must_use]
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Predicate over player profiles.
pub type SegmentPredicate = Arc<dyn Fn(&PlayerProfile) -> bool + Send + Sync>;

/// Resolves named segments to predicates.
pub trait SegmentResolver: Send + Sync {
    /// Returns the predicate for a segment, or `None` if the segment is
    /// unknown.
    fn resolve(&self, segment_id: &str) -> Option<SegmentPredicate>;
}
