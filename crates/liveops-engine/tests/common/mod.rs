//! Shared helpers for engine scenario tests.
#![allow(dead_code)]

use std::sync::Arc;

use liveops_core::ports::{RewardKind, RewardSpec};
use liveops_engine::adapters::AttributeSegmentResolver;
use liveops_engine::config::EngineConfig;
use liveops_engine::facade::{Collaborators, LiveOpsEngine};
use liveops_test_support::{
    ManualClock, MockRng, RecordingAnalyticsSink, RecordingDeliveryChannel,
    RecordingRewardService, fixed_now,
};

/// An engine plus handles on its test collaborators.
pub struct Harness {
    pub engine: LiveOpsEngine,
    pub clock: ManualClock,
    pub rewards: Arc<RecordingRewardService>,
    pub delivery: Arc<RecordingDeliveryChannel>,
    pub analytics: Arc<RecordingAnalyticsSink>,
}

/// Engine with default configuration, starting at `fixed_now()`.
pub fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

/// Engine with `config`, starting at `fixed_now()`.
pub fn harness_with(config: EngineConfig) -> Harness {
    let clock = ManualClock::new(fixed_now());
    let rewards = Arc::new(RecordingRewardService::new());
    let delivery = Arc::new(RecordingDeliveryChannel::new());
    let analytics = Arc::new(RecordingAnalyticsSink::new());
    let segments =
        AttributeSegmentResolver::new().with_segment("spenders", "spend_tier", ["medium", "high"]);
    let collaborators = Collaborators {
        rewards: rewards.clone(),
        delivery: delivery.clone(),
        segments: Arc::new(segments),
        analytics: analytics.clone(),
        clock: Arc::new(clock.clone()),
    };
    Harness {
        engine: LiveOpsEngine::new(config, collaborators, Box::new(MockRng)),
        clock,
        rewards,
        delivery,
        analytics,
    }
}

/// A gem currency reward.
pub fn gems(amount: u64) -> RewardSpec {
    RewardSpec {
        reward_id: "gems".into(),
        kind: RewardKind::Currency {
            currency: "gems".into(),
            amount,
        },
    }
}
