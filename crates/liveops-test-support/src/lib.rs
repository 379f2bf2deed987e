//! Shared test doubles and utilities for the live-operations engine.

mod analytics;
mod clock;
mod delivery;
mod rewards;
mod rng;
mod segments;
mod snapshot;

pub use analytics::RecordingAnalyticsSink;
pub use clock::{FixedClock, ManualClock};
pub use delivery::{FailingDeliveryChannel, RecordingDeliveryChannel};
pub use rewards::{FailingRewardService, RecordingRewardService, StallingRewardService};
pub use rng::{MockRng, SequenceRng};
pub use segments::StaticSegmentResolver;
pub use snapshot::{FailingSnapshotStore, InMemorySnapshotStore};

/// The instant every test treats as "now" unless it needs another.
///
/// # Panics
///
/// Never in practice; the date is a constant valid timestamp.
#[must_use]
pub fn fixed_now() -> chrono::DateTime<chrono::Utc> {
    chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap()
}
