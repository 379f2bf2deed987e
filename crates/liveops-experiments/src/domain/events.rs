//! Lifecycle events for the A/B Testing context.

use chrono::{DateTime, Utc};
use liveops_core::event::{DomainEvent, EventMetadata};
use serde::{Deserialize, Serialize};

use super::aggregates::{Evaluation, ExitReason};

/// Event type for `TestCreated`.
pub const TEST_CREATED_EVENT_TYPE: &str = "experiments.test_created";
/// Event type for `TestStarted`.
pub const TEST_STARTED_EVENT_TYPE: &str = "experiments.test_started";
/// Event type for `TestExtended`.
pub const TEST_EXTENDED_EVENT_TYPE: &str = "experiments.test_extended";
/// Event type for `WinnerResolved`.
pub const WINNER_RESOLVED_EVENT_TYPE: &str = "experiments.winner_resolved";
/// Event type for `TestInconclusive`.
pub const TEST_INCONCLUSIVE_EVENT_TYPE: &str = "experiments.test_inconclusive";
/// Event type for `TestCancelled`.
pub const TEST_CANCELLED_EVENT_TYPE: &str = "experiments.test_cancelled";

/// Emitted when a test is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCreated {
    /// Display name.
    pub name: String,
    /// Variant names in declaration order.
    pub variants: Vec<String>,
}

/// Emitted when an inconclusive test is extended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestExtended {
    /// The new end time.
    pub ends_at: DateTime<Utc>,
    /// Extensions taken so far.
    pub extensions: u32,
}

/// Emitted when a test completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestConcluded {
    /// The winner, absent when inconclusive.
    pub winner: Option<String>,
    /// Why the test stopped.
    pub reason: ExitReason,
    /// The final leader comparison.
    pub evaluation: Option<Evaluation>,
}

/// Emitted when a test is cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCancelled {
    /// Operator-facing reason.
    pub reason: String,
}

/// Event payload variants for the A/B Testing context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExperimentEventKind {
    /// A test was created.
    TestCreated(TestCreated),
    /// A test started.
    TestStarted,
    /// An inconclusive test was extended.
    TestExtended(TestExtended),
    /// A test completed with a winner.
    WinnerResolved(TestConcluded),
    /// A test completed without a winner.
    TestInconclusive(TestConcluded),
    /// A test was cancelled.
    TestCancelled(TestCancelled),
}

impl ExperimentEventKind {
    /// The routing name of this variant.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TestCreated(_) => TEST_CREATED_EVENT_TYPE,
            Self::TestStarted => TEST_STARTED_EVENT_TYPE,
            Self::TestExtended(_) => TEST_EXTENDED_EVENT_TYPE,
            Self::WinnerResolved(_) => WINNER_RESOLVED_EVENT_TYPE,
            Self::TestInconclusive(_) => TEST_INCONCLUSIVE_EVENT_TYPE,
            Self::TestCancelled(_) => TEST_CANCELLED_EVENT_TYPE,
        }
    }
}

/// Lifecycle event envelope for the A/B Testing context.
#[derive(Debug, Clone)]
pub struct ExperimentEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: ExperimentEventKind,
}

impl DomainEvent for ExperimentEvent {
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
