//! Commands for the A/B Testing context.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use liveops_core::command::Command;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregates::InconclusivePolicy;

/// A variant as declared at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSpec {
    /// Name unique within the test.
    pub name: String,
    /// Share of traffic.
    pub weight: f64,
    /// Parameters the client applies for this arm.
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl VariantSpec {
    /// Creates a variant without parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
            parameters: BTreeMap::new(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// Command to create an A/B test.
#[derive(Debug, Clone)]
pub struct CreateTest {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Display name.
    pub name: String,
    /// Arms; weights must sum to 1.0.
    pub variants: Vec<VariantSpec>,
    /// Metric the conversions stand for.
    pub target_metric: String,
    /// Required confidence, in `(0, 1)`.
    pub confidence: f64,
    /// Total samples needed before an early exit.
    pub min_sample_size: u64,
    /// Samples a variant needs to be eligible as winner.
    pub min_samples_per_variant: u64,
    /// Start time.
    pub starts_at: DateTime<Utc>,
    /// End time.
    pub ends_at: DateTime<Utc>,
    /// Inconclusive handling.
    pub inconclusive_policy: InconclusivePolicy,
}

impl Command for CreateTest {
    fn command_type(&self) -> &'static str {
        "experiments.create_test"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to record one outcome for a variant.
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The test.
    pub test_id: Uuid,
    /// The variant the subject saw.
    pub variant: String,
    /// Whether the subject converted.
    pub converted: bool,
}

impl Command for RecordOutcome {
    fn command_type(&self) -> &'static str {
        "experiments.record_outcome"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to stop a test without a result.
#[derive(Debug, Clone)]
pub struct CancelTest {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The test.
    pub test_id: Uuid,
    /// Operator-facing reason.
    pub reason: String,
}

impl Command for CancelTest {
    fn command_type(&self) -> &'static str {
        "experiments.cancel_test"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
