//! Query views for the A/B Testing context.

use chrono::{DateTime, Utc};
use liveops_core::comparison::FieldValue;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{AbTest, TestResult};

/// Per-variant counters.
#[derive(Debug, Clone, Serialize)]
pub struct VariantView {
    /// Variant name.
    pub name: String,
    /// Share of traffic.
    pub weight: f64,
    /// Outcomes recorded.
    pub samples: u64,
    /// Outcomes that converted.
    pub conversions: u64,
    /// Conversion rate, absent without samples.
    pub conversion_rate: Option<f64>,
}

/// Read-only summary of an A/B test.
#[derive(Debug, Clone, Serialize)]
pub struct AbTestView {
    /// The test identifier.
    pub test_id: Uuid,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: &'static str,
    /// Current end time.
    pub ends_at: DateTime<Utc>,
    /// Arms in declaration order.
    pub variants: Vec<VariantView>,
    /// Resolved outcome.
    pub result: TestResult,
    /// p-value of the last leader comparison.
    pub p_value: Option<f64>,
}

impl From<&AbTest> for AbTestView {
    fn from(test: &AbTest) -> Self {
        Self {
            test_id: test.id,
            name: test.name.clone(),
            status: test.status.as_str(),
            ends_at: test.ends_at,
            variants: test
                .variants
                .iter()
                .map(|v| VariantView {
                    name: v.name.clone(),
                    weight: v.weight,
                    samples: v.samples,
                    conversions: v.conversions,
                    conversion_rate: v.proportion().rate(),
                })
                .collect(),
            result: test.result(),
            p_value: test.last_evaluation.as_ref().map(|e| e.test.p_value),
        }
    }
}

/// Resolves a named field of a test for rule conditions.
///
/// Known fields: `status`, `winner`, `total_samples`, `extensions`,
/// `p_value`, and `<variant>.samples`, `<variant>.conversions`,
/// `<variant>.rate` per variant.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn field_value(test: &AbTest, field: &str) -> Option<FieldValue> {
    match field {
        "status" => return Some(FieldValue::from(test.status.as_str())),
        "winner" => return test.winner.as_deref().map(FieldValue::from),
        "total_samples" => return Some(FieldValue::Number(test.total_samples() as f64)),
        "extensions" => return Some(FieldValue::Number(f64::from(test.extensions))),
        "p_value" => {
            return test
                .last_evaluation
                .as_ref()
                .map(|e| FieldValue::Number(e.test.p_value));
        }
        _ => {}
    }
    let (name, counter) = field.rsplit_once('.')?;
    let variant = test.variants.iter().find(|v| v.name == name)?;
    match counter {
        "samples" => Some(FieldValue::Number(variant.samples as f64)),
        "conversions" => Some(FieldValue::Number(variant.conversions as f64)),
        "rate" => variant.proportion().rate().map(FieldValue::Number),
        _ => None,
    }
}
