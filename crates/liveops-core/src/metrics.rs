//! Named numeric values shared across a reconciliation pass.
//!
//! Any component may write; the alert evaluator and the automation rule
//! engine read. The store is owned by the orchestration facade and handed to
//! components by reference, so there is exactly one writer at a time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single metric reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Current value.
    pub value: f64,
    /// When the value was last written.
    pub updated_at: DateTime<Utc>,
}

/// Mapping from metric name to its current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricStore {
    samples: BTreeMap<String, MetricSample>,
}

impl MetricStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a metric, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: f64, now: DateTime<Utc>) {
        self.samples.insert(
            name.into(),
            MetricSample {
                value,
                updated_at: now,
            },
        );
    }

    /// Adds `delta` to a metric, treating a missing metric as zero. Returns
    /// the new value.
    pub fn increment(&mut self, name: &str, delta: f64, now: DateTime<Utc>) -> f64 {
        let value = self.get(name).unwrap_or(0.0) + delta;
        self.set(name, value, now);
        value
    }

    /// Returns the current value of a metric.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.samples.get(name).map(|s| s.value)
    }

    /// Returns the full sample of a metric.
    #[must_use]
    pub fn sample(&self, name: &str) -> Option<MetricSample> {
        self.samples.get(name).copied()
    }

    /// Removes a metric. Returns whether it existed.
    pub fn clear(&mut self, name: &str) -> bool {
        self.samples.remove(name).is_some()
    }

    /// Returns an owned copy of every metric.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.samples
            .iter()
            .map(|(name, sample)| (name.clone(), sample.value))
            .collect()
    }

    /// Number of metrics held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the store holds no metrics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_set_then_get_returns_latest_value() {
        let mut store = MetricStore::new();

        store.set("error_rate", 0.10, fixed_now());
        store.set("error_rate", 0.02, fixed_now());

        assert_eq!(store.get("error_rate"), Some(0.02));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_increment_treats_missing_as_zero() {
        let mut store = MetricStore::new();

        assert!((store.increment("sessions", 3.0, fixed_now()) - 3.0).abs() < f64::EPSILON);
        assert!((store.increment("sessions", 2.0, fixed_now()) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clear_removes_metric() {
        let mut store = MetricStore::new();
        store.set("error_rate", 0.1, fixed_now());

        assert!(store.clear("error_rate"));
        assert!(!store.clear("error_rate"));
        assert_eq!(store.get("error_rate"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let mut store = MetricStore::new();
        store.set("a", 1.0, fixed_now());

        let snapshot = store.snapshot();
        store.set("a", 2.0, fixed_now());

        assert_eq!(snapshot.get("a"), Some(&1.0));
    }
}
