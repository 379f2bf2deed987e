//! Test analytics sink.

use std::sync::Mutex;

use liveops_core::ports::AnalyticsSink;

/// An analytics sink that records every event name and payload.
#[derive(Debug, Default)]
pub struct RecordingAnalyticsSink {
    records: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingAnalyticsSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded event names, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn event_names(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Recorded events, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn records(&self) -> Vec<(String, serde_json::Value)> {
        self.records.lock().unwrap().clone()
    }
}

impl AnalyticsSink for RecordingAnalyticsSink {
    fn record(&self, event_name: &str, attributes: &serde_json::Value) {
        self.records
            .lock()
            .unwrap()
            .push((event_name.to_owned(), attributes.clone()));
    }
}
