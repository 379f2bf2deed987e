//! Test segment resolver.

use std::collections::HashMap;
use std::sync::Arc;

use liveops_core::ports::{PlayerProfile, SegmentPredicate, SegmentResolver};

/// Resolves segments from a fixed table of `attribute == value` predicates.
#[derive(Debug, Default)]
pub struct StaticSegmentResolver {
    segments: HashMap<String, (String, String)>,
}

impl StaticSegmentResolver {
    /// Creates a resolver that knows no segments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a segment matching players whose `attribute` equals `value`.
    #[must_use]
    pub fn with_segment(
        mut self,
        segment_id: impl Into<String>,
        attribute: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.segments
            .insert(segment_id.into(), (attribute.into(), value.into()));
        self
    }
}

impl SegmentResolver for StaticSegmentResolver {
    fn resolve(&self, segment_id: &str) -> Option<SegmentPredicate> {
        let (attribute, value) = self.segments.get(segment_id)?.clone();
        Some(Arc::new(move |profile: &PlayerProfile| {
            profile.attributes.get(&attribute) == Some(&value)
        }))
    }
}
