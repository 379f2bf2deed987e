//! Test snapshot stores — mock `SnapshotStore` implementations.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use liveops_core::error::DomainError;
use liveops_core::snapshot::SnapshotStore;

/// A snapshot store that keeps blobs in memory.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    blobs: Mutex<HashMap<String, serde_json::Value>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the stores saved so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn saved_stores(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blobs.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, store: &str) -> Result<Option<serde_json::Value>, DomainError> {
        Ok(self.blobs.lock().unwrap().get(store).cloned())
    }

    async fn save(&self, store: &str, blob: serde_json::Value) -> Result<(), DomainError> {
        self.blobs.lock().unwrap().insert(store.to_owned(), blob);
        Ok(())
    }
}

/// A snapshot store that always returns an infrastructure error.
#[derive(Debug)]
pub struct FailingSnapshotStore;

#[async_trait]
impl SnapshotStore for FailingSnapshotStore {
    async fn load(&self, _store: &str) -> Result<Option<serde_json::Value>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn save(&self, _store: &str, _blob: serde_json::Value) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}
