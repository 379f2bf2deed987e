//! Test reward services — mock `RewardGrantService` implementations.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use liveops_core::external::ExternalCallError;
use liveops_core::ports::{GrantKey, RewardGrantService, RewardSpec};

/// A reward service that records every grant call. It can be told to fail a
/// number of calls first, to exercise retry paths.
#[derive(Debug, Default)]
pub struct RecordingRewardService {
    calls: Mutex<Vec<GrantKey>>,
    granted: Mutex<Vec<GrantKey>>,
    failures_remaining: Mutex<u32>,
}

impl RecordingRewardService {
    /// Creates a service where every grant succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service whose first `failures` calls fail.
    #[must_use]
    pub fn failing_first(failures: u32) -> Self {
        Self {
            failures_remaining: Mutex::new(failures),
            ..Self::default()
        }
    }

    /// Every grant call received, successful or not.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn calls(&self) -> Vec<GrantKey> {
        self.calls.lock().unwrap().clone()
    }

    /// Grants that succeeded.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn granted(&self) -> Vec<GrantKey> {
        self.granted.lock().unwrap().clone()
    }
}

#[async_trait]
impl RewardGrantService for RecordingRewardService {
    async fn grant(&self, key: &GrantKey, _reward: &RewardSpec) -> Result<(), ExternalCallError> {
        self.calls.lock().unwrap().push(key.clone());
        {
            let mut remaining = self.failures_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ExternalCallError::Failed("ledger unavailable".into()));
            }
        }
        self.granted.lock().unwrap().push(key.clone());
        Ok(())
    }
}

/// A reward service that always fails.
#[derive(Debug)]
pub struct FailingRewardService;

#[async_trait]
impl RewardGrantService for FailingRewardService {
    async fn grant(&self, _key: &GrantKey, _reward: &RewardSpec) -> Result<(), ExternalCallError> {
        Err(ExternalCallError::Failed("ledger unavailable".into()))
    }
}

/// A reward service that never answers within any reasonable timeout.
#[derive(Debug)]
pub struct StallingRewardService;

#[async_trait]
impl RewardGrantService for StallingRewardService {
    async fn grant(&self, _key: &GrantKey, _reward: &RewardSpec) -> Result<(), ExternalCallError> {
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        Ok(())
    }
}
