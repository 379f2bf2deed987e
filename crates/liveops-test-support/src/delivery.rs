//! Test delivery channels — mock `DeliveryChannel` implementations.

use std::sync::Mutex;

use async_trait::async_trait;
use liveops_core::external::ExternalCallError;
use liveops_core::ports::{DeliveryChannel, RenderedMessage};
use uuid::Uuid;

/// A delivery channel that records every delivered message.
#[derive(Debug, Default)]
pub struct RecordingDeliveryChannel {
    delivered: Mutex<Vec<(Uuid, String, RenderedMessage)>>,
}

impl RecordingDeliveryChannel {
    /// Creates an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivery, in order: `(campaign, segment, message)`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn delivered(&self) -> Vec<(Uuid, String, RenderedMessage)> {
        self.delivered.lock().unwrap().clone()
    }

    /// Number of deliveries for one campaign.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn count_for(&self, campaign_id: Uuid) -> usize {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| *id == campaign_id)
            .count()
    }
}

#[async_trait]
impl DeliveryChannel for RecordingDeliveryChannel {
    async fn deliver(
        &self,
        campaign_id: Uuid,
        target_segment: &str,
        message: &RenderedMessage,
    ) -> Result<(), ExternalCallError> {
        self.delivered
            .lock()
            .unwrap()
            .push((campaign_id, target_segment.to_owned(), message.clone()));
        Ok(())
    }
}

/// A delivery channel that always fails.
#[derive(Debug)]
pub struct FailingDeliveryChannel;

#[async_trait]
impl DeliveryChannel for FailingDeliveryChannel {
    async fn deliver(
        &self,
        _campaign_id: Uuid,
        _target_segment: &str,
        _message: &RenderedMessage,
    ) -> Result<(), ExternalCallError> {
        Err(ExternalCallError::Failed("push gateway unavailable".into()))
    }
}
