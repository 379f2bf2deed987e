//! The Notification Campaign Scheduler.
//!
//! Each pass collects the due campaigns, renders their messages and hands
//! them to the delivery channel as independent tasks with a per-call
//! timeout. Results are applied in campaign order once every task has
//! joined.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use liveops_core::aggregate::AggregateRoot;
use liveops_core::error::DomainError;
use liveops_core::event::{EventMetadata, Outbox};
use liveops_core::external::{ExternalCallError, with_timeout};
use liveops_core::ports::{DeliveryChannel, SegmentResolver};
use liveops_core::retry::RetryPolicy;
use liveops_core::rng::DeterministicRng;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::aggregates::{Campaign, DeliveryFailure};
use crate::domain::commands::{RegisterCampaign, SetCampaignEnabled};
use crate::domain::events::{
    CampaignRegistered, Delivered, DeliveryAttempt, NotificationEvent, NotificationEventKind,
    RenderFailed,
};

/// Tunables for the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct NotificationSettings {
    /// Backoff for failed sends.
    pub retry_policy: RetryPolicy,
    /// Timeout applied to each delivery call.
    pub call_timeout: Duration,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationTickSummary {
    /// Sends attempted.
    pub attempted: usize,
    /// Sends that succeeded.
    pub delivered: usize,
    /// Sends that failed and will be retried.
    pub failed: usize,
    /// Sends dropped after exhausting retries.
    pub abandoned: usize,
    /// Campaigns disabled because their message did not render.
    pub render_failed: usize,
}

/// Fires campaigns through the delivery channel.
pub struct CampaignScheduler {
    campaigns: BTreeMap<Uuid, Campaign>,
    outbox: Outbox<NotificationEvent>,
    channel: Arc<dyn DeliveryChannel>,
    segments: Arc<dyn SegmentResolver>,
    settings: NotificationSettings,
}

impl std::fmt::Debug for CampaignScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignScheduler")
            .field("campaigns", &self.campaigns.len())
            .field("pending_events", &self.outbox.pending().len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn emit(
    outbox: &mut Outbox<NotificationEvent>,
    campaign: &mut Campaign,
    kind: NotificationEventKind,
    correlation_id: Uuid,
    now: DateTime<Utc>,
) {
    let sequence = campaign.next_version();
    outbox.push(NotificationEvent {
        metadata: EventMetadata::new(kind.event_type(), campaign.id, sequence, correlation_id, now),
        kind,
    });
}

impl CampaignScheduler {
    /// Creates a scheduler with no campaigns.
    #[must_use]
    pub fn new(
        channel: Arc<dyn DeliveryChannel>,
        segments: Arc<dyn SegmentResolver>,
        settings: NotificationSettings,
    ) -> Self {
        Self {
            campaigns: BTreeMap::new(),
            outbox: Outbox::new(),
            channel,
            segments,
            settings,
        }
    }

    /// Registers a campaign, enabled.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` if the campaign is malformed
    /// or targets a segment the resolver does not know.
    pub fn register(
        &mut self,
        command: &RegisterCampaign,
        now: DateTime<Utc>,
    ) -> Result<Uuid, DomainError> {
        if self.segments.resolve(&command.target_segment).is_none() {
            return Err(DomainError::InvariantViolation(format!(
                "unknown target segment `{}`",
                command.target_segment
            )));
        }
        let mut campaign = Campaign::register(Uuid::new_v4(), command, now)?;
        let id = campaign.id;
        let registered = NotificationEventKind::CampaignRegistered(CampaignRegistered {
            name: campaign.name.clone(),
            schedule: campaign.schedule,
            target_segment: campaign.target_segment.clone(),
        });
        emit(&mut self.outbox, &mut campaign, registered, command.correlation_id, now);
        info!(campaign_id = %id, name = %campaign.name, schedule = ?campaign.schedule, "campaign registered");
        self.campaigns.insert(id, campaign);
        Ok(id)
    }

    /// Enables or disables a campaign.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown campaign.
    pub fn set_enabled(
        &mut self,
        command: &SetCampaignEnabled,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let campaign = self
            .campaigns
            .get_mut(&command.campaign_id)
            .ok_or(DomainError::NotFound(command.campaign_id))?;
        if campaign.enabled == command.enabled {
            return Ok(());
        }
        campaign.set_enabled(command.enabled);
        let kind = if command.enabled {
            NotificationEventKind::CampaignEnabled
        } else {
            NotificationEventKind::CampaignDisabled
        };
        emit(&mut self.outbox, campaign, kind, command.correlation_id, now);
        info!(campaign_id = %campaign.id, enabled = command.enabled, "campaign toggled");
        Ok(())
    }

    /// Makes a campaign due on the next pass regardless of its schedule.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown campaign and
    /// `DomainError::InvalidState` for a disabled one.
    pub fn force(
        &mut self,
        campaign_id: Uuid,
        correlation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let campaign = self
            .campaigns
            .get_mut(&campaign_id)
            .ok_or(DomainError::NotFound(campaign_id))?;
        campaign.force()?;
        emit(
            &mut self.outbox,
            campaign,
            NotificationEventKind::CampaignForced,
            correlation_id,
            now,
        );
        debug!(campaign_id = %campaign_id, "campaign forced due");
        Ok(())
    }

    /// Runs one reconciliation pass: sends every due campaign.
    pub async fn tick(
        &mut self,
        now: DateTime<Utc>,
        correlation_id: Uuid,
        rng: &mut dyn DeterministicRng,
    ) -> NotificationTickSummary {
        let mut tasks = JoinSet::new();
        let mut render_failed = 0;
        let due: Vec<Uuid> = self
            .campaigns
            .values()
            .filter(|c| c.is_due(now))
            .map(|c| c.id)
            .collect();
        for id in due {
            let Some(campaign) = self.campaigns.get_mut(&id) else {
                continue;
            };
            let message = match campaign.render() {
                Ok(message) => message,
                Err(e) => {
                    let error = e.to_string();
                    campaign.record_render_failure(&error, now);
                    warn!(campaign_id = %id, error = %error, "campaign message does not render, campaign disabled");
                    render_failed += 1;
                    emit(
                        &mut self.outbox,
                        campaign,
                        NotificationEventKind::RenderFailed(RenderFailed { error }),
                        correlation_id,
                        now,
                    );
                    continue;
                }
            };
            let channel = Arc::clone(&self.channel);
            let timeout = self.settings.call_timeout;
            let forced = campaign.forced;
            let segment = campaign.target_segment.clone();
            tasks.spawn(async move {
                let result = with_timeout(timeout, channel.deliver(id, &segment, &message)).await;
                (id, forced, result)
            });
        }
        let mut summary = NotificationTickSummary {
            attempted: tasks.len(),
            render_failed,
            ..NotificationTickSummary::default()
        };

        let mut results: Vec<(Uuid, bool, Result<(), ExternalCallError>)> =
            Vec::with_capacity(summary.attempted);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "delivery task did not complete"),
            }
        }
        results.sort_by_key(|(id, _, _)| *id);

        for (id, forced, result) in results {
            let Some(campaign) = self.campaigns.get_mut(&id) else {
                continue;
            };
            let kind = match result {
                Ok(()) => {
                    let sent_count = campaign.record_delivered(now);
                    info!(campaign_id = %id, sent_count, forced, "campaign delivered");
                    summary.delivered += 1;
                    NotificationEventKind::Delivered(Delivered { sent_count, forced })
                }
                Err(e) => {
                    let error = e.to_string();
                    match campaign.record_failure(&error, &self.settings.retry_policy, now, rng) {
                        DeliveryFailure::Retrying { attempts } => {
                            warn!(campaign_id = %id, attempts, error = %error, "campaign delivery failed, will retry");
                            summary.failed += 1;
                            NotificationEventKind::DeliveryFailed(DeliveryAttempt { attempts, error })
                        }
                        DeliveryFailure::Abandoned { attempts } => {
                            warn!(campaign_id = %id, attempts, error = %error, "campaign delivery abandoned");
                            summary.abandoned += 1;
                            NotificationEventKind::DeliveryAbandoned(DeliveryAttempt {
                                attempts,
                                error,
                            })
                        }
                    }
                }
            };
            emit(&mut self.outbox, campaign, kind, correlation_id, now);
        }
        debug!(?summary, "notification pass finished");
        summary
    }

    /// Successful sends across all campaigns.
    #[must_use]
    pub fn sent_total(&self) -> u64 {
        self.campaigns.values().map(|c| c.sent_count).sum()
    }

    /// A copy of one campaign.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown campaign.
    pub fn get(&self, campaign_id: Uuid) -> Result<Campaign, DomainError> {
        self.campaigns
            .get(&campaign_id)
            .cloned()
            .ok_or(DomainError::NotFound(campaign_id))
    }

    /// Borrows one campaign for read-only inspection.
    #[must_use]
    pub fn peek(&self, campaign_id: Uuid) -> Option<&Campaign> {
        self.campaigns.get(&campaign_id)
    }

    /// Number of enabled campaigns.
    #[must_use]
    pub fn count_enabled(&self) -> usize {
        self.campaigns.values().filter(|c| c.enabled).count()
    }

    /// Removes and returns buffered lifecycle events, oldest first.
    pub fn drain_events(&mut self) -> Vec<NotificationEvent> {
        self.outbox.drain()
    }

    /// Serializes every campaign.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if serialization fails.
    pub fn snapshot(&self) -> Result<serde_json::Value, DomainError> {
        let campaigns: Vec<&Campaign> = self.campaigns.values().collect();
        serde_json::to_value(campaigns)
            .map_err(|e| DomainError::Infrastructure(format!("campaign snapshot failed: {e}")))
    }

    /// Replaces the store with a snapshot taken by [`Self::snapshot`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the blob cannot be decoded.
    pub fn restore(&mut self, blob: serde_json::Value) -> Result<(), DomainError> {
        let campaigns: Vec<Campaign> = serde_json::from_value(blob)
            .map_err(|e| DomainError::Infrastructure(format!("campaign restore failed: {e}")))?;
        self.campaigns = campaigns.into_iter().map(|c| (c.id, c)).collect();
        info!(campaigns = self.campaigns.len(), "campaigns restored");
        Ok(())
    }
}
