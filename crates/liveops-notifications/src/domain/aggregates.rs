//! Entity roots for the Notification Campaign context.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use liveops_core::aggregate::AggregateRoot;
use liveops_core::error::DomainError;
use liveops_core::ports::RenderedMessage;
use liveops_core::retry::{RetryPolicy, RetryState};
use liveops_core::rng::DeterministicRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::RegisterCampaign;
use super::template::{MessageTemplate, TemplateError};

/// When a campaign fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "schedule", rename_all = "snake_case")]
pub enum Schedule {
    /// Once, on the first pass after registration; then disables itself.
    Immediate,
    /// Once, at registration time plus the delay; then disables itself.
    Delayed {
        /// Delay in seconds.
        delay_secs: u64,
    },
    /// Whenever `period` has passed since the last send.
    Recurring {
        /// Period in seconds.
        period_secs: u64,
    },
}

fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

impl Schedule {
    /// Whether the campaign fires at most once.
    #[must_use]
    pub fn is_one_shot(&self) -> bool {
        !matches!(self, Self::Recurring { .. })
    }
}

/// What a delivery failure led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// Another attempt is scheduled.
    Retrying {
        /// Attempts so far.
        attempts: u32,
    },
    /// Attempts exhausted; this send is dropped.
    Abandoned {
        /// Attempts made.
        attempts: u32,
    },
}

/// The entity root for a notification campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    /// Entity identifier.
    pub id: Uuid,
    /// Current version (lifecycle events emitted).
    pub version: i64,
    /// Display name.
    pub name: String,
    /// When the campaign fires.
    pub schedule: Schedule,
    /// Segment handed to the delivery channel.
    pub target_segment: String,
    /// Message template.
    pub template: MessageTemplate,
    /// Values for the template placeholders.
    pub variables: BTreeMap<String, String>,
    /// Disabled campaigns never fire.
    pub enabled: bool,
    /// When the campaign was registered.
    pub registered_at: DateTime<Utc>,
    /// When the last successful send happened.
    pub last_sent: Option<DateTime<Utc>>,
    /// Successful sends.
    pub sent_count: u64,
    /// Due on the next pass regardless of the schedule.
    pub forced: bool,
    /// Backoff state while a send is being retried.
    pub retry: Option<RetryState>,
    /// When the last send was abandoned.
    pub last_abandoned_at: Option<DateTime<Utc>>,
    /// Failed delivery attempts over the campaign's lifetime.
    pub failure_count: u64,
    /// Most recent delivery error.
    pub last_error: Option<String>,
}

impl Campaign {
    /// Validates a `RegisterCampaign` command and builds the campaign.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for an empty name or
    /// segment, a zero recurring period, or a template that does not render
    /// with the supplied variables.
    pub fn register(
        id: Uuid,
        command: &RegisterCampaign,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if command.name.trim().is_empty() || command.target_segment.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "campaign name and target segment are required".into(),
            ));
        }
        if let Schedule::Recurring { period_secs: 0 } = command.schedule {
            return Err(DomainError::InvariantViolation(format!(
                "campaign {} recurs with a zero period",
                command.name
            )));
        }
        command
            .template
            .render(&command.variables)
            .map_err(|e| DomainError::InvariantViolation(format!("campaign {}: {e}", command.name)))?;

        Ok(Self {
            id,
            version: 0,
            name: command.name.clone(),
            schedule: command.schedule,
            target_segment: command.target_segment.clone(),
            template: command.template.clone(),
            variables: command.variables.clone(),
            enabled: true,
            registered_at: now,
            last_sent: None,
            sent_count: 0,
            forced: false,
            retry: None,
            last_abandoned_at: None,
            failure_count: 0,
            last_error: None,
        })
    }

    /// Whether the campaign should be sent on a pass at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        if self.forced {
            return true;
        }
        if let Some(retry) = &self.retry {
            return retry.is_due(now);
        }
        match self.schedule {
            Schedule::Immediate => self.sent_count == 0,
            Schedule::Delayed { delay_secs } => {
                self.sent_count == 0 && now - self.registered_at >= seconds(delay_secs)
            }
            Schedule::Recurring { period_secs } => {
                match self.last_sent.max(self.last_abandoned_at) {
                    None => true,
                    Some(anchor) => now - anchor >= seconds(period_secs),
                }
            }
        }
    }

    /// Renders the message.
    ///
    /// # Errors
    ///
    /// Returns the template error; registration makes this unreachable
    /// unless the snapshot was edited by hand.
    pub fn render(&self) -> Result<RenderedMessage, TemplateError> {
        self.template.render(&self.variables)
    }

    /// Marks the campaign due on the next pass.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the campaign is disabled.
    pub fn force(&mut self) -> Result<(), DomainError> {
        if !self.enabled {
            return Err(DomainError::InvalidState(format!(
                "campaign {} is disabled",
                self.id
            )));
        }
        self.forced = true;
        Ok(())
    }

    /// Enables or disables the campaign. Disabling drops any pending retry
    /// or forced send.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.forced = false;
            self.retry = None;
        }
    }

    /// Records a successful send. `last_sent` is the actual send time, not
    /// the theoretical due time. Returns the new send count.
    pub fn record_delivered(&mut self, now: DateTime<Utc>) -> u64 {
        self.sent_count += 1;
        self.last_sent = Some(now);
        self.forced = false;
        self.retry = None;
        self.last_error = None;
        if self.schedule.is_one_shot() {
            self.enabled = false;
        }
        self.sent_count
    }

    /// Records a failed send and schedules a retry, or abandons the send once
    /// the policy is exhausted.
    pub fn record_failure(
        &mut self,
        error: &str,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
        rng: &mut dyn DeterministicRng,
    ) -> DeliveryFailure {
        self.failure_count += 1;
        self.last_error = Some(error.to_owned());
        self.forced = false;
        let mut retry = self.retry.unwrap_or_else(|| RetryState::fresh(now));
        if retry.record_failure(policy, now, rng) {
            self.retry = Some(retry);
            return DeliveryFailure::Retrying {
                attempts: retry.attempts,
            };
        }
        self.retry = None;
        self.last_abandoned_at = Some(now);
        if self.schedule.is_one_shot() {
            self.enabled = false;
        }
        DeliveryFailure::Abandoned {
            attempts: retry.attempts,
        }
    }

    /// Records a message that does not render. The campaign is disabled
    /// until a host fixes it.
    pub fn record_render_failure(&mut self, error: &str, now: DateTime<Utc>) {
        self.failure_count += 1;
        self.last_error = Some(error.to_owned());
        self.last_abandoned_at = Some(now);
        self.set_enabled(false);
    }
}

impl AggregateRoot for Campaign {
    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn next_version(&mut self) -> i64 {
        self.version += 1;
        self.version
    }
}
