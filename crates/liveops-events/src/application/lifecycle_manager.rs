//! The Event Lifecycle Manager.
//!
//! Owns every live event. Synchronous commands validate at the boundary and
//! mutate the store directly; `tick` activates, settles rewards, completes and
//! evicts. Reward grants run as independent tasks with a per-call timeout and
//! are joined before the pass returns.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use liveops_core::aggregate::AggregateRoot;
use liveops_core::error::DomainError;
use liveops_core::event::{EventMetadata, Outbox};
use liveops_core::external::{ExternalCallError, with_timeout};
use liveops_core::ports::{GrantKey, RewardGrantService, SegmentResolver};
use liveops_core::retry::RetryPolicy;
use liveops_core::rng::DeterministicRng;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::aggregates::{
    CompletionPolicy, CompletionReason, EventStatus, GrantFailureOutcome, LiveEvent,
    ProgressOutcome,
};
use crate::domain::commands::{CancelEvent, JoinEvent, RecordProgress, ScheduleEvent};
use crate::domain::events::{
    EventCancelled, EventCompleted, EventScheduled, LiveEventEvent, LiveEventEventKind,
    ObjectiveCompleted, PlayerTransition, RewardSettlement,
};

/// Tunables for the lifecycle manager.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleSettings {
    /// Backoff for failed reward grants.
    pub retry_policy: RetryPolicy,
    /// Timeout applied to each reward grant call.
    pub call_timeout: Duration,
    /// How long terminal events are kept before eviction.
    pub retention: chrono::Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            call_timeout: Duration::from_secs(5),
            retention: chrono::Duration::days(7),
        }
    }
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventTickSummary {
    /// Events whose window opened.
    pub activated: usize,
    /// Reward grants attempted.
    pub grants_attempted: usize,
    /// Events that completed.
    pub completed: usize,
    /// Events evicted after their retention window.
    pub archived: usize,
}

/// Advances live events through their lifecycle.
pub struct LifecycleManager {
    events: BTreeMap<Uuid, LiveEvent>,
    outbox: Outbox<LiveEventEvent>,
    rewards: Arc<dyn RewardGrantService>,
    segments: Arc<dyn SegmentResolver>,
    settings: LifecycleSettings,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("events", &self.events.len())
            .field("pending_events", &self.outbox.pending().len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn emit(
    outbox: &mut Outbox<LiveEventEvent>,
    event: &mut LiveEvent,
    kind: LiveEventEventKind,
    correlation_id: Uuid,
    now: DateTime<Utc>,
) {
    let sequence = event.next_version();
    outbox.push(LiveEventEvent {
        metadata: EventMetadata::new(kind.event_type(), event.id, sequence, correlation_id, now),
        kind,
    });
}

impl LifecycleManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new(
        rewards: Arc<dyn RewardGrantService>,
        segments: Arc<dyn SegmentResolver>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            events: BTreeMap::new(),
            outbox: Outbox::new(),
            rewards,
            segments,
            settings,
        }
    }

    /// Schedules a new event and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` if the command is malformed
    /// or names a segment the resolver does not know.
    pub fn schedule(
        &mut self,
        command: &ScheduleEvent,
        now: DateTime<Utc>,
    ) -> Result<Uuid, DomainError> {
        if let Some(segment) = &command.target_segment
            && self.segments.resolve(segment).is_none()
        {
            return Err(DomainError::InvariantViolation(format!(
                "unknown target segment `{segment}`"
            )));
        }
        let mut event = LiveEvent::schedule(Uuid::new_v4(), command)?;
        let id = event.id;
        let scheduled = LiveEventEventKind::EventScheduled(EventScheduled {
            name: event.name.clone(),
            starts_at: event.starts_at,
            ends_at: event.ends_at,
        });
        emit(&mut self.outbox, &mut event, scheduled, command.correlation_id, now);
        info!(event_id = %id, name = %event.name, starts_at = %event.starts_at, "live event scheduled");
        self.events.insert(id, event);
        Ok(id)
    }

    /// Enrols a player. Returns whether the player was newly added.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown event,
    /// `DomainError::InvalidState` if the event is terminal or its segment no
    /// longer resolves, and `DomainError::InvariantViolation` if the player
    /// is outside the target segment.
    pub fn join(&mut self, command: &JoinEvent, now: DateTime<Utc>) -> Result<bool, DomainError> {
        let event = self
            .events
            .get_mut(&command.event_id)
            .ok_or(DomainError::NotFound(command.event_id))?;
        if event.status.is_terminal() {
            return Err(DomainError::InvalidState(format!(
                "event {} is {}",
                event.id,
                event.status.as_str()
            )));
        }
        if let Some(segment) = &event.target_segment {
            let predicate = self.segments.resolve(segment).ok_or_else(|| {
                DomainError::InvalidState(format!("segment `{segment}` no longer resolves"))
            })?;
            if !predicate(&command.profile) {
                return Err(DomainError::InvariantViolation(format!(
                    "player {} is not in segment `{segment}`",
                    command.profile.player_id
                )));
            }
        }
        let player_id = command.profile.player_id.clone();
        let joined = event.enrol(&player_id, now);
        if joined {
            emit(
                &mut self.outbox,
                event,
                LiveEventEventKind::PlayerJoined(PlayerTransition { player_id }),
                command.correlation_id,
                now,
            );
        }
        Ok(joined)
    }

    /// Records progress for a player.
    ///
    /// Players are enrolled on first progress unless the event is segmented,
    /// in which case they must have joined. Finishing every objective queues
    /// the player's rewards for settlement on the next pass.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown event,
    /// `DomainError::InvalidState` if the event is not accepting progress or
    /// the player has not joined a segmented event, and
    /// `DomainError::InvariantViolation` for a zero delta or unknown counter.
    pub fn record_progress(
        &mut self,
        command: &RecordProgress,
        now: DateTime<Utc>,
    ) -> Result<ProgressOutcome, DomainError> {
        let event = self
            .events
            .get_mut(&command.event_id)
            .ok_or(DomainError::NotFound(command.event_id))?;
        if event.status != EventStatus::Active || !event.window_contains(now) {
            return Err(DomainError::InvalidState(format!(
                "event {} is {} and not accepting progress at {now}",
                event.id,
                event.status.as_str()
            )));
        }
        if !event.participants.contains_key(&command.player_id) {
            if event.target_segment.is_some() {
                return Err(DomainError::InvalidState(format!(
                    "player {} must join segmented event {} first",
                    command.player_id, event.id
                )));
            }
            let tracked = event
                .objectives
                .iter()
                .any(|o| o.requirements.contains_key(&command.objective_key));
            if command.delta > 0 && tracked && event.enrol(&command.player_id, now) {
                emit(
                    &mut self.outbox,
                    event,
                    LiveEventEventKind::PlayerJoined(PlayerTransition {
                        player_id: command.player_id.clone(),
                    }),
                    command.correlation_id,
                    now,
                );
            }
        }

        let outcome =
            event.apply_progress(&command.player_id, &command.objective_key, command.delta, now)?;

        for objective_id in &outcome.completed_objectives {
            emit(
                &mut self.outbox,
                event,
                LiveEventEventKind::ObjectiveCompleted(ObjectiveCompleted {
                    player_id: command.player_id.clone(),
                    objective_id: objective_id.clone(),
                }),
                command.correlation_id,
                now,
            );
        }
        if outcome.finished {
            emit(
                &mut self.outbox,
                event,
                LiveEventEventKind::PlayerFinished(PlayerTransition {
                    player_id: command.player_id.clone(),
                }),
                command.correlation_id,
                now,
            );
            let queued = event.queue_rewards_for(&command.player_id, now);
            info!(
                event_id = %event.id,
                player_id = %command.player_id,
                queued,
                "player finished live event"
            );
        }
        Ok(outcome)
    }

    /// Cancels a scheduled or active event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown event and
    /// `DomainError::InvalidState` if it is already terminal.
    pub fn cancel(&mut self, command: &CancelEvent, now: DateTime<Utc>) -> Result<(), DomainError> {
        let event = self
            .events
            .get_mut(&command.event_id)
            .ok_or(DomainError::NotFound(command.event_id))?;
        event.cancel(now)?;
        emit(
            &mut self.outbox,
            event,
            LiveEventEventKind::EventCancelled(EventCancelled {
                reason: command.reason.clone(),
            }),
            command.correlation_id,
            now,
        );
        info!(event_id = %event.id, reason = %command.reason, "live event cancelled");
        Ok(())
    }

    /// Runs one reconciliation pass over every event.
    pub async fn tick(
        &mut self,
        now: DateTime<Utc>,
        correlation_id: Uuid,
        rng: &mut dyn DeterministicRng,
    ) -> EventTickSummary {
        let mut summary = EventTickSummary {
            activated: self.activate_due(now, correlation_id),
            ..EventTickSummary::default()
        };
        summary.grants_attempted = self.settle_rewards(now, correlation_id, rng).await;
        summary.completed = self.complete_due(now, correlation_id);
        summary.archived = self.evict_expired(now, correlation_id);
        debug!(?summary, "event lifecycle pass finished");
        summary
    }

    fn activate_due(&mut self, now: DateTime<Utc>, correlation_id: Uuid) -> usize {
        let mut activated = 0;
        for event in self.events.values_mut() {
            if event.status != EventStatus::Scheduled || now < event.starts_at {
                continue;
            }
            if event.activate(now).is_ok() {
                emit(
                    &mut self.outbox,
                    event,
                    LiveEventEventKind::EventActivated,
                    correlation_id,
                    now,
                );
                info!(event_id = %event.id, "live event activated");
                activated += 1;
            }
        }
        activated
    }

    async fn settle_rewards(
        &mut self,
        now: DateTime<Utc>,
        correlation_id: Uuid,
        rng: &mut dyn DeterministicRng,
    ) -> usize {
        let mut tasks = JoinSet::new();
        for event in self.events.values() {
            for due in event.due_grants(now) {
                let rewards = Arc::clone(&self.rewards);
                let timeout = self.settings.call_timeout;
                tasks.spawn(async move {
                    let result =
                        with_timeout(timeout, rewards.grant(&due.key, &due.reward)).await;
                    (due.key, result)
                });
            }
        }
        let attempted = tasks.len();

        let mut results: Vec<(GrantKey, Result<(), ExternalCallError>)> =
            Vec::with_capacity(attempted);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "reward grant task did not complete"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, result) in results {
            let Some(event) = self.events.get_mut(&key.event_id) else {
                continue;
            };
            match result {
                Ok(()) => {
                    let Some(attempts) = event.record_grant_success(&key.player_id, &key.reward_id)
                    else {
                        continue;
                    };
                    info!(grant = %key, attempts, "reward granted");
                    emit(
                        &mut self.outbox,
                        event,
                        LiveEventEventKind::RewardGranted(RewardSettlement {
                            player_id: key.player_id,
                            reward_id: key.reward_id,
                            attempts,
                            error: None,
                        }),
                        correlation_id,
                        now,
                    );
                }
                Err(e) => {
                    let error = e.to_string();
                    let Some(outcome) = event.record_grant_failure(
                        &key.player_id,
                        &key.reward_id,
                        &error,
                        &self.settings.retry_policy,
                        now,
                        rng,
                    ) else {
                        continue;
                    };
                    let kind = match outcome {
                        GrantFailureOutcome::Retrying { attempts } => {
                            warn!(grant = %key, attempts, error = %error, "reward grant failed, will retry");
                            LiveEventEventKind::RewardGrantFailed(RewardSettlement {
                                player_id: key.player_id,
                                reward_id: key.reward_id,
                                attempts,
                                error: Some(error),
                            })
                        }
                        GrantFailureOutcome::Abandoned { attempts } => {
                            warn!(grant = %key, attempts, error = %error, "reward grant abandoned");
                            LiveEventEventKind::RewardGrantAbandoned(RewardSettlement {
                                player_id: key.player_id,
                                reward_id: key.reward_id,
                                attempts,
                                error: Some(error),
                            })
                        }
                    };
                    emit(&mut self.outbox, event, kind, correlation_id, now);
                }
            }
        }
        attempted
    }

    fn complete_due(&mut self, now: DateTime<Utc>, correlation_id: Uuid) -> usize {
        let mut completed = 0;
        for event in self.events.values_mut() {
            if event.status != EventStatus::Active {
                continue;
            }
            let reason = if now >= event.ends_at {
                CompletionReason::WindowElapsed
            } else if event.completion_policy == CompletionPolicy::FirstFinisher
                && event.has_settled_finisher()
            {
                CompletionReason::ObjectivesComplete
            } else {
                continue;
            };
            if event.complete(reason, now).is_ok() {
                emit(
                    &mut self.outbox,
                    event,
                    LiveEventEventKind::EventCompleted(EventCompleted { reason }),
                    correlation_id,
                    now,
                );
                info!(event_id = %event.id, ?reason, "live event completed");
                completed += 1;
            }
        }
        completed
    }

    fn evict_expired(&mut self, now: DateTime<Utc>, correlation_id: Uuid) -> usize {
        let retention = self.settings.retention;
        let expired: Vec<Uuid> = self
            .events
            .values()
            .filter(|e| !e.has_pending_grants())
            .filter(|e| e.terminal_since().is_some_and(|since| since + retention <= now))
            .map(|e| e.id)
            .collect();
        for id in &expired {
            if let Some(mut event) = self.events.remove(id) {
                emit(
                    &mut self.outbox,
                    &mut event,
                    LiveEventEventKind::EventArchived,
                    correlation_id,
                    now,
                );
                info!(event_id = %id, "live event archived");
            }
        }
        expired.len()
    }

    /// Copies of every active event.
    #[must_use]
    pub fn get_active(&self) -> Vec<LiveEvent> {
        self.events
            .values()
            .filter(|e| e.status == EventStatus::Active)
            .cloned()
            .collect()
    }

    /// A copy of one event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` if the event does not exist.
    pub fn get(&self, event_id: Uuid) -> Result<LiveEvent, DomainError> {
        self.events
            .get(&event_id)
            .cloned()
            .ok_or(DomainError::NotFound(event_id))
    }

    /// Borrows one event for read-only inspection.
    #[must_use]
    pub fn peek(&self, event_id: Uuid) -> Option<&LiveEvent> {
        self.events.get(&event_id)
    }

    /// Number of events with the given status.
    #[must_use]
    pub fn count_with_status(&self, status: EventStatus) -> usize {
        self.events.values().filter(|e| e.status == status).count()
    }

    /// Removes and returns buffered lifecycle events, oldest first.
    pub fn drain_events(&mut self) -> Vec<LiveEventEvent> {
        self.outbox.drain()
    }

    /// Serializes every event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if serialization fails.
    pub fn snapshot(&self) -> Result<serde_json::Value, DomainError> {
        let events: Vec<&LiveEvent> = self.events.values().collect();
        serde_json::to_value(events)
            .map_err(|e| DomainError::Infrastructure(format!("event snapshot failed: {e}")))
    }

    /// Replaces the store with a snapshot taken by [`Self::snapshot`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the blob cannot be decoded.
    pub fn restore(&mut self, blob: serde_json::Value) -> Result<(), DomainError> {
        let events: Vec<LiveEvent> = serde_json::from_value(blob)
            .map_err(|e| DomainError::Infrastructure(format!("event restore failed: {e}")))?;
        self.events = events.into_iter().map(|e| (e.id, e)).collect();
        info!(events = self.events.len(), "live events restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use liveops_core::ports::{PlayerProfile, RewardKind, RewardSpec};
    use liveops_test_support::{
        FailingRewardService, MockRng, RecordingRewardService, StallingRewardService,
        StaticSegmentResolver, fixed_now,
    };

    use super::*;
    use crate::domain::aggregates::{EventType, Objective};

    fn settings() -> LifecycleSettings {
        LifecycleSettings {
            retry_policy: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 1_000,
                max_delay_ms: 10_000,
                jitter_ms: 0,
            },
            call_timeout: Duration::from_millis(200),
            retention: ChronoDuration::hours(1),
        }
    }

    fn manager(rewards: Arc<dyn RewardGrantService>) -> LifecycleManager {
        let segments = StaticSegmentResolver::new().with_segment("whales", "spend_tier", "high");
        LifecycleManager::new(rewards, Arc::new(segments), settings())
    }

    fn schedule_command(target_segment: Option<&str>) -> ScheduleEvent {
        ScheduleEvent {
            correlation_id: Uuid::new_v4(),
            name: "Level Rush".into(),
            event_type: EventType::LimitedTime,
            starts_at: fixed_now(),
            ends_at: fixed_now() + ChronoDuration::days(2),
            objectives: vec![Objective::new("levels", "Clear five levels").requires("levels_completed", 5)],
            rewards: vec![RewardSpec {
                reward_id: "gems".into(),
                kind: RewardKind::Currency {
                    currency: "gems".into(),
                    amount: 50,
                },
            }],
            target_segment: target_segment.map(str::to_owned),
            completion_policy: CompletionPolicy::FirstFinisher,
        }
    }

    fn progress(event_id: Uuid, player_id: &str, delta: u64) -> RecordProgress {
        RecordProgress {
            correlation_id: Uuid::new_v4(),
            event_id,
            player_id: player_id.into(),
            objective_key: "levels_completed".into(),
            delta,
        }
    }

    async fn scheduled_and_active(mgr: &mut LifecycleManager) -> Uuid {
        let id = mgr.schedule(&schedule_command(None), fixed_now()).unwrap();
        mgr.tick(fixed_now(), Uuid::new_v4(), &mut MockRng).await;
        id
    }

    #[tokio::test]
    async fn test_tick_activates_event_at_start() {
        // Arrange
        let mut mgr = manager(Arc::new(RecordingRewardService::new()));
        let id = mgr.schedule(&schedule_command(None), fixed_now()).unwrap();

        // Act
        let before = mgr
            .tick(fixed_now() - ChronoDuration::seconds(1), Uuid::new_v4(), &mut MockRng)
            .await;
        let at_start = mgr.tick(fixed_now(), Uuid::new_v4(), &mut MockRng).await;

        // Assert
        assert_eq!(before.activated, 0);
        assert_eq!(at_start.activated, 1);
        assert_eq!(mgr.get(id).unwrap().status, EventStatus::Active);
        assert_eq!(mgr.get_active().len(), 1);
    }

    #[tokio::test]
    async fn test_five_progress_updates_complete_event_and_grant_once() {
        // Arrange
        let rewards = Arc::new(RecordingRewardService::new());
        let mut mgr = manager(rewards.clone());
        let id = scheduled_and_active(&mut mgr).await;

        // Act
        for _ in 0..5 {
            mgr.record_progress(&progress(id, "p1", 1), fixed_now()).unwrap();
        }
        mgr.tick(fixed_now(), Uuid::new_v4(), &mut MockRng).await;
        mgr.tick(fixed_now(), Uuid::new_v4(), &mut MockRng).await;

        // Assert
        let event = mgr.get(id).unwrap();
        assert_eq!(event.status, EventStatus::Completed);
        assert_eq!(event.completion_reason, Some(CompletionReason::ObjectivesComplete));
        assert_eq!(rewards.granted().len(), 1);
        assert_eq!(rewards.granted()[0].player_id, "p1");
    }

    #[tokio::test]
    async fn test_replayed_final_update_does_not_grant_twice() {
        // Arrange
        let rewards = Arc::new(RecordingRewardService::new());
        let mut mgr = manager(rewards.clone());
        let mut cmd = schedule_command(None);
        cmd.completion_policy = CompletionPolicy::EndOfWindow;
        let id = mgr.schedule(&cmd, fixed_now()).unwrap();
        mgr.tick(fixed_now(), Uuid::new_v4(), &mut MockRng).await;
        mgr.record_progress(&progress(id, "p1", 5), fixed_now()).unwrap();
        mgr.tick(fixed_now(), Uuid::new_v4(), &mut MockRng).await;

        // Act
        let replay = mgr.record_progress(&progress(id, "p1", 1), fixed_now()).unwrap();
        mgr.tick(fixed_now(), Uuid::new_v4(), &mut MockRng).await;

        // Assert
        assert!(!replay.finished);
        assert_eq!(rewards.calls().len(), 1);
        assert_eq!(mgr.get(id).unwrap().status, EventStatus::Active);
    }

    #[tokio::test]
    async fn test_grant_failure_keeps_event_active_and_retries() {
        // Arrange
        let rewards = Arc::new(RecordingRewardService::failing_first(1));
        let mut mgr = manager(rewards.clone());
        let id = scheduled_and_active(&mut mgr).await;
        mgr.record_progress(&progress(id, "p1", 5), fixed_now()).unwrap();

        // Act
        mgr.tick(fixed_now(), Uuid::new_v4(), &mut MockRng).await;
        let after_failure = mgr.get(id).unwrap();
        let too_early = mgr
            .tick(fixed_now() + ChronoDuration::milliseconds(500), Uuid::new_v4(), &mut MockRng)
            .await;
        mgr.tick(fixed_now() + ChronoDuration::seconds(1), Uuid::new_v4(), &mut MockRng)
            .await;

        // Assert
        assert_eq!(after_failure.status, EventStatus::Active);
        assert_eq!(after_failure.settlement.pending.len(), 1);
        assert_eq!(too_early.grants_attempted, 0);
        assert_eq!(rewards.calls().len(), 2);
        assert_eq!(rewards.granted().len(), 1);
        assert_eq!(mgr.get(id).unwrap().status, EventStatus::Completed);
        let settlement: Vec<String> = mgr
            .drain_events()
            .into_iter()
            .map(|e| e.metadata.event_type)
            .filter(|t| t.starts_with("events.reward_"))
            .collect();
        assert_eq!(
            settlement,
            vec!["events.reward_grant_failed", "events.reward_granted"]
        );
    }

    #[tokio::test]
    async fn test_exhausted_grant_is_abandoned_and_event_completes() {
        // Arrange
        let mut mgr = manager(Arc::new(FailingRewardService));
        let id = scheduled_and_active(&mut mgr).await;
        mgr.record_progress(&progress(id, "p1", 5), fixed_now()).unwrap();

        // Act
        for seconds in [0, 1, 3] {
            mgr.tick(fixed_now() + ChronoDuration::seconds(seconds), Uuid::new_v4(), &mut MockRng)
                .await;
        }

        // Assert
        let event = mgr.get(id).unwrap();
        assert_eq!(event.settlement.abandoned.len(), 1);
        assert_eq!(event.status, EventStatus::Completed);
        assert!(
            mgr.drain_events()
                .iter()
                .any(|e| e.metadata.event_type == "events.reward_grant_abandoned")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_grant_times_out_as_retryable_failure() {
        // Arrange
        let mut mgr = manager(Arc::new(StallingRewardService));
        let id = scheduled_and_active(&mut mgr).await;
        mgr.record_progress(&progress(id, "p1", 5), fixed_now()).unwrap();

        // Act
        let summary = mgr.tick(fixed_now(), Uuid::new_v4(), &mut MockRng).await;

        // Assert
        let event = mgr.get(id).unwrap();
        assert_eq!(summary.grants_attempted, 1);
        assert_eq!(event.status, EventStatus::Active);
        let pending = &event.settlement.pending[0];
        assert_eq!(pending.retry.attempts, 1);
        assert!(pending.last_error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_window_end_completes_event() {
        // Arrange
        let mut mgr = manager(Arc::new(RecordingRewardService::new()));
        let id = scheduled_and_active(&mut mgr).await;

        // Act
        mgr.tick(fixed_now() + ChronoDuration::days(2), Uuid::new_v4(), &mut MockRng)
            .await;

        // Assert
        let event = mgr.get(id).unwrap();
        assert_eq!(event.status, EventStatus::Completed);
        assert_eq!(event.completion_reason, Some(CompletionReason::WindowElapsed));
        assert!(mgr.get_active().is_empty());
    }

    #[tokio::test]
    async fn test_segmented_event_requires_matching_profile() {
        // Arrange
        let mut mgr = manager(Arc::new(RecordingRewardService::new()));
        let id = mgr
            .schedule(&schedule_command(Some("whales")), fixed_now())
            .unwrap();
        mgr.tick(fixed_now(), Uuid::new_v4(), &mut MockRng).await;
        let join = |player: &str, tier: &str| JoinEvent {
            correlation_id: Uuid::new_v4(),
            event_id: id,
            profile: PlayerProfile::new(player).with_attribute("spend_tier", tier),
        };

        // Act
        let rejected = mgr.join(&join("minnow", "low"), fixed_now());
        let accepted = mgr.join(&join("whale", "high"), fixed_now());
        let unjoined = mgr.record_progress(&progress(id, "minnow", 1), fixed_now());

        // Assert
        assert!(matches!(rejected, Err(DomainError::InvariantViolation(_))));
        assert!(accepted.unwrap());
        assert!(matches!(unjoined, Err(DomainError::InvalidState(_))));
        assert!(mgr.record_progress(&progress(id, "whale", 1), fixed_now()).is_ok());
    }

    #[test]
    fn test_schedule_with_unknown_segment_returns_error() {
        let mut mgr = manager(Arc::new(RecordingRewardService::new()));

        let result = mgr.schedule(&schedule_command(Some("nobody")), fixed_now());

        assert!(matches!(result, Err(DomainError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn test_cancelled_event_is_archived_after_retention() {
        // Arrange
        let mut mgr = manager(Arc::new(RecordingRewardService::new()));
        let id = scheduled_and_active(&mut mgr).await;
        mgr.cancel(
            &CancelEvent {
                correlation_id: Uuid::new_v4(),
                event_id: id,
                reason: "bad balance".into(),
            },
            fixed_now(),
        )
        .unwrap();

        // Act
        let early = mgr
            .tick(fixed_now() + ChronoDuration::minutes(30), Uuid::new_v4(), &mut MockRng)
            .await;
        let late = mgr
            .tick(fixed_now() + ChronoDuration::hours(1), Uuid::new_v4(), &mut MockRng)
            .await;

        // Assert
        assert_eq!(early.archived, 0);
        assert_eq!(late.archived, 1);
        assert!(matches!(mgr.get(id), Err(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_events_carry_increasing_sequence_numbers() {
        // Arrange
        let mut mgr = manager(Arc::new(RecordingRewardService::new()));
        let correlation_id = Uuid::new_v4();
        let mut cmd = schedule_command(None);
        cmd.correlation_id = correlation_id;

        // Act
        let id = mgr.schedule(&cmd, fixed_now()).unwrap();
        mgr.tick(fixed_now(), Uuid::new_v4(), &mut MockRng).await;
        let events = mgr.drain_events();

        // Assert
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].metadata.event_type, "events.scheduled");
        assert_eq!(events[0].metadata.correlation_id, correlation_id);
        assert_eq!(events[0].metadata.aggregate_id, id);
        assert_eq!(events[0].metadata.sequence_number, 1);
        assert_eq!(events[1].metadata.event_type, "events.activated");
        assert_eq!(events[1].metadata.sequence_number, 2);
        assert!(mgr.drain_events().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_restore_preserves_progress() {
        // Arrange
        let mut mgr = manager(Arc::new(RecordingRewardService::new()));
        let id = scheduled_and_active(&mut mgr).await;
        mgr.record_progress(&progress(id, "p1", 3), fixed_now()).unwrap();
        let blob = mgr.snapshot().unwrap();

        // Act
        let mut restored = manager(Arc::new(RecordingRewardService::new()));
        restored.restore(blob).unwrap();

        // Assert
        let event = restored.get(id).unwrap();
        assert_eq!(
            event.participants["p1"].objectives["levels"].counters["levels_completed"],
            3
        );
        assert_eq!(event.status, EventStatus::Active);
    }
}
