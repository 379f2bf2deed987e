//! Entity roots for the Event Lifecycle context.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use liveops_core::aggregate::AggregateRoot;
use liveops_core::error::DomainError;
use liveops_core::ports::{GrantKey, RewardSpec};
use liveops_core::retry::{RetryPolicy, RetryState};
use liveops_core::rng::DeterministicRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::ScheduleEvent;

/// Event category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Resets every day.
    Daily,
    /// Resets every week.
    Weekly,
    /// Tied to a season.
    Seasonal,
    /// Competitive event.
    Tournament,
    /// Short flash event.
    LimitedTime,
    /// Anything else, named by the operator.
    Custom(String),
}

/// Lifecycle status of a live event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Waiting for its window to open.
    Scheduled,
    /// Window open, accepting progress.
    Active,
    /// Finished (terminal).
    Completed,
    /// Cancelled by an operator (terminal).
    Cancelled,
}

impl EventStatus {
    /// Lower-case name, as exposed to rule conditions.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// When an event as a whole completes before its window ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// Completes as soon as one participant has finished every objective and
    /// that participant's rewards are settled.
    #[default]
    FirstFinisher,
    /// Runs until the window ends; finishers are rewarded as they finish.
    EndOfWindow,
}

/// Why an event completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// A participant finished every objective.
    ObjectivesComplete,
    /// The window ended.
    WindowElapsed,
}

/// An objective: one or more counters that must each reach a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    /// Identifier unique within the event.
    pub id: String,
    /// Player-facing description.
    #[serde(default)]
    pub description: String,
    /// Counter name to target value. All must be met.
    pub requirements: BTreeMap<String, u64>,
}

impl Objective {
    /// Creates an objective with no requirements yet.
    #[must_use]
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            requirements: BTreeMap::new(),
        }
    }

    /// Adds a counter requirement.
    #[must_use]
    pub fn requires(mut self, counter: impl Into<String>, target: u64) -> Self {
        self.requirements.insert(counter.into(), target);
        self
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.id.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "objective id must not be empty".into(),
            ));
        }
        if self.requirements.is_empty() {
            return Err(DomainError::InvariantViolation(format!(
                "objective {} has no requirements",
                self.id
            )));
        }
        if let Some((counter, _)) = self.requirements.iter().find(|(_, target)| **target == 0) {
            return Err(DomainError::InvariantViolation(format!(
                "objective {} requires `{counter}` with a zero target",
                self.id
            )));
        }
        Ok(())
    }
}

/// A player's progress on one objective.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveProgress {
    /// Current counter values, clamped to their targets.
    pub counters: BTreeMap<String, u64>,
    /// When every requirement was met.
    pub completed_at: Option<DateTime<Utc>>,
}

/// A player taking part in an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// The player.
    pub player_id: String,
    /// When the player joined.
    pub joined_at: DateTime<Utc>,
    /// Progress keyed by objective id.
    pub objectives: BTreeMap<String, ObjectiveProgress>,
    /// When the player completed every objective.
    pub finished_at: Option<DateTime<Utc>>,
}

/// A reward grant that has not succeeded yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingGrant {
    /// The player owed the reward.
    pub player_id: String,
    /// The reward owed.
    pub reward_id: String,
    /// Retry bookkeeping.
    pub retry: RetryState,
    /// Last failure, if any.
    pub last_error: Option<String>,
}

/// Reward settlement ledger for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// `(player, reward)` pairs already granted. Never granted twice.
    pub claimed: BTreeSet<(String, String)>,
    /// Grants waiting for their next attempt.
    pub pending: Vec<PendingGrant>,
    /// Grants that exhausted their retries.
    pub abandoned: Vec<PendingGrant>,
}

impl Settlement {
    fn is_tracked(&self, player_id: &str, reward_id: &str) -> bool {
        let matches = |g: &PendingGrant| g.player_id == player_id && g.reward_id == reward_id;
        self.claimed
            .contains(&(player_id.to_owned(), reward_id.to_owned()))
            || self.pending.iter().any(matches)
            || self.abandoned.iter().any(matches)
    }

    fn has_pending_for(&self, player_id: &str) -> bool {
        self.pending.iter().any(|g| g.player_id == player_id)
    }
}

/// Counters kept per event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetrics {
    /// Players who joined.
    pub participants: u64,
    /// Accepted progress updates.
    pub progress_updates: u64,
    /// Players who finished every objective.
    pub finishers: u64,
    /// Successful reward grants.
    pub rewards_granted: u64,
    /// Failed grant attempts.
    pub grant_failures: u64,
    /// Grants abandoned after exhausting retries.
    pub grants_abandoned: u64,
}

/// What a progress update changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressOutcome {
    /// Objectives completed by this update, in declaration order.
    pub completed_objectives: Vec<String>,
    /// Whether this update finished the player's last objective.
    pub finished: bool,
}

/// Result of recording a failed grant attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantFailureOutcome {
    /// The grant will be retried.
    Retrying {
        /// Attempts made so far.
        attempts: u32,
    },
    /// The grant exhausted its retries.
    Abandoned {
        /// Attempts made.
        attempts: u32,
    },
}

/// A grant due for an attempt.
#[derive(Debug, Clone)]
pub struct DueGrant {
    /// Idempotency key.
    pub key: GrantKey,
    /// What to grant.
    pub reward: RewardSpec,
}

/// The entity root for a live event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveEvent {
    /// Entity identifier.
    pub id: Uuid,
    /// Current version (lifecycle events emitted).
    pub version: i64,
    /// Display name.
    pub name: String,
    /// Event category.
    pub event_type: EventType,
    /// Lifecycle status.
    pub status: EventStatus,
    /// Inclusive start of the window.
    pub starts_at: DateTime<Utc>,
    /// Exclusive end of the window.
    pub ends_at: DateTime<Utc>,
    /// Objectives, in order.
    pub objectives: Vec<Objective>,
    /// Rewards for finishers.
    pub rewards: Vec<RewardSpec>,
    /// Segment restricting participation.
    pub target_segment: Option<String>,
    /// Completion policy.
    pub completion_policy: CompletionPolicy,
    /// Participants keyed by player id.
    pub participants: BTreeMap<String, Participant>,
    /// Reward settlement ledger.
    pub settlement: Settlement,
    /// Per-event counters.
    pub metrics: EventMetrics,
    /// When the window opened.
    pub activated_at: Option<DateTime<Utc>>,
    /// When the event completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Why the event completed.
    pub completion_reason: Option<CompletionReason>,
    /// When the event was cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl LiveEvent {
    /// Validates a `ScheduleEvent` command and builds the scheduled event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` if the window is empty, an
    /// objective or reward is malformed, or identifiers repeat.
    pub fn schedule(id: Uuid, command: &ScheduleEvent) -> Result<Self, DomainError> {
        if command.name.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "event name must not be empty".into(),
            ));
        }
        if command.ends_at <= command.starts_at {
            return Err(DomainError::InvariantViolation(format!(
                "event {} ends at {} which is not after its start {}",
                command.name, command.ends_at, command.starts_at
            )));
        }
        if command.objectives.is_empty() {
            return Err(DomainError::InvariantViolation(format!(
                "event {} has no objectives",
                command.name
            )));
        }
        let mut objective_ids = BTreeSet::new();
        for objective in &command.objectives {
            objective.validate()?;
            if !objective_ids.insert(objective.id.as_str()) {
                return Err(DomainError::InvariantViolation(format!(
                    "duplicate objective id {}",
                    objective.id
                )));
            }
        }
        let mut reward_ids = BTreeSet::new();
        for reward in &command.rewards {
            reward.validate()?;
            if !reward_ids.insert(reward.reward_id.as_str()) {
                return Err(DomainError::InvariantViolation(format!(
                    "duplicate reward id {}",
                    reward.reward_id
                )));
            }
        }

        Ok(Self {
            id,
            version: 0,
            name: command.name.clone(),
            event_type: command.event_type.clone(),
            status: EventStatus::Scheduled,
            starts_at: command.starts_at,
            ends_at: command.ends_at,
            objectives: command.objectives.clone(),
            rewards: command.rewards.clone(),
            target_segment: command.target_segment.clone(),
            completion_policy: command.completion_policy,
            participants: BTreeMap::new(),
            settlement: Settlement::default(),
            metrics: EventMetrics::default(),
            activated_at: None,
            completed_at: None,
            completion_reason: None,
            cancelled_at: None,
        })
    }

    /// Whether `now` falls inside the window `[starts_at, ends_at)`.
    #[must_use]
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        now >= self.starts_at && now < self.ends_at
    }

    /// Opens the window.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` unless the event is `Scheduled`
    /// and `now` has reached its start.
    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status != EventStatus::Scheduled || now < self.starts_at {
            return Err(DomainError::InvalidState(format!(
                "event {} cannot activate from {} at {now}",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = EventStatus::Active;
        self.activated_at = Some(now);
        Ok(())
    }

    /// Adds a participant if not already present. Returns whether the player
    /// was newly added.
    pub fn enrol(&mut self, player_id: &str, now: DateTime<Utc>) -> bool {
        if self.participants.contains_key(player_id) {
            return false;
        }
        self.participants.insert(
            player_id.to_owned(),
            Participant {
                player_id: player_id.to_owned(),
                joined_at: now,
                objectives: BTreeMap::new(),
                finished_at: None,
            },
        );
        self.metrics.participants += 1;
        true
    }

    /// Applies a progress delta to every objective that tracks `counter`.
    ///
    /// Counters clamp at their targets. All objectives completed by this
    /// update are marked before the player's overall completion is checked.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the event is not accepting
    /// progress or the player has not joined, and
    /// `DomainError::InvariantViolation` for a zero delta or an unknown
    /// counter.
    pub fn apply_progress(
        &mut self,
        player_id: &str,
        counter: &str,
        delta: u64,
        now: DateTime<Utc>,
    ) -> Result<ProgressOutcome, DomainError> {
        if self.status != EventStatus::Active || !self.window_contains(now) {
            return Err(DomainError::InvalidState(format!(
                "event {} is {} and not accepting progress at {now}",
                self.id,
                self.status.as_str()
            )));
        }
        if delta == 0 {
            return Err(DomainError::InvariantViolation(
                "progress delta must be positive".into(),
            ));
        }
        if !self
            .objectives
            .iter()
            .any(|o| o.requirements.contains_key(counter))
        {
            return Err(DomainError::InvariantViolation(format!(
                "event {} has no objective tracking `{counter}`",
                self.id
            )));
        }
        let Some(participant) = self.participants.get_mut(player_id) else {
            return Err(DomainError::InvalidState(format!(
                "player {player_id} has not joined event {}",
                self.id
            )));
        };

        self.metrics.progress_updates += 1;

        for objective in &self.objectives {
            let Some(target) = objective.requirements.get(counter) else {
                continue;
            };
            let progress = participant
                .objectives
                .entry(objective.id.clone())
                .or_default();
            if progress.completed_at.is_some() {
                continue;
            }
            let current = progress.counters.entry(counter.to_owned()).or_insert(0);
            *current = current.saturating_add(delta).min(*target);
        }

        let mut outcome = ProgressOutcome::default();
        for objective in &self.objectives {
            let Some(progress) = participant.objectives.get_mut(&objective.id) else {
                continue;
            };
            if progress.completed_at.is_some() {
                continue;
            }
            let satisfied = objective
                .requirements
                .iter()
                .all(|(key, target)| progress.counters.get(key).copied().unwrap_or(0) >= *target);
            if satisfied {
                progress.completed_at = Some(now);
                outcome.completed_objectives.push(objective.id.clone());
            }
        }

        let all_complete = self.objectives.iter().all(|objective| {
            participant
                .objectives
                .get(&objective.id)
                .is_some_and(|p| p.completed_at.is_some())
        });
        if all_complete && participant.finished_at.is_none() {
            participant.finished_at = Some(now);
            self.metrics.finishers += 1;
            outcome.finished = true;
        }

        Ok(outcome)
    }

    /// Queues every reward the player is owed and has not been granted,
    /// queued or abandoned. Returns how many were queued.
    pub fn queue_rewards_for(&mut self, player_id: &str, now: DateTime<Utc>) -> usize {
        let finished = self
            .participants
            .get(player_id)
            .is_some_and(|p| p.finished_at.is_some());
        if !finished {
            return 0;
        }
        let owed: Vec<String> = self
            .rewards
            .iter()
            .filter(|r| !self.settlement.is_tracked(player_id, &r.reward_id))
            .map(|r| r.reward_id.clone())
            .collect();
        for reward_id in &owed {
            self.settlement.pending.push(PendingGrant {
                player_id: player_id.to_owned(),
                reward_id: reward_id.clone(),
                retry: RetryState::fresh(now),
                last_error: None,
            });
        }
        owed.len()
    }

    /// Grants whose next attempt is due.
    #[must_use]
    pub fn due_grants(&self, now: DateTime<Utc>) -> Vec<DueGrant> {
        self.settlement
            .pending
            .iter()
            .filter(|g| g.retry.is_due(now))
            .filter_map(|g| {
                let reward = self.rewards.iter().find(|r| r.reward_id == g.reward_id)?;
                Some(DueGrant {
                    key: GrantKey {
                        event_id: self.id,
                        player_id: g.player_id.clone(),
                        reward_id: g.reward_id.clone(),
                    },
                    reward: reward.clone(),
                })
            })
            .collect()
    }

    /// Marks a grant as claimed. Returns the attempt count, or `None` if the
    /// grant was not pending.
    pub fn record_grant_success(&mut self, player_id: &str, reward_id: &str) -> Option<u32> {
        let index = self
            .settlement
            .pending
            .iter()
            .position(|g| g.player_id == player_id && g.reward_id == reward_id)?;
        let grant = self.settlement.pending.remove(index);
        self.settlement
            .claimed
            .insert((grant.player_id, grant.reward_id));
        self.metrics.rewards_granted += 1;
        Some(grant.retry.attempts + 1)
    }

    /// Records a failed attempt, rescheduling or abandoning the grant.
    /// Returns `None` if the grant was not pending.
    pub fn record_grant_failure(
        &mut self,
        player_id: &str,
        reward_id: &str,
        error: &str,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
        rng: &mut dyn DeterministicRng,
    ) -> Option<GrantFailureOutcome> {
        let index = self
            .settlement
            .pending
            .iter()
            .position(|g| g.player_id == player_id && g.reward_id == reward_id)?;
        self.metrics.grant_failures += 1;
        let grant = &mut self.settlement.pending[index];
        grant.last_error = Some(error.to_owned());
        if grant.retry.record_failure(policy, now, rng) {
            return Some(GrantFailureOutcome::Retrying {
                attempts: grant.retry.attempts,
            });
        }
        let grant = self.settlement.pending.remove(index);
        let attempts = grant.retry.attempts;
        self.settlement.abandoned.push(grant);
        self.metrics.grants_abandoned += 1;
        Some(GrantFailureOutcome::Abandoned { attempts })
    }

    /// Whether any grant is still waiting for an attempt.
    #[must_use]
    pub fn has_pending_grants(&self) -> bool {
        !self.settlement.pending.is_empty()
    }

    /// Whether some participant finished and has nothing left to settle.
    #[must_use]
    pub fn has_settled_finisher(&self) -> bool {
        self.participants.values().any(|p| {
            p.finished_at.is_some() && !self.settlement.has_pending_for(&p.player_id)
        })
    }

    /// Completes the event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` unless the event is `Active`.
    pub fn complete(
        &mut self,
        reason: CompletionReason,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status != EventStatus::Active {
            return Err(DomainError::InvalidState(format!(
                "event {} cannot complete from {}",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = EventStatus::Completed;
        self.completed_at = Some(now);
        self.completion_reason = Some(reason);
        Ok(())
    }

    /// Cancels the event. Grants already owed to finishers stay queued.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the event is already terminal.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidState(format!(
                "event {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = EventStatus::Cancelled;
        self.cancelled_at = Some(now);
        Ok(())
    }

    /// When the event reached a terminal status.
    #[must_use]
    pub fn terminal_since(&self) -> Option<DateTime<Utc>> {
        match self.status {
            EventStatus::Completed => self.completed_at,
            EventStatus::Cancelled => self.cancelled_at,
            EventStatus::Scheduled | EventStatus::Active => None,
        }
    }
}

impl AggregateRoot for LiveEvent {
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
