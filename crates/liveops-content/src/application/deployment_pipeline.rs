//! The Content Deployment Pipeline.
//!
//! Versions move `Pending -> Validated -> (Staging ->) Production`, or to
//! `Failed` on the first failing rule. A production version can be rolled
//! back; rollback restores the version it replaced and cascades to live
//! versions that depend on it, so a production version never depends on
//! anything that is not itself in production.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use liveops_core::aggregate::AggregateRoot;
use liveops_core::bucketing::percent_bucket;
use liveops_core::error::DomainError;
use liveops_core::event::{EventMetadata, Outbox};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::aggregates::{ContentStatus, ContentVersion, RuleResult};
use crate::domain::checksum::manifest_checksum;
use crate::domain::commands::{DeployContent, RollbackContent, SubmitContent, ValidateContent};
use crate::domain::events::{
    ContentDeployed, ContentDeprecated, ContentEvent, ContentEventKind, ContentRestored,
    ContentRolledBack, ContentSubmitted, DeploymentBlocked, RolloutChanged, ValidationFailed,
};
use crate::domain::validation::{ContentValidator, ValidatorRegistry, evaluate};

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentTickSummary {
    /// Pending versions that passed validation.
    pub validated: usize,
    /// Pending versions that failed validation.
    pub failed: usize,
    /// Versions that reached production.
    pub deployed: usize,
    /// Staged rollout steps taken.
    pub rollout_steps: usize,
    /// Deploys still waiting on a dependency.
    pub blocked: usize,
}

/// Validates, stages, deploys and rolls back content versions.
#[derive(Default)]
pub struct DeploymentPipeline {
    versions: BTreeMap<Uuid, ContentVersion>,
    outbox: Outbox<ContentEvent>,
    validators: ValidatorRegistry,
}

impl std::fmt::Debug for DeploymentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentPipeline")
            .field("versions", &self.versions.len())
            .field("validators", &self.validators.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

fn emit(
    outbox: &mut Outbox<ContentEvent>,
    version: &mut ContentVersion,
    kind: ContentEventKind,
    correlation_id: Uuid,
    now: DateTime<Utc>,
) {
    let sequence = version.next_version();
    outbox.push(ContentEvent {
        metadata: EventMetadata::new(kind.event_type(), version.id, sequence, correlation_id, now),
        kind,
    });
}

impl DeploymentPipeline {
    /// Creates an empty pipeline with no custom validators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the validator behind `ValidationRule::Custom { name }`.
    pub fn register_validator(
        &mut self,
        name: impl Into<String>,
        validator: Arc<dyn ContentValidator>,
    ) {
        self.validators.insert(name.into(), validator);
    }

    /// Submits a new version in `Pending`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for an empty content type or
    /// payload reference, a malformed rule or rollout plan, or a repeated
    /// dependency.
    pub fn submit(
        &mut self,
        command: &SubmitContent,
        now: DateTime<Utc>,
    ) -> Result<Uuid, DomainError> {
        if command.content_type.trim().is_empty() || command.payload_ref.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "content type and payload reference are required".into(),
            ));
        }
        for rule in &command.rules {
            rule.validate()?;
        }
        command.rollout_plan.validate()?;
        let unique: BTreeSet<&Uuid> = command.dependencies.iter().collect();
        if unique.len() != command.dependencies.len() {
            return Err(DomainError::InvariantViolation(
                "dependencies must not repeat".into(),
            ));
        }

        let checksum = command
            .checksum
            .clone()
            .unwrap_or_else(|| manifest_checksum(&command.manifest));
        let mut version = ContentVersion {
            id: Uuid::new_v4(),
            version: 0,
            content_type: command.content_type.clone(),
            payload_ref: command.payload_ref.clone(),
            manifest: command.manifest.clone(),
            checksum: checksum.clone(),
            status: ContentStatus::Pending,
            rollout_percentage: 0,
            rollout_plan: command.rollout_plan.clone(),
            rollout_step: 0,
            next_step_at: None,
            rules: command.rules.clone(),
            validation_results: Vec::new(),
            dependencies: command.dependencies.clone(),
            deploy_requested: false,
            blocked_on: None,
            superseded: None,
            submitted_at: now,
            deployed_at: None,
            rolled_back_at: None,
        };
        let id = version.id;
        emit(
            &mut self.outbox,
            &mut version,
            ContentEventKind::ContentSubmitted(ContentSubmitted {
                content_type: command.content_type.clone(),
                checksum,
            }),
            command.correlation_id,
            now,
        );
        info!(version_id = %id, content_type = %command.content_type, "content version submitted");
        self.versions.insert(id, version);
        Ok(id)
    }

    /// Runs validation on a pending version. Versions past validation are
    /// left alone and their status returned.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown version and
    /// `DomainError::ValidationFailure` if a rule fails, now or earlier.
    pub fn validate(
        &mut self,
        command: &ValidateContent,
        now: DateTime<Utc>,
    ) -> Result<ContentStatus, DomainError> {
        let status = self.status_of(command.version_id)?;
        match status {
            ContentStatus::Pending => {
                self.run_validation(command.version_id, command.correlation_id, now)
            }
            ContentStatus::Failed => Err(self.validation_error(command.version_id)),
            other => Ok(other),
        }
    }

    /// Deploys a version, validating it first if still pending.
    ///
    /// A version whose dependencies are not all in production stays
    /// `Validated` with the request remembered; the tick retries it.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown version,
    /// `DomainError::ValidationFailure` for a failed version,
    /// `DomainError::InvalidState` for a rolled-back or deprecated version,
    /// and `DomainError::DependencyUnmet` while a dependency blocks it.
    pub fn deploy(
        &mut self,
        command: &DeployContent,
        now: DateTime<Utc>,
    ) -> Result<ContentStatus, DomainError> {
        let id = command.version_id;
        match self.status_of(id)? {
            ContentStatus::Failed => return Err(self.validation_error(id)),
            ContentStatus::RolledBack | ContentStatus::Deprecated => {
                return Err(DomainError::InvalidState(format!(
                    "content version {id} was withdrawn; submit a new version"
                )));
            }
            status @ (ContentStatus::Staging | ContentStatus::Production) => return Ok(status),
            ContentStatus::Pending => {
                self.run_validation(id, command.correlation_id, now)?;
            }
            ContentStatus::Validated => {}
        }
        self.attempt_deploy(id, command.correlation_id, now)
    }

    /// Rolls back a staged or production version.
    ///
    /// The version it replaced returns to production when that version's own
    /// dependencies are still in production. Live versions depending on the
    /// rolled-back version are rolled back with it.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown version and
    /// `DomainError::InvalidState` unless it is staged or in production.
    pub fn rollback(
        &mut self,
        command: &RollbackContent,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let status = self.status_of(command.version_id)?;
        if !status.is_live() {
            return Err(DomainError::InvalidState(format!(
                "content version {} is {} and cannot be rolled back",
                command.version_id,
                status.as_str()
            )));
        }

        let mut work = vec![(command.version_id, command.reason.clone())];
        while let Some((id, reason)) = work.pop() {
            let Some(version) = self.versions.get_mut(&id) else {
                continue;
            };
            if !version.status.is_live() {
                continue;
            }
            let was_production = version.status == ContentStatus::Production;
            version.roll_back(now);
            emit(
                &mut self.outbox,
                version,
                ContentEventKind::ContentRolledBack(ContentRolledBack {
                    reason: reason.clone(),
                }),
                command.correlation_id,
                now,
            );
            warn!(version_id = %id, reason = %reason, "content version rolled back");

            if was_production && let Some(previous) = version.superseded {
                self.restore_previous(previous, id, command.correlation_id, now);
            }

            let dependents: Vec<Uuid> = self
                .versions
                .values()
                .filter(|v| v.status.is_live() && v.dependencies.contains(&id))
                .map(|v| v.id)
                .collect();
            for dependent in dependents {
                work.push((dependent, format!("dependency {id} rolled back")));
            }
        }
        Ok(())
    }

    /// Runs one reconciliation pass: validates pending versions, retries
    /// blocked deploys and advances staged rollouts.
    pub fn tick(&mut self, now: DateTime<Utc>, correlation_id: Uuid) -> ContentTickSummary {
        let mut summary = ContentTickSummary::default();

        for id in self.ids_in_submission_order(|v| v.status == ContentStatus::Pending) {
            match self.run_validation(id, correlation_id, now) {
                Ok(_) => summary.validated += 1,
                Err(_) => summary.failed += 1,
            }
        }

        // Repeat so a dependency promoted in this pass unblocks its dependents.
        loop {
            let requested = self.ids_in_submission_order(|v| {
                v.status == ContentStatus::Validated && v.deploy_requested
            });
            let mut progressed = false;
            summary.blocked = 0;
            for id in requested {
                match self.attempt_deploy(id, correlation_id, now) {
                    Ok(ContentStatus::Production) => {
                        summary.deployed += 1;
                        progressed = true;
                    }
                    Ok(_) => progressed = true,
                    Err(_) => summary.blocked += 1,
                }
            }
            if !progressed {
                break;
            }
        }

        for id in self.ids_in_submission_order(|v| v.status == ContentStatus::Staging) {
            let Some(version) = self.versions.get_mut(&id) else {
                continue;
            };
            let Some(percentage) = version.advance_step(now) else {
                continue;
            };
            summary.rollout_steps += 1;
            if percentage >= 100 {
                self.promote_to_production(id, correlation_id, now);
                summary.deployed += 1;
            } else {
                emit(
                    &mut self.outbox,
                    version,
                    ContentEventKind::RolloutAdvanced(RolloutChanged {
                        rollout_percentage: percentage,
                    }),
                    correlation_id,
                    now,
                );
                info!(version_id = %id, rollout_percentage = percentage, "content rollout advanced");
            }
        }

        debug!(?summary, "content pass finished");
        summary
    }

    fn status_of(&self, id: Uuid) -> Result<ContentStatus, DomainError> {
        self.versions
            .get(&id)
            .map(|v| v.status)
            .ok_or(DomainError::NotFound(id))
    }

    fn validation_error(&self, id: Uuid) -> DomainError {
        self.versions
            .get(&id)
            .map_or(DomainError::NotFound(id), ContentVersion::validation_error)
    }

    fn ids_in_submission_order(&self, filter: impl Fn(&ContentVersion) -> bool) -> Vec<Uuid> {
        let mut selected: Vec<&ContentVersion> =
            self.versions.values().filter(|v| filter(v)).collect();
        selected.sort_by_key(|v| (v.submitted_at, v.id));
        selected.into_iter().map(|v| v.id).collect()
    }

    fn run_validation(
        &mut self,
        id: Uuid,
        correlation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ContentStatus, DomainError> {
        let version = self.versions.get_mut(&id).ok_or(DomainError::NotFound(id))?;

        let mut results = Vec::with_capacity(version.rules.len());
        for rule in &version.rules {
            let outcome = evaluate(rule, version, &self.validators);
            let passed = outcome.is_ok();
            results.push(RuleResult {
                rule: rule.name(),
                passed,
                reason: outcome.err(),
                evaluated_at: now,
            });
            if !passed {
                break;
            }
        }
        version.validation_results = results;

        if version.validation_passed() {
            version.status = ContentStatus::Validated;
            emit(
                &mut self.outbox,
                version,
                ContentEventKind::ContentValidated,
                correlation_id,
                now,
            );
            info!(version_id = %id, "content version validated");
            return Ok(ContentStatus::Validated);
        }

        version.status = ContentStatus::Failed;
        version.deploy_requested = false;
        let error = version.validation_error();
        if let DomainError::ValidationFailure { rule, reason, .. } = &error {
            warn!(version_id = %id, rule = %rule, reason = %reason, "content validation failed");
            emit(
                &mut self.outbox,
                version,
                ContentEventKind::ValidationFailed(ValidationFailed {
                    rule: rule.clone(),
                    reason: reason.clone(),
                }),
                correlation_id,
                now,
            );
        }
        Err(error)
    }

    fn unmet_dependency(&self, version: &ContentVersion) -> Option<Uuid> {
        version.dependencies.iter().copied().find(|dep| {
            self.versions
                .get(dep)
                .is_none_or(|d| d.status != ContentStatus::Production)
        })
    }

    fn attempt_deploy(
        &mut self,
        id: Uuid,
        correlation_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ContentStatus, DomainError> {
        let unmet = {
            let version = self.versions.get(&id).ok_or(DomainError::NotFound(id))?;
            self.unmet_dependency(version)
        };
        let version = self.versions.get_mut(&id).ok_or(DomainError::NotFound(id))?;

        if let Some(dependency_id) = unmet {
            version.deploy_requested = true;
            if version.blocked_on != Some(dependency_id) {
                version.blocked_on = Some(dependency_id);
                emit(
                    &mut self.outbox,
                    version,
                    ContentEventKind::DeploymentBlocked(DeploymentBlocked { dependency_id }),
                    correlation_id,
                    now,
                );
                warn!(version_id = %id, %dependency_id, "content deployment blocked on dependency");
            }
            return Err(DomainError::DependencyUnmet {
                version_id: id,
                dependency_id,
            });
        }

        if version.begin_staging(now) {
            let rollout_percentage = version.rollout_percentage;
            emit(
                &mut self.outbox,
                version,
                ContentEventKind::RolloutStarted(RolloutChanged { rollout_percentage }),
                correlation_id,
                now,
            );
            info!(version_id = %id, rollout_percentage, "content rollout started");
            return Ok(ContentStatus::Staging);
        }

        self.promote_to_production(id, correlation_id, now);
        Ok(ContentStatus::Production)
    }

    fn promote_to_production(&mut self, id: Uuid, correlation_id: Uuid, now: DateTime<Utc>) {
        let Some(content_type) = self.versions.get(&id).map(|v| v.content_type.clone()) else {
            return;
        };
        let mut predecessors: Vec<&ContentVersion> = self
            .versions
            .values()
            .filter(|v| {
                v.id != id
                    && v.status == ContentStatus::Production
                    && v.content_type == content_type
            })
            .filter(|v| {
                !self.versions.values().any(|d| {
                    d.id != id && d.status.is_live() && d.dependencies.contains(&v.id)
                })
            })
            .collect();
        predecessors.sort_by_key(|v| v.deployed_at);
        let predecessors: Vec<Uuid> = predecessors.into_iter().map(|v| v.id).collect();

        for previous in &predecessors {
            if let Some(old) = self.versions.get_mut(previous) {
                old.deprecate();
                emit(
                    &mut self.outbox,
                    old,
                    ContentEventKind::ContentDeprecated(ContentDeprecated { replaced_by: id }),
                    correlation_id,
                    now,
                );
                info!(version_id = %previous, replaced_by = %id, "content version deprecated");
            }
        }

        if let Some(version) = self.versions.get_mut(&id) {
            version.superseded = predecessors.last().copied();
            version.promote(now);
            let superseded = version.superseded;
            emit(
                &mut self.outbox,
                version,
                ContentEventKind::ContentDeployed(ContentDeployed { superseded }),
                correlation_id,
                now,
            );
            info!(version_id = %id, content_type = %content_type, "content version in production");
        }
    }

    fn restore_previous(
        &mut self,
        previous: Uuid,
        replacing: Uuid,
        correlation_id: Uuid,
        now: DateTime<Utc>,
    ) {
        let restorable = self.versions.get(&previous).is_some_and(|v| {
            v.status == ContentStatus::Deprecated && self.unmet_dependency(v).is_none()
        });
        if !restorable {
            return;
        }
        if let Some(version) = self.versions.get_mut(&previous) {
            version.promote(now);
            emit(
                &mut self.outbox,
                version,
                ContentEventKind::ContentRestored(ContentRestored { replacing }),
                correlation_id,
                now,
            );
            info!(version_id = %previous, %replacing, "content version restored to production");
        }
    }

    /// Whether a player sees a version: always in production, by
    /// deterministic bucket while staging, never otherwise.
    #[must_use]
    pub fn is_exposed(&self, version_id: Uuid, player_id: &str) -> bool {
        self.versions.get(&version_id).is_some_and(|v| match v.status {
            ContentStatus::Production => true,
            ContentStatus::Staging => {
                percent_bucket(&version_id.to_string(), player_id) < v.rollout_percentage
            }
            _ => false,
        })
    }

    /// The newest live version of a content type the player is exposed to.
    #[must_use]
    pub fn resolve_for_player(&self, content_type: &str, player_id: &str) -> Option<Uuid> {
        self.versions
            .values()
            .filter(|v| v.content_type == content_type && self.is_exposed(v.id, player_id))
            .max_by_key(|v| (v.submitted_at, v.id))
            .map(|v| v.id)
    }

    /// A copy of one version.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` if the version does not exist.
    pub fn get(&self, version_id: Uuid) -> Result<ContentVersion, DomainError> {
        self.versions
            .get(&version_id)
            .cloned()
            .ok_or(DomainError::NotFound(version_id))
    }

    /// Borrows one version for read-only inspection.
    #[must_use]
    pub fn peek(&self, version_id: Uuid) -> Option<&ContentVersion> {
        self.versions.get(&version_id)
    }

    /// Number of versions with the given status.
    #[must_use]
    pub fn count_with_status(&self, status: ContentStatus) -> usize {
        self.versions.values().filter(|v| v.status == status).count()
    }

    /// Removes and returns buffered lifecycle events, oldest first.
    pub fn drain_events(&mut self) -> Vec<ContentEvent> {
        self.outbox.drain()
    }

    /// Serializes every version.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if serialization fails.
    pub fn snapshot(&self) -> Result<serde_json::Value, DomainError> {
        let versions: Vec<&ContentVersion> = self.versions.values().collect();
        serde_json::to_value(versions)
            .map_err(|e| DomainError::Infrastructure(format!("content snapshot failed: {e}")))
    }

    /// Replaces the store with a snapshot taken by [`Self::snapshot`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the blob cannot be decoded.
    pub fn restore(&mut self, blob: serde_json::Value) -> Result<(), DomainError> {
        let versions: Vec<ContentVersion> = serde_json::from_value(blob)
            .map_err(|e| DomainError::Infrastructure(format!("content restore failed: {e}")))?;
        self.versions = versions.into_iter().map(|v| (v.id, v)).collect();
        info!(versions = self.versions.len(), "content versions restored");
        Ok(())
    }
}
