//! Engine configuration.
//!
//! Values come from three layers, later layers winning: built-in defaults, an
//! optional YAML document, and `LIVEOPS_*` environment variables.

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use liveops_core::retry::RetryPolicy;
use liveops_core::trigger::TriggerMode;
use liveops_events::application::lifecycle_manager::LifecycleSettings;
use liveops_notifications::application::campaign_scheduler::NotificationSettings;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Upper bound on the event retention window (roughly a century).
const MAX_RETENTION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// A reconciled subsystem, in pass order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    /// Content deployment pipeline.
    Content,
    /// Event lifecycle manager.
    Events,
    /// A/B test engine.
    Experiments,
    /// Automation rule engine.
    Automation,
    /// Notification campaign scheduler.
    Notifications,
    /// Alert evaluator.
    Alerts,
}

impl Subsystem {
    /// Every subsystem in the order a pass reconciles them.
    pub const PASS_ORDER: [Self; 6] = [
        Self::Content,
        Self::Events,
        Self::Experiments,
        Self::Automation,
        Self::Notifications,
        Self::Alerts,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Events => "events",
            Self::Experiments => "experiments",
            Self::Automation => "automation",
            Self::Notifications => "notifications",
            Self::Alerts => "alerts",
        }
    }
}

/// Minimum spacing between two reconciliations of each subsystem, in
/// milliseconds. Zero reconciles the subsystem on every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubsystemIntervals {
    /// Content deployment pipeline.
    pub content_ms: u64,
    /// Event lifecycle manager.
    pub events_ms: u64,
    /// A/B test engine.
    pub experiments_ms: u64,
    /// Automation rule engine.
    pub automation_ms: u64,
    /// Notification campaign scheduler.
    pub notifications_ms: u64,
    /// Alert evaluator.
    pub alerts_ms: u64,
}

impl SubsystemIntervals {
    /// The interval configured for `subsystem`.
    #[must_use]
    pub fn get(&self, subsystem: Subsystem) -> Duration {
        let ms = match subsystem {
            Subsystem::Content => self.content_ms,
            Subsystem::Events => self.events_ms,
            Subsystem::Experiments => self.experiments_ms,
            Subsystem::Automation => self.automation_ms,
            Subsystem::Notifications => self.notifications_ms,
            Subsystem::Alerts => self.alerts_ms,
        };
        Duration::from_millis(ms)
    }

    fn slot(&mut self, subsystem: Subsystem) -> &mut u64 {
        match subsystem {
            Subsystem::Content => &mut self.content_ms,
            Subsystem::Events => &mut self.events_ms,
            Subsystem::Experiments => &mut self.experiments_ms,
            Subsystem::Automation => &mut self.automation_ms,
            Subsystem::Notifications => &mut self.notifications_ms,
            Subsystem::Alerts => &mut self.alerts_ms,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// How often the runner starts a pass, in milliseconds.
    pub tick_interval_ms: u64,
    /// Per-subsystem gating on top of the base interval.
    pub intervals: SubsystemIntervals,
    /// Timeout for each external collaborator call, in milliseconds.
    pub call_timeout_ms: u64,
    /// Backoff for reward grants and notification deliveries.
    pub retry: RetryPolicy,
    /// How long terminal live events are kept, in seconds.
    pub event_retention_secs: u64,
    /// Firing mode for rules and alerts that do not choose one.
    pub default_trigger_mode: TriggerMode,
    /// Buffer size of each lifecycle-event subscriber channel.
    pub subscriber_capacity: usize,
    /// Directory the demo host keeps its JSON snapshots in.
    pub snapshot_dir: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            intervals: SubsystemIntervals::default(),
            call_timeout_ms: 5_000,
            retry: RetryPolicy::default(),
            event_retention_secs: 7 * 24 * 60 * 60,
            default_trigger_mode: TriggerMode::Level,
            subscriber_capacity: 256,
            snapshot_dir: None,
        }
    }
}

fn parse_var<T>(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, EngineError>
where
    T: FromStr,
    T::Err: Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| EngineError::Config(format!("{key} is invalid: {e}")))
        })
        .transpose()
}

fn parse_mode(key: &str, raw: &str) -> Result<TriggerMode, EngineError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "level" => Ok(TriggerMode::Level),
        "edge" => Ok(TriggerMode::Edge),
        other => Err(EngineError::Config(format!(
            "{key} must be `level` or `edge`, got `{other}`"
        ))),
    }
}

impl EngineConfig {
    /// Parses a YAML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` for malformed YAML or unknown keys.
    pub fn from_yaml(document: &str) -> Result<Self, EngineError> {
        serde_yaml::from_str(document)
            .map_err(|e| EngineError::Config(format!("invalid configuration document: {e}")))
    }

    /// Loads defaults, then `path` if given, then the process environment,
    /// and validates the result.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Io` if the file cannot be read and
    /// `EngineError::Config` for any invalid value.
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let mut config = match path {
            Some(path) => Self::from_yaml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env_overrides(&|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `LIVEOPS_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` naming the first variable that does not
    /// parse.
    pub fn apply_env_overrides(
        &mut self,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<(), EngineError> {
        if let Some(v) = parse_var(lookup, "LIVEOPS_TICK_INTERVAL_MS")? {
            self.tick_interval_ms = v;
        }
        for subsystem in Subsystem::PASS_ORDER {
            let key = format!(
                "LIVEOPS_{}_INTERVAL_MS",
                subsystem.as_str().to_ascii_uppercase()
            );
            if let Some(v) = parse_var(lookup, &key)? {
                *self.intervals.slot(subsystem) = v;
            }
        }
        if let Some(v) = parse_var(lookup, "LIVEOPS_CALL_TIMEOUT_MS")? {
            self.call_timeout_ms = v;
        }
        if let Some(v) = parse_var(lookup, "LIVEOPS_RETRY_MAX_ATTEMPTS")? {
            self.retry.max_attempts = v;
        }
        if let Some(v) = parse_var(lookup, "LIVEOPS_RETRY_BASE_DELAY_MS")? {
            self.retry.base_delay_ms = v;
        }
        if let Some(v) = parse_var(lookup, "LIVEOPS_RETRY_MAX_DELAY_MS")? {
            self.retry.max_delay_ms = v;
        }
        if let Some(v) = parse_var(lookup, "LIVEOPS_RETRY_JITTER_MS")? {
            self.retry.jitter_ms = v;
        }
        if let Some(v) = parse_var(lookup, "LIVEOPS_EVENT_RETENTION_SECS")? {
            self.event_retention_secs = v;
        }
        if let Some(raw) = lookup("LIVEOPS_TRIGGER_MODE") {
            self.default_trigger_mode = parse_mode("LIVEOPS_TRIGGER_MODE", &raw)?;
        }
        if let Some(v) = parse_var(lookup, "LIVEOPS_SUBSCRIBER_CAPACITY")? {
            self.subscriber_capacity = v;
        }
        if let Some(dir) = lookup("LIVEOPS_SNAPSHOT_DIR") {
            self.snapshot_dir = Some(dir).filter(|d| !d.trim().is_empty());
        }
        Ok(())
    }

    /// Rejects values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` describing the first problem found.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.tick_interval_ms == 0 {
            return Err(EngineError::Config(
                "tick_interval_ms must be positive".into(),
            ));
        }
        if self.call_timeout_ms == 0 {
            return Err(EngineError::Config("call_timeout_ms must be positive".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(EngineError::Config(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(EngineError::Config(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        if self.subscriber_capacity == 0 {
            return Err(EngineError::Config(
                "subscriber_capacity must be positive".into(),
            ));
        }
        if self.event_retention_secs > MAX_RETENTION_SECS {
            return Err(EngineError::Config(format!(
                "event_retention_secs exceeds {MAX_RETENTION_SECS}"
            )));
        }
        Ok(())
    }

    /// The runner's base interval.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Per-call timeout for external collaborators.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Settings for the event lifecycle manager.
    #[must_use]
    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            retry_policy: self.retry,
            call_timeout: self.call_timeout(),
            retention: chrono::Duration::seconds(
                i64::try_from(self.event_retention_secs.min(MAX_RETENTION_SECS)).unwrap_or(0),
            ),
        }
    }

    /// Settings for the notification scheduler.
    #[must_use]
    pub fn notification_settings(&self) -> NotificationSettings {
        NotificationSettings {
            retry_policy: self.retry,
            call_timeout: self.call_timeout(),
        }
    }
}
