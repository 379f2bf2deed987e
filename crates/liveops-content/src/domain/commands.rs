//! Commands for the Content Deployment context.

use liveops_core::command::Command;
use uuid::Uuid;

use super::aggregates::RolloutPlan;
use super::validation::ValidationRule;

/// Command to submit a new content version.
#[derive(Debug, Clone)]
pub struct SubmitContent {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Content type, e.g. `level_pack`.
    pub content_type: String,
    /// Where the payload lives.
    pub payload_ref: String,
    /// Structured description of the payload.
    pub manifest: serde_json::Value,
    /// Declared checksum. Computed from the manifest when absent.
    pub checksum: Option<String>,
    /// Rules evaluated in order, fail-fast.
    pub rules: Vec<ValidationRule>,
    /// Versions that must be in production before this one deploys.
    pub dependencies: Vec<Uuid>,
    /// How the version reaches production.
    pub rollout_plan: RolloutPlan,
}

impl Command for SubmitContent {
    fn command_type(&self) -> &'static str {
        "content.submit_content"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to run validation on a pending version.
#[derive(Debug, Clone)]
pub struct ValidateContent {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The version to validate.
    pub version_id: Uuid,
}

impl Command for ValidateContent {
    fn command_type(&self) -> &'static str {
        "content.validate_content"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to deploy a version.
#[derive(Debug, Clone)]
pub struct DeployContent {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The version to deploy.
    pub version_id: Uuid,
}

impl Command for DeployContent {
    fn command_type(&self) -> &'static str {
        "content.deploy_content"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}

/// Command to roll back a staged or production version.
#[derive(Debug, Clone)]
pub struct RollbackContent {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The version to roll back.
    pub version_id: Uuid,
    /// Operator-facing reason.
    pub reason: String,
}

impl Command for RollbackContent {
    fn command_type(&self) -> &'static str {
        "content.rollback_content"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }
}
