//! Query views for the Content Deployment context.

use liveops_core::comparison::FieldValue;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{ContentVersion, RuleResult};

/// Read-only summary of a content version.
#[derive(Debug, Clone, Serialize)]
pub struct ContentVersionView {
    /// The version identifier.
    pub version_id: Uuid,
    /// Content type.
    pub content_type: String,
    /// Deployment status.
    pub status: &'static str,
    /// Share of players exposed.
    pub rollout_percentage: u8,
    /// Recorded rule results.
    pub validation_results: Vec<RuleResult>,
    /// Dependency blocking deployment, if any.
    pub blocked_on: Option<Uuid>,
}

impl From<&ContentVersion> for ContentVersionView {
    fn from(version: &ContentVersion) -> Self {
        Self {
            version_id: version.id,
            content_type: version.content_type.clone(),
            status: version.status.as_str(),
            rollout_percentage: version.rollout_percentage,
            validation_results: version.validation_results.clone(),
            blocked_on: version.blocked_on,
        }
    }
}

/// Resolves a named field of a version for rule conditions.
///
/// Known fields: `status`, `content_type`, `rollout_percentage`.
#[must_use]
pub fn field_value(version: &ContentVersion, field: &str) -> Option<FieldValue> {
    match field {
        "status" => Some(FieldValue::from(version.status.as_str())),
        "content_type" => Some(FieldValue::from(version.content_type.as_str())),
        "rollout_percentage" => Some(FieldValue::Number(f64::from(version.rollout_percentage))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use liveops_test_support::fixed_now;
    use serde_json::json;

    use super::*;
    use crate::application::deployment_pipeline::DeploymentPipeline;
    use crate::domain::aggregates::RolloutPlan;
    use crate::domain::commands::{DeployContent, SubmitContent};

    #[test]
    fn test_field_value_reads_deployed_version() {
        // Arrange
        let mut pipeline = DeploymentPipeline::new();
        let id = pipeline
            .submit(
                &SubmitContent {
                    correlation_id: Uuid::new_v4(),
                    content_type: "store_layout".into(),
                    payload_ref: "cdn://store/v3.json".into(),
                    manifest: json!({"tiles": 8}),
                    checksum: None,
                    rules: Vec::new(),
                    dependencies: Vec::new(),
                    rollout_plan: RolloutPlan::Full,
                },
                fixed_now(),
            )
            .unwrap();
        pipeline
            .deploy(
                &DeployContent {
                    correlation_id: Uuid::new_v4(),
                    version_id: id,
                },
                fixed_now(),
            )
            .unwrap();
        let version = pipeline.get(id).unwrap();

        // Act / Assert
        assert_eq!(
            field_value(&version, "status"),
            Some(FieldValue::from("production"))
        );
        assert_eq!(
            field_value(&version, "rollout_percentage"),
            Some(FieldValue::Number(100.0))
        );
        assert_eq!(ContentVersionView::from(&version).status, "production");
        assert!(field_value(&version, "checksum").is_none());
    }
}
