//! Validation rules for content versions.

use std::collections::HashMap;
use std::sync::Arc;

use liveops_core::error::DomainError;
use serde::{Deserialize, Serialize};

use super::aggregates::ContentVersion;
use super::checksum::manifest_checksum;

/// A rule a content version must pass before it can deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationRule {
    /// The declared checksum equals the manifest's SHA-256.
    ChecksumMatches,
    /// The manifest is not null and not an empty object or array.
    NonEmptyManifest,
    /// The encoded manifest is at most `limit` bytes.
    MaxPayloadBytes {
        /// Size limit in bytes.
        limit: usize,
    },
    /// The manifest is an object containing every key.
    RequiredKeys {
        /// Keys that must be present.
        keys: Vec<String>,
    },
    /// The payload reference uses the given URI scheme.
    ReferenceScheme {
        /// Scheme without `://`, e.g. `cdn`.
        scheme: String,
    },
    /// Delegated to a host-registered [`ContentValidator`].
    Custom {
        /// Validator name.
        name: String,
    },
}

impl ValidationRule {
    /// Name recorded in rule results.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::ChecksumMatches => "checksum_matches".into(),
            Self::NonEmptyManifest => "non_empty_manifest".into(),
            Self::MaxPayloadBytes { .. } => "max_payload_bytes".into(),
            Self::RequiredKeys { .. } => "required_keys".into(),
            Self::ReferenceScheme { .. } => "reference_scheme".into(),
            Self::Custom { name } => format!("custom:{name}"),
        }
    }

    /// Rejects rules that could never pass.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvariantViolation` for a zero size limit, an
    /// empty key list, or an empty scheme or validator name.
    pub fn validate(&self) -> Result<(), DomainError> {
        let malformed = match self {
            Self::ChecksumMatches | Self::NonEmptyManifest => false,
            Self::MaxPayloadBytes { limit } => *limit == 0,
            Self::RequiredKeys { keys } => keys.is_empty(),
            Self::ReferenceScheme { scheme } => scheme.trim().is_empty(),
            Self::Custom { name } => name.trim().is_empty(),
        };
        if malformed {
            return Err(DomainError::InvariantViolation(format!(
                "malformed validation rule {}",
                self.name()
            )));
        }
        Ok(())
    }
}

/// Host-supplied validation logic for [`ValidationRule::Custom`].
pub trait ContentValidator: Send + Sync {
    /// Checks a version. Returns the failure reason on rejection.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the version is rejected.
    fn validate(&self, version: &ContentVersion) -> Result<(), String>;
}

/// Custom validators keyed by name.
pub type ValidatorRegistry = HashMap<String, Arc<dyn ContentValidator>>;

/// Evaluates one rule against a version.
///
/// # Errors
///
/// Returns the failure reason when the rule does not pass.
pub fn evaluate(
    rule: &ValidationRule,
    version: &ContentVersion,
    validators: &ValidatorRegistry,
) -> Result<(), String> {
    match rule {
        ValidationRule::ChecksumMatches => {
            let actual = manifest_checksum(&version.manifest);
            if actual.eq_ignore_ascii_case(&version.checksum) {
                Ok(())
            } else {
                Err(format!(
                    "checksum mismatch: declared {}, computed {actual}",
                    version.checksum
                ))
            }
        }
        ValidationRule::NonEmptyManifest => {
            let empty = match &version.manifest {
                serde_json::Value::Null => true,
                serde_json::Value::Object(map) => map.is_empty(),
                serde_json::Value::Array(items) => items.is_empty(),
                serde_json::Value::String(s) => s.is_empty(),
                serde_json::Value::Bool(_) | serde_json::Value::Number(_) => false,
            };
            if empty {
                Err("manifest is empty".into())
            } else {
                Ok(())
            }
        }
        ValidationRule::MaxPayloadBytes { limit } => {
            let size = version.manifest.to_string().len();
            if size <= *limit {
                Ok(())
            } else {
                Err(format!("manifest is {size} bytes, limit is {limit}"))
            }
        }
        ValidationRule::RequiredKeys { keys } => {
            let serde_json::Value::Object(map) = &version.manifest else {
                return Err("manifest is not an object".into());
            };
            let missing: Vec<&str> = keys
                .iter()
                .filter(|k| !map.contains_key(k.as_str()))
                .map(String::as_str)
                .collect();
            if missing.is_empty() {
                Ok(())
            } else {
                Err(format!("manifest is missing keys: {}", missing.join(", ")))
            }
        }
        ValidationRule::ReferenceScheme { scheme } => {
            let prefix = format!("{scheme}://");
            if version.payload_ref.starts_with(&prefix) {
                Ok(())
            } else {
                Err(format!(
                    "payload reference `{}` does not use scheme `{scheme}`",
                    version.payload_ref
                ))
            }
        }
        ValidationRule::Custom { name } => match validators.get(name) {
            Some(validator) => validator.validate(version),
            None => Err(format!("no validator registered under `{name}`")),
        },
    }
}

#[cfg(test)]
mod tests {
    use liveops_test_support::fixed_now;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::domain::aggregates::{ContentStatus, RolloutPlan};

    fn version(manifest: serde_json::Value) -> ContentVersion {
        ContentVersion {
            id: Uuid::new_v4(),
            version: 0,
            content_type: "level_pack".into(),
            payload_ref: "cdn://packs/spring.zip".into(),
            checksum: manifest_checksum(&manifest),
            manifest,
            status: ContentStatus::Pending,
            rollout_percentage: 0,
            rollout_plan: RolloutPlan::Full,
            rollout_step: 0,
            next_step_at: None,
            rules: Vec::new(),
            validation_results: Vec::new(),
            dependencies: Vec::new(),
            deploy_requested: false,
            blocked_on: None,
            superseded: None,
            submitted_at: fixed_now(),
            deployed_at: None,
            rolled_back_at: None,
        }
    }

    struct RejectAll;

    impl ContentValidator for RejectAll {
        fn validate(&self, _version: &ContentVersion) -> Result<(), String> {
            Err("profanity found".into())
        }
    }

    #[test]
    fn test_checksum_rule_detects_tampering() {
        let mut content = version(json!({"levels": 5}));
        content.checksum = "deadbeef".into();

        let result = evaluate(&ValidationRule::ChecksumMatches, &content, &HashMap::new());

        assert!(result.unwrap_err().contains("checksum mismatch"));
    }

    #[test]
    fn test_required_keys_lists_missing_keys() {
        let content = version(json!({"levels": 5}));
        let rule = ValidationRule::RequiredKeys {
            keys: vec!["levels".into(), "theme".into()],
        };

        let result = evaluate(&rule, &content, &HashMap::new());

        assert_eq!(result.unwrap_err(), "manifest is missing keys: theme");
    }

    #[test]
    fn test_reference_scheme_and_size_rules() {
        let content = version(json!({"levels": 5}));
        let validators = HashMap::new();

        assert!(
            evaluate(
                &ValidationRule::ReferenceScheme {
                    scheme: "cdn".into()
                },
                &content,
                &validators
            )
            .is_ok()
        );
        assert!(
            evaluate(
                &ValidationRule::MaxPayloadBytes { limit: 4 },
                &content,
                &validators
            )
            .is_err()
        );
        assert!(evaluate(&ValidationRule::NonEmptyManifest, &version(json!({})), &validators).is_err());
    }

    #[test]
    fn test_custom_rule_dispatches_to_registered_validator() {
        // Arrange
        let content = version(json!({"levels": 5}));
        let mut validators: ValidatorRegistry = HashMap::new();
        validators.insert("profanity".into(), Arc::new(RejectAll));

        // Act
        let registered = evaluate(
            &ValidationRule::Custom {
                name: "profanity".into(),
            },
            &content,
            &validators,
        );
        let missing = evaluate(
            &ValidationRule::Custom {
                name: "localization".into(),
            },
            &content,
            &validators,
        );

        // Assert
        assert_eq!(registered.unwrap_err(), "profanity found");
        assert!(missing.unwrap_err().contains("no validator registered"));
    }

    #[test]
    fn test_rule_validate_rejects_zero_limit() {
        assert!(ValidationRule::MaxPayloadBytes { limit: 0 }.validate().is_err());
        assert_eq!(
            ValidationRule::Custom {
                name: "profanity".into()
            }
            .name(),
            "custom:profanity"
        );
    }
}
