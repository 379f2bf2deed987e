//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

use crate::external::ExternalCallError;

/// Top-level domain error type.
///
/// Synchronous component APIs return this directly. Reconciliation ticks
/// never surface it to the caller; they record it against the owning entity
/// and emit a failure lifecycle event instead.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An entity was not found in its owning store.
    #[error("entity not found: {0}")]
    NotFound(Uuid),

    /// Malformed input rejected at the API boundary. Never enters a store.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A content validation rule failed. Recoverable only by submitting a
    /// new version.
    #[error("validation failure on {version_id}: rule `{rule}` failed: {reason}")]
    ValidationFailure {
        /// The content version that failed.
        version_id: Uuid,
        /// The name of the first failing rule.
        rule: String,
        /// Why the rule failed.
        reason: String,
    },

    /// A deployment dependency is missing or not yet in production.
    #[error("dependency {dependency_id} of {version_id} is not in production")]
    DependencyUnmet {
        /// The content version being deployed.
        version_id: Uuid,
        /// The dependency that blocks it.
        dependency_id: Uuid,
    },

    /// An external collaborator call failed or timed out.
    #[error("external call failed: {0}")]
    ExternalCall(#[from] ExternalCallError),

    /// The operation is not legal in the entity's current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A persistence or infrastructure error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
