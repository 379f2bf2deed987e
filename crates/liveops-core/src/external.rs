//! Bounded external calls.
//!
//! Reward grants and notification delivery go through [`with_timeout`]. A
//! timed-out call is a retryable failure.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Failure of an external collaborator call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalCallError {
    /// The call did not complete within its timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The collaborator reported a failure.
    #[error("{0}")]
    Failed(String),
}

/// Runs `call` with a timeout. A timeout is reported as
/// [`ExternalCallError::Timeout`].
///
/// # Errors
///
/// Returns the call's own error, or `ExternalCallError::Timeout` if it did
/// not finish in time.
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, ExternalCallError>
where
    F: Future<Output = Result<T, ExternalCallError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(?timeout, "external call timed out");
            Err(ExternalCallError::Timeout(timeout))
        }
    }
}
