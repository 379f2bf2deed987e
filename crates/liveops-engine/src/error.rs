//! Engine bootstrap error types.

use liveops_core::error::DomainError;

/// Errors raised while configuring or persisting the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A component rejected an operation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// File-system failure in a host adapter.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The reconciliation task panicked or was aborted.
    #[error("reconciliation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
