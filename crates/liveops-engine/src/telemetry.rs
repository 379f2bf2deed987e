//! Tracing bootstrap for hosts.

use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Installs a JSON `tracing` subscriber filtered by `RUST_LOG`, defaulting
/// to `info`.
///
/// # Errors
///
/// Returns `EngineError::Config` if a global subscriber is already set.
pub fn init_tracing() -> Result<(), EngineError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .try_init()
        .map_err(|e| EngineError::Config(format!("tracing subscriber already installed: {e}")))
}
