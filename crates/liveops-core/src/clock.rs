//! Clock abstraction for determinism.

use chrono::{DateTime, Utc};

/// Abstraction over system time. The engine never reads the system clock
/// directly; every reconciliation pass takes "now" from a `Clock`.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
