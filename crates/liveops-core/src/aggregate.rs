//! Entity root abstraction.

use uuid::Uuid;

/// Trait for the entities a component owns. Each entity carries a version
/// that is bumped once per lifecycle event it emits, so event sequence
/// numbers are gap-free per entity.
pub trait AggregateRoot: Send + Sync {
    /// Returns the entity identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the current version (number of lifecycle events emitted).
    fn version(&self) -> i64;

    /// Advances the version and returns the new value.
    fn next_version(&mut self) -> i64;
}
